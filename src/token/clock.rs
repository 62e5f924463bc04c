use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;
use uuid::Uuid;

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountdownEvent {
    Tick { token_id: Uuid, remaining: Duration },
    Expired { token_id: Uuid },
}

impl CountdownEvent {
    pub fn token_id(&self) -> Uuid {
        match self {
            CountdownEvent::Tick { token_id, .. } | CountdownEvent::Expired { token_id } => {
                *token_id
            }
        }
    }
}

/// Formats a remaining duration as `m:ss`, rounding partial seconds up so
/// `0:00` only ever shows once the token has expired.
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000);
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// Starts countdowns at a fixed tick cadence.
#[derive(Debug, Clone, Copy)]
pub struct ExpiryClock {
    tick: Duration,
}

impl ExpiryClock {
    pub fn new(tick: Duration) -> Self {
        Self {
            tick: tick.max(Duration::from_millis(1)),
        }
    }

    /// Spawns the countdown task. The first tick fires immediately.
    /// Returns `None` if `remaining` is too far out for the runtime clock.
    pub fn start(
        &self,
        token_id: Uuid,
        remaining: Duration,
        events: mpsc::UnboundedSender<CountdownEvent>,
    ) -> Option<Countdown> {
        let deadline = Instant::now().checked_add(remaining)?;
        let handle = tokio::spawn(run(token_id, deadline, self.tick, events));
        Some(Countdown { handle })
    }
}

async fn run(
    token_id: Uuid,
    deadline: Instant,
    tick: Duration,
    events: mpsc::UnboundedSender<CountdownEvent>,
) {
    let mut ticker = time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let remaining = deadline.saturating_duration_since(Instant::now());

        if remaining.is_zero() {
            debug!(%token_id, "Countdown expired");
            let _ = events.send(CountdownEvent::Expired { token_id });
            return;
        }

        if events
            .send(CountdownEvent::Tick { token_id, remaining })
            .is_err()
        {
            debug!(%token_id, "Countdown consumer gone");
            return;
        }
    }
}

/// Handle to a running countdown. Dropping it aborts the task, after which
/// no further event is sent.
#[derive(Debug)]
pub struct Countdown {
    handle: JoinHandle<()>,
}

impl Countdown {
    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
