//! Periodic reconciliation of the local record cache with the authority.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::model::attendance::{AttendanceRecord, RecordFilter};
use crate::notice::Notifier;
use crate::session::SessionContext;
use crate::store::RecordStore;

/// Snapshot of the records last fetched.
pub type RecordCache = Arc<Vec<AttendanceRecord>>;

struct Shared<S> {
    store: Arc<S>,
    session: Arc<SessionContext>,
    filter: RecordFilter,
    notifier: Notifier,
    cache: watch::Sender<RecordCache>,
}

impl<S: RecordStore> Shared<S> {
    /// One fetch cycle. On success the cache is replaced wholesale; on
    /// failure it is left as it was and one notice is emitted.
    async fn cycle(&self) -> Result<usize, StoreError> {
        match self.store.get_records(&self.session, &self.filter).await {
            Ok(records) => {
                let count = records.len();
                self.cache.send_replace(Arc::new(records));
                debug!(count, "Record cache refreshed");
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "Record fetch failed");
                if e.is_fatal() {
                    self.session.invalidate();
                    self.notifier
                        .reauth("Your session has expired. Please log in again.");
                } else {
                    self.notifier.error("Failed to load attendance records");
                }
                Err(e)
            }
        }
    }
}

/// The polling task of one view plus the cache it feeds.
///
/// Dropping the handle aborts the task.
pub struct PollingSync<S> {
    shared: Arc<Shared<S>>,
    handle: JoinHandle<()>,
}

impl<S: RecordStore + 'static> PollingSync<S> {
    /// Starts polling `filter` every `interval`; the first fetch runs
    /// immediately. `initial` seeds the cache until that fetch lands.
    pub fn start(
        store: Arc<S>,
        session: Arc<SessionContext>,
        filter: RecordFilter,
        interval: Duration,
        notifier: Notifier,
        initial: RecordCache,
    ) -> Self {
        let (cache, _) = watch::channel(initial);
        let shared = Arc::new(Shared {
            store,
            session,
            filter,
            notifier,
            cache,
        });
        let handle = tokio::spawn(run(shared.clone(), interval));
        Self { shared, handle }
    }

    /// Manual reload, outside the regular cadence.
    pub async fn refresh_now(&self) -> Result<usize, StoreError> {
        let count = self.resync().await?;
        self.shared.notifier.success("Attendance sheet refreshed");
        Ok(count)
    }

    /// Same as [`PollingSync::refresh_now`] but without the success notice;
    /// used after an edit so the view shows the authority's state.
    pub async fn resync(&self) -> Result<usize, StoreError> {
        self.shared.cycle().await
    }
}

impl<S> PollingSync<S> {
    pub fn filter(&self) -> &RecordFilter {
        &self.shared.filter
    }

    pub fn records(&self) -> RecordCache {
        self.shared.cache.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RecordCache> {
        self.shared.cache.subscribe()
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl<S> Drop for PollingSync<S> {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run<S: RecordStore>(shared: Arc<Shared<S>>, interval: Duration) {
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = shared.cycle().await {
            if e.is_fatal() {
                debug!("Polling stopped: session no longer valid");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::model::attendance::{
        PreImage, RecordKey, RecordSnapshot, RemovedColumns,
    };
    use crate::model::teaching::TeachingAssignment;
    use crate::notice::{Notice, NoticeLevel};
    use crate::store::CreateRecord;

    /// Store that answers fetches from a script of results.
    struct Scripted {
        script: Mutex<VecDeque<Result<Vec<AttendanceRecord>, StoreError>>>,
        fetches: AtomicUsize,
    }

    impl Scripted {
        fn new(script: Vec<Result<Vec<AttendanceRecord>, StoreError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fetches: AtomicUsize::new(0),
            })
        }
    }

    impl RecordStore for Scripted {
        async fn create_or_append_record(
            &self,
            _: &SessionContext,
            _: &CreateRecord,
        ) -> Result<AttendanceRecord, StoreError> {
            unimplemented!()
        }

        async fn get_records(
            &self,
            session: &SessionContext,
            _: &RecordFilter,
        ) -> Result<Vec<AttendanceRecord>, StoreError> {
            session.credential()?;
            self.fetches.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn delete_date_columns(
            &self,
            _: &SessionContext,
            _: Uuid,
            _: &[NaiveDate],
        ) -> Result<RemovedColumns, StoreError> {
            unimplemented!()
        }

        async fn reset_record(
            &self,
            _: &SessionContext,
            _: Uuid,
        ) -> Result<RecordSnapshot, StoreError> {
            unimplemented!()
        }

        async fn restore(
            &self,
            _: &SessionContext,
            _: Uuid,
            _: &PreImage,
        ) -> Result<(), StoreError> {
            unimplemented!()
        }

        async fn teaching_details(
            &self,
            _: &SessionContext,
        ) -> Result<Vec<TeachingAssignment>, StoreError> {
            unimplemented!()
        }
    }

    fn record(subject: &str) -> AttendanceRecord {
        AttendanceRecord::new(RecordKey::new("2nd Year", "CS", "A", subject))
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    const INTERVAL: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn failed_cycle_keeps_cache_and_notifies_once() {
        let store = Scripted::new(vec![
            Ok(vec![record("Maths")]),
            Err(StoreError::Network("connection reset".into())),
            Ok(vec![record("Maths"), record("Physics")]),
        ]);
        let (notifier, mut notices) = Notifier::channel();
        let session = Arc::new(SessionContext::new("bearer", "teacher"));
        let sync = PollingSync::start(
            store.clone(),
            session,
            RecordFilter::default(),
            INTERVAL,
            notifier,
            RecordCache::default(),
        );
        let mut cache = sync.subscribe();

        // first cycle runs immediately
        cache.changed().await.unwrap();
        let before = sync.records();
        assert_eq!(before.len(), 1);

        // second cycle fails
        time::sleep(INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(sync.records(), before);

        let failures: Vec<_> = drain(&mut notices)
            .into_iter()
            .filter(|n| n.level == NoticeLevel::Error)
            .collect();
        assert_eq!(failures.len(), 1);

        // third cycle recovers
        cache.changed().await.unwrap();
        assert_eq!(sync.records().len(), 2);
        assert!(sync.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_polling_stops_fetching() {
        let store = Scripted::new(Vec::new());
        let (notifier, _notices) = Notifier::channel();
        let session = Arc::new(SessionContext::new("bearer", "teacher"));
        let sync = PollingSync::start(
            store.clone(),
            session,
            RecordFilter::default(),
            INTERVAL,
            notifier,
            RecordCache::default(),
        );

        time::sleep(Duration::from_secs(1)).await;
        let fetched = store.fetches.load(Ordering::SeqCst);
        assert_eq!(fetched, 1);

        sync.cancel();
        time::sleep(INTERVAL * 5).await;
        assert_eq!(store.fetches.load(Ordering::SeqCst), fetched);
    }

    #[tokio::test(start_paused = true)]
    async fn auth_failure_stops_polling_and_asks_for_reauth() {
        let store = Scripted::new(vec![Err(StoreError::Auth("expired".into()))]);
        let (notifier, mut notices) = Notifier::channel();
        let session = Arc::new(SessionContext::new("bearer", "teacher"));
        let sync = PollingSync::start(
            store.clone(),
            session.clone(),
            RecordFilter::default(),
            INTERVAL,
            notifier,
            RecordCache::default(),
        );

        time::sleep(INTERVAL * 3).await;
        assert!(!sync.is_running());
        assert!(!session.is_live());
        assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
        let levels: Vec<_> = drain(&mut notices).into_iter().map(|n| n.level).collect();
        assert_eq!(levels, vec![NoticeLevel::Reauth]);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_reports_success() {
        let store = Scripted::new(vec![Ok(vec![]), Ok(vec![record("Maths")])]);
        let (notifier, mut notices) = Notifier::channel();
        let session = Arc::new(SessionContext::new("bearer", "teacher"));
        let sync = PollingSync::start(
            store.clone(),
            session,
            RecordFilter::default(),
            INTERVAL,
            notifier,
            RecordCache::default(),
        );
        time::sleep(Duration::from_secs(1)).await;

        assert_eq!(sync.refresh_now().await.unwrap(), 1);
        assert_eq!(sync.records().len(), 1);
        assert!(drain(&mut notices)
            .iter()
            .any(|n| n.level == NoticeLevel::Success));
    }
}
