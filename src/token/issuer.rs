use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use super::clock::{Clock, Countdown, CountdownEvent, ExpiryClock};
use crate::model::attendance::RecordKey;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("validity of {0} minutes cannot be represented")]
    ValidityOutOfRange(i64),
}

/// What the instructor selected before generating a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassParams {
    #[serde(flatten)]
    pub key: RecordKey,
    pub classroom: String,
}

impl ClassParams {
    pub fn new(key: RecordKey, classroom: impl Into<String>) -> Self {
        Self {
            key,
            classroom: classroom.into(),
        }
    }
}

/// Immutable, time-bounded presence token for one class session.
///
/// Serialised as camelCase JSON, this is the payload of the scannable code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    pub id: Uuid,
    #[serde(flatten)]
    pub class: ClassParams,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn key(&self) -> &RecordKey {
        &self.class.key
    }

    /// Date column this session writes to.
    pub fn date(&self) -> NaiveDate {
        self.issued_at.date_naive()
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn window(&self) -> SessionWindow {
        SessionWindow {
            token_id: self.id,
            expires_at: self.expires_at,
        }
    }
}

/// Scan window the authority enforces for a record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionWindow {
    #[schema(value_type = String)]
    pub token_id: Uuid,
    #[schema(value_type = String, format = "date-time")]
    pub expires_at: DateTime<Utc>,
}

struct Live {
    token: SessionToken,
    countdown: Countdown,
}

/// Issues tokens for one view and owns that view's single countdown.
pub struct TokenIssuer {
    clock: Arc<dyn Clock>,
    expiry: ExpiryClock,
    events: mpsc::UnboundedSender<CountdownEvent>,
    live: Option<Live>,
}

impl TokenIssuer {
    /// Returns the issuer and the stream its countdowns report on.
    pub fn new(
        clock: Arc<dyn Clock>,
        expiry: ExpiryClock,
    ) -> (Self, mpsc::UnboundedReceiver<CountdownEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let issuer = Self {
            clock,
            expiry,
            events,
            live: None,
        };
        (issuer, rx)
    }

    /// Issues a token valid for `validity_minutes` and starts its countdown,
    /// cancelling any countdown already running for this view.
    ///
    /// Non-positive validity yields a token that is already expired. A
    /// validity too large for a timestamp is refused and leaves the current
    /// token in place.
    pub fn issue(
        &mut self,
        class: ClassParams,
        validity_minutes: i64,
    ) -> Result<SessionToken, TokenError> {
        let issued_at = self.clock.now();
        let minutes = validity_minutes.max(0);
        let expires_at = TimeDelta::try_minutes(minutes)
            .and_then(|validity| issued_at.checked_add_signed(validity))
            .ok_or(TokenError::ValidityOutOfRange(validity_minutes))?;

        let token = SessionToken {
            id: Uuid::new_v4(),
            class,
            issued_at,
            expires_at,
        };

        let countdown = self
            .expiry
            .start(token.id, token.remaining_at(issued_at), self.events.clone())
            .ok_or(TokenError::ValidityOutOfRange(validity_minutes))?;
        self.withdraw();

        info!(
            token_id = %token.id,
            subject = %token.key().subject,
            minutes,
            "Session token issued"
        );

        self.live = Some(Live {
            token: token.clone(),
            countdown,
        });
        Ok(token)
    }

    pub fn current(&self) -> Option<&SessionToken> {
        self.live.as_ref().map(|l| &l.token)
    }

    /// Payload to display, or `None` when there is no token or it is past
    /// `expires_at`, even if the expiry event has not been processed yet.
    pub fn render(&self) -> Option<String> {
        let token = self.current()?;
        if !token.is_valid_at(self.clock.now()) {
            return None;
        }
        token.payload().ok()
    }

    /// Forgets the current token and cancels its countdown.
    pub fn withdraw(&mut self) -> Option<SessionToken> {
        self.live.take().map(|l| {
            l.countdown.cancel();
            l.token
        })
    }

    /// Filters countdown events: anything not for the current token is
    /// dropped. An `Expired` event retires the current token.
    pub fn accept(&mut self, event: CountdownEvent) -> Option<CountdownEvent> {
        let current = self.current()?.id;
        if event.token_id() != current {
            return None;
        }
        if matches!(event, CountdownEvent::Expired { .. }) {
            self.live = None;
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::clock::ManualClock;

    fn class() -> ClassParams {
        ClassParams::new(RecordKey::new("2nd Year", "CS", "A", "Maths"), "B-204")
    }

    fn issuer() -> (
        TokenIssuer,
        mpsc::UnboundedReceiver<CountdownEvent>,
        Arc<ManualClock>,
    ) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_704_096_000, 0).unwrap(),
        ));
        let (issuer, rx) = TokenIssuer::new(clock.clone(), ExpiryClock::new(Duration::from_secs(1)));
        (issuer, rx, clock)
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_is_validity_after_issue() {
        let (mut issuer, _rx, _clock) = issuer();
        for minutes in [1, 5, 45, 1440, 2000, 60 * 24 * 30] {
            let token = issuer.issue(class(), minutes).unwrap();
            assert_eq!(token.expires_at - token.issued_at, TimeDelta::minutes(minutes));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_validity_is_refused() {
        let (mut issuer, _rx, _clock) = issuer();
        let live = issuer.issue(class(), 5).unwrap();

        assert_eq!(
            issuer.issue(class(), i64::MAX),
            Err(TokenError::ValidityOutOfRange(i64::MAX))
        );
        assert_eq!(issuer.current(), Some(&live));
    }

    #[tokio::test(start_paused = true)]
    async fn non_positive_validity_is_already_expired() {
        let (mut issuer, mut rx, _clock) = issuer();
        let token = issuer.issue(class(), -3).unwrap();

        assert_eq!(token.expires_at, token.issued_at);
        assert!(issuer.render().is_none());

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev, CountdownEvent::Expired { token_id: token.id });
        assert!(issuer.accept(ev).is_some());
        assert!(issuer.current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn reissue_supersedes_previous_countdown() {
        let (mut issuer, mut rx, _clock) = issuer();
        let first = issuer.issue(class(), 1).unwrap();
        let second = issuer.issue(class(), 2).unwrap();

        let mut expired = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let Some(CountdownEvent::Expired { token_id }) = issuer.accept(ev.clone()) {
                expired.push(token_id);
            }
            if let CountdownEvent::Expired { token_id } = ev {
                assert_ne!(token_id, first.id, "superseded countdown fired");
                break;
            }
        }
        assert_eq!(expired, vec![second.id]);
    }

    #[tokio::test(start_paused = true)]
    async fn render_hides_token_past_expiry_before_event_lands() {
        let (mut issuer, _rx, clock) = issuer();
        let token = issuer.issue(class(), 5).unwrap();

        let payload = issuer.render().unwrap();
        let decoded: SessionToken = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, token);

        clock.advance(Duration::from_secs(5 * 60));
        assert!(issuer.current().is_some());
        assert!(issuer.render().is_none());
    }

    #[test]
    fn payload_uses_camel_case_fields() {
        let token = SessionToken {
            id: Uuid::nil(),
            class: class(),
            issued_at: DateTime::from_timestamp(0, 0).unwrap(),
            expires_at: DateTime::from_timestamp(300, 0).unwrap(),
        };
        let json: serde_json::Value = serde_json::from_str(&token.payload().unwrap()).unwrap();
        assert_eq!(json["subject"], "Maths");
        assert_eq!(json["classroom"], "B-204");
        assert!(json.get("expiresAt").is_some());
    }
}
