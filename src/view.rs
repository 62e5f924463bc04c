//! One instructor view: token display, record sheet, and the controls on it.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::model::attendance::{AttendanceRecord, RecordFilter, search};
use crate::model::teaching::TeachingAssignment;
use crate::notice::{Notice, Notifier};
use crate::session::SessionContext;
use crate::store::{CreateRecord, HttpStore, RecordStore};
use crate::sync::{PollingSync, RecordCache};
use crate::token::{
    ClassParams, Clock, CountdownEvent, ExpiryClock, SessionToken, TokenIssuer, format_remaining,
};
use crate::undo::{EditOutcome, UndoController, UndoOutcome};

#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub poll_interval: Duration,
    pub countdown_tick: Duration,
    pub default_validity_minutes: i64,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            countdown_tick: Duration::from_secs(1),
            default_validity_minutes: 5,
        }
    }
}

impl From<&Config> for ViewSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            countdown_tick: config.countdown_tick(),
            default_validity_minutes: config.default_validity_minutes,
        }
    }
}

/// Owns at most one countdown and at most one polling task; dropping the
/// view cancels both.
pub struct AttendanceView<S: RecordStore + 'static> {
    store: Arc<S>,
    session: Arc<SessionContext>,
    notifier: Notifier,
    settings: ViewSettings,
    issuer: TokenIssuer,
    countdown: mpsc::UnboundedReceiver<CountdownEvent>,
    remaining: Option<Duration>,
    undo: UndoController,
    polling: Option<PollingSync<S>>,
    record: Option<AttendanceRecord>,
}

impl AttendanceView<HttpStore> {
    /// View talking to the authority at `config.authority_url`.
    pub fn connect(
        config: &Config,
        session: Arc<SessionContext>,
        clock: Arc<dyn Clock>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Notice>), StoreError> {
        let store = Arc::new(HttpStore::from_config(config)?);
        Ok(Self::new(store, session, clock, ViewSettings::from(config)))
    }
}

impl<S: RecordStore + 'static> AttendanceView<S> {
    /// Returns the view and the stream of notices it emits.
    pub fn new(
        store: Arc<S>,
        session: Arc<SessionContext>,
        clock: Arc<dyn Clock>,
        settings: ViewSettings,
    ) -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (notifier, notices) = Notifier::channel();
        let (issuer, countdown) = TokenIssuer::new(clock, ExpiryClock::new(settings.countdown_tick));
        let view = Self {
            store,
            session,
            notifier,
            settings,
            issuer,
            countdown,
            remaining: None,
            undo: UndoController::new(),
            polling: None,
            record: None,
        };
        (view, notices)
    }

    /// Record created or appended by the last successful `take_attendance`.
    pub fn current_record(&self) -> Option<&AttendanceRecord> {
        self.record.as_ref()
    }

    fn fail(&mut self, error: StoreError, message: &str) {
        if error.is_fatal() {
            self.session.invalidate();
            self.polling = None;
            self.notifier
                .reauth("Your session has expired. Please log in again.");
        } else {
            self.notifier.error(message);
        }
    }

    pub async fn teaching_details(&mut self) -> Option<Vec<TeachingAssignment>> {
        match self.store.teaching_details(&self.session).await {
            Ok(details) => Some(details),
            Err(e) => {
                self.fail(e, "Failed to fetch teaching details");
                None
            }
        }
    }

    /// Issues a token for `class`, then opens the session at the authority.
    /// If the authority refuses, the token is withdrawn so nothing stale is
    /// left on screen.
    #[instrument(skip(self, class), fields(subject = %class.key.subject))]
    pub async fn take_attendance(
        &mut self,
        class: ClassParams,
        validity_minutes: Option<i64>,
    ) -> Option<SessionToken> {
        let minutes = validity_minutes.unwrap_or(self.settings.default_validity_minutes);
        let token = match self.issuer.issue(class, minutes) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Session token refused");
                self.notifier.error("Invalid QR code validity");
                return None;
            }
        };
        self.remaining = Some(token.remaining_at(token.issued_at));

        let request = CreateRecord {
            key: token.key().clone(),
            date: Some(token.date()),
            session: Some(token.window()),
        };

        match self
            .store
            .create_or_append_record(&self.session, &request)
            .await
        {
            Ok(record) => {
                info!(record_id = %record.id, "Attendance session opened");
                self.record = Some(record);
                self.notifier
                    .success("Attendance record created/updated successfully");
                Some(token)
            }
            Err(e) => {
                self.issuer.withdraw();
                self.remaining = None;
                self.fail(e, "Failed to create/update attendance record");
                None
            }
        }
    }

    /// Payload for the scannable code, `None` once expired.
    pub fn token_payload(&self) -> Option<String> {
        self.issuer.render()
    }

    pub fn current_token(&self) -> Option<&SessionToken> {
        self.issuer.current()
    }

    /// Remaining time as `m:ss`.
    pub fn time_left(&self) -> Option<String> {
        self.remaining.map(format_remaining)
    }

    /// Waits for the next countdown event of the current token; events of
    /// superseded tokens are discarded.
    pub async fn next_countdown_event(&mut self) -> Option<CountdownEvent> {
        loop {
            let event = self.countdown.recv().await?;
            let Some(event) = self.issuer.accept(event) else {
                continue;
            };
            match &event {
                CountdownEvent::Tick { remaining, .. } => self.remaining = Some(*remaining),
                CountdownEvent::Expired { .. } => {
                    self.remaining = Some(Duration::ZERO);
                    self.notifier.error("QR code has expired!");
                }
            }
            return Some(event);
        }
    }

    /// Starts polling the records under `filter`, replacing any poller
    /// already running for this view. Until the first fetch lands the cache
    /// holds only the already-known records that match `filter`.
    pub fn show_records(&mut self, filter: RecordFilter) {
        let initial: Vec<AttendanceRecord> = self
            .records()
            .iter()
            .filter(|r| filter.matches(&r.key))
            .cloned()
            .collect();
        self.polling = None;
        self.polling = Some(PollingSync::start(
            self.store.clone(),
            self.session.clone(),
            filter,
            self.settings.poll_interval,
            self.notifier.clone(),
            Arc::new(initial),
        ));
    }

    /// Leaves the records screen; its poller stops.
    pub fn close_records(&mut self) {
        if let Some(polling) = self.polling.take() {
            polling.cancel();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling.as_ref().is_some_and(|p| p.is_running())
    }

    pub fn records(&self) -> RecordCache {
        self.polling
            .as_ref()
            .map(|p| p.records())
            .unwrap_or_default()
    }

    /// Cached records matching a free-text search.
    pub fn search(&self, term: &str) -> Vec<AttendanceRecord> {
        let records = self.records();
        let filter = self
            .polling
            .as_ref()
            .map(|p| p.filter().clone())
            .unwrap_or_default();
        search(&records, &filter, term)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The reload control.
    pub async fn refresh(&mut self) {
        let Some(polling) = &self.polling else {
            return;
        };
        if let Err(e) = polling.refresh_now().await {
            if e.is_fatal() {
                self.polling = None;
            }
        }
    }

    async fn resync(&mut self) {
        if let Some(polling) = &self.polling {
            if let Err(e) = polling.resync().await {
                if e.is_fatal() {
                    self.polling = None;
                }
            }
        }
    }

    pub async fn delete_columns(
        &mut self,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> Option<EditOutcome> {
        let result = self
            .undo
            .delete_columns(self.store.as_ref(), &self.session, record_id, dates)
            .await;
        match result {
            Ok(EditOutcome::NothingSelected) => Some(EditOutcome::NothingSelected),
            Ok(outcome) => {
                self.notifier.success("Selected items deleted");
                self.resync().await;
                Some(outcome)
            }
            Err(e) => {
                self.fail(e, "Failed to delete items");
                None
            }
        }
    }

    pub async fn reset(&mut self, record_id: Uuid) -> Option<EditOutcome> {
        let result = self
            .undo
            .reset(self.store.as_ref(), &self.session, record_id)
            .await;
        match result {
            Ok(outcome) => {
                self.notifier.success("Attendance sheet reset");
                self.resync().await;
                Some(outcome)
            }
            Err(e) => {
                self.fail(e, "Failed to reset attendance");
                None
            }
        }
    }

    pub async fn undo(&mut self) -> Option<UndoOutcome> {
        let result = self.undo.undo(self.store.as_ref(), &self.session).await;
        match result {
            Ok(UndoOutcome::NothingToUndo) => {
                self.notifier.warning("Nothing to undo");
                Some(UndoOutcome::NothingToUndo)
            }
            Ok(outcome) => {
                self.notifier.success("Action undone successfully");
                self.resync().await;
                Some(outcome)
            }
            Err(e) => {
                self.fail(e, "Failed to undo action");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;
    use crate::db::RecordBook;
    use crate::model::attendance::RecordKey;
    use crate::notice::NoticeLevel;
    use crate::store::InProcessStore;
    use crate::token::ManualClock;

    fn class() -> ClassParams {
        ClassParams::new(RecordKey::new("2nd Year", "CS", "A", "Maths"), "B-204")
    }

    fn view(
        session: Arc<SessionContext>,
    ) -> (
        AttendanceView<InProcessStore>,
        mpsc::UnboundedReceiver<Notice>,
        Arc<ManualClock>,
    ) {
        let store = Arc::new(InProcessStore::new(Arc::new(RecordBook::new())));
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_704_096_000, 0).unwrap(),
        ));
        let (view, notices) = AttendanceView::new(store, session, clock.clone(), ViewSettings::default());
        (view, notices, clock)
    }

    fn levels(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<NoticeLevel> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n.level);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn take_attendance_opens_record_and_counts_down() {
        let (mut view, mut notices, _clock) =
            view(Arc::new(SessionContext::new("bearer", "teacher")));

        let token = view.take_attendance(class(), Some(1)).await.unwrap();
        assert_eq!(view.time_left().as_deref(), Some("1:00"));
        assert!(view.token_payload().is_some());

        let record = view.current_record().unwrap();
        assert!(record.attendance_dates.contains(&token.date()));

        let mut expired = 0;
        while let Some(ev) = view.next_countdown_event().await {
            if matches!(ev, CountdownEvent::Expired { .. }) {
                expired += 1;
                break;
            }
        }
        assert_eq!(expired, 1);
        assert_eq!(view.time_left().as_deref(), Some("0:00"));
        assert!(view.current_token().is_none());
        assert_eq!(levels(&mut notices), vec![NoticeLevel::Success, NoticeLevel::Error]);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_session_withdraws_token() {
        let session = Arc::new(SessionContext::new("bearer", "teacher"));
        session.invalidate();
        let (mut view, mut notices, _clock) = view(session);

        assert!(view.take_attendance(class(), Some(5)).await.is_none());
        assert!(view.current_token().is_none());
        assert!(view.token_payload().is_none());
        assert_eq!(levels(&mut notices), vec![NoticeLevel::Reauth]);
    }

    #[tokio::test(start_paused = true)]
    async fn undo_with_nothing_armed_warns() {
        let (mut view, mut notices, _clock) =
            view(Arc::new(SessionContext::new("bearer", "teacher")));

        assert_eq!(view.undo().await, Some(UndoOutcome::NothingToUndo));
        assert_eq!(levels(&mut notices), vec![NoticeLevel::Warning]);
    }

    #[tokio::test(start_paused = true)]
    async fn edits_resync_the_records_screen() {
        let (mut view, _notices, _clock) =
            view(Arc::new(SessionContext::new("bearer", "teacher")));
        let token = view.take_attendance(class(), Some(5)).await.unwrap();
        let record_id = view.current_record().unwrap().id;

        view.show_records(RecordFilter::exact(token.key()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(view.records().len(), 1);

        view.delete_columns(record_id, &[token.date()]).await.unwrap();
        assert!(view.records()[0].attendance_dates.is_empty());

        view.undo().await.unwrap();
        assert!(view.records()[0].attendance_dates.contains(&token.date()));

        view.close_records();
        assert!(!view.is_polling());
        assert!(view.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn narrowing_the_filter_hides_other_subjects_at_once() {
        let (mut view, _notices, _clock) =
            view(Arc::new(SessionContext::new("bearer", "teacher")));
        let physics = ClassParams::new(RecordKey::new("2nd Year", "CS", "A", "Physics"), "B-204");
        view.take_attendance(physics, Some(5)).await.unwrap();
        view.take_attendance(class(), Some(5)).await.unwrap();

        view.show_records(RecordFilter::default());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(view.records().len(), 2);

        view.show_records(RecordFilter {
            subject: Some("Maths".into()),
            ..Default::default()
        });
        let seeded = view.records();
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].key.subject, "Maths");

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(view.records().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn replacing_the_records_screen_keeps_one_poller() {
        let (mut view, _notices, _clock) =
            view(Arc::new(SessionContext::new("bearer", "teacher")));

        view.show_records(RecordFilter::default());
        view.show_records(RecordFilter {
            subject: Some("Maths".into()),
            ..Default::default()
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(view.is_polling());
        assert!(view.search("anything").is_empty());
    }
}
