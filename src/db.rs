//! In-memory record book backing the reference authority.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::attendance::{
    AttendanceRecord, PreImage, RecordFilter, RecordKey, RecordSnapshot, RemovedColumns, Status,
    Student,
};
use crate::model::teaching::TeachingAssignment;
use crate::store::{CreateRecord, MarkPresence};
use crate::token::SessionWindow;

/// (year, branch, division)
type ClassKey = (String, String, String);

fn class_of(key: &RecordKey) -> ClassKey {
    (key.year.clone(), key.branch.clone(), key.division.clone())
}

#[derive(Debug, Clone, Copy)]
struct OpenWindow {
    window: SessionWindow,
    date: NaiveDate,
}

#[derive(Default, Debug)]
struct BookState {
    records: Vec<AttendanceRecord>,
    windows: HashMap<RecordKey, OpenWindow>,
    teaching: HashMap<String, Vec<TeachingAssignment>>,
    rosters: HashMap<ClassKey, Vec<(String, String)>>,
}

impl BookState {
    fn record_mut(&mut self, id: Uuid) -> Result<&mut AttendanceRecord, StoreError> {
        self.records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::RecordNotFound(id))
    }
}

/// Authoritative attendance state. Concurrent destructive edits are
/// last-write-wins; there is no versioning.
#[derive(Default, Debug)]
pub struct RecordBook {
    state: RwLock<BookState>,
}

impl RecordBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent per (key, date). A new record starts from the enrolled
    /// roster of its class.
    pub async fn create_or_append(
        &self,
        request: &CreateRecord,
        today: NaiveDate,
    ) -> AttendanceRecord {
        let date = request.date.unwrap_or(today);
        let mut state = self.state.write().await;

        let idx = match state.records.iter().position(|r| r.key == request.key) {
            Some(idx) => idx,
            None => {
                let mut record = AttendanceRecord::new(request.key.clone());
                if let Some(roster) = state.rosters.get(&class_of(&request.key)) {
                    record.students = roster
                        .iter()
                        .map(|(roll_no, name)| Student::new(roll_no.clone(), name.clone()))
                        .collect();
                }
                info!(record_id = %record.id, subject = %request.key.subject, "Attendance record created");
                state.records.push(record);
                state.records.len() - 1
            }
        };

        if let Some(window) = request.session {
            state
                .windows
                .insert(request.key.clone(), OpenWindow { window, date });
        }

        let record = &mut state.records[idx];
        if record.attendance_dates.insert(date) {
            debug!(record_id = %record.id, %date, "Date column appended");
        }
        record.clone()
    }

    pub async fn records(&self, filter: &RecordFilter) -> Vec<AttendanceRecord> {
        self.state
            .read()
            .await
            .records
            .iter()
            .filter(|r| filter.matches(&r.key))
            .cloned()
            .collect()
    }

    /// Removes the listed columns and every status recorded on them.
    /// Dates that are not columns of the record are ignored, but at least
    /// one of them must be.
    pub async fn delete_date_columns(
        &self,
        record_id: Uuid,
        dates: &[NaiveDate],
    ) -> Result<RemovedColumns, StoreError> {
        if dates.is_empty() {
            return Err(StoreError::Rejected("No date columns selected".into()));
        }

        let mut state = self.state.write().await;
        let record = state.record_mut(record_id)?;

        if !dates.iter().any(|d| record.attendance_dates.contains(d)) {
            return Err(StoreError::Rejected(
                "None of the selected dates are columns of this record".into(),
            ));
        }

        let mut removed = RemovedColumns::default();
        for date in dates {
            if record.attendance_dates.remove(date) {
                removed.dates.insert(*date);
            }
        }

        for student in &mut record.students {
            let taken: std::collections::BTreeMap<_, _> = removed
                .dates
                .iter()
                .filter_map(|d| student.presence.remove(d).map(|s| (*d, s)))
                .collect();
            if !taken.is_empty() {
                removed.statuses.insert(student.id, taken);
            }
        }

        info!(%record_id, columns = removed.dates.len(), "Date columns deleted");
        Ok(removed)
    }

    /// Clears every presence map; roster and columns stay.
    pub async fn reset(&self, record_id: Uuid) -> Result<RecordSnapshot, StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(record_id)?;

        let snapshot = RecordSnapshot {
            dates: record.attendance_dates.clone(),
            presence: record
                .students
                .iter()
                .map(|s| (s.id, s.presence.clone()))
                .collect(),
        };
        for student in &mut record.students {
            student.presence.clear();
        }

        info!(%record_id, students = record.students.len(), "Attendance reset");
        Ok(snapshot)
    }

    /// Re-applies a captured pre-image. Best-effort: students that left the
    /// roster since capture are skipped, and nothing checks whether the
    /// record changed in between.
    pub async fn restore(&self, record_id: Uuid, pre_image: &PreImage) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let record = state.record_mut(record_id)?;

        match pre_image {
            PreImage::Delete(removed) => {
                record.attendance_dates.extend(removed.dates.iter().copied());
                for student in &mut record.students {
                    if let Some(statuses) = removed.statuses.get(&student.id) {
                        for (date, status) in statuses {
                            student.set_status(*date, *status);
                        }
                    }
                }
            }
            PreImage::Reset(snapshot) => {
                record.attendance_dates.extend(snapshot.dates.iter().copied());
                for student in &mut record.students {
                    if let Some(presence) = snapshot.presence.get(&student.id) {
                        student.presence = presence.clone();
                    }
                }
            }
        }

        info!(%record_id, action = ?pre_image.action_type(), "Action undone");
        Ok(())
    }

    /// Records a student scan. Freshness is judged against the window this
    /// book registered when the session was opened, never against the
    /// expiry shown in the scanned payload.
    pub async fn mark_presence(
        &self,
        scan: &MarkPresence,
        now: DateTime<Utc>,
    ) -> Result<NaiveDate, StoreError> {
        let mut state = self.state.write().await;

        let open = *state
            .windows
            .get(&scan.key)
            .ok_or_else(|| StoreError::Rejected("No open attendance session".into()))?;
        if open.window.token_id != scan.token_id {
            return Err(StoreError::Rejected("Session token superseded".into()));
        }
        if now >= open.window.expires_at {
            return Err(StoreError::Rejected("Session token expired".into()));
        }

        let record = state
            .records
            .iter_mut()
            .find(|r| r.key == scan.key)
            .ok_or_else(|| StoreError::Rejected("No attendance record for session".into()))?;
        record.attendance_dates.insert(open.date);

        let idx = match record.students.iter().position(|s| s.roll_no == scan.roll_no) {
            Some(idx) => idx,
            None => {
                record
                    .students
                    .push(Student::new(scan.roll_no.clone(), scan.name.clone()));
                record.students.len() - 1
            }
        };
        record.students[idx].set_status(open.date, Status::Present);

        debug!(record_id = %record.id, roll_no = %scan.roll_no, date = %open.date, "Presence marked");
        Ok(open.date)
    }

    pub async fn teaching_details(&self, username: &str) -> Vec<TeachingAssignment> {
        self.state
            .read()
            .await
            .teaching
            .get(username)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn assign_teaching(&self, username: &str, assignment: TeachingAssignment) {
        self.state
            .write()
            .await
            .teaching
            .entry(username.to_string())
            .or_default()
            .push(assignment);
    }

    /// Sets the roster new records of this class start with.
    pub async fn enroll(
        &self,
        year: &str,
        branch: &str,
        division: &str,
        students: Vec<(String, String)>,
    ) {
        self.state.write().await.rosters.insert(
            (year.to_string(), branch.to_string(), division.to_string()),
            students,
        );
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Seed {
    #[serde(default)]
    teaching: HashMap<String, Vec<TeachingAssignment>>,
    #[serde(default)]
    rosters: Vec<RosterSeed>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RosterSeed {
    year: String,
    branch: String,
    division: String,
    students: Vec<StudentSeed>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudentSeed {
    roll_no: String,
    name: String,
}

/// Builds the record book, seeding teaching assignments and rosters from
/// `seed_file` when one is configured.
pub async fn init_db(seed_file: Option<&Path>) -> anyhow::Result<RecordBook> {
    let book = RecordBook::new();
    let Some(path) = seed_file else {
        return Ok(book);
    };

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    let seed: Seed = serde_json::from_str(&raw)
        .with_context(|| format!("invalid seed file {}", path.display()))?;

    for (username, assignments) in seed.teaching {
        for assignment in assignments {
            book.assign_teaching(&username, assignment).await;
        }
    }
    let rosters = seed.rosters.len();
    for roster in seed.rosters {
        let students = roster
            .students
            .into_iter()
            .map(|s| (s.roll_no, s.name))
            .collect();
        book.enroll(&roster.year, &roster.branch, &roster.division, students)
            .await;
    }

    info!(rosters, "Record book seeded from {}", path.display());
    Ok(book)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn key() -> RecordKey {
        RecordKey::new("2nd Year", "CS", "A", "Maths")
    }

    fn create(d: &str) -> CreateRecord {
        CreateRecord {
            key: key(),
            date: Some(date(d)),
            session: None,
        }
    }

    #[tokio::test]
    async fn create_is_idempotent_per_date() {
        let book = RecordBook::new();
        let today = date("2024-01-01");

        let first = book.create_or_append(&create("2024-01-01"), today).await;
        let again = book.create_or_append(&create("2024-01-01"), today).await;
        let next = book.create_or_append(&create("2024-01-02"), today).await;

        assert_eq!(first.id, again.id);
        assert_eq!(again.attendance_dates.len(), 1);
        assert_eq!(next.attendance_dates.len(), 2);
        assert_eq!(book.records(&RecordFilter::default()).await.len(), 1);
    }

    #[tokio::test]
    async fn new_record_starts_from_enrolled_roster() {
        let book = RecordBook::new();
        book.enroll(
            "2nd Year",
            "CS",
            "A",
            vec![("1".into(), "Asha".into()), ("2".into(), "Ravi".into())],
        )
        .await;

        let record = book
            .create_or_append(&create("2024-01-01"), date("2024-01-01"))
            .await;
        assert_eq!(record.students.len(), 2);
        assert!(record.students.iter().all(|s| s.presence.is_empty()));
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let book = RecordBook::new();
        let id = Uuid::new_v4();
        assert_eq!(book.reset(id).await, Err(StoreError::RecordNotFound(id)));
    }

    #[tokio::test]
    async fn scans_are_checked_against_the_registered_window() {
        let book = RecordBook::new();
        let now = DateTime::from_timestamp(1_704_096_000, 0).unwrap();
        let window = SessionWindow {
            token_id: Uuid::new_v4(),
            expires_at: now + TimeDelta::minutes(5),
        };
        let mut request = create("2024-01-01");
        request.session = Some(window);
        book.create_or_append(&request, date("2024-01-01")).await;

        let scan = MarkPresence {
            token_id: window.token_id,
            key: key(),
            roll_no: "7".into(),
            name: "Meera".into(),
        };
        assert_eq!(book.mark_presence(&scan, now).await, Ok(date("2024-01-01")));

        let stale = MarkPresence {
            token_id: Uuid::new_v4(),
            ..scan.clone()
        };
        assert!(matches!(
            book.mark_presence(&stale, now).await,
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            book.mark_presence(&scan, now + TimeDelta::minutes(5)).await,
            Err(StoreError::Rejected(_))
        ));

        let records = book.records(&RecordFilter::exact(&key())).await;
        let student = records[0].student("7").unwrap();
        assert_eq!(student.status(date("2024-01-01")), Status::Present);
        assert!(records[0].is_consistent());
    }

    #[tokio::test]
    async fn seed_file_populates_teaching_and_rosters() {
        let path = std::env::temp_dir().join(format!("qrattend-seed-{}.json", Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"{
                "teaching": {"teacher": [{"year": "2nd Year", "branch": ["CS"], "division": ["A"], "subjects": ["Maths"]}]},
                "rosters": [{"year": "2nd Year", "branch": "CS", "division": "A",
                             "students": [{"rollNo": "1", "name": "Asha"}]}]
            }"#,
        )
        .await
        .unwrap();

        let book = init_db(Some(&path)).await.unwrap();
        tokio::fs::remove_file(&path).await.ok();

        assert_eq!(book.teaching_details("teacher").await.len(), 1);
        assert!(book.teaching_details("someone-else").await.is_empty());
        let record = book
            .create_or_append(&create("2024-01-01"), date("2024-01-01"))
            .await;
        assert_eq!(record.students[0].name, "Asha");
    }

    #[tokio::test]
    async fn unreadable_seed_file_fails_startup() {
        let path = std::env::temp_dir().join(format!("qrattend-missing-{}.json", Uuid::new_v4()));
        let err = init_db(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("failed to read seed file"));
    }
}
