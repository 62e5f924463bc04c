use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Presence state of one student for one date column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
    Unset,
}

/// Composite key of an attendance sheet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct RecordKey {
    #[schema(example = "2nd Year")]
    pub year: String,
    #[schema(example = "CS")]
    pub branch: String,
    #[schema(example = "A")]
    pub division: String,
    #[schema(example = "Maths")]
    pub subject: String,
}

impl RecordKey {
    pub fn new(
        year: impl Into<String>,
        branch: impl Into<String>,
        division: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            year: year.into(),
            branch: branch.into(),
            division: division.into(),
            subject: subject.into(),
        }
    }
}

/// Any subset of the key fields; absent fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct RecordFilter {
    /// Filter by academic year
    pub year: Option<String>,
    /// Filter by branch
    pub branch: Option<String>,
    /// Filter by division
    pub division: Option<String>,
    /// Filter by subject
    pub subject: Option<String>,
}

impl RecordFilter {
    /// Filter that selects exactly one key.
    pub fn exact(key: &RecordKey) -> Self {
        Self {
            year: Some(key.year.clone()),
            branch: Some(key.branch.clone()),
            division: Some(key.division.clone()),
            subject: Some(key.subject.clone()),
        }
    }

    pub fn matches(&self, key: &RecordKey) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            want.as_deref().is_none_or(|w| w == have)
        }

        field(&self.year, &key.year)
            && field(&self.branch, &key.branch)
            && field(&self.division, &key.division)
            && field(&self.subject, &key.subject)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[schema(value_type = String)]
    pub id: Uuid,
    #[schema(example = "CS-A-01")]
    pub roll_no: String,
    #[schema(example = "Asha Patil")]
    pub name: String,
    /// Date key to status; a missing key means `unset`.
    #[serde(default, rename = "attendanceDates")]
    #[schema(value_type = Object)]
    pub presence: BTreeMap<NaiveDate, Status>,
}

impl Student {
    pub fn new(roll_no: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            roll_no: roll_no.into(),
            name: name.into(),
            presence: BTreeMap::new(),
        }
    }

    pub fn status(&self, date: NaiveDate) -> Status {
        self.presence.get(&date).copied().unwrap_or(Status::Unset)
    }

    pub fn set_status(&mut self, date: NaiveDate, status: Status) {
        match status {
            Status::Unset => {
                self.presence.remove(&date);
            }
            other => {
                self.presence.insert(date, other);
            }
        }
    }
}

/// One attendance sheet: a set of date columns and the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "_id")]
    #[schema(value_type = String)]
    pub id: Uuid,
    #[serde(flatten)]
    pub key: RecordKey,
    #[schema(value_type = Vec<String>, example = json!(["2024-01-01", "2024-01-02"]))]
    pub attendance_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub students: Vec<Student>,
}

impl AttendanceRecord {
    pub fn new(key: RecordKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            attendance_dates: BTreeSet::new(),
            students: Vec::new(),
        }
    }

    pub fn student(&self, roll_no: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.roll_no == roll_no)
    }

    /// Every presence key is also a date column.
    pub fn is_consistent(&self) -> bool {
        self.students.iter().all(|s| {
            s.presence
                .keys()
                .all(|d| self.attendance_dates.contains(d))
        })
    }

    fn matches_term(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        let subject = self.key.subject.to_lowercase();
        self.students.iter().any(|s| {
            s.name.to_lowercase().contains(&term)
                || s.roll_no.to_lowercase().contains(&term)
                || subject.contains(&term)
        })
    }
}

/// Records visible under `filter` whose roster matches `term`
/// (student name, roll number or subject, case-insensitive).
/// Records without students are never shown.
pub fn search<'a>(
    records: &'a [AttendanceRecord],
    filter: &RecordFilter,
    term: &str,
) -> Vec<&'a AttendanceRecord> {
    records
        .iter()
        .filter(|r| filter.matches(&r.key))
        .filter(|r| r.matches_term(term))
        .collect()
}

/// Slice removed by a date-column deletion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedColumns {
    pub dates: BTreeSet<NaiveDate>,
    /// Student id to the statuses it held on the removed dates.
    pub statuses: BTreeMap<Uuid, BTreeMap<NaiveDate, Status>>,
}

/// Full presence state of a record before a reset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSnapshot {
    pub dates: BTreeSet<NaiveDate>,
    pub presence: BTreeMap<Uuid, BTreeMap<NaiveDate, Status>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Delete,
    Reset,
}

/// Captured prior state that reverses one destructive mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionType", content = "originalData", rename_all = "lowercase")]
pub enum PreImage {
    Delete(RemovedColumns),
    Reset(RecordSnapshot),
}

impl PreImage {
    pub fn action_type(&self) -> ActionType {
        match self {
            PreImage::Delete(_) => ActionType::Delete,
            PreImage::Reset(_) => ActionType::Reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn record() -> AttendanceRecord {
        let mut record = AttendanceRecord::new(RecordKey::new("2nd Year", "CS", "A", "Maths"));
        record.attendance_dates.insert(date("2024-01-01"));
        let mut s = Student::new("CS-A-01", "Asha Patil");
        s.set_status(date("2024-01-01"), Status::Present);
        record.students.push(s);
        record
    }

    #[test]
    fn filter_absent_fields_match_all() {
        let key = RecordKey::new("2nd Year", "CS", "A", "Maths");
        assert!(RecordFilter::default().matches(&key));

        let by_branch = RecordFilter {
            branch: Some("CS".into()),
            ..Default::default()
        };
        assert!(by_branch.matches(&key));

        let other = RecordFilter {
            subject: Some("Physics".into()),
            ..Default::default()
        };
        assert!(!other.matches(&key));
    }

    #[test]
    fn unset_status_removes_key() {
        let mut s = Student::new("1", "A");
        let d = date("2024-01-01");
        s.set_status(d, Status::Absent);
        assert_eq!(s.status(d), Status::Absent);
        s.set_status(d, Status::Unset);
        assert!(s.presence.is_empty());
        assert_eq!(s.status(d), Status::Unset);
    }

    #[test]
    fn search_matches_name_roll_and_subject() {
        let records = vec![record(), AttendanceRecord::new(RecordKey::new("1st Year", "IT", "B", "Maths"))];
        let all = RecordFilter::default();

        assert_eq!(search(&records, &all, "asha").len(), 1);
        assert_eq!(search(&records, &all, "cs-a").len(), 1);
        // second record has no students, so it never shows
        assert_eq!(search(&records, &all, "maths").len(), 1);
        assert!(search(&records, &all, "nobody").is_empty());
    }

    #[test]
    fn record_wire_format() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["year"], "2nd Year");
        assert_eq!(json["attendanceDates"][0], "2024-01-01");
        assert_eq!(json["students"][0]["rollNo"], "CS-A-01");
        assert_eq!(json["students"][0]["attendanceDates"]["2024-01-01"], "present");
    }

    #[test]
    fn pre_image_is_adjacently_tagged() {
        let pre = PreImage::Reset(RecordSnapshot::default());
        let json = serde_json::to_value(&pre).unwrap();
        assert_eq!(json["actionType"], "reset");
        assert!(json["originalData"].is_object());
        assert_eq!(pre.action_type(), ActionType::Reset);
    }
}
