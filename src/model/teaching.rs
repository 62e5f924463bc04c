use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attendance::RecordKey;

/// Classes one instructor teaches within a year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TeachingAssignment {
    #[schema(example = "2nd Year")]
    pub year: String,
    #[schema(example = json!(["CS", "IT"]))]
    pub branch: Vec<String>,
    #[schema(example = json!(["A", "B"]))]
    pub division: Vec<String>,
    #[schema(example = json!(["Maths"]))]
    pub subjects: Vec<String>,
}

impl TeachingAssignment {
    pub fn covers(&self, key: &RecordKey) -> bool {
        self.year == key.year
            && self.branch.contains(&key.branch)
            && self.division.contains(&key.division)
            && self.subjects.contains(&key.subject)
    }
}

/// Distinct years, in first-seen order.
pub fn years(details: &[TeachingAssignment]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for d in details {
        if !out.contains(&d.year.as_str()) {
            out.push(&d.year);
        }
    }
    out
}

/// Distinct branches taught in `year`.
pub fn branches<'a>(details: &'a [TeachingAssignment], year: &str) -> Vec<&'a str> {
    let mut out: Vec<&str> = Vec::new();
    for b in details
        .iter()
        .filter(|d| d.year == year)
        .flat_map(|d| d.branch.iter())
    {
        if !out.contains(&b.as_str()) {
            out.push(b);
        }
    }
    out
}

fn assignment<'a>(
    details: &'a [TeachingAssignment],
    year: &str,
    branch: &str,
) -> Option<&'a TeachingAssignment> {
    details
        .iter()
        .find(|d| d.year == year && d.branch.iter().any(|b| b == branch))
}

pub fn divisions<'a>(details: &'a [TeachingAssignment], year: &str, branch: &str) -> &'a [String] {
    assignment(details, year, branch)
        .map(|d| d.division.as_slice())
        .unwrap_or_default()
}

pub fn subjects<'a>(details: &'a [TeachingAssignment], year: &str, branch: &str) -> &'a [String] {
    assignment(details, year, branch)
        .map(|d| d.subjects.as_slice())
        .unwrap_or_default()
}
