use uuid::Uuid;

/// Failures surfaced by the attendance record store.
///
/// Only [`StoreError::Auth`] is fatal for the session; everything else is
/// reported and left for the user to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("attendance record {0} not found")]
    RecordNotFound(Uuid),

    #[error("request rejected: {0}")]
    Rejected(String),
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Auth(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        StoreError::Network(e.to_string())
    }
}
