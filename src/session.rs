use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::StoreError;

/// Bearer credential of the signed-in instructor.
///
/// Created once login succeeds and handed explicitly to every store call.
/// After [`SessionContext::invalidate`] every call fails fast with
/// [`StoreError::Auth`] and the user has to sign in again.
#[derive(Debug)]
pub struct SessionContext {
    bearer: String,
    username: String,
    live: AtomicBool,
}

impl SessionContext {
    pub fn new(bearer: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            bearer: bearer.into(),
            username: username.into(),
            live: AtomicBool::new(true),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// The bearer token, or `Auth` once the session was invalidated.
    pub fn credential(&self) -> Result<&str, StoreError> {
        if self.is_live() {
            Ok(&self.bearer)
        } else {
            Err(StoreError::Auth("session is no longer valid".into()))
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Logout or credential expiry.
    pub fn invalidate(&self) {
        if self.live.swap(false, Ordering::AcqRel) {
            tracing::info!(username = %self.username, "Session invalidated");
        }
    }
}
