//! Presence tokens: issuance and the per-view expiry countdown.

mod clock;
mod issuer;

pub use clock::{Clock, Countdown, CountdownEvent, ExpiryClock, ManualClock, SystemClock, format_remaining};
pub use issuer::{ClassParams, SessionToken, SessionWindow, TokenError, TokenIssuer};
