//! Password-reset passcodes with per-identity backoff.
//!
//! Flow summary:
//! - `request`: the rate limiter logs the attempt (or throttles it), then the manager
//!   replaces the identity's passcode and hands it to the notifier.
//! - `verify`: the rate limiter logs the attempt (or throttles it), then the manager
//!   compares the submitted code and its age against the stored one.
//!
//! Expired request-log rows are purged lazily: the limiter trims the caller's window on
//! every check and verification trims every identity past the cleanup horizon. Both
//! purges are also exposed as standalone methods.

mod clock;
mod config;
mod dispatch;
mod error;
mod manager;
mod notifier;
mod rate_limit;
mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PasscodeConfig;
pub use dispatch::{Action, PasscodeService, Reply};
pub use error::{Error, ValidationError};
pub use manager::{Passcode, PasscodeManager, VerifyOutcome};
pub use notifier::{LogNotifier, MailTemplate, Notifier, PasscodeMessage};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use store::{PasscodeRecord, Store};
