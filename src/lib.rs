//! # Passgate (password reset passcodes)
//!
//! `passgate` issues short-lived numeric one-time passcodes for a password
//! reset flow and verifies them, throttling each email address with a
//! sliding-window backoff built on a persisted request log.
//!
//! ## Actions
//!
//! A single `POST /` endpoint takes an `action` form field:
//!
//! - **`request`** draws a fresh passcode for `email`, replacing any previous
//!   one, and hands it to the notifier. The passcode is never echoed back.
//! - **`verify`** checks `email` + `code` against the stored passcode and
//!   reports `ok`, `no code`, or `expired`.
//!
//! Both actions pass through the same rate limiter. A throttled identity gets
//! `{"throttled": true}` and nothing is written for that attempt.
//!
//! ## Storage
//!
//! State lives in a SQLite file with two tables, `passcodes` (one row per
//! identity) and `request_log` (one row per accepted attempt). Expired rows
//! are purged lazily by the request path; there is no background task.

pub mod api;
pub mod cli;
pub mod passcode;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
