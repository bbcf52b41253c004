//! Passcode lifetime, cleanup, and backoff settings.

use std::ops::RangeInclusive;

const DEFAULT_TOKEN_EXPIRY_MINUTES: u64 = 5;
const DEFAULT_REQUEST_LOG_CLEANUP_HOURS: u64 = 1;
const DEFAULT_BACKOFF_WINDOW_MINUTES: u64 = 60;
const DEFAULT_BACKOFF_THRESHOLD: u32 = 3;
const DEFAULT_CODE_MIN: u32 = 10_000;
const DEFAULT_CODE_MAX: u32 = 99_999;

#[derive(Clone, Debug)]
pub struct PasscodeConfig {
    token_expiry_minutes: u64,
    request_log_cleanup_hours: u64,
    backoff_window_minutes: u64,
    backoff_threshold: u32,
    code_min: u32,
    code_max: u32,
}

impl PasscodeConfig {
    /// Defaults: 5 minute passcodes, 1 hour request-log retention, and at most
    /// 3 accepted attempts per identity in a 60 minute window.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_expiry_minutes: DEFAULT_TOKEN_EXPIRY_MINUTES,
            request_log_cleanup_hours: DEFAULT_REQUEST_LOG_CLEANUP_HOURS,
            backoff_window_minutes: DEFAULT_BACKOFF_WINDOW_MINUTES,
            backoff_threshold: DEFAULT_BACKOFF_THRESHOLD,
            code_min: DEFAULT_CODE_MIN,
            code_max: DEFAULT_CODE_MAX,
        }
    }

    #[must_use]
    pub fn with_token_expiry_minutes(mut self, minutes: u64) -> Self {
        self.token_expiry_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_request_log_cleanup_hours(mut self, hours: u64) -> Self {
        self.request_log_cleanup_hours = hours;
        self
    }

    #[must_use]
    pub fn with_backoff_window_minutes(mut self, minutes: u64) -> Self {
        self.backoff_window_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_backoff_threshold(mut self, threshold: u32) -> Self {
        self.backoff_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_code_range(mut self, min: u32, max: u32) -> Self {
        self.code_min = min;
        self.code_max = max;
        self
    }

    /// Reject settings the service cannot run with.
    ///
    /// # Errors
    /// Returns a message when the code range is empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.code_min > self.code_max {
            return Err(format!(
                "code range is empty: min {} > max {}",
                self.code_min, self.code_max
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn token_expiry_seconds(&self) -> i64 {
        minutes_to_seconds(self.token_expiry_minutes)
    }

    #[must_use]
    pub fn request_log_cleanup_seconds(&self) -> i64 {
        minutes_to_seconds(self.request_log_cleanup_hours.saturating_mul(60))
    }

    #[must_use]
    pub fn backoff_window_seconds(&self) -> i64 {
        minutes_to_seconds(self.backoff_window_minutes)
    }

    #[must_use]
    pub fn backoff_threshold(&self) -> u32 {
        self.backoff_threshold
    }

    /// Inclusive passcode range. Never empty, even for a config that fails `validate`.
    #[must_use]
    pub fn code_range(&self) -> RangeInclusive<u32> {
        self.code_min.min(self.code_max)..=self.code_max.max(self.code_min)
    }
}

impl Default for PasscodeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn minutes_to_seconds(minutes: u64) -> i64 {
    i64::try_from(minutes.saturating_mul(60)).unwrap_or(i64::MAX)
}
