//! Passcode issuance and verification.
//!
//! The manager owns the `passcodes` table. Callers are expected to have passed
//! the rate limiter already; nothing here checks the request log.

use rand::Rng;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tracing::{Span, error, info};

use super::clock::Clock;
use super::config::PasscodeConfig;
use super::error::Error;
use super::notifier::Notifier;
use super::store::{self, Store};

/// Numeric passcode drawn from the configured range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Passcode(u32);

impl Passcode {
    #[must_use]
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    /// Uniform draw from `range` (inclusive on both ends).
    #[must_use]
    pub fn draw(range: RangeInclusive<u32>) -> Self {
        Self(rand::thread_rng().gen_range(range))
    }

    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Passcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    NotFound,
    Expired,
}

pub struct PasscodeManager {
    store: Store,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    expiry_seconds: i64,
    cleanup_seconds: i64,
    code_range: RangeInclusive<u32>,
}

impl PasscodeManager {
    #[must_use]
    pub fn new(
        store: Store,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: &PasscodeConfig,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            expiry_seconds: config.token_expiry_seconds(),
            cleanup_seconds: config.request_log_cleanup_seconds(),
            code_range: config.code_range(),
        }
    }

    /// Replace `identity`'s passcode with a fresh one and deliver it.
    ///
    /// The new row is committed before delivery, so it stays in place even when
    /// the notifier fails.
    ///
    /// # Errors
    /// `Error::Storage` if the replace fails, `Error::DeliveryFailed` if the notifier does.
    pub async fn issue(&self, identity: &str) -> Result<Passcode, Error> {
        let code = Passcode::draw(self.code_range.clone());
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        store::delete_passcode(&mut tx, identity).await?;
        store::insert_passcode(&mut tx, identity, &code.to_string(), now).await?;
        tx.commit().await?;

        info!(identity, "passcode issued");

        // Transports may block; keep them off the async workers.
        let notifier = Arc::clone(&self.notifier);
        let recipient = identity.to_string();
        let span = Span::current();
        let delivered =
            tokio::task::spawn_blocking(move || span.in_scope(|| notifier.deliver(&recipient, &code)))
                .await
                .map_err(anyhow::Error::from)
                .and_then(|result| result);
        delivered.map_err(|err| {
            error!(identity, "Failed to deliver passcode: {err:#}");
            Error::DeliveryFailed(err)
        })?;

        Ok(code)
    }

    /// Check `submitted` against `identity`'s passcode. Never deletes the passcode.
    ///
    /// # Errors
    /// Returns `Error::Storage` if the purge or the lookup fails.
    pub async fn verify(&self, identity: &str, submitted: &str) -> Result<VerifyOutcome, Error> {
        self.purge_request_log().await?;

        let now = self.clock.now();
        let mut conn = self.store.pool().acquire().await?;
        let outcome = match store::find_passcode(&mut conn, identity, submitted).await? {
            None => VerifyOutcome::NotFound,
            Some(record) if now.saturating_sub(record.issued_at) > self.expiry_seconds => {
                VerifyOutcome::Expired
            }
            Some(_) => VerifyOutcome::Valid,
        };

        info!(identity, outcome = ?outcome, "passcode verified");

        Ok(outcome)
    }

    /// Drop request-log rows of every identity older than the cleanup horizon.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge_request_log(&self) -> Result<u64, sqlx::Error> {
        let cutoff = self.clock.now().saturating_sub(self.cleanup_seconds);
        let mut conn = self.store.pool().acquire().await?;
        store::delete_requests_before(&mut conn, cutoff).await
    }
}
