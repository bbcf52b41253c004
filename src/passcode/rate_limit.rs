//! Per-identity sliding-window backoff over the persisted request log.
//!
//! A check first drops the identity's rows that fell out of the window, then
//! counts what is left. At or above the threshold the attempt is throttled and
//! nothing is logged; below it one row is appended for `now`. There is no
//! separate counter state: the surviving rows are the window.

use std::sync::Arc;
use tracing::{debug, info};

use super::clock::Clock;
use super::config::PasscodeConfig;
use super::store::{self, Store};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Clear,
    Throttled,
}

pub struct RateLimiter {
    store: Store,
    clock: Arc<dyn Clock>,
    window_seconds: i64,
    threshold: i64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Store, clock: Arc<dyn Clock>, config: &PasscodeConfig) -> Self {
        Self {
            store,
            clock,
            window_seconds: config.backoff_window_seconds(),
            threshold: i64::from(config.backoff_threshold()),
        }
    }

    /// Gate one action for `identity`, logging it when it is let through.
    ///
    /// # Errors
    /// Returns an error if any storage statement fails; the transaction is rolled back.
    pub async fn check_and_log(&self, identity: &str) -> Result<RateLimitDecision, sqlx::Error> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        store::delete_identity_requests_before(&mut tx, identity, self.cutoff(now)).await?;
        let attempts = store::count_requests(&mut tx, identity).await?;

        if attempts >= self.threshold {
            // Only the expired-row purge is kept; the throttled attempt is not logged.
            tx.commit().await?;
            info!(identity, attempts, "identity throttled");
            return Ok(RateLimitDecision::Throttled);
        }

        store::insert_request(&mut tx, identity, now).await?;
        tx.commit().await?;
        debug!(identity, attempts = attempts + 1, "attempt logged");

        Ok(RateLimitDecision::Clear)
    }

    /// Drop `identity`'s request-log rows that are older than the backoff window.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn purge_window(&self, identity: &str) -> Result<u64, sqlx::Error> {
        let cutoff = self.cutoff(self.clock.now());
        let mut conn = self.store.pool().acquire().await?;
        store::delete_identity_requests_before(&mut conn, identity, cutoff).await
    }

    fn cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.window_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::super::clock::ManualClock;
    use super::*;
    use anyhow::Result;

    const START: i64 = 1_700_000_000;

    async fn limiter(threshold: u32, window_minutes: u64) -> Result<(RateLimiter, Arc<ManualClock>)> {
        let store = Store::in_memory().await?;
        let clock = Arc::new(ManualClock::new(START));
        let config = PasscodeConfig::new()
            .with_backoff_threshold(threshold)
            .with_backoff_window_minutes(window_minutes);
        Ok((RateLimiter::new(store, clock.clone(), &config), clock))
    }

    async fn logged(limiter: &RateLimiter, identity: &str) -> Result<i64> {
        let mut conn = limiter.store.pool().acquire().await?;
        Ok(store::count_requests(&mut conn, identity).await?)
    }

    #[tokio::test]
    async fn throttles_at_threshold_without_logging() -> Result<()> {
        let (limiter, _clock) = limiter(3, 60).await?;

        for _ in 0..3 {
            assert_eq!(
                limiter.check_and_log("a@example.com").await?,
                RateLimitDecision::Clear
            );
        }
        assert_eq!(logged(&limiter, "a@example.com").await?, 3);

        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );
        assert_eq!(logged(&limiter, "a@example.com").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn identities_are_independent() -> Result<()> {
        let (limiter, _clock) = limiter(1, 60).await?;

        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Clear
        );
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );
        assert_eq!(
            limiter.check_and_log("b@example.com").await?,
            RateLimitDecision::Clear
        );
        Ok(())
    }

    #[tokio::test]
    async fn window_slides_open_again() -> Result<()> {
        let (limiter, clock) = limiter(2, 60).await?;

        limiter.check_and_log("a@example.com").await?;
        clock.advance(30 * 60);
        limiter.check_and_log("a@example.com").await?;
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );

        // A row exactly one window old is still inside it.
        clock.set(START + 60 * 60);
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );

        // One second later the first attempt has aged out.
        clock.set(START + 60 * 60 + 1);
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Clear
        );
        assert_eq!(logged(&limiter, "a@example.com").await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn zero_threshold_always_throttles() -> Result<()> {
        let (limiter, _clock) = limiter(0, 60).await?;
        assert_eq!(
            limiter.check_and_log("a@example.com").await?,
            RateLimitDecision::Throttled
        );
        assert_eq!(logged(&limiter, "a@example.com").await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn purge_window_is_callable_alone() -> Result<()> {
        let (limiter, clock) = limiter(3, 10).await?;

        limiter.check_and_log("a@example.com").await?;
        limiter.check_and_log("b@example.com").await?;
        clock.advance(11 * 60);

        assert_eq!(limiter.purge_window("a@example.com").await?, 1);
        assert_eq!(logged(&limiter, "a@example.com").await?, 0);
        assert_eq!(logged(&limiter, "b@example.com").await?, 1);
        Ok(())
    }
}
