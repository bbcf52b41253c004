//! Action parsing and routing between the rate limiter and the passcode manager.

use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{Instrument, info_span};

use super::clock::Clock;
use super::config::PasscodeConfig;
use super::error::{Error, ValidationError};
use super::manager::{PasscodeManager, VerifyOutcome};
use super::notifier::Notifier;
use super::rate_limit::{RateLimitDecision, RateLimiter};
use super::store::Store;

static EMAIL_RE: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// A validated inbound action. `identity` is already normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Request { identity: String },
    Verify { identity: String, code: String },
}

impl Action {
    /// Build an action from raw request fields.
    ///
    /// A malformed identity is rejected before the action name is looked at, so both
    /// actions fail the same way. `resetpassword` and `verifypasscode` are accepted as
    /// older names for `request` and `verify`.
    ///
    /// # Errors
    /// Returns the first `ValidationError` found.
    pub fn parse(
        action: Option<&str>,
        email: Option<&str>,
        code: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let identity = email.map(normalize_email).filter(|email| !email.is_empty());
        if let Some(identity) = identity.as_deref()
            && !valid_email(identity)
        {
            return Err(ValidationError::InvalidIdentity);
        }

        let action = action.map(str::trim).filter(|action| !action.is_empty());
        match action {
            None => Err(ValidationError::MissingAction),
            Some("request" | "resetpassword") => {
                let identity = identity.ok_or(ValidationError::MissingIdentity)?;
                Ok(Self::Request { identity })
            }
            Some("verify" | "verifypasscode") => {
                let identity = identity.ok_or(ValidationError::MissingIdentity)?;
                let code = code
                    .map(str::trim)
                    .filter(|code| !code.is_empty())
                    .ok_or(ValidationError::MissingCode)?;
                Ok(Self::Verify {
                    identity,
                    code: code.to_string(),
                })
            }
            Some(other) => Err(ValidationError::UnknownAction(other.to_string())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Request { .. } => "request",
            Self::Verify { .. } => "verify",
        }
    }
}

/// What a handled action produced. Throttling and failed verification are outcomes,
/// not errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// A new passcode was stored and delivered.
    Issued,
    Throttled,
    Verified(VerifyOutcome),
}

/// Entry point for both actions. Holds no state of its own.
pub struct PasscodeService {
    limiter: RateLimiter,
    manager: PasscodeManager,
    store: Store,
}

impl PasscodeService {
    #[must_use]
    pub fn new(
        store: Store,
        config: &PasscodeConfig,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone(), clock.clone(), config),
            manager: PasscodeManager::new(store.clone(), clock, notifier, config),
            store,
        }
    }

    /// # Errors
    /// `Error::DeliveryFailed` when the notifier fails, `Error::Storage` on any database error.
    pub async fn dispatch(&self, action: Action) -> Result<Reply, Error> {
        let span = info_span!("passcode.dispatch", action = action.name());
        async move {
            match action {
                Action::Request { identity } => self.request(&identity).await,
                Action::Verify { identity, code } => self.verify(&identity, &code).await,
            }
        }
        .instrument(span)
        .await
    }

    /// Issue a passcode unless `identity` is throttled.
    ///
    /// # Errors
    /// `Error::DeliveryFailed` when the notifier fails, `Error::Storage` on any database error.
    pub async fn request(&self, identity: &str) -> Result<Reply, Error> {
        if self.limiter.check_and_log(identity).await? == RateLimitDecision::Throttled {
            return Ok(Reply::Throttled);
        }
        self.manager.issue(identity).await?;
        Ok(Reply::Issued)
    }

    /// Check `code` unless `identity` is throttled.
    ///
    /// # Errors
    /// Returns `Error::Storage` on any database error.
    pub async fn verify(&self, identity: &str, code: &str) -> Result<Reply, Error> {
        if self.limiter.check_and_log(identity).await? == RateLimitDecision::Throttled {
            return Ok(Reply::Throttled);
        }
        let outcome = self.manager.verify(identity, code).await?;
        Ok(Reply::Verified(outcome))
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_string()
}

fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

#[cfg(test)]
mod tests {
    use super::super::clock::ManualClock;
    use super::super::notifier::LogNotifier;
    use super::super::store;
    use super::*;
    use anyhow::{Result, anyhow};

    const START: i64 = 1_700_000_000;
    const CODE: &str = "55555";

    struct Fixture {
        service: PasscodeService,
        clock: Arc<ManualClock>,
    }

    async fn fixture(config: PasscodeConfig) -> Result<Fixture> {
        let store = Store::in_memory().await?;
        let clock = Arc::new(ManualClock::new(START));
        let config = config.with_code_range(55_555, 55_555);
        let service = PasscodeService::new(
            store,
            &config,
            clock.clone(),
            Arc::new(LogNotifier::default()),
        );
        Ok(Fixture { service, clock })
    }

    async fn passcode_rows(service: &PasscodeService, identity: &str) -> Result<Vec<store::PasscodeRecord>> {
        let mut conn = service.store().pool().acquire().await?;
        Ok(store::passcodes_for(&mut conn, identity).await?)
    }

    async fn log_rows(service: &PasscodeService, identity: &str) -> Result<i64> {
        let mut conn = service.store().pool().acquire().await?;
        Ok(store::count_requests(&mut conn, identity).await?)
    }

    fn request(identity: &str) -> Result<Action> {
        Action::parse(Some("request"), Some(identity), None).map_err(|err| anyhow!(err))
    }

    fn verify(identity: &str, code: &str) -> Result<Action> {
        Action::parse(Some("verify"), Some(identity), Some(code)).map_err(|err| anyhow!(err))
    }

    #[test]
    fn parse_request_trims_identity_and_keeps_case() {
        assert_eq!(
            Action::parse(Some("request"), Some("  A@Example.COM "), None),
            Ok(Action::Request {
                identity: "A@Example.COM".to_string()
            })
        );
    }

    #[test]
    fn parse_verify_trims_code() {
        assert_eq!(
            Action::parse(Some("verify"), Some("a@example.com"), Some(" 12345 ")),
            Ok(Action::Verify {
                identity: "a@example.com".to_string(),
                code: "12345".to_string()
            })
        );
    }

    #[test]
    fn parse_accepts_legacy_action_names() {
        assert!(matches!(
            Action::parse(Some("resetpassword"), Some("a@example.com"), None),
            Ok(Action::Request { .. })
        ));
        assert!(matches!(
            Action::parse(Some("verifypasscode"), Some("a@example.com"), Some("1")),
            Ok(Action::Verify { .. })
        ));
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert_eq!(
            Action::parse(None, Some("a@example.com"), None),
            Err(ValidationError::MissingAction)
        );
        assert_eq!(
            Action::parse(Some(" "), Some("a@example.com"), None),
            Err(ValidationError::MissingAction)
        );
        assert_eq!(
            Action::parse(Some("delete"), Some("a@example.com"), None),
            Err(ValidationError::UnknownAction("delete".to_string()))
        );
        assert_eq!(
            Action::parse(Some("request"), None, None),
            Err(ValidationError::MissingIdentity)
        );
        assert_eq!(
            Action::parse(Some("verify"), Some("   "), Some("12345")),
            Err(ValidationError::MissingIdentity)
        );
        assert_eq!(
            Action::parse(Some("verify"), Some("a@example.com"), None),
            Err(ValidationError::MissingCode)
        );
        assert_eq!(
            Action::parse(Some("verify"), Some("a@example.com"), Some("  ")),
            Err(ValidationError::MissingCode)
        );
    }

    #[test]
    fn invalid_identity_is_rejected_before_the_action() {
        for action in [None, Some("request"), Some("verify"), Some("bogus")] {
            assert_eq!(
                Action::parse(action, Some("not-an-email"), Some("12345")),
                Err(ValidationError::InvalidIdentity)
            );
        }
        assert_eq!(
            Action::parse(Some("request"), Some("a b@example.com"), None),
            Err(ValidationError::InvalidIdentity)
        );
    }

    #[test]
    fn email_shapes() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("first.last+tag@mail.example.org"));
        assert!(!valid_email("a@example"));
        assert!(!valid_email("@example.com"));
        assert!(!valid_email("a@@example.com"));
    }

    #[tokio::test]
    async fn repeated_requests_keep_one_passcode() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(10)).await?;

        for step in 0..4 {
            assert_eq!(fx.service.dispatch(request("a@example.com")?).await?, Reply::Issued);
            let rows = passcode_rows(&fx.service, "a@example.com").await?;
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].issued_at, START + step * 7);
            fx.clock.advance(7);
        }
        Ok(())
    }

    #[tokio::test]
    async fn throttled_request_mutates_nothing() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(3)).await?;

        for _ in 0..3 {
            assert_eq!(fx.service.dispatch(request("a@example.com")?).await?, Reply::Issued);
        }
        let before = passcode_rows(&fx.service, "a@example.com").await?;

        fx.clock.advance(5);
        assert_eq!(fx.service.dispatch(request("a@example.com")?).await?, Reply::Throttled);
        assert_eq!(
            fx.service.dispatch(verify("a@example.com", CODE)?).await?,
            Reply::Throttled
        );

        assert_eq!(passcode_rows(&fx.service, "a@example.com").await?, before);
        assert_eq!(log_rows(&fx.service, "a@example.com").await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn rapid_requests_throttle_after_threshold() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(2)).await?;

        assert_eq!(fx.service.request("a@example.com").await?, Reply::Issued);
        assert_eq!(fx.service.request("a@example.com").await?, Reply::Issued);
        assert_eq!(fx.service.request("a@example.com").await?, Reply::Throttled);
        Ok(())
    }

    #[tokio::test]
    async fn throttle_lifts_once_oldest_attempt_ages_out() -> Result<()> {
        let fx = fixture(
            PasscodeConfig::new()
                .with_backoff_threshold(2)
                .with_backoff_window_minutes(60),
        )
        .await?;

        fx.service.request("a@example.com").await?;
        fx.clock.advance(600);
        fx.service.request("a@example.com").await?;
        assert_eq!(fx.service.request("a@example.com").await?, Reply::Throttled);

        fx.clock.set(START + 3_601);
        assert_eq!(fx.service.request("a@example.com").await?, Reply::Issued);
        Ok(())
    }

    #[tokio::test]
    async fn request_then_verify_is_ok() -> Result<()> {
        let fx = fixture(PasscodeConfig::new()).await?;

        fx.service.dispatch(request("a@example.com")?).await?;
        assert_eq!(
            fx.service.dispatch(verify("a@example.com", CODE)?).await?,
            Reply::Verified(VerifyOutcome::Valid)
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_without_request_is_not_found() -> Result<()> {
        let fx = fixture(PasscodeConfig::new()).await?;

        assert_eq!(
            fx.service.dispatch(verify("a@example.com", "00000")?).await?,
            Reply::Verified(VerifyOutcome::NotFound)
        );
        Ok(())
    }

    #[tokio::test]
    async fn verify_after_expiry_is_expired() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_token_expiry_minutes(5)).await?;

        fx.service.request("a@example.com").await?;
        fx.clock.advance(5 * 60 + 1);
        assert_eq!(
            fx.service.verify("a@example.com", CODE).await?,
            Reply::Verified(VerifyOutcome::Expired)
        );
        Ok(())
    }

    #[tokio::test]
    async fn repeated_verify_stays_valid() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(10)).await?;

        fx.service.request("a@example.com").await?;
        let before = passcode_rows(&fx.service, "a@example.com").await?;
        for _ in 0..4 {
            assert_eq!(
                fx.service.verify("a@example.com", CODE).await?,
                Reply::Verified(VerifyOutcome::Valid)
            );
        }
        assert_eq!(passcode_rows(&fx.service, "a@example.com").await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn identities_differing_in_case_are_separate() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(1)).await?;

        assert_eq!(fx.service.dispatch(request("Alice@x.com")?).await?, Reply::Issued);
        assert_eq!(fx.service.dispatch(request("alice@x.com")?).await?, Reply::Issued);
        assert_eq!(log_rows(&fx.service, "Alice@x.com").await?, 1);
        assert_eq!(log_rows(&fx.service, "alice@x.com").await?, 1);
        assert_eq!(passcode_rows(&fx.service, "Alice@x.com").await?.len(), 1);
        assert_eq!(passcode_rows(&fx.service, "alice@x.com").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn verify_counts_against_the_limit() -> Result<()> {
        let fx = fixture(PasscodeConfig::new().with_backoff_threshold(2)).await?;

        fx.service.verify("a@example.com", "11111").await?;
        fx.service.verify("a@example.com", "22222").await?;
        assert_eq!(fx.service.request("a@example.com").await?, Reply::Throttled);
        assert!(passcode_rows(&fx.service, "a@example.com").await?.is_empty());
        Ok(())
    }
}
