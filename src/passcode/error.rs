use thiserror::Error;

/// Malformed or missing request input. Nothing is written when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing action parameter")]
    MissingAction,
    #[error("Invalid action")]
    UnknownAction(String),
    #[error("Missing email parameter")]
    MissingIdentity,
    #[error("Invalid email")]
    InvalidIdentity,
    #[error("Missing code parameter")]
    MissingCode,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The passcode was stored but the notifier could not deliver it.
    #[error("message could not be sent")]
    DeliveryFailed(#[source] anyhow::Error),
    #[error("storage failure")]
    Storage(#[from] sqlx::Error),
}
