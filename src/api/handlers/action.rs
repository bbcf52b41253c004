use crate::passcode::{Action, Error, PasscodeService, Reply, VerifyOutcome};
use axum::{
    extract::{Extension, Form, rejection::FormRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

/// Form fields posted by the reset page.
#[derive(ToSchema, Deserialize, Debug, Default)]
pub struct ActionRequest {
    /// `request` or `verify`
    action: Option<String>,
    email: Option<String>,
    /// Passcode, only read by `verify`
    code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ActionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    throttled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ActionResponse {
    fn throttled(throttled: bool) -> Self {
        Self {
            throttled: Some(throttled),
            ok: None,
            error: None,
        }
    }

    fn verified(outcome: VerifyOutcome) -> Self {
        let error = match outcome {
            VerifyOutcome::Valid => None,
            VerifyOutcome::NotFound => Some("no code".to_string()),
            VerifyOutcome::Expired => Some("expired".to_string()),
        };
        Self {
            throttled: None,
            ok: Some(outcome == VerifyOutcome::Valid),
            error,
        }
    }
}

impl From<Reply> for ActionResponse {
    fn from(reply: Reply) -> Self {
        match reply {
            Reply::Issued => Self::throttled(false),
            Reply::Throttled => Self::throttled(true),
            Reply::Verified(outcome) => Self::verified(outcome),
        }
    }
}

#[utoipa::path(
    post,
    path= "/",
    request_body(content = ActionRequest, content_type = "application/x-www-form-urlencoded"),
    responses (
        (status = 200, description = "Passcode issued, attempt throttled, or verification result", body = ActionResponse),
        (status = 400, description = "Missing or invalid action, email, or code", body = String),
        (status = 500, description = "Passcode could not be delivered or storage failed", body = String),
    ),
    tag= "passcode"
)]
// axum handler for both passcode actions
pub async fn action(
    service: Extension<Arc<PasscodeService>>,
    payload: Result<Form<ActionRequest>, FormRejection>,
) -> impl IntoResponse {
    // A body that is not a form carries none of the fields.
    let request = match payload {
        Ok(Form(request)) => request,
        Err(rejection) => {
            debug!("Ignoring unreadable form body: {}", rejection.body_text());
            ActionRequest::default()
        }
    };

    let action = match Action::parse(
        request.action.as_deref(),
        request.email.as_deref(),
        request.code.as_deref(),
    ) {
        Ok(action) => action,
        Err(err) => return error_response(&Error::from(err)),
    };

    match service.dispatch(action).await {
        Ok(reply) => Json(ActionResponse::from(reply)).into_response(),
        Err(err) => error_response(&err),
    }
}

fn error_response(err: &Error) -> Response {
    match err {
        Error::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
        Error::DeliveryFailed(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Message could not be sent".to_string(),
        )
            .into_response(),
        Error::Storage(source) => {
            error!("Storage failure: {source}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
                .into_response()
        }
    }
}
