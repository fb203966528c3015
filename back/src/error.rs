use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Request-level failures, mapped to responses at the HTTP boundary. None of
/// these are retried and none are fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing/invalid session, or a rejected identity assertion. The caller
    /// is sent back to sign-in with no session established.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The item does not exist for the caller. Items owned by other users
    /// answer the same way, so existence never leaks across users.
    #[error("no such todo")]
    NotFound,

    #[error("{0}")]
    ValidationFailed(&'static str),

    #[error(transparent)]
    Internal(#[from] eyre::Report),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match self {
            Error::AuthenticationFailed => Redirect::to("/sign-in").into_response(),
            Error::NotFound => {
                let body = json!({ "error": self.to_string() });
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            Error::ValidationFailed(message) => {
                let body = json!({ "error": message });
                (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
            }
            Error::Internal(report) => {
                tracing::error!("request failed: {:?}", report);
                let body = json!({ "error": "internal error" });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
