//! Error responses for the API surface.
//!
//! Policy errors keep their stable codes (`ACCOUNT_NOT_APPROVED`,
//! `ACCOUNT_SUSPENDED`) so callers can branch without string-matching
//! messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::identity::IdentityError;
use crate::session::AuthError;
use crate::store::StoreError;

#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorBody {
    pub error: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: true,
            message: message.into(),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: &str) -> Self {
        self.code = Some(code.to_string());
        self
    }
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    Unauthorized,
    Forbidden(&'static str),
    BadRequest(String),
    NotFound(&'static str),
    Upstream(String),
    Internal(String),
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        Self::Auth(AuthError::Identity(err))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Auth(AuthError::Store(err))
    }
}

fn identity_status(err: &IdentityError) -> StatusCode {
    match err {
        IdentityError::InvalidCredentials | IdentityError::InvalidToken => {
            StatusCode::UNAUTHORIZED
        }
        IdentityError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        IdentityError::AccountDisabled => StatusCode::FORBIDDEN,
        IdentityError::EmailExists => StatusCode::CONFLICT,
        IdentityError::UserNotFound => StatusCode::NOT_FOUND,
        IdentityError::InvalidResetCode => StatusCode::BAD_REQUEST,
        IdentityError::Provider(_) | IdentityError::Transport(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Auth(err @ (AuthError::NotApproved | AuthError::Suspended)) => {
                let code = err.code().unwrap_or_default();
                (
                    StatusCode::FORBIDDEN,
                    ErrorBody::new(err.to_string()).with_code(code),
                )
            }
            Self::Auth(AuthError::Identity(err)) => {
                let status = identity_status(&err);
                if status.is_server_error() {
                    error!("identity provider failure: {err}");
                }
                (status, ErrorBody::new(err.to_string()))
            }
            Self::Auth(AuthError::Store(StoreError::NotFound)) => {
                (StatusCode::NOT_FOUND, ErrorBody::new("User not found"))
            }
            Self::Auth(AuthError::Store(err)) => {
                error!("document store failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Document store unavailable"),
                )
            }
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, ErrorBody::new("Unauthorized")),
            Self::Forbidden(message) => (StatusCode::FORBIDDEN, ErrorBody::new(message)),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, ErrorBody::new(message)),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, ErrorBody::new(message)),
            Self::Upstream(message) => {
                error!("upstream failure: {message}");
                (StatusCode::BAD_GATEWAY, ErrorBody::new(message))
            }
            Self::Internal(message) => {
                error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Internal error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
