//! Password reset flow: send an out-of-band code, then confirm it.

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::api::error::{ApiError, ErrorBody};
use crate::api::AppContext;
use crate::validation::{validate_email, validate_password};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    /// Out-of-band code from the reset email.
    pub oob_code: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct Message {
    pub message: String,
}

#[utoipa::path(
    post,
    path = "/v1/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent", body = Message),
        (status = 404, description = "No account for this email", body = ErrorBody),
    ),
    tag = "password",
)]
pub async fn forgot_password(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    validate_email(&email).map_err(ApiError::BadRequest)?;

    context.identity.send_password_reset(&email).await?;
    info!("password reset email requested for {email}");

    Ok((
        StatusCode::OK,
        Json(Message {
            message: "Password reset email sent".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = Message),
        (status = 400, description = "Code invalid, expired, or already used", body = ErrorBody),
    ),
    tag = "password",
)]
/// A used or expired code maps to a plain 400, never a crash.
pub async fn reset_password(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    validate_password(&payload.new_password).map_err(ApiError::BadRequest)?;

    context
        .identity
        .confirm_password_reset(&payload.oob_code, &payload.new_password)
        .await?;

    Ok((
        StatusCode::OK,
        Json(Message {
            message: "Password updated".to_string(),
        }),
    ))
}
