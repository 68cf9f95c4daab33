//! Self-service registration and invited-user completion.

use axum::extract::{Extension, Query};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{ApiError, ErrorBody};
use crate::api::AppContext;
use crate::store::{AccountStatus, ProfilePatch, UserProfile};
use crate::validation::{validate_email, validate_name, validate_password};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CompleteRegistrationRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user: UserProfile,
}

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, awaiting approval", body = RegisterResponse),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "register",
)]
/// Create an identity account plus a profile held in the approval queue.
pub async fn register(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let email = payload.email.trim().to_lowercase();
    validate_email(&email).map_err(ApiError::BadRequest)?;
    validate_name(&payload.name).map_err(ApiError::BadRequest)?;
    validate_password(&payload.password).map_err(ApiError::BadRequest)?;

    let session = context
        .identity
        .sign_up(&email, &payload.password, Some(payload.name.trim()))
        .await?;

    // Self-registered accounts wait in the approval queue; only a missing
    // profile at login bootstraps straight to approved.
    let mut profile = UserProfile::bootstrap(&session);
    profile.account_approved = false;
    context.store.put(&profile).await?;

    // The sign-up minted tokens the user cannot use yet.
    if let Err(err) = context.identity.revoke(&session.uid).await {
        warn!("failed to revoke post-registration tokens: {err}");
    }

    info!("registered {} ({})", profile.email, profile.id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user: profile })))
}

#[utoipa::path(
    post,
    path = "/v1/register/complete",
    request_body = CompleteRegistrationRequest,
    responses(
        (status = 200, description = "Registration completed", body = RegisterResponse),
        (status = 404, description = "No invitation for this email", body = ErrorBody),
        (status = 409, description = "Registration already completed", body = ErrorBody),
    ),
    tag = "register",
)]
/// An invited user picks their display name and password; the profile then
/// leaves the `pending` state.
pub async fn complete_registration(
    Extension(context): Extension<Arc<AppContext>>,
    Json(payload): Json<CompleteRegistrationRequest>,
) -> Result<Json<RegisterResponse>, ApiError> {
    let email = payload.email.trim().to_lowercase();
    validate_email(&email).map_err(ApiError::BadRequest)?;
    validate_name(&payload.name).map_err(ApiError::BadRequest)?;
    validate_password(&payload.password).map_err(ApiError::BadRequest)?;

    let profile = context
        .store
        .find_by_email(&email)
        .await?
        .ok_or(ApiError::NotFound("No invitation for this email"))?;
    if profile.account_status != AccountStatus::Pending {
        return Err(ApiError::BadRequest(
            "Registration already completed".to_string(),
        ));
    }

    context
        .identity
        .update_account(
            &profile.id,
            Some(payload.name.trim()),
            Some(&payload.password),
        )
        .await?;

    let updated = context
        .store
        .update(
            &profile.id,
            ProfilePatch {
                name: Some(payload.name.trim().to_string()),
                account_status: Some(AccountStatus::Active),
                ..ProfilePatch::default()
            },
        )
        .await?;

    info!("registration completed for {}", updated.id);
    Ok(Json(RegisterResponse { user: updated }))
}

#[derive(Deserialize, IntoParams, Debug)]
pub struct RegistrationStatusQuery {
    pub email: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct RegistrationStatus {
    pub invited: bool,
    pub completed: bool,
}

#[utoipa::path(
    get,
    path = "/v1/register/complete",
    params(RegistrationStatusQuery),
    responses(
        (status = 200, description = "Invitation status for the email", body = RegistrationStatus),
    ),
    tag = "register",
)]
pub async fn registration_status(
    Extension(context): Extension<Arc<AppContext>>,
    Query(query): Query<RegistrationStatusQuery>,
) -> Result<Json<RegistrationStatus>, ApiError> {
    let email = query.email.trim().to_lowercase();
    validate_email(&email).map_err(ApiError::BadRequest)?;

    let profile = context.store.find_by_email(&email).await?;
    let status = match profile {
        Some(profile) => RegistrationStatus {
            invited: true,
            completed: profile.account_status != AccountStatus::Pending,
        },
        None => RegistrationStatus {
            invited: false,
            completed: false,
        },
    };

    Ok(Json(status))
}
