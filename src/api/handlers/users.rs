//! Account management: listing, invitations, updates, and the approval queue.
//!
//! Gating follows the permission matrix: profile CRUD needs `ManageUsers`
//! (admin or master), the approval queue needs `ApproveAccounts` (master
//! only). `master` does not imply `admin`; the two roles gate different
//! operations.

use axum::extract::{Extension, Path};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{require_auth, require_permission};
use crate::api::error::{ApiError, ErrorBody};
use crate::api::AppContext;
use crate::roles::{Permission, Role};
use crate::store::{AccountStatus, ProfilePatch, UserProfile};
use crate::validation::{validate_email, validate_name};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct CreateUserRequest {
    pub email: String,
    /// Any role except `admin`; admin accounts only exist via self-service
    /// registration.
    pub role: Role,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UpdateUserRequest {
    pub name: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalAction {
    Approve,
    Deny,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ApprovalRequest {
    pub action: ApprovalAction,
}

#[utoipa::path(
    get,
    path = "/v1/users",
    responses(
        (status = 200, description = "All profiles", body = [UserProfile]),
        (status = 403, description = "Caller cannot manage users", body = ErrorBody),
    ),
    tag = "users",
)]
pub async fn list_users(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    require_permission(&context, &headers, Permission::ManageUsers).await?;

    let mut profiles = context.store.list().await?;
    profiles.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(profiles))
}

#[utoipa::path(
    get,
    path = "/v1/users/pending",
    responses(
        (status = 200, description = "Profiles awaiting approval, newest first", body = [UserProfile]),
        (status = 403, description = "Caller cannot approve accounts", body = ErrorBody),
    ),
    tag = "users",
)]
pub async fn pending_users(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    require_permission(&context, &headers, Permission::ApproveAccounts).await?;

    let mut pending: Vec<UserProfile> = context
        .store
        .list()
        .await?
        .into_iter()
        .filter(UserProfile::is_pending)
        .collect();
    pending.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(pending))
}

#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Invitation created", body = UserProfile),
        (status = 403, description = "Caller cannot manage users", body = ErrorBody),
        (status = 409, description = "Email already registered", body = ErrorBody),
    ),
    tag = "users",
)]
/// Invite a staff account: provider account with a throwaway password plus a
/// pre-approved profile waiting in `pending` until the user completes
/// registration.
pub async fn create_user(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let principal = require_permission(&context, &headers, Permission::ManageUsers).await?;

    let email = payload.email.trim().to_lowercase();
    validate_email(&email).map_err(ApiError::BadRequest)?;
    if payload.role == Role::Admin {
        return Err(ApiError::BadRequest(
            "Staff invitations cannot carry the admin role".to_string(),
        ));
    }

    // Check the provider too: a provider account orphaned from its profile
    // (half-finished registration, denied approval race) still owns the email.
    if context.store.find_by_email(&email).await?.is_some()
        || context.identity.get_by_email(&email).await?.is_some()
    {
        return Err(ApiError::from(crate::identity::IdentityError::EmailExists));
    }

    // The user never learns this password; completion replaces it.
    let placeholder = Uuid::new_v4().to_string();
    let session = context.identity.sign_up(&email, &placeholder, None).await?;

    let now = Utc::now();
    let profile = UserProfile {
        id: session.uid.clone(),
        name: String::new(),
        email: email.clone(),
        role: payload.role,
        email_verified: false,
        account_approved: true,
        account_status: AccountStatus::Pending,
        created_at: now,
        updated_at: now,
        created_by: principal.uid.clone(),
        approved_at: None,
        approved_by: None,
    };
    context.store.put(&profile).await?;

    if let Err(err) = context.identity.revoke(&session.uid).await {
        warn!("failed to revoke invitation tokens: {err}");
    }
    // Doubles as the invitation email: the reset link is how the invited user
    // first sets a password.
    if let Err(err) = context.identity.send_password_reset(&email).await {
        warn!("failed to send invitation email to {email}: {err}");
    }

    info!("invited {email} as {:?} by {}", payload.role, principal.uid);
    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Profile id (provider uid)")),
    responses(
        (status = 200, description = "One profile", body = UserProfile),
        (status = 404, description = "No such profile", body = ErrorBody),
    ),
    tag = "users",
)]
/// Self or any caller with `ManageUsers`.
pub async fn get_user(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ApiError> {
    let principal = require_auth(&context, &headers).await?;
    if principal.uid != id && !principal.can(Permission::ManageUsers) {
        return Err(ApiError::Forbidden("Insufficient permissions"));
    }

    let profile = context
        .store
        .get(&id)
        .await?
        .ok_or(ApiError::NotFound("User not found"))?;
    Ok(Json(profile))
}

#[utoipa::path(
    put,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Profile id (provider uid)")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated profile", body = UserProfile),
        (status = 404, description = "No such profile", body = ErrorBody),
    ),
    tag = "users",
)]
/// Update the display name; self or any caller with `ManageUsers`.
pub async fn update_user(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let principal = require_auth(&context, &headers).await?;
    if principal.uid != id && !principal.can(Permission::ManageUsers) {
        return Err(ApiError::Forbidden("Insufficient permissions"));
    }
    validate_name(&payload.name).map_err(ApiError::BadRequest)?;

    let name = payload.name.trim().to_string();
    context
        .identity
        .update_account(&id, Some(&name), None)
        .await?;
    let profile = context
        .store
        .update(
            &id,
            ProfilePatch {
                name: Some(name),
                ..ProfilePatch::default()
            },
        )
        .await?;

    Ok(Json(profile))
}

#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = String, Path, description = "Profile id (provider uid)")),
    responses(
        (status = 204, description = "Account and profile removed"),
        (status = 403, description = "Caller cannot manage users", body = ErrorBody),
    ),
    tag = "users",
)]
pub async fn delete_user(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let principal = require_permission(&context, &headers, Permission::ManageUsers).await?;

    remove_account(&context, &id).await?;
    info!("deleted account {id} by {}", principal.uid);
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/v1/users/{id}/approval",
    params(("id" = String, Path, description = "Profile id (provider uid)")),
    request_body = ApprovalRequest,
    responses(
        (status = 200, description = "Approved profile", body = UserProfile),
        (status = 204, description = "Denied; account removed"),
        (status = 403, description = "Caller cannot approve accounts", body = ErrorBody),
        (status = 404, description = "No such profile", body = ErrorBody),
    ),
    tag = "users",
)]
/// Approve stamps `approved_at`/`approved_by`; deny removes the provider
/// account and the profile outright.
pub async fn approval(
    Extension(context): Extension<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ApprovalRequest>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;

    let principal = require_permission(&context, &headers, Permission::ApproveAccounts).await?;

    match payload.action {
        ApprovalAction::Approve => {
            let profile = context
                .store
                .update(
                    &id,
                    ProfilePatch {
                        account_approved: Some(true),
                        account_status: Some(AccountStatus::Active),
                        approved_at: Some(Utc::now()),
                        approved_by: Some(principal.uid.clone()),
                        ..ProfilePatch::default()
                    },
                )
                .await?;
            info!("approved {id} by {}", principal.uid);
            Ok(Json(profile).into_response())
        }
        ApprovalAction::Deny => {
            remove_account(&context, &id).await?;
            info!("denied {id} by {}", principal.uid);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
    }
}

/// Remove provider account, profile document, and any live reducer.
async fn remove_account(context: &AppContext, uid: &str) -> Result<(), ApiError> {
    context.sessions.detach(uid);
    if let Err(err) = context.identity.delete_account(uid).await {
        // A missing provider account still leaves the profile to clean up.
        warn!("failed to delete provider account {uid}: {err}");
    }
    context.store.delete(uid).await?;
    Ok(())
}
