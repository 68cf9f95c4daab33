//! API handlers and shared authorization utilities.
//!
//! Privileged handlers never trust the route guard: every call re-derives the
//! caller from the cookie token (provider-side verification) and re-reads the
//! stored profile before checking the permission matrix.

pub mod health;
pub mod llm;
pub mod login;
pub mod pages;
pub mod password;
pub mod register;
pub mod session;
pub mod users;

use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::api::AppContext;
use crate::roles::Permission;
use crate::store::{AccountStatus, UserProfile};

/// The verified caller of a privileged operation.
#[derive(Clone, Debug)]
pub struct Principal {
    pub uid: String,
    pub email: Option<String>,
    pub profile: UserProfile,
}

impl Principal {
    #[must_use]
    pub fn can(&self, permission: Permission) -> bool {
        self.profile.role.allows(permission)
    }
}

/// Verify the request token with the provider and load the caller's profile.
///
/// # Errors
/// `ApiError::Unauthorized` without a verifiable token, `ApiError::Forbidden`
/// when the account has no profile document.
pub async fn require_auth(
    context: &AppContext,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let token = session::request_token(headers).ok_or(ApiError::Unauthorized)?;
    let info = context
        .identity
        .verify_token(&token)
        .await
        .map_err(|_| ApiError::Unauthorized)?;
    let profile = context
        .store
        .get(&info.uid)
        .await?
        .ok_or(ApiError::Forbidden("No profile for this account"))?;

    Ok(Principal {
        uid: info.uid,
        email: info.email,
        profile,
    })
}

/// [`require_auth`] plus an account-state and permission check.
///
/// # Errors
/// `ApiError::Forbidden` for unapproved or non-active accounts and for roles
/// the permission matrix does not grant `permission`.
pub async fn require_permission(
    context: &AppContext,
    headers: &HeaderMap,
    permission: Permission,
) -> Result<Principal, ApiError> {
    let principal = require_auth(context, headers).await?;

    if !principal.profile.account_approved
        || principal.profile.account_status != AccountStatus::Active
    {
        return Err(ApiError::Forbidden("Account is not active"));
    }
    if !principal.can(permission) {
        return Err(ApiError::Forbidden("Insufficient permissions"));
    }

    Ok(principal)
}
