//! Identity provider client.
//!
//! The external platform owns credentials and token issuance; this module
//! wraps its REST surface behind [`IdentityProvider`] so the rest of the
//! service (and the tests) never talk to the network directly.

pub mod memory;
pub mod rest;
pub mod token;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// A signed-in user as reported by the identity provider.
///
/// Owned by the provider: created on sign-in, destroyed on sign-out or token
/// revocation.
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing)]
    pub id_token: String,
    #[serde(skip_serializing)]
    pub refresh_token: String,
}

/// Claims the provider attests for a verified token.
#[derive(Clone, Debug)]
pub struct TokenInfo {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
}

/// Account record as known to the provider, independent of any session.
#[derive(Clone, Debug)]
pub struct AccountInfo {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub email_verified: bool,
    pub disabled: bool,
}

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("too many requests, try again later")]
    TooManyRequests,
    #[error("account disabled")]
    AccountDisabled,
    #[error("a user with this email already exists")]
    EmailExists,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid or expired reset code")]
    InvalidResetCode,
    #[error("invalid token")]
    InvalidToken,
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// Operations against the identity platform.
///
/// `revoke` invalidates all refresh tokens for the account; an id token that
/// is already in the wild stays decodable until its expiry claim passes,
/// which is exactly the window the route guard tolerates.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, IdentityError>;

    /// Exchange an OAuth credential (e.g. a Google id token) for a session.
    async fn sign_in_with_idp(&self, oauth_token: &str) -> Result<Session, IdentityError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<Session, IdentityError>;

    /// Server-side token verification; the only trusted check in the system.
    async fn verify_token(&self, id_token: &str) -> Result<TokenInfo, IdentityError>;

    async fn revoke(&self, uid: &str) -> Result<(), IdentityError>;

    async fn send_password_reset(&self, email: &str) -> Result<(), IdentityError>;

    async fn confirm_password_reset(
        &self,
        code: &str,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    async fn update_account(
        &self,
        uid: &str,
        display_name: Option<&str>,
        password: Option<&str>,
    ) -> Result<(), IdentityError>;

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<AccountInfo>, IdentityError>;
}
