//! Session and authorization state.
//!
//! "Who is logged in and what are they allowed to do" lives here. Two
//! independent event sources, the identity provider (sign-in / sign-out) and
//! the profile-document listener, are merged by a single-writer reducer
//! ([`machine`]) into one derived [`AuthorizationView`]. There is no ordering
//! guarantee between the two streams; consumers must tolerate an
//! authenticated view whose profile has not arrived yet (`profile_loading`).

pub mod machine;

pub use machine::{AuthMachine, SessionRegistry};

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::identity::{IdentityError, IdentityProvider, Session};
use crate::roles::{Permission, Role};
use crate::store::{AccountStatus, ProfileStore, StoreError, UserProfile};

/// Derived, never persisted. Recomputed whenever the session or the profile
/// changes. Invariant: `is_authenticated() ⇔ session.is_some()`.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationView {
    pub session: Option<Session>,
    pub profile: Option<UserProfile>,
    /// True until the first identity event has been observed.
    pub loading: bool,
    /// True while a profile snapshot is in flight for the current session.
    pub profile_loading: bool,
}

impl AuthorizationView {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().map(|profile| profile.role)
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role() == Some(Role::Admin)
    }

    /// Note: `is_master` does not imply `is_admin`; roles are exclusive.
    #[must_use]
    pub fn is_master(&self) -> bool {
        self.role() == Some(Role::Master)
    }

    #[must_use]
    pub fn allows(&self, permission: Permission) -> bool {
        self.role().is_some_and(|role| role.allows(permission))
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("account pending approval")]
    NotApproved,
    #[error("account suspended")]
    Suspended,
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// Stable code for policy errors, surfaced verbatim to callers.
    #[must_use]
    pub fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotApproved => Some("ACCOUNT_NOT_APPROVED"),
            Self::Suspended => Some("ACCOUNT_SUSPENDED"),
            _ => None,
        }
    }
}

/// Email/password login with approval gating.
///
/// # Errors
/// `AuthError::NotApproved` / `AuthError::Suspended` terminate the fresh
/// session (provider-side revocation) before returning; identity and store
/// failures pass through.
pub async fn login(
    identity: &Arc<dyn IdentityProvider>,
    store: &Arc<dyn ProfileStore>,
    registry: &SessionRegistry,
    email: &str,
    password: &str,
) -> Result<(Session, UserProfile), AuthError> {
    let session = identity.sign_in(email, password).await?;
    let profile = admit(identity, store, registry, &session).await?;
    Ok((session, profile))
}

/// OAuth credential login; same gating, same bootstrap-on-first-sign-in.
///
/// # Errors
/// Same as [`login`].
pub async fn login_with_google(
    identity: &Arc<dyn IdentityProvider>,
    store: &Arc<dyn ProfileStore>,
    registry: &SessionRegistry,
    oauth_token: &str,
) -> Result<(Session, UserProfile), AuthError> {
    let session = identity.sign_in_with_idp(oauth_token).await?;
    let profile = admit(identity, store, registry, &session).await?;
    Ok((session, profile))
}

/// Apply the approval policy to a freshly authenticated session.
async fn admit(
    identity: &Arc<dyn IdentityProvider>,
    store: &Arc<dyn ProfileStore>,
    registry: &SessionRegistry,
    session: &Session,
) -> Result<UserProfile, AuthError> {
    match store.get(&session.uid).await? {
        Some(profile) if !profile.account_approved => {
            info!("login rejected for {}: pending approval", session.uid);
            terminate(identity, &session.uid).await;
            Err(AuthError::NotApproved)
        }
        Some(profile) if profile.account_status == AccountStatus::Suspended => {
            info!("login rejected for {}: suspended", session.uid);
            terminate(identity, &session.uid).await;
            Err(AuthError::Suspended)
        }
        Some(profile) => {
            registry.attach(session.clone());
            Ok(profile)
        }
        None => {
            // Self-service bootstrap: authenticated at the provider with no
            // profile yet. Policy, not an error path.
            debug!("no profile for {}, bootstrapping", session.uid);
            let profile = UserProfile::bootstrap(session);
            store.put(&profile).await?;
            registry.attach(session.clone());
            Ok(profile)
        }
    }
}

async fn terminate(identity: &Arc<dyn IdentityProvider>, uid: &str) {
    if let Err(err) = identity.revoke(uid).await {
        warn!("failed to revoke session for {uid}: {err}");
    }
}

/// Explicit logout. Always succeeds from the caller's perspective; revocation
/// failures are logged, not surfaced.
pub async fn logout(
    identity: &Arc<dyn IdentityProvider>,
    registry: &SessionRegistry,
    uid: &str,
) {
    registry.detach(uid);
    if let Err(err) = identity.revoke(uid).await {
        warn!("logout: failed to revoke tokens for {uid}: {err}");
    }
}
