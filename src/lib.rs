//! # Anteroom (Account Registration & Approval Service)
//!
//! `anteroom` fronts a third-party identity platform and an external
//! schema-less document store: it registers users, authenticates them, holds
//! new accounts in a role-gated approval queue, and manages the resulting
//! browser sessions.
//!
//! ## Session Model
//!
//! A successful sign-in mints an identity token pair which is bridged into an
//! `HttpOnly` cookie pair (`firebaseAuthToken` / `firebaseAuthRefreshToken`,
//! 12 hour TTL). Page navigation is gated at the edge by a route guard that
//! only checks the token's expiry claim locally; privileged API operations
//! always re-verify the token with the identity provider and re-read the
//! caller's role from the stored profile.
//!
//! ## Authorization View
//!
//! Each signed-in user has a profile document in the store (role, approval
//! flag, account status). The [`session`] module merges identity events and
//! profile-document events into a derived authorization view through a
//! single-writer reducer, so the rest of the service never reasons about the
//! two event streams directly.
//!
//! ## Approval Flow
//!
//! Accounts register self-service but stay out of the product until a
//! `master` user approves them. Sign-in against an unapproved account is
//! terminated with a distinguishable `ACCOUNT_NOT_APPROVED` error; suspended
//! accounts behave the same with `ACCOUNT_SUSPENDED`.

pub mod api;
pub mod cli;
pub mod identity;
pub mod roles;
pub mod session;
pub mod store;
pub mod validation;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
