//! Profile document store.
//!
//! One document per user in an external schema-less store with
//! last-write-wins semantics. [`ProfileStore::watch`] is the listener
//! primitive: at-least-once, most-recent-value delivery; intermediate states
//! may be skipped when writes outpace delivery, and there is no automatic
//! retry once a watch reports an error.

pub mod memory;
pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use utoipa::ToSchema;

use crate::identity::Session;
use crate::roles::Role;

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    #[serde(alias = "pending_approval")]
    Pending,
    Active,
    Suspended,
}

/// The authorization-relevant record per user. Created at registration,
/// mutated by approval actions or self-service edits, deleted only on account
/// removal.
#[derive(ToSchema, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub account_approved: bool,
    pub account_status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
}

impl UserProfile {
    /// Self-service bootstrap profile: a user signed in at the provider but
    /// has no document yet. Policy choice inherited from the original flow:
    /// active, approved, default role `admin`.
    #[must_use]
    pub fn bootstrap(session: &Session) -> Self {
        let now = Utc::now();
        Self {
            id: session.uid.clone(),
            name: session.display_name.clone().unwrap_or_default(),
            email: session.email.clone(),
            role: Role::Admin,
            email_verified: session.email_verified,
            account_approved: true,
            account_status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
            created_by: session.uid.clone(),
            approved_at: None,
            approved_by: None,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        !self.account_approved
    }

    pub fn apply(&mut self, patch: ProfilePatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(approved) = patch.account_approved {
            self.account_approved = approved;
        }
        if let Some(status) = patch.account_status {
            self.account_status = status;
        }
        if let Some(approved_at) = patch.approved_at {
            self.approved_at = Some(approved_at);
        }
        if let Some(approved_by) = patch.approved_by {
            self.approved_by = Some(approved_by);
        }
        self.updated_at = Utc::now();
    }
}

/// Partial update; unset fields keep their stored value.
#[derive(Clone, Debug, Default)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub account_approved: Option<bool>,
    pub account_status: Option<AccountStatus>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("profile not found")]
    NotFound,
    #[error("document store error: {0}")]
    Store(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
}

/// What a watch delivers. `Pending` is the pre-first-snapshot state and is
/// never delivered to reducers.
#[derive(Clone, Debug)]
pub enum ProfileUpdate {
    Pending,
    Snapshot(Option<UserProfile>),
    /// The listener failed; no further updates will arrive on this watch.
    Lost(String),
}

/// Live subscription handle. Dropping it cancels the underlying listener.
pub struct ProfileWatch {
    rx: watch::Receiver<ProfileUpdate>,
    task: Option<JoinHandle<()>>,
    primed: bool,
}

impl ProfileWatch {
    #[must_use]
    pub fn new(rx: watch::Receiver<ProfileUpdate>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            rx,
            task,
            primed: false,
        }
    }

    /// Wait for the next delivery. Returns `None` once the store side is gone.
    ///
    /// The first call delivers the value already present at subscribe time
    /// (unless it is still `Pending`); later calls wait for new sends.
    pub async fn changed(&mut self) -> Option<ProfileUpdate> {
        loop {
            if self.primed {
                self.rx.changed().await.ok()?;
            } else {
                self.primed = true;
            }
            let update = self.rx.borrow_and_update().clone();
            if !matches!(update, ProfileUpdate::Pending) {
                return Some(update);
            }
        }
    }

}

impl Drop for ProfileWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Create or replace the whole document (last write wins).
    async fn put(&self, profile: &UserProfile) -> Result<(), StoreError>;

    /// Read-modify-write partial update.
    ///
    /// # Errors
    /// `StoreError::NotFound` when no document exists for `uid`.
    async fn update(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile, StoreError>;

    async fn delete(&self, uid: &str) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, StoreError>;

    /// Subscribe to the document for `uid`.
    fn watch(&self, uid: &str) -> ProfileWatch;
}
