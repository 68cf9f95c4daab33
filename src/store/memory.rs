//! In-memory profile store.
//!
//! Backs `--store-url memory:` for local development and the test suite.
//! Writes notify watchers synchronously, so delivery is most-recent-value
//! just like the hosted store's listener.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::watch;

use super::{ProfilePatch, ProfileStore, ProfileUpdate, ProfileWatch, StoreError, UserProfile};

#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
    watchers: Mutex<HashMap<String, watch::Sender<ProfileUpdate>>>,
}

impl MemoryProfileStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn notify(&self, uid: &str, update: ProfileUpdate) {
        let watchers = self.watchers.lock().expect("watchers lock poisoned");
        if let Some(sender) = watchers.get(uid) {
            // send_replace updates the value even with no receivers attached.
            let _ = sender.send_replace(update);
        }
    }

    /// Simulate a listener failure (store unreachable) for `uid`.
    ///
    /// After this the watch behaves like the real one: no further updates, a
    /// fresh subscription is required.
    pub fn fail_watch(&self, uid: &str, reason: &str) {
        self.notify(uid, ProfileUpdate::Lost(reason.to_string()));
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self
            .profiles
            .lock()
            .expect("profiles lock poisoned")
            .get(uid)
            .cloned())
    }

    async fn put(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.profiles
            .lock()
            .expect("profiles lock poisoned")
            .insert(profile.id.clone(), profile.clone());
        self.notify(&profile.id, ProfileUpdate::Snapshot(Some(profile.clone())));
        Ok(())
    }

    async fn update(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile, StoreError> {
        let updated = {
            let mut profiles = self.profiles.lock().expect("profiles lock poisoned");
            let profile = profiles.get_mut(uid).ok_or(StoreError::NotFound)?;
            profile.apply(patch);
            profile.clone()
        };
        self.notify(uid, ProfileUpdate::Snapshot(Some(updated.clone())));
        Ok(updated)
    }

    async fn delete(&self, uid: &str) -> Result<(), StoreError> {
        self.profiles
            .lock()
            .expect("profiles lock poisoned")
            .remove(uid);
        self.notify(uid, ProfileUpdate::Snapshot(None));
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        Ok(self
            .profiles
            .lock()
            .expect("profiles lock poisoned")
            .values()
            .cloned()
            .collect())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self
            .profiles
            .lock()
            .expect("profiles lock poisoned")
            .values()
            .find(|profile| profile.email == email)
            .cloned())
    }

    fn watch(&self, uid: &str) -> ProfileWatch {
        let current = self
            .profiles
            .lock()
            .expect("profiles lock poisoned")
            .get(uid)
            .cloned();

        let mut watchers = self.watchers.lock().expect("watchers lock poisoned");
        let sender = watchers.entry(uid.to_string()).or_insert_with(|| {
            let (tx, _rx) = watch::channel(ProfileUpdate::Pending);
            tx
        });
        // Seed the subscriber with the current document state.
        let _ = sender.send_replace(ProfileUpdate::Snapshot(current));
        ProfileWatch::new(sender.subscribe(), None)
    }
}
