//! REST client for the hosted document store.
//!
//! Documents live under `/v1/profiles/{uid}`. The hosted listener protocol is
//! not exposed over plain REST, so `watch` polls the document and forwards
//! only changed snapshots; the result is the same most-recent-value contract
//! the hosted SDK gives. A poll failure ends the watch with no retry, matching
//! the reload-to-resubscribe behavior of the rest of the system.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error};
use url::Url;

use super::{ProfilePatch, ProfileStore, ProfileUpdate, ProfileWatch, StoreError, UserProfile};
use crate::APP_USER_AGENT;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Clone, Debug)]
pub struct RestProfileStore {
    client: Client,
    base_url: Url,
    poll_interval: Duration,
}

impl RestProfileStore {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: Url) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent(APP_USER_AGENT).build()?;
        Ok(Self {
            client,
            base_url,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn document_url(&self, uid: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/v1/profiles/{uid}")
    }

    fn collection_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/v1/profiles")
    }

    async fn fetch(client: &Client, url: &str) -> Result<Option<UserProfile>, StoreError> {
        let response = client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(StoreError::Store(format!("{url} - {status}"))),
        }
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get(&self, uid: &str) -> Result<Option<UserProfile>, StoreError> {
        Self::fetch(&self.client, &self.document_url(uid)).await
    }

    async fn put(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let url = self.document_url(&profile.id);
        let response = self.client.put(&url).json(profile).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Store(format!("{url} - {}", response.status())));
        }
        Ok(())
    }

    async fn update(&self, uid: &str, patch: ProfilePatch) -> Result<UserProfile, StoreError> {
        // The store is last-write-wins with no optimistic concurrency, so a
        // read-modify-write is as good as a server-side patch here.
        let mut profile = self.get(uid).await?.ok_or(StoreError::NotFound)?;
        profile.apply(patch);
        self.put(&profile).await?;
        Ok(profile)
    }

    async fn delete(&self, uid: &str) -> Result<(), StoreError> {
        let url = self.document_url(uid);
        let response = self.client.delete(&url).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(StoreError::Store(format!("{url} - {}", response.status())));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<UserProfile>, StoreError> {
        let url = self.collection_url();
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Store(format!("{url} - {}", response.status())));
        }
        Ok(response.json().await?)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserProfile>, StoreError> {
        // Schema-less store: no secondary index, filter the collection.
        let profiles = self.list().await?;
        Ok(profiles.into_iter().find(|profile| profile.email == email))
    }

    fn watch(&self, uid: &str) -> ProfileWatch {
        let (tx, rx) = watch::channel(ProfileUpdate::Pending);
        let client = self.client.clone();
        let url = self.document_url(uid);
        let poll_interval = self.poll_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            let mut last: Option<Option<UserProfile>> = None;

            loop {
                ticker.tick().await;
                match Self::fetch(&client, &url).await {
                    Ok(snapshot) => {
                        if last.as_ref() != Some(&snapshot) {
                            debug!("profile watch delivering snapshot for {url}");
                            last = Some(snapshot.clone());
                            if tx.send(ProfileUpdate::Snapshot(snapshot)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        error!("profile watch lost for {url}: {err}");
                        let _ = tx.send(ProfileUpdate::Lost(err.to_string()));
                        return;
                    }
                }
            }
        });

        ProfileWatch::new(rx, Some(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_urls_are_rooted_at_the_collection() {
        let store =
            RestProfileStore::new(Url::parse("https://store.example.com/").expect("url"))
                .expect("store");
        assert_eq!(
            store.document_url("u1"),
            "https://store.example.com/v1/profiles/u1"
        );
        assert_eq!(
            store.collection_url(),
            "https://store.example.com/v1/profiles"
        );
    }
}
