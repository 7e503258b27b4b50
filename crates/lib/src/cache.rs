//! Lazily populated id -> record caches for users and channels.
//!
//! Each namespace has its own lock, and the lock is never held across a platform
//! call. Concurrent misses for the same id may each call the platform (no
//! single-flight); the first stored record wins and every caller gets that one.
//! Entries are never evicted or refreshed.

use crate::platform::{Channel, PlatformClient, PlatformError, User};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Where a resolved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cached,
    Fetched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved<V> {
    pub value: V,
    pub source: Source,
}

/// One cache namespace.
pub struct RecordCache<V> {
    inner: RwLock<HashMap<String, V>>,
}

impl<V: Clone> Default for RecordCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> RecordCache<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, id: &str) -> Option<V> {
        self.inner.read().await.get(id).cloned()
    }

    /// Return the cached record, or run `load` and cache its result. Failed loads are
    /// not cached.
    pub async fn get_or_load<F, Fut, E>(&self, id: &str, load: F) -> Result<Resolved<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(id).await {
            return Ok(Resolved {
                value,
                source: Source::Cached,
            });
        }
        let loaded = load().await?;
        let mut g = self.inner.write().await;
        let value = g.entry(id.to_string()).or_insert(loaded).clone();
        Ok(Resolved {
            value,
            source: Source::Fetched,
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

/// User and channel lookups through the platform client, memoized per id.
pub struct Resolver {
    client: Arc<dyn PlatformClient>,
    users: RecordCache<User>,
    channels: RecordCache<Channel>,
}

impl Resolver {
    pub fn new(client: Arc<dyn PlatformClient>) -> Self {
        Self {
            client,
            users: RecordCache::new(),
            channels: RecordCache::new(),
        }
    }

    pub fn users(&self) -> &RecordCache<User> {
        &self.users
    }

    pub fn channels(&self) -> &RecordCache<Channel> {
        &self.channels
    }

    /// Resolve a user, telling cache hits, fetches, not-found and other failures apart.
    pub async fn try_user(&self, id: &str) -> Result<Resolved<User>, PlatformError> {
        self.users
            .get_or_load(id, || self.client.user_info(id))
            .await
    }

    pub async fn try_channel(&self, id: &str) -> Result<Resolved<Channel>, PlatformError> {
        self.channels
            .get_or_load(id, || self.client.channel_info(id))
            .await
    }

    /// Cached user lookup; failures are logged and yield `None`.
    pub async fn user(&self, id: &str) -> Option<User> {
        match self.try_user(id).await {
            Ok(r) => Some(r.value),
            Err(e) => {
                log::warn!("user lookup for {} failed: {}", id, e);
                None
            }
        }
    }

    /// Cached channel lookup; failures are logged and yield `None`.
    pub async fn channel(&self, id: &str) -> Option<Channel> {
        match self.try_channel(id).await {
            Ok(r) => Some(r.value),
            Err(e) => {
                log::warn!("channel lookup for {} failed: {}", id, e);
                None
            }
        }
    }

    /// User name for display; the id itself when the lookup fails or the name is blank.
    /// A blank id is not looked up and yields [`UNKNOWN_NAME`].
    pub async fn user_name(&self, id: &str) -> String {
        if id.trim().is_empty() {
            return UNKNOWN_NAME.to_string();
        }
        display_name(self.user(id).await.map(|u| u.name), id)
    }

    /// Channel name for display; the id itself when the lookup fails or the name is blank.
    /// A blank id is not looked up and yields [`UNKNOWN_NAME`].
    pub async fn channel_name(&self, id: &str) -> String {
        if id.trim().is_empty() {
            return UNKNOWN_NAME.to_string();
        }
        display_name(self.channel(id).await.map(|c| c.name), id)
    }
}

/// Display name used when there is no id to resolve.
pub const UNKNOWN_NAME: &str = "?";

fn display_name(name: Option<String>, id: &str) -> String {
    name.filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| id.to_string())
}
