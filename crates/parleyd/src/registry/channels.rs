//! Name-indexed channel registry with lazy creation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use parley_core::ChannelName;

use super::channel::Channel;
use super::error::RegistryError;

/// Process-wide map from channel name to [`Channel`].
///
/// The lock protects the map only. Callers clone the `Arc<Channel>` out and
/// release the registry lock before touching the channel's own lock, which
/// keeps the acquisition order registry-then-channel. Channels are never
/// removed, even when they become empty.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<HashMap<ChannelName, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the channel called `name`, creating it if needed.
    ///
    /// The check-and-insert runs under the exclusive lock, so concurrent
    /// callers with a new name all observe the same instance.
    pub async fn get_or_create(&self, name: &ChannelName) -> Arc<Channel> {
        {
            let channels = self.channels.read().await;
            if let Some(channel) = channels.get(name) {
                return Arc::clone(channel);
            }
        }

        let mut channels = self.channels.write().await;
        let channel = channels.entry(name.clone()).or_insert_with(|| {
            info!(channel = %name, "Channel created");
            Arc::new(Channel::new(name.clone()))
        });
        Arc::clone(channel)
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.read().await.get(name).cloned()
    }

    /// Like [`get`](Self::get), but a missing channel is an error.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelNotFound` if no channel has that name
    pub async fn lookup(&self, name: &ChannelName) -> Result<Arc<Channel>, RegistryError> {
        self.get(name.as_str())
            .await
            .ok_or_else(|| RegistryError::ChannelNotFound(name.clone()))
    }

    pub async fn len(&self) -> usize {
        self.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.read().await.is_empty()
    }

    /// Channel names, sorted.
    pub async fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<_> = self.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ChannelName {
        ChannelName::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_instance() {
        let registry = ChannelRegistry::new();
        let first = registry.get_or_create(&name("general")).await;
        let second = registry.get_or_create(&name("general")).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_lookup_missing_channel() {
        let registry = ChannelRegistry::new();
        assert!(registry.get("nowhere").await.is_none());

        let err = registry.lookup(&name("nowhere")).await.unwrap_err();
        assert_eq!(err, RegistryError::ChannelNotFound(name("nowhere")));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_yields_single_channel() {
        let registry = Arc::new(ChannelRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get_or_create(&name("fresh")).await
            }));
        }

        let mut channels = Vec::new();
        for handle in handles {
            channels.push(handle.await.unwrap());
        }

        let first = &channels[0];
        assert!(channels.iter().all(|c| Arc::ptr_eq(c, first)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_names_are_sorted() {
        let registry = ChannelRegistry::new();
        registry.get_or_create(&name("rust")).await;
        registry.get_or_create(&name("go")).await;
        assert_eq!(registry.names().await, vec![name("go"), name("rust")]);
    }
}
