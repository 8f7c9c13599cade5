//! Live users and the name-indexed user registry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use parley_core::{ChannelName, UserName};
use parley_protocol::ServerMessage;

use super::error::RegistryError;
use crate::sink::{DeliveryError, SharedSink};

/// A logged-in user.
///
/// Owned by the [`UserRegistry`] (and the user's own session); channels only
/// hold weak references. `channels` is the reverse membership index, written
/// by [`super::Channel`] while it holds its own write lock, so the two views
/// agree whenever no join or part is in flight.
pub struct User {
    name: UserName,
    sink: SharedSink,
    channels: Mutex<HashSet<ChannelName>>,
}

impl User {
    pub fn new(name: UserName, sink: SharedSink) -> Self {
        Self {
            name,
            sink,
            channels: Mutex::new(HashSet::new()),
        }
    }

    pub fn name(&self) -> &UserName {
        &self.name
    }

    /// Hands a message to this user's connection without blocking.
    pub fn deliver(&self, msg: ServerMessage) -> Result<(), DeliveryError> {
        self.sink.deliver(msg)
    }

    /// Snapshot of the channels this user is a member of, sorted by name.
    pub async fn channels(&self) -> Vec<ChannelName> {
        let mut channels: Vec<_> = self.channels.lock().await.iter().cloned().collect();
        channels.sort();
        channels
    }

    pub(crate) async fn record_join(&self, channel: &ChannelName) {
        self.channels.lock().await.insert(channel.clone());
    }

    pub(crate) async fn record_part(&self, channel: &ChannelName) {
        self.channels.lock().await.remove(channel);
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Process-wide map from user name to the live [`User`].
///
/// Enforces name uniqueness among connected users.
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<HashMap<UserName, Arc<User>>>,
}

impl UserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new user.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NameConflict` if the name is in use; the existing
    ///   entry is left untouched.
    pub async fn register(
        &self,
        name: UserName,
        sink: SharedSink,
    ) -> Result<Arc<User>, RegistryError> {
        let mut users = self.users.write().await;
        if users.contains_key(&name) {
            return Err(RegistryError::NameConflict(name));
        }

        let user = Arc::new(User::new(name.clone(), sink));
        users.insert(name, Arc::clone(&user));
        info!(user = %user.name(), online = users.len(), "User registered");
        Ok(user)
    }

    /// Removes `user` if it is still the registered owner of its name.
    ///
    /// Idempotent: returns `false` when the entry is already gone or belongs
    /// to a different session.
    pub async fn deregister(&self, user: &Arc<User>) -> bool {
        let mut users = self.users.write().await;
        let owned = users
            .get(user.name())
            .is_some_and(|existing| Arc::ptr_eq(existing, user));

        if owned {
            users.remove(user.name());
            info!(user = %user.name(), online = users.len(), "User deregistered");
        } else {
            debug!(user = %user.name(), "Deregister skipped, user not registered");
        }
        owned
    }

    pub async fn get(&self, name: &str) -> Option<Arc<User>> {
        self.users.read().await.get(name).cloned()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.users.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}
