//! A single chat room: membership plus best-effort broadcast.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use parley_core::{ChannelName, UserName};
use parley_protocol::ServerMessage;

use super::error::RegistryError;
use super::users::User;
use crate::sink::DeliveryError;

/// Membership map: user name to a non-owning reference to the live user.
type Members = HashMap<UserName, Weak<User>>;

/// One named room.
///
/// `join` and `part` take the membership lock exclusively and notify peers
/// while still holding it, so every member observes joins and parts in the
/// order the channel applied them. `send` only reads the membership and may
/// run concurrently with other sends.
#[derive(Debug)]
pub struct Channel {
    name: ChannelName,
    members: RwLock<Members>,
}

impl Channel {
    pub fn new(name: ChannelName) -> Self {
        Self {
            name,
            members: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    /// Adds `user` and notifies every other member.
    ///
    /// Returns the membership count after the join.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyMember` if the user is already in the channel
    pub async fn join(&self, user: &Arc<User>) -> Result<usize, RegistryError> {
        let mut members = self.members.write().await;
        if members.contains_key(user.name()) {
            return Err(RegistryError::AlreadyMember {
                user: user.name().clone(),
                channel: self.name.clone(),
            });
        }

        members.insert(user.name().clone(), Arc::downgrade(user));
        user.record_join(&self.name).await;

        let notice = ServerMessage::join(self.name.clone(), user.name().clone());
        self.broadcast(&members, user.name(), &notice);

        info!(
            channel = %self.name,
            user = %user.name(),
            members = members.len(),
            "User joined channel"
        );
        Ok(members.len())
    }

    /// Removes `user` and notifies the remaining members.
    ///
    /// Returns the membership count after the part.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotAMember` if the user is not in the channel
    pub async fn part(&self, user: &UserName) -> Result<usize, RegistryError> {
        let mut members = self.members.write().await;
        let Some(departed) = members.remove(user) else {
            return Err(RegistryError::NotAMember {
                user: user.clone(),
                channel: self.name.clone(),
            });
        };

        if let Some(departed) = departed.upgrade() {
            departed.record_part(&self.name).await;
        }

        let notice = ServerMessage::part(self.name.clone(), user.clone());
        self.broadcast(&members, user, &notice);

        info!(
            channel = %self.name,
            user = %user,
            members = members.len(),
            "User parted channel"
        );
        Ok(members.len())
    }

    /// Delivers a chat message to every member except the sender.
    ///
    /// Returns the number of deliveries attempted (members minus one).
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotAMember` if the sender is not in the channel
    pub async fn send(&self, sender: &UserName, content: &str) -> Result<usize, RegistryError> {
        let members = self.members.read().await;
        if !members.contains_key(sender) {
            return Err(RegistryError::NotAMember {
                user: sender.clone(),
                channel: self.name.clone(),
            });
        }

        let msg = ServerMessage::chat(self.name.clone(), sender.clone(), content);
        let attempted = self.broadcast(&members, sender, &msg);

        debug!(
            channel = %self.name,
            sender = %sender,
            recipients = attempted,
            "User sent message"
        );
        Ok(attempted)
    }

    pub async fn is_member(&self, user: &str) -> bool {
        self.members.read().await.contains_key(user)
    }

    pub async fn member_count(&self) -> usize {
        self.members.read().await.len()
    }

    /// Member names, sorted.
    pub async fn member_names(&self) -> Vec<UserName> {
        let mut names: Vec<_> = self.members.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Best-effort fan-out to every member but `except`.
    ///
    /// A failed delivery is logged and skipped; it never removes the peer
    /// and never stops delivery to the others. Returns the number of
    /// deliveries attempted.
    fn broadcast(&self, members: &Members, except: &UserName, msg: &ServerMessage) -> usize {
        let mut attempted = 0;

        for (name, member) in members {
            if name == except {
                continue;
            }
            attempted += 1;

            let result = match member.upgrade() {
                Some(member) => member.deliver(msg.clone()),
                None => Err(DeliveryError::Closed),
            };

            if let Err(e) = result {
                warn!(
                    channel = %self.name,
                    recipient = %name,
                    from = %except,
                    error = %e,
                    "Failed to notify channel member"
                );
            }
        }

        attempted
    }
}
