//! Room fanout.
//!
//! A room is the set of live connections subscribed to one conversation.
//! The registry is process-local; [`RoomPublisher`] is the seam where a
//! cross-instance transport (see the pubsub crate) plugs in.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coachline_common::AppResult;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::services::views::MessageView;

/// Events delivered to every connection in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RoomEvent {
    /// A message was appended to the conversation.
    NewMessage(MessageView),
}

/// Sending half of a connection's room inbox.
pub type RoomSender = mpsc::UnboundedSender<RoomEvent>;

/// Conversation id to connected sockets.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, HashMap<String, RoomSender>>>,
}

impl RoomRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Returns `false` if it was already there.
    pub async fn join(&self, conversation_id: &str, connection_id: &str, sender: RoomSender) -> bool {
        let mut rooms = self.rooms.write().await;
        let room = rooms.entry(conversation_id.to_string()).or_default();
        if room.contains_key(connection_id) {
            return false;
        }
        room.insert(connection_id.to_string(), sender);
        debug!(conversation_id, connection_id, members = room.len(), "Joined room");
        true
    }

    /// Remove a connection from a room. Returns whether it was a member.
    pub async fn leave(&self, conversation_id: &str, connection_id: &str) -> bool {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(conversation_id) else {
            return false;
        };
        let removed = room.remove(connection_id).is_some();
        if room.is_empty() {
            rooms.remove(conversation_id);
        }
        removed
    }

    /// Remove a connection from the given rooms under one lock.
    pub async fn drop_connection<I, S>(&self, connection_id: &str, conversation_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rooms = self.rooms.write().await;
        for conversation_id in conversation_ids {
            let conversation_id = conversation_id.as_ref();
            if let Some(room) = rooms.get_mut(conversation_id) {
                room.remove(connection_id);
                if room.is_empty() {
                    rooms.remove(conversation_id);
                }
            }
        }
    }

    /// Deliver an event to every connection currently in the room.
    ///
    /// Returns the number of connections reached. Connections whose inbox
    /// is closed are pruned.
    pub async fn deliver(&self, conversation_id: &str, event: &RoomEvent) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        {
            let rooms = self.rooms.read().await;
            let Some(room) = rooms.get(conversation_id) else {
                return 0;
            };
            for (connection_id, sender) in room {
                if sender.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(connection_id.clone());
                }
            }
        }

        for connection_id in closed {
            self.leave(conversation_id, &connection_id).await;
        }

        delivered
    }

    /// Number of connections in a room.
    pub async fn member_count(&self, conversation_id: &str) -> usize {
        self.rooms
            .read()
            .await
            .get(conversation_id)
            .map_or(0, HashMap::len)
    }

    /// Whether a connection is in a room.
    pub async fn contains(&self, conversation_id: &str, connection_id: &str) -> bool {
        self.rooms
            .read()
            .await
            .get(conversation_id)
            .is_some_and(|room| room.contains_key(connection_id))
    }
}

/// Publishes room events to every instance serving the room.
#[async_trait]
pub trait RoomPublisher: Send + Sync {
    /// Publish an event to a conversation's room.
    async fn publish(&self, conversation_id: &str, event: RoomEvent) -> AppResult<()>;
}

/// Shared room publisher.
pub type RoomPublisherService = Arc<dyn RoomPublisher>;

/// Single-instance publisher that delivers straight into the registry.
#[derive(Clone)]
pub struct LocalRoomPublisher {
    registry: Arc<RoomRegistry>,
}

impl LocalRoomPublisher {
    /// Publisher delivering into `registry`.
    #[must_use]
    pub const fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl RoomPublisher for LocalRoomPublisher {
    async fn publish(&self, conversation_id: &str, event: RoomEvent) -> AppResult<()> {
        let delivered = self.registry.deliver(conversation_id, &event).await;
        debug!(conversation_id, delivered, "Room event delivered");
        Ok(())
    }
}
