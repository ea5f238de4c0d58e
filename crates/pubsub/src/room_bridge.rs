//! Cross-instance room fanout over Redis Pub/Sub.

use std::sync::Arc;

use async_trait::async_trait;
use coachline_common::{AppError, AppResult, config::RedisConfig as RelayRedisConfig};
use coachline_core::{RoomEvent, RoomPublisher, RoomRegistry};
use fred::clients::{Client, SubscriberClient};
use fred::error::Error as RedisError;
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Channel carrying room events for a key prefix.
#[must_use]
pub fn rooms_channel(prefix: &str) -> String {
    format!("{prefix}:rooms")
}

/// A room event on the wire between instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEnvelope {
    /// Room the event belongs to.
    pub conversation_id: String,
    /// The event to deliver.
    pub event: RoomEvent,
}

impl RoomEnvelope {
    /// Parse a payload received from Redis.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Drain a subscriber stream into the local registry until it closes.
///
/// A lagging receiver skips the overwritten events and keeps going; only a
/// closed channel ends the loop. Returns the number of events delivered.
pub async fn forward_room_events<M, F>(
    mut stream: broadcast::Receiver<M>,
    registry: &RoomRegistry,
    payload: F,
) -> u64
where
    M: Clone,
    F: Fn(&M) -> Option<String>,
{
    let mut received = 0;
    loop {
        let message = match stream.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Room event subscriber lagged, events dropped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let Some(payload) = payload(&message) else {
            continue;
        };
        match RoomEnvelope::decode(&payload) {
            Ok(envelope) => {
                let delivered = registry
                    .deliver(&envelope.conversation_id, &envelope.event)
                    .await;
                received += 1;
                debug!(
                    conversation_id = %envelope.conversation_id,
                    delivered,
                    "Room event received"
                );
            }
            Err(e) => warn!(error = %e, "Failed to parse room event"),
        }
    }
    received
}

/// [`RoomPublisher`] that routes every event through Redis.
///
/// Events are not delivered locally on publish. The subscriber loop
/// started by [`RedisRoomBridge::start`] receives them back like any other
/// instance and hands them to the local [`RoomRegistry`].
#[derive(Clone)]
pub struct RedisRoomBridge {
    publisher: Client,
    subscriber: SubscriberClient,
    channel: String,
    registry: Arc<RoomRegistry>,
}

impl RedisRoomBridge {
    /// Connect the publishing and subscribing clients.
    pub async fn new(
        config: &RelayRedisConfig,
        registry: Arc<RoomRegistry>,
    ) -> Result<Self, RedisError> {
        let redis_config = RedisConfig::from_url(&config.url)?;

        let publisher = Client::new(redis_config.clone(), None, None, None);
        publisher.init().await?;

        let subscriber = SubscriberClient::new(redis_config, None, None, None);
        subscriber.init().await?;

        let channel = rooms_channel(&config.prefix);
        info!(channel = %channel, "Redis room bridge connected");

        Ok(Self {
            publisher,
            subscriber,
            channel,
            registry,
        })
    }

    /// Subscribe to the rooms channel and start delivering into the registry.
    pub async fn start(&self) -> Result<JoinHandle<()>, RedisError> {
        self.subscriber.subscribe(self.channel.as_str()).await?;
        info!(channel = %self.channel, "Subscribed to room events");

        let registry = self.registry.clone();
        let message_stream = self.subscriber.message_rx();

        Ok(tokio::spawn(async move {
            let received = forward_room_events(message_stream, &registry, |message| {
                message.value.as_string()
            })
            .await;
            info!(received, "Room event stream ended");
        }))
    }

    /// Disconnect both clients.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        self.publisher.quit().await?;
        info!("Redis room bridge shut down");
        Ok(())
    }
}

#[async_trait]
impl RoomPublisher for RedisRoomBridge {
    async fn publish(&self, conversation_id: &str, event: RoomEvent) -> AppResult<()> {
        let envelope = RoomEnvelope {
            conversation_id: conversation_id.to_string(),
            event,
        };
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| AppError::Internal(format!("Serialization error: {e}")))?;

        let _: () = self
            .publisher
            .publish(self.channel.as_str(), payload)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))?;
        debug!(channel = %self.channel, conversation_id, "Published room event");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use coachline_core::MessageView;
    use coachline_db::test_utils::fixtures;

    fn envelope() -> RoomEnvelope {
        let message = fixtures::message("m1", "conv1", "alice", "hi", 0);
        RoomEnvelope {
            conversation_id: "conv1".to_string(),
            event: RoomEvent::NewMessage(MessageView::new(
                &message,
                None,
                None,
                coachline_common::config::MessagingConfig::default().tz(),
            )),
        }
    }

    #[test]
    fn test_rooms_channel() {
        assert_eq!(rooms_channel("coachline"), "coachline:rooms");
    }

    #[test]
    fn test_envelope_wire_shape() {
        let json = serde_json::to_string(&envelope()).unwrap();
        assert!(json.contains(r#""conversationId":"conv1""#));
        assert!(json.contains(r#""kind":"new_message""#));

        assert_eq!(RoomEnvelope::decode(&json).unwrap(), envelope());
    }

    #[tokio::test]
    async fn test_forwarding_survives_lagged_subscriber() {
        let registry = RoomRegistry::new();
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::unbounded_channel();
        registry.join("conv1", "conn1", conn_tx).await;

        let payload = serde_json::to_string(&envelope()).unwrap();
        let (tx, rx) = broadcast::channel::<String>(4);
        // Overflow the buffer before the loop starts draining.
        for _ in 0..6 {
            tx.send(payload.clone()).unwrap();
        }
        tx.send("not json".to_string()).unwrap();
        drop(tx);

        let received = forward_room_events(rx, &registry, |p| Some(p.clone())).await;

        assert_eq!(received, 3);
        let mut inbox = 0;
        while conn_rx.try_recv().is_ok() {
            inbox += 1;
        }
        assert_eq!(inbox, 3);
    }

    #[tokio::test]
    async fn test_forwarding_keeps_running_after_lag() {
        let registry = Arc::new(RoomRegistry::new());
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::unbounded_channel();
        registry.join("conv1", "conn1", conn_tx).await;

        let payload = serde_json::to_string(&envelope()).unwrap();
        let (tx, rx) = broadcast::channel::<String>(2);
        for _ in 0..5 {
            tx.send(payload.clone()).unwrap();
        }

        let forwarding = {
            let registry = registry.clone();
            tokio::spawn(async move {
                forward_room_events(rx, &registry, |p| Some(p.clone())).await
            })
        };

        // Drain the two buffered events, then publish a fresh one.
        conn_rx.recv().await.unwrap();
        conn_rx.recv().await.unwrap();
        tx.send(payload).unwrap();
        let late = conn_rx.recv().await.unwrap();
        assert!(matches!(late, RoomEvent::NewMessage(ref view) if view.id == "m1"));

        drop(tx);
        assert_eq!(forwarding.await.unwrap(), 3);
    }

    #[test]
    fn test_decode_rejects_foreign_payloads() {
        assert!(RoomEnvelope::decode(r#"{"type":"noteCreated","id":"n1"}"#).is_err());
    }
}
