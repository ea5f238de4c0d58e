//! Redis integration tests.
//!
//! These tests require a running Redis instance.
//! Run with: `cargo test --test redis_integration -- --ignored`
//!
//! Set `REDIS_URL` environment variable to point to your Redis instance.
//! Default: <redis://localhost:6379>

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use coachline_common::config::{MessagingConfig, RedisConfig};
use coachline_core::{MessageView, RoomEvent, RoomPublisher, RoomRegistry};
use coachline_db::test_utils::fixtures;
use coachline_pubsub::RedisRoomBridge;
use tokio::sync::mpsc;

fn redis_config() -> RedisConfig {
    RedisConfig {
        url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
        prefix: format!("coachline-test-{}", std::process::id()),
    }
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_redis_connection() {
    let bridge = RedisRoomBridge::new(&redis_config(), Arc::new(RoomRegistry::new())).await;
    assert!(bridge.is_ok(), "Failed to connect to Redis: {:?}", bridge.err());
}

#[tokio::test]
#[ignore = "requires running Redis instance"]
async fn test_event_crosses_instances() {
    let config = redis_config();

    // Two instances sharing a prefix, each with its own registry.
    let sender_rooms = Arc::new(RoomRegistry::new());
    let receiver_rooms = Arc::new(RoomRegistry::new());
    let sender = RedisRoomBridge::new(&config, sender_rooms).await.expect("connect");
    let receiver = RedisRoomBridge::new(&config, receiver_rooms.clone())
        .await
        .expect("connect");
    receiver.start().await.expect("subscribe");

    let (tx, mut rx) = mpsc::unbounded_channel();
    receiver_rooms.join("conv1", "conn-remote", tx).await;

    let message = fixtures::message("m1", "conv1", "alice", "hi", 0);
    let view = MessageView::new(&message, None, None, MessagingConfig::default().tz());
    sender
        .publish("conv1", RoomEvent::NewMessage(view))
        .await
        .expect("publish");

    let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out")
        .expect("inbox closed");
    let RoomEvent::NewMessage(view) = received;
    assert_eq!(view.id, "m1");

    sender.shutdown().await.expect("shutdown");
    receiver.shutdown().await.expect("shutdown");
}
