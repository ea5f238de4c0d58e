//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `coachline_test`)
//!   `TEST_DB_PASSWORD` (default: `coachline_test`)

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use coachline_db::entities::conversation::ConversationType;
use coachline_db::entities::message::MessageType;
use coachline_db::entities::{ConversationParticipant, Message, User};
use coachline_db::repositories::{ConversationRepository, MessageRepository, NewMessage};
use coachline_db::test_utils::{TestDatabase, TestDbConfig, fixtures};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel};

async fn seed_direct(conn: &DatabaseConnection) -> (ConversationRepository, MessageRepository) {
    for user in [fixtures::user("alice", "Alice"), fixtures::coach("bob", "Bob")] {
        User::insert(user.into_active_model().reset_all())
            .exec(conn)
            .await
            .expect("insert user");
    }

    let db = Arc::new(conn.clone());
    let conversations = ConversationRepository::new(db.clone());
    conversations
        .create_with_participants(
            "conv1".to_string(),
            ConversationType::Direct,
            &["alice".to_string(), "bob".to_string()],
        )
        .await
        .expect("create conversation");

    (conversations, MessageRepository::new(db))
}

fn new_message(id: &str, content: &str, offset_secs: i64, client_id: Option<&str>) -> NewMessage {
    NewMessage {
        id: id.to_string(),
        conversation_id: "conv1".to_string(),
        sender_id: "alice".to_string(),
        content: content.to_string(),
        message_type: MessageType::Text,
        client_message_id: client_id.map(ToString::to_string),
        created_at: (Utc::now() + Duration::seconds(offset_secs)).into(),
    }
}

async fn unread(conn: &DatabaseConnection, user_id: &str) -> i32 {
    ConversationParticipant::find_by_id(("conv1".to_string(), user_id.to_string()))
        .one(conn)
        .await
        .unwrap()
        .expect("participant")
        .unread_count
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_unread_counts_and_mark_read() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let conn = db.connection().clone();
    let (conversations, messages) = seed_direct(&conn).await;

    for i in 0..3 {
        messages
            .append(new_message(&format!("m{i}"), "hi", i, None))
            .await
            .unwrap();
    }

    assert_eq!(unread(&conn, "bob").await, 3);
    assert_eq!(unread(&conn, "alice").await, 0);

    let conversation = conversations.find_by_id("conv1").await.unwrap().unwrap();
    assert_eq!(conversation.last_message.as_deref(), Some("hi"));

    let flagged = messages.mark_read("conv1", "bob", Utc::now().into()).await.unwrap();
    assert_eq!(flagged, 3);
    assert_eq!(unread(&conn, "bob").await, 0);

    let all = Message::find().all(&conn).await.unwrap();
    assert!(all.iter().all(|m| m.is_read && m.read_at.is_some()));

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_history_order_and_soft_delete() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let conn = db.connection().clone();
    let (_, messages) = seed_direct(&conn).await;

    messages.append(new_message("m1", "one", 0, None)).await.unwrap();
    messages.append(new_message("m2", "two", 1, None)).await.unwrap();
    messages.append(new_message("m3", "three", 2, None)).await.unwrap();
    messages.soft_delete("m2").await.unwrap();

    let page = messages.find_page("conv1", 0, 10).await.unwrap();
    let ids: Vec<&str> = page.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["m1", "m3"]);

    let second = messages.find_page("conv1", 1, 1).await.unwrap();
    assert_eq!(second[0].id, "m3");

    let latest = messages
        .find_latest_visible(&["conv1".to_string()])
        .await
        .unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, "m3");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_client_message_id_is_unique_per_conversation() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let conn = db.connection().clone();
    let (_, messages) = seed_direct(&conn).await;

    messages
        .append(new_message("m1", "hi", 0, Some("c-1")))
        .await
        .unwrap();
    let retry = messages.append(new_message("m2", "hi", 1, Some("c-1"))).await;
    assert!(retry.is_err());

    // The failed append rolled back: no second unread increment.
    assert_eq!(unread(&conn, "bob").await, 1);
    let found = messages.find_by_client_id("conv1", "c-1").await.unwrap();
    assert_eq!(found.unwrap().id, "m1");

    db.drop_database().await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_direct_pair_is_unique() {
    let db = TestDatabase::create_unique().await.expect("Failed to connect");
    let conn = db.connection().clone();
    let (conversations, _) = seed_direct(&conn).await;

    let found = conversations.find_direct_between("bob", "alice").await.unwrap();
    assert_eq!(found.unwrap().id, "conv1");

    let mine = conversations.find_active_for_user("alice").await.unwrap();
    assert_eq!(mine.len(), 1);

    let second = conversations
        .create_with_participants(
            "conv2".to_string(),
            ConversationType::Direct,
            &["bob".to_string(), "alice".to_string()],
        )
        .await;
    assert!(second.is_err());

    db.drop_database().await.unwrap();
}

#[test]
fn test_database_url_format() {
    let config = TestDbConfig {
        host: "testhost".to_string(),
        port: 5432,
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        database: "testdb".to_string(),
    };

    let url = config.database_url();
    assert!(url.starts_with("postgres://"));
    assert!(url.contains("testhost:5432"));
    assert!(url.ends_with("/testdb"));
}

#[test]
fn test_postgres_url_format() {
    let config = TestDbConfig::default();
    assert!(config.postgres_url().ends_with("/postgres"));
}
