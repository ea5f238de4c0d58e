//! Socket wire protocol.
//!
//! Frames are JSON text messages of the form `{"type": "...", "body": ...}`.

use coachline_core::{ConversationSummary, MessagePage, MessageView, StartedConversation};
use coachline_db::entities::message::MessageType;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Client-to-server events.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ClientEvent {
    /// List the caller's conversations.
    LoadConversations,
    /// Read one page of history.
    LoadMessages(LoadMessagesPayload),
    /// Subscribe this connection to a conversation's room.
    JoinConversation(String),
    /// Append a message and fan it out to the room.
    SendMessage(SendMessagePayload),
    /// Reset the caller's unread state for a conversation.
    MarkRead(String),
    /// Unsubscribe from a conversation's room.
    LeaveConversation(String),
    /// Find or create a direct conversation with another user.
    StartConversation(StartConversationPayload),
    /// Soft-delete one of the caller's messages.
    DeleteMessage(DeleteMessagePayload),
}

impl ClientEvent {
    /// Event name as it appears on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::LoadConversations => "load_conversations",
            Self::LoadMessages(_) => "load_messages",
            Self::JoinConversation(_) => "join_conversation",
            Self::SendMessage(_) => "send_message",
            Self::MarkRead(_) => "mark_read",
            Self::LeaveConversation(_) => "leave_conversation",
            Self::StartConversation(_) => "start_conversation",
            Self::DeleteMessage(_) => "delete_message",
        }
    }
}

/// Body of `load_messages`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoadMessagesPayload {
    /// Conversation to read.
    #[validate(length(min = 1, max = 64))]
    pub conversation_id: String,
    /// 1-based page number, first page when omitted.
    #[validate(range(min = 1))]
    pub page: Option<u64>,
    /// Page size, the configured default when omitted.
    #[validate(range(min = 1))]
    pub limit: Option<u64>,
}

/// Body of `send_message`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessagePayload {
    /// Target conversation.
    #[validate(length(min = 1, max = 64))]
    pub conversation_id: String,
    /// Message body.
    pub content: String,
    /// `TEXT` unless given.
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    /// Client-generated id; a resend with the same id is not stored twice.
    #[validate(length(min = 1, max = 64))]
    pub client_message_id: Option<String>,
}

/// Body of `start_conversation`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartConversationPayload {
    /// The other user.
    #[validate(length(min = 1, max = 64))]
    pub participant_id: String,
}

/// Body of `delete_message`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessagePayload {
    /// Conversation holding the message.
    #[validate(length(min = 1, max = 64))]
    pub conversation_id: String,
    /// Message to hide.
    #[validate(length(min = 1, max = 64))]
    pub message_id: String,
}

/// Payload of the `error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Human-readable reason, safe to show to the user.
    pub message: String,
}

/// Server-to-client events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Reply to `load_conversations`.
    ConversationsLoaded(Vec<ConversationSummary>),
    /// Reply to `load_messages`.
    MessagesLoaded(MessagePage),
    /// A message in a joined room, or the echo of a deduplicated send.
    NewMessage(MessageView),
    /// Reply to `start_conversation`.
    ConversationStarted(StartedConversation),
    /// Failure of the preceding client event.
    Error(ErrorBody),
}

impl ServerEvent {
    /// `error` event carrying `message`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorBody {
            message: message.into(),
        })
    }

    /// Serialize to a text frame.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
