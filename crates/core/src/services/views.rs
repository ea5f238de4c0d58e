//! Client-facing projections shared by the messaging services.

use chrono_tz::Tz;
use coachline_db::entities::{message, message::MessageType, user, user::UserRole};
use serde::{Deserialize, Serialize};

use crate::services::time_format::clock_time;

/// Public profile fields of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// User id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Avatar image URL.
    pub avatar_url: Option<String>,
    /// Student, coach or admin.
    pub role: UserRole,
}

impl From<&user::Model> for UserSummary {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            avatar_url: user.avatar_url.clone(),
            role: user.role,
        }
    }
}

/// A message as shown in a conversation.
///
/// `is_me` is relative to the viewer. Broadcast copies leave it `false`
/// and each connection fills it in for its own user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message id.
    pub id: String,
    /// Owning conversation.
    pub conversation_id: String,
    /// Author id.
    pub sender_id: String,
    /// Author display name.
    pub sender_name: String,
    /// Author avatar URL.
    pub sender_avatar: Option<String>,
    /// Message body.
    pub content: String,
    /// `HH:MM` in the display timezone.
    pub time: String,
    /// RFC 3339 creation instant.
    pub created_at: String,
    /// Whether the viewer wrote it.
    pub is_me: bool,
    /// Payload kind.
    #[serde(rename = "type")]
    pub message_type: MessageType,
    /// Whether the recipient has read it.
    pub is_read: bool,
    /// Whether the content was changed after sending.
    pub is_edited: bool,
    /// Id the sending client attached, echoed back for reconciliation.
    pub client_message_id: Option<String>,
}

impl MessageView {
    /// Project a stored message. A missing sender renders with an empty name.
    #[must_use]
    pub fn new(
        message: &message::Model,
        sender: Option<&UserSummary>,
        viewer_id: Option<&str>,
        tz: Tz,
    ) -> Self {
        Self {
            id: message.id.clone(),
            conversation_id: message.conversation_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: sender.map(|s| s.name.clone()).unwrap_or_default(),
            sender_avatar: sender.and_then(|s| s.avatar_url.clone()),
            content: message.content.clone(),
            time: clock_time(&message.created_at, tz),
            created_at: message.created_at.to_rfc3339(),
            is_me: viewer_id == Some(message.sender_id.as_str()),
            message_type: message.message_type,
            is_read: message.is_read,
            is_edited: message.is_edited,
            client_message_id: message.client_message_id.clone(),
        }
    }

    /// Copy of this view as seen by `viewer_id`.
    #[must_use]
    pub fn for_viewer(&self, viewer_id: Option<&str>) -> Self {
        Self {
            is_me: viewer_id == Some(self.sender_id.as_str()),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coachline_db::test_utils::fixtures;

    #[test]
    fn test_message_view_projection() {
        let sender = UserSummary::from(&fixtures::coach("user1", "Ada"));
        let message = fixtures::message("msg1", "conv1", "user1", "hi", 0);

        let view = MessageView::new(&message, Some(&sender), Some("user2"), chrono_tz::UTC);
        assert_eq!(view.sender_name, "Ada");
        assert_eq!(view.time, "09:00");
        assert!(!view.is_me);

        assert!(view.for_viewer(Some("user1")).is_me);
        assert!(!view.for_viewer(None).is_me);
    }

    #[test]
    fn test_message_view_wire_names() {
        let message = fixtures::message("msg1", "conv1", "user1", "hi", 0);
        let view = MessageView::new(&message, None, None, chrono_tz::UTC);

        let json = serde_json::to_value(&view).unwrap_or_default();
        assert_eq!(json["type"], "TEXT");
        assert_eq!(json["isMe"], false);
        assert_eq!(json["senderName"], "");
        assert!(json.get("conversationId").is_some());
    }
}
