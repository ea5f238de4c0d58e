//! Message store: paginated history reads and appends.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use chrono_tz::Tz;
use coachline_common::{AppError, AppResult, IdGenerator, config::MessagingConfig};
use coachline_db::{
    entities::message::MessageType,
    repositories::{MessageRepository, NewMessage, UserRepository},
};
use serde::Serialize;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::services::auth::AuthenticatedUser;
use crate::services::membership::MembershipGuard;
use crate::services::rooms::{RoomEvent, RoomPublisherService};
use crate::services::views::{MessageView, UserSummary};

/// A page of conversation history, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Conversation the page belongs to.
    pub conversation_id: String,
    /// Visible messages, oldest first.
    pub messages: Vec<MessageView>,
    /// Whether a later page has at least one message.
    pub has_more: bool,
}

/// Input for appending a message.
#[derive(Debug, Clone, Validate)]
pub struct SendMessageInput {
    /// Target conversation.
    #[validate(length(min = 1, max = 64))]
    pub conversation_id: String,
    /// Message body; must contain a non-whitespace character.
    pub content: String,
    /// Payload kind.
    pub message_type: MessageType,
    /// Client-generated id; a retry with the same id is not stored twice.
    #[validate(length(min = 1, max = 64))]
    pub client_message_id: Option<String>,
}

/// Result of a send.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    /// The stored message as seen by the sender.
    pub message: MessageView,
    /// `true` when the client id matched an existing message and nothing
    /// was written or broadcast.
    pub duplicate: bool,
}

/// Reads and appends conversation messages.
#[derive(Clone)]
pub struct MessageStore {
    guard: MembershipGuard,
    message_repo: MessageRepository,
    user_repo: UserRepository,
    publisher: RoomPublisherService,
    id_gen: IdGenerator,
    default_page_size: u64,
    max_page_size: u64,
    max_content_length: usize,
    tz: Tz,
}

impl MessageStore {
    /// Store with paging and length limits taken from `config`.
    #[must_use]
    pub fn new(
        guard: MembershipGuard,
        message_repo: MessageRepository,
        user_repo: UserRepository,
        publisher: RoomPublisherService,
        config: &MessagingConfig,
    ) -> Self {
        Self {
            guard,
            message_repo,
            user_repo,
            publisher,
            id_gen: IdGenerator::new(),
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_content_length: config.max_content_length as usize,
            tz: config.tz(),
        }
    }

    /// Load one page of history. `page` is 1-based.
    pub async fn load_messages(
        &self,
        user_id: &str,
        conversation_id: &str,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> AppResult<MessagePage> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(self.default_page_size);
        if page == 0 {
            return Err(AppError::Validation("page must be at least 1".to_string()));
        }
        if limit == 0 || limit > self.max_page_size {
            return Err(AppError::Validation(format!(
                "limit must be between 1 and {}",
                self.max_page_size
            )));
        }

        self.guard
            .require_member(user_id, conversation_id, "view")
            .await?;

        let offset = (page - 1).saturating_mul(limit);
        let mut rows = self
            .message_repo
            .find_page(conversation_id, offset, limit + 1)
            .await?;
        let has_more = rows.len() as u64 > limit;
        rows.truncate(limit as usize);

        let mut seen = HashSet::new();
        let sender_ids: Vec<String> = rows
            .iter()
            .filter(|m| seen.insert(m.sender_id.clone()))
            .map(|m| m.sender_id.clone())
            .collect();
        let senders: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&sender_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect();

        let messages = rows
            .iter()
            .map(|m| MessageView::new(m, senders.get(&m.sender_id), Some(user_id), self.tz))
            .collect();

        Ok(MessagePage {
            conversation_id: conversation_id.to_string(),
            messages,
            has_more,
        })
    }

    /// Append a message and broadcast it to the conversation's room.
    pub async fn send_message(
        &self,
        sender: &AuthenticatedUser,
        input: SendMessageInput,
    ) -> AppResult<SendOutcome> {
        input.validate()?;
        if input.content.trim().is_empty() {
            return Err(AppError::Validation(
                "Message content cannot be empty".to_string(),
            ));
        }
        if input.content.chars().count() > self.max_content_length {
            return Err(AppError::Validation(format!(
                "Message content exceeds {} characters",
                self.max_content_length
            )));
        }

        let conversation_id = input.conversation_id.as_str();
        self.guard
            .require_member(&sender.user_id, conversation_id, "send messages to")
            .await?;

        if let Some(client_id) = input.client_message_id.as_deref()
            && let Some(existing) = self.find_duplicate(sender, conversation_id, client_id).await?
        {
            return Ok(existing);
        }

        let appended = self
            .message_repo
            .append(NewMessage {
                id: self.id_gen.generate(),
                conversation_id: conversation_id.to_string(),
                sender_id: sender.user_id.clone(),
                content: input.content.clone(),
                message_type: input.message_type,
                client_message_id: input.client_message_id.clone(),
                created_at: Utc::now().into(),
            })
            .await;

        let message = match appended {
            Ok(message) => message,
            // A concurrent retry may have won the unique (conversation, client id) index.
            Err(e) => match input.client_message_id.as_deref() {
                Some(client_id) => match self.find_duplicate(sender, conversation_id, client_id).await {
                    Ok(Some(existing)) => return Ok(existing),
                    _ => return Err(e),
                },
                None => return Err(e),
            },
        };

        info!(
            message_id = %message.id,
            conversation_id = %message.conversation_id,
            sender_id = %message.sender_id,
            "Message stored"
        );

        let view = MessageView::new(&message, Some(&sender.summary), None, self.tz);
        if let Err(e) = self
            .publisher
            .publish(conversation_id, RoomEvent::NewMessage(view.clone()))
            .await
        {
            warn!(error = %e, conversation_id, "Failed to publish new message");
        }

        Ok(SendOutcome {
            message: view.for_viewer(Some(&sender.user_id)),
            duplicate: false,
        })
    }

    async fn find_duplicate(
        &self,
        sender: &AuthenticatedUser,
        conversation_id: &str,
        client_id: &str,
    ) -> AppResult<Option<SendOutcome>> {
        let Some(existing) = self
            .message_repo
            .find_by_client_id(conversation_id, client_id)
            .await?
        else {
            return Ok(None);
        };

        if existing.sender_id != sender.user_id {
            return Err(AppError::Conflict(
                "clientMessageId already used in this conversation".to_string(),
            ));
        }

        debug!(message_id = %existing.id, client_id, "Duplicate send suppressed");
        Ok(Some(SendOutcome {
            message: MessageView::new(
                &existing,
                Some(&sender.summary),
                Some(&sender.user_id),
                self.tz,
            ),
            duplicate: true,
        }))
    }

    /// Soft-delete one of the user's own messages.
    pub async fn delete_message(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> AppResult<()> {
        self.guard
            .require_member(user_id, conversation_id, "delete messages in")
            .await?;

        let message = self
            .message_repo
            .find_by_id(message_id)
            .await?
            .filter(|m| m.conversation_id == conversation_id && !m.is_deleted)
            .ok_or_else(|| AppError::NotFound(format!("Message not found: {message_id}")))?;

        if message.sender_id != user_id {
            return Err(AppError::Forbidden(
                "delete other people's messages in".to_string(),
            ));
        }

        self.message_repo.soft_delete(message_id).await?;
        info!(message_id, conversation_id, "Message deleted");
        Ok(())
    }
}
