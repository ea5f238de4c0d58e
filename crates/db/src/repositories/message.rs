//! Message repository.

use std::sync::Arc;

use coachline_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
    prelude::DateTimeWithTimeZone,
    sea_query::Expr,
};

use crate::entities::message::MessageType;
use crate::entities::{
    Conversation, ConversationParticipant, Message, conversation, conversation_participant,
    message,
};

/// A message about to be appended to a conversation.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub message_type: MessageType,
    pub client_message_id: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

/// Repository for message operations.
#[derive(Clone)]
pub struct MessageRepository {
    db: Arc<DatabaseConnection>,
}

impl MessageRepository {
    /// Create a new message repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a message by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<message::Model>> {
        Message::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a page of visible messages, oldest first.
    ///
    /// Soft-deleted messages are excluded before offset and limit apply.
    pub async fn find_page(
        &self,
        conversation_id: &str,
        offset: u64,
        limit: u64,
    ) -> AppResult<Vec<message::Model>> {
        Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .filter(message::Column::IsDeleted.eq(false))
            .order_by_asc(message::Column::CreatedAt)
            .order_by_asc(message::Column::Id)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the most recent visible message of each given conversation.
    ///
    /// One `DISTINCT ON (conversation_id)` query; conversations without a
    /// visible message have no row.
    pub async fn find_latest_visible(
        &self,
        conversation_ids: &[String],
    ) -> AppResult<Vec<message::Model>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        Message::find()
            .distinct_on([message::Column::ConversationId])
            .filter(message::Column::ConversationId.is_in(conversation_ids.to_vec()))
            .filter(message::Column::IsDeleted.eq(false))
            .order_by_asc(message::Column::ConversationId)
            .order_by_desc(message::Column::CreatedAt)
            .order_by_desc(message::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find a message by its client-generated id.
    pub async fn find_by_client_id(
        &self,
        conversation_id: &str,
        client_message_id: &str,
    ) -> AppResult<Option<message::Model>> {
        Message::find()
            .filter(message::Column::ConversationId.eq(conversation_id))
            .filter(message::Column::ClientMessageId.eq(client_message_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Append a message to a conversation.
    ///
    /// Inserts the message, refreshes the conversation summary and bumps
    /// the unread counter of every other participant in one transaction.
    /// The increment is evaluated by the database, so concurrent appends
    /// never lose updates.
    pub async fn append(&self, input: NewMessage) -> AppResult<message::Model> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let message = message::ActiveModel {
            id: Set(input.id),
            conversation_id: Set(input.conversation_id),
            sender_id: Set(input.sender_id),
            content: Set(input.content),
            message_type: Set(input.message_type),
            client_message_id: Set(input.client_message_id),
            is_read: Set(false),
            read_at: Set(None),
            is_edited: Set(false),
            is_deleted: Set(false),
            created_at: Set(input.created_at),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Conversation::update_many()
            .col_expr(
                conversation::Column::LastMessage,
                Expr::value(message.content.clone()),
            )
            .col_expr(
                conversation::Column::LastMessageTime,
                Expr::value(message.created_at),
            )
            .col_expr(conversation::Column::UpdatedAt, Expr::value(message.created_at))
            .filter(conversation::Column::Id.eq(message.conversation_id.as_str()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        ConversationParticipant::update_many()
            .col_expr(
                conversation_participant::Column::UnreadCount,
                Expr::col(conversation_participant::Column::UnreadCount).add(1),
            )
            .filter(conversation_participant::Column::ConversationId.eq(message.conversation_id.as_str()))
            .filter(conversation_participant::Column::UserId.ne(message.sender_id.as_str()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(message)
    }

    /// Mark a conversation read for one participant.
    ///
    /// Resets the reader's unread counter and flags every unread message
    /// sent by someone else. Returns the number of messages flagged.
    pub async fn mark_read(
        &self,
        conversation_id: &str,
        reader_id: &str,
        read_at: DateTimeWithTimeZone,
    ) -> AppResult<u64> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        ConversationParticipant::update_many()
            .col_expr(conversation_participant::Column::UnreadCount, Expr::value(0))
            .filter(conversation_participant::Column::ConversationId.eq(conversation_id))
            .filter(conversation_participant::Column::UserId.eq(reader_id))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let result = Message::update_many()
            .col_expr(message::Column::IsRead, Expr::value(true))
            .col_expr(message::Column::ReadAt, Expr::value(read_at))
            .filter(message::Column::ConversationId.eq(conversation_id))
            .filter(message::Column::SenderId.ne(reader_id))
            .filter(message::Column::IsRead.eq(false))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected)
    }

    /// Soft-delete a message. The row stays but is hidden from reads.
    pub async fn soft_delete(&self, id: &str) -> AppResult<()> {
        Message::update_many()
            .col_expr(message::Column::IsDeleted, Expr::value(true))
            .filter(message::Column::Id.eq(id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}
