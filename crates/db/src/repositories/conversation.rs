//! Conversation repository.

use std::sync::Arc;

use chrono::Utc;
use coachline_common::{AppError, AppResult};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionTrait,
};

use crate::entities::conversation::ConversationType;
use crate::entities::{Conversation, ConversationParticipant, conversation, conversation_participant};

/// Order-independent key of a user pair.
///
/// Backed by a unique index, so a pair has at most one direct conversation.
#[must_use]
pub fn direct_key(user_id: &str, other_user_id: &str) -> String {
    if user_id <= other_user_id {
        format!("{user_id}:{other_user_id}")
    } else {
        format!("{other_user_id}:{user_id}")
    }
}

/// Repository for conversation operations.
#[derive(Clone)]
pub struct ConversationRepository {
    db: Arc<DatabaseConnection>,
}

impl ConversationRepository {
    /// Create a new conversation repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find conversation by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<conversation::Model>> {
        Conversation::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the active conversations a user participates in, most recently
    /// active first.
    pub async fn find_active_for_user(&self, user_id: &str) -> AppResult<Vec<conversation::Model>> {
        Conversation::find()
            .inner_join(ConversationParticipant)
            .filter(conversation_participant::Column::UserId.eq(user_id))
            .filter(conversation::Column::IsActive.eq(true))
            .order_by_desc(conversation::Column::UpdatedAt)
            .order_by_desc(conversation::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the participants of the given conversations in join order.
    pub async fn find_participants(
        &self,
        conversation_ids: &[String],
    ) -> AppResult<Vec<conversation_participant::Model>> {
        if conversation_ids.is_empty() {
            return Ok(vec![]);
        }

        ConversationParticipant::find()
            .filter(conversation_participant::Column::ConversationId.is_in(conversation_ids.to_vec()))
            .order_by_asc(conversation_participant::Column::JoinedAt)
            .order_by_asc(conversation_participant::Column::UserId)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find the active direct conversation between two users, if any.
    pub async fn find_direct_between(
        &self,
        user_id: &str,
        other_user_id: &str,
    ) -> AppResult<Option<conversation::Model>> {
        Conversation::find()
            .filter(conversation::Column::DirectKey.eq(direct_key(user_id, other_user_id)))
            .filter(conversation::Column::IsActive.eq(true))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Create a conversation together with its participant rows.
    ///
    /// Both inserts share one transaction so a conversation never exists
    /// without its members.
    pub async fn create_with_participants(
        &self,
        id: String,
        conversation_type: ConversationType,
        user_ids: &[String],
    ) -> AppResult<conversation::Model> {
        if user_ids.len() < 2 {
            return Err(AppError::BadRequest(
                "A conversation needs at least two participants".to_string(),
            ));
        }
        if conversation_type == ConversationType::Direct && user_ids.len() != 2 {
            return Err(AppError::BadRequest(
                "A direct conversation has exactly two participants".to_string(),
            ));
        }

        let now = Utc::now();
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let conversation = conversation::ActiveModel {
            id: Set(id.clone()),
            conversation_type: Set(conversation_type),
            last_message: Set(None),
            last_message_time: Set(None),
            direct_key: Set((conversation_type == ConversationType::Direct)
                .then(|| direct_key(&user_ids[0], &user_ids[1]))),
            is_active: Set(true),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let participants = user_ids.iter().map(|user_id| conversation_participant::ActiveModel {
            conversation_id: Set(id.clone()),
            user_id: Set(user_id.clone()),
            unread_count: Set(0),
            joined_at: Set(now.into()),
        });

        ConversationParticipant::insert_many(participants)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(conversation)
    }
}
