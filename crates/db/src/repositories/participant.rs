//! Conversation participant repository.

use std::sync::Arc;

use crate::entities::{ConversationParticipant, conversation_participant};
use coachline_common::{AppError, AppResult};
use sea_orm::{DatabaseConnection, EntityTrait};

/// Repository for membership lookups.
#[derive(Clone)]
pub struct ParticipantRepository {
    db: Arc<DatabaseConnection>,
}

impl ParticipantRepository {
    /// Create a new participant repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find the membership row for a (conversation, user) pair.
    pub async fn find_membership(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Option<conversation_participant::Model>> {
        ConversationParticipant::find_by_id((conversation_id.to_string(), user_id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[tokio::test]
    async fn test_find_membership_missing() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<conversation_participant::Model>::new()])
                .into_connection(),
        );

        let repo = ParticipantRepository::new(db);
        assert!(repo.find_membership("conv1", "intruder").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_membership_carries_unread_count() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[fixtures::participant("conv1", "user1", 7)]])
                .into_connection(),
        );

        let repo = ParticipantRepository::new(db);
        let membership = repo.find_membership("conv1", "user1").await.unwrap().unwrap();
        assert_eq!(membership.unread_count, 7);
    }
}
