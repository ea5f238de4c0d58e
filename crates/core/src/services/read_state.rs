//! Read-state tracking.

use chrono::Utc;
use coachline_common::AppResult;
use coachline_db::repositories::MessageRepository;
use tracing::debug;

use crate::services::membership::MembershipGuard;

/// Resets unread counters and flags messages as read.
///
/// Read receipts are not broadcast.
#[derive(Clone)]
pub struct ReadStateTracker {
    guard: MembershipGuard,
    message_repo: MessageRepository,
}

impl ReadStateTracker {
    /// Tracker checking membership through `guard`.
    #[must_use]
    pub const fn new(guard: MembershipGuard, message_repo: MessageRepository) -> Self {
        Self {
            guard,
            message_repo,
        }
    }

    /// Mark everything others sent in the conversation as read by `user_id`.
    ///
    /// Returns the number of messages that flipped to read.
    pub async fn mark_read(&self, user_id: &str, conversation_id: &str) -> AppResult<u64> {
        self.guard
            .require_member(user_id, conversation_id, "read")
            .await?;

        let flagged = self
            .message_repo
            .mark_read(conversation_id, user_id, Utc::now().into())
            .await?;

        debug!(user_id, conversation_id, flagged, "Conversation marked read");
        Ok(flagged)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use coachline_common::AppError;
    use coachline_db::entities::conversation_participant;
    use coachline_db::repositories::ParticipantRepository;
    use coachline_db::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_mark_read_member() {
        let participants = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[fixtures::participant("conv1", "bob", 2)]])
            .into_connection();
        let messages = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                },
                MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 2,
                },
            ])
            .into_connection();

        let tracker = ReadStateTracker::new(
            MembershipGuard::new(ParticipantRepository::new(Arc::new(participants))),
            MessageRepository::new(Arc::new(messages)),
        );

        assert_eq!(tracker.mark_read("bob", "conv1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mark_read_rechecks_membership() {
        let participants = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<conversation_participant::Model>::new()])
            .into_connection();
        // No exec results: any write would fail with a database error.
        let messages = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let tracker = ReadStateTracker::new(
            MembershipGuard::new(ParticipantRepository::new(Arc::new(participants))),
            MessageRepository::new(Arc::new(messages)),
        );

        let result = tracker.mark_read("mallory", "conv1").await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
    }
}
