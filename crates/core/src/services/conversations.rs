//! Opening direct conversations.

use coachline_common::{AppError, AppResult, IdGenerator};
use coachline_db::{
    entities::{conversation::ConversationType, user},
    repositories::{ConversationRepository, UserRepository},
};
use serde::Serialize;
use tracing::{debug, info};

use crate::services::auth::AuthenticatedUser;

/// Result of [`ConversationOpener::start_conversation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedConversation {
    /// The direct conversation.
    pub conversation_id: String,
    /// `false` when an existing direct conversation was returned.
    pub created: bool,
}

/// Finds or creates the direct conversation between two users.
#[derive(Clone)]
pub struct ConversationOpener {
    conversation_repo: ConversationRepository,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl ConversationOpener {
    /// Opener backed by the given repositories.
    #[must_use]
    pub const fn new(conversation_repo: ConversationRepository, user_repo: UserRepository) -> Self {
        Self {
            conversation_repo,
            user_repo,
            id_gen: IdGenerator::new(),
        }
    }

    /// Return the direct conversation between the caller and
    /// `participant_id`, creating it when none exists.
    ///
    /// The target must be an active user other than the caller.
    pub async fn start_conversation(
        &self,
        user: &AuthenticatedUser,
        participant_id: &str,
    ) -> AppResult<StartedConversation> {
        if participant_id == user.user_id {
            return Err(AppError::BadRequest(
                "Cannot start a conversation with yourself".to_string(),
            ));
        }

        let other = self
            .user_repo
            .find_by_id(participant_id)
            .await?
            .filter(user::Model::is_active)
            .ok_or_else(|| AppError::NotFound(format!("User not found: {participant_id}")))?;

        if let Some(existing) = self
            .conversation_repo
            .find_direct_between(&user.user_id, &other.id)
            .await?
        {
            return Ok(StartedConversation {
                conversation_id: existing.id,
                created: false,
            });
        }

        let created = self
            .conversation_repo
            .create_with_participants(
                self.id_gen.generate(),
                ConversationType::Direct,
                &[user.user_id.clone(), other.id.clone()],
            )
            .await;

        let conversation = match created {
            Ok(conversation) => conversation,
            // A concurrent request may have created the pair first.
            Err(e) => match self
                .conversation_repo
                .find_direct_between(&user.user_id, &other.id)
                .await
            {
                Ok(Some(existing)) => {
                    debug!(conversation_id = %existing.id, "Direct conversation created concurrently");
                    return Ok(StartedConversation {
                        conversation_id: existing.id,
                        created: false,
                    });
                }
                _ => return Err(e),
            },
        };

        info!(conversation_id = %conversation.id, user_id = %user.user_id, "Direct conversation created");
        Ok(StartedConversation {
            conversation_id: conversation.id,
            created: true,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::views::UserSummary;
    use coachline_db::entities::{conversation, user::UserStatus};
    use coachline_db::test_utils::fixtures;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};
    use std::sync::Arc;

    fn mock() -> MockDatabase {
        MockDatabase::new(DatabaseBackend::Postgres)
    }

    fn opener(conversations: DatabaseConnection, users: DatabaseConnection) -> ConversationOpener {
        ConversationOpener::new(
            ConversationRepository::new(Arc::new(conversations)),
            UserRepository::new(Arc::new(users)),
        )
    }

    fn alice() -> AuthenticatedUser {
        let user = fixtures::user("alice", "Alice");
        AuthenticatedUser {
            user_id: user.id.clone(),
            summary: UserSummary::from(&user),
        }
    }

    #[tokio::test]
    async fn test_returns_existing_direct_conversation() {
        let conversations = mock()
            .append_query_results([[fixtures::conversation("conv1", ConversationType::Direct)]])
            .into_connection();
        let users = mock()
            .append_query_results([[fixtures::coach("coach1", "Kim")]])
            .into_connection();

        let started = opener(conversations, users)
            .start_conversation(&alice(), "coach1")
            .await
            .unwrap();

        assert_eq!(started.conversation_id, "conv1");
        assert!(!started.created);
    }

    #[tokio::test]
    async fn test_creates_when_missing() {
        let conversations = mock()
            .append_query_results([Vec::<conversation::Model>::new()])
            .append_query_results([[fixtures::conversation("conv9", ConversationType::Direct)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();
        let users = mock()
            .append_query_results([[fixtures::coach("coach1", "Kim")]])
            .into_connection();

        let started = opener(conversations, users)
            .start_conversation(&alice(), "coach1")
            .await
            .unwrap();

        assert_eq!(started.conversation_id, "conv9");
        assert!(started.created);
    }

    #[tokio::test]
    async fn test_concurrent_creation_returns_winner() {
        let conversations = mock()
            .append_query_results([Vec::<conversation::Model>::new()])
            .append_query_results([[fixtures::conversation("conv9", ConversationType::Direct)]])
            // No exec result: the participant insert fails, as on a unique violation.
            .append_query_results([[fixtures::conversation("conv1", ConversationType::Direct)]])
            .into_connection();
        let users = mock()
            .append_query_results([[fixtures::coach("coach1", "Kim")]])
            .into_connection();

        let started = opener(conversations, users)
            .start_conversation(&alice(), "coach1")
            .await
            .unwrap();

        assert_eq!(started.conversation_id, "conv1");
        assert!(!started.created);
    }

    #[tokio::test]
    async fn test_creation_failure_without_winner_is_reported() {
        let conversations = mock()
            .append_query_results([Vec::<conversation::Model>::new()])
            .append_query_results([[fixtures::conversation("conv9", ConversationType::Direct)]])
            .append_query_results([Vec::<conversation::Model>::new()])
            .into_connection();
        let users = mock()
            .append_query_results([[fixtures::coach("coach1", "Kim")]])
            .into_connection();

        let result = opener(conversations, users)
            .start_conversation(&alice(), "coach1")
            .await;

        assert!(matches!(result, Err(AppError::Database(_))));
    }

    #[tokio::test]
    async fn test_rejects_self_and_inactive_users() {
        let result = opener(mock().into_connection(), mock().into_connection())
            .start_conversation(&alice(), "alice")
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let mut inactive = fixtures::coach("coach1", "Kim");
        inactive.status = UserStatus::Inactive;
        let result = opener(
            mock().into_connection(),
            mock()
                .append_query_results([vec![inactive]])
                .into_connection(),
        )
        .start_conversation(&alice(), "coach1")
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
