//! Membership guard.

use coachline_common::{AppError, AppResult};
use coachline_db::{entities::conversation_participant, repositories::ParticipantRepository};
use tracing::debug;

/// Confirms that a user participates in a conversation before any
/// conversation-scoped read or write.
#[derive(Clone)]
pub struct MembershipGuard {
    participant_repo: ParticipantRepository,
}

impl MembershipGuard {
    /// Guard reading memberships from `participant_repo`.
    #[must_use]
    pub const fn new(participant_repo: ParticipantRepository) -> Self {
        Self { participant_repo }
    }

    /// Return the membership row or `Forbidden(action)`.
    ///
    /// Unknown conversations and non-member access both produce the same
    /// error so callers cannot probe for conversation ids.
    pub async fn require_member(
        &self,
        user_id: &str,
        conversation_id: &str,
        action: &str,
    ) -> AppResult<conversation_participant::Model> {
        match self
            .participant_repo
            .find_membership(conversation_id, user_id)
            .await?
        {
            Some(membership) => Ok(membership),
            None => {
                debug!(user_id, conversation_id, action, "Membership check failed");
                Err(AppError::Forbidden(action.to_string()))
            }
        }
    }
}
