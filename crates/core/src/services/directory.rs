//! Conversation directory.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use coachline_common::AppResult;
use coachline_db::{
    entities::{conversation::ConversationType, message, user::UserRole},
    repositories::{ConversationRepository, MessageRepository, UserRepository},
};
use serde::Serialize;

use crate::services::time_format::relative_time;
use crate::services::views::UserSummary;

/// One row of a user's conversation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    /// Conversation id.
    pub id: String,
    /// Direct, group or support.
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    /// First other participant, empty when there is none.
    pub participant_name: String,
    /// Avatar of the first other participant.
    pub participant_avatar: Option<String>,
    /// Role of the first other participant.
    pub participant_role: Option<UserRole>,
    /// Every participant except the requesting user, in join order.
    pub other_participants: Vec<UserSummary>,
    /// Latest visible message, empty when there is none.
    pub last_message: String,
    /// Relative time of the latest message.
    pub last_message_time: String,
    /// Messages the requesting user has not read.
    pub unread_count: i32,
}

/// Loads the conversation list of a user.
#[derive(Clone)]
pub struct ConversationDirectory {
    conversation_repo: ConversationRepository,
    user_repo: UserRepository,
    message_repo: MessageRepository,
    tz: Tz,
}

impl ConversationDirectory {
    /// Directory rendering times in `tz`.
    #[must_use]
    pub const fn new(
        conversation_repo: ConversationRepository,
        user_repo: UserRepository,
        message_repo: MessageRepository,
        tz: Tz,
    ) -> Self {
        Self {
            conversation_repo,
            user_repo,
            message_repo,
            tz,
        }
    }

    /// Active conversations of `user_id`, most recently active first.
    pub async fn load_conversations(&self, user_id: &str) -> AppResult<Vec<ConversationSummary>> {
        self.load_conversations_at(user_id, Utc::now()).await
    }

    /// Same as [`Self::load_conversations`] with relative times computed
    /// against `now`.
    pub async fn load_conversations_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.conversation_repo.find_active_for_user(user_id).await?;
        if conversations.is_empty() {
            return Ok(vec![]);
        }

        let conversation_ids: Vec<String> = conversations.iter().map(|c| c.id.clone()).collect();
        let participants = self
            .conversation_repo
            .find_participants(&conversation_ids)
            .await?;

        let mut seen = HashSet::new();
        let other_ids: Vec<String> = participants
            .iter()
            .filter(|p| p.user_id != user_id && seen.insert(p.user_id.clone()))
            .map(|p| p.user_id.clone())
            .collect();
        let users: HashMap<String, UserSummary> = self
            .user_repo
            .find_by_ids(&other_ids)
            .await?
            .iter()
            .map(|u| (u.id.clone(), UserSummary::from(u)))
            .collect();
        let mut latest: HashMap<String, message::Model> = self
            .message_repo
            .find_latest_visible(&conversation_ids)
            .await?
            .into_iter()
            .map(|m| (m.conversation_id.clone(), m))
            .collect();

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let members = participants
                .iter()
                .filter(|p| p.conversation_id == conversation.id);

            let mut unread_count = 0;
            let mut other_participants = Vec::new();
            for member in members {
                if member.user_id == user_id {
                    unread_count = member.unread_count;
                } else if let Some(summary) = users.get(&member.user_id) {
                    other_participants.push(summary.clone());
                }
            }

            let (last_message, last_message_time) = latest.remove(&conversation.id).map_or_else(
                || (String::new(), String::new()),
                |m| {
                    let time = relative_time(&m.created_at, now, self.tz);
                    (m.content, time)
                },
            );

            let first = other_participants.first();
            summaries.push(ConversationSummary {
                id: conversation.id,
                conversation_type: conversation.conversation_type,
                participant_name: first.map(|u| u.name.clone()).unwrap_or_default(),
                participant_avatar: first.and_then(|u| u.avatar_url.clone()),
                participant_role: first.map(|u| u.role),
                other_participants,
                last_message,
                last_message_time,
                unread_count,
            });
        }

        Ok(summaries)
    }
}
