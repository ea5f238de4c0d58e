//! Shared application state.

use std::sync::Arc;

use coachline_common::config::MessagingConfig;
use coachline_core::{
    ConnectionAuthenticator, ConversationDirectory, ConversationOpener, MembershipGuard,
    MessageStore, ReadStateTracker, RoomPublisherService, RoomRegistry, TokenVerifier,
};
use coachline_db::repositories::{
    ConversationRepository, MessageRepository, ParticipantRepository, UserRepository,
};
use sea_orm::DatabaseConnection;

/// Repositories the relay works with.
#[derive(Clone)]
pub struct Repositories {
    pub users: UserRepository,
    pub conversations: ConversationRepository,
    pub participants: ParticipantRepository,
    pub messages: MessageRepository,
}

impl Repositories {
    /// All repositories over one connection pool.
    #[must_use]
    pub fn new(db: &Arc<DatabaseConnection>) -> Self {
        Self {
            users: UserRepository::new(Arc::clone(db)),
            conversations: ConversationRepository::new(Arc::clone(db)),
            participants: ParticipantRepository::new(Arc::clone(db)),
            messages: MessageRepository::new(Arc::clone(db)),
        }
    }
}

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Shared pool, used directly only by the health check.
    pub db: Arc<DatabaseConnection>,
    /// Resolves the handshake token.
    pub authenticator: ConnectionAuthenticator,
    /// Membership checks for room joins.
    pub membership: MembershipGuard,
    /// `load_conversations`.
    pub directory: ConversationDirectory,
    /// History, sends and deletes.
    pub message_store: MessageStore,
    /// `mark_read`.
    pub read_state: ReadStateTracker,
    /// `start_conversation`.
    pub opener: ConversationOpener,
    /// Live rooms of this process.
    pub rooms: Arc<RoomRegistry>,
}

impl AppState {
    /// Wire the messaging services together.
    ///
    /// `publisher` decides how room events travel: straight into `rooms`
    /// for a single instance, or through Redis when several instances run.
    #[must_use]
    pub fn new(
        db: Arc<DatabaseConnection>,
        repos: Repositories,
        verifier: Arc<dyn TokenVerifier>,
        rooms: Arc<RoomRegistry>,
        publisher: RoomPublisherService,
        messaging: &MessagingConfig,
    ) -> Self {
        let membership = MembershipGuard::new(repos.participants.clone());
        let tz = messaging.tz();

        Self {
            db,
            authenticator: ConnectionAuthenticator::new(verifier, repos.users.clone()),
            directory: ConversationDirectory::new(
                repos.conversations.clone(),
                repos.users.clone(),
                repos.messages.clone(),
                tz,
            ),
            message_store: MessageStore::new(
                membership.clone(),
                repos.messages.clone(),
                repos.users.clone(),
                publisher,
                messaging,
            ),
            read_state: ReadStateTracker::new(membership.clone(), repos.messages),
            opener: ConversationOpener::new(repos.conversations, repos.users),
            membership,
            rooms,
        }
    }
}
