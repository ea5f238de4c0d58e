//! Messaging relay services.

pub mod auth;
pub mod conversations;
pub mod directory;
pub mod membership;
pub mod message_store;
pub mod read_state;
pub mod rooms;
pub mod time_format;
pub mod views;

pub use auth::{
    AuthenticatedUser, ConnectionAuthenticator, ConnectionContext, JwtTokenVerifier, TokenClaims,
    TokenError, TokenVerifier,
};
pub use conversations::{ConversationOpener, StartedConversation};
pub use directory::{ConversationDirectory, ConversationSummary};
pub use membership::MembershipGuard;
pub use message_store::{MessagePage, MessageStore, SendMessageInput, SendOutcome};
pub use read_state::ReadStateTracker;
pub use rooms::{
    LocalRoomPublisher, RoomEvent, RoomPublisher, RoomPublisherService, RoomRegistry, RoomSender,
};
pub use views::{MessageView, UserSummary};
