//! Database entities.

pub mod conversation;
pub mod conversation_participant;
pub mod message;
pub mod user;

pub use conversation::Entity as Conversation;
pub use conversation_participant::Entity as ConversationParticipant;
pub use message::Entity as Message;
pub use user::Entity as User;
