//! Database repositories.

mod conversation;
mod message;
mod participant;
mod user;

pub use conversation::{ConversationRepository, direct_key};
pub use message::{MessageRepository, NewMessage};
pub use participant::ParticipantRepository;
pub use user::UserRepository;
