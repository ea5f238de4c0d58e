//! Conversation entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    /// Exactly two participants.
    #[sea_orm(string_value = "direct")]
    Direct,
    /// Two or more participants.
    #[sea_orm(string_value = "group")]
    Group,
    /// A user talking to platform support.
    #[sea_orm(string_value = "support")]
    Support,
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(column_name = "type")]
    pub conversation_type: ConversationType,

    /// Preview of the latest message (denormalized)
    #[sea_orm(column_type = "Text", nullable)]
    pub last_message: Option<String>,

    #[sea_orm(nullable)]
    pub last_message_time: Option<DateTimeWithTimeZone>,

    /// Sorted `user:user` pair, set for direct conversations only
    #[sea_orm(unique, nullable)]
    pub direct_key: Option<String>,

    /// Soft-disable flag; inactive conversations are hidden from the directory
    #[sea_orm(default_value = true)]
    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    /// Bumped on every message; drives directory ordering
    #[sea_orm(indexed)]
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation_participant::Entity")]
    Participants,

    #[sea_orm(has_many = "super::message::Entity")]
    Messages,
}

impl Related<super::conversation_participant::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Participants.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
