//! Create conversation table migration.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversation::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversation::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Conversation::Type)
                            .string_len(16)
                            .not_null()
                            .default("direct"),
                    )
                    .col(ColumnDef::new(Conversation::LastMessage).text())
                    .col(ColumnDef::new(Conversation::LastMessageTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(Conversation::DirectKey).string_len(65).unique_key())
                    .col(
                        ColumnDef::new(Conversation::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Conversation::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversation::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Index: updated_at for directory ordering
        manager
            .create_index(
                Index::create()
                    .name("idx_conversation_updated_at")
                    .table(Conversation::Table)
                    .col(Conversation::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversation::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Conversation {
    Table,
    Id,
    Type,
    LastMessage,
    LastMessageTime,
    DirectKey,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
