use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    Kind,
    PostId,
    User1Id,
    User2Id,
    GroupId,
    LastMessage,
    LastMessageAt,
    CreatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250301_000001_create_conversations_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversations::Kind).string().not_null())
                    .col(ColumnDef::new(Conversations::PostId).string())
                    .col(ColumnDef::new(Conversations::User1Id).string())
                    .col(ColumnDef::new(Conversations::User2Id).string())
                    .col(ColumnDef::new(Conversations::GroupId).string())
                    .col(ColumnDef::new(Conversations::LastMessage).string())
                    .col(ColumnDef::new(Conversations::LastMessageAt).big_integer())
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // Natural key for direct chats; NULL columns never collide, so group rows are unaffected
        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_natural_key")
                    .table(Conversations::Table)
                    .col(Conversations::PostId)
                    .col(Conversations::User1Id)
                    .col(Conversations::User2Id)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_group")
                    .table(Conversations::Table)
                    .col(Conversations::GroupId)
                    .unique()
                    .if_not_exists()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_last_message_at")
                    .table(Conversations::Table)
                    .col(Conversations::LastMessageAt)
                    .if_not_exists()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await
    }
}
