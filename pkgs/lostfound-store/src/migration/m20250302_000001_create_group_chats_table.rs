use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
enum GroupChats {
    Table,
    Id,
    Name,
    Description,
    AvatarUrl,
    CreatedBy,
    CreatedAt,
    UpdatedAt,
}

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250302_000001_create_group_chats_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GroupChats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GroupChats::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GroupChats::Name).string().not_null())
                    .col(ColumnDef::new(GroupChats::Description).string())
                    .col(ColumnDef::new(GroupChats::AvatarUrl).string())
                    .col(ColumnDef::new(GroupChats::CreatedBy).string().not_null())
                    .col(ColumnDef::new(GroupChats::CreatedAt).big_integer().not_null())
                    .col(ColumnDef::new(GroupChats::UpdatedAt).big_integer().not_null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupChats::Table).to_owned())
            .await
    }
}
