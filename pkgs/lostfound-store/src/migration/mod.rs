//! Sea-ORM migrations for lostfound-store database schema

pub use sea_orm_migration::prelude::*;

mod m20250301_000001_create_conversations_table;
mod m20250301_000002_create_messages_table;
mod m20250302_000001_create_group_chats_table;
mod m20250302_000002_create_group_members_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250301_000001_create_conversations_table::Migration),
            Box::new(m20250301_000002_create_messages_table::Migration),
            Box::new(m20250302_000001_create_group_chats_table::Migration),
            Box::new(m20250302_000002_create_group_members_table::Migration),
        ]
    }
}
