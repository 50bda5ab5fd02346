//! Group membership entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "group_members")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub group_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    pub role: String, // "admin" or "member"
    pub joined_at: i64,
    /// Insertion order inside the group; the creator is always 0
    pub position: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::group_chats::Entity",
        from = "Column::GroupId",
        to = "super::group_chats::Column::Id"
    )]
    GroupChat,
}

impl Related<super::group_chats::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GroupChat.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
