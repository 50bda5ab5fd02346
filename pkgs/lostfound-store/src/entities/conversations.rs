//! Conversation entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,            // "direct" or "group"
    pub post_id: Option<String>, // originating post for direct chats
    pub user1_id: Option<String>, // lower of the two participant ids
    pub user2_id: Option<String>, // higher of the two participant ids
    pub group_id: Option<String>, // set for group chats only
    pub last_message: Option<String>, // preview text
    pub last_message_at: Option<i64>, // for sorting chats
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::messages::Entity")]
    Messages,
}

impl Related<super::messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
