//! Group manager for storing and managing group chats and their members

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

use crate::conversation_store::ConversationStore;
use crate::entities::{conversations, group_chats, group_members};
use crate::error::{Result, StoreError};
use crate::message_store::MessageStore;
use crate::models::{GroupChat, GroupMember, GroupRole, GroupUpdate};
use crate::{from_millis, now_millis};

impl From<group_chats::Model> for GroupChat {
    fn from(model: group_chats::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            avatar_url: model.avatar_url,
            created_by: model.created_by,
            created_at: from_millis(model.created_at),
            updated_at: from_millis(model.updated_at),
        }
    }
}

impl TryFrom<group_members::Model> for GroupMember {
    type Error = StoreError;

    fn try_from(model: group_members::Model) -> Result<Self> {
        Ok(Self {
            group_id: model.group_id,
            user_id: model.user_id,
            role: model.role.parse()?,
            joined_at: from_millis(model.joined_at),
        })
    }
}

/// Group manager for storing and managing group chats
#[derive(Clone)]
pub struct GroupManager {
    db: DatabaseConnection,
}

impl GroupManager {
    /// Create a new group manager
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a group with its creator as first admin and its conversation
    pub async fn create(
        &self,
        name: &str,
        description: Option<&str>,
        creator_id: &str,
        member_ids: &[String],
    ) -> Result<GroupChat> {
        if name.trim().is_empty() {
            return Err(StoreError::Validation(
                "group name must not be empty".to_string(),
            ));
        }
        if creator_id.is_empty() {
            return Err(StoreError::Validation(
                "group creator must not be empty".to_string(),
            ));
        }

        let now = now_millis();
        let group = group_chats::Model {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            description: description.map(str::to_string),
            avatar_url: None,
            created_by: creator_id.to_string(),
            created_at: now,
            updated_at: now,
        };

        let txn = self.db.begin().await?;

        group_chats::Entity::insert(group_chats::ActiveModel {
            id: Set(group.id.clone()),
            name: Set(group.name.clone()),
            description: Set(group.description.clone()),
            avatar_url: Set(None),
            created_by: Set(group.created_by.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .exec_without_returning(&txn)
        .await?;

        let mut seen = HashSet::new();
        seen.insert(creator_id);
        let mut rows = vec![group_members::ActiveModel {
            group_id: Set(group.id.clone()),
            user_id: Set(creator_id.to_string()),
            role: Set(GroupRole::Admin.as_str().to_string()),
            joined_at: Set(now),
            position: Set(0),
        }];
        for member in member_ids {
            if member.is_empty() || !seen.insert(member.as_str()) {
                continue;
            }
            rows.push(group_members::ActiveModel {
                group_id: Set(group.id.clone()),
                user_id: Set(member.clone()),
                role: Set(GroupRole::Member.as_str().to_string()),
                joined_at: Set(now),
                position: Set(rows.len() as i32),
            });
        }
        let member_count = rows.len();

        group_members::Entity::insert_many(rows)
            .exec_without_returning(&txn)
            .await?;

        ConversationStore::insert_group_conversation(&txn, &group.id, now).await?;

        txn.commit().await?;

        info!(
            "Group '{}' ({}) created by {} with {} members",
            group.name, group.id, creator_id, member_count
        );
        Ok(group.into())
    }

    /// Get a group by id
    pub async fn get(&self, group_id: &str) -> Result<Option<GroupChat>> {
        debug!("Getting group: {}", group_id);

        let result = group_chats::Entity::find_by_id(group_id.to_string())
            .one(&self.db)
            .await?;

        Ok(result.map(GroupChat::from))
    }

    async fn require(&self, group_id: &str) -> Result<GroupChat> {
        self.get(group_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("group {}", group_id)))
    }

    /// Groups a user belongs to, newest first
    pub async fn list_for(&self, user_id: &str) -> Result<Vec<GroupChat>> {
        let group_ids: Vec<String> = group_members::Entity::find()
            .filter(group_members::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();

        if group_ids.is_empty() {
            return Ok(Vec::new());
        }

        let groups = group_chats::Entity::find()
            .filter(group_chats::Column::Id.is_in(group_ids))
            .order_by_desc(group_chats::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(groups.into_iter().map(GroupChat::from).collect())
    }

    /// Members of a group in join order
    pub async fn members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id))
            .order_by_asc(group_members::Column::Position)
            .all(&self.db)
            .await?
            .into_iter()
            .map(GroupMember::try_from)
            .collect()
    }

    /// Role of a user in a group, if they are a member
    pub async fn role_of(&self, group_id: &str, user_id: &str) -> Result<Option<GroupRole>> {
        group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(&self.db)
            .await?
            .map(|m| m.role.parse())
            .transpose()
    }

    async fn require_admin(&self, group_id: &str, actor_id: &str) -> Result<()> {
        match self.role_of(group_id, actor_id).await? {
            Some(GroupRole::Admin) => Ok(()),
            _ => Err(StoreError::Forbidden(format!(
                "{} is not an admin of group {}",
                actor_id, group_id
            ))),
        }
    }

    /// Add a member; only admins may do this
    pub async fn add_member(
        &self,
        actor_id: &str,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember> {
        self.require(group_id).await?;
        self.require_admin(group_id, actor_id).await?;

        if self.role_of(group_id, user_id).await?.is_some() {
            return Err(StoreError::Validation(format!(
                "{} is already a member of group {}",
                user_id, group_id
            )));
        }

        let last = group_members::Entity::find()
            .filter(group_members::Column::GroupId.eq(group_id))
            .order_by_desc(group_members::Column::Position)
            .one(&self.db)
            .await?;
        let position = last.map(|m| m.position + 1).unwrap_or(0);

        let now = now_millis();
        group_members::Entity::insert(group_members::ActiveModel {
            group_id: Set(group_id.to_string()),
            user_id: Set(user_id.to_string()),
            role: Set(role.as_str().to_string()),
            joined_at: Set(now),
            position: Set(position),
        })
        .exec_without_returning(&self.db)
        .await?;

        info!("Added {} to group {} as {}", user_id, group_id, role.as_str());
        Ok(GroupMember {
            group_id: group_id.to_string(),
            user_id: user_id.to_string(),
            role,
            joined_at: from_millis(now),
        })
    }

    /// Remove a member; admins may remove anyone, members only themselves
    ///
    /// The last admin cannot leave or be removed.
    pub async fn remove_member(&self, actor_id: &str, group_id: &str, user_id: &str) -> Result<()> {
        self.require(group_id).await?;
        if actor_id != user_id {
            self.require_admin(group_id, actor_id).await?;
        }

        let txn = self.db.begin().await?;

        let member = group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} in group {}", user_id, group_id)))?;

        if member.role.parse::<GroupRole>()? == GroupRole::Admin {
            let admins = group_members::Entity::find()
                .filter(group_members::Column::GroupId.eq(group_id))
                .filter(group_members::Column::Role.eq(GroupRole::Admin.as_str()))
                .count(&txn)
                .await?;
            if admins <= 1 {
                return Err(StoreError::Validation(format!(
                    "{} is the last admin of group {}",
                    user_id, group_id
                )));
            }
        }

        group_members::Entity::delete_by_id((group_id.to_string(), user_id.to_string()))
            .exec(&txn)
            .await?;
        txn.commit().await?;

        info!("Removed {} from group {}", user_id, group_id);
        Ok(())
    }

    /// Update group metadata; only admins may do this
    pub async fn update(&self, actor_id: &str, group_id: &str, update: GroupUpdate) -> Result<GroupChat> {
        let model = group_chats::Entity::find_by_id(group_id.to_string())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("group {}", group_id)))?;
        self.require_admin(group_id, actor_id).await?;

        let mut active: group_chats::ActiveModel = model.into();
        if let Some(name) = update.name {
            if name.trim().is_empty() {
                return Err(StoreError::Validation(
                    "group name must not be empty".to_string(),
                ));
            }
            active.name = Set(name.trim().to_string());
        }
        if let Some(description) = update.description {
            active.description = Set(Some(description));
        }
        if let Some(avatar_url) = update.avatar_url {
            active.avatar_url = Set(Some(avatar_url));
        }
        active.updated_at = Set(now_millis());

        let updated = active.update(&self.db).await?;
        info!("Group '{}' updated", group_id);
        Ok(updated.into())
    }

    /// Delete a group together with its members, conversation and messages
    pub async fn delete(&self, actor_id: &str, group_id: &str) -> Result<()> {
        self.require(group_id).await?;
        self.require_admin(group_id, actor_id).await?;

        let txn = self.db.begin().await?;

        group_members::Entity::delete_many()
            .filter(group_members::Column::GroupId.eq(group_id))
            .exec(&txn)
            .await?;

        let convs = conversations::Entity::find()
            .filter(conversations::Column::GroupId.eq(group_id))
            .all(&txn)
            .await?;
        for conv in convs {
            let removed = MessageStore::delete_for_conversation(&txn, &conv.id).await?;
            debug!("Removed {} messages of conversation {}", removed, conv.id);
            conversations::Entity::delete_by_id(conv.id)
                .exec(&txn)
                .await?;
        }

        group_chats::Entity::delete_by_id(group_id.to_string())
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!("Group '{}' deleted by {}", group_id, actor_id);
        Ok(())
    }
}
