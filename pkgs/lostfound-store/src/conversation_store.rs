//! Conversation store - conversation identity and last message preview

use crate::entities::{conversations, group_members};
use crate::error::{Result, StoreError};
use crate::models::{Conversation, ConversationKind};
use crate::{from_millis, now_millis};
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use tracing::{debug, info};
use uuid::Uuid;

impl TryFrom<conversations::Model> for Conversation {
    type Error = StoreError;

    fn try_from(model: conversations::Model) -> Result<Self> {
        Ok(Self {
            id: model.id,
            kind: model.kind.parse()?,
            post_id: model.post_id,
            user1_id: model.user1_id,
            user2_id: model.user2_id,
            group_id: model.group_id,
            last_message: model.last_message,
            last_message_at: model.last_message_at.map(from_millis),
            created_at: from_millis(model.created_at),
        })
    }
}

/// Conversation store
#[derive(Clone)]
pub struct ConversationStore {
    db: DatabaseConnection,
}

impl ConversationStore {
    /// Create a conversation store over an existing connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Return the conversation between two users about a post, creating it on first contact
    ///
    /// The participant pair is stored ordered, so `(post, a, b)` and
    /// `(post, b, a)` resolve to the same row. Concurrent callers race on the
    /// unique natural-key index and all read back the winner.
    pub async fn get_or_create(
        &self,
        post_id: &str,
        user_a: &str,
        user_b: &str,
    ) -> Result<Conversation> {
        if post_id.is_empty() || user_a.is_empty() || user_b.is_empty() {
            return Err(StoreError::Validation(
                "post and participant ids must not be empty".to_string(),
            ));
        }
        if user_a == user_b {
            return Err(StoreError::Validation(
                "a conversation needs two distinct participants".to_string(),
            ));
        }

        let (low, high) = if user_a < user_b {
            (user_a, user_b)
        } else {
            (user_b, user_a)
        };

        if let Some(existing) = self.find_direct(post_id, low, high).await? {
            debug!("Reusing conversation {} for post {}", existing.id, post_id);
            return Ok(existing);
        }

        let new_conv = conversations::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            kind: Set(ConversationKind::Direct.as_str().to_string()),
            post_id: Set(Some(post_id.to_string())),
            user1_id: Set(Some(low.to_string())),
            user2_id: Set(Some(high.to_string())),
            group_id: Set(None),
            last_message: Set(None),
            last_message_at: Set(None),
            created_at: Set(now_millis()),
        };

        let inserted = conversations::Entity::insert(new_conv)
            .on_conflict(
                OnConflict::columns([
                    conversations::Column::PostId,
                    conversations::Column::User1Id,
                    conversations::Column::User2Id,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        let conv = self
            .find_direct(post_id, low, high)
            .await?
            .ok_or_else(|| {
                StoreError::NotFound(format!("conversation for post {} after upsert", post_id))
            })?;

        if inserted > 0 {
            info!(
                "Created conversation {} between {} and {} for post {}",
                conv.id, low, high, post_id
            );
        }
        Ok(conv)
    }

    async fn find_direct(&self, post_id: &str, low: &str, high: &str) -> Result<Option<Conversation>> {
        conversations::Entity::find()
            .filter(conversations::Column::PostId.eq(post_id))
            .filter(conversations::Column::User1Id.eq(low))
            .filter(conversations::Column::User2Id.eq(high))
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// Get a single conversation by ID
    pub async fn get(&self, id: &str) -> Result<Option<Conversation>> {
        conversations::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// Get a conversation, failing with `NotFound` if it does not exist
    pub async fn require(&self, id: &str) -> Result<Conversation> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("conversation {}", id)))
    }

    /// Get the conversation attached to a group
    pub async fn find_by_group(&self, group_id: &str) -> Result<Option<Conversation>> {
        conversations::Entity::find()
            .filter(conversations::Column::GroupId.eq(group_id))
            .one(&self.db)
            .await?
            .map(Conversation::try_from)
            .transpose()
    }

    /// All conversations a user takes part in, most recent activity first
    pub async fn list_for(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut models = conversations::Entity::find()
            .filter(
                Condition::any()
                    .add(conversations::Column::User1Id.eq(user_id))
                    .add(conversations::Column::User2Id.eq(user_id)),
            )
            .all(&self.db)
            .await?;

        let group_ids: Vec<String> = group_members::Entity::find()
            .filter(group_members::Column::UserId.eq(user_id))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|m| m.group_id)
            .collect();

        if !group_ids.is_empty() {
            let group_convs = conversations::Entity::find()
                .filter(conversations::Column::GroupId.is_in(group_ids))
                .all(&self.db)
                .await?;
            models.extend(group_convs);
        }

        let mut convs = models
            .into_iter()
            .map(Conversation::try_from)
            .collect::<Result<Vec<_>>>()?;
        convs.sort_by(|a, b| {
            b.activity_at()
                .cmp(&a.activity_at())
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!("Found {} conversations for {}", convs.len(), user_id);
        Ok(convs)
    }

    /// Overwrite the denormalized preview of a conversation
    pub async fn update_last_message(
        &self,
        id: &str,
        last_message: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let result = conversations::Entity::update_many()
            .col_expr(
                conversations::Column::LastMessage,
                Expr::value(last_message.to_string()),
            )
            .col_expr(
                conversations::Column::LastMessageAt,
                Expr::value(at.timestamp_millis()),
            )
            .filter(conversations::Column::Id.eq(id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::NotFound(format!("conversation {}", id)));
        }

        debug!("Updated preview of conversation {}", id);
        Ok(())
    }

    /// Whether a user may read and post in a conversation
    pub async fn is_participant(&self, id: &str, user_id: &str) -> Result<bool> {
        let conv = self.require(id).await?;
        is_participant_in(&self.db, &conv, user_id).await
    }

    pub(crate) async fn insert_group_conversation<C: ConnectionTrait>(
        db: &C,
        group_id: &str,
        created_at: i64,
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let conv = conversations::ActiveModel {
            id: Set(id.clone()),
            kind: Set(ConversationKind::Group.as_str().to_string()),
            post_id: Set(None),
            user1_id: Set(None),
            user2_id: Set(None),
            group_id: Set(Some(group_id.to_string())),
            last_message: Set(None),
            last_message_at: Set(None),
            created_at: Set(created_at),
        };
        conversations::Entity::insert(conv)
            .exec_without_returning(db)
            .await?;
        Ok(id)
    }
}

pub(crate) async fn is_participant_in<C: ConnectionTrait>(
    db: &C,
    conv: &Conversation,
    user_id: &str,
) -> Result<bool> {
    match conv.kind {
        ConversationKind::Direct => Ok(conv.user1_id.as_deref() == Some(user_id)
            || conv.user2_id.as_deref() == Some(user_id)),
        ConversationKind::Group => {
            let Some(group_id) = conv.group_id.as_deref() else {
                return Ok(false);
            };
            let member = group_members::Entity::find_by_id((group_id.to_string(), user_id.to_string()))
                .one(db)
                .await?;
            Ok(member.is_some())
        }
    }
}
