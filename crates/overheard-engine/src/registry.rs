use std::sync::Arc;

use tracing::info;

use overheard_db::Database;
use overheard_types::models::{Channel, ChannelRef, ChatId, MemberRole, ReviewerMode, UserId};

use crate::platform::Platform;
use crate::{WorkflowError, blocking};

/// Bound channels and their owner-only settings.
pub struct ChannelRegistry {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
}

impl ChannelRegistry {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>) -> Self {
        Self { db, platform }
    }

    /// Bind a channel for `requester`.
    ///
    /// All three checks run live against the platform: the reference must
    /// resolve, the bot must administer the channel, and the requester must
    /// be its owner (administrator is not enough). Nothing is written unless
    /// all three pass.
    pub async fn bind(
        &self,
        reference: &ChannelRef,
        requester: UserId,
    ) -> Result<Channel, WorkflowError> {
        let chat = self
            .platform
            .resolve_chat(reference)
            .await
            .map_err(|e| WorkflowError::ChannelUnresolvable {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;

        let bot_role = self
            .platform
            .member_role(chat.chat_id, self.platform.bot_user_id())
            .await
            .map_err(|_| WorkflowError::BotNotAdmin)?;
        if !bot_role.is_admin_or_owner() {
            return Err(WorkflowError::BotNotAdmin);
        }

        let requester_role = self
            .platform
            .member_role(chat.chat_id, requester)
            .await
            .map_err(|_| WorkflowError::NotOwner)?;
        if requester_role != MemberRole::Owner {
            return Err(WorkflowError::NotOwner);
        }

        let channel = blocking(&self.db, move |db| {
            db.upsert_channel(chat.chat_id, chat.handle.as_deref(), requester)
        })
        .await?;
        info!("Channel {} bound", channel.chat_id);
        Ok(channel)
    }

    pub async fn get(&self, chat_id: ChatId) -> Result<Option<Channel>, WorkflowError> {
        blocking(&self.db, move |db| db.get_channel(chat_id)).await
    }

    pub async fn channels_of(&self, owner: UserId) -> Result<Vec<Channel>, WorkflowError> {
        blocking(&self.db, move |db| db.channels_by_owner(owner)).await
    }

    /// The channel, if `user_id` owns it. Administration has no other grant.
    pub async fn owned(&self, chat_id: ChatId, user_id: UserId) -> Result<Channel, WorkflowError> {
        match self.get(chat_id).await? {
            Some(channel) if channel.is_owned_by(user_id) => Ok(channel),
            _ => Err(WorkflowError::AccessDenied),
        }
    }

    pub async fn toggle_moderation(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Channel, WorkflowError> {
        self.owned(chat_id, user_id).await?;
        blocking(&self.db, move |db| db.toggle_moderation(chat_id))
            .await?
            .ok_or(WorkflowError::AccessDenied)?;
        self.owned(chat_id, user_id).await
    }

    pub async fn cycle_reviewer_mode(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<ReviewerMode, WorkflowError> {
        self.owned(chat_id, user_id).await?;
        blocking(&self.db, move |db| db.cycle_reviewer_mode(chat_id))
            .await?
            .ok_or(WorkflowError::AccessDenied)
    }

    pub async fn reviewers(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Vec<UserId>, WorkflowError> {
        self.owned(chat_id, user_id).await?;
        blocking(&self.db, move |db| db.list_reviewers(chat_id)).await
    }

    pub async fn add_reviewer(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        reviewer: UserId,
    ) -> Result<bool, WorkflowError> {
        self.owned(chat_id, user_id).await?;
        blocking(&self.db, move |db| db.add_reviewer(chat_id, reviewer)).await
    }

    pub async fn remove_reviewer(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        reviewer: UserId,
    ) -> Result<bool, WorkflowError> {
        self.owned(chat_id, user_id).await?;
        blocking(&self.db, move |db| db.remove_reviewer(chat_id, reviewer)).await
    }
}
