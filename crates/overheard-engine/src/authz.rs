use std::sync::Arc;

use tracing::warn;

use overheard_db::Database;
use overheard_types::models::{ChatId, ReviewerMode, UserId};

use crate::platform::Platform;
use crate::{WorkflowError, blocking};

/// Decides who may browse a channel's queue and decide on its tickets.
pub struct Authorizer {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
}

impl Authorizer {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>) -> Self {
        Self { db, platform }
    }

    /// The owner always may. Otherwise it depends on the reviewer mode:
    /// nobody else under OWNER, allow-listed users under SELECTED, and under
    /// ADMINS whoever the platform reports as admin or owner right now.
    ///
    /// Never cached: call it again at decision time even if the ticket was
    /// rendered moments ago.
    pub async fn can_moderate(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<bool, WorkflowError> {
        let Some(channel) = blocking(&self.db, move |db| db.get_channel(chat_id)).await? else {
            return Ok(false);
        };

        if channel.is_owned_by(user_id) {
            return Ok(true);
        }

        match channel.reviewer_mode {
            ReviewerMode::Owner => Ok(false),
            ReviewerMode::Selected => {
                blocking(&self.db, move |db| db.is_reviewer(chat_id, user_id)).await
            }
            ReviewerMode::Admins => match self.platform.member_role(chat_id, user_id).await {
                Ok(role) => Ok(role.is_admin_or_owner()),
                Err(e) => {
                    warn!("Admin check for channel {} failed: {}", chat_id, e);
                    Ok(false)
                }
            },
        }
    }
}
