use std::sync::Arc;

use tracing::{info, warn};

use overheard_types::events::OperatorEvent;
use overheard_types::models::{ChatId, UserId};

use crate::platform::{OutgoingMessage, Platform};

/// Best-effort outbound notices. A failed delivery is logged and never
/// undoes or fails the action that triggered it.
pub struct Notifier {
    platform: Arc<dyn Platform>,
    operator_chat: Option<ChatId>,
}

impl Notifier {
    pub fn new(platform: Arc<dyn Platform>, operator_chat: Option<ChatId>) -> Self {
        Self {
            platform,
            operator_chat,
        }
    }

    /// Log a redacted event and forward it to the operator chat.
    pub async fn emit(&self, event: OperatorEvent) {
        info!("[event] {}", event);
        let Some(chat_id) = self.operator_chat else {
            return;
        };
        let message = OutgoingMessage::notice(format!("🧾 {}", event));
        if let Err(e) = self.platform.send(chat_id, message).await {
            warn!("Operator notification failed: {}", e);
        }
    }

    /// Message a user. Returns whether delivery succeeded.
    pub async fn notify_user(&self, user_id: UserId, message: OutgoingMessage) -> bool {
        match self.platform.send(user_id, message).await {
            Ok(_) => true,
            Err(e) => {
                // The recipient stays out of the log.
                warn!("User notification failed: {}", e);
                false
            }
        }
    }
}
