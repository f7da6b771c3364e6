use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use overheard_db::Database;
use overheard_types::models::{
    ChatId, Content, QueuePage, Submission, SubmissionId, SubmissionStatus, UserId,
};

use crate::authz::Authorizer;
use crate::platform::{OutgoingMessage, Platform};
use crate::{WorkflowError, blocking};

/// Pending submissions shown per queue page.
pub const PAGE_SIZE: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn target_status(self) -> SubmissionStatus {
        match self {
            Self::Approve => SubmissionStatus::Sent,
            Self::Reject => SubmissionStatus::Rejected,
        }
    }
}

/// Durable queue of submissions and the one-way PENDING -> SENT/REJECTED
/// transition.
pub struct SubmissionQueue {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
    /// Held from the pending check until the status write, so a slow publish
    /// cannot be repeated by a second reviewer.
    decision_locks: Mutex<HashMap<SubmissionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SubmissionQueue {
    pub fn new(db: Arc<Database>, platform: Arc<dyn Platform>) -> Self {
        Self {
            db,
            platform,
            decision_locks: Mutex::new(HashMap::new()),
        }
    }

    pub async fn enqueue(
        &self,
        chat_id: ChatId,
        sender: UserId,
        content: Content,
    ) -> Result<Submission, WorkflowError> {
        let submission = blocking(&self.db, move |db| {
            db.insert_submission(chat_id, sender, &content, SubmissionStatus::Pending)
        })
        .await?;
        info!("Submission {} queued for channel {}", submission.id, chat_id);
        Ok(submission)
    }

    /// History record for content published without moderation.
    pub async fn record_sent(
        &self,
        chat_id: ChatId,
        sender: UserId,
        content: Content,
    ) -> Result<Submission, WorkflowError> {
        blocking(&self.db, move |db| {
            db.insert_submission(chat_id, sender, &content, SubmissionStatus::Sent)
        })
        .await
    }

    pub async fn page(&self, chat_id: ChatId, offset: u64) -> Result<QueuePage, WorkflowError> {
        blocking(&self.db, move |db| db.pending_page(chat_id, PAGE_SIZE, offset)).await
    }

    pub async fn get(&self, id: SubmissionId) -> Result<Option<Submission>, WorkflowError> {
        blocking(&self.db, move |db| db.get_submission(id)).await
    }

    /// A submission of `chat_id` that is still pending. A concurrent decision
    /// shows up as `AlreadyDecided`.
    pub async fn open(
        &self,
        chat_id: ChatId,
        id: SubmissionId,
    ) -> Result<Submission, WorkflowError> {
        let submission = blocking(&self.db, move |db| db.get_submission(id))
            .await?
            .filter(|s| s.chat_id == chat_id)
            .ok_or(WorkflowError::SubmissionNotFound)?;
        if submission.status.is_final() {
            return Err(WorkflowError::AlreadyDecided);
        }
        Ok(submission)
    }

    /// Apply a reviewer's decision.
    ///
    /// Authorisation is checked live. Approval publishes first and only then
    /// writes SENT; a failed publish leaves the submission PENDING and returns
    /// `PublishFailed`. Of two racing decisions at most one succeeds, the
    /// other gets `AlreadyDecided` and has no side effects.
    pub async fn decide(
        &self,
        id: SubmissionId,
        reviewer: UserId,
        decision: Decision,
        authz: &Authorizer,
    ) -> Result<Submission, WorkflowError> {
        let slot = self.slot(id);
        let result = {
            let _guard = slot.lock().await;
            self.decide_locked(id, reviewer, decision, authz).await
        };
        self.release(id, &slot);
        result
    }

    async fn decide_locked(
        &self,
        id: SubmissionId,
        reviewer: UserId,
        decision: Decision,
        authz: &Authorizer,
    ) -> Result<Submission, WorkflowError> {
        let submission = blocking(&self.db, move |db| db.get_submission(id))
            .await?
            .ok_or(WorkflowError::SubmissionNotFound)?;

        if !authz.can_moderate(submission.chat_id, reviewer).await? {
            return Err(WorkflowError::AccessDenied);
        }
        if submission.status.is_final() {
            return Err(WorkflowError::AlreadyDecided);
        }

        if decision == Decision::Approve {
            publish(self.platform.as_ref(), submission.chat_id, &submission.content)
                .await
                .map_err(WorkflowError::PublishFailed)?;
        }

        let target = decision.target_status();
        let changed = blocking(&self.db, move |db| db.decide_submission(id, target)).await?;
        if !changed {
            // Only reachable if another process decided in between.
            warn!("Submission {} changed status during decision", id);
            return Err(WorkflowError::AlreadyDecided);
        }

        info!("Submission {} decided: {}", id, target.as_str());
        Ok(Submission {
            status: target,
            ..submission
        })
    }

    fn slot(&self, id: SubmissionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .decision_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id).or_default().clone()
    }

    /// Drop the lock entry once nobody else is waiting on it.
    fn release(&self, id: SubmissionId, slot: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .decision_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if Arc::strong_count(slot) <= 2 {
            locks.remove(&id);
        }
    }
}

/// Post content into a channel.
pub async fn publish(
    platform: &dyn Platform,
    chat_id: ChatId,
    content: &Content,
) -> Result<(), crate::PlatformError> {
    platform
        .send(
            chat_id,
            OutgoingMessage {
                content: content.clone(),
                keyboard: None,
            },
        )
        .await
        .map(|_| ())
}
