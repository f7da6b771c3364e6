use std::fmt;

use crate::models::{ChatId, ReviewerMode, SubmissionId};

/// Redacted notifications for the operator chat.
///
/// No variant carries a user id, a username, or submission content; channel
/// and submission ids are the most specific thing an operator ever sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorEvent {
    PolicyAccepted,
    PolicyDeclined,
    ChannelBound { chat_id: ChatId },
    ModerationToggled { chat_id: ChatId, enabled: bool },
    ReviewerModeChanged { chat_id: ChatId, mode: ReviewerMode },
    ReviewerAdded { chat_id: ChatId },
    ReviewerRemoved { chat_id: ChatId },
    LinkIssued { chat_id: ChatId },
    SubmissionQueued { chat_id: ChatId, submission_id: SubmissionId },
    PublishedDirectly { chat_id: ChatId },
    DirectPublishFailed { chat_id: ChatId },
    SubmissionApproved { chat_id: ChatId, submission_id: SubmissionId },
    ApprovalPublishFailed { chat_id: ChatId, submission_id: SubmissionId },
    SubmissionRejected { chat_id: ChatId, submission_id: SubmissionId },
    /// Unexpected failure caught at the request boundary. Message only.
    InternalError { message: String },
}

impl fmt::Display for OperatorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyAccepted => f.write_str("A user accepted the policy"),
            Self::PolicyDeclined => f.write_str("A user declined the policy"),
            Self::ChannelBound { chat_id } => write!(f, "Channel bound: channel={}", chat_id),
            Self::ModerationToggled { chat_id, enabled } => write!(
                f,
                "Moderation toggled: channel={}, moderation={}",
                chat_id,
                if *enabled { "on" } else { "off" }
            ),
            Self::ReviewerModeChanged { chat_id, mode } => {
                write!(f, "Reviewer mode changed: channel={}, mode={}", chat_id, mode)
            }
            Self::ReviewerAdded { chat_id } => write!(f, "Reviewer added: channel={}", chat_id),
            Self::ReviewerRemoved { chat_id } => {
                write!(f, "Reviewer removed: channel={}", chat_id)
            }
            Self::LinkIssued { chat_id } => write!(f, "Submission link issued: channel={}", chat_id),
            Self::SubmissionQueued { chat_id, submission_id } => write!(
                f,
                "New submission queued: channel={}, sid={}",
                chat_id, submission_id
            ),
            Self::PublishedDirectly { chat_id } => {
                write!(f, "Submission published directly: channel={}", chat_id)
            }
            Self::DirectPublishFailed { chat_id } => {
                write!(f, "Direct publish failed: channel={}", chat_id)
            }
            Self::SubmissionApproved { chat_id, submission_id } => write!(
                f,
                "Submission approved and published: channel={}, sid={}",
                chat_id, submission_id
            ),
            Self::ApprovalPublishFailed { chat_id, submission_id } => write!(
                f,
                "Publish after approval failed: channel={}, sid={}",
                chat_id, submission_id
            ),
            Self::SubmissionRejected { chat_id, submission_id } => write!(
                f,
                "Submission rejected: channel={}, sid={}",
                chat_id, submission_id
            ),
            Self::InternalError { message } => write!(f, "Internal error: {}", message),
        }
    }
}
