//! Error taxonomy for the relay workflow.
//!
//! [`WorkflowError`] variants other than `Internal` are expected outcomes:
//! they are turned into a user-facing reply where they are detected and never
//! escalated. `Internal` wraps storage and other unexpected failures and is
//! handed to the request boundary for logging.

use thiserror::Error;

/// Failures reported by the messaging platform collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("platform unreachable: {0}")]
    Unreachable(String),

    #[error("platform rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected platform response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Not a failure: the user has to (re-)accept the current policy.
    #[error("policy not accepted")]
    ConsentRequired,

    #[error("channel {reference} cannot be resolved: {reason}")]
    ChannelUnresolvable { reference: String, reason: String },

    #[error("bot is not an administrator of the channel")]
    BotNotAdmin,

    #[error("requester is not the channel owner")]
    NotOwner,

    #[error("access denied")]
    AccessDenied,

    #[error("channel is not registered")]
    ChannelUnregistered,

    #[error("submission already decided")]
    AlreadyDecided,

    #[error("submission not found")]
    SubmissionNotFound,

    #[error("publish failed: {0}")]
    PublishFailed(PlatformError),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Stable code for logs and tests.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConsentRequired => "consent_required",
            Self::ChannelUnresolvable { .. } => "channel_unresolvable",
            Self::BotNotAdmin => "bot_not_admin",
            Self::NotOwner => "not_owner",
            Self::AccessDenied => "access_denied",
            Self::ChannelUnregistered => "channel_unregistered",
            Self::AlreadyDecided => "already_decided",
            Self::SubmissionNotFound => "submission_not_found",
            Self::PublishFailed(_) => "publish_failed",
            Self::MalformedInput(_) => "malformed_input",
            Self::Internal(_) => "internal",
        }
    }

    /// Text shown to the user who triggered the failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::ConsentRequired => "Please accept the policy first.".into(),
            Self::ChannelUnresolvable { reason, .. } => format!(
                "Cannot reach that channel. Check the @username or chat id and the bot's access. ({})",
                reason
            ),
            Self::BotNotAdmin => {
                "The bot is not an administrator of the channel. Give it admin rights with posting permission."
                    .into()
            }
            Self::NotOwner => {
                "Only the channel owner (creator) can bind it, an administrator is not enough.".into()
            }
            Self::AccessDenied => "No access.".into(),
            Self::ChannelUnregistered => {
                "This channel is not registered. Its owner has to bind it first via Control.".into()
            }
            Self::AlreadyDecided => "Already processed.".into(),
            Self::SubmissionNotFound => "Submission not found.".into(),
            Self::PublishFailed(e) => format!("Could not publish to the channel: {}", e),
            Self::MalformedInput(hint) => hint.clone(),
            Self::Internal(_) => "Something went wrong. Please try again later.".into(),
        }
    }
}

impl From<tokio::task::JoinError> for WorkflowError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    }
}
