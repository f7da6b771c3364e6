use std::fmt;
use std::str::FromStr;

use crate::models::{ChatId, ParseError, SubmissionId};

/// Actions attached to inline controls. The wire form is the callback payload
/// (`"ch_open:-100123"`), kept well under the platform's 64-byte limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
    // -- Consent --
    PolicyAccept,
    PolicyDecline,

    // -- Navigation --
    Back,
    ShowPolicy,
    Send,
    PickChannel,
    Control,

    // -- Staged content --
    ConfirmSend,
    CancelSend,

    // -- Channel administration --
    Bind,
    ListChannels,
    OpenChannel(ChatId),
    ToggleModeration(ChatId),
    CycleReviewerMode(ChatId),
    ManageReviewers(ChatId),
    AddReviewer(ChatId),
    RemoveReviewer(ChatId),
    IssueLink(ChatId),

    // -- Queue --
    Queue(ChatId),
    QueuePage { chat_id: ChatId, offset: u64 },
    QueueOpen { chat_id: ChatId, submission_id: SubmissionId },

    // -- Decisions --
    Approve(SubmissionId),
    Reject(SubmissionId),
}

impl MenuAction {
    /// Consent buttons are the only actions that bypass the consent gate.
    pub fn bypasses_consent(self) -> bool {
        matches!(self, Self::PolicyAccept | Self::PolicyDecline)
    }
}

impl fmt::Display for MenuAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PolicyAccept => f.write_str("policy_accept"),
            Self::PolicyDecline => f.write_str("policy_decline"),
            Self::Back => f.write_str("menu_back"),
            Self::ShowPolicy => f.write_str("menu_policy"),
            Self::Send => f.write_str("menu_send"),
            Self::PickChannel => f.write_str("send_pick_channel"),
            Self::Control => f.write_str("menu_control"),
            Self::ConfirmSend => f.write_str("send_confirm"),
            Self::CancelSend => f.write_str("send_cancel"),
            Self::Bind => f.write_str("ctl_bind"),
            Self::ListChannels => f.write_str("ctl_list"),
            Self::OpenChannel(id) => write!(f, "ch_open:{}", id),
            Self::ToggleModeration(id) => write!(f, "ch_toggle:{}", id),
            Self::CycleReviewerMode(id) => write!(f, "ch_reviewers_mode:{}", id),
            Self::ManageReviewers(id) => write!(f, "ch_reviewers_manage:{}", id),
            Self::AddReviewer(id) => write!(f, "rv_add:{}", id),
            Self::RemoveReviewer(id) => write!(f, "rv_del:{}", id),
            Self::IssueLink(id) => write!(f, "ch_link:{}", id),
            Self::Queue(id) => write!(f, "ch_queue:{}", id),
            Self::QueuePage { chat_id, offset } => write!(f, "q_page:{}:{}", chat_id, offset),
            Self::QueueOpen { chat_id, submission_id } => {
                write!(f, "q_open:{}:{}", chat_id, submission_id)
            }
            Self::Approve(id) => write!(f, "mod_ok:{}", id),
            Self::Reject(id) => write!(f, "mod_no:{}", id),
        }
    }
}

impl FromStr for MenuAction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseError::Action(s.to_string());

        let simple = match s {
            "policy_accept" => Some(Self::PolicyAccept),
            "policy_decline" => Some(Self::PolicyDecline),
            "menu_back" => Some(Self::Back),
            "menu_policy" => Some(Self::ShowPolicy),
            "menu_send" => Some(Self::Send),
            "send_pick_channel" => Some(Self::PickChannel),
            "menu_control" => Some(Self::Control),
            "send_confirm" => Some(Self::ConfirmSend),
            "send_cancel" => Some(Self::CancelSend),
            "ctl_bind" => Some(Self::Bind),
            "ctl_list" => Some(Self::ListChannels),
            _ => None,
        };
        if let Some(action) = simple {
            return Ok(action);
        }

        let (tag, rest) = s.split_once(':').ok_or_else(err)?;
        let mut args = rest.split(':');
        let mut next_i64 = || -> Result<i64, ParseError> {
            args.next().and_then(|a| a.parse().ok()).ok_or_else(err)
        };

        let action = match tag {
            "ch_open" => Self::OpenChannel(next_i64()?),
            "ch_toggle" => Self::ToggleModeration(next_i64()?),
            "ch_reviewers_mode" => Self::CycleReviewerMode(next_i64()?),
            "ch_reviewers_manage" => Self::ManageReviewers(next_i64()?),
            "rv_add" => Self::AddReviewer(next_i64()?),
            "rv_del" => Self::RemoveReviewer(next_i64()?),
            "ch_link" => Self::IssueLink(next_i64()?),
            "ch_queue" => Self::Queue(next_i64()?),
            "q_page" => {
                let chat_id = next_i64()?;
                let offset = u64::try_from(next_i64()?).map_err(|_| err())?;
                Self::QueuePage { chat_id, offset }
            }
            "q_open" => Self::QueueOpen {
                chat_id: next_i64()?,
                submission_id: next_i64()?,
            },
            "mod_ok" => Self::Approve(next_i64()?),
            "mod_no" => Self::Reject(next_i64()?),
            _ => return Err(err()),
        };

        if args.next().is_some() {
            return Err(err());
        }
        Ok(action)
    }
}

// -- Inline controls --

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: MenuAction,
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a row holding a single button.
    pub fn button(mut self, label: impl Into<String>, action: MenuAction) -> Self {
        self.rows.push(vec![Button { label: label.into(), action }]);
        self
    }

    /// Append a row of buttons; empty rows are skipped.
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    pub fn actions(&self) -> impl Iterator<Item = MenuAction> + '_ {
        self.rows.iter().flatten().map(|b| b.action)
    }
}

impl Button {
    pub fn new(label: impl Into<String>, action: MenuAction) -> Self {
        Self { label: label.into(), action }
    }
}
