//! Replies and inline keyboards produced by the workflow.
//!
//! The gateway decides how a [`Reply`] reaches the user: a plain reply to a
//! button press edits the pressed message, everything else is sent fresh.

use overheard_types::actions::{Button, Keyboard, MenuAction};
use overheard_types::models::{Channel, QueuePage, ReviewerMode, Submission, UserId};

use crate::platform::OutgoingMessage;

/// Characters of a submission body shown in a queue entry.
pub const QUEUE_PREVIEW_CHARS: usize = 30;

pub const MENU_TEXT: &str = "Menu:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Message {
        text: String,
        keyboard: Option<Keyboard>,
        /// Text is MarkdownV2.
        markdown: bool,
    },
    /// Delivered as a new message even in reply to a button press, for
    /// content (media) an edit cannot carry.
    Standalone(OutgoingMessage),
    /// MarkdownV2 text with controls, always sent as a new message so a
    /// pressed message (a ticket, say) is left as it was.
    Prompt { text: String, keyboard: Keyboard },
    /// A short notice on the pressed button, shown as an alert.
    Alert(String),
    Nothing,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Message {
            text: text.into(),
            keyboard: None,
            markdown: false,
        }
    }

    pub fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Message {
            text: text.into(),
            keyboard: Some(keyboard),
            markdown: false,
        }
    }

    pub fn markdown(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Message {
            text: text.into(),
            keyboard: Some(keyboard),
            markdown: true,
        }
    }

    pub fn prompt(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self::Prompt {
            text: text.into(),
            keyboard,
        }
    }

    pub fn menu(text: impl Into<String>) -> Self {
        Self::with_keyboard(text, main_menu())
    }

    pub fn alert(text: impl Into<String>) -> Self {
        Self::Alert(text.into())
    }

    /// The text body, if any; handy in tests.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::Message { text, .. } => Some(text),
            Self::Standalone(message) => message.content.text.as_deref(),
            Self::Prompt { text, .. } | Self::Alert(text) => Some(text),
            Self::Nothing => None,
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        match self {
            Self::Message { keyboard, .. } => keyboard.as_ref(),
            Self::Standalone(message) => message.keyboard.as_ref(),
            Self::Prompt { keyboard, .. } => Some(keyboard),
            _ => None,
        }
    }
}

// -- Keyboards --

fn back(action: MenuAction) -> Button {
    Button::new("⬅️ Back", action)
}

pub fn main_menu() -> Keyboard {
    Keyboard::new()
        .button("✉️ Send anonymously", MenuAction::Send)
        .button("🛠 Control", MenuAction::Control)
        .button("📄 Policy", MenuAction::ShowPolicy)
}

pub fn send_menu() -> Keyboard {
    Keyboard::new()
        .button("✏️ Enter channel", MenuAction::PickChannel)
        .row(vec![back(MenuAction::Back)])
}

pub fn control_menu() -> Keyboard {
    Keyboard::new()
        .button("➕ Bind channel", MenuAction::Bind)
        .button("📋 My channels", MenuAction::ListChannels)
        .row(vec![back(MenuAction::Back)])
}

pub fn back_to_menu() -> Keyboard {
    Keyboard::new().button("⬅️ Menu", MenuAction::Back)
}

pub fn policy_prompt() -> Keyboard {
    Keyboard::new()
        .button("✅ Accept and continue", MenuAction::PolicyAccept)
        .button("❌ Decline", MenuAction::PolicyDecline)
}

pub fn confirm_send() -> Keyboard {
    Keyboard::new().row(vec![
        Button::new("✅ Send", MenuAction::ConfirmSend),
        Button::new("❌ Cancel", MenuAction::CancelSend),
    ])
}

pub fn ticket(submission: &Submission) -> Keyboard {
    Keyboard::new().row(vec![
        Button::new("✅ Approve", MenuAction::Approve(submission.id)),
        Button::new("❌ Reject", MenuAction::Reject(submission.id)),
    ])
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "ON" } else { "OFF" }
}

pub fn channel_list(channels: &[Channel]) -> Keyboard {
    channels
        .iter()
        .fold(Keyboard::new(), |kb, channel| {
            kb.button(
                format!(
                    "{} | mod:{} | {}",
                    channel.title(),
                    on_off(channel.moderation_enabled),
                    channel.reviewer_mode.label()
                ),
                MenuAction::OpenChannel(channel.chat_id),
            )
        })
        .row(vec![back(MenuAction::Control)])
}

/// Owner controls for one channel. Reviewer management only makes sense
/// while the allow-list is in force.
pub fn channel_panel(channel: &Channel) -> Keyboard {
    let chat_id = channel.chat_id;
    let mut kb = Keyboard::new()
        .button(
            format!("Moderation: {}", on_off(channel.moderation_enabled)),
            MenuAction::ToggleModeration(chat_id),
        )
        .button(
            format!("Reviewers: {}", channel.reviewer_mode.label()),
            MenuAction::CycleReviewerMode(chat_id),
        );
    if channel.reviewer_mode == ReviewerMode::Selected {
        kb = kb.button("👥 Manage reviewers", MenuAction::ManageReviewers(chat_id));
    }
    kb.button("📥 Review queue", MenuAction::Queue(chat_id))
        .button("🔗 Link for submissions", MenuAction::IssueLink(chat_id))
        .row(vec![back(MenuAction::ListChannels)])
}

pub fn channel_panel_text(channel: &Channel) -> String {
    format!("Channel: {}\nchat_id: {}", channel.title(), channel.chat_id)
}

pub fn reviewers_panel(chat_id: i64) -> Keyboard {
    Keyboard::new()
        .row(vec![
            Button::new("➕ Add", MenuAction::AddReviewer(chat_id)),
            Button::new("➖ Remove", MenuAction::RemoveReviewer(chat_id)),
        ])
        .row(vec![back(MenuAction::OpenChannel(chat_id))])
}

pub fn reviewers_text(reviewers: &[UserId]) -> String {
    if reviewers.is_empty() {
        return "Reviewers (user_id):\n(none)".into();
    }
    let ids: Vec<String> = reviewers.iter().map(|id| id.to_string()).collect();
    format!("Reviewers (user_id):\n{}", ids.join("\n"))
}

pub fn queue(chat_id: i64, page: &QueuePage) -> Keyboard {
    let mut kb = page.items.iter().fold(Keyboard::new(), |kb, submission| {
        kb.button(
            format!(
                "#{} | {} | {}",
                submission.id,
                submission.content.kind,
                submission.content.preview(QUEUE_PREVIEW_CHARS)
            ),
            MenuAction::QueueOpen {
                chat_id,
                submission_id: submission.id,
            },
        )
    });

    let mut nav = Vec::new();
    if let Some(offset) = page.prev_offset() {
        nav.push(Button::new("⬅️ Prev", MenuAction::QueuePage { chat_id, offset }));
    }
    if let Some(offset) = page.next_offset() {
        nav.push(Button::new("Next ➡️", MenuAction::QueuePage { chat_id, offset }));
    }
    kb = kb.row(nav);
    kb.row(vec![back(MenuAction::OpenChannel(chat_id))])
}

pub fn queue_text(page: &QueuePage) -> String {
    format!("Review queue (pending): {}", page.total)
}

// -- Tickets --

/// Bot API limits, in UTF-16 code units.
pub const MESSAGE_LIMIT: usize = 4096;
pub const CAPTION_LIMIT: usize = 1024;

fn utf16_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// `text` cut to at most `max` UTF-16 units, ending in an ellipsis if cut.
fn clip(text: &str, max: usize) -> String {
    if utf16_len(text) <= max {
        return text.to_string();
    }
    let budget = max.saturating_sub(1);
    let mut used = 0;
    let mut cut = String::new();
    for c in text.chars() {
        used += c.len_utf16();
        if used > budget {
            break;
        }
        cut.push(c);
    }
    cut.push('…');
    cut
}

fn ticket_header(submission: &Submission) -> String {
    format!(
        "🆕 New submission #{}\nType: {}",
        submission.id, submission.content.kind
    )
}

/// Ticket for a reviewer. Media tickets carry the media itself with the
/// header as caption, so the reviewer sees exactly what would be published.
///
/// The body is clipped so the whole ticket fits the platform's message or
/// caption limit; the full content is what gets published on approval.
pub fn ticket_message(submission: &Submission) -> OutgoingMessage {
    const BODY_LABEL: &str = "\n\nText/caption:\n";

    let mut text = ticket_header(submission);
    let body = submission.content.body();
    if !body.is_empty() {
        let limit = if submission.content.kind.is_media() {
            CAPTION_LIMIT
        } else {
            MESSAGE_LIMIT
        };
        let room = limit.saturating_sub(utf16_len(&text) + utf16_len(BODY_LABEL));
        text.push_str(BODY_LABEL);
        text.push_str(&clip(body, room));
    }

    let mut content = submission.content.clone();
    content.text = Some(text);
    OutgoingMessage {
        content,
        keyboard: Some(ticket(submission)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use overheard_types::models::{Content, ContentKind, SubmissionStatus};

    fn submission(id: i64, body: &str) -> Submission {
        Submission {
            id,
            chat_id: -1001,
            sender_user_id: 7,
            content: Content::text(body).unwrap(),
            status: SubmissionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    fn channel(mode: ReviewerMode) -> Channel {
        Channel {
            chat_id: -1001,
            handle: Some("news_room".into()),
            owner_user_id: 1,
            moderation_enabled: true,
            reviewer_mode: mode,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reviewer_management_only_in_selected_mode() {
        let manages = |mode| {
            channel_panel(&channel(mode))
                .actions()
                .any(|a| a == MenuAction::ManageReviewers(-1001))
        };
        assert!(!manages(ReviewerMode::Owner));
        assert!(!manages(ReviewerMode::Admins));
        assert!(manages(ReviewerMode::Selected));
    }

    #[test]
    fn queue_shows_navigation_only_when_applicable() {
        let page = QueuePage {
            items: vec![submission(12, "a rather long message that will be cut short")],
            total: 25,
            offset: 10,
            limit: 10,
        };
        let kb = queue(-1001, &page);
        let actions: Vec<_> = kb.actions().collect();
        assert!(actions.contains(&MenuAction::QueuePage { chat_id: -1001, offset: 0 }));
        assert!(actions.contains(&MenuAction::QueuePage { chat_id: -1001, offset: 20 }));
        assert_eq!(kb.rows[0][0].label, "#12 | text | a rather long message that wil…");

        let single = QueuePage { items: vec![], total: 3, offset: 0, limit: 10 };
        assert!(
            !queue(-1001, &single)
                .actions()
                .any(|a| matches!(a, MenuAction::QueuePage { .. }))
        );
    }

    #[test]
    fn longest_bodies_still_fit_a_ticket() {
        let text = submission(8, &"a".repeat(MESSAGE_LIMIT));
        let ticket = ticket_message(&text).content.text.unwrap();
        assert_eq!(utf16_len(&ticket), MESSAGE_LIMIT);
        assert!(ticket.starts_with("🆕 New submission #8"));
        assert!(ticket.ends_with("a…"));

        let mut photo = submission(9, "x");
        photo.content = Content::media(
            ContentKind::Photo,
            "file-9",
            Some(&"😀".repeat(CAPTION_LIMIT / 2)),
        )
        .unwrap();
        let caption = ticket_message(&photo).content.text.unwrap();
        assert!(utf16_len(&caption) <= CAPTION_LIMIT);
        assert!(caption.ends_with("😀…"));
    }

    #[test]
    fn short_bodies_are_not_clipped() {
        assert_eq!(clip("hello", 5), "hello");
        assert_eq!(clip("hello!", 5), "hell…");
        let ticket = ticket_message(&submission(3, "short note")).content.text.unwrap();
        assert!(ticket.ends_with("Text/caption:\nshort note"));
    }

    #[test]
    fn media_ticket_keeps_media_and_captions_header() {
        let mut s = submission(5, "x");
        s.content = Content::media(ContentKind::Photo, "file-9", Some("hi")).unwrap();
        let msg = ticket_message(&s);
        assert_eq!(msg.content.kind, ContentKind::Photo);
        assert_eq!(msg.content.media_ref.as_deref(), Some("file-9"));
        let caption = msg.content.text.unwrap();
        assert!(caption.starts_with("🆕 New submission #5\nType: photo"));
        assert!(caption.ends_with("hi"));
        assert_eq!(
            msg.keyboard.unwrap().actions().collect::<Vec<_>>(),
            vec![MenuAction::Approve(5), MenuAction::Reject(5)]
        );
    }
}
