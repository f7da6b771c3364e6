use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;

use overheard_types::models::{ChannelRef, ChatId, Content, ContentKind, UserId};

pub const HINT_CHANNEL_FORMAT: &str = "Invalid format. Enter @username or -100….";
pub const HINT_NUMERIC_USER: &str = "A numeric user id is required.";
pub const HINT_EMPTY: &str = "Empty message.";

/// Per-user conversation state. Each variant carries exactly the data its
/// mode needs, so a compose step without a selected channel cannot exist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    Idle,
    /// A channel was picked through a deeplink; no flow is active yet.
    Preselected { chat_id: ChatId },
    PickChannel,
    Compose {
        chat_id: ChatId,
        staged: Option<Content>,
    },
    BindWait,
    ReviewerAdd { chat_id: ChatId },
    ReviewerRemove { chat_id: ChatId },
}

/// Coarse mode names, as shown in logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    SendPickChannel,
    SendWaitContent,
    BindWait,
    ReviewerAddWait,
    ReviewerDelWait,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::SendPickChannel => "SEND_PICK_CHANNEL",
            Self::SendWaitContent => "SEND_WAIT_CONTENT",
            Self::BindWait => "BIND_WAIT",
            Self::ReviewerAddWait => "REVIEWER_ADD_WAIT",
            Self::ReviewerDelWait => "REVIEWER_DEL_WAIT",
        })
    }
}

/// What an input means in the current state. Effects that need storage or
/// the platform are carried out by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Content arrived but no channel is selected.
    NeedChannel,
    Bind(ChannelRef),
    Select(ChannelRef),
    Staged(ContentKind),
    Reviewer {
        chat_id: ChatId,
        add: bool,
        target: UserId,
    },
    /// Input rejected; the state is unchanged.
    Invalid(&'static str),
}

impl Session {
    pub fn mode(&self) -> Mode {
        match self {
            Self::Idle | Self::Preselected { .. } => Mode::Idle,
            Self::PickChannel => Mode::SendPickChannel,
            Self::Compose { .. } => Mode::SendWaitContent,
            Self::BindWait => Mode::BindWait,
            Self::ReviewerAdd { .. } => Mode::ReviewerAddWait,
            Self::ReviewerRemove { .. } => Mode::ReviewerDelWait,
        }
    }

    pub fn selected_chat_id(&self) -> Option<ChatId> {
        match self {
            Self::Preselected { chat_id } | Self::Compose { chat_id, .. } => Some(*chat_id),
            _ => None,
        }
    }

    /// Staged content and its target, if confirm has something to send.
    pub fn staged(&self) -> Option<(ChatId, &Content)> {
        match self {
            Self::Compose {
                chat_id,
                staged: Some(content),
            } => Some((*chat_id, content)),
            _ => None,
        }
    }

    /// Interpret plain text against the current mode only.
    pub fn on_text(&mut self, text: &str) -> Step {
        match self {
            Self::PickChannel => match text.parse() {
                Ok(reference) => Step::Select(reference),
                Err(_) => Step::Invalid(HINT_CHANNEL_FORMAT),
            },
            Self::BindWait => match text.parse() {
                Ok(reference) => Step::Bind(reference),
                Err(_) => Step::Invalid(HINT_CHANNEL_FORMAT),
            },
            Self::ReviewerAdd { chat_id } | Self::ReviewerRemove { chat_id } => {
                let text = text.trim();
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return Step::Invalid(HINT_NUMERIC_USER);
                }
                let Ok(target) = text.parse() else {
                    return Step::Invalid(HINT_NUMERIC_USER);
                };
                let chat_id = *chat_id;
                let add = matches!(self, Self::ReviewerAdd { .. });
                *self = Self::Idle;
                Step::Reviewer {
                    chat_id,
                    add,
                    target,
                }
            }
            Self::Preselected { .. } | Self::Compose { .. } => match Content::text(text) {
                Ok(content) => self.stage(content),
                Err(_) => Step::Invalid(HINT_EMPTY),
            },
            Self::Idle => Step::NeedChannel,
        }
    }

    /// Media is stageable whenever a channel is selected, whatever the mode.
    pub fn on_media(&mut self, content: Content) -> Step {
        if self.selected_chat_id().is_some() {
            self.stage(content)
        } else {
            Step::NeedChannel
        }
    }

    fn stage(&mut self, content: Content) -> Step {
        let Some(chat_id) = self.selected_chat_id() else {
            return Step::NeedChannel;
        };
        let kind = content.kind;
        *self = Self::Compose {
            chat_id,
            staged: Some(content),
        };
        Step::Staged(kind)
    }

    pub fn preselect(&mut self, chat_id: ChatId) {
        *self = Self::Preselected { chat_id };
    }

    pub fn enter_pick_channel(&mut self) {
        *self = Self::PickChannel;
    }

    pub fn enter_bind(&mut self) {
        *self = Self::BindWait;
    }

    pub fn enter_reviewer_edit(&mut self, chat_id: ChatId, add: bool) {
        *self = if add {
            Self::ReviewerAdd { chat_id }
        } else {
            Self::ReviewerRemove { chat_id }
        };
    }

    /// The typed channel passed the registry check.
    pub fn channel_selected(&mut self, chat_id: ChatId) {
        *self = Self::Compose {
            chat_id,
            staged: None,
        };
    }

    pub fn reset(&mut self) {
        *self = Self::Idle;
    }
}

/// In-process session store keyed by user id.
///
/// Sessions are created on first use, dropped again once idle, and never
/// persisted. Holding the guard returned by [`SessionStore::lock`]
/// serialises that user's events while other users proceed.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, user_id: UserId) -> OwnedMutexGuard<Session> {
        let slot = {
            let mut sessions = self
                .sessions
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            sessions.entry(user_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    /// Forget a user whose session is back to a bare `Idle` and that nobody
    /// else holds. Sessions with state are kept; nothing expires them.
    pub fn release(&self, user_id: UserId) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(slot) = sessions.get(&user_id) else {
            return;
        };
        if Arc::strong_count(slot) > 1 {
            return;
        }
        let idle = slot
            .try_lock()
            .map(|session| *session == Session::Idle)
            .unwrap_or(false);
        if idle {
            sessions.remove(&user_id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_keeps_only_sessions_with_state() {
        let store = SessionStore::new();

        let guard = store.lock(1).await;
        store.release(1);
        assert_eq!(store.len(), 1, "held sessions stay");
        drop(guard);
        store.release(1);
        assert!(store.is_empty());

        store.lock(2).await.preselect(-1001);
        store.lock(3).await.enter_bind();
        store.release(2);
        store.release(3);
        assert_eq!(store.len(), 2);
        assert_eq!(store.lock(2).await.selected_chat_id(), Some(-1001));

        store.lock(3).await.reset();
        store.release(3);
        assert_eq!(store.len(), 1);
    }

    const CHAT: ChatId = -1001234567890;

    #[test]
    fn text_without_channel_asks_for_one() {
        let mut session = Session::Idle;
        assert_eq!(session.on_text("hello"), Step::NeedChannel);
        assert_eq!(session, Session::Idle);

        let photo = Content::media(ContentKind::Photo, "file-1", None).unwrap();
        assert_eq!(session.on_media(photo), Step::NeedChannel);
        assert_eq!(session.mode(), Mode::Idle);
    }

    #[test]
    fn preselected_channel_stages_text() {
        let mut session = Session::Idle;
        session.preselect(CHAT);
        assert_eq!(session.mode(), Mode::Idle);
        assert_eq!(session.selected_chat_id(), Some(CHAT));

        assert_eq!(session.on_text("  hi there "), Step::Staged(ContentKind::Text));
        assert_eq!(session.mode(), Mode::SendWaitContent);
        let (chat_id, content) = session.staged().unwrap();
        assert_eq!(chat_id, CHAT);
        assert_eq!(content.body(), "hi there");
    }

    #[test]
    fn restaging_replaces_previous_content() {
        let mut session = Session::Idle;
        session.channel_selected(CHAT);
        session.on_text("first");
        let photo = Content::media(ContentKind::Photo, "file-1", Some("hi")).unwrap();
        assert_eq!(session.on_media(photo.clone()), Step::Staged(ContentKind::Photo));
        assert_eq!(session.staged(), Some((CHAT, &photo)));
    }

    #[test]
    fn empty_text_keeps_compose_state() {
        let mut session = Session::Compose { chat_id: CHAT, staged: None };
        assert_eq!(session.on_text("   "), Step::Invalid(HINT_EMPTY));
        assert_eq!(session.mode(), Mode::SendWaitContent);
        assert!(session.staged().is_none());
    }

    #[test]
    fn pick_channel_parses_references() {
        let mut session = Session::Idle;
        session.enter_pick_channel();
        assert_eq!(session.mode(), Mode::SendPickChannel);
        assert_eq!(
            session.on_text("@my_channel"),
            Step::Select(ChannelRef::Handle("my_channel".into()))
        );
        assert_eq!(session.on_text("not a channel!"), Step::Invalid(HINT_CHANNEL_FORMAT));
        assert_eq!(session.mode(), Mode::SendPickChannel);

        session.channel_selected(CHAT);
        assert_eq!(session.mode(), Mode::SendWaitContent);
        assert_eq!(session.selected_chat_id(), Some(CHAT));
    }

    #[test]
    fn bind_wait_interprets_text_as_reference() {
        let mut session = Session::Idle;
        session.enter_bind();
        assert_eq!(
            session.on_text("-1001234567890"),
            Step::Bind(ChannelRef::Id(-1001234567890))
        );
        assert_eq!(session.mode(), Mode::BindWait);
    }

    #[test]
    fn reviewer_edit_requires_numeric_id_then_completes() {
        let mut session = Session::Idle;
        session.enter_reviewer_edit(CHAT, false);
        assert_eq!(session.mode(), Mode::ReviewerDelWait);
        assert_eq!(session.on_text("@someone"), Step::Invalid(HINT_NUMERIC_USER));
        assert_eq!(session.on_text("-5"), Step::Invalid(HINT_NUMERIC_USER));
        assert_eq!(session.mode(), Mode::ReviewerDelWait);

        assert_eq!(
            session.on_text("42"),
            Step::Reviewer { chat_id: CHAT, add: false, target: 42 }
        );
        assert_eq!(session, Session::Idle);
    }

    #[test]
    fn reset_clears_everything() {
        let mut session = Session::Compose {
            chat_id: CHAT,
            staged: Some(Content::text("x").unwrap()),
        };
        session.reset();
        assert_eq!(session, Session::Idle);
        assert_eq!(session.selected_chat_id(), None);
        assert!(session.staged().is_none());
    }

    #[tokio::test]
    async fn store_keeps_sessions_per_user() {
        let store = SessionStore::new();
        store.lock(1).await.enter_bind();
        assert_eq!(*store.lock(1).await, Session::BindWait);
        assert_eq!(*store.lock(2).await, Session::Idle);
        assert_eq!(store.len(), 2);
    }
}
