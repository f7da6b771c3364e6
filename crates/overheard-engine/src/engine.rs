use std::sync::Arc;

use tracing::{debug, info, warn};

use overheard_crypto::deeplink::DeeplinkCodec;
use overheard_crypto::policy::Policy;
use overheard_db::Database;
use overheard_types::actions::{Keyboard, MenuAction};
use overheard_types::events::OperatorEvent;
use overheard_types::models::{Channel, ChatId, Content, ContentKind, SubmissionId, UserId};

use crate::authz::Authorizer;
use crate::consent::ConsentStore;
use crate::notify::Notifier;
use crate::platform::{OutgoingMessage, Platform};
use crate::queue::{Decision, SubmissionQueue, publish};
use crate::registry::ChannelRegistry;
use crate::session::{Session, SessionStore, Step};
use crate::ui::{self, MENU_TEXT, Reply};
use crate::{WorkflowError, blocking};

type Outcome = Result<Reply, WorkflowError>;

/// Where an interaction came from; decides how handled failures are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Surface {
    Input,
    Button,
}

/// The workflow orchestrator.
///
/// Every `handle_*` entry point runs the consent gate first, then works on
/// the caller's session while holding it, so one user's interactions are
/// applied one at a time. Expected failures come back as a [`Reply`]; only
/// unexpected ones surface as `Err` for the caller's error boundary.
pub struct Engine {
    db: Arc<Database>,
    platform: Arc<dyn Platform>,
    consent: ConsentStore,
    registry: ChannelRegistry,
    authz: Authorizer,
    queue: SubmissionQueue,
    notifier: Notifier,
    sessions: SessionStore,
    codec: DeeplinkCodec,
}

impl Engine {
    pub fn new(
        db: Arc<Database>,
        platform: Arc<dyn Platform>,
        policy: Policy,
        codec: DeeplinkCodec,
        operator_chat: Option<ChatId>,
    ) -> Self {
        Self {
            consent: ConsentStore::new(db.clone(), policy),
            registry: ChannelRegistry::new(db.clone(), platform.clone()),
            authz: Authorizer::new(db.clone(), platform.clone()),
            queue: SubmissionQueue::new(db.clone(), platform.clone()),
            notifier: Notifier::new(platform.clone(), operator_chat),
            sessions: SessionStore::new(),
            db,
            platform,
            codec,
        }
    }

    pub fn policy(&self) -> &Policy {
        self.consent.policy()
    }

    /// Snapshot of a user's session.
    pub async fn session(&self, user_id: UserId) -> Session {
        let snapshot = self.sessions.lock(user_id).await.clone();
        self.sessions.release(user_id);
        snapshot
    }

    /// Users with a session currently kept in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Report an unexpected failure to the operator. Message only.
    pub async fn report_internal(&self, err: &anyhow::Error) {
        self.notifier
            .emit(OperatorEvent::InternalError {
                message: err.to_string(),
            })
            .await;
    }

    // -- Entry points --

    pub async fn handle_start(&self, user_id: UserId, code: Option<&str>) -> anyhow::Result<Reply> {
        let mut session = self.sessions.lock(user_id).await;
        let outcome = self.start(user_id, &mut session, code).await;
        drop(session);
        self.sessions.release(user_id);
        self.settle(outcome, Surface::Input)
    }

    pub async fn handle_text_input(&self, user_id: UserId, text: &str) -> anyhow::Result<Reply> {
        let mut session = self.sessions.lock(user_id).await;
        let outcome = self.text_input(user_id, &mut session, text).await;
        drop(session);
        self.sessions.release(user_id);
        self.settle(outcome, Surface::Input)
    }

    pub async fn handle_media_input(
        &self,
        user_id: UserId,
        kind: ContentKind,
        media_ref: &str,
        caption: Option<&str>,
    ) -> anyhow::Result<Reply> {
        let mut session = self.sessions.lock(user_id).await;
        let outcome = self
            .media_input(user_id, &mut session, kind, media_ref, caption)
            .await;
        drop(session);
        self.sessions.release(user_id);
        self.settle(outcome, Surface::Input)
    }

    pub async fn handle_menu_action(
        &self,
        user_id: UserId,
        action_id: &str,
    ) -> anyhow::Result<Reply> {
        let mut session = self.sessions.lock(user_id).await;
        let outcome = match action_id.parse::<MenuAction>() {
            Ok(action) => self.menu_action(user_id, &mut session, action).await,
            Err(_) => {
                debug!("Ignoring unknown action payload");
                Err(WorkflowError::MalformedInput("Unknown action.".into()))
            }
        };
        drop(session);
        self.sessions.release(user_id);
        self.settle(outcome, Surface::Button)
    }

    pub async fn handle_moderation_decision(
        &self,
        user_id: UserId,
        submission_id: SubmissionId,
        approve: bool,
    ) -> anyhow::Result<Reply> {
        let decision = if approve {
            Decision::Approve
        } else {
            Decision::Reject
        };
        let outcome = match self.gate(user_id).await {
            Ok(()) => self.decide(user_id, submission_id, decision).await,
            Err(e) => Err(e),
        };
        self.settle(outcome, Surface::Button)
    }

    // -- Gate and error mapping --

    async fn gate(&self, user_id: UserId) -> Result<(), WorkflowError> {
        if self.consent.is_allowed(user_id).await? {
            Ok(())
        } else {
            Err(WorkflowError::ConsentRequired)
        }
    }

    fn policy_prompt(&self) -> Reply {
        Reply::prompt(self.policy().text.clone(), ui::policy_prompt())
    }

    fn settle(&self, outcome: Outcome, surface: Surface) -> anyhow::Result<Reply> {
        match outcome {
            Ok(reply) => Ok(reply),
            Err(WorkflowError::Internal(e)) => Err(e),
            Err(WorkflowError::ConsentRequired) => Ok(self.policy_prompt()),
            Err(e) => {
                debug!("Workflow outcome: {}", e.code());
                let alert = surface == Surface::Button
                    && matches!(
                        e,
                        WorkflowError::AccessDenied
                            | WorkflowError::AlreadyDecided
                            | WorkflowError::SubmissionNotFound
                    );
                Ok(if alert {
                    Reply::alert(e.user_message())
                } else {
                    Reply::text(e.user_message())
                })
            }
        }
    }

    // -- Flows --

    async fn start(&self, user_id: UserId, session: &mut Session, code: Option<&str>) -> Outcome {
        self.gate(user_id).await?;

        let code = code.map(str::trim).filter(|c| !c.is_empty());
        if let Some(code) = code {
            if let Some(chat_id) = self.resolve_code(code).await? {
                session.preselect(chat_id);
                return Ok(Reply::menu(
                    "Channel selected via link. Press “Send anonymously”.",
                ));
            }
            debug!("Start with an unknown link code");
        }
        Ok(Reply::menu(MENU_TEXT))
    }

    async fn resolve_code(&self, code: &str) -> Result<Option<ChatId>, WorkflowError> {
        if !DeeplinkCodec::is_well_formed(code) {
            return Ok(None);
        }
        let code = code.to_string();
        blocking(&self.db, move |db| db.resolve_deeplink(&code)).await
    }

    async fn text_input(&self, user_id: UserId, session: &mut Session, text: &str) -> Outcome {
        self.gate(user_id).await?;

        match session.on_text(text) {
            Step::NeedChannel => Ok(need_channel()),
            Step::Invalid(hint) => Err(WorkflowError::MalformedInput(hint.into())),
            Step::Staged(_) => Ok(Reply::with_keyboard(
                "Ready. Confirm sending:",
                ui::confirm_send(),
            )),
            Step::Bind(reference) => {
                let channel = self.registry.bind(&reference, user_id).await?;
                session.reset();
                self.notifier
                    .emit(OperatorEvent::ChannelBound {
                        chat_id: channel.chat_id,
                    })
                    .await;
                Ok(Reply::menu(format!(
                    "✅ Channel bound.\nchat_id: {}\nusername: {}\nModeration: {}",
                    channel.chat_id,
                    channel.handle.as_deref().map_or("none".to_string(), |h| format!("@{}", h)),
                    if channel.moderation_enabled { "ON" } else { "OFF" },
                )))
            }
            Step::Select(reference) => {
                let chat = self.platform.resolve_chat(&reference).await.map_err(|e| {
                    WorkflowError::ChannelUnresolvable {
                        reference: reference.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                if self.registry.get(chat.chat_id).await?.is_none() {
                    return Err(WorkflowError::ChannelUnregistered);
                }
                session.channel_selected(chat.chat_id);
                Ok(Reply::with_keyboard(
                    "Channel selected.\nNow send text or media (photo, video, file, voice), \
                     with a caption if needed. A confirm button will follow.",
                    ui::back_to_menu(),
                ))
            }
            Step::Reviewer {
                chat_id,
                add,
                target,
            } => {
                if add {
                    self.registry.add_reviewer(chat_id, user_id, target).await?;
                    self.notifier
                        .emit(OperatorEvent::ReviewerAdded { chat_id })
                        .await;
                    Ok(Reply::menu(format!("Added: {}", target)))
                } else {
                    self.registry
                        .remove_reviewer(chat_id, user_id, target)
                        .await?;
                    self.notifier
                        .emit(OperatorEvent::ReviewerRemoved { chat_id })
                        .await;
                    Ok(Reply::menu(format!("Removed: {}", target)))
                }
            }
        }
    }

    async fn media_input(
        &self,
        user_id: UserId,
        session: &mut Session,
        kind: ContentKind,
        media_ref: &str,
        caption: Option<&str>,
    ) -> Outcome {
        self.gate(user_id).await?;

        let content = Content::media(kind, media_ref, caption)
            .map_err(|e| WorkflowError::MalformedInput(format!("Unsupported message: {}", e)))?;
        match session.on_media(content) {
            Step::Staged(_) => Ok(Reply::with_keyboard(
                "File received. Confirm sending:",
                ui::confirm_send(),
            )),
            _ => Ok(need_channel()),
        }
    }

    async fn menu_action(
        &self,
        user_id: UserId,
        session: &mut Session,
        action: MenuAction,
    ) -> Outcome {
        if !action.bypasses_consent() {
            self.gate(user_id).await?;
        }

        match action {
            MenuAction::PolicyAccept | MenuAction::PolicyDecline => {
                let accepted = action == MenuAction::PolicyAccept;
                let hash = self.policy().hash.clone();
                self.consent.record_decision(user_id, accepted, &hash).await?;
                if accepted {
                    self.notifier.emit(OperatorEvent::PolicyAccepted).await;
                    Ok(Reply::menu("✅ Accepted. Let's continue."))
                } else {
                    self.notifier.emit(OperatorEvent::PolicyDeclined).await;
                    Ok(Reply::text(
                        "❌ OK. The policy has to be accepted to use this bot.",
                    ))
                }
            }
            MenuAction::Back => {
                session.reset();
                Ok(Reply::menu(MENU_TEXT))
            }
            MenuAction::ShowPolicy => Ok(Reply::markdown(
                self.policy().text.clone(),
                ui::back_to_menu(),
            )),
            MenuAction::Send => Ok(Reply::with_keyboard(
                "Anonymous submission.\n\
                 If you came through a channel link, that channel is already selected.\n\
                 Otherwise press “Enter channel”.",
                ui::send_menu(),
            )),
            MenuAction::PickChannel => {
                session.enter_pick_channel();
                Ok(Reply::with_keyboard(
                    "Enter the channel @username or chat_id (-100…).\n\
                     The owner must have bound the channel via Control first.",
                    ui::back_to_menu(),
                ))
            }
            MenuAction::Control => Ok(Reply::with_keyboard("Control:", ui::control_menu())),
            MenuAction::ConfirmSend => self.confirm_send(user_id, session).await,
            MenuAction::CancelSend => {
                session.reset();
                Ok(Reply::menu("Cancelled."))
            }
            MenuAction::Bind => {
                session.enter_bind();
                Ok(Reply::with_keyboard(
                    "Channel binding.\nEnter the channel @username or chat_id (-100…).\n\n\
                     Requirements:\n• the bot is an administrator of the channel\n\
                     • only the creator (owner) can bind it",
                    ui::back_to_menu(),
                ))
            }
            MenuAction::ListChannels => {
                let channels = self.registry.channels_of(user_id).await?;
                if channels.is_empty() {
                    return Ok(Reply::with_keyboard(
                        "You have no bound channels.",
                        ui::control_menu(),
                    ));
                }
                Ok(Reply::with_keyboard("My channels:", ui::channel_list(&channels)))
            }
            MenuAction::OpenChannel(chat_id) => {
                let channel = self.registry.owned(chat_id, user_id).await?;
                Ok(channel_panel(&channel))
            }
            MenuAction::ToggleModeration(chat_id) => {
                let channel = self.registry.toggle_moderation(chat_id, user_id).await?;
                self.notifier
                    .emit(OperatorEvent::ModerationToggled {
                        chat_id,
                        enabled: channel.moderation_enabled,
                    })
                    .await;
                Ok(channel_panel(&channel))
            }
            MenuAction::CycleReviewerMode(chat_id) => {
                let mode = self.registry.cycle_reviewer_mode(chat_id, user_id).await?;
                self.notifier
                    .emit(OperatorEvent::ReviewerModeChanged { chat_id, mode })
                    .await;
                let channel = self.registry.owned(chat_id, user_id).await?;
                Ok(channel_panel(&channel))
            }
            MenuAction::ManageReviewers(chat_id) => {
                let reviewers = self.registry.reviewers(chat_id, user_id).await?;
                Ok(Reply::with_keyboard(
                    ui::reviewers_text(&reviewers),
                    ui::reviewers_panel(chat_id),
                ))
            }
            MenuAction::AddReviewer(chat_id) | MenuAction::RemoveReviewer(chat_id) => {
                self.registry.owned(chat_id, user_id).await?;
                let add = matches!(action, MenuAction::AddReviewer(_));
                session.enter_reviewer_edit(chat_id, add);
                let prompt = if add {
                    "Send the user_id to add as a reviewer."
                } else {
                    "Send the user_id to remove from the reviewers."
                };
                Ok(Reply::with_keyboard(prompt, ui::reviewers_panel(chat_id)))
            }
            MenuAction::IssueLink(chat_id) => self.issue_link(chat_id, user_id).await,
            MenuAction::Queue(chat_id) => self.queue_page(chat_id, user_id, 0).await,
            MenuAction::QueuePage { chat_id, offset } => {
                self.queue_page(chat_id, user_id, offset).await
            }
            MenuAction::QueueOpen {
                chat_id,
                submission_id,
            } => {
                if !self.authz.can_moderate(chat_id, user_id).await? {
                    return Err(WorkflowError::AccessDenied);
                }
                let submission = self.queue.open(chat_id, submission_id).await?;
                let ticket = ui::ticket_message(&submission);
                if ticket.content.kind.is_media() {
                    Ok(Reply::Standalone(ticket))
                } else {
                    Ok(Reply::Message {
                        text: ticket.content.text.unwrap_or_default(),
                        keyboard: ticket.keyboard,
                        markdown: false,
                    })
                }
            }
            MenuAction::Approve(id) => self.decide(user_id, id, Decision::Approve).await,
            MenuAction::Reject(id) => self.decide(user_id, id, Decision::Reject).await,
        }
    }

    /// Confirm staged content: queue it for review, or publish it right away
    /// when the channel has moderation off.
    async fn confirm_send(&self, user_id: UserId, session: &mut Session) -> Outcome {
        let Some((chat_id, content)) = session.staged().map(|(c, content)| (c, content.clone()))
        else {
            session.reset();
            return Ok(Reply::menu("Nothing to send."));
        };

        let Some(channel) = self.registry.get(chat_id).await? else {
            session.reset();
            return Err(WorkflowError::ChannelUnregistered);
        };

        if channel.moderation_enabled {
            let submission = self.queue.enqueue(chat_id, user_id, content).await?;
            session.reset();
            // Tickets go to the owner; other eligible reviewers use the queue.
            if !self
                .notifier
                .notify_user(channel.owner_user_id, ui::ticket_message(&submission))
                .await
            {
                warn!("Ticket for submission {} not delivered", submission.id);
            }
            self.notifier
                .emit(OperatorEvent::SubmissionQueued {
                    chat_id,
                    submission_id: submission.id,
                })
                .await;
            return Ok(Reply::menu("Sent for review 🕵️"));
        }

        match publish(self.platform.as_ref(), chat_id, &content).await {
            Ok(()) => {
                session.reset();
                self.queue.record_sent(chat_id, user_id, content).await?;
                self.notifier
                    .emit(OperatorEvent::PublishedDirectly { chat_id })
                    .await;
                Ok(Reply::menu("Message published ✅"))
            }
            Err(e) => {
                // Staged content stays so the user can confirm again.
                warn!("Direct publish to channel {} failed: {}", chat_id, e);
                self.notifier
                    .emit(OperatorEvent::DirectPublishFailed { chat_id })
                    .await;
                Ok(Reply::with_keyboard(
                    format!(
                        "{}\nPress “Send” to try again.",
                        WorkflowError::PublishFailed(e).user_message()
                    ),
                    ui::confirm_send(),
                ))
            }
        }
    }

    async fn issue_link(&self, chat_id: ChatId, user_id: UserId) -> Outcome {
        self.registry.owned(chat_id, user_id).await?;

        let code = self.codec.derive_code(chat_id);
        let cached = code.clone();
        blocking(&self.db, move |db| db.put_deeplink(&cached, chat_id)).await?;
        info!("Submission link issued for channel {}", chat_id);
        self.notifier
            .emit(OperatorEvent::LinkIssued { chat_id })
            .await;

        let link = format!(
            "https://t.me/{}?start={}",
            self.platform.bot_username(),
            code
        );
        Ok(Reply::with_keyboard(
            format!(
                "Link for submissions to this channel:\n{}\n\n\
                 Whoever opens it gets the channel preselected, then presses “Send anonymously”.",
                link
            ),
            Keyboard::new().button("⬅️ Back", MenuAction::OpenChannel(chat_id)),
        ))
    }

    async fn queue_page(&self, chat_id: ChatId, user_id: UserId, offset: u64) -> Outcome {
        if !self.authz.can_moderate(chat_id, user_id).await? {
            return Err(WorkflowError::AccessDenied);
        }
        let page = self.queue.page(chat_id, offset).await?;
        Ok(Reply::with_keyboard(
            ui::queue_text(&page),
            ui::queue(chat_id, &page),
        ))
    }

    async fn decide(&self, user_id: UserId, id: SubmissionId, decision: Decision) -> Outcome {
        let submission = match self.queue.decide(id, user_id, decision, &self.authz).await {
            Ok(submission) => submission,
            Err(WorkflowError::PublishFailed(e)) => {
                warn!("Publishing approved submission {} failed: {}", id, e);
                if let Some(submission) = self.queue.get(id).await? {
                    self.notifier
                        .emit(OperatorEvent::ApprovalPublishFailed {
                            chat_id: submission.chat_id,
                            submission_id: id,
                        })
                        .await;
                }
                return Err(WorkflowError::PublishFailed(e));
            }
            Err(e) => return Err(e),
        };

        let chat_id = submission.chat_id;
        let (notice, event, reply) = match decision {
            Decision::Approve => (
                "Your submission was approved and published ✅",
                OperatorEvent::SubmissionApproved {
                    chat_id,
                    submission_id: id,
                },
                "✅ Approved and published",
            ),
            Decision::Reject => (
                "Your submission was rejected ❌",
                OperatorEvent::SubmissionRejected {
                    chat_id,
                    submission_id: id,
                },
                "❌ Rejected",
            ),
        };
        self.notifier
            .notify_user(submission.sender_user_id, OutgoingMessage::notice(notice))
            .await;
        self.notifier.emit(event).await;
        Ok(Reply::text(reply))
    }
}

fn need_channel() -> Reply {
    Reply::menu("Select a channel first: Menu → Send anonymously → Enter channel.")
}

fn channel_panel(channel: &Channel) -> Reply {
    Reply::with_keyboard(ui::channel_panel_text(channel), ui::channel_panel(channel))
}
