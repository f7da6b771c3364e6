use tracing::warn;

use overheard_engine::{Platform, PlatformError, Reply};
use overheard_types::actions::Keyboard;
use overheard_types::models::ChatId;

use crate::telegram::BotApi;
use crate::telegram::types::CallbackQuery;

const MARKDOWN_FALLBACK: &str =
    "Cannot display the policy (MarkdownV2 formatting error). Check the policy file.";

/// Deliver a reply to typed input as a new message.
pub async fn to_chat(api: &BotApi, chat_id: ChatId, reply: Reply) {
    let result = match reply {
        Reply::Message {
            text,
            keyboard,
            markdown,
        } => send_text(api, chat_id, &text, keyboard.as_ref(), markdown).await,
        Reply::Prompt { text, keyboard } => {
            send_text(api, chat_id, &text, Some(&keyboard), true).await
        }
        Reply::Standalone(message) => api.send(chat_id, message).await.map(|_| ()),
        Reply::Alert(text) => api.send_text(chat_id, &text, None, false).await,
        Reply::Nothing => Ok(()),
    };
    if let Err(e) = result {
        warn!("Reply delivery failed: {}", e);
    }
}

/// Answer a button press: alerts pop up on the button, plain messages
/// replace the pressed message, falling back to a new message when the
/// pressed one cannot be edited (media messages, messages too old). Prompts
/// and media always arrive as new messages.
pub async fn to_callback(api: &BotApi, query: &CallbackQuery, reply: Reply) {
    let (alert, reply) = match reply {
        Reply::Alert(text) => (Some(text), Reply::Nothing),
        other => (None, other),
    };
    if let Err(e) = api
        .answer_callback(&query.id, alert.as_deref(), alert.is_some())
        .await
    {
        warn!("Callback answer failed: {}", e);
    }

    let Some(origin) = &query.message else {
        return to_chat(api, query.from.id, reply).await;
    };
    let chat_id = origin.chat.id;

    match reply {
        Reply::Message {
            text,
            keyboard,
            markdown,
        } => {
            let edited = api
                .edit_text(chat_id, origin.message_id, &text, keyboard.as_ref(), markdown)
                .await;
            if edited.is_err() {
                to_chat(
                    api,
                    chat_id,
                    Reply::Message {
                        text,
                        keyboard,
                        markdown,
                    },
                )
                .await;
            }
        }
        other => to_chat(api, chat_id, other).await,
    }
}

async fn send_text(
    api: &BotApi,
    chat_id: ChatId,
    text: &str,
    keyboard: Option<&Keyboard>,
    markdown: bool,
) -> Result<(), PlatformError> {
    match api.send_text(chat_id, text, keyboard, markdown).await {
        Err(e) if markdown => {
            warn!("MarkdownV2 message rejected: {}", e);
            let plain = format!("{}\n\nTechnical error: {}", MARKDOWN_FALLBACK, e);
            api.send_text(chat_id, &plain, keyboard, false).await
        }
        other => other,
    }
}
