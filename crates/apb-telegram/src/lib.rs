//! Telegram adapter (teloxide).
//!
//! Implements the `apb-core` MessagingPort over the Telegram Bot API and runs
//! the long-polling dispatcher.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use tokio::time::sleep;

pub mod handlers;
pub mod router;

use apb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, MessagingCapabilities},
    },
    Result,
};

/// Batch progress and reports over the Telegram Bot API.
///
/// Progress messages are edited and deleted as topics move on. Telegram
/// rejects an edit that changes nothing, and a progress message may already be
/// gone by the time it is removed; both are treated as success.
#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Run `op`, waiting out one flood-control `RetryAfter`.
    async fn call<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        match op().await {
            Err(RequestError::RetryAfter(d)) => {
                tracing::debug!(wait = ?d, "telegram flood control, retrying once");
                sleep(d).await;
                op().await
            }
            other => other,
        }
    }

    /// Like `call`, for edits and deletes of progress messages.
    async fn call_on_progress<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<()>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        match self.call(op).await {
            Ok(_) => Ok(()),
            Err(e) if is_stale_progress_error(&e) => {
                tracing::debug!(error = %e, "ignoring stale progress message");
                Ok(())
            }
            Err(e) => Err(Self::map_err(e)),
        }
    }
}

fn is_stale_progress_error(e: &RequestError) -> bool {
    matches!(
        e,
        RequestError::Api(
            ApiError::MessageNotModified
                | ApiError::MessageToEditNotFound
                | ApiError::MessageToDeleteNotFound
                | ApiError::MessageCantBeDeleted
        )
    )
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_edit: true,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        // Reports carry the post URL; a preview card would bury the text.
        let msg = self
            .call(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
                    .disable_web_page_preview(true)
            })
            .await
            .map_err(Self::map_err)?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.call_on_progress(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.call_on_progress(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.call(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
