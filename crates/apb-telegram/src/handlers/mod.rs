//! Telegram update handlers.
//!
//! Every message is checked against the allowlist first. Commands go to
//! `commands`, plain text is treated as a topic batch.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use apb_core::domain::UserId;
use apb_core::security::is_authorized;
use apb_core::utils::AuditEvent;

use crate::router::AppState;
mod commands;
mod text;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let user = msg.from();
    let user_id = user.map(|u| u.id.0 as i64);

    if !is_authorized(user_id.map(UserId), &state.cfg.telegram_allowed_users) {
        let username = user
            .and_then(|u| u.username.clone())
            .unwrap_or_else(|| "unknown".to_string());
        tracing::warn!(user_id = ?user_id, username = %username, "unauthorized message");
        if let Err(e) = state
            .audit
            .write(AuditEvent::auth(user_id.unwrap_or_default(), &username, false))
        {
            tracing::warn!(error = %e, "failed to write auth audit event");
        }
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        let _ = bot
            .send_message(
                msg.chat.id,
                "Send me a topic as text, or a numbered list of topics.",
            )
            .await;
        return Ok(());
    };

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }

    text::handle_text(bot, msg, state).await
}
