use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

use apb_core::{
    batch::PublishRecord,
    domain::{ChatId, UserId},
    messaging::{port::MessagingPort, types::ChatAction},
    security::Admission,
    topics::parse_topics,
    utils::{AuditEvent, AuditLogger},
};

use crate::router::AppState;

const TYPING_INTERVAL: Duration = Duration::from_secs(4);

pub async fn handle_text(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text().map(|s| s.to_string()) else {
        return Ok(());
    };

    let user_id = user.id.0 as i64;
    let username = user
        .username
        .clone()
        .unwrap_or_else(|| "unknown".to_string());
    let chat_id = ChatId(msg.chat.id.0);

    // Messages without topics only get an explanation and do not use up a batch.
    let topic_count = parse_topics(&text).map(|t| t.len()).unwrap_or(0);
    if topic_count > 0 {
        let admission = state.rate_limiter.lock().await.admit_batch(UserId(user_id));
        if let Admission::Limited { retry_after } = admission {
            let retry = retry_after.unwrap_or_default().as_secs_f64();
            audit(
                &state.audit,
                AuditEvent::rate_limit(user_id, &username, retry),
            );
            let _ = bot
                .send_message(msg.chat.id, rate_limited_text(retry_after))
                .await;
            return Ok(());
        }
        audit(
            &state.audit,
            AuditEvent::batch(user_id, &username, &text, topic_count),
        );
    }

    let _guard = match state.publish_lock.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            let _ = state
                .messenger
                .send_html(
                    chat_id,
                    "⏳ Another batch is being published. Yours will start as soon as it finishes.",
                )
                .await;
            state.publish_lock.lock().await
        }
    };

    let cancel = CancellationToken::new();
    let typing_task = tokio::spawn(typing_loop(
        state.messenger.clone(),
        chat_id,
        cancel.clone(),
    ));

    let result = state
        .processor
        .run(&text, chat_id, state.messenger.as_ref())
        .await;

    cancel.cancel();
    let _ = typing_task.await;

    match result {
        Ok(records) => {
            for record in &records {
                audit(&state.audit, record_event(user_id, &username, record));
            }
        }
        Err(apb_core::Error::NoTopics) => {
            tracing::debug!(user_id, "message had no topics");
        }
        Err(e) => {
            tracing::error!(user_id, error = %e, "batch failed");
            audit(
                &state.audit,
                AuditEvent::error(user_id, &username, &e.to_string(), Some("batch")),
            );
        }
    }

    Ok(())
}

async fn typing_loop(messenger: Arc<dyn MessagingPort>, chat_id: ChatId, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(TYPING_INTERVAL);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick.tick() => {
                let _ = messenger.send_chat_action(chat_id, ChatAction::Typing).await;
            }
        }
    }
}

fn record_event(user_id: i64, username: &str, record: &PublishRecord) -> AuditEvent {
    match &record.outcome {
        Ok(done) => AuditEvent::published(
            user_id,
            username,
            &record.topic,
            &done.post.url,
            &done.slot.publish_at.to_rfc3339(),
        ),
        Err(failure) => AuditEvent::error(
            user_id,
            username,
            &failure.error.to_string(),
            Some(format!("{} ({})", failure.stage.label(), record.topic).as_str()),
        ),
    }
}

fn rate_limited_text(retry_after: Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(
            "⏳ You have used up your batches for now. Please wait {:.0} seconds.",
            d.as_secs_f64().ceil()
        ),
        None => "⏳ Publishing batches are switched off for this bot.".to_string(),
    }
}

fn audit(logger: &AuditLogger, event: AuditEvent) {
    if let Err(e) = logger.write(event) {
        tracing::warn!(error = %e, "failed to write audit event");
    }
}
