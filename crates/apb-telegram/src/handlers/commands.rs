use std::sync::Arc;
use std::time::Duration;

use teloxide::prelude::*;

use apb_core::{
    domain::{ChatId, UserId},
    formatting::escape_html,
    scheduler::{ScheduledSlot, SlotScheduler},
    security::BatchAllowance,
    supervisor, Result,
};

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn welcome_html(scheduler: &SlotScheduler) -> String {
    format!(
        "👋 <b>Welcome to the Article Publishing Bot!</b>\n\n\
Send me a topic, and I will:\n\
1. Generate an SEO-optimized article\n\
2. Find a relevant image\n\
3. Schedule it on WordPress\n\n\
Send a numbered list to queue several topics at once, e.g.\n\
<code>1. Best coffee in Leith\n2. Walks on Arthur's Seat</code>\n\n\
Each article gets its own day, published at <b>{}</b> ({}).\n\n\
<b>📋 Commands:</b>\n\
/start, /help - Show this message\n\
/status - Next free publish slot\n\
/kill - Stop all running bot instances",
        scheduler.publish_time().format("%H:%M"),
        escape_html(scheduler.timezone().name())
    )
}

fn status_html(next: &Result<ScheduledSlot>, busy: bool, rate: Option<BatchAllowance>) -> String {
    let mut lines = vec!["📊 <b>Bot Status</b>".to_string(), String::new()];

    match next {
        Ok(slot) => lines.push(format!(
            "🗓 Next free slot: {}",
            escape_html(&slot.display())
        )),
        Err(e) => lines.push(format!(
            "🗓 Next free slot: <i>unavailable</i> ({})",
            escape_html(&e.to_string())
        )),
    }

    lines.push(if busy {
        "⏳ A batch is publishing right now".to_string()
    } else {
        "✅ Idle".to_string()
    });

    if let Some(rate) = rate {
        lines.push(format!(
            "🎫 Batches available: {} of {}",
            rate.remaining, rate.max
        ));
    }

    lines.join("\n")
}

fn kill_report_html(killed: &[u32]) -> String {
    if killed.is_empty() {
        return "🛑 No other bot instances found. Shutting down this one.".to_string();
    }
    let pids = killed
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "🛑 Stopped {} other instance(s): <code>{}</code>\nShutting down this one.",
        killed.len(),
        pids
    )
}

async fn reply(state: &AppState, chat_id: i64, html: &str) {
    if let Err(e) = state.messenger.send_html(ChatId(chat_id), html).await {
        tracing::warn!(error = %e, "failed to send command reply");
    }
}

pub async fn handle_command(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let user_id = user.id.0 as i64;
    let chat_id = msg.chat.id.0;

    let (cmd, _arg) = parse_command(text);
    tracing::debug!(user_id, cmd = %cmd, "command");

    match cmd.as_str() {
        "start" | "help" => {
            reply(&state, chat_id, &welcome_html(state.processor.scheduler())).await;
            Ok(())
        }

        "status" => {
            let busy = state.publish_lock.try_lock().is_err();
            let next = state.processor.next_free_slot().await;
            let rate = if state.cfg.rate_limit_enabled {
                Some(state.rate_limiter.lock().await.allowance(UserId(user_id)))
            } else {
                None
            };
            reply(&state, chat_id, &status_html(&next, busy, rate)).await;
            Ok(())
        }

        "kill" => {
            let pattern = supervisor::own_instance_pattern();
            let own_pid = std::process::id();
            let killed = match supervisor::find_instances(&pattern, own_pid).await {
                Ok(pids) => supervisor::terminate(&pids).await,
                Err(e) => {
                    tracing::warn!(error = %e, "could not list bot instances");
                    Vec::new()
                }
            };
            tracing::warn!(user_id, ?killed, "kill requested; exiting");
            reply(&state, chat_id, &kill_report_html(&killed)).await;

            tokio::time::sleep(Duration::from_millis(500)).await;
            std::process::exit(0);
        }

        _ => {
            let msg = format!(
                "Unknown command: /{}\nSend /help for the list of commands.",
                escape_html(&cmd)
            );
            reply(&state, chat_id, &msg).await;
            Ok(())
        }
    }
}
