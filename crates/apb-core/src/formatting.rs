//! Telegram HTML for batch progress and per-topic reports.

use crate::{
    batch::{PublishRecord, Stage},
    utils::truncate_text,
};

const ERROR_PREVIEW_CHARS: usize = 200;

/// Escape HTML special characters for Telegram HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn position_tag(position: usize, total: usize) -> String {
    if total > 1 {
        format!(" [{position}/{total}]")
    } else {
        String::new()
    }
}

pub fn batch_intro_html(total: usize) -> String {
    format!("📚 Received <b>{total}</b> topics. Processing them one at a time...")
}

pub fn progress_html(position: usize, total: usize, topic: &str, stage: Stage) -> String {
    format!(
        "⏳{} <i>{}</i>\n{}",
        position_tag(position, total),
        escape_html(topic),
        stage.progress_line()
    )
}

pub fn record_html(record: &PublishRecord, total: usize) -> String {
    let tag = position_tag(record.position, total);
    match &record.outcome {
        Ok(done) => {
            let mut lines = vec![
                format!("✅ <b>Article scheduled</b>{tag}"),
                String::new(),
                format!("📑 Title: {}", escape_html(&done.article.title)),
                format!("🔗 URL: {}", escape_html(&done.post.url)),
                format!("🗓 Goes live: {}", escape_html(&done.slot.display())),
            ];
            if let Some(credit) = &done.image.credit {
                lines.push(format!("📷 Photo: {}", escape_html(credit)));
            }
            lines.join("\n")
        }
        Err(failure) => {
            let err = truncate_text(&failure.error.to_string(), ERROR_PREVIEW_CHARS);
            format!(
                "❌ <b>Sorry, something went wrong</b>{tag} while {}.\n\nTopic: <i>{}</i>\nError: <code>{}</code>\n\nResend the topic to try again.",
                failure.stage.label(),
                escape_html(&record.topic),
                escape_html(&err)
            )
        }
    }
}

pub fn batch_summary_html(records: &[PublishRecord]) -> String {
    let published = records.iter().filter(|r| r.is_published()).count();
    let failed = records.len() - published;
    format!("🏁 Batch finished: <b>{published}</b> scheduled, <b>{failed}</b> failed.")
}

pub fn no_topics_html() -> String {
    "❌ I couldn't find a topic in that message. Send a topic, or a numbered list of topics."
        .to_string()
}
