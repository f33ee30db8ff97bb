use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;

use crate::{errors::Error, Result};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/audit).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Audit Logging ==============

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<f64>,
}

impl AuditEvent {
    fn base(event: &str, user_id: i64, username: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: Some(user_id),
            username: Some(username.to_string()),
            content: None,
            topics: None,
            topic: None,
            post_url: None,
            scheduled_for: None,
            authorized: None,
            error: None,
            context: None,
            retry_after: None,
        }
    }

    /// An inbound message accepted as a batch of `topics` topics.
    pub fn batch(user_id: i64, username: &str, content: &str, topics: usize) -> Self {
        let mut ev = Self::base("batch", user_id, username);
        ev.content = Some(content.to_string());
        ev.topics = Some(topics);
        ev
    }

    pub fn published(
        user_id: i64,
        username: &str,
        topic: &str,
        post_url: &str,
        scheduled_for: &str,
    ) -> Self {
        let mut ev = Self::base("published", user_id, username);
        ev.topic = Some(topic.to_string());
        ev.post_url = Some(post_url.to_string());
        ev.scheduled_for = Some(scheduled_for.to_string());
        ev
    }

    pub fn auth(user_id: i64, username: &str, authorized: bool) -> Self {
        let mut ev = Self::base("auth", user_id, username);
        ev.authorized = Some(authorized);
        ev
    }

    pub fn error(user_id: i64, username: &str, error: &str, context: Option<&str>) -> Self {
        let mut ev = Self::base("error", user_id, username);
        ev.error = Some(error.to_string());
        ev.context = context.map(|s| s.to_string());
        ev
    }

    pub fn rate_limit(user_id: i64, username: &str, retry_after: f64) -> Self {
        let mut ev = Self::base("rate_limit", user_id, username);
        ev.retry_after = Some(retry_after);
        ev
    }
}

/// Append-only audit log (plain text blocks or JSON lines).
#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        if let Some(s) = &event.content {
            event.content = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }
        if let Some(s) = &event.error {
            event.error = Some(truncate_text(s, AUDIT_MAX_TEXT));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::External(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }
}

/// Truncate to `max_len` characters, appending `...` when something was cut.
pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.log"))
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(AUDIT_MAX_TEXT + 10);
        let t = truncate_text(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), AUDIT_MAX_TEXT + 3);
    }

    #[test]
    fn truncate_text_counts_characters_not_bytes() {
        assert_eq!(truncate_text("héllo", 5), "héllo");
        assert_eq!(truncate_text("héllo", 2), "hé...");
    }

    #[test]
    fn audit_truncates_batch_content() {
        let log = AuditLogger::new(tmp_file("apb-audit-test"), true);
        let content = "x".repeat(AUDIT_MAX_TEXT + 1);
        let ev = AuditEvent::batch(1, "u", &content, 3);
        log.write(ev).unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        let v: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(v["event"], "batch");
        assert_eq!(v["topics"], 3);
        assert!(v["content"].as_str().unwrap().ends_with("..."));
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn plain_text_audit_lists_fields() {
        let log = AuditLogger::new(tmp_file("apb-audit-plain"), false);
        log.write(AuditEvent::published(
            7,
            "ana",
            "Best Coffee Shops",
            "https://blog.example/coffee",
            "2026-10-20T06:03:00+01:00",
        ))
        .unwrap();

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("event: published"));
        assert!(written.contains("post_url: https://blog.example/coffee"));
        assert!(!written.contains("error:"));
        let _ = std::fs::remove_file(log.path());
    }
}
