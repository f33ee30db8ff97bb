use serde::{Deserialize, Serialize};

use crate::utils::truncate_text;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

pub const TITLE_MAX_CHARS: usize = 60;
pub const SUBTITLE_MAX_CHARS: usize = 120;

/// Generated article content. `content` is HTML.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub subtitle: String,
    pub content: String,
}

impl Article {
    /// Trim whitespace and cap title/subtitle lengths.
    ///
    /// Over-long values keep `max - 3` characters and end in `...`, so the
    /// result is exactly `max` characters.
    pub fn normalized(self) -> Self {
        Self {
            title: cap_chars(self.title.trim(), TITLE_MAX_CHARS),
            subtitle: cap_chars(self.subtitle.trim(), SUBTITLE_MAX_CHARS),
            content: self.content.trim().to_string(),
        }
    }
}

fn cap_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    truncate_text(s, max.saturating_sub(3))
}

/// A picture chosen for an article.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub alt: Option<String>,
    pub credit: Option<String>,
}

/// A post created on the publishing service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedPost {
    pub id: u64,
    pub url: String,
}
