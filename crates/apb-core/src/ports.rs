use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    domain::{Article, ImageRef, PublishedPost},
    scheduler::ScheduledSlot,
    Result,
};

/// Text generation backend (OpenAI today).
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Write an article about `topic`.
    async fn generate_article(&self, topic: &str) -> Result<Article>;

    /// Write a short stock-photo search query for `topic`.
    async fn describe_image(&self, topic: &str) -> Result<String>;
}

/// Stock image lookup (Unsplash today).
#[async_trait]
pub trait ImageSearch: Send + Sync {
    async fn find_image(&self, query: &str) -> Result<ImageRef>;
}

/// Blogging platform (WordPress today).
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Create a post that goes live at `slot`.
    async fn publish(
        &self,
        article: &Article,
        image: &ImageRef,
        slot: &ScheduledSlot,
    ) -> Result<PublishedPost>;

    /// Instants of posts already scheduled on the platform.
    ///
    /// Platforms that cannot report their calendar return an empty list.
    async fn scheduled_instants(&self) -> Result<Vec<DateTime<Utc>>> {
        Ok(Vec::new())
    }
}
