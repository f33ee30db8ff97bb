//! Topic batch processor.
//!
//! One inbound message becomes an ordered batch of topics. Topics run one at a
//! time through generate → illustrate → schedule → publish, and each topic's
//! outcome is reported to the chat as soon as it is known. A failing topic
//! never stops the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    domain::{Article, ChatId, ImageRef, MessageRef, PublishedPost},
    formatting::{batch_intro_html, batch_summary_html, no_topics_html, progress_html, record_html},
    messaging::port::MessagingPort,
    ports::{ContentGenerator, ImageSearch, Publisher},
    scheduler::{AssignedDates, ScheduledSlot, SlotScheduler},
    topics::parse_topics,
    Error, Result,
};

/// Pipeline step a topic can fail at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Generate,
    Illustrate,
    Schedule,
    Publish,
}

impl Stage {
    /// Completes "failed while ...".
    pub fn label(self) -> &'static str {
        match self {
            Stage::Generate => "generating the article",
            Stage::Illustrate => "finding an image",
            Stage::Schedule => "picking a publish date",
            Stage::Publish => "publishing",
        }
    }

    pub fn progress_line(self) -> &'static str {
        match self {
            Stage::Generate => "📝 Generating article content...",
            Stage::Illustrate => "🖼 Finding a perfect image...",
            Stage::Schedule => "🗓 Picking a publish date...",
            Stage::Publish => "🌐 Publishing...",
        }
    }
}

/// Everything produced for a topic that made it through the pipeline.
#[derive(Clone, Debug)]
pub struct PublishedArticle {
    pub article: Article,
    pub image: ImageRef,
    pub slot: ScheduledSlot,
    pub post: PublishedPost,
}

#[derive(Debug)]
pub struct TopicFailure {
    pub stage: Stage,
    pub error: Error,
}

impl TopicFailure {
    fn at(stage: Stage) -> impl FnOnce(Error) -> Self {
        move |error| Self { stage, error }
    }
}

/// Outcome of one topic. `position` is 1-based within the batch.
#[derive(Debug)]
pub struct PublishRecord {
    pub position: usize,
    pub topic: String,
    pub outcome: std::result::Result<PublishedArticle, TopicFailure>,
}

impl PublishRecord {
    pub fn is_published(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub struct BatchProcessor {
    generator: Arc<dyn ContentGenerator>,
    images: Arc<dyn ImageSearch>,
    publisher: Arc<dyn Publisher>,
    scheduler: SlotScheduler,
    check_remote_schedule: bool,
    clock: fn() -> DateTime<Utc>,
}

impl BatchProcessor {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        images: Arc<dyn ImageSearch>,
        publisher: Arc<dyn Publisher>,
        scheduler: SlotScheduler,
    ) -> Self {
        Self {
            generator,
            images,
            publisher,
            scheduler,
            check_remote_schedule: true,
            clock: Utc::now,
        }
    }

    /// Whether to seed each batch with the posts already scheduled on the platform.
    pub fn with_remote_schedule_check(mut self, enabled: bool) -> Self {
        self.check_remote_schedule = enabled;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn scheduler(&self) -> &SlotScheduler {
        &self.scheduler
    }

    /// Fresh claimed-date set for a batch.
    ///
    /// Failing to read the platform calendar is not fatal: the batch then only
    /// avoids collisions among its own topics.
    pub async fn initial_assignments(&self) -> AssignedDates {
        let mut assigned = AssignedDates::new();
        if !self.check_remote_schedule {
            return assigned;
        }

        match self.publisher.scheduled_instants().await {
            Ok(instants) => {
                let claimed = self.scheduler.claim_instants(&mut assigned, instants);
                tracing::debug!(claimed, "seeded batch with already scheduled posts");
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not read scheduled posts; using in-batch dates only");
            }
        }
        assigned
    }

    /// The slot the next article would get, without claiming it.
    pub async fn next_free_slot(&self) -> Result<ScheduledSlot> {
        let assigned = self.initial_assignments().await;
        self.scheduler.preview((self.clock)(), &assigned)
    }

    /// Parse `text` into topics and run every topic, reporting to `chat_id`.
    ///
    /// Returns `Error::NoTopics` (after telling the user) when the message has
    /// nothing to publish. Per-topic failures are inside the returned records.
    pub async fn run(
        &self,
        text: &str,
        chat_id: ChatId,
        messenger: &dyn MessagingPort,
    ) -> Result<Vec<PublishRecord>> {
        let topics = match parse_topics(text) {
            Ok(topics) => topics,
            Err(e) => {
                send_best_effort(messenger, chat_id, &no_topics_html()).await;
                return Err(e);
            }
        };

        let total = topics.len();
        tracing::info!(chat_id = chat_id.0, total, "starting batch");
        if total > 1 {
            send_best_effort(messenger, chat_id, &batch_intro_html(total)).await;
        }

        let mut assigned = self.initial_assignments().await;
        let mut records = Vec::with_capacity(total);

        for (idx, topic) in topics.into_iter().enumerate() {
            let position = idx + 1;
            let mut progress = Progress::start(messenger, chat_id, position, total, &topic).await;

            let outcome = self.run_topic(&topic, &mut assigned, &mut progress).await;
            match &outcome {
                Ok(done) => tracing::info!(
                    position,
                    topic = %topic,
                    url = %done.post.url,
                    publish_at = %done.slot.publish_at,
                    "topic published"
                ),
                Err(failure) => tracing::error!(
                    position,
                    topic = %topic,
                    stage = ?failure.stage,
                    error = %failure.error,
                    "topic failed"
                ),
            }

            let record = PublishRecord {
                position,
                topic,
                outcome,
            };
            send_best_effort(messenger, chat_id, &record_html(&record, total)).await;
            progress.finish().await;
            records.push(record);
        }

        if total > 1 {
            send_best_effort(messenger, chat_id, &batch_summary_html(&records)).await;
        }

        Ok(records)
    }

    async fn run_topic(
        &self,
        topic: &str,
        assigned: &mut AssignedDates,
        progress: &mut Progress<'_>,
    ) -> std::result::Result<PublishedArticle, TopicFailure> {
        progress.stage(Stage::Generate).await;
        let article = self
            .generator
            .generate_article(topic)
            .await
            .map_err(TopicFailure::at(Stage::Generate))?
            .normalized();

        progress.stage(Stage::Illustrate).await;
        let image = self
            .illustrate(topic)
            .await
            .map_err(TopicFailure::at(Stage::Illustrate))?;

        progress.stage(Stage::Schedule).await;
        // A date stays claimed even if publishing fails below: the request may
        // have reached the platform.
        let slot = self
            .scheduler
            .next_slot((self.clock)(), assigned)
            .map_err(TopicFailure::at(Stage::Schedule))?;

        progress.stage(Stage::Publish).await;
        let post = self
            .publisher
            .publish(&article, &image, &slot)
            .await
            .map_err(TopicFailure::at(Stage::Publish))?;

        Ok(PublishedArticle {
            article,
            image,
            slot,
            post,
        })
    }

    async fn illustrate(&self, topic: &str) -> Result<ImageRef> {
        let description = self.generator.describe_image(topic).await?;
        let query = if description.trim().is_empty() {
            topic
        } else {
            description.trim()
        };
        tracing::debug!(query, "searching image");
        self.images.find_image(query).await
    }
}

/// The per-topic status message, edited as the topic moves through stages.
struct Progress<'a> {
    messenger: &'a dyn MessagingPort,
    msg: Option<MessageRef>,
    position: usize,
    total: usize,
    topic: String,
}

impl<'a> Progress<'a> {
    async fn start(
        messenger: &'a dyn MessagingPort,
        chat_id: ChatId,
        position: usize,
        total: usize,
        topic: &str,
    ) -> Progress<'a> {
        let html = progress_html(position, total, topic, Stage::Generate);
        let msg = match messenger.send_html(chat_id, &html).await {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "failed to send progress message");
                None
            }
        };
        Self {
            messenger,
            msg,
            position,
            total,
            topic: topic.to_string(),
        }
    }

    async fn stage(&mut self, stage: Stage) {
        // The initial message already shows the first stage.
        if stage == Stage::Generate || !self.messenger.capabilities().supports_edit {
            return;
        }
        let Some(msg) = self.msg else {
            return;
        };
        let html = progress_html(self.position, self.total, &self.topic, stage);
        if let Err(e) = self.messenger.edit_html(msg, &html).await {
            tracing::warn!(error = %e, "failed to update progress message");
        }
    }

    async fn finish(self) {
        let Some(msg) = self.msg else {
            return;
        };
        if let Err(e) = self.messenger.delete_message(msg).await {
            tracing::debug!(error = %e, "failed to remove progress message");
        }
    }
}

async fn send_best_effort(messenger: &dyn MessagingPort, chat_id: ChatId, html: &str) {
    if let Err(e) = messenger.send_html(chat_id, html).await {
        tracing::warn!(error = %e, "failed to send chat message");
    }
}
