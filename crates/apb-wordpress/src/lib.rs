//! WordPress adapter (media upload + scheduled posts via the REST API).

use std::time::Duration;

use apb_core::{
    domain::{Article, ImageRef, PublishedPost},
    errors::Error,
    formatting::escape_html,
    ports::Publisher,
    scheduler::ScheduledSlot,
    Result,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

const IMAGE_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);
const SCHEDULED_PAGE_SIZE: u32 = 100;
const SCHEDULED_MAX_PAGES: u32 = 10;
/// WordPress `date_gmt` format (no offset).
const WP_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Clone, Debug)]
pub struct WordPressConfig {
    /// Site root, e.g. `https://blog.example`.
    pub site_url: String,
    pub oauth_token: String,
    pub categories: Vec<u64>,
    /// `future` schedules the post; `draft` leaves it for review.
    pub post_status: String,
}

#[derive(Clone, Debug)]
pub struct WordPressClient {
    cfg: WordPressConfig,
    api_base: String,
    http: reqwest::Client,
}

impl WordPressClient {
    pub fn new(cfg: WordPressConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("wordpress client build error: {e}")))?;
        let api_base = api_base(&cfg.site_url);
        Ok(Self {
            cfg,
            api_base,
            http,
        })
    }

    async fn download_image(&self, url: &str) -> Result<(Vec<u8>, String)> {
        let resp = self
            .http
            .get(url)
            .timeout(IMAGE_DOWNLOAD_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::External(format!("image download error: {e}")))?;
        let resp = check_status(resp, "image download").await?;

        let mime = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or_else(|| "image/jpeg".to_string());

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::External(format!("image download error: {e}")))?;
        Ok((bytes.to_vec(), mime))
    }

    async fn upload_media(&self, bytes: Vec<u8>, mime: &str) -> Result<Media> {
        let file_name = media_file_name(Utc::now(), mime);
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| Error::External(format!("wordpress multipart error: {e}")))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(format!("{}/media", self.api_base))
            .bearer_auth(&self.cfg.oauth_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::External(format!("wordpress media request error: {e}")))?;
        let resp = check_status(resp, "wordpress media upload").await?;

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("wordpress read error: {e}")))?;
        serde_json::from_str(&body).map_err(|e| invalid(format!("bad media response: {e}")))
    }

    async fn scheduled_page(&self, page: u32) -> Result<(Vec<DateTime<Utc>>, u32)> {
        let resp = self
            .http
            .get(format!("{}/posts", self.api_base))
            .bearer_auth(&self.cfg.oauth_token)
            .query(&[
                ("status", "future".to_string()),
                ("per_page", SCHEDULED_PAGE_SIZE.to_string()),
                ("page", page.to_string()),
                ("_fields", "date_gmt".to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("wordpress posts request error: {e}")))?;
        let resp = check_status(resp, "wordpress scheduled posts").await?;

        let total_pages = resp
            .headers()
            .get("x-wp-totalpages")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
            .unwrap_or(1);
        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("wordpress read error: {e}")))?;
        Ok((parse_scheduled(&body)?, total_pages))
    }
}

#[async_trait]
impl Publisher for WordPressClient {
    async fn publish(
        &self,
        article: &Article,
        image: &ImageRef,
        slot: &ScheduledSlot,
    ) -> Result<PublishedPost> {
        let (bytes, mime) = self.download_image(&image.url).await?;
        let media = self.upload_media(bytes, &mime).await?;
        tracing::debug!(media_id = media.id, "uploaded featured image");

        let payload = PostPayload::new(article, image, &media, slot, &self.cfg);
        let resp = self
            .http
            .post(format!("{}/posts", self.api_base))
            .bearer_auth(&self.cfg.oauth_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::External(format!("wordpress post request error: {e}")))?;
        let resp = check_status(resp, "wordpress post creation").await?;

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("wordpress read error: {e}")))?;
        let created: CreatedPost =
            serde_json::from_str(&body).map_err(|e| invalid(format!("bad post response: {e}")))?;

        tracing::info!(post_id = created.id, url = %created.link, date_gmt = %payload.date_gmt, "post created");
        Ok(PublishedPost {
            id: created.id,
            url: created.link,
        })
    }

    async fn scheduled_instants(&self) -> Result<Vec<DateTime<Utc>>> {
        let mut instants = Vec::new();
        let mut page = 1;
        loop {
            let (mut batch, total_pages) = self.scheduled_page(page).await?;
            instants.append(&mut batch);
            if page >= total_pages || page >= SCHEDULED_MAX_PAGES {
                break;
            }
            page += 1;
        }
        Ok(instants)
    }
}

#[derive(Debug, Deserialize)]
struct Media {
    id: u64,
    source_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedPost {
    id: u64,
    link: String,
}

#[derive(Debug, Deserialize)]
struct ScheduledPost {
    date_gmt: Option<String>,
}

#[derive(Debug, Serialize)]
struct PostPayload<'a> {
    title: &'a str,
    content: String,
    excerpt: &'a str,
    status: &'a str,
    featured_media: u64,
    #[serde(skip_serializing_if = "no_categories")]
    categories: &'a [u64],
    date_gmt: String,
}

impl<'a> PostPayload<'a> {
    fn new(
        article: &'a Article,
        image: &ImageRef,
        media: &Media,
        slot: &ScheduledSlot,
        cfg: &'a WordPressConfig,
    ) -> Self {
        Self {
            title: &article.title,
            content: format!(
                "{}\n\n{}",
                figure_html(&media.source_url, image, &article.title),
                article.content
            ),
            excerpt: &article.subtitle,
            status: &cfg.post_status,
            featured_media: media.id,
            categories: &cfg.categories,
            date_gmt: slot.publish_at_utc().format(WP_DATE_FORMAT).to_string(),
        }
    }
}

fn no_categories(categories: &&[u64]) -> bool {
    categories.is_empty()
}

fn api_base(site_url: &str) -> String {
    format!("{}/wp-json/wp/v2", site_url.trim().trim_end_matches('/'))
}

/// Featured image block. Alt text falls back to the article title; the
/// photographer credit becomes the caption.
fn figure_html(src: &str, image: &ImageRef, title: &str) -> String {
    let alt = image
        .alt
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(title);
    let caption = image
        .credit
        .as_deref()
        .map(|c| format!("<figcaption>Photo: {}</figcaption>", escape_html(c)))
        .unwrap_or_default();
    format!(
        "<figure class=\"wp-block-image\"><img src=\"{}\" alt=\"{}\"/>{caption}</figure>",
        escape_html(src),
        escape_html(alt)
    )
}

fn media_file_name(now: DateTime<Utc>, mime: &str) -> String {
    let ext = match mime {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    };
    format!("article-image-{}.{ext}", now.format("%Y%m%d-%H%M%S"))
}

fn parse_scheduled(body: &str) -> Result<Vec<DateTime<Utc>>> {
    let posts: Vec<ScheduledPost> =
        serde_json::from_str(body).map_err(|e| invalid(format!("bad posts response: {e}")))?;
    Ok(posts
        .into_iter()
        .filter_map(|p| p.date_gmt)
        .filter_map(|d| match NaiveDateTime::parse_from_str(&d, WP_DATE_FORMAT) {
            Ok(naive) => Some(naive.and_utc()),
            Err(e) => {
                tracing::warn!(date_gmt = %d, error = %e, "skipping unparseable post date");
                None
            }
        })
        .collect())
}

async fn check_status(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(Error::External(format!(
        "{what} failed: {status} {}",
        body.chars().take(200).collect::<String>()
    )))
}

fn invalid(reason: String) -> Error {
    Error::InvalidResponse {
        service: "wordpress",
        reason,
    }
}
