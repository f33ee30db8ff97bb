//! Unsplash adapter (stock photo search).

use std::time::Duration;

use apb_core::{domain::ImageRef, errors::Error, ports::ImageSearch, Result};
use async_trait::async_trait;
use serde::Deserialize;

const SEARCH_URL: &str = "https://api.unsplash.com/search/photos";

#[derive(Clone, Debug)]
pub struct UnsplashClient {
    access_key: String,
    http: reqwest::Client,
}

impl UnsplashClient {
    pub fn new(access_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("unsplash client build error: {e}")))?;
        Ok(Self {
            access_key: access_key.into(),
            http,
        })
    }
}

#[async_trait]
impl ImageSearch for UnsplashClient {
    async fn find_image(&self, query: &str) -> Result<ImageRef> {
        let resp = self
            .http
            .get(SEARCH_URL)
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .header("Accept-Version", "v1")
            .query(&[("query", query), ("per_page", "1")])
            .send()
            .await
            .map_err(|e| Error::External(format!("unsplash request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "unsplash search failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("unsplash read error: {e}")))?;
        let image = parse_search(&body)?;
        tracing::debug!(query, url = %image.url, "unsplash match");
        Ok(image)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Debug, Deserialize)]
struct Photo {
    urls: PhotoUrls,
    alt_description: Option<String>,
    description: Option<String>,
    user: Option<Photographer>,
}

#[derive(Debug, Deserialize)]
struct PhotoUrls {
    regular: String,
}

#[derive(Debug, Deserialize)]
struct Photographer {
    name: Option<String>,
}

/// First search result as an [`ImageRef`].
fn parse_search(body: &str) -> Result<ImageRef> {
    let parsed: SearchResponse = serde_json::from_str(body).map_err(|e| Error::InvalidResponse {
        service: "unsplash",
        reason: e.to_string(),
    })?;

    let photo = parsed
        .results
        .into_iter()
        .next()
        .ok_or_else(|| Error::External("No matching images found on Unsplash".to_string()))?;

    let alt = photo
        .alt_description
        .or(photo.description)
        .filter(|s| !s.trim().is_empty());
    let credit = photo
        .user
        .and_then(|u| u.name)
        .filter(|s| !s.trim().is_empty())
        .map(|name| format!("{name} on Unsplash"));

    Ok(ImageRef {
        url: photo.urls.regular,
        alt,
        credit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn takes_first_result_with_alt_and_credit() {
        let body = r#"{
            "total": 2,
            "results": [
                {
                    "urls": {"raw": "r", "regular": "https://images.unsplash.com/photo-1"},
                    "alt_description": "castle on a hill",
                    "description": null,
                    "user": {"name": "Ailsa Craig"}
                },
                {"urls": {"regular": "https://images.unsplash.com/photo-2"}}
            ]
        }"#;
        let image = parse_search(body).unwrap();
        assert_eq!(image.url, "https://images.unsplash.com/photo-1");
        assert_eq!(image.alt.as_deref(), Some("castle on a hill"));
        assert_eq!(image.credit.as_deref(), Some("Ailsa Craig on Unsplash"));
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let body = r#"{"results": [{"urls": {"regular": "https://x/y.jpg"}, "alt_description": ""}]}"#;
        let image = parse_search(body).unwrap();
        assert_eq!(image.url, "https://x/y.jpg");
        assert_eq!(image.alt, None);
        assert_eq!(image.credit, None);
    }

    #[test]
    fn no_results_is_an_error() {
        let err = parse_search(r#"{"total": 0, "results": []}"#).unwrap_err();
        assert!(err.to_string().contains("No matching images"));
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        assert!(matches!(
            parse_search("<html>rate limited</html>"),
            Err(Error::InvalidResponse { service: "unsplash", .. })
        ));
    }
}
