//! OpenAI adapter (article writing + image search queries).
//!
//! Uses the `chat/completions` endpoint. Articles come back through a forced
//! `create_article` tool call so the title/subtitle/body arrive as JSON.

use std::time::Duration;

use apb_core::{domain::Article, errors::Error, ports::ContentGenerator, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const ARTICLE_TOOL: &str = "create_article";

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    /// Regional/editorial focus appended to every prompt.
    context: String,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        context: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("openai client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            context: context.into(),
            http,
        })
    }

    async fn chat(&self, body: Value) -> Result<Value> {
        let resp = self
            .http
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::External(format!("openai request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "openai chat completion failed: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        resp.json()
            .await
            .map_err(|e| Error::External(format!("openai json error: {e}")))
    }
}

#[async_trait]
impl ContentGenerator for OpenAiClient {
    async fn generate_article(&self, topic: &str) -> Result<Article> {
        tracing::info!(topic, model = %self.model, "generating article");
        let v = self.chat(article_request(&self.model, &self.context, topic)).await?;
        parse_article(&v)
    }

    async fn describe_image(&self, topic: &str) -> Result<String> {
        let v = self
            .chat(image_query_request(&self.model, &self.context, topic))
            .await?;
        let description = parse_message_text(&v)?;
        tracing::info!(topic, description = %description, "generated image description");
        Ok(description)
    }
}

fn article_request(model: &str, context: &str, topic: &str) -> Value {
    let prompt = format!(
        "Write a medium-length, SEO-optimized article about {topic}.\n\
         {context}\n\n\
         The content should be well-structured with:\n\
         - An engaging introduction\n\
         - 2-3 main sections with subheadings\n\
         - A strong conclusion\n\
         - Relevant local information\n\
         - Proper HTML formatting with <h2>, <p>, <ul> tags etc."
    );

    json!({
        "model": model,
        "temperature": 0.7,
        "max_tokens": 4000,
        "messages": [
            {"role": "system", "content": "You are a professional content writer."},
            {"role": "user", "content": prompt},
        ],
        "tools": [{
            "type": "function",
            "function": {
                "name": ARTICLE_TOOL,
                "description": "Create an SEO-optimized article",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "title": {
                            "type": "string",
                            "description": "SEO-optimized title (maximum 60 characters)"
                        },
                        "subtitle": {
                            "type": "string",
                            "description": "Compelling subtitle (maximum 120 characters)"
                        },
                        "content": {
                            "type": "string",
                            "description": "HTML formatted content with proper headings, paragraphs, and lists"
                        }
                    },
                    "required": ["title", "subtitle", "content"]
                }
            }
        }],
        "tool_choice": {"type": "function", "function": {"name": ARTICLE_TOOL}},
    })
}

fn image_query_request(model: &str, context: &str, topic: &str) -> Value {
    let prompt = format!(
        "Generate a short, specific description for an image that would be perfect for an article about {topic}.\n\
         {context}\n\
         Make the description specific enough for a stock photo search.\n\
         Return only the description, no additional text."
    );

    json!({
        "model": model,
        "temperature": 0.7,
        "max_tokens": 100,
        "messages": [
            {"role": "system", "content": "You are a professional photographer choosing stock photos."},
            {"role": "user", "content": prompt},
        ],
    })
}

fn invalid(reason: impl Into<String>) -> Error {
    Error::InvalidResponse {
        service: "openai",
        reason: reason.into(),
    }
}

fn first_message(v: &Value) -> Result<&Value> {
    v.pointer("/choices/0/message")
        .ok_or_else(|| invalid("response has no choices"))
}

/// Article from the `create_article` tool call arguments.
fn parse_article(v: &Value) -> Result<Article> {
    let message = first_message(v)?;
    // Older models answer with `function_call` instead of `tool_calls`.
    let arguments = message
        .pointer("/tool_calls/0/function/arguments")
        .or_else(|| message.pointer("/function_call/arguments"))
        .and_then(|a| a.as_str())
        .ok_or_else(|| invalid("response has no create_article call"))?;

    let article: Article = serde_json::from_str(arguments)
        .map_err(|e| invalid(format!("bad create_article arguments: {e}")))?;

    if article.title.trim().is_empty() || article.content.trim().is_empty() {
        return Err(invalid("article is missing a title or content"));
    }
    Ok(article)
}

fn parse_message_text(v: &Value) -> Result<String> {
    let text = first_message(v)?
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or("")
        .trim()
        .trim_matches('"')
        .to_string();
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_call_response(arguments: &str) -> Value {
        json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "create_article", "arguments": arguments}
                    }]
                }
            }]
        })
    }

    #[test]
    fn parses_article_from_tool_call() {
        let args = r#"{"title":"Best Coffee in Leith","subtitle":"Where to go","content":"<p>Hi</p>"}"#;
        let article = parse_article(&tool_call_response(args)).unwrap();
        assert_eq!(article.title, "Best Coffee in Leith");
        assert_eq!(article.subtitle, "Where to go");
        assert_eq!(article.content, "<p>Hi</p>");
    }

    #[test]
    fn parses_legacy_function_call() {
        let v = json!({
            "choices": [{
                "message": {
                    "function_call": {
                        "name": "create_article",
                        "arguments": r#"{"title":"T","subtitle":"S","content":"C"}"#
                    }
                }
            }]
        });
        assert_eq!(parse_article(&v).unwrap().title, "T");
    }

    #[test]
    fn rejects_missing_or_malformed_tool_call() {
        let plain = json!({"choices": [{"message": {"content": "Sure! Here's an article"}}]});
        assert!(matches!(
            parse_article(&plain),
            Err(Error::InvalidResponse { service: "openai", .. })
        ));

        let broken = tool_call_response(r#"{"title": "unterminated"#);
        assert!(matches!(
            parse_article(&broken),
            Err(Error::InvalidResponse { .. })
        ));

        let empty = tool_call_response(r#"{"title":"","subtitle":"","content":""}"#);
        assert!(parse_article(&empty).is_err());

        assert!(parse_article(&json!({"choices": []})).is_err());
    }

    #[test]
    fn message_text_is_trimmed_and_unquoted() {
        let v = json!({"choices": [{"message": {"content": "  \"Edinburgh castle at dusk\"\n"}}]});
        assert_eq!(parse_message_text(&v).unwrap(), "Edinburgh castle at dusk");
    }

    #[test]
    fn article_request_forces_the_tool_and_carries_context() {
        let body = article_request("gpt-4o-mini", "Write in British English.", "Haggis");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tool_choice"]["function"]["name"], ARTICLE_TOOL);
        let prompt = body["messages"][1]["content"].as_str().unwrap();
        assert!(prompt.contains("about Haggis"));
        assert!(prompt.contains("Write in British English."));
    }

    #[test]
    fn client_builds_with_timeout() {
        let client =
            OpenAiClient::new("sk-test", "gpt-4o-mini", "", Duration::from_secs(5)).unwrap();
        assert_eq!(client.model, "gpt-4o-mini");
    }
}
