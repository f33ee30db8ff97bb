use std::{env, path::PathBuf, time::Duration};

use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::{errors::Error, scheduler::SlotScheduler, Result};

const DEFAULT_CONTENT_CONTEXT: &str = "Write in British English. \
Focus on Scotland (especially Edinburgh and surrounding areas) and include relevant local information.";

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_allowed_users: Vec<i64>,

    // OpenAI
    pub openai_api_key: String,
    pub openai_model: String,
    pub content_context: String,

    // Unsplash
    pub unsplash_access_key: String,

    // WordPress
    pub wordpress_site_url: String,
    pub wordpress_oauth_token: String,
    pub wordpress_categories: Vec<u64>,
    pub wordpress_post_status: String,

    // Scheduling
    pub publish_time: NaiveTime,
    pub publish_timezone: Tz,
    pub schedule_horizon_days: u32,
    pub schedule_check_remote: bool,

    // HTTP
    pub http_timeout: Duration,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,

    // Rate limiting (batches per user)
    pub rate_limit_enabled: bool,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
}

impl Config {
    /// Load from the process environment, after merging `.env` if present.
    ///
    /// Variables already set in the environment win over `.env`.
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).and_then(non_empty);
        let required = |key: &str| {
            var(key).ok_or_else(|| {
                Error::Config(format!("{key} environment variable is required"))
            })
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_allowed_users = parse_csv_i64(var("TELEGRAM_ALLOWED_USERS"));
        if telegram_allowed_users.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_ALLOWED_USERS environment variable is required".to_string(),
            ));
        }

        let openai_api_key = required("OPENAI_API_KEY")?;
        let openai_model = var("OPENAI_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let content_context =
            var("CONTENT_CONTEXT").unwrap_or_else(|| DEFAULT_CONTENT_CONTEXT.to_string());

        let unsplash_access_key = required("UNSPLASH_ACCESS_KEY")?;

        let wordpress_site_url = required("WORDPRESS_SITE_URL")?
            .trim()
            .trim_end_matches('/')
            .to_string();
        let wordpress_oauth_token = required("WORDPRESS_OAUTH_TOKEN")?;
        let wordpress_categories = parse_csv_u64("WORDPRESS_CATEGORIES", var("WORDPRESS_CATEGORIES"))?;
        let wordpress_post_status = var("WORDPRESS_POST_STATUS")
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "future".to_string());

        let publish_time = match var("PUBLISH_TIME") {
            Some(raw) => parse_time_of_day(&raw)?,
            None => NaiveTime::from_hms_opt(6, 3, 0)
                .ok_or_else(|| Error::Config("invalid default publish time".to_string()))?,
        };
        let publish_timezone = parse_timezone(
            var("PUBLISH_TIMEZONE")
                .as_deref()
                .unwrap_or("Europe/London"),
        )?;
        let schedule_horizon_days = parse_u32(&var, "SCHEDULE_HORIZON_DAYS")?.unwrap_or(366);
        if schedule_horizon_days == 0 {
            return Err(Error::Config(
                "SCHEDULE_HORIZON_DAYS must be at least 1".to_string(),
            ));
        }
        let schedule_check_remote = var("SCHEDULE_CHECK_REMOTE")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);

        let http_timeout = Duration::from_secs(parse_u64(&var, "HTTP_TIMEOUT_SECS")?.unwrap_or(120));

        let audit_log_path = PathBuf::from(
            var("AUDIT_LOG_PATH").unwrap_or_else(|| "/tmp/article-bot-audit.log".to_string()),
        );
        let audit_log_json = var("AUDIT_LOG_JSON").map(|s| parse_bool(&s)).unwrap_or(false);

        let rate_limit_enabled = var("RATE_LIMIT_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let rate_limit_requests = parse_u32(&var, "RATE_LIMIT_REQUESTS")?.unwrap_or(5);
        if rate_limit_enabled && rate_limit_requests == 0 {
            return Err(Error::Config(
                "RATE_LIMIT_REQUESTS must be at least 1 (or set RATE_LIMIT_ENABLED=false)"
                    .to_string(),
            ));
        }
        let rate_limit_window =
            Duration::from_secs(parse_u64(&var, "RATE_LIMIT_WINDOW")?.unwrap_or(3600));

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            openai_api_key,
            openai_model,
            content_context,
            unsplash_access_key,
            wordpress_site_url,
            wordpress_oauth_token,
            wordpress_categories,
            wordpress_post_status,
            publish_time,
            publish_timezone,
            schedule_horizon_days,
            schedule_check_remote,
            http_timeout,
            audit_log_path,
            audit_log_json,
            rate_limit_enabled,
            rate_limit_requests,
            rate_limit_window,
        })
    }

    pub fn slot_scheduler(&self) -> SlotScheduler {
        SlotScheduler::new(self.publish_timezone, self.publish_time)
            .with_horizon(self.schedule_horizon_days)
    }
}

/// `HH:MM` or `HH:MM:SS`, 24-hour clock.
pub fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|_| Error::Config(format!("invalid PUBLISH_TIME {raw:?}, expected HH:MM")))
}

/// IANA zone name such as `Europe/London`.
pub fn parse_timezone(raw: &str) -> Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|e| Error::Config(format!("invalid PUBLISH_TIMEZONE {raw:?}: {e}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    var(key)
        .map(|s| {
            s.trim()
                .parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
        })
        .transpose()
}

fn parse_u32(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u32>> {
    var(key)
        .map(|s| {
            s.trim()
                .parse::<u32>()
                .map_err(|_| Error::Config(format!("{key} must be a non-negative integer")))
        })
        .transpose()
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv_u64(key: &str, v: Option<String>) -> Result<Vec<u64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<u64>()
                .map_err(|_| Error::Config(format!("{key} must list numeric ids, got {s:?}")))
        })
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
