/// Core error type for the article bot.
///
/// Adapter crates map their HTTP/JSON failures into this type so the batch
/// processor can turn any failure into a per-topic user-facing message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("unexpected response from {service}: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },

    #[error("message contains no topics")]
    NoTopics,

    #[error("no free publish slot within the next {horizon_days} days")]
    SlotsExhausted { horizon_days: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
