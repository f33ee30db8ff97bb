use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::Mutex;

use apb_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use apb_core::{
    batch::BatchProcessor, config::Config, messaging::port::MessagingPort, security::RateLimiter,
    utils::AuditLogger,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub processor: Arc<BatchProcessor>,
    pub messenger: Arc<dyn MessagingPort>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    /// Held for the whole of a batch so concurrent batches never race for a date.
    pub publish_lock: Arc<Mutex<()>>,
    pub audit: Arc<AuditLogger>,
}

pub async fn run_polling(cfg: Arc<Config>, processor: Arc<BatchProcessor>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(username = %me.username(), "bot started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    let scheduler = processor.scheduler();
    tracing::info!(
        allowed_users = cfg.telegram_allowed_users.len(),
        publish_time = %scheduler.publish_time().format("%H:%M"),
        timezone = %scheduler.timezone(),
        horizon_days = scheduler.horizon_days(),
        audit_log = %cfg.audit_log_path.display(),
        "configuration loaded"
    );

    // Progress edits for long batches go through the throttle; the Telegram
    // adapter still retries once on RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        processor,
        messenger,
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))),
        publish_lock: Arc::new(Mutex::new(())),
        audit: Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        )),
    });

    let handler =
        dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    tracing::info!("dispatcher stopped");
    Ok(())
}
