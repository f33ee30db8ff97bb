use std::sync::Arc;

use anyhow::Context;

use apb_core::{batch::BatchProcessor, config::Config};
use apb_openai::OpenAiClient;
use apb_unsplash::UnsplashClient;
use apb_wordpress::{WordPressClient, WordPressConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config first so `.env` can set RUST_LOG.
    let cfg = Config::load();
    apb_core::logging::init("apb")?;
    let cfg = Arc::new(cfg.context("failed to load configuration")?);

    let generator = Arc::new(OpenAiClient::new(
        cfg.openai_api_key.clone(),
        cfg.openai_model.clone(),
        cfg.content_context.clone(),
        cfg.http_timeout,
    )?);
    let images = Arc::new(UnsplashClient::new(
        cfg.unsplash_access_key.clone(),
        cfg.http_timeout,
    )?);
    let publisher = Arc::new(WordPressClient::new(
        WordPressConfig {
            site_url: cfg.wordpress_site_url.clone(),
            oauth_token: cfg.wordpress_oauth_token.clone(),
            categories: cfg.wordpress_categories.clone(),
            post_status: cfg.wordpress_post_status.clone(),
        },
        cfg.http_timeout,
    )?);

    let processor = Arc::new(
        BatchProcessor::new(generator, images, publisher, cfg.slot_scheduler())
            .with_remote_schedule_check(cfg.schedule_check_remote),
    );

    tracing::info!(model = %cfg.openai_model, site = %cfg.wordpress_site_url, "starting article bot");
    apb_telegram::router::run_polling(cfg, processor)
        .await
        .context("telegram bot failed")?;

    Ok(())
}
