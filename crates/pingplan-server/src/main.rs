mod config;
mod extract;
mod handlers;
mod intent;
mod models;
mod store;
mod templates;
mod webhook;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::extract::{Extractor, GeminiExtractor};
use crate::store::{JsonFileStore, MemoryStore, TaskStore};
use crate::webhook::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::parse();

    let store: Arc<dyn TaskStore> = if config.in_memory {
        warn!("PINGPLAN_IN_MEMORY set; tasks will be lost on restart");
        Arc::new(MemoryStore::default())
    } else {
        let store = JsonFileStore::new(config.effective_tasks_file());
        let doc = store.load_all().await;
        info!(
            path = %store.path().display(),
            users = doc.user_count(),
            "task document loaded"
        );
        Arc::new(store)
    };

    let api_key = config.gemini_api_key();
    if api_key.is_none() {
        warn!("GEMINI_API_KEY not set; free-text messages will get the fallback reply");
    }

    let http = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(config.http_timeout())
        .build()
        .context("build reqwest client")?;

    let extractor: Arc<dyn Extractor> = Arc::new(GeminiExtractor::new(
        http,
        config.gemini_base_url.clone(),
        config.gemini_model.clone(),
        api_key,
    ));

    let app = webhook::router(AppState::new(store, extractor));

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}
