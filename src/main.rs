use nft_metadata_host::config::Config;
use nft_metadata_host::server::{AppState, app};
use nft_metadata_host::store::MetadataStore;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cfg = Config::load_or_default("config.yaml")
        .context("config.yaml の読み込みに失敗しました")?;
    cfg.apply_env_overrides();

    let store = MetadataStore::from_config(&cfg.store)
        .context("メタデータストアの初期化に失敗しました")?;
    tracing::info!(backend = cfg.store.backend.as_str(), "metadata store ready");

    let state = AppState {
        store: Arc::new(store),
        fallback_image: cfg.metadata.fallback_image.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("{} にバインドできませんでした", cfg.bind_addr))?;
    tracing::info!(addr = %cfg.bind_addr, "nft-metadata-host listening");

    axum::serve(listener, app(state))
        .await
        .context("HTTPサーバーの実行に失敗しました")?;

    Ok(())
}
