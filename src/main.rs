use std::path::PathBuf;
use std::sync::Arc;

use chat_relay::config::AppConfig;
use chat_relay::gateway::{serve, GatewayState};
use chat_relay::store::MemStore;
use chat_relay::upstream::UpstreamClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::var("CHAT_RELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let cfg = AppConfig::load(&config_path)?;

    let state = GatewayState {
        cfg: Arc::new(cfg),
        store: MemStore::new(),
        upstream: UpstreamClient::new(),
    };
    serve(state).await
}
