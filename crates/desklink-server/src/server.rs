//! Server bootstrap: state directory layout, listener bind, graceful
//! shutdown.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::net::TcpListener;

use desklink_core::{keys, FileSettingsStore, SettingsStore};
use desklink_sync::{BridgeStateStore, FileRefreshGate};

use crate::routes::build_router;
use crate::state::{AppState, LoggingNotifier};

const SETTINGS_FILE: &str = "settings.json";
const STATE_FILE: &str = "bridge-state.json";
const REFRESH_CACHE_DIR: &str = "refresh-cache";

#[derive(Debug, Clone)]
/// Public struct `ServerConfig` used across DeskLink components.
pub struct ServerConfig {
    pub bind: String,
    pub state_dir: PathBuf,
    pub github_token: Option<String>,
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    std::fs::create_dir_all(&config.state_dir).with_context(|| {
        format!(
            "failed to create state directory '{}'",
            config.state_dir.display()
        )
    })?;

    let settings = FileSettingsStore::load(config.state_dir.join(SETTINGS_FILE))?;
    if let Some(token) = config
        .github_token
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        settings.set(keys::GITHUB_TOKEN, Value::String(token))?;
    }
    let store = BridgeStateStore::load(config.state_dir.join(STATE_FILE))?;
    let gate = FileRefreshGate::new(config.state_dir.join(REFRESH_CACHE_DIR));
    let state = AppState {
        settings: Arc::new(settings),
        store: Arc::new(store),
        gate: Arc::new(gate),
        notifier: Arc::new(LoggingNotifier),
    };

    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind desklink server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound server address")?;
    tracing::info!(
        addr = %local_addr,
        state_dir = %config.state_dir.display(),
        "desklink server listening"
    );

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("desklink server exited unexpectedly")
}
