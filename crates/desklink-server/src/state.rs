//! Shared request state and collaborator wiring.

use std::sync::Arc;

use anyhow::Result;

use desklink_ai::{AnthropicClient, AnthropicConfig, LlmClient, OpenAiClient, OpenAiConfig};
use desklink_core::{keys, BridgeError, SettingsStore};
use desklink_github::GithubApiClient;
use desklink_sync::{BridgeStateStore, ConversationNotifier, RefreshGate};

#[derive(Clone)]
/// Public struct `AppState` used across DeskLink components.
pub struct AppState {
    pub settings: Arc<dyn SettingsStore>,
    pub store: Arc<BridgeStateStore>,
    pub gate: Arc<dyn RefreshGate>,
    pub notifier: Arc<dyn ConversationNotifier>,
}

impl AppState {
    /// Builds the tracker client from the current settings; every request
    /// rebuilds it so a token rotated through `/api/settings` takes effect
    /// without a restart.
    pub fn github_client(&self) -> Result<GithubApiClient, BridgeError> {
        GithubApiClient::from_settings(self.settings.as_ref(), None)
    }

    /// Returns the configured language-model client, or `None` when no
    /// provider is usable (classification and content generation then run
    /// their deterministic fallbacks).
    pub fn llm_client(&self) -> Option<Box<dyn LlmClient>> {
        let api_key = self
            .settings
            .get(keys::AI_API_KEY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;
        let api_base = self
            .settings
            .get(keys::AI_API_BASE)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let provider = self.settings.get_or(keys::AI_PROVIDER, "openai");
        match provider.as_str() {
            "anthropic" => {
                let mut config = AnthropicConfig {
                    api_key,
                    ..AnthropicConfig::default()
                };
                if let Some(base) = api_base {
                    config.api_base = base;
                }
                match AnthropicClient::new(config) {
                    Ok(client) => Some(Box::new(client)),
                    Err(error) => {
                        tracing::warn!(%error, "failed to build anthropic client");
                        None
                    }
                }
            }
            "openai" => {
                let mut config = OpenAiConfig {
                    api_key,
                    ..OpenAiConfig::default()
                };
                if let Some(base) = api_base {
                    config.api_base = base;
                }
                match OpenAiClient::new(config) {
                    Ok(client) => Some(Box::new(client)),
                    Err(error) => {
                        tracing::warn!(%error, "failed to build openai client");
                        None
                    }
                }
            }
            other => {
                tracing::warn!(provider = other, "unknown ai provider, disabling inference");
                None
            }
        }
    }
}

/// Stand-in helpdesk collaborator: system notes are emitted to the log
/// stream instead of a live helpdesk API.
pub struct LoggingNotifier;

impl ConversationNotifier for LoggingNotifier {
    fn post_system_note(&self, conversation_id: u64, note: &str) -> Result<()> {
        tracing::info!(conversation_id, note, "helpdesk system note");
        Ok(())
    }
}
