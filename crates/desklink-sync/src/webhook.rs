//! Signature-verified webhook entry and event routing.

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

use desklink_core::BridgeError;

use crate::store::BridgeStateStore;

/// Trait contract for `ConversationNotifier` behavior.
///
/// The helpdesk collaborator: posts system notes into conversations. The
/// coordinator never changes conversation status through it; status stays a
/// human decision.
pub trait ConversationNotifier: Send + Sync {
    fn post_system_note(&self, conversation_id: u64, note: &str) -> Result<()>;
}

/// Verifies a `sha256=<hex>` HMAC-SHA256 signature over the raw payload.
///
/// No configured secret means the check is skipped; with a secret, a missing,
/// malformed, or mismatching signature is rejected before any processing.
pub fn verify_signature(
    secret: Option<&str>,
    payload: &[u8],
    signature_header: Option<&str>,
) -> Result<(), BridgeError> {
    let Some(secret) = secret.map(str::trim).filter(|value| !value.is_empty()) else {
        return Ok(());
    };
    let signature = signature_header
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            BridgeError::Unauthorized("webhook signature header is missing".to_string())
        })?;
    let Some(digest_hex) = signature.strip_prefix("sha256=") else {
        return Err(BridgeError::Unauthorized(
            "webhook signature must use sha256=<hex> format".to_string(),
        ));
    };
    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| {
        BridgeError::Unauthorized("failed to initialize webhook HMAC verifier".to_string())
    })?;
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| BridgeError::Unauthorized("webhook signature verification failed".to_string()))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, BridgeError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() % 2 != 0 {
        return Err(BridgeError::Unauthorized(
            "webhook signature digest is malformed".to_string(),
        ));
    }
    let raw = trimmed.as_bytes();
    let mut bytes = Vec::with_capacity(raw.len() / 2);
    let mut index = 0_usize;
    while index < raw.len() {
        let hex = std::str::from_utf8(&raw[index..index + 2]).map_err(|_| {
            BridgeError::Unauthorized("invalid utf-8 in signature digest".to_string())
        })?;
        let byte = u8::from_str_radix(hex, 16).map_err(|_| {
            BridgeError::Unauthorized(format!("invalid hex byte '{hex}' in signature digest"))
        })?;
        bytes.push(byte);
        index = index.saturating_add(2);
    }
    Ok(bytes)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Enumerates supported `WebhookOutcome` values.
pub enum WebhookOutcome {
    /// Event updated the cache; `notes_posted` conversations were notified.
    Processed {
        action: String,
        repository: String,
        number: u64,
        notes_posted: usize,
    },
    /// Recognized-but-inert or unrecognized event types are acknowledged,
    /// never treated as errors.
    Acknowledged { event: String },
}

/// Routes verified webhook events into local cache mutations and
/// conversation notes.
pub struct WebhookCoordinator<'a> {
    store: &'a BridgeStateStore,
    notifier: &'a dyn ConversationNotifier,
}

impl<'a> WebhookCoordinator<'a> {
    pub fn new(store: &'a BridgeStateStore, notifier: &'a dyn ConversationNotifier) -> Self {
        Self { store, notifier }
    }

    pub fn handle_event(&self, event_type: &str, payload: &Value) -> Result<WebhookOutcome> {
        match event_type {
            "issues" | "issue_comment" => self.handle_issue_event(event_type, payload),
            other => Ok(WebhookOutcome::Acknowledged {
                event: other.to_string(),
            }),
        }
    }

    fn handle_issue_event(&self, event_type: &str, payload: &Value) -> Result<WebhookOutcome> {
        let repository = payload
            .get("repository")
            .and_then(|repo| repo.get("full_name"))
            .and_then(Value::as_str)
            .context("webhook payload is missing repository.full_name")?
            .to_string();
        let issue_payload = payload
            .get("issue")
            .context("webhook payload is missing the issue object")?;
        let action = payload
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("updated")
            .to_string();

        let issue = self.store.upsert_issue(&repository, issue_payload)?;
        let note = match event_type {
            "issue_comment" => format!(
                "GitHub issue #{} ({}) received a new comment: {}",
                issue.number, repository, issue.html_url
            ),
            _ => format!(
                "GitHub issue #{} ({}) was {}: {} (state: {})",
                issue.number,
                repository,
                action,
                issue.html_url,
                issue.state.as_str()
            ),
        };

        let mut notes_posted = 0_usize;
        for conversation_id in self.store.conversations_for_issue(&repository, issue.number) {
            match self.notifier.post_system_note(conversation_id, &note) {
                Ok(()) => notes_posted += 1,
                Err(error) => {
                    tracing::warn!(conversation_id, %error, "failed to post system note");
                }
            }
        }

        Ok(WebhookOutcome::Processed {
            action,
            repository,
            number: issue.number,
            notes_posted,
        })
    }
}
