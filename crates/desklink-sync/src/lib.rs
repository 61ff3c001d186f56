//! Local cached-issue state and the webhook/refresh coordination layer.
//!
//! Owns the persistence collaborator (cached issues, conversation links,
//! label mappings), the TTL refresh gate that bounds remote call volume, and
//! the signature-verified webhook entry point.

pub mod refresh;
pub mod store;
pub mod webhook;

pub use refresh::{
    FileRefreshGate, MemoryRefreshGate, RefreshCoordinator, RefreshGate, RefreshOutcome,
    REFRESH_TTL_SECONDS,
};
pub use store::{BridgeStateStore, CachedIssue, IssueLink, IssueState};
pub use webhook::{verify_signature, ConversationNotifier, WebhookCoordinator, WebhookOutcome};
