//! State-file persistence for cached issues, conversation links, and label
//! mappings.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
    sync::Mutex,
};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use desklink_core::{current_unix_timestamp, write_text_atomic};
use desklink_github::types::string_field_list;
use desklink_pipeline::MappingEntry;

const STATE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `IssueState` values.
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("closed") {
            Self::Closed
        } else {
            Self::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Locally cached tracker issue row, only ever written from a remote payload.
pub struct CachedIssue {
    pub repository: String,
    pub number: u64,
    pub title: String,
    pub body: String,
    pub state: IssueState,
    pub labels: BTreeSet<String>,
    pub assignees: BTreeSet<String>,
    pub author: String,
    pub created_at: String,
    pub updated_at: String,
    pub html_url: String,
    pub synced_unix: u64,
}

impl CachedIssue {
    pub fn key(repository: &str, number: u64) -> String {
        format!("{repository}#{number}")
    }

    fn from_remote(repository: &str, payload: &Value, now_unix: u64) -> Result<Self> {
        let number = payload
            .get("number")
            .and_then(Value::as_u64)
            .ok_or_else(|| anyhow!("issue payload is missing a number"))?;
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Ok(Self {
            repository: repository.to_string(),
            number,
            title: field("title"),
            body: field("body"),
            state: IssueState::parse(&field("state")),
            labels: string_field_list(payload.get("labels"), "name")
                .into_iter()
                .collect(),
            assignees: string_field_list(payload.get("assignees"), "login")
                .into_iter()
                .collect(),
            author: payload
                .get("user")
                .and_then(|user| user.get("login"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: field("created_at"),
            updated_at: field("updated_at"),
            html_url: field("html_url"),
            synced_unix: now_unix,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
/// Join row between a cached issue and a helpdesk conversation.
pub struct IssueLink {
    pub repository: String,
    pub number: u64,
    pub conversation_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BridgeState {
    schema_version: u32,
    #[serde(default)]
    issues: BTreeMap<String, CachedIssue>,
    #[serde(default)]
    links: BTreeSet<IssueLink>,
    #[serde(default)]
    mappings: Vec<MappingEntry>,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            schema_version: STATE_SCHEMA_VERSION,
            issues: BTreeMap::new(),
            links: BTreeSet::new(),
            mappings: Vec::new(),
        }
    }
}

/// JSON-state-file store; every mutation persists atomically before
/// returning, so a crash never loses acknowledged writes.
pub struct BridgeStateStore {
    path: Option<PathBuf>,
    state: Mutex<BridgeState>,
}

impl BridgeStateStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read state file {}", path.display()))?;
            match serde_json::from_str::<BridgeState>(&raw) {
                Ok(state) if state.schema_version == STATE_SCHEMA_VERSION => state,
                Ok(state) => {
                    tracing::warn!(
                        expected = STATE_SCHEMA_VERSION,
                        found = state.schema_version,
                        "unsupported bridge state schema (starting fresh)"
                    );
                    BridgeState::default()
                }
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "failed to parse bridge state file (starting fresh)"
                    );
                    BridgeState::default()
                }
            }
        } else {
            BridgeState::default()
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(BridgeState::default()),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BridgeState) -> Result<T>) -> Result<T> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("bridge state mutex is poisoned"))?;
        let result = f(&mut state)?;
        if let Some(path) = &self.path {
            let mut payload = serde_json::to_string_pretty(&*state)
                .context("failed to serialize bridge state")?;
            payload.push('\n');
            write_text_atomic(path, &payload)
                .with_context(|| format!("failed to write state file {}", path.display()))?;
        }
        Ok(result)
    }

    fn read_state<T>(&self, f: impl FnOnce(&BridgeState) -> T) -> T {
        match self.state.lock() {
            Ok(state) => f(&state),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Create-or-update the cached row from a raw remote payload
    /// (last-write-wins on every mutable field).
    pub fn upsert_issue(&self, repository: &str, payload: &Value) -> Result<CachedIssue> {
        let issue = CachedIssue::from_remote(repository, payload, current_unix_timestamp())?;
        self.with_state(|state| {
            state
                .issues
                .insert(CachedIssue::key(repository, issue.number), issue.clone());
            Ok(issue)
        })
    }

    pub fn issue(&self, repository: &str, number: u64) -> Option<CachedIssue> {
        self.read_state(|state| state.issues.get(&CachedIssue::key(repository, number)).cloned())
    }

    /// Deletes a cached issue and cascades its conversation links.
    pub fn delete_issue(&self, repository: &str, number: u64) -> Result<bool> {
        self.with_state(|state| {
            let removed = state
                .issues
                .remove(&CachedIssue::key(repository, number))
                .is_some();
            state
                .links
                .retain(|link| !(link.repository == repository && link.number == number));
            Ok(removed)
        })
    }

    /// Links a cached issue to a conversation; the pair is unique and the
    /// issue must already be cached.
    pub fn link(&self, repository: &str, number: u64, conversation_id: u64) -> Result<bool> {
        self.with_state(|state| {
            if !state
                .issues
                .contains_key(&CachedIssue::key(repository, number))
            {
                bail!("issue {repository}#{number} is not cached");
            }
            Ok(state.links.insert(IssueLink {
                repository: repository.to_string(),
                number,
                conversation_id,
            }))
        })
    }

    pub fn unlink(&self, repository: &str, number: u64, conversation_id: u64) -> Result<bool> {
        self.with_state(|state| {
            Ok(state.links.remove(&IssueLink {
                repository: repository.to_string(),
                number,
                conversation_id,
            }))
        })
    }

    pub fn links_for_conversation(&self, conversation_id: u64) -> Vec<IssueLink> {
        self.read_state(|state| {
            state
                .links
                .iter()
                .filter(|link| link.conversation_id == conversation_id)
                .cloned()
                .collect()
        })
    }

    pub fn conversations_for_issue(&self, repository: &str, number: u64) -> Vec<u64> {
        self.read_state(|state| {
            state
                .links
                .iter()
                .filter(|link| link.repository == repository && link.number == number)
                .map(|link| link.conversation_id)
                .collect()
        })
    }

    /// Saves a mapping, replacing any existing `(tag, repository)` row.
    pub fn save_mapping(&self, entry: MappingEntry) -> Result<()> {
        if !(0.0..=1.0).contains(&entry.confidence_threshold) {
            bail!(
                "confidence threshold {} is outside 0.00-1.00",
                entry.confidence_threshold
            );
        }
        self.with_state(|state| {
            state.mappings.retain(|existing| {
                !(existing.helpdesk_tag.eq_ignore_ascii_case(&entry.helpdesk_tag)
                    && existing.repository == entry.repository)
            });
            state.mappings.push(entry);
            Ok(())
        })
    }

    pub fn mapping(&self, tag: &str, repository: &str) -> Option<MappingEntry> {
        self.read_state(|state| {
            state
                .mappings
                .iter()
                .find(|mapping| {
                    mapping.helpdesk_tag.eq_ignore_ascii_case(tag)
                        && mapping.repository == repository
                })
                .cloned()
        })
    }

    pub fn mappings_for_repository(&self, repository: &str) -> Vec<MappingEntry> {
        self.read_state(|state| {
            state
                .mappings
                .iter()
                .filter(|mapping| mapping.repository == repository)
                .cloned()
                .collect()
        })
    }
}
