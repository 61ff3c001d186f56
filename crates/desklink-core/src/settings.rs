//! Keyed configuration state with an injected accessor.
//!
//! Tracker credentials, AI provider selection, and label policy all flow
//! through a `SettingsStore` handle instead of process-wide globals, so every
//! component can be wired against an in-memory store in tests.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::atomic_io::write_text_atomic;

/// Well-known setting keys consumed by the bridge components.
pub mod keys {
    pub const GITHUB_TOKEN: &str = "github.token";
    pub const GITHUB_API_BASE: &str = "github.api_base";
    pub const GITHUB_WEBHOOK_SECRET: &str = "github.webhook_secret";
    pub const GITHUB_DEFAULT_REPOSITORY: &str = "github.default_repository";
    pub const GITHUB_FALLBACK_ORGS: &str = "github.fallback_orgs";
    pub const ALLOWED_LABELS: &str = "labels.allowed";
    pub const AI_PROVIDER: &str = "ai.provider";
    pub const AI_API_KEY: &str = "ai.api_key";
    pub const AI_API_BASE: &str = "ai.api_base";
    pub const AI_MODEL: &str = "ai.model";
    pub const ENVIRONMENT: &str = "environment";
    pub const HELPDESK_BASE_URL: &str = "helpdesk.base_url";
}

/// Trait contract for `SettingsStore` behavior.
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn get_json(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get_json(key) {
            Some(Value::Bool(value)) => value,
            Some(Value::String(value)) => matches!(value.trim(), "1" | "true" | "yes"),
            _ => default,
        }
    }

    /// Returns the configured string-list setting, dropping blank entries.
    fn get_string_list(&self, key: &str) -> Vec<String> {
        let Some(value) = self.get_json(key) else {
            return Vec::new();
        };
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) if !text.trim().is_empty() => {
                        Some(text.trim().to_string())
                    }
                    _ => None,
                })
                .collect(),
            Value::String(text) => text
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Default, Clone)]
/// In-memory settings store used by tests and embedded callers.
pub struct MemorySettingsStore {
    values: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(pairs: &[(&str, Value)]) -> Self {
        let store = Self::default();
        for (key, value) in pairs {
            let _ = store.set(key, value.clone());
        }
        store
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        match values.get(key) {
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn get_json(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("settings mutex is poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// JSON-file-backed settings store; writes are atomic so concurrent readers
/// never observe a partial settings document.
pub struct FileSettingsStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, Value>>,
}

impl FileSettingsStore {
    pub fn load(path: PathBuf) -> Result<Self> {
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings file {}", path.display()))?;
            match serde_json::from_str::<BTreeMap<String, Value>>(&raw) {
                Ok(values) => values,
                Err(error) => {
                    tracing::warn!(
                        path = %path.display(),
                        %error,
                        "failed to parse settings file (starting fresh)"
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let mut payload =
            serde_json::to_string_pretty(values).context("failed to serialize settings")?;
        payload.push('\n');
        write_text_atomic(&self.path, &payload)
            .with_context(|| format!("failed to write settings file {}", self.path.display()))
    }
}

impl SettingsStore for FileSettingsStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().ok()?;
        match values.get(key) {
            Some(Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    fn get_json(&self, key: &str) -> Option<Value> {
        self.values.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow!("settings mutex is poisoned"))?;
        values.insert(key.to_string(), value);
        self.persist(&values)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{keys, FileSettingsStore, MemorySettingsStore, SettingsStore};

    #[test]
    fn unit_memory_store_round_trips_strings_and_lists() {
        let store = MemorySettingsStore::with_values(&[
            (keys::GITHUB_TOKEN, json!("ghp_test")),
            (keys::ALLOWED_LABELS, json!(["bug", " question ", ""])),
        ]);
        assert_eq!(store.get(keys::GITHUB_TOKEN).as_deref(), Some("ghp_test"));
        assert_eq!(
            store.get_string_list(keys::ALLOWED_LABELS),
            vec!["bug".to_string(), "question".to_string()]
        );
        assert!(store.get(keys::AI_API_KEY).is_none());
    }

    #[test]
    fn unit_bool_settings_accept_string_forms() {
        let store = MemorySettingsStore::new();
        store.set("flag", json!("yes")).expect("set");
        assert!(store.get_bool("flag", false));
        store.set("flag", json!(false)).expect("set");
        assert!(!store.get_bool("flag", true));
        assert!(store.get_bool("missing", true));
    }

    #[test]
    fn unit_string_list_accepts_comma_separated_form() {
        let store = MemorySettingsStore::new();
        store
            .set(keys::GITHUB_FALLBACK_ORGS, json!("acme, contoso ,"))
            .expect("set");
        assert_eq!(
            store.get_string_list(keys::GITHUB_FALLBACK_ORGS),
            vec!["acme".to_string(), "contoso".to_string()]
        );
    }

    #[test]
    fn functional_file_store_persists_across_reload() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("settings.json");
        {
            let store = FileSettingsStore::load(path.clone()).expect("load");
            store
                .set(keys::GITHUB_DEFAULT_REPOSITORY, json!("acme/widgets"))
                .expect("set");
        }
        let reloaded = FileSettingsStore::load(path).expect("reload");
        assert_eq!(
            reloaded.get(keys::GITHUB_DEFAULT_REPOSITORY).as_deref(),
            Some("acme/widgets")
        );
    }

    #[test]
    fn regression_corrupt_settings_file_starts_fresh() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let path = tempdir.path().join("settings.json");
        std::fs::write(&path, "{not json").expect("write");
        let store = FileSettingsStore::load(path).expect("load");
        assert!(store.get(keys::GITHUB_TOKEN).is_none());
    }
}
