use serde::{Deserialize, Serialize};
use serde_json::Value;

use desklink_core::BridgeError;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Parsed `owner/name` repository reference.
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parses an `owner/name` pair, rejecting malformed input before any
    /// remote call is made.
    pub fn parse(full_name: &str) -> Result<Self, BridgeError> {
        let trimmed = full_name.trim();
        let mut parts = trimmed.splitn(2, '/');
        let owner = parts.next().unwrap_or_default().trim();
        let name = parts.next().unwrap_or_default().trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(BridgeError::Validation(format!(
                "repository must be in owner/name form, got '{trimmed}'"
            )));
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Minimal repository projection used across DeskLink components.
pub struct Repository {
    pub id: u64,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default = "default_has_issues")]
    pub has_issues: bool,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_has_issues() -> bool {
    true
}

impl Repository {
    /// Projects a raw repository payload to the minimal shape, skipping rows
    /// without the fields the bridge relies on.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_u64()?;
        let full_name = value.get("full_name")?.as_str()?.to_string();
        Some(Self {
            id,
            full_name,
            private: value
                .get("private")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            has_issues: value
                .get("has_issues")
                .and_then(Value::as_bool)
                .unwrap_or(true),
            updated_at: value
                .get("updated_at")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Normalized search/lookup hit returned to the conversation view.
pub struct IssueSummary {
    pub id: u64,
    pub number: u64,
    pub title: String,
    pub state: String,
    pub labels: Vec<String>,
    pub assignees: Vec<String>,
    pub html_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl IssueSummary {
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = value.get("id")?.as_u64()?;
        let number = value.get("number")?.as_u64()?;
        Some(Self {
            id,
            number,
            title: value
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            state: value
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("open")
                .to_string(),
            labels: string_field_list(value.get("labels"), "name"),
            assignees: string_field_list(value.get("assignees"), "login"),
            html_url: value
                .get("html_url")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            created_at: value
                .get("created_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            updated_at: value
                .get("updated_at")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Collects `field` from every object in an array value; GitHub also emits
/// plain-string label arrays in some payloads, so both forms are accepted.
pub fn string_field_list(value: Option<&Value>, field: &str) -> Vec<String> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(text) => Some(text.clone()),
            Value::Object(_) => item
                .get(field)
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
            _ => None,
        })
        .collect()
}
