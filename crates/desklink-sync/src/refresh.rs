//! TTL refresh gate and the throttled bulk-refresh coordinator.

use std::{
    collections::BTreeMap,
    io::Write,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use desklink_core::current_unix_timestamp;
use desklink_github::{GithubApiClient, RepoRef};

use crate::store::{BridgeStateStore, CachedIssue};

/// An issue refreshed within this window is served from cache.
pub const REFRESH_TTL_SECONDS: u64 = 300;

/// Trait contract for `RefreshGate` behavior.
///
/// `try_acquire` is an atomic check-and-set: exactly one of any number of
/// concurrent callers inside the TTL window receives `true`.
pub trait RefreshGate: Send + Sync {
    fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<bool>;
}

#[derive(Default)]
/// In-process gate for tests and embedded use.
pub struct MemoryRefreshGate {
    entries: Mutex<BTreeMap<String, u64>>,
}

impl MemoryRefreshGate {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RefreshGate for MemoryRefreshGate {
    fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let now = current_unix_timestamp();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("refresh gate mutex is poisoned"))?;
        Ok(acquire(&mut entries, key, now, ttl_seconds))
    }
}

/// File-backed gate: every key owns a marker file in a shared directory,
/// created with `create_new` so the check-and-set itself is atomic across
/// independent worker processes sharing the state directory.
pub struct FileRefreshGate {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileRefreshGate {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            lock: Mutex::new(()),
        }
    }

    fn marker_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        let mut hex = String::with_capacity(16);
        for byte in &digest[..8] {
            hex.push_str(&format!("{byte:02x}"));
        }
        // The slug keeps markers inspectable; the digest keeps them unique.
        let slug: String = key
            .chars()
            .map(|ch| {
                if ch.is_ascii_alphanumeric() {
                    ch.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        self.dir.join(format!("{slug}-{hex}.refreshed"))
    }
}

/// Reads a marker's refresh timestamp, falling back to its mtime when the
/// content is not readable yet. A marker another process created but has
/// not finished writing still counts from its creation time.
fn marker_timestamp(marker: &Path) -> Option<u64> {
    if let Some(stamp) = std::fs::read_to_string(marker)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
    {
        return Some(stamp);
    }
    let modified = std::fs::metadata(marker).ok()?.modified().ok()?;
    modified
        .duration_since(std::time::UNIX_EPOCH)
        .ok()
        .map(|elapsed| elapsed.as_secs())
}

impl RefreshGate for FileRefreshGate {
    fn try_acquire(&self, key: &str, ttl_seconds: u64) -> Result<bool> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("refresh gate mutex is poisoned"))?;
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let marker = self.marker_path(key);
        let now = current_unix_timestamp();

        // Two attempts: the first may find an expired marker, remove it, and
        // race other processes for the re-create. Whoever wins `create_new`
        // owns the refresh.
        for _ in 0..2 {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&marker)
            {
                Ok(mut file) => {
                    file.write_all(format!("{now}\n").as_bytes())
                        .with_context(|| format!("failed to write {}", marker.display()))?;
                    return Ok(true);
                }
                Err(error) if error.kind() == std::io::ErrorKind::AlreadyExists => {
                    match marker_timestamp(&marker) {
                        Some(refreshed) if now.saturating_sub(refreshed) < ttl_seconds => {
                            return Ok(false);
                        }
                        // Expired, or removed between the failed create and
                        // the read. Clear it and retry the create.
                        _ => {
                            let _ = std::fs::remove_file(&marker);
                        }
                    }
                }
                Err(error) => {
                    return Err(error).with_context(|| {
                        format!("failed to create refresh marker {}", marker.display())
                    });
                }
            }
        }
        Ok(false)
    }
}

fn acquire(entries: &mut BTreeMap<String, u64>, key: &str, now: u64, ttl_seconds: u64) -> bool {
    entries.retain(|_, refreshed| now.saturating_sub(*refreshed) < ttl_seconds);
    if entries.contains_key(key) {
        return false;
    }
    entries.insert(key.to_string(), now);
    true
}

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
/// Public struct `RefreshOutcome` used across DeskLink components.
pub struct RefreshOutcome {
    pub issues: Vec<CachedIssue>,
    pub refreshed: usize,
    pub served_from_cache: usize,
    pub failures: usize,
}

/// Bulk refresh for a conversation's linked issues; the gate bounds remote
/// call volume under repeated UI refreshes, and one issue's failure never
/// blocks the rest.
pub struct RefreshCoordinator<'a> {
    client: &'a GithubApiClient,
    store: &'a BridgeStateStore,
    gate: &'a dyn RefreshGate,
}

impl<'a> RefreshCoordinator<'a> {
    pub fn new(
        client: &'a GithubApiClient,
        store: &'a BridgeStateStore,
        gate: &'a dyn RefreshGate,
    ) -> Self {
        Self { client, store, gate }
    }

    pub async fn refresh_conversation(&self, conversation_id: u64) -> RefreshOutcome {
        let mut outcome = RefreshOutcome::default();
        for link in self.store.links_for_conversation(conversation_id) {
            let key = CachedIssue::key(&link.repository, link.number);
            let acquired = match self.gate.try_acquire(&key, REFRESH_TTL_SECONDS) {
                Ok(acquired) => acquired,
                Err(error) => {
                    // A broken gate must not block refreshes entirely.
                    tracing::warn!(%error, key, "refresh gate unavailable, refreshing anyway");
                    true
                }
            };
            if !acquired {
                outcome.served_from_cache += 1;
                if let Some(cached) = self.store.issue(&link.repository, link.number) {
                    outcome.issues.push(cached);
                }
                continue;
            }

            match self.refresh_issue(&link.repository, link.number).await {
                Ok(issue) => {
                    outcome.refreshed += 1;
                    outcome.issues.push(issue);
                }
                Err(error) => {
                    tracing::warn!(key, %error, "issue refresh failed, serving stale copy");
                    outcome.failures += 1;
                    if let Some(cached) = self.store.issue(&link.repository, link.number) {
                        outcome.issues.push(cached);
                    }
                }
            }
        }
        outcome
    }

    async fn refresh_issue(&self, repository: &str, number: u64) -> Result<CachedIssue> {
        let repo = RepoRef::parse(repository)?;
        let payload = self.client.get_issue(&repo, number).await?;
        self.store.upsert_issue(repository, &payload)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use desklink_github::GithubApiClient;

    use crate::store::BridgeStateStore;

    use super::{
        FileRefreshGate, MemoryRefreshGate, RefreshCoordinator, RefreshGate, REFRESH_TTL_SECONDS,
    };

    fn issue_payload(number: u64, state: &str) -> serde_json::Value {
        json!({
            "number": number,
            "title": "Crash on save",
            "body": "steps",
            "state": state,
            "labels": [],
            "assignees": [],
            "user": {"login": "dana"},
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-02T00:00:00Z",
            "html_url": "https://github.com/acme/widgets/issues/42",
        })
    }

    #[test]
    fn unit_memory_gate_denies_second_acquire_within_ttl() {
        let gate = MemoryRefreshGate::new();
        assert!(gate.try_acquire("acme/widgets#42", REFRESH_TTL_SECONDS).expect("first"));
        assert!(!gate.try_acquire("acme/widgets#42", REFRESH_TTL_SECONDS).expect("second"));
        assert!(gate.try_acquire("acme/widgets#43", REFRESH_TTL_SECONDS).expect("other key"));
    }

    #[test]
    fn functional_file_gate_is_shared_across_instances() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let dir = tempdir.path().join("refresh-cache");
        let first = FileRefreshGate::new(dir.clone());
        let second = FileRefreshGate::new(dir);

        assert!(first.try_acquire("acme/widgets#42", REFRESH_TTL_SECONDS).expect("first"));
        assert!(!second.try_acquire("acme/widgets#42", REFRESH_TTL_SECONDS).expect("second"));
    }

    #[test]
    fn unit_gate_expires_entries_after_ttl() {
        let gate = MemoryRefreshGate::new();
        assert!(gate.try_acquire("key", 0).expect("first"));
        // ttl of zero expires immediately
        assert!(gate.try_acquire("key", 0).expect("second"));
    }

    #[test]
    fn unit_file_gate_reacquires_after_expiry() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let gate = FileRefreshGate::new(tempdir.path().join("refresh-cache"));
        assert!(gate.try_acquire("acme/widgets#42", 0).expect("first"));
        // ttl of zero expires the marker immediately
        assert!(gate.try_acquire("acme/widgets#42", 0).expect("second"));
    }

    #[test]
    fn regression_concurrent_gate_instances_grant_exactly_one_acquire() {
        use std::sync::{Arc, Barrier};

        let tempdir = tempfile::tempdir().expect("tempdir");
        let dir = tempdir.path().join("refresh-cache");
        for round in 0..50 {
            let key = format!("acme/widgets#{round}");
            let barrier = Arc::new(Barrier::new(8));
            let mut handles = Vec::new();
            for _ in 0..8 {
                let dir = dir.clone();
                let key = key.clone();
                let barrier = Arc::clone(&barrier);
                // Each thread gets its own gate instance so nothing is
                // serialized by a shared in-process mutex, as with separate
                // worker processes on one state directory.
                handles.push(std::thread::spawn(move || {
                    let gate = FileRefreshGate::new(dir);
                    barrier.wait();
                    gate.try_acquire(&key, REFRESH_TTL_SECONDS).expect("acquire")
                }));
            }
            let granted = handles
                .into_iter()
                .map(|handle| handle.join().expect("join"))
                .filter(|acquired| *acquired)
                .count();
            assert_eq!(granted, 1, "round {round} granted {granted} refreshes");
        }
    }

    #[tokio::test]
    async fn integration_two_refreshes_within_ttl_make_one_remote_call() {
        let server = MockServer::start();
        let remote = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(200).json_body(issue_payload(42, "open"));
        });

        let client =
            GithubApiClient::new(server.base_url(), "token".to_string(), false).expect("client");
        let store = BridgeStateStore::in_memory();
        store
            .upsert_issue("acme/widgets", &issue_payload(42, "open"))
            .expect("seed");
        store.link("acme/widgets", 42, 7).expect("link");
        let gate = MemoryRefreshGate::new();
        let coordinator = RefreshCoordinator::new(&client, &store, &gate);

        let first = coordinator.refresh_conversation(7).await;
        assert_eq!(first.refreshed, 1);
        let second = coordinator.refresh_conversation(7).await;
        assert_eq!(second.refreshed, 0);
        assert_eq!(second.served_from_cache, 1);
        assert_eq!(second.issues.len(), 1);
        remote.assert_hits(1);
    }

    #[tokio::test]
    async fn regression_one_failing_issue_does_not_block_the_rest() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(500).json_body(json!({"message": "boom"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/43");
            then.status(200).json_body(issue_payload(43, "closed"));
        });

        let client =
            GithubApiClient::new(server.base_url(), "token".to_string(), false).expect("client");
        let store = BridgeStateStore::in_memory();
        store
            .upsert_issue("acme/widgets", &issue_payload(42, "open"))
            .expect("seed 42");
        store
            .upsert_issue("acme/widgets", &issue_payload(43, "open"))
            .expect("seed 43");
        store.link("acme/widgets", 42, 7).expect("link 42");
        store.link("acme/widgets", 43, 7).expect("link 43");
        let gate = MemoryRefreshGate::new();
        let coordinator = RefreshCoordinator::new(&client, &store, &gate);

        let outcome = coordinator.refresh_conversation(7).await;
        assert_eq!(outcome.failures, 1);
        assert_eq!(outcome.refreshed, 1);
        // The stale copy of the failing issue is still returned.
        assert_eq!(outcome.issues.len(), 2);
    }
}
