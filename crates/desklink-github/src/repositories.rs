use std::collections::HashSet;

use reqwest::Method;
use serde_json::Value;

use desklink_core::BridgeError;

use crate::api_client::GithubApiClient;
use crate::types::Repository;

/// Merges repositories visible under personal, organization, and installation
/// scopes into one deduplicated, sorted listing.
///
/// Any single source may legitimately fail for a given token type (a
/// fine-grained token cannot enumerate orgs, a classic token cannot call
/// `/installation/repositories`); the aggregate call only fails when every
/// source does.
pub struct RepositoryAggregator<'a> {
    client: &'a GithubApiClient,
    fallback_orgs: Vec<String>,
}

impl<'a> RepositoryAggregator<'a> {
    pub fn new(client: &'a GithubApiClient, fallback_orgs: Vec<String>) -> Self {
        Self {
            client,
            fallback_orgs,
        }
    }

    pub async fn list_repositories(&self) -> Result<Vec<Repository>, BridgeError> {
        let mut merged: Vec<Repository> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut source_failures: Vec<String> = Vec::new();
        let mut sources_succeeded = 0_usize;

        // Merge order is user, then org, then installation; the first
        // occurrence of a full_name wins.
        for (source, outcome) in [
            ("user", self.user_repositories().await),
            ("organization", self.organization_repositories().await),
            ("installation", self.installation_repositories().await),
        ] {
            match outcome {
                Ok(rows) => {
                    sources_succeeded += 1;
                    for row in rows {
                        if let Some(repository) = Repository::from_value(&row) {
                            if seen.insert(repository.full_name.clone()) {
                                merged.push(repository);
                            }
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(source, %error, "repository source unavailable");
                    source_failures.push(format!("{source}: {error}"));
                }
            }
        }

        if sources_succeeded == 0 {
            return Err(BridgeError::Transport(format!(
                "all repository sources failed: {}",
                source_failures.join("; ")
            )));
        }

        merged.sort_by(|left, right| left.full_name.cmp(&right.full_name));
        Ok(merged)
    }

    async fn user_repositories(&self) -> Result<Vec<Value>, BridgeError> {
        self.client
            .get_paged(
                "/user/repos",
                &[
                    ("affiliation", "owner,collaborator"),
                    ("sort", "full_name"),
                    ("direction", "asc"),
                ],
                None,
            )
            .await
    }

    async fn organization_repositories(&self) -> Result<Vec<Value>, BridgeError> {
        let orgs = match self.organization_logins().await {
            Ok(orgs) => orgs,
            Err(error) if error.is_recoverable() && !self.fallback_orgs.is_empty() => {
                tracing::warn!(%error, "org enumeration unavailable, using configured fallback list");
                self.fallback_orgs.clone()
            }
            Err(error) => return Err(error),
        };

        let mut rows = Vec::new();
        let mut org_failures = 0_usize;
        let org_count = orgs.len();
        for org in &orgs {
            match self
                .client
                .get_paged(&format!("/orgs/{org}/repos"), &[("type", "all")], None)
                .await
            {
                Ok(chunk) => rows.extend(chunk),
                Err(error) => {
                    tracing::warn!(org, %error, "skipping unreadable organization");
                    org_failures += 1;
                }
            }
        }
        if org_count > 0 && org_failures == org_count {
            return Err(BridgeError::Transport(format!(
                "all {org_count} organizations were unreadable"
            )));
        }
        Ok(rows)
    }

    async fn organization_logins(&self) -> Result<Vec<String>, BridgeError> {
        let rows = self.client.get_paged("/user/orgs", &[], None).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("login").and_then(Value::as_str))
            .map(ToOwned::to_owned)
            .collect())
    }

    async fn installation_repositories(&self) -> Result<Vec<Value>, BridgeError> {
        self.client
            .get_paged("/installation/repositories", &[], Some("repositories"))
            .await
    }
}
