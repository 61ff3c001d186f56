//! Thin issue and label operations over the token-scoped client.

use reqwest::Method;
use serde_json::{json, Value};

use desklink_core::BridgeError;

use crate::api_client::GithubApiClient;
use crate::types::RepoRef;

impl GithubApiClient {
    /// Creates an issue and returns the raw tracker payload (the sync layer
    /// upserts the cached row from it).
    pub async fn create_issue(
        &self,
        repo: &RepoRef,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<Value, BridgeError> {
        if title.trim().is_empty() {
            return Err(BridgeError::Validation(
                "issue title cannot be empty".to_string(),
            ));
        }
        let mut payload = json!({
            "title": title,
            "body": body,
        });
        if !labels.is_empty() {
            payload["labels"] = json!(labels);
        }
        self.call(
            Method::POST,
            &format!("/repos/{}/{}/issues", repo.owner, repo.name),
            payload,
        )
        .await
    }

    pub async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<Value, BridgeError> {
        self.call(
            Method::GET,
            &format!("/repos/{}/{}/issues/{}", repo.owner, repo.name, number),
            Value::Null,
        )
        .await
    }

    /// Lists every label name defined on the repository (paged).
    pub async fn list_labels(&self, repo: &RepoRef) -> Result<Vec<String>, BridgeError> {
        let rows = self
            .get_paged(
                &format!("/repos/{}/{}/labels", repo.owner, repo.name),
                &[],
                None,
            )
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(ToOwned::to_owned)
            .collect())
    }

    pub async fn add_issue_comment(
        &self,
        repo: &RepoRef,
        number: u64,
        body: &str,
    ) -> Result<Value, BridgeError> {
        self.call(
            Method::POST,
            &format!(
                "/repos/{}/{}/issues/{}/comments",
                repo.owner, repo.name, number
            ),
            json!({ "body": body }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use desklink_core::BridgeError;

    use crate::api_client::GithubApiClient;
    use crate::types::RepoRef;

    fn test_client(api_base: &str) -> GithubApiClient {
        GithubApiClient::new(api_base.to_string(), "token".to_string(), false).expect("client")
    }

    #[tokio::test]
    async fn functional_create_issue_posts_labels_when_present() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/acme/widgets/issues")
                .json_body(json!({
                    "title": "Crash on save",
                    "body": "steps to reproduce",
                    "labels": ["bug"],
                }));
            then.status(201).json_body(json!({
                "id": 1, "number": 42, "title": "Crash on save", "state": "open",
            }));
        });

        let client = test_client(&server.base_url());
        let repo = RepoRef::parse("acme/widgets").expect("repo");
        let payload = client
            .create_issue(&repo, "Crash on save", "steps to reproduce", &["bug".to_string()])
            .await
            .expect("create");
        assert_eq!(payload["number"], 42);
        mock.assert();
    }

    #[tokio::test]
    async fn unit_create_issue_rejects_blank_title_before_any_call() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/repos/acme/widgets/issues");
            then.status(201).json_body(json!({}));
        });

        let client = test_client(&server.base_url());
        let repo = RepoRef::parse("acme/widgets").expect("repo");
        let error = client
            .create_issue(&repo, "  ", "body", &[])
            .await
            .expect_err("must fail");
        assert!(matches!(error, BridgeError::Validation(_)));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_list_labels_collects_names() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/labels");
            then.status(200)
                .json_body(json!([{"name": "bug"}, {"name": "question"}]));
        });

        let client = test_client(&server.base_url());
        let repo = RepoRef::parse("acme/widgets").expect("repo");
        let labels = client.list_labels(&repo).await.expect("labels");
        assert_eq!(labels, vec!["bug".to_string(), "question".to_string()]);
    }
}
