use std::collections::HashSet;

use reqwest::Method;
use serde_json::{json, Value};

use desklink_core::BridgeError;

use crate::api_client::GithubApiClient;
use crate::types::{IssueSummary, RepoRef};

/// Hits considered "enough" after the first textual strategy; later
/// strategies only run to widen recall for sparse matches.
const EARLY_EXIT_HITS: usize = 5;
const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Enumerates supported `IssueStateFilter` values.
pub enum IssueStateFilter {
    Open,
    Closed,
}

impl IssueStateFilter {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    fn qualifier(&self) -> &'static str {
        match self {
            Self::Open => "state:open",
            Self::Closed => "state:closed",
        }
    }

    fn matches(&self, state: &str) -> bool {
        match self {
            Self::Open => state.eq_ignore_ascii_case("open"),
            Self::Closed => state.eq_ignore_ascii_case("closed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Ordered textual fallback strategies; the remote search endpoint is
/// keyword-based and imprecise, so each step trades latency for recall.
enum TextStrategy {
    QuotedPhrase,
    TokenMatch,
    PrefixMatch,
}

impl TextStrategy {
    const LADDER: [Self; 3] = [Self::QuotedPhrase, Self::TokenMatch, Self::PrefixMatch];

    fn applies(&self, query: &str) -> bool {
        match self {
            Self::QuotedPhrase | Self::TokenMatch => true,
            // A one- or two-character wildcard is pure noise.
            Self::PrefixMatch => query.chars().count() >= 3,
        }
    }

    fn terms(&self, query: &str) -> String {
        match self {
            Self::QuotedPhrase => format!("\"{}\"", query.replace('"', " ")),
            Self::TokenMatch => query.to_string(),
            Self::PrefixMatch => format!("{query}*"),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::QuotedPhrase => "quoted_phrase",
            Self::TokenMatch => "token_match",
            Self::PrefixMatch => "prefix_match",
        }
    }
}

/// Multi-strategy issue search over the tracker's keyword search endpoint.
pub struct IssueSearchEngine<'a> {
    client: &'a GithubApiClient,
}

impl<'a> IssueSearchEngine<'a> {
    pub fn new(client: &'a GithubApiClient) -> Self {
        Self { client }
    }

    /// Runs the fallback ladder: a purely numeric query first tries a
    /// direct issue-number fetch, then a title-scoped number search, and
    /// short-circuits on any hit; otherwise up to three textual strategies
    /// run in fixed order, merged by issue id and capped at `limit`.
    pub async fn search(
        &self,
        repository: &str,
        query: &str,
        state: Option<IssueStateFilter>,
        limit: usize,
    ) -> Result<Vec<IssueSummary>, BridgeError> {
        let repo = RepoRef::parse(repository)?;
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let trimmed = query.trim();
        // An empty query would otherwise match the whole repository.
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        if trimmed.chars().all(|ch| ch.is_ascii_digit()) {
            if let Ok(number) = trimmed.parse::<u64>() {
                match self.lookup_by_number(&repo, number, state).await {
                    Ok(Some(hit)) => return Ok(vec![hit]),
                    Ok(None) => {}
                    Err(error) if error.is_recoverable() => {
                        tracing::warn!(%error, number, "direct issue lookup failed, falling back");
                    }
                    Err(error) => return Err(error),
                }
            }
            let terms = format!("{trimmed} in:title");
            match self
                .run_query(&self.build_query(&repo, state, &terms), limit)
                .await
            {
                Ok(hits) if !hits.is_empty() => {
                    let mut hits = hits;
                    hits.truncate(limit);
                    return Ok(hits);
                }
                Ok(_) => {}
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(%error, "numeric search strategy failed, falling back");
                }
                Err(error) => return Err(error),
            }
        }

        let mut merged: Vec<IssueSummary> = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();
        let mut attempted = 0_usize;
        let mut failed = 0_usize;
        let mut last_error: Option<BridgeError> = None;

        for (index, strategy) in TextStrategy::LADDER.iter().enumerate() {
            if !strategy.applies(trimmed) {
                continue;
            }
            attempted += 1;
            let terms = strategy.terms(trimmed);
            match self
                .run_query(&self.build_query(&repo, state, &terms), limit)
                .await
            {
                Ok(hits) => {
                    for hit in hits {
                        if seen.insert(hit.id) {
                            merged.push(hit);
                        }
                    }
                    if index == 0 && merged.len() >= EARLY_EXIT_HITS {
                        break;
                    }
                }
                Err(error) if error.is_recoverable() => {
                    tracing::warn!(strategy = strategy.name(), %error, "search strategy failed");
                    failed += 1;
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        // Recoverable failures skip to the next strategy, but a ladder where
        // every rung failed must not masquerade as "no results".
        if merged.is_empty() && attempted > 0 && failed == attempted {
            if let Some(error) = last_error {
                return Err(error);
            }
        }

        merged.truncate(limit);
        Ok(merged)
    }

    /// Direct issue-number fetch; an unknown number is an ordinary miss,
    /// and pull requests or state-filter mismatches are treated the same.
    async fn lookup_by_number(
        &self,
        repo: &RepoRef,
        number: u64,
        state: Option<IssueStateFilter>,
    ) -> Result<Option<IssueSummary>, BridgeError> {
        let payload = match self.client.get_issue(repo, number).await {
            Ok(payload) => payload,
            Err(BridgeError::Remote { status: 404, .. }) => return Ok(None),
            Err(error) => return Err(error),
        };
        if payload.get("pull_request").is_some() {
            return Ok(None);
        }
        let Some(summary) = IssueSummary::from_value(&payload) else {
            return Ok(None);
        };
        if let Some(filter) = state {
            if !filter.matches(&summary.state) {
                return Ok(None);
            }
        }
        Ok(Some(summary))
    }

    fn build_query(&self, repo: &RepoRef, state: Option<IssueStateFilter>, terms: &str) -> String {
        let mut parts = vec![format!("repo:{}", repo.full_name()), "type:issue".to_string()];
        if let Some(state) = state {
            parts.push(state.qualifier().to_string());
        }
        parts.push(terms.to_string());
        parts.join(" ")
    }

    async fn run_query(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<IssueSummary>, BridgeError> {
        let payload = self
            .client
            .call(
                Method::GET,
                "/search/issues",
                json!({
                    "q": query,
                    "per_page": limit.to_string(),
                }),
            )
            .await?;
        let items = payload
            .get("items")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(items
            .iter()
            .filter(|item| item.get("pull_request").is_none())
            .filter_map(IssueSummary::from_value)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use desklink_core::BridgeError;

    use super::{IssueSearchEngine, IssueStateFilter};
    use crate::api_client::GithubApiClient;

    fn test_client(api_base: &str) -> GithubApiClient {
        GithubApiClient::new(api_base.to_string(), "token".to_string(), false).expect("client")
    }

    fn search_item(id: u64, number: u64, title: &str) -> serde_json::Value {
        json!({
            "id": id,
            "number": number,
            "title": title,
            "state": "open",
            "labels": [],
            "assignees": [],
            "html_url": format!("https://github.com/acme/widgets/issues/{number}"),
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z",
        })
    }

    #[tokio::test]
    async fn unit_blank_query_returns_empty_without_remote_calls() {
        let server = MockServer::start();
        let search = server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "   ", None, 10)
            .await
            .expect("search");
        assert!(hits.is_empty());
        search.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_numeric_query_prefers_direct_issue_fetch() {
        let server = MockServer::start();
        let direct = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(200).json_body(search_item(900, 42, "Crash"));
        });
        let search = server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "42", None, 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number, 42);
        direct.assert_hits(1);
        search.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_unknown_number_falls_back_to_title_search() {
        let server = MockServer::start();
        let direct = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(404).json_body(json!({"message": "Not Found"}));
        });
        let title_search = server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue 42 in:title");
            then.status(200)
                .json_body(json!({"items": [search_item(900, 7, "Error 42 on save")]}));
        });
        let textual = server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue \"42\"");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "42", None, 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number, 7);
        direct.assert_hits(1);
        title_search.assert_hits(1);
        textual.assert_hits(0);
    }

    #[tokio::test]
    async fn unit_direct_fetch_honors_state_filter() {
        let server = MockServer::start();
        let direct = server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(200).json_body(search_item(900, 42, "Crash"));
        });
        // Every remaining strategy misses.
        server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "42", Some(IssueStateFilter::Closed), 10)
            .await
            .expect("search");
        // The open issue does not satisfy the closed filter.
        assert!(hits.is_empty());
        direct.assert_hits(1);
    }

    #[tokio::test]
    async fn unit_direct_fetch_skips_pull_requests() {
        let server = MockServer::start();
        let mut item = search_item(900, 42, "Fix crash");
        item["pull_request"] = json!({"url": "https://api.github.com/..."});
        server.mock(|when, then| {
            when.method(GET).path("/repos/acme/widgets/issues/42");
            then.status(200).json_body(item);
        });
        server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "42", None, 10)
            .await
            .expect("search");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn functional_textual_ladder_merges_and_dedupes_by_id() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue \"login bug\"");
            then.status(200)
                .json_body(json!({"items": [search_item(1, 10, "login bug")]}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue login bug");
            then.status(200).json_body(json!({
                "items": [search_item(1, 10, "login bug"), search_item(2, 11, "bug at login")],
            }));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue login bug*");
            then.status(200)
                .json_body(json!({"items": [search_item(3, 12, "login buggy flow")]}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "login bug", None, 10)
            .await
            .expect("search");
        let numbers: Vec<u64> = hits.iter().map(|hit| hit.number).collect();
        assert_eq!(numbers, vec![10, 11, 12]);
    }

    #[tokio::test]
    async fn functional_first_strategy_short_circuits_at_five_hits() {
        let server = MockServer::start();
        let quoted = server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue \"error\"");
            then.status(200).json_body(json!({
                "items": (1..=6).map(|n| search_item(n, n, "error")).collect::<Vec<_>>(),
            }));
        });
        let token = server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue error");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "error", None, 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 6);
        quoted.assert_hits(1);
        token.assert_hits(0);
    }

    #[tokio::test]
    async fn functional_state_filter_and_limit_are_applied() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue state:closed \"crash\"");
            then.status(200).json_body(json!({
                "items": (1..=8).map(|n| search_item(n, n, "crash")).collect::<Vec<_>>(),
            }));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search(
                "acme/widgets",
                "crash",
                Some(IssueStateFilter::Closed),
                3,
            )
            .await
            .expect("search");
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn regression_strategy_failure_falls_through_to_next() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue \"timeout\"");
            then.status(503).json_body(json!({"message": "unavailable"}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue timeout");
            then.status(200)
                .json_body(json!({"items": [search_item(5, 50, "timeout on save")]}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/search/issues")
                .query_param("q", "repo:acme/widgets type:issue timeout*");
            then.status(200).json_body(json!({"items": []}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "timeout", None, 10)
            .await
            .expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].number, 50);
    }

    #[tokio::test]
    async fn regression_all_strategies_failing_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(503).json_body(json!({"message": "unavailable"}));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let error = engine
            .search("acme/widgets", "down", None, 10)
            .await
            .expect_err("must fail");
        assert!(matches!(error, BridgeError::Remote { status: 503, .. }));
    }

    #[tokio::test]
    async fn unit_pull_requests_are_excluded_from_hits() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/search/issues");
            then.status(200).json_body(json!({
                "items": [
                    search_item(1, 10, "fix crash"),
                    {
                        "id": 2,
                        "number": 11,
                        "title": "fix crash PR",
                        "state": "open",
                        "pull_request": {"url": "https://api.github.com/..."},
                        "html_url": "https://github.com/acme/widgets/pull/11",
                        "created_at": "2026-01-01T00:00:00Z",
                        "updated_at": "2026-01-01T00:00:00Z",
                    },
                ],
            }));
        });

        let client = test_client(&server.base_url());
        let engine = IssueSearchEngine::new(&client);
        let hits = engine
            .search("acme/widgets", "fix crash", None, 10)
            .await
            .expect("search");
        assert_eq!(hits.iter().filter(|hit| hit.number == 11).count(), 0);
    }
}
