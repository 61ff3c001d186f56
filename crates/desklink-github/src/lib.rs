//! Token-scoped GitHub API access for the DeskLink bridge.
//!
//! Provides the uniform success/error envelope every downstream component
//! consumes, the multi-scope repository aggregator, the fallback-ladder issue
//! search engine, and thin issue/label operations.

pub mod api_client;
pub mod issues;
pub mod repositories;
pub mod search;
pub mod types;

pub use api_client::GithubApiClient;
pub use repositories::RepositoryAggregator;
pub use search::{IssueSearchEngine, IssueStateFilter};
pub use types::{IssueSummary, RepoRef, Repository};
