//! Route handlers for the bridge HTTP surface.
//!
//! All input validation (missing fields, repository format, bounds) happens
//! here before any remote tracker call is made.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use desklink_core::{keys, BridgeError, SettingsStore};
use desklink_github::{IssueSearchEngine, IssueStateFilter, RepoRef, RepositoryAggregator};
use desklink_pipeline::{
    CharOverlapScorer, ClassifierConfig, ContentGenerator, ConversationContext, LabelClassifier,
    MappingEntry,
};
use desklink_sync::{verify_signature, RefreshCoordinator, WebhookCoordinator};

use crate::response::{ActionResponse, ApiError};
use crate::state::AppState;

const DEFAULT_SEARCH_LIMIT: usize = 20;
const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/issues/search", post(search_issues))
        .route("/api/issues", post(create_issue).get(get_issue))
        .route("/api/issues/link", post(link_issue))
        .route("/api/issues/comment", post(comment_issue))
        .route("/api/issues/unlink", post(unlink_issue))
        .route("/api/issues/refresh", post(refresh_issues))
        .route("/api/repositories", get(list_repositories))
        .route("/api/labels", get(list_labels))
        .route("/api/mappings", get(list_mappings).post(save_mapping))
        .route("/api/settings", post(update_settings))
        .route("/webhooks/github", post(github_webhook))
        .with_state(state)
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|error| ApiError::Internal(error.into()))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

#[derive(Debug, Deserialize)]
struct SearchRequest {
    repository: String,
    query: String,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search_issues(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let state_filter = match request.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(IssueStateFilter::parse(raw).ok_or_else(|| {
            BridgeError::Validation(format!(
                "unknown state filter '{raw}' (expected open or closed)"
            ))
        })?),
        None => None,
    };
    let client = state.github_client()?;
    let engine = IssueSearchEngine::new(&client);
    let hits = engine
        .search(
            &request.repository,
            &request.query,
            state_filter,
            request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        )
        .await?;
    Ok(ActionResponse::success(json!({ "issues": hits })))
}

#[derive(Debug, Deserialize)]
struct CreateIssueRequest {
    #[serde(default)]
    repository: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<String>,
    conversation: ConversationContext,
}

/// Creates a tracker issue from a conversation: blanks in title/body are
/// filled by the content generator, labels come from the classification
/// pipeline, and the new issue is cached and linked before responding.
async fn create_issue(
    State(state): State<AppState>,
    Json(request): Json<CreateIssueRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let repository = non_blank(request.repository)
        .or_else(|| non_blank(state.settings.get(keys::GITHUB_DEFAULT_REPOSITORY)))
        .ok_or_else(|| {
            BridgeError::Validation(
                "repository is required and no default repository is configured".to_string(),
            )
        })?;
    let repo = RepoRef::parse(&repository)?;
    let client = state.github_client()?;
    let available = client.list_labels(&repo).await?;

    let llm = state.llm_client();
    let ai = llm.as_deref();
    let ai_model = state.settings.get_or(keys::AI_MODEL, DEFAULT_AI_MODEL);
    let conversation = request.conversation;

    let given_title = non_blank(request.title);
    let given_body = non_blank(request.body);
    let (title, body) = match (given_title, given_body) {
        (Some(title), Some(body)) => (title, body),
        (given_title, given_body) => {
            let generator = ContentGenerator::new(
                ai,
                ai_model.clone(),
                state.settings.get_or(keys::HELPDESK_BASE_URL, ""),
            );
            let generated = generator.generate(&conversation).await;
            (
                given_title.unwrap_or(generated.title),
                given_body.unwrap_or(generated.body),
            )
        }
    };

    let scorer = CharOverlapScorer;
    let classifier = LabelClassifier::new(
        &scorer,
        ai,
        ClassifierConfig {
            repository: repository.clone(),
            allowed_labels: state.settings.get_string_list(keys::ALLOWED_LABELS),
            ai_model,
        },
    );
    let mappings = state.store.mappings_for_repository(&repository);
    let outcome = classifier
        .assign_labels(&conversation, &available, &mappings)
        .await;

    let payload = client
        .create_issue(&repo, &title, &body, &outcome.labels)
        .await?;
    let cached = state.store.upsert_issue(&repository, &payload)?;
    state
        .store
        .link(&repository, cached.number, conversation.id)?;

    Ok(ActionResponse::success(json!({
        "issue": to_value(&cached)?,
        "labels": outcome.labels,
        "report": to_value(&outcome.report)?,
    })))
}

#[derive(Debug, Deserialize)]
struct LinkRequest {
    repository: String,
    number: u64,
    conversation: u64,
}

/// Links an existing tracker issue: fetched fresh, upserted into the cache,
/// then joined to the conversation.
async fn link_issue(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let repo = RepoRef::parse(&request.repository)?;
    let client = state.github_client()?;
    let payload = client.get_issue(&repo, request.number).await?;
    let cached = state.store.upsert_issue(&request.repository, &payload)?;
    let linked = state
        .store
        .link(&request.repository, request.number, request.conversation)?;
    Ok(ActionResponse::success(json!({
        "issue": to_value(&cached)?,
        "linked": linked,
    })))
}

#[derive(Debug, Deserialize)]
struct CommentRequest {
    repository: String,
    number: u64,
    body: String,
}

async fn comment_issue(
    State(state): State<AppState>,
    Json(request): Json<CommentRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let repo = RepoRef::parse(&request.repository)?;
    if request.body.trim().is_empty() {
        return Err(BridgeError::Validation("comment body cannot be empty".to_string()).into());
    }
    let client = state.github_client()?;
    let payload = client
        .add_issue_comment(&repo, request.number, &request.body)
        .await?;
    Ok(ActionResponse::success(json!({ "comment": payload })))
}

async fn unlink_issue(
    State(state): State<AppState>,
    Json(request): Json<LinkRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    RepoRef::parse(&request.repository)?;
    let removed = state
        .store
        .unlink(&request.repository, request.number, request.conversation)?;
    Ok(ActionResponse::success(json!({ "removed": removed })))
}

#[derive(Debug, Deserialize)]
struct IssueQuery {
    repository: String,
    number: u64,
}

async fn get_issue(
    State(state): State<AppState>,
    Query(query): Query<IssueQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    RepoRef::parse(&query.repository)?;
    let cached = state
        .store
        .issue(&query.repository, query.number)
        .ok_or_else(|| {
            ApiError::NotFound(format!(
                "issue {}#{} is not cached",
                query.repository, query.number
            ))
        })?;
    let conversations = state
        .store
        .conversations_for_issue(&query.repository, query.number);
    Ok(ActionResponse::success(json!({
        "issue": to_value(&cached)?,
        "conversations": conversations,
    })))
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    conversation: u64,
}

async fn refresh_issues(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let client = state.github_client()?;
    let coordinator = RefreshCoordinator::new(&client, state.store.as_ref(), state.gate.as_ref());
    let outcome = coordinator.refresh_conversation(request.conversation).await;
    Ok(ActionResponse::success(to_value(&outcome)?))
}

async fn list_repositories(
    State(state): State<AppState>,
) -> Result<Json<ActionResponse>, ApiError> {
    let client = state.github_client()?;
    let fallback_orgs = state.settings.get_string_list(keys::GITHUB_FALLBACK_ORGS);
    let aggregator = RepositoryAggregator::new(&client, fallback_orgs);
    let repositories = aggregator.list_repositories().await?;
    Ok(ActionResponse::success(
        json!({ "repositories": repositories }),
    ))
}

#[derive(Debug, Deserialize)]
struct RepositoryQuery {
    repository: String,
}

async fn list_labels(
    State(state): State<AppState>,
    Query(query): Query<RepositoryQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    let repo = RepoRef::parse(&query.repository)?;
    let client = state.github_client()?;
    let labels = client.list_labels(&repo).await?;
    Ok(ActionResponse::success(json!({ "labels": labels })))
}

async fn list_mappings(
    State(state): State<AppState>,
    Query(query): Query<RepositoryQuery>,
) -> Result<Json<ActionResponse>, ApiError> {
    RepoRef::parse(&query.repository)?;
    let mappings = state.store.mappings_for_repository(&query.repository);
    Ok(ActionResponse::success(json!({ "mappings": mappings })))
}

async fn save_mapping(
    State(state): State<AppState>,
    Json(entry): Json<MappingEntry>,
) -> Result<Json<ActionResponse>, ApiError> {
    RepoRef::parse(&entry.repository)?;
    if entry.helpdesk_tag.trim().is_empty() || entry.github_label.trim().is_empty() {
        return Err(BridgeError::Validation(
            "helpdesk_tag and github_label cannot be blank".to_string(),
        )
        .into());
    }
    if !(0.0..=1.0).contains(&entry.confidence_threshold) {
        return Err(BridgeError::Validation(format!(
            "confidence threshold {} is outside 0.00-1.00",
            entry.confidence_threshold
        ))
        .into());
    }
    state.store.save_mapping(entry)?;
    Ok(ActionResponse::success_with_message("mapping saved", None))
}

async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Json<ActionResponse>, ApiError> {
    let Value::Object(entries) = payload else {
        return Err(
            BridgeError::Validation("settings payload must be a JSON object".to_string()).into(),
        );
    };
    let updated = entries.len();
    for (key, value) in entries {
        state.settings.set(&key, value)?;
    }
    Ok(ActionResponse::success_with_message(
        "settings updated",
        Some(json!({ "updated": updated })),
    ))
}

/// Webhook entry: the raw body is signature-checked before it is parsed, so
/// a forged payload never reaches JSON decoding or the store.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ActionResponse>, ApiError> {
    let secret = state.settings.get(keys::GITHUB_WEBHOOK_SECRET);
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|value| value.to_str().ok());
    verify_signature(secret.as_deref(), &body, signature)?;

    let event = headers
        .get("x-github-event")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| {
            BridgeError::Validation("missing x-github-event header".to_string())
        })?;
    let payload: Value = serde_json::from_slice(&body).map_err(|error| {
        BridgeError::Validation(format!("invalid webhook payload: {error}"))
    })?;

    let coordinator = WebhookCoordinator::new(state.store.as_ref(), state.notifier.as_ref());
    let outcome = coordinator.handle_event(event, &payload)?;
    Ok(ActionResponse::success(to_value(&outcome)?))
}
