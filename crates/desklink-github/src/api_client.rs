use std::time::Duration;

use reqwest::Method;
use serde_json::Value;

use desklink_core::{keys, BridgeError, SettingsStore};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Token-scoped client carrying the uniform success/error envelope.
///
/// Every outbound tracker call flows through [`GithubApiClient::call`]; no
/// downstream component parses raw HTTP responses itself.
#[derive(Clone, Debug)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
}

impl GithubApiClient {
    /// Builds a client from settings, optionally overriding the stored token.
    ///
    /// Fails fast with [`BridgeError::Config`] when no token is available.
    /// TLS verification is relaxed only when the `environment` setting is
    /// explicitly `local` or `dev`.
    pub fn from_settings(
        settings: &dyn SettingsStore,
        token_override: Option<String>,
    ) -> Result<Self, BridgeError> {
        let token = token_override
            .or_else(|| settings.get(keys::GITHUB_TOKEN))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                BridgeError::Config("github token is not configured".to_string())
            })?;
        let api_base = settings.get_or(keys::GITHUB_API_BASE, DEFAULT_API_BASE);
        let environment = settings.get_or(keys::ENVIRONMENT, "production");
        Self::new(api_base, token, matches!(environment.as_str(), "local" | "dev"))
    }

    pub fn new(
        api_base: String,
        token: String,
        accept_invalid_certs: bool,
    ) -> Result<Self, BridgeError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("DeskLink-helpdesk-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header).map_err(|error| {
                BridgeError::Config(format!("invalid github authorization header: {error}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECONDS))
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|error| {
                BridgeError::Config(format!("failed to create github api client: {error}"))
            })?;
        Ok(Self {
            http: client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Issues a single API call and classifies the outcome: transport failure
    /// first, then HTTP status, then body decoding. `params` become query
    /// parameters for GET and a JSON body otherwise; `Value::Null` means no
    /// parameters.
    pub async fn call(
        &self,
        method: Method,
        endpoint: &str,
        params: Value,
    ) -> Result<Value, BridgeError> {
        let url = format!("{}/{}", self.api_base, endpoint.trim_start_matches('/'));
        let mut request = self.http.request(method.clone(), &url);
        if !params.is_null() {
            if method == Method::GET {
                request = request.query(&query_pairs(&params));
            } else {
                request = request.json(&params);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|error| BridgeError::Transport(error.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| BridgeError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|payload| {
                    payload
                        .get("message")
                        .and_then(Value::as_str)
                        .map(ToOwned::to_owned)
                })
                .unwrap_or_else(|| "github api request failed".to_string());
            return Err(BridgeError::Remote {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|error| {
            BridgeError::Transport(format!("failed to decode github response: {error}"))
        })
    }

    /// Fetches every page of an array-valued endpoint (100 rows per page).
    /// When `array_field` is set, the array is read from that field of an
    /// object payload (e.g. `/installation/repositories`).
    pub async fn get_paged(
        &self,
        endpoint: &str,
        base_params: &[(&str, &str)],
        array_field: Option<&str>,
    ) -> Result<Vec<Value>, BridgeError> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let page_value = page.to_string();
            let mut params = serde_json::Map::new();
            for (key, value) in base_params {
                params.insert((*key).to_string(), Value::String((*value).to_string()));
            }
            params.insert("per_page".to_string(), Value::String("100".to_string()));
            params.insert("page".to_string(), Value::String(page_value));
            let payload = self
                .call(Method::GET, endpoint, Value::Object(params))
                .await?;
            let chunk = match array_field {
                Some(field) => payload
                    .get(field)
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
                None => payload.as_array().cloned().unwrap_or_default(),
            };
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < 100 {
                break;
            }
            page = page.saturating_add(1);
        }
        Ok(rows)
    }
}

fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Value::Object(map) = params else {
        return Vec::new();
    };
    map.iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}
