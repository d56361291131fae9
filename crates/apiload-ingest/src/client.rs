//! HTTP client for the remote JSON API
//!
//! Every call goes through [`ApiClient::issue`], which retries transient
//! statuses and transport failures with exponential backoff (or the server's
//! `Retry-After` hint) up to a fixed number of total attempts. The underlying
//! `reqwest::Client` is the only state shared between calls.

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::config::ApiConfig;
use crate::error::{IngestError, Result};

/// Statuses worth another attempt
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Json(Value),
    /// 2xx body that was not JSON
    Text(String),
}

impl ApiResponse {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiResponse::Json(value) => Some(value),
            ApiResponse::Text(_) => None,
        }
    }

    /// Require a JSON body
    pub fn into_json(self) -> Result<Value> {
        match self {
            ApiResponse::Json(value) => Ok(value),
            ApiResponse::Text(text) => Err(IngestError::DecodeFailed(truncate(&text, 200))),
        }
    }
}

/// Attempt budget and backoff schedule
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &ApiConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base(),
            max_backoff: config.max_backoff(),
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff_base
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn is_retryable(status: StatusCode) -> bool {
        RETRYABLE_STATUSES.contains(&status.as_u16())
    }
}

/// Client for the remote API
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    app_key: String,
    app_secret: String,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| IngestError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            app_key: config.app_key.clone(),
            app_secret: config.app_secret.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    /// Full URL for a resource path
    pub fn url_for(&self, resource: &str) -> String {
        match (self.base_url.ends_with('/'), resource.starts_with('/')) {
            (true, true) => format!("{}{}", self.base_url, &resource[1..]),
            _ => format!("{}{}", self.base_url, resource),
        }
    }

    /// Request body understood by the API: action, credentials and one param object
    pub fn envelope(&self, action: &str, params: &Map<String, Value>) -> Value {
        json!({
            "call": action,
            "app_key": self.app_key,
            "app_secret": self.app_secret,
            "param": [params],
        })
    }

    /// POST one action to a resource; the query string mirrors `params`
    pub async fn call(
        &self,
        resource: &str,
        action: &str,
        params: &Map<String, Value>,
    ) -> Result<ApiResponse> {
        let url = self.url_for(resource);
        let body = self.envelope(action, params);
        let query = query_pairs(params);

        self.issue(Method::POST, &url, &json_headers(), &query, Some(&body))
            .await
    }

    /// Send a request, retrying transient failures
    pub async fn issue(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let max_attempts = self.retry.max_attempts;
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(%method, url, attempt, max_attempts, "Issuing request");

            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(headers.clone())
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return decode(url, response).await;
                    }

                    if RetryPolicy::is_retryable(status) && attempt < max_attempts {
                        let delay = retry_after(response.headers(), Utc::now())
                            .unwrap_or_else(|| self.retry.backoff(attempt));
                        warn!(
                            url,
                            status = status.as_u16(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "Transient status, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    error!(url, status = status.as_u16(), attempt, body = %truncate(&body, 500), "Request failed");
                    return Err(IngestError::RequestFailed {
                        status: status.as_u16(),
                        body,
                    });
                },
                Err(err) => {
                    if !err.is_builder() && attempt < max_attempts {
                        let delay = self.retry.backoff(attempt);
                        warn!(
                            url,
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "Transport error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    error!(url, attempt, error = %err, "Transport failed");
                    return Err(IngestError::TransportFailed {
                        url: url.to_string(),
                        source: err,
                    });
                },
            }
        }
    }
}

async fn decode(url: &str, response: reqwest::Response) -> Result<ApiResponse> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|source| IngestError::TransportFailed {
            url: url.to_string(),
            source,
        })?;

    match serde_json::from_str::<Value>(&text) {
        Ok(value) => Ok(ApiResponse::Json(value)),
        Err(err) => {
            warn!(url, status, error = %err, body = %truncate(&text, 200), "Response content is not JSON");
            Ok(ApiResponse::Text(text))
        },
    }
}

fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Delay requested by a `Retry-After` header, in delta-seconds or HTTP-date form
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Flatten request params into query-string pairs
pub fn query_pairs(params: &Map<String, Value>) -> Vec<(String, String)> {
    params
        .iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
