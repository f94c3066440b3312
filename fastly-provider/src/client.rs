//! Management API client
//!
//! Every handler talks to the platform through the [`FastlyApi`] trait, a thin
//! JSON verb interface. [`FastlyClient`] is the reqwest implementation; tests
//! substitute an in-memory one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as Json;
use url::Url;

use crate::config::ProviderConfig;

/// Errors returned by the management API
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Invalid response body: {0}")]
    Decode(String),

    #[error("Invalid request URL: {0}")]
    Url(String),
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Transport(e.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// JSON verbs against the management API
///
/// Paths are relative to the API root (e.g. `/service/{id}/version`).
#[async_trait]
pub trait FastlyApi: Send + Sync {
    async fn get(&self, path: &str) -> ApiResult<Json>;

    async fn post(&self, path: &str, body: Json) -> ApiResult<Json>;

    async fn put(&self, path: &str, body: Json) -> ApiResult<Json>;

    async fn patch(&self, path: &str, body: Json) -> ApiResult<Json>;

    async fn delete(&self, path: &str) -> ApiResult<()>;
}

/// Delete, treating 404 as already gone
pub async fn delete_ignoring_not_found(api: &dyn FastlyApi, path: &str) -> ApiResult<()> {
    match api.delete(path).await {
        Err(e) if e.is_not_found() => {
            log::warn!("DELETE {} returned 404, treating as already deleted", path);
            Ok(())
        }
        other => other,
    }
}

/// Get, mapping 404 to None
pub async fn get_optional(api: &dyn FastlyApi, path: &str) -> ApiResult<Option<Json>> {
    match api.get(path).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Percent-encode one path segment (entity names may contain spaces)
pub fn segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// reqwest-backed API client
pub struct FastlyClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
}

impl FastlyClient {
    pub fn new(config: &ProviderConfig) -> ApiResult<Self> {
        let mut base_url =
            Url::parse(&config.base_url).map_err(|e| ApiError::Url(e.to_string()))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ApiError::Url(e.to_string()))
    }

    async fn send(&self, method: Method, path: &str, body: Option<Json>) -> ApiResult<Json> {
        let url = self.url(path)?;
        log::debug!("{} {}", method, url);

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header("Fastly-Key", self.api_key.as_str())
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            log::debug!("{} {} failed with {}", method, url, status);
            return Err(ApiError::http(status.as_u16(), error_message(&text, status)));
        }

        if text.trim().is_empty() {
            return Ok(Json::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Pull a readable message out of an error body
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    if let Ok(json) = serde_json::from_str::<Json>(body) {
        let msg = json.get("msg").and_then(Json::as_str);
        let detail = json.get("detail").and_then(Json::as_str);
        match (msg, detail) {
            (Some(m), Some(d)) if !d.is_empty() => return format!("{}: {}", m, d),
            (Some(m), _) => return m.to_string(),
            (None, Some(d)) => return d.to_string(),
            _ => {}
        }
        if let Some(title) = json
            .get("errors")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("title"))
            .and_then(Json::as_str)
        {
            return title.to_string();
        }
    }
    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.trim().to_string()
    }
}

#[async_trait]
impl FastlyApi for FastlyClient {
    async fn get(&self, path: &str) -> ApiResult<Json> {
        self.send(Method::GET, path, None).await
    }

    async fn post(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.send(Method::POST, path, Some(body)).await
    }

    async fn put(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.send(Method::PUT, path, Some(body)).await
    }

    async fn patch(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(Method::DELETE, path, None).await.map(|_| ())
    }
}
