//! TLS resources
//!
//! Certificates and subscriptions speak JSON:API: request and response
//! bodies wrap a `data` object carrying `id`, `type`, `attributes` and
//! `relationships`.

pub mod certificate;
pub mod subscription;
pub mod validation;

use fastly_core::attrs::AttributeError;
use serde_json::{Value as Json, json};

use crate::client::ApiError;

pub use certificate::TlsCertificate;
pub use subscription::TlsSubscription;
pub use validation::TlsSubscriptionValidation;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unexpected response: {0}")]
    Response(String),

    #[error("{0} cannot be changed in place, the resource must be replaced")]
    Immutable(&'static str),

    #[error("subscription {id} validation failed: {reason}")]
    ValidationFailed { id: String, reason: String },
}

pub type TlsResult<T> = Result<T, TlsError>;

/// JSON:API `data` object of a response
fn data(body: &Json) -> TlsResult<&Json> {
    body.get("data")
        .filter(|d| d.is_object())
        .ok_or_else(|| TlsError::Response("missing data object".to_string()))
}

fn data_id(body: &Json) -> TlsResult<String> {
    data(body)?
        .get("id")
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| TlsError::Response("data object has no id".to_string()))
}

fn attribute<'a>(data: &'a Json, name: &str) -> Option<&'a Json> {
    data.get("attributes").and_then(|a| a.get(name))
}

/// Ids of a to-many relationship
fn related_ids(data: &Json, relationship: &str) -> Vec<String> {
    data.get("relationships")
        .and_then(|r| r.get(relationship))
        .and_then(|r| r.get("data"))
        .and_then(Json::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("id").and_then(Json::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Id of a to-one relationship
fn related_id(data: &Json, relationship: &str) -> Option<String> {
    data.get("relationships")
        .and_then(|r| r.get(relationship))
        .and_then(|r| r.get("data"))
        .and_then(|d| d.get("id"))
        .and_then(Json::as_str)
        .map(str::to_string)
}

/// Resource linkage list for a to-many relationship
fn linkage(kind: &str, ids: &[String]) -> Json {
    json!({
        "data": ids
            .iter()
            .map(|id| json!({"type": kind, "id": id}))
            .collect::<Vec<_>>()
    })
}
