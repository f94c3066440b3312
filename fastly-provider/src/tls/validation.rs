//! `tls_subscription_validation` resource
//!
//! Creating it blocks until the subscription's certificate is issued. It
//! owns nothing remotely: deleting it only forgets it.

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, ResourceSchema, types};

use super::subscription::{path, state_of};
use super::{TlsError, TlsResult};
use crate::client::{ApiError, FastlyApi, get_optional};
use crate::retry::{RetryError, RetryPolicy, retry_with_backoff};

pub const RESOURCE_TYPE: &str = "tls_subscription_validation";

#[derive(Debug, Clone, PartialEq)]
pub struct TlsSubscriptionValidation {
    pub subscription_id: String,
}

impl FromAttributes for TlsSubscriptionValidation {
    fn schema() -> ResourceSchema {
        ResourceSchema::new(RESOURCE_TYPE)
            .with_description("Waits for a TLS subscription to be issued")
            .attribute(AttributeSchema::new("subscription_id", types::non_empty_string()).required())
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        Ok(Self {
            subscription_id: attrs.string("subscription_id")?,
        })
    }
}

impl TlsSubscriptionValidation {
    pub fn attributes(&self) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert(
            "subscription_id".to_string(),
            Value::String(self.subscription_id.clone()),
        );
        attrs
    }
}

fn is_transient(e: &ApiError) -> bool {
    match e {
        ApiError::Transport(_) => true,
        ApiError::Http { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

async fn check(api: &dyn FastlyApi, id: &str) -> Result<(), RetryError<TlsError>> {
    let body = api.get(&path(id)).await.map_err(|e| {
        if is_transient(&e) {
            RetryError::Retryable(TlsError::Api(e))
        } else {
            RetryError::Fatal(TlsError::Api(e))
        }
    })?;

    let state = state_of(&body).map_err(RetryError::Fatal)?;
    match state.as_str() {
        "issued" => Ok(()),
        "pending" | "processing" => {
            log::debug!("subscription {} is {}", id, state);
            Err(RetryError::Retryable(TlsError::ValidationFailed {
                id: id.to_string(),
                reason: format!("still {}", state),
            }))
        }
        other => Err(RetryError::Fatal(TlsError::ValidationFailed {
            id: id.to_string(),
            reason: format!("state is {}", other),
        })),
    }
}

/// Poll until the subscription is issued
///
/// `pending` and `processing` are retried with backoff until the policy's
/// timeout; `failed` or any other state ends the wait immediately.
pub async fn wait_for_issued(
    api: &dyn FastlyApi,
    validation: &TlsSubscriptionValidation,
    policy: RetryPolicy,
) -> TlsResult<()> {
    let id = validation.subscription_id.as_str();
    log::info!("waiting for TLS subscription {} to be issued", id);

    retry_with_backoff(policy, || check(api, id))
        .await
        .map_err(|e| match e {
            RetryError::Timeout { elapsed, last } => TlsError::ValidationFailed {
                id: id.to_string(),
                reason: format!("timed out after {:?} ({})", elapsed, last),
            },
            other => other.into_inner(),
        })?;

    log::info!("TLS subscription {} issued", id);
    Ok(())
}

/// Exists while the subscription exists and is issued
pub async fn read(api: &dyn FastlyApi, subscription_id: &str) -> TlsResult<bool> {
    match get_optional(api, &path(subscription_id)).await? {
        None => Ok(false),
        Some(body) => Ok(state_of(&body)? == "issued"),
    }
}
