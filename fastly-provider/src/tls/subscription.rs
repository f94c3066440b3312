//! `tls_subscription` resource: platform-managed certificates

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::{Value as Json, json};

use super::{TlsError, TlsResult, attribute, data, data_id, linkage, related_id, related_ids};
use crate::client::{FastlyApi, delete_ignoring_not_found, get_optional, segment};

pub const RESOURCE_TYPE: &str = "tls_subscription";
pub const CERTIFICATE_AUTHORITIES: &[&str] = &["lets-encrypt", "globalsign", "certainly"];

#[derive(Debug, Clone, PartialEq)]
pub struct TlsSubscription {
    pub domains: Vec<String>,
    pub certificate_authority: String,
    pub configuration_id: Option<String>,
}

impl FromAttributes for TlsSubscription {
    fn schema() -> ResourceSchema {
        ResourceSchema::new(RESOURCE_TYPE)
            .with_description("Certificate issued and renewed by a certification authority")
            .attribute(
                AttributeSchema::new("domains", AttributeType::List(Box::new(types::non_empty_string())))
                    .required(),
            )
            .attribute(
                AttributeSchema::new("certificate_authority", types::one_of(CERTIFICATE_AUTHORITIES))
                    .required(),
            )
            .attribute(
                AttributeSchema::new("configuration_id", AttributeType::String)
                    .with_description("TLS configuration to use; the default one when unset"),
            )
            .attribute(
                AttributeSchema::new("state", AttributeType::String)
                    .computed()
                    .with_description("pending, processing, issued or failed"),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let domains = attrs.string_list("domains")?;
        if domains.is_empty() {
            return Err(AttributeError::Conflict(
                "domains must list at least one domain".to_string(),
            ));
        }
        Ok(Self {
            domains,
            certificate_authority: attrs.string("certificate_authority")?,
            configuration_id: attrs.opt_string("configuration_id")?,
        })
    }
}

impl TlsSubscription {
    fn relationships(&self) -> Json {
        let mut relationships = json!({
            "tls_domains": linkage("tls_domain", &self.domains),
        });
        if let Some(configuration) = &self.configuration_id {
            relationships["tls_configuration"] =
                json!({"data": {"type": "tls_configuration", "id": configuration}});
        }
        relationships
    }
}

pub(crate) fn path(id: &str) -> String {
    format!("/tls/subscriptions/{}", segment(id))
}

/// Current state of a subscription (`pending`, `processing`, `issued`, ...)
pub(crate) fn state_of(body: &Json) -> TlsResult<String> {
    attribute(data(body)?, "state")
        .and_then(Json::as_str)
        .map(str::to_string)
        .ok_or_else(|| TlsError::Response("subscription has no state".to_string()))
}

pub async fn create(api: &dyn FastlyApi, subscription: &TlsSubscription) -> TlsResult<String> {
    let body = api
        .post(
            "/tls/subscriptions",
            json!({
                "data": {
                    "type": RESOURCE_TYPE,
                    "attributes": {
                        "certificate_authority": subscription.certificate_authority,
                    },
                    "relationships": subscription.relationships(),
                }
            }),
        )
        .await?;
    let id = data_id(&body)?;
    log::info!(
        "requested TLS subscription {} for {}",
        id,
        subscription.domains.join(", ")
    );
    Ok(id)
}

pub async fn read(api: &dyn FastlyApi, id: &str) -> TlsResult<Option<HashMap<String, Value>>> {
    let Some(body) = get_optional(api, &path(id)).await? else {
        return Ok(None);
    };
    let data = data(&body)?;

    let mut attrs = HashMap::new();
    for name in ["certificate_authority", "state"] {
        if let Some(value) = attribute(data, name).and_then(Value::from_json)
            && !value.is_zero()
        {
            attrs.insert(name.to_string(), value);
        }
    }
    let domains = related_ids(data, "tls_domains");
    if !domains.is_empty() {
        attrs.insert(
            "domains".to_string(),
            Value::List(domains.into_iter().map(Value::String).collect()),
        );
    }
    if let Some(configuration) = related_id(data, "tls_configuration") {
        attrs.insert("configuration_id".to_string(), Value::String(configuration));
    }
    Ok(Some(attrs))
}

/// Domains and configuration can change; the authority cannot
pub async fn update(
    api: &dyn FastlyApi,
    id: &str,
    from: &HashMap<String, Value>,
    to: &TlsSubscription,
) -> TlsResult<()> {
    if let Some(recorded) = from.get("certificate_authority").and_then(Value::as_str)
        && recorded != to.certificate_authority
    {
        return Err(TlsError::Immutable("certificate_authority"));
    }

    let mut recorded_domains: Vec<&str> = match from.get("domains") {
        Some(Value::List(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    let mut desired_domains: Vec<&str> = to.domains.iter().map(String::as_str).collect();
    recorded_domains.sort_unstable();
    desired_domains.sort_unstable();
    // Unset configuration keeps whatever the subscription uses
    let configuration_changed = to.configuration_id.as_deref().is_some_and(|desired| {
        from.get("configuration_id").and_then(Value::as_str) != Some(desired)
    });
    if recorded_domains == desired_domains && !configuration_changed {
        return Ok(());
    }

    api.patch(
        &path(id),
        json!({
            "data": {
                "id": id,
                "type": RESOURCE_TYPE,
                "relationships": to.relationships(),
            }
        }),
    )
    .await?;
    log::info!("updated TLS subscription {}", id);
    Ok(())
}

pub async fn delete(api: &dyn FastlyApi, id: &str) -> TlsResult<()> {
    delete_ignoring_not_found(api, &path(id)).await?;
    Ok(())
}
