//! `tls_certificate` resource: customer-supplied certificates

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde_json::{Value as Json, json};

use super::{TlsResult, attribute, data, data_id, related_ids};
use crate::client::{FastlyApi, delete_ignoring_not_found, get_optional, segment};

pub const RESOURCE_TYPE: &str = "tls_certificate";

/// The API never returns the certificate body
pub const CONFIG_ONLY: &[&str] = &["certificate_body"];

#[derive(Debug, Clone, PartialEq)]
pub struct TlsCertificate {
    pub name: Option<String>,
    pub certificate_body: String,
}

impl FromAttributes for TlsCertificate {
    fn schema() -> ResourceSchema {
        ResourceSchema::new(RESOURCE_TYPE)
            .with_description("Certificate uploaded for use with TLS domains")
            .attribute(AttributeSchema::new("name", AttributeType::String))
            .attribute(
                AttributeSchema::new("certificate_body", types::non_empty_string())
                    .required()
                    .with_description("PEM-formatted certificate"),
            )
            .attribute(AttributeSchema::new("issued_to", AttributeType::String).computed())
            .attribute(AttributeSchema::new("issuer", AttributeType::String).computed())
            .attribute(AttributeSchema::new("serial_number", AttributeType::String).computed())
            .attribute(
                AttributeSchema::new("domains", AttributeType::List(Box::new(AttributeType::String)))
                    .computed(),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        Ok(Self {
            name: attrs.opt_string("name")?,
            certificate_body: attrs.string("certificate_body")?,
        })
    }
}

impl TlsCertificate {
    fn request(&self, attributes: serde_json::Map<String, Json>) -> Json {
        json!({
            "data": {
                "type": RESOURCE_TYPE,
                "attributes": attributes,
            }
        })
    }
}

fn path(id: &str) -> String {
    format!("/tls/certificates/{}", segment(id))
}

/// Upload the certificate, returning its id
pub async fn create(api: &dyn FastlyApi, cert: &TlsCertificate) -> TlsResult<String> {
    let mut attributes = serde_json::Map::new();
    attributes.insert("cert_blob".to_string(), json!(cert.certificate_body));
    if let Some(name) = &cert.name {
        attributes.insert("name".to_string(), json!(name));
    }

    let body = api
        .post("/tls/certificates", cert.request(attributes))
        .await?;
    let id = data_id(&body)?;
    log::info!("uploaded TLS certificate {}", id);
    Ok(id)
}

pub async fn read(api: &dyn FastlyApi, id: &str) -> TlsResult<Option<HashMap<String, Value>>> {
    let Some(body) = get_optional(api, &path(id)).await? else {
        return Ok(None);
    };
    let data = data(&body)?;

    let mut attrs = HashMap::new();
    for name in ["name", "issued_to", "issuer", "serial_number"] {
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
    Ok(Some(attrs))
}

/// Send the changed name and/or body
pub async fn update(
    api: &dyn FastlyApi,
    id: &str,
    from: &HashMap<String, Value>,
    to: &TlsCertificate,
) -> TlsResult<()> {
    let mut attributes = serde_json::Map::new();
    if from.get("certificate_body").and_then(Value::as_str) != Some(to.certificate_body.as_str()) {
        attributes.insert("cert_blob".to_string(), json!(to.certificate_body));
    }
    let recorded_name = from.get("name").and_then(Value::as_str);
    if recorded_name != to.name.as_deref() {
        attributes.insert("name".to_string(), json!(to.name.clone().unwrap_or_default()));
    }
    if attributes.is_empty() {
        return Ok(());
    }

    let mut request = to.request(attributes);
    request["data"]["id"] = json!(id);
    api.patch(&path(id), request).await?;
    log::info!("updated TLS certificate {}", id);
    Ok(())
}

pub async fn delete(api: &dyn FastlyApi, id: &str) -> TlsResult<()> {
    delete_ignoring_not_found(api, &path(id)).await?;
    Ok(())
}
