//! `backend` block: origin servers of a service

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde::{Deserialize, Serialize};

use super::{CollectionEntity, null_default};

pub const DEFAULT_PORT: i64 = 80;
pub const DEFAULT_WEIGHT: i64 = 100;
pub const DEFAULT_CONNECT_TIMEOUT: i64 = 1000;
pub const DEFAULT_FIRST_BYTE_TIMEOUT: i64 = 15000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backend {
    pub name: String,
    pub address: String,
    #[serde(default = "default_port")]
    pub port: i64,
    #[serde(default, deserialize_with = "null_default")]
    pub use_ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_cert_hostname: Option<String>,
    #[serde(default = "default_weight")]
    pub weight: i64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: i64,
    #[serde(default = "default_first_byte_timeout")]
    pub first_byte_timeout: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shield: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<String>,
}

fn default_port() -> i64 {
    DEFAULT_PORT
}

fn default_weight() -> i64 {
    DEFAULT_WEIGHT
}

fn default_connect_timeout() -> i64 {
    DEFAULT_CONNECT_TIMEOUT
}

fn default_first_byte_timeout() -> i64 {
    DEFAULT_FIRST_BYTE_TIMEOUT
}

impl FromAttributes for Backend {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("backend")
            .with_description("Origin server requests are forwarded to")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(
                AttributeSchema::new("address", types::non_empty_string())
                    .required()
                    .with_description("Hostname or IPv4/IPv6 address"),
            )
            .attribute(AttributeSchema::new("port", types::port()).with_default(DEFAULT_PORT))
            .attribute(AttributeSchema::new("use_ssl", AttributeType::Bool))
            .attribute(AttributeSchema::new(
                "ssl_cert_hostname",
                AttributeType::String,
            ))
            .attribute(
                AttributeSchema::new("weight", types::positive_int())
                    .with_default(DEFAULT_WEIGHT),
            )
            .attribute(
                AttributeSchema::new("connect_timeout", types::positive_int())
                    .with_default(DEFAULT_CONNECT_TIMEOUT)
                    .with_description("Milliseconds to wait for a connection"),
            )
            .attribute(
                AttributeSchema::new("first_byte_timeout", types::positive_int())
                    .with_default(DEFAULT_FIRST_BYTE_TIMEOUT),
            )
            .attribute(
                AttributeSchema::new("shield", AttributeType::String)
                    .with_description("POP code used as a shield"),
            )
            .attribute(AttributeSchema::new("override_host", AttributeType::String))
            .attribute(
                AttributeSchema::new("healthcheck", AttributeType::String)
                    .with_description("Name of a healthcheck block"),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        Ok(Self {
            name: attrs.string("name")?,
            address: attrs.string("address")?,
            port: attrs.opt_int("port")?.unwrap_or(DEFAULT_PORT),
            use_ssl: attrs.bool("use_ssl")?,
            ssl_cert_hostname: attrs.opt_string("ssl_cert_hostname")?,
            weight: attrs.opt_int("weight")?.unwrap_or(DEFAULT_WEIGHT),
            connect_timeout: attrs
                .opt_int("connect_timeout")?
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            first_byte_timeout: attrs
                .opt_int("first_byte_timeout")?
                .unwrap_or(DEFAULT_FIRST_BYTE_TIMEOUT),
            shield: attrs.opt_string("shield")?,
            override_host: attrs.opt_string("override_host")?,
            healthcheck: attrs.opt_string("healthcheck")?,
        })
    }
}

impl ToAttributes for Backend {
    fn to_attributes(&self) -> HashMap<String, Value> {
        AttributeMap::new()
            .set("name", self.name.as_str())
            .set("address", self.address.as_str())
            .set("port", self.port)
            .set("use_ssl", self.use_ssl)
            .set_opt("ssl_cert_hostname", self.ssl_cert_hostname.as_deref())
            .set("weight", self.weight)
            .set("connect_timeout", self.connect_timeout)
            .set("first_byte_timeout", self.first_byte_timeout)
            .set_opt("shield", self.shield.as_deref())
            .set_opt("override_host", self.override_host.as_deref())
            .set_opt("healthcheck", self.healthcheck.as_deref())
            .build()
    }
}

impl CollectionEntity for Backend {
    const KEY: &'static str = "backend";
    const PATH: &'static str = "backend";

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{CollectionHandler, ServiceAttributeHandler, ServiceVersion};
    use crate::testing::MockApi;
    use serde_json::json;

    #[test]
    fn defaults_fill_unset_fields() {
        let mut block = HashMap::new();
        block.insert("name".to_string(), Value::from("origin"));
        block.insert("address".to_string(), Value::from("origin.example.com"));

        let backend = Backend::from_attributes(&block).unwrap();
        assert_eq!(backend.port, 80);
        assert_eq!(backend.weight, 100);
        assert_eq!(backend.connect_timeout, 1000);
        assert!(!backend.use_ssl);
    }

    #[test]
    fn invalid_port_is_rejected() {
        let mut block = HashMap::new();
        block.insert("name".to_string(), Value::from("origin"));
        block.insert("address".to_string(), Value::from("origin.example.com"));
        block.insert("port".to_string(), Value::Int(70000));

        let err = Backend::from_attributes(&block).unwrap_err();
        assert!(err.to_string().contains("Invalid port 70000"));
    }

    #[tokio::test]
    async fn read_flattens_and_prunes() {
        let api = MockApi::new();
        api.ok(
            "GET",
            "/service/svc1/version/3/backend",
            json!([{
                "name": "origin",
                "address": "origin.example.com",
                "port": 443,
                "use_ssl": true,
                "ssl_cert_hostname": "origin.example.com",
                "weight": 100,
                "connect_timeout": 1000,
                "first_byte_timeout": 15000,
                "shield": null,
                "override_host": "",
                "healthcheck": null,
                "service_id": "svc1",
                "version": 3
            }]),
        );

        let blocks = CollectionHandler::<Backend>::new()
            .read(&api, &ServiceVersion::new("svc1", 3))
            .await
            .unwrap();

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.get("port"), Some(&Value::Int(443)));
        assert_eq!(block.get("use_ssl"), Some(&Value::Bool(true)));
        assert!(!block.contains_key("shield"));
        assert!(!block.contains_key("override_host"));
        assert!(!block.contains_key("service_id"));
    }

    #[tokio::test]
    async fn create_posts_the_api_model() {
        let api = MockApi::new();
        let mut block = HashMap::new();
        block.insert("name".to_string(), Value::from("origin"));
        block.insert("address".to_string(), Value::from("origin.example.com"));
        block.insert("shield".to_string(), Value::from("iad-va-us"));

        CollectionHandler::<Backend>::new()
            .create(&api, &ServiceVersion::new("svc1", 1), &block)
            .await
            .unwrap();

        let body = api
            .body_of("POST", "/service/svc1/version/1/backend")
            .unwrap();
        assert_eq!(body["name"], "origin");
        assert_eq!(body["port"], 80);
        assert_eq!(body["shield"], "iad-va-us");
        assert!(body.get("healthcheck").is_none());
    }
}
