//! `healthcheck` block: origin health probes referenced by backends

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, ResourceSchema, types};
use serde::{Deserialize, Serialize};

use super::CollectionEntity;

pub const DEFAULT_CHECK_INTERVAL: i64 = 5000;
pub const DEFAULT_EXPECTED_RESPONSE: i64 = 200;
pub const DEFAULT_METHOD: &str = "HEAD";
pub const DEFAULT_THRESHOLD: i64 = 3;
pub const DEFAULT_WINDOW: i64 = 5;
pub const DEFAULT_TIMEOUT: i64 = 500;
pub const DEFAULT_INITIAL: i64 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Healthcheck {
    pub name: String,
    pub host: String,
    pub path: String,
    pub check_interval: i64,
    pub expected_response: i64,
    pub method: String,
    pub threshold: i64,
    pub window: i64,
    pub timeout: i64,
    pub initial: i64,
}

impl FromAttributes for Healthcheck {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("healthcheck")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("host", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("path", types::non_empty_string()).required())
            .attribute(
                AttributeSchema::new("check_interval", types::positive_int())
                    .with_default(DEFAULT_CHECK_INTERVAL)
                    .with_description("Milliseconds between checks"),
            )
            .attribute(
                AttributeSchema::new("expected_response", types::positive_int())
                    .with_default(DEFAULT_EXPECTED_RESPONSE),
            )
            .attribute(
                AttributeSchema::new("method", types::one_of(&["HEAD", "GET", "POST"]))
                    .with_default(DEFAULT_METHOD),
            )
            .attribute(
                AttributeSchema::new("threshold", types::positive_int())
                    .with_default(DEFAULT_THRESHOLD)
                    .with_description("Successful checks within window to be healthy"),
            )
            .attribute(
                AttributeSchema::new("window", types::positive_int())
                    .with_default(DEFAULT_WINDOW),
            )
            .attribute(
                AttributeSchema::new("timeout", types::positive_int())
                    .with_default(DEFAULT_TIMEOUT),
            )
            .attribute(
                AttributeSchema::new("initial", types::positive_int())
                    .with_default(DEFAULT_INITIAL),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let check = Self {
            name: attrs.string("name")?,
            host: attrs.string("host")?,
            path: attrs.string("path")?,
            check_interval: attrs
                .opt_int("check_interval")?
                .unwrap_or(DEFAULT_CHECK_INTERVAL),
            expected_response: attrs
                .opt_int("expected_response")?
                .unwrap_or(DEFAULT_EXPECTED_RESPONSE),
            method: attrs
                .opt_string("method")?
                .unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            threshold: attrs.opt_int("threshold")?.unwrap_or(DEFAULT_THRESHOLD),
            window: attrs.opt_int("window")?.unwrap_or(DEFAULT_WINDOW),
            timeout: attrs.opt_int("timeout")?.unwrap_or(DEFAULT_TIMEOUT),
            initial: attrs.opt_int("initial")?.unwrap_or(DEFAULT_INITIAL),
        };

        if check.threshold > check.window {
            return Err(AttributeError::Conflict(format!(
                "healthcheck '{}': threshold {} exceeds window {}",
                check.name, check.threshold, check.window
            )));
        }
        Ok(check)
    }
}

impl ToAttributes for Healthcheck {
    fn to_attributes(&self) -> HashMap<String, Value> {
        AttributeMap::new()
            .set("name", self.name.as_str())
            .set("host", self.host.as_str())
            .set("path", self.path.as_str())
            .set("check_interval", self.check_interval)
            .set("expected_response", self.expected_response)
            .set("method", self.method.as_str())
            .set("threshold", self.threshold)
            .set("window", self.window)
            .set("timeout", self.timeout)
            .set("initial", self.initial)
            .build()
    }
}

impl CollectionEntity for Healthcheck {
    const KEY: &'static str = "healthcheck";
    const PATH: &'static str = "healthcheck";

    fn name(&self) -> &str {
        &self.name
    }
}
