//! `header` block: request/response header rewrites

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde::{Deserialize, Serialize};

use super::{CollectionEntity, null_default};

pub const ACTIONS: &[&str] = &["set", "append", "delete", "regex", "regex_repeat"];
pub const TYPES: &[&str] = &["request", "fetch", "cache", "response"];
pub const DEFAULT_PRIORITY: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub action: String,
    #[serde(rename = "type")]
    pub header_type: String,
    #[serde(rename = "dst")]
    pub destination: String,
    #[serde(rename = "src", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitution: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub ignore_if_set: bool,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl FromAttributes for Header {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("header")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("action", types::one_of(ACTIONS)).required())
            .attribute(AttributeSchema::new("type", types::one_of(TYPES)).required())
            .attribute(
                AttributeSchema::new("destination", types::non_empty_string())
                    .required()
                    .with_description("Header to act on, e.g. http.X-Served-By"),
            )
            .attribute(
                AttributeSchema::new("source", AttributeType::String)
                    .with_description("Variable or literal the header is set from"),
            )
            .attribute(AttributeSchema::new("regex", AttributeType::String))
            .attribute(AttributeSchema::new("substitution", AttributeType::String))
            .attribute(AttributeSchema::new("ignore_if_set", AttributeType::Bool))
            .attribute(
                AttributeSchema::new("priority", types::positive_int())
                    .with_default(DEFAULT_PRIORITY),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let header = Self {
            name: attrs.string("name")?,
            action: attrs.string("action")?,
            header_type: attrs.string("type")?,
            destination: attrs.string("destination")?,
            source: attrs.opt_string("source")?,
            regex: attrs.opt_string("regex")?,
            substitution: attrs.opt_string("substitution")?,
            ignore_if_set: attrs.bool("ignore_if_set")?,
            priority: attrs.opt_int("priority")?.unwrap_or(DEFAULT_PRIORITY),
        };

        let needs_regex = matches!(header.action.as_str(), "regex" | "regex_repeat");
        if needs_regex && (header.regex.is_none() || header.substitution.is_none()) {
            return Err(AttributeError::Conflict(format!(
                "header '{}': action {} requires regex and substitution",
                header.name, header.action
            )));
        }
        Ok(header)
    }
}

impl ToAttributes for Header {
    fn to_attributes(&self) -> HashMap<String, Value> {
        AttributeMap::new()
            .set("name", self.name.as_str())
            .set("action", self.action.as_str())
            .set("type", self.header_type.as_str())
            .set("destination", self.destination.as_str())
            .set_opt("source", self.source.as_deref())
            .set_opt("regex", self.regex.as_deref())
            .set_opt("substitution", self.substitution.as_deref())
            .set("ignore_if_set", self.ignore_if_set)
            .set("priority", self.priority)
            .build()
    }
}

impl CollectionEntity for Header {
    const KEY: &'static str = "header";
    const PATH: &'static str = "header";

    fn name(&self) -> &str {
        &self.name
    }

    fn api_field(attribute: &str) -> &str {
        match attribute {
            "destination" => "dst",
            "source" => "src",
            other => other,
        }
    }
}
