//! `snippet` block: VCL snippets injected into a subroutine

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, ResourceSchema, types};
use serde::{Deserialize, Serialize};

use super::CollectionEntity;

pub const SUBROUTINES: &[&str] = &[
    "init", "recv", "hash", "hit", "miss", "pass", "fetch", "error", "deliver", "log", "none",
];
pub const DEFAULT_PRIORITY: i64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub name: String,
    #[serde(rename = "type")]
    pub subroutine: String,
    pub content: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    DEFAULT_PRIORITY
}

impl FromAttributes for Snippet {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("snippet")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(
                AttributeSchema::new("type", types::one_of(SUBROUTINES))
                    .required()
                    .with_description("Subroutine the snippet is placed in"),
            )
            .attribute(AttributeSchema::new("content", types::non_empty_string()).required())
            .attribute(
                AttributeSchema::new("priority", types::positive_int())
                    .with_default(DEFAULT_PRIORITY),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        Ok(Self {
            name: attrs.string("name")?,
            subroutine: attrs.string("type")?,
            content: attrs.string("content")?,
            priority: attrs.opt_int("priority")?.unwrap_or(DEFAULT_PRIORITY),
        })
    }
}

impl ToAttributes for Snippet {
    fn to_attributes(&self) -> HashMap<String, Value> {
        AttributeMap::new()
            .set("name", self.name.as_str())
            .set("type", self.subroutine.as_str())
            .set("content", self.content.as_str())
            .set("priority", self.priority)
            .build()
    }
}

impl CollectionEntity for Snippet {
    const KEY: &'static str = "snippet";
    const PATH: &'static str = "snippet";

    fn name(&self) -> &str {
        &self.name
    }
}
