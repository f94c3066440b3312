//! `logging_s3` block: log streaming to an S3 bucket

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde::{Deserialize, Serialize};

use super::CollectionEntity;

pub const ACCESS_KEY_ENV: &str = "FASTLY_S3_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "FASTLY_S3_SECRET_KEY";
pub const DEFAULT_DOMAIN: &str = "s3.amazonaws.com";
pub const DEFAULT_PERIOD: i64 = 3600;
pub const DEFAULT_FORMAT: &str = "%h %l %u %t \"%r\" %>s %b";
pub const REDUNDANCY: &[&str] = &[
    "standard",
    "intelligent_tiering",
    "standard_ia",
    "onezone_ia",
    "glacier",
    "glacier_ir",
    "deep_archive",
    "reduced_redundancy",
];

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingS3 {
    pub name: String,
    pub bucket_name: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_period")]
    pub period: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gzip_level: Option<i64>,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iam_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redundancy: Option<String>,
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_period() -> i64 {
    DEFAULT_PERIOD
}

fn default_format() -> String {
    DEFAULT_FORMAT.to_string()
}

impl std::fmt::Debug for LoggingS3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("LoggingS3")
            .field("name", &self.name)
            .field("bucket_name", &self.bucket_name)
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("period", &self.period)
            .field("gzip_level", &self.gzip_level)
            .field("format", &self.format)
            .field("access_key", &redacted(&self.access_key))
            .field("secret_key", &redacted(&self.secret_key))
            .field("iam_role", &self.iam_role)
            .field("redundancy", &self.redundancy)
            .finish()
    }
}

impl FromAttributes for LoggingS3 {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("logging_s3")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("bucket_name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("domain", AttributeType::String).with_default(DEFAULT_DOMAIN))
            .attribute(AttributeSchema::new("path", AttributeType::String))
            .attribute(
                AttributeSchema::new("period", types::positive_int())
                    .with_default(DEFAULT_PERIOD)
                    .with_description("Seconds between log file rotations"),
            )
            .attribute(AttributeSchema::new("gzip_level", AttributeType::Int))
            .attribute(AttributeSchema::new("format", AttributeType::String).with_default(DEFAULT_FORMAT))
            .attribute(
                AttributeSchema::new("access_key", AttributeType::String)
                    .sensitive()
                    .with_env_default(ACCESS_KEY_ENV)
                    .conflicts_with(&["iam_role"]),
            )
            .attribute(
                AttributeSchema::new("secret_key", AttributeType::String)
                    .sensitive()
                    .with_env_default(SECRET_KEY_ENV)
                    .conflicts_with(&["iam_role"]),
            )
            .attribute(
                AttributeSchema::new("iam_role", AttributeType::String)
                    .with_description("Role ARN; alternative to access_key and secret_key"),
            )
            .attribute(AttributeSchema::new("redundancy", types::one_of(REDUNDANCY)))
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let logging = Self {
            name: attrs.string("name")?,
            bucket_name: attrs.string("bucket_name")?,
            domain: attrs
                .opt_string("domain")?
                .unwrap_or_else(default_domain),
            path: attrs.opt_string("path")?,
            period: attrs.opt_int("period")?.unwrap_or(DEFAULT_PERIOD),
            gzip_level: attrs.opt_int("gzip_level")?,
            format: attrs
                .opt_string("format")?
                .unwrap_or_else(default_format),
            access_key: attrs.opt_string("access_key")?,
            secret_key: attrs.opt_string("secret_key")?,
            iam_role: attrs.opt_string("iam_role")?,
            redundancy: attrs.opt_string("redundancy")?,
        };

        if let Some(level) = logging.gzip_level
            && !(0..=9).contains(&level)
        {
            return Err(AttributeError::Conflict(format!(
                "logging_s3 '{}': gzip_level must be 0-9",
                logging.name
            )));
        }

        let has_keys = logging.access_key.is_some() && logging.secret_key.is_some();
        match (has_keys, logging.iam_role.is_some()) {
            (true, true) => Err(AttributeError::Conflict(format!(
                "logging_s3 '{}': iam_role conflicts with access_key and secret_key",
                logging.name
            ))),
            (false, false) => Err(AttributeError::Conflict(format!(
                "logging_s3 '{}': set access_key and secret_key (or {} and {}), or iam_role",
                logging.name, ACCESS_KEY_ENV, SECRET_KEY_ENV
            ))),
            _ => Ok(logging),
        }
    }
}

impl ToAttributes for LoggingS3 {
    fn to_attributes(&self) -> HashMap<String, Value> {
        AttributeMap::new()
            .set("name", self.name.as_str())
            .set("bucket_name", self.bucket_name.as_str())
            .set("domain", self.domain.as_str())
            .set_opt("path", self.path.as_deref())
            .set("period", self.period)
            .set_opt("gzip_level", self.gzip_level)
            .set("format", self.format.as_str())
            .set_opt("access_key", self.access_key.as_deref())
            .set_opt("secret_key", self.secret_key.as_deref())
            .set_opt("iam_role", self.iam_role.as_deref())
            .set_opt("redundancy", self.redundancy.as_deref())
            .build()
    }
}

impl CollectionEntity for LoggingS3 {
    const KEY: &'static str = "logging_s3";
    const PATH: &'static str = "logging/s3";

    fn name(&self) -> &str {
        &self.name
    }
}
