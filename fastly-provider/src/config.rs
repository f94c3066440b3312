//! Provider configuration
//!
//! Values set explicitly win; unset values fall back to the environment.

use std::collections::HashMap;

use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

pub const DEFAULT_BASE_URL: &str = "https://api.fastly.com";
pub const API_KEY_ENV: &str = "FASTLY_API_KEY";
pub const BASE_URL_ENV: &str = "FASTLY_API_URL";

/// Connection settings for the management API
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub user_agent: String,
}

// api_key is a credential; keep it out of debug output
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Build from provider block attributes, falling back to the process
    /// environment
    pub fn from_attributes_with_env(
        attributes: &HashMap<String, Value>,
    ) -> Result<Self, AttributeError> {
        Self::from_attributes_with_lookup(attributes, &|var: &str| std::env::var(var).ok())
    }

    /// Same as [`Self::from_attributes_with_env`] with an explicit lookup
    pub fn from_attributes_with_lookup<F>(
        attributes: &HashMap<String, Value>,
        env: &F,
    ) -> Result<Self, AttributeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut attributes = attributes.clone();
        Self::schema().apply_defaults(&mut attributes, env);
        Self::from_attributes(&attributes)
    }

    /// Configuration taken entirely from the environment
    pub fn from_env() -> Result<Self, AttributeError> {
        Self::from_attributes_with_env(&HashMap::new())
    }
}

impl FromAttributes for ProviderConfig {
    fn schema() -> ResourceSchema {
        ResourceSchema::new("provider")
            .attribute(
                AttributeSchema::new("api_key", AttributeType::String)
                    .required()
                    .sensitive()
                    .with_env_default(API_KEY_ENV)
                    .with_description("API token used for every request"),
            )
            .attribute(
                AttributeSchema::new("base_url", AttributeType::String)
                    .with_env_default(BASE_URL_ENV)
                    .with_default(DEFAULT_BASE_URL)
                    .with_description("Management API endpoint"),
            )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let api_key = attrs.string("api_key")?;
        if api_key.trim().is_empty() {
            return Err(AttributeError::Conflict(format!(
                "api_key must be set, either in configuration or with {}",
                API_KEY_ENV
            )));
        }
        Ok(Self {
            api_key,
            base_url: attrs
                .opt_string("base_url")?
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            user_agent: default_user_agent(),
        })
    }
}

fn default_user_agent() -> String {
    format!("fastly-provider/{}", env!("CARGO_PKG_VERSION"))
}
