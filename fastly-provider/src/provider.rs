//! Fastly Provider implementation
//!
//! Dispatches each operation to the resource module owning the type and maps
//! their errors into `ProviderError` with the resource id attached.

use std::collections::HashMap;
use std::sync::Arc;

use fastly_core::attrs::FromAttributes;
use fastly_core::provider::{ProviderError, ProviderResult};
use fastly_core::resource::{Resource, ResourceId, State, Value};

use crate::client::{FastlyApi, FastlyClient};
use crate::config::ProviderConfig;
use crate::package_hash::{PackageHashConfig, package_hash};
use crate::resources::PACKAGE_HASH;
use crate::retry::RetryPolicy;
use crate::service::{self, ServiceVcl};
use crate::tls::{
    TlsCertificate, TlsSubscription, TlsSubscriptionValidation, certificate, subscription,
    validation,
};

/// Environment lookup used for attribute fallbacks
pub type EnvLookup = fn(&str) -> Option<String>;

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// Attach the resource id to any error
fn fail<E>(id: &ResourceId) -> impl FnOnce(E) -> ProviderError + '_
where
    E: std::error::Error + Send + Sync + 'static,
{
    move |e| ProviderError::from_cause(e).for_resource(id.clone())
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

fn gone_after_write(id: &ResourceId, identifier: &str) -> ProviderError {
    ProviderError::new(format!("{} not found right after it was written", identifier))
        .for_resource(id.clone())
}

/// Attributes the API never returns for a resource type
fn config_only(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        service::RESOURCE_TYPE => service::CONFIG_ONLY,
        certificate::RESOURCE_TYPE => certificate::CONFIG_ONLY,
        _ => &[],
    }
}

/// Recorded `activate`, which decides the service version that is read
fn recorded_activate(recorded: Option<&State>) -> bool {
    recorded
        .and_then(|state| state.attributes.get("activate"))
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// Copy configuration-only attributes from desired state
fn with_config_only(mut state: State, desired: &HashMap<String, Value>, keys: &[&str]) -> State {
    for key in keys {
        if let Some(value) = desired.get(*key) {
            state.attributes.insert(key.to_string(), value.clone());
        }
    }
    state
}

/// Fastly Provider
pub struct FastlyProvider {
    api: Arc<dyn FastlyApi>,
    env: EnvLookup,
    validation_policy: RetryPolicy,
}

impl FastlyProvider {
    /// Create a provider talking to the management API
    pub fn new(config: &ProviderConfig) -> ProviderResult<Self> {
        let client = FastlyClient::new(config).map_err(ProviderError::from_cause)?;
        log::debug!("using management API at {}", client.base_url());
        Ok(Self::with_api(Arc::new(client)))
    }

    /// Create a provider over any API implementation
    pub fn with_api(api: Arc<dyn FastlyApi>) -> Self {
        Self {
            api,
            env: process_env,
            validation_policy: RetryPolicy::TLS_VALIDATION,
        }
    }

    pub fn with_env_lookup(mut self, env: EnvLookup) -> Self {
        self.env = env;
        self
    }

    pub fn with_validation_policy(mut self, policy: RetryPolicy) -> Self {
        self.validation_policy = policy;
        self
    }

    fn api(&self) -> &dyn FastlyApi {
        self.api.as_ref()
    }

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Read a resource by its remote identifier
    ///
    /// Configuration-only attributes are carried over from `recorded`.
    pub async fn read_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        recorded: Option<&State>,
    ) -> ProviderResult<State> {
        let state = self
            .read_remote(id, identifier, recorded_activate(recorded))
            .await?;
        Ok(match recorded {
            Some(recorded) if state.exists => with_config_only(
                state,
                &recorded.attributes,
                config_only(&id.resource_type),
            ),
            _ => state,
        })
    }

    async fn read_remote(
        &self,
        id: &ResourceId,
        identifier: &str,
        activate: bool,
    ) -> ProviderResult<State> {
        let attributes = match id.resource_type.as_str() {
            service::RESOURCE_TYPE => service::read(self.api(), identifier, activate)
                .await
                .map_err(fail(id))?,
            certificate::RESOURCE_TYPE => certificate::read(self.api(), identifier)
                .await
                .map_err(fail(id))?,
            subscription::RESOURCE_TYPE => subscription::read(self.api(), identifier)
                .await
                .map_err(fail(id))?,
            validation::RESOURCE_TYPE => validation::read(self.api(), identifier)
                .await
                .map_err(fail(id))?
                .then(|| {
                    TlsSubscriptionValidation {
                        subscription_id: identifier.to_string(),
                    }
                    .attributes()
                }),
            PACKAGE_HASH => {
                return Err(ProviderError::new("package_hash is a data source")
                    .for_resource(id.clone()));
            }
            _ => return Err(unknown_type(id)),
        };

        Ok(match attributes {
            Some(attributes) => State::existing(id.clone(), attributes).with_identifier(identifier),
            None => {
                log::debug!("{} ({}) no longer exists", id, identifier);
                State::not_found(id.clone())
            }
        })
    }

    /// Evaluate a data source
    pub async fn read_data_source_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        if !resource.is_data_source() || id.resource_type != PACKAGE_HASH {
            return Err(
                ProviderError::new(format!("{} is not a data source", id.resource_type))
                    .for_resource(id.clone()),
            );
        }

        let config = PackageHashConfig::from_attributes(&resource.attributes).map_err(fail(id))?;
        let source = config.source.clone();
        let hash = tokio::task::spawn_blocking(move || package_hash(&source))
            .await
            .map_err(fail(id))?
            .map_err(fail(id))?;
        log::debug!("{} hashed to {}", id, hash);

        Ok(State::existing(id.clone(), config.state_attributes(&hash)).with_identifier(hash))
    }

    /// Create a resource
    pub async fn create_resource(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        log::info!("creating {}", id);

        match id.resource_type.as_str() {
            service::RESOURCE_TYPE => {
                let config =
                    ServiceVcl::from_config(&resource.attributes, &self.env).map_err(fail(id))?;
                let identifier = service::create(self.api(), &config)
                    .await
                    .map_err(fail(id))?;
                let state = self.read_existing(id, &identifier, config.activate).await?;
                Ok(with_config_only(
                    state,
                    &config.config_only_attributes(),
                    service::CONFIG_ONLY,
                ))
            }
            certificate::RESOURCE_TYPE => {
                let cert = TlsCertificate::from_attributes(&resource.attributes).map_err(fail(id))?;
                let identifier = certificate::create(self.api(), &cert)
                    .await
                    .map_err(fail(id))?;
                let state = self.read_existing(id, &identifier, true).await?;
                Ok(with_config_only(
                    state,
                    &resource.attributes,
                    certificate::CONFIG_ONLY,
                ))
            }
            subscription::RESOURCE_TYPE => {
                let sub = TlsSubscription::from_attributes(&resource.attributes).map_err(fail(id))?;
                let identifier = subscription::create(self.api(), &sub)
                    .await
                    .map_err(fail(id))?;
                self.read_existing(id, &identifier, true).await
            }
            validation::RESOURCE_TYPE => self.validate_subscription(resource).await,
            PACKAGE_HASH => Err(ProviderError::new("package_hash is a data source")
                .for_resource(id.clone())),
            _ => Err(unknown_type(id)),
        }
    }

    /// Update a resource in place
    pub async fn update_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> ProviderResult<State> {
        log::info!("updating {} ({})", id, identifier);

        match id.resource_type.as_str() {
            service::RESOURCE_TYPE => {
                let config =
                    ServiceVcl::from_config(&to.attributes, &self.env).map_err(fail(id))?;
                service::update(self.api(), identifier, &from.attributes, &config)
                    .await
                    .map_err(fail(id))?;
                let state = self.read_existing(id, identifier, config.activate).await?;
                Ok(with_config_only(
                    state,
                    &config.config_only_attributes(),
                    service::CONFIG_ONLY,
                ))
            }
            certificate::RESOURCE_TYPE => {
                let cert = TlsCertificate::from_attributes(&to.attributes).map_err(fail(id))?;
                certificate::update(self.api(), identifier, &from.attributes, &cert)
                    .await
                    .map_err(fail(id))?;
                let state = self.read_existing(id, identifier, true).await?;
                Ok(with_config_only(state, &to.attributes, certificate::CONFIG_ONLY))
            }
            subscription::RESOURCE_TYPE => {
                let sub = TlsSubscription::from_attributes(&to.attributes).map_err(fail(id))?;
                subscription::update(self.api(), identifier, &from.attributes, &sub)
                    .await
                    .map_err(fail(id))?;
                self.read_existing(id, identifier, true).await
            }
            // A different subscription id means waiting again
            validation::RESOURCE_TYPE => self.validate_subscription(to).await,
            PACKAGE_HASH => Err(ProviderError::new("package_hash is a data source")
                .for_resource(id.clone())),
            _ => Err(unknown_type(id)),
        }
    }

    /// Delete a resource
    pub async fn delete_resource(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> ProviderResult<()> {
        log::info!("deleting {} ({})", id, identifier);

        match id.resource_type.as_str() {
            service::RESOURCE_TYPE => {
                let force_destroy = from
                    .attributes
                    .get("force_destroy")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                service::delete(self.api(), identifier, force_destroy)
                    .await
                    .map_err(fail(id))
            }
            certificate::RESOURCE_TYPE => certificate::delete(self.api(), identifier)
                .await
                .map_err(fail(id)),
            subscription::RESOURCE_TYPE => subscription::delete(self.api(), identifier)
                .await
                .map_err(fail(id)),
            validation::RESOURCE_TYPE => Ok(()),
            PACKAGE_HASH => Err(ProviderError::new("package_hash is a data source")
                .for_resource(id.clone())),
            _ => Err(unknown_type(id)),
        }
    }

    async fn read_existing(
        &self,
        id: &ResourceId,
        identifier: &str,
        activate: bool,
    ) -> ProviderResult<State> {
        let state = self.read_remote(id, identifier, activate).await?;
        if !state.exists {
            return Err(gone_after_write(id, identifier));
        }
        Ok(state)
    }

    async fn validate_subscription(&self, resource: &Resource) -> ProviderResult<State> {
        let id = &resource.id;
        let config =
            TlsSubscriptionValidation::from_attributes(&resource.attributes).map_err(fail(id))?;
        validation::wait_for_issued(self.api(), &config, self.validation_policy)
            .await
            .map_err(fail(id))?;
        Ok(State::existing(id.clone(), config.attributes())
            .with_identifier(config.subscription_id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockApi, certificate_for, certificate_record};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn provider(api: Arc<MockApi>) -> FastlyProvider {
        FastlyProvider::with_api(api).with_env_lookup(no_env)
    }

    #[tokio::test]
    async fn unknown_type_is_an_error() {
        let provider = provider(Arc::new(MockApi::new()));
        let err = provider
            .read_resource(&ResourceId::new("dictionary", "x"), "abc", None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "[dictionary.x] Unknown resource type: dictionary");
    }

    #[tokio::test]
    async fn missing_service_reads_as_not_found() {
        let provider = provider(Arc::new(MockApi::new()));
        let state = provider
            .read_resource(&ResourceId::new("service_vcl", "demo"), "gone", None)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn invalid_config_fails_before_any_call() {
        let api = Arc::new(MockApi::new());
        let provider = provider(api.clone());
        let resource = Resource::new("service_vcl", "demo").with_attribute("comment", "no name");

        let err = provider.create_resource(&resource).await.unwrap_err();

        assert!(err.to_string().starts_with("[service_vcl.demo]"));
        assert!(err.to_string().contains("Required attribute 'name' is missing"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn service_create_records_config_only_settings() {
        let api = Arc::new(MockApi::new());
        api.ok("POST", "/service", json!({"id": "svc1"}));
        api.ok(
            "GET",
            "/service/svc1/details",
            json!({"id": "svc1", "name": "demo", "active_version": {"number": 1}, "version": {"number": 1}}),
        );
        for kind in ["backend", "header", "healthcheck", "snippet", "logging/s3"] {
            api.ok("GET", &format!("/service/svc1/version/1/{}", kind), json!([]));
        }
        let provider = provider(api.clone());
        let resource = Resource::new("service_vcl", "demo")
            .with_attribute("name", "demo")
            .with_attribute("force_destroy", true);

        let state = provider.create_resource(&resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("svc1"));
        assert_eq!(state.attributes.get("active_version"), Some(&Value::Int(1)));
        assert_eq!(state.attributes.get("force_destroy"), Some(&Value::Bool(true)));
        assert_eq!(state.attributes.get("activate"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn service_delete_uses_recorded_force_destroy() {
        let api = Arc::new(MockApi::new());
        api.ok(
            "GET",
            "/service/svc1/details",
            json!({"id": "svc1", "name": "demo", "active_version": {"number": 2}}),
        );
        let provider = provider(api.clone());
        let id = ResourceId::new("service_vcl", "demo");
        let mut recorded = HashMap::new();
        recorded.insert("force_destroy".to_string(), Value::Bool(true));
        let from = State::existing(id.clone(), recorded);

        provider.delete_resource(&id, "svc1", &from).await.unwrap();

        assert_eq!(
            api.writes(),
            vec!["PUT /service/svc1/version/2/deactivate", "DELETE /service/svc1"]
        );
    }

    #[tokio::test]
    async fn refresh_of_a_draft_service_reads_the_latest_version() {
        let api = Arc::new(MockApi::new());
        api.ok(
            "GET",
            "/service/svc1/details",
            json!({"id": "svc1", "name": "demo", "active_version": {"number": 2}, "version": {"number": 3}}),
        );
        api.ok(
            "GET",
            "/service/svc1/version/3/backend",
            json!([{"name": "origin", "address": "origin.example.com", "port": 443}]),
        );
        for kind in ["header", "healthcheck", "snippet", "logging/s3"] {
            api.ok("GET", &format!("/service/svc1/version/3/{}", kind), json!([]));
        }
        let provider = provider(api.clone());
        let id = ResourceId::new("service_vcl", "demo");
        let mut attributes = HashMap::new();
        attributes.insert("activate".to_string(), Value::Bool(false));
        let recorded = State::existing(id.clone(), attributes);

        let state = provider
            .read_resource(&id, "svc1", Some(&recorded))
            .await
            .unwrap();

        assert_eq!(state.attributes.get("activate"), Some(&Value::Bool(false)));
        assert!(state.attributes.contains_key("backend"));
        assert!(
            api.call_log()
                .iter()
                .all(|call| !call.contains("/version/2/"))
        );
    }

    #[tokio::test]
    async fn certificate_state_keeps_the_body() {
        let api = Arc::new(MockApi::new());
        let record = certificate_record("cert1", "edge", &["example.com"]);
        api.ok("POST", "/tls/certificates", record.clone());
        api.ok("GET", "/tls/certificates/cert1", record);
        let provider = provider(api);
        let body = certificate_for("example.com");
        let resource = Resource::new("tls_certificate", "edge")
            .with_attribute("name", "edge")
            .with_attribute("certificate_body", body.as_str());

        let state = provider.create_resource(&resource).await.unwrap();

        assert_eq!(state.identifier.as_deref(), Some("cert1"));
        assert_eq!(
            state.attributes.get("certificate_body"),
            Some(&Value::String(body))
        );
        assert_eq!(state.attributes.get("issuer"), Some(&Value::from("Fixture CA")));
    }

    #[tokio::test]
    async fn package_hash_data_source() {
        let provider = provider(Arc::new(MockApi::new()));
        // gzip of an empty tar (two zero blocks)
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, &[0u8; 1024]).unwrap();
        let package = encoder.finish().unwrap();

        let resource = Resource::new("package_hash", "pkg")
            .with_attribute("content", STANDARD.encode(&package))
            .with_read_only(true);

        let state = provider.read_data_source_resource(&resource).await.unwrap();
        let expected = hex::encode(<sha2::Sha512 as sha2::Digest>::digest(b""));
        assert_eq!(state.identifier.as_deref(), Some(expected.as_str()));
        assert_eq!(state.attributes.get("hash"), Some(&Value::String(expected)));
    }

    #[tokio::test]
    async fn package_hash_requires_exactly_one_source() {
        let provider = provider(Arc::new(MockApi::new()));
        let resource = Resource::new("package_hash", "pkg").with_read_only(true);
        let err = provider
            .read_data_source_resource(&resource)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("one of content, filename must be set"));
    }

    #[tokio::test(start_paused = true)]
    async fn validation_waits_then_records_subscription() {
        let api = Arc::new(MockApi::new());
        api.ok(
            "GET",
            "/tls/subscriptions/sub1",
            json!({"data": {"id": "sub1", "attributes": {"state": "pending"}}}),
        )
        .ok(
            "GET",
            "/tls/subscriptions/sub1",
            json!({"data": {"id": "sub1", "attributes": {"state": "issued"}}}),
        );
        let provider = provider(api);
        let resource =
            Resource::new("tls_subscription_validation", "wait").with_attribute("subscription_id", "sub1");

        let state = provider.create_resource(&resource).await.unwrap();
        assert_eq!(state.identifier.as_deref(), Some("sub1"));
    }
}
