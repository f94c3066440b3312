//! Fastly Provider
//!
//! Manages VCL services, TLS certificates and subscriptions through the
//! Fastly management API, and hashes Compute packages.
//!
//! ## Module Structure
//!
//! - `client` - Management API client and the `FastlyApi` seam
//! - `config` - Provider configuration
//! - `handlers` - Nested service blocks (backends, headers, ...)
//! - `service` - `service_vcl` lifecycle and versioning
//! - `tls` - TLS certificates, subscriptions and validation waits
//! - `package_hash` - `package_hash` data source
//! - `resources` - Resource type definitions
//! - `provider` - FastlyProvider dispatch
//! - `retry` - Backoff for long-running waits
//! - `registry`, `sweeper` - Test-account housekeeping

pub mod client;
pub mod config;
pub mod handlers;
pub mod package_hash;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod retry;
pub mod service;
pub mod sweeper;
pub mod tls;

#[cfg(test)]
mod testing;

// Re-export main types
pub use client::{ApiError, FastlyApi, FastlyClient};
pub use config::ProviderConfig;
pub use provider::FastlyProvider;

use fastly_core::provider::{BoxFuture, Provider, ProviderResult, ResourceType};
use fastly_core::resource::{Resource, ResourceId, State};

use resources::resource_types;

/// Log filter variable read by [`init_logging`]
pub const LOG_ENV: &str = "FASTLY_LOG";

/// Initialize env_logger from `FASTLY_LOG`, defaulting to `warn`
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().filter_or(LOG_ENV, "warn"))
        .try_init();
}

// =============================================================================
// Provider Trait Implementation
// =============================================================================

impl Provider for FastlyProvider {
    fn name(&self) -> &'static str {
        "fastly"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: &str,
        recorded: Option<&State>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let recorded = recorded.cloned();
        Box::pin(async move {
            self.read_resource(&id, &identifier, recorded.as_ref())
                .await
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.read_data_source_resource(&resource).await })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move { self.create_resource(&resource).await })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move { self.update_resource(&id, &identifier, &from, &to).await })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        Box::pin(async move { self.delete_resource(&id, &identifier, &from).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use std::sync::Arc;

    #[tokio::test]
    async fn provider_trait_dispatches_to_fastly_provider() {
        let provider: Box<dyn Provider> =
            Box::new(FastlyProvider::with_api(Arc::new(MockApi::new())));

        assert_eq!(provider.name(), "fastly");
        assert_eq!(provider.resource_types().len(), 5);

        let state = provider
            .read(&ResourceId::new("tls_certificate", "edge"), "missing", None)
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[test]
    fn init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
