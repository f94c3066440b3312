//! Cleanup of services left behind by acceptance tests

use serde::Deserialize;

use crate::client::{ApiError, ApiResult, delete_ignoring_not_found, segment};
use crate::registry::ClientRegistry;

/// Name prefix of services created by acceptance tests
pub const TEST_PREFIX: &str = "tf-test-";

#[derive(Debug, Deserialize)]
struct ServiceSummary {
    id: String,
    name: String,
}

/// Delete every service whose name starts with `prefix`
///
/// Returns how many services were deleted. Services that disappear while
/// sweeping count as deleted.
pub async fn sweep_services(
    registry: &ClientRegistry,
    key: &str,
    prefix: &str,
) -> ApiResult<usize> {
    let api = registry.get(key)?;
    let body = api.get("/service").await?;
    let services: Vec<ServiceSummary> = serde_json::from_value(body)
        .map_err(|e| ApiError::Decode(e.to_string()))?;

    let mut deleted = 0;
    for service in services.iter().filter(|s| s.name.starts_with(prefix)) {
        log::info!("sweeping service {} ({})", service.name, service.id);
        delete_ignoring_not_found(api.as_ref(), &format!("/service/{}", segment(&service.id)))
            .await?;
        deleted += 1;
    }

    log::info!("swept {} services with prefix {}", deleted, prefix);
    Ok(deleted)
}
