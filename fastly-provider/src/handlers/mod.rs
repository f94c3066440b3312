//! Service attribute handlers
//!
//! A VCL service carries repeated blocks (backends, headers, snippets, ...).
//! Each block kind has a handler implementing [`ServiceAttributeHandler`];
//! the service resource runs [`process_blocks`] for every kind whenever the
//! desired blocks differ from the remote ones.
//!
//! Most kinds are plain collections under
//! `/service/{id}/version/{version}/{kind}` and share [`CollectionHandler`].

pub mod backend;
pub mod header;
pub mod healthcheck;
pub mod logging_s3;
pub mod product_enablement;
pub mod snippet;

use std::marker::PhantomData;

use async_trait::async_trait;
use fastly_core::attrs::{AttributeError, Attributes, FromAttributes, ToAttributes};
use fastly_core::differ::{Block, DiffError, Modified, SetDiff};
use fastly_core::schema::ResourceSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as Json;

use crate::client::{ApiError, FastlyApi, delete_ignoring_not_found, segment};

pub use backend::Backend;
pub use header::Header;
pub use healthcheck::Healthcheck;
pub use logging_s3::LoggingS3;
pub use product_enablement::{ProductEnablement, ProductEnablementHandler};
pub use snippet::Snippet;

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("{kind}: {source}")]
    Attribute {
        kind: &'static str,
        #[source]
        source: AttributeError,
    },

    #[error("{kind}: {source}")]
    Diff {
        kind: &'static str,
        #[source]
        source: DiffError,
    },

    #[error("{kind}: {source}")]
    Api {
        kind: &'static str,
        #[source]
        source: ApiError,
    },

    #[error("{kind}: unexpected response: {message}")]
    Response { kind: &'static str, message: String },
}

pub type HandlerResult<T> = Result<T, HandlerError>;

/// Service and version a handler operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVersion {
    pub service_id: String,
    pub version: i64,
}

impl ServiceVersion {
    pub fn new(service_id: impl Into<String>, version: i64) -> Self {
        Self {
            service_id: service_id.into(),
            version,
        }
    }

    /// `/service/{id}/version/{version}/{kind}`
    pub fn collection_path(&self, kind: &str) -> String {
        format!(
            "/service/{}/version/{}/{}",
            segment(&self.service_id),
            self.version,
            kind
        )
    }

    /// `/service/{id}/version/{version}/{kind}/{name}`
    pub fn entity_path(&self, kind: &str, name: &str) -> String {
        format!("{}/{}", self.collection_path(kind), segment(name))
    }
}

/// CRUD for one block kind of a service
#[async_trait]
pub trait ServiceAttributeHandler: Send + Sync {
    /// Attribute key on the service resource
    fn key(&self) -> &'static str;

    /// Schema of one block
    fn schema(&self) -> ResourceSchema;

    /// Whether changes need a new service version
    fn versioned(&self) -> bool {
        true
    }

    /// Desired blocks in the shape they read back as
    fn normalize(&self, blocks: Vec<Block>) -> Vec<Block> {
        blocks
    }

    async fn create(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()>;

    /// Remote blocks, flattened and pruned of zero values
    async fn read(&self, api: &dyn FastlyApi, service: &ServiceVersion)
    -> HandlerResult<Vec<Block>>;

    async fn update(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        change: &Modified,
    ) -> HandlerResult<()>;

    async fn delete(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()>;
}

/// Reconcile one block kind: deletes first, then creates, then updates
///
/// Returns whether any call was made.
pub async fn process_blocks(
    handler: &dyn ServiceAttributeHandler,
    api: &dyn FastlyApi,
    service: &ServiceVersion,
    old: &[Block],
    new: &[Block],
) -> HandlerResult<bool> {
    let diff = SetDiff::by_name()
        .diff(old, new)
        .map_err(|source| HandlerError::Diff {
            kind: handler.key(),
            source,
        })?;

    if !diff.is_change() {
        return Ok(false);
    }

    log::debug!(
        "{} on service {} version {}: {} added, {} deleted, {} modified",
        handler.key(),
        service.service_id,
        service.version,
        diff.added.len(),
        diff.deleted.len(),
        diff.modified.len()
    );

    for block in &diff.deleted {
        handler.delete(api, service, block).await?;
    }
    for block in &diff.added {
        handler.create(api, service, block).await?;
    }
    for change in &diff.modified {
        handler.update(api, service, change).await?;
    }

    Ok(true)
}

/// Every handler, in processing order
///
/// Healthchecks come before backends since backends reference them by name.
pub fn all_handlers() -> Vec<Box<dyn ServiceAttributeHandler>> {
    vec![
        Box::new(CollectionHandler::<Healthcheck>::new()),
        Box::new(CollectionHandler::<Backend>::new()),
        Box::new(CollectionHandler::<Header>::new()),
        Box::new(CollectionHandler::<Snippet>::new()),
        Box::new(CollectionHandler::<LoggingS3>::new()),
        Box::new(ProductEnablementHandler),
    ]
}

/// A block stored as a named collection entity on a service version
///
/// The API model is the serde representation: request bodies serialize the
/// struct, responses deserialize into it.
pub trait CollectionEntity:
    FromAttributes + ToAttributes + Serialize + DeserializeOwned + Send + Sync
{
    /// Attribute key on the service resource
    const KEY: &'static str;
    /// Path segment of the collection
    const PATH: &'static str;

    fn name(&self) -> &str;

    /// API field carrying an attribute, when the two names differ
    fn api_field(attribute: &str) -> &str {
        attribute
    }
}

/// Deserialize `null` as the type's default
pub(crate) fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

pub struct CollectionHandler<T> {
    _entity: PhantomData<fn() -> T>,
}

impl<T> CollectionHandler<T> {
    pub fn new() -> Self {
        Self {
            _entity: PhantomData,
        }
    }
}

impl<T> Default for CollectionHandler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: CollectionEntity> CollectionHandler<T> {
    fn entity(&self, block: &Block) -> HandlerResult<T> {
        T::from_attributes(block).map_err(|source| HandlerError::Attribute {
            kind: T::KEY,
            source,
        })
    }

    fn body(&self, entity: &T) -> HandlerResult<Json> {
        serde_json::to_value(entity).map_err(|e| HandlerError::Response {
            kind: T::KEY,
            message: e.to_string(),
        })
    }

    fn api_error(source: ApiError) -> HandlerError {
        HandlerError::Api {
            kind: T::KEY,
            source,
        }
    }
}

#[async_trait]
impl<T: CollectionEntity> ServiceAttributeHandler for CollectionHandler<T> {
    fn key(&self) -> &'static str {
        T::KEY
    }

    fn schema(&self) -> ResourceSchema {
        T::schema()
    }

    async fn create(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()> {
        let entity = self.entity(block)?;
        log::debug!("creating {} '{}'", T::KEY, entity.name());
        api.post(&service.collection_path(T::PATH), self.body(&entity)?)
            .await
            .map_err(Self::api_error)?;
        Ok(())
    }

    async fn read(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
    ) -> HandlerResult<Vec<Block>> {
        let body = api
            .get(&service.collection_path(T::PATH))
            .await
            .map_err(Self::api_error)?;

        let entities: Vec<T> = match body {
            Json::Null => Vec::new(),
            body => serde_json::from_value(body).map_err(|e| HandlerError::Response {
                kind: T::KEY,
                message: e.to_string(),
            })?,
        };

        Ok(entities.iter().map(ToAttributes::to_attributes).collect())
    }

    async fn update(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        change: &Modified,
    ) -> HandlerResult<()> {
        // Validates the whole desired block, not only the changed fields
        self.entity(&change.new)?;

        let body: serde_json::Map<String, Json> = change
            .changes
            .iter()
            .map(|(name, value)| (T::api_field(name).to_string(), value.to_json()))
            .collect();
        log::debug!(
            "updating {} '{}': {}",
            T::KEY,
            change.key,
            change.changed_names().join(", ")
        );
        api.put(
            &service.entity_path(T::PATH, &change.key),
            Json::Object(body),
        )
        .await
        .map_err(Self::api_error)?;
        Ok(())
    }

    async fn delete(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()> {
        let name = Attributes::new(block)
            .string("name")
            .map_err(|source| HandlerError::Attribute {
                kind: T::KEY,
                source,
            })?;
        log::debug!("deleting {} '{}'", T::KEY, name);
        delete_ignoring_not_found(api, &service.entity_path(T::PATH, &name))
            .await
            .map_err(Self::api_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;
    use fastly_core::resource::Value;
    use serde_json::json;

    fn backend(name: &str, address: &str, port: i64) -> Block {
        let mut block = Block::new();
        block.insert("name".to_string(), Value::from(name));
        block.insert("address".to_string(), Value::from(address));
        block.insert("port".to_string(), Value::Int(port));
        block
    }

    fn service() -> ServiceVersion {
        ServiceVersion::new("svc1", 2)
    }

    #[test]
    fn paths_encode_entity_names() {
        assert_eq!(
            service().entity_path("backend", "my origin"),
            "/service/svc1/version/2/backend/my%20origin"
        );
    }

    #[tokio::test]
    async fn process_blocks_orders_deletes_creates_updates() {
        let api = MockApi::new();
        let handler = CollectionHandler::<Backend>::new();

        let old = vec![
            backend("legacy", "old.example.com", 80),
            backend("origin", "origin.example.com", 80),
        ];
        let new = vec![
            backend("origin", "origin.example.com", 443),
            backend("api", "api.example.com", 8080),
        ];

        let changed = process_blocks(&handler, &api, &service(), &old, &new)
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(
            api.call_log(),
            vec![
                "DELETE /service/svc1/version/2/backend/legacy",
                "POST /service/svc1/version/2/backend",
                "PUT /service/svc1/version/2/backend/origin",
            ]
        );
        assert_eq!(
            api.body_of("PUT", "/service/svc1/version/2/backend/origin"),
            Some(json!({"port": 443}))
        );
    }

    #[tokio::test]
    async fn unchanged_blocks_make_no_calls() {
        let api = MockApi::new();
        let handler = CollectionHandler::<Backend>::new();
        let blocks = vec![backend("origin", "origin.example.com", 80)];

        let changed = process_blocks(&handler, &api, &service(), &blocks, &blocks)
            .await
            .unwrap();

        assert!(!changed);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_names_fail_before_any_call() {
        let api = MockApi::new();
        let handler = CollectionHandler::<Backend>::new();
        let new = vec![
            backend("origin", "a.example.com", 80),
            backend("origin", "b.example.com", 80),
        ];

        let err = process_blocks(&handler, &api, &service(), &[], &new)
            .await
            .unwrap_err();

        assert!(matches!(err, HandlerError::Diff { kind: "backend", .. }));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn delete_of_missing_entity_succeeds() {
        let api = MockApi::new();
        api.status("DELETE", "/service/svc1/version/2/backend/origin", 404);
        let handler = CollectionHandler::<Backend>::new();

        handler
            .delete(&api, &service(), &backend("origin", "origin.example.com", 80))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn api_errors_name_the_block_kind() {
        let api = MockApi::new();
        api.status("POST", "/service/svc1/version/2/backend", 400);
        let handler = CollectionHandler::<Backend>::new();

        let err = handler
            .create(&api, &service(), &backend("origin", "origin.example.com", 80))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "backend: HTTP 400: scripted");
    }

    #[test]
    fn handlers_have_distinct_keys() {
        let mut keys: Vec<&str> = all_handlers().iter().map(|h| h.key()).collect();
        let count = keys.len();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), count);
    }
}
