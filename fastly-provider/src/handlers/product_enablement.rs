//! `product_enablement` block: service-level product flags
//!
//! Products are not versioned. Each flag maps to
//! `/enabled-products/{product}/services/{id}`: PUT enables, DELETE disables
//! and a GET answering 404 means disabled.

use std::collections::HashMap;

use async_trait::async_trait;
use fastly_core::attrs::{AttributeError, AttributeMap, Attributes, FromAttributes, ToAttributes};
use fastly_core::differ::{Block, Modified};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema};
use serde_json::json;

use super::{HandlerError, HandlerResult, ServiceAttributeHandler, ServiceVersion};
use crate::client::{ApiError, FastlyApi, delete_ignoring_not_found, get_optional, segment};

pub const PRODUCTS: &[&str] = &[
    "brotli_compression",
    "domain_inspector",
    "image_optimizer",
    "origin_inspector",
    "websockets",
];

/// Name the single block is keyed by
pub const BLOCK_NAME: &str = "products";

const KEY: &str = "product_enablement";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductEnablement {
    /// Enabled products, in [`PRODUCTS`] order
    pub enabled: Vec<&'static str>,
}

impl ProductEnablement {
    pub fn is_enabled(&self, product: &str) -> bool {
        self.enabled.iter().any(|p| *p == product)
    }
}

impl FromAttributes for ProductEnablement {
    fn schema() -> ResourceSchema {
        PRODUCTS.iter().fold(
            ResourceSchema::new(KEY).attribute(
                AttributeSchema::new("name", AttributeType::String).with_default(BLOCK_NAME),
            ),
            |schema, product| schema.attribute(AttributeSchema::new(*product, AttributeType::Bool)),
        )
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let mut enabled = Vec::new();
        for product in PRODUCTS {
            if attrs.bool(product)? {
                enabled.push(*product);
            }
        }
        Ok(Self { enabled })
    }
}

impl ToAttributes for ProductEnablement {
    fn to_attributes(&self) -> HashMap<String, Value> {
        self.enabled
            .iter()
            .fold(AttributeMap::new().set("name", BLOCK_NAME), |map, product| {
                map.set(product, true)
            })
            .build()
    }
}

fn product_path(product: &str, service: &ServiceVersion) -> String {
    format!(
        "/enabled-products/{}/services/{}",
        product,
        segment(&service.service_id)
    )
}

fn api_error(source: ApiError) -> HandlerError {
    HandlerError::Api { kind: KEY, source }
}

fn parse(block: &Block) -> HandlerResult<ProductEnablement> {
    ProductEnablement::from_attributes(block)
        .map_err(|source| HandlerError::Attribute { kind: KEY, source })
}

async fn enable(api: &dyn FastlyApi, service: &ServiceVersion, product: &str) -> HandlerResult<()> {
    log::debug!("enabling {} on service {}", product, service.service_id);
    api.put(&product_path(product, service), json!({}))
        .await
        .map_err(api_error)?;
    Ok(())
}

async fn disable(
    api: &dyn FastlyApi,
    service: &ServiceVersion,
    product: &str,
) -> HandlerResult<()> {
    log::debug!("disabling {} on service {}", product, service.service_id);
    delete_ignoring_not_found(api, &product_path(product, service))
        .await
        .map_err(api_error)
}

pub struct ProductEnablementHandler;

#[async_trait]
impl ServiceAttributeHandler for ProductEnablementHandler {
    fn key(&self) -> &'static str {
        KEY
    }

    fn schema(&self) -> ResourceSchema {
        ProductEnablement::schema()
    }

    fn versioned(&self) -> bool {
        false
    }

    /// A block enabling nothing leaves no remote trace, so it reads back as
    /// no block at all
    fn normalize(&self, blocks: Vec<Block>) -> Vec<Block> {
        blocks
            .into_iter()
            .filter(|block| {
                PRODUCTS
                    .iter()
                    .any(|p| block.get(*p).and_then(Value::as_bool).unwrap_or(false))
            })
            .collect()
    }

    async fn create(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()> {
        for product in parse(block)?.enabled {
            enable(api, service, product).await?;
        }
        Ok(())
    }

    async fn read(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
    ) -> HandlerResult<Vec<Block>> {
        let mut products = ProductEnablement::default();
        for product in PRODUCTS {
            if get_optional(api, &product_path(product, service))
                .await
                .map_err(api_error)?
                .is_some()
            {
                products.enabled.push(*product);
            }
        }

        if products.enabled.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![products.to_attributes()])
    }

    async fn update(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        change: &Modified,
    ) -> HandlerResult<()> {
        let desired = parse(&change.new)?;
        for product in PRODUCTS {
            if !change.changes.contains_key(*product) {
                continue;
            }
            if desired.is_enabled(product) {
                enable(api, service, product).await?;
            } else {
                disable(api, service, product).await?;
            }
        }
        Ok(())
    }

    async fn delete(
        &self,
        api: &dyn FastlyApi,
        service: &ServiceVersion,
        block: &Block,
    ) -> HandlerResult<()> {
        for product in parse(block)?.enabled {
            disable(api, service, product).await?;
        }
        Ok(())
    }
}
