//! `service_vcl` resource
//!
//! A service owns numbered versions; configuration lives on a version and
//! only one version is active. Creating a service configures version 1.
//! Changing blocks clones the active version, applies the block diffs to the
//! clone and activates it. Renaming is a plain update of the service itself.

use std::collections::{BTreeMap, HashMap};

use fastly_core::attrs::{AttributeError, Attributes, FromAttributes};
use fastly_core::differ::{Block, SetDiff};
use fastly_core::resource::Value;
use fastly_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use serde::Deserialize;
use serde_json::{Value as Json, json};

use crate::client::{ApiError, FastlyApi, delete_ignoring_not_found, get_optional, segment};
use crate::handlers::{
    HandlerError, ServiceAttributeHandler, ServiceVersion, all_handlers, null_default,
    process_blocks,
};

pub const RESOURCE_TYPE: &str = "service_vcl";

/// Attributes that live only in configuration
pub const CONFIG_ONLY: &[&str] = &["activate", "force_destroy"];

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Attribute(#[from] AttributeError),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("unexpected response: {0}")]
    Response(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Desired configuration of a VCL service
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceVcl {
    pub name: String,
    pub comment: Option<String>,
    pub activate: bool,
    pub force_destroy: bool,
    /// Desired blocks per handler key, normalized
    pub blocks: BTreeMap<&'static str, Vec<Block>>,
}

impl ServiceVcl {
    /// Apply defaults and environment fallbacks, then validate and convert
    pub fn from_config<F>(attributes: &HashMap<String, Value>, env: &F) -> ServiceResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut attributes = attributes.clone();
        Self::schema().apply_defaults(&mut attributes, env);
        Ok(Self::from_attributes(&attributes)?)
    }

    pub fn blocks_for(&self, key: &str) -> &[Block] {
        self.blocks.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Attributes that exist only in configuration and never read back
    pub fn config_only_attributes(&self) -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert("activate".to_string(), Value::Bool(self.activate));
        if self.force_destroy {
            attrs.insert("force_destroy".to_string(), Value::Bool(true));
        }
        attrs
    }
}

impl FromAttributes for ServiceVcl {
    fn schema() -> ResourceSchema {
        let schema = ResourceSchema::new(RESOURCE_TYPE)
            .with_description("VCL service and the blocks configured on its versions")
            .attribute(AttributeSchema::new("name", types::non_empty_string()).required())
            .attribute(AttributeSchema::new("comment", AttributeType::String))
            .attribute(
                AttributeSchema::new("activate", AttributeType::Bool)
                    .with_default(true)
                    .with_description("Activate the version carrying the changes"),
            )
            .attribute(
                AttributeSchema::new("force_destroy", AttributeType::Bool)
                    .with_description("Deactivate the active version before deleting"),
            )
            .attribute(AttributeSchema::new("active_version", AttributeType::Int).computed())
            .attribute(AttributeSchema::new("cloned_version", AttributeType::Int).computed());

        all_handlers().iter().fold(schema, |schema, handler| {
            schema.attribute(AttributeSchema::new(
                handler.key(),
                AttributeType::block_list(handler.schema()),
            ))
        })
    }

    fn from_validated(attrs: Attributes<'_>) -> Result<Self, AttributeError> {
        let mut blocks = BTreeMap::new();
        for handler in all_handlers() {
            let desired: Vec<Block> = attrs
                .blocks(handler.key())?
                .into_iter()
                .cloned()
                .collect();
            blocks.insert(handler.key(), handler.normalize(desired));
        }

        Ok(Self {
            name: attrs.string("name")?,
            comment: attrs.opt_string("comment")?,
            activate: attrs.opt_bool("activate")?.unwrap_or(true),
            force_destroy: attrs.bool("force_destroy")?,
            blocks,
        })
    }
}

#[derive(Debug, Deserialize)]
struct VersionRef {
    number: i64,
}

#[derive(Debug, Deserialize)]
struct ServiceDetails {
    id: String,
    name: String,
    #[serde(default, deserialize_with = "null_default")]
    comment: String,
    #[serde(default)]
    active_version: Option<VersionRef>,
    /// Latest version
    #[serde(default)]
    version: Option<VersionRef>,
    #[serde(default)]
    deleted_at: Option<String>,
}

impl ServiceDetails {
    /// Version configuration is read from and cloned from
    ///
    /// Activating services work on the active version. Services that are
    /// never activated accumulate their changes in the latest draft.
    fn working_version(&self, activate: bool) -> Option<i64> {
        let (first, second) = if activate {
            (&self.active_version, &self.version)
        } else {
            (&self.version, &self.active_version)
        };
        first.as_ref().or(second.as_ref()).map(|v| v.number)
    }
}

fn service_path(id: &str) -> String {
    format!("/service/{}", segment(id))
}

fn version_path(id: &str, version: i64, action: &str) -> String {
    format!("{}/version/{}/{}", service_path(id), version, action)
}

async fn details(api: &dyn FastlyApi, id: &str) -> ServiceResult<Option<ServiceDetails>> {
    let Some(body) = get_optional(api, &format!("{}/details", service_path(id))).await? else {
        return Ok(None);
    };
    let details: ServiceDetails =
        serde_json::from_value(body).map_err(|e| ServiceError::Response(e.to_string()))?;
    if details.deleted_at.is_some() {
        return Ok(None);
    }
    Ok(Some(details))
}

async fn activate(api: &dyn FastlyApi, id: &str, version: i64) -> ServiceResult<()> {
    api.put(&version_path(id, version, "activate"), json!({}))
        .await?;
    log::info!("activated service {} version {}", id, version);
    Ok(())
}

fn number_of(body: &Json, what: &str) -> ServiceResult<i64> {
    body.get("number")
        .and_then(Json::as_i64)
        .ok_or_else(|| ServiceError::Response(format!("{} has no version number", what)))
}

/// Create the service, configure version 1 and activate it when asked
///
/// Returns the new service id.
pub async fn create(api: &dyn FastlyApi, config: &ServiceVcl) -> ServiceResult<String> {
    let body = api
        .post(
            "/service",
            json!({
                "name": config.name,
                "comment": config.comment.clone().unwrap_or_default(),
                "type": "vcl",
            }),
        )
        .await?;
    let id = body
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| ServiceError::Response("created service has no id".to_string()))?
        .to_string();
    log::info!("created service {} ({})", config.name, id);

    let version = ServiceVersion::new(&id, 1);
    if let Err(e) = configure_version(api, &version, &[], config, false).await {
        log::warn!("service {} was created but configuring it failed", id);
        return Err(e);
    }
    Ok(id)
}

async fn configure_version(
    api: &dyn FastlyApi,
    version: &ServiceVersion,
    old: &[(&'static str, Vec<Block>)],
    config: &ServiceVcl,
    versioned_only: bool,
) -> ServiceResult<()> {
    for handler in all_handlers() {
        if versioned_only && !handler.versioned() {
            continue;
        }
        let previous = old
            .iter()
            .find(|(key, _)| *key == handler.key())
            .map(|(_, blocks)| blocks.as_slice())
            .unwrap_or(&[]);
        process_blocks(
            handler.as_ref(),
            api,
            version,
            previous,
            config.blocks_for(handler.key()),
        )
        .await?;
    }

    if config.activate {
        activate(api, &version.service_id, version.version).await?;
    }
    Ok(())
}

/// Current remote attributes, or None when the service is gone
///
/// Blocks come from the active version, or from the latest draft when the
/// service is configured not to activate.
pub async fn read(
    api: &dyn FastlyApi,
    id: &str,
    activate: bool,
) -> ServiceResult<Option<HashMap<String, Value>>> {
    let Some(details) = details(api, id).await? else {
        return Ok(None);
    };

    let mut attrs = HashMap::new();
    attrs.insert("name".to_string(), Value::String(details.name.clone()));
    if !details.comment.is_empty() {
        attrs.insert("comment".to_string(), Value::String(details.comment.clone()));
    }
    if let Some(active) = &details.active_version {
        attrs.insert("active_version".to_string(), Value::Int(active.number));
    }
    if let Some(latest) = &details.version {
        attrs.insert("cloned_version".to_string(), Value::Int(latest.number));
    }

    if let Some(version) = details.working_version(activate) {
        let version = ServiceVersion::new(&details.id, version);
        for handler in all_handlers() {
            let blocks = handler.read(api, &version).await?;
            if !blocks.is_empty() {
                attrs.insert(
                    handler.key().to_string(),
                    Value::List(blocks.into_iter().map(Value::Map).collect()),
                );
            }
        }
    }

    Ok(Some(attrs))
}

/// Recorded blocks per handler key
fn recorded_blocks(
    handlers: &[Box<dyn ServiceAttributeHandler>],
    from: &HashMap<String, Value>,
) -> Vec<(&'static str, Vec<Block>)> {
    handlers
        .iter()
        .map(|handler| {
            let blocks = match from.get(handler.key()) {
                Some(Value::List(items)) => items
                    .iter()
                    .filter_map(|item| match item {
                        Value::Map(block) => Some(block.clone()),
                        _ => None,
                    })
                    .collect(),
                _ => Vec::new(),
            };
            (handler.key(), blocks)
        })
        .collect()
}

/// Bring the service from its recorded attributes to `to`
pub async fn update(
    api: &dyn FastlyApi,
    id: &str,
    from: &HashMap<String, Value>,
    to: &ServiceVcl,
) -> ServiceResult<()> {
    let recorded_name = from.get("name").and_then(Value::as_str);
    let recorded_comment = from.get("comment").and_then(Value::as_str).unwrap_or("");
    let desired_comment = to.comment.as_deref().unwrap_or("");
    if recorded_name != Some(to.name.as_str()) || recorded_comment != desired_comment {
        api.put(
            &service_path(id),
            json!({"name": to.name, "comment": desired_comment}),
        )
        .await?;
        log::debug!("updated service {} name/comment", id);
    }

    let handlers = all_handlers();
    let old = recorded_blocks(&handlers, from);
    let mut versioned_changed = false;
    let mut unversioned = Vec::new();
    for (handler, (key, previous)) in handlers.iter().zip(&old) {
        let diff = SetDiff::by_name()
            .diff(previous, to.blocks_for(key))
            .map_err(|source| HandlerError::Diff { kind: *key, source })?;
        if !diff.is_change() {
            continue;
        }
        if handler.versioned() {
            versioned_changed = true;
        } else {
            unversioned.push((handler.as_ref(), previous.as_slice()));
        }
    }
    if !versioned_changed && unversioned.is_empty() {
        return Ok(());
    }

    let details = details(api, id)
        .await?
        .ok_or_else(|| ServiceError::Response(format!("service {} no longer exists", id)))?;
    let base = details
        .working_version(to.activate)
        .ok_or_else(|| ServiceError::Response(format!("service {} has no versions", id)))?;

    // Service-level settings apply in place, without a new version
    let current = ServiceVersion::new(id, base);
    for (handler, previous) in unversioned {
        process_blocks(handler, api, &current, previous, to.blocks_for(handler.key())).await?;
    }
    if !versioned_changed {
        return Ok(());
    }

    let cloned = api.put(&version_path(id, base, "clone"), json!({})).await?;
    let version = number_of(&cloned, "cloned version")?;
    log::info!("cloned service {} version {} to {}", id, base, version);

    configure_version(api, &ServiceVersion::new(id, version), &old, to, true).await
}

/// Delete the service; deactivates the active version first when forced
pub async fn delete(api: &dyn FastlyApi, id: &str, force_destroy: bool) -> ServiceResult<()> {
    if force_destroy {
        match details(api, id).await? {
            None => return Ok(()),
            Some(details) => {
                if let Some(active) = details.active_version {
                    api.put(&version_path(id, active.number, "deactivate"), json!({}))
                        .await?;
                    log::info!("deactivated service {} version {}", id, active.number);
                }
            }
        }
    }

    delete_ignoring_not_found(api, &service_path(id)).await?;
    log::info!("deleted service {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockApi;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn backend(name: &str, port: i64) -> Value {
        let mut block = HashMap::new();
        block.insert("name".to_string(), Value::from(name));
        block.insert("address".to_string(), Value::from("origin.example.com"));
        block.insert("port".to_string(), Value::Int(port));
        Value::Map(block)
    }

    fn config(backends: Vec<Value>) -> ServiceVcl {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("tf-test-demo"));
        attrs.insert("backend".to_string(), Value::List(backends));
        ServiceVcl::from_config(&attrs, &no_env).unwrap()
    }

    fn details_body(active: Option<i64>, latest: i64) -> Json {
        json!({
            "id": "svc1",
            "name": "tf-test-demo",
            "comment": "",
            "active_version": active.map(|n| json!({"number": n})),
            "version": {"number": latest},
            "deleted_at": null
        })
    }

    #[test]
    fn defaults_apply_to_service_and_blocks() {
        let config = config(vec![backend("origin", 443)]);
        assert!(config.activate);
        assert!(!config.force_destroy);
        let backends = config.blocks_for("backend");
        assert_eq!(backends.len(), 1);
        assert_eq!(backends[0].get("weight"), Some(&Value::Int(100)));
        assert!(config.blocks_for("header").is_empty());
    }

    #[test]
    fn invalid_block_fails_before_any_call() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("demo"));
        attrs.insert(
            "backend".to_string(),
            Value::List(vec![backend("origin", 0)]),
        );
        let err = ServiceVcl::from_config(&attrs, &no_env).unwrap_err();
        assert!(err.to_string().contains("Invalid port 0"));
    }

    #[test]
    fn computed_attributes_cannot_be_configured() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("demo"));
        attrs.insert("active_version".to_string(), Value::Int(3));
        assert!(ServiceVcl::from_config(&attrs, &no_env).is_err());
    }

    #[tokio::test]
    async fn create_configures_version_one_and_activates() {
        let api = MockApi::new();
        api.ok("POST", "/service", json!({"id": "svc1", "name": "tf-test-demo"}));

        let id = create(&api, &config(vec![backend("origin", 443)]))
            .await
            .unwrap();

        assert_eq!(id, "svc1");
        assert_eq!(
            api.writes(),
            vec![
                "POST /service",
                "POST /service/svc1/version/1/backend",
                "PUT /service/svc1/version/1/activate",
            ]
        );
    }

    #[tokio::test]
    async fn create_without_activate_leaves_draft() {
        let api = MockApi::new();
        api.ok("POST", "/service", json!({"id": "svc1"}));
        let mut config = config(vec![]);
        config.activate = false;

        create(&api, &config).await.unwrap();
        assert_eq!(api.writes(), vec!["POST /service"]);
    }

    #[tokio::test]
    async fn read_missing_service_is_none() {
        let api = MockApi::new();
        assert!(read(&api, "gone", true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_reports_active_version_blocks() {
        let api = MockApi::new();
        api.ok("GET", "/service/svc1/details", details_body(Some(2), 3));
        api.ok(
            "GET",
            "/service/svc1/version/2/backend",
            json!([{"name": "origin", "address": "origin.example.com", "port": 443}]),
        );
        api.ok("GET", "/service/svc1/version/2/header", json!([]));
        api.ok("GET", "/service/svc1/version/2/healthcheck", json!([]));
        api.ok("GET", "/service/svc1/version/2/snippet", json!([]));
        api.ok("GET", "/service/svc1/version/2/logging/s3", json!([]));

        let attrs = read(&api, "svc1", true).await.unwrap().unwrap();

        assert_eq!(attrs.get("name"), Some(&Value::from("tf-test-demo")));
        assert_eq!(attrs.get("active_version"), Some(&Value::Int(2)));
        assert_eq!(attrs.get("cloned_version"), Some(&Value::Int(3)));
        assert!(!attrs.contains_key("comment"));
        assert!(!attrs.contains_key("header"));
        match attrs.get("backend") {
            Some(Value::List(items)) => assert_eq!(items.len(), 1),
            other => panic!("expected backend list, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn rename_only_updates_the_service() {
        let api = MockApi::new();
        let mut from = HashMap::new();
        from.insert("name".to_string(), Value::from("old-name"));

        update(&api, "svc1", &from, &config(vec![])).await.unwrap();

        assert_eq!(api.writes(), vec!["PUT /service/svc1"]);
        assert_eq!(
            api.body_of("PUT", "/service/svc1"),
            Some(json!({"name": "tf-test-demo", "comment": ""}))
        );
    }

    #[tokio::test]
    async fn block_change_clones_and_activates() {
        let api = MockApi::new();
        api.ok("GET", "/service/svc1/details", details_body(Some(2), 2));
        api.ok("PUT", "/service/svc1/version/2/clone", json!({"number": 3}));

        let before = config(vec![backend("origin", 80)]);
        let mut from = HashMap::new();
        from.insert("name".to_string(), Value::from("tf-test-demo"));
        from.insert(
            "backend".to_string(),
            Value::List(
                before
                    .blocks_for("backend")
                    .iter()
                    .cloned()
                    .map(Value::Map)
                    .collect(),
            ),
        );

        update(&api, "svc1", &from, &config(vec![backend("origin", 443)]))
            .await
            .unwrap();

        assert_eq!(
            api.writes(),
            vec![
                "PUT /service/svc1/version/2/clone",
                "PUT /service/svc1/version/3/backend/origin",
                "PUT /service/svc1/version/3/activate",
            ]
        );
    }

    fn recorded(blocks: &[(&str, Value)]) -> HashMap<String, Value> {
        let mut from = HashMap::new();
        from.insert("name".to_string(), Value::from("tf-test-demo"));
        for (key, value) in blocks {
            from.insert(key.to_string(), value.clone());
        }
        from
    }

    fn script_empty_version(api: &MockApi, version: i64) {
        for kind in ["header", "healthcheck", "snippet", "logging/s3"] {
            api.ok("GET", &format!("/service/svc1/version/{}/{}", version, kind), json!([]));
        }
    }

    #[tokio::test]
    async fn draft_updates_read_back_from_the_draft() {
        let api = MockApi::new();
        api.ok("GET", "/service/svc1/details", details_body(Some(2), 2))
            .ok("GET", "/service/svc1/details", details_body(Some(2), 3));
        api.ok("PUT", "/service/svc1/version/2/clone", json!({"number": 3}));
        api.ok(
            "GET",
            "/service/svc1/version/2/backend",
            json!([{"name": "origin", "address": "origin.example.com", "port": 80}]),
        );
        api.ok(
            "GET",
            "/service/svc1/version/3/backend",
            json!([{"name": "origin", "address": "origin.example.com", "port": 443}]),
        );
        script_empty_version(&api, 2);
        script_empty_version(&api, 3);

        let before = config(vec![backend("origin", 80)]);
        let from = recorded(&[(
            "backend",
            Value::List(before.blocks_for("backend").iter().cloned().map(Value::Map).collect()),
        )]);
        let mut desired = config(vec![backend("origin", 443)]);
        desired.activate = false;

        update(&api, "svc1", &from, &desired).await.unwrap();
        assert_eq!(
            api.writes(),
            vec![
                "PUT /service/svc1/version/2/clone",
                "PUT /service/svc1/version/3/backend/origin",
            ]
        );

        let attrs = read(&api, "svc1", false).await.unwrap().unwrap();
        let Some(Value::List(items)) = attrs.get("backend") else {
            panic!("expected backend list");
        };
        let read_back: Vec<Block> = items
            .iter()
            .filter_map(|item| match item {
                Value::Map(block) => Some(block.clone()),
                _ => None,
            })
            .collect();
        let diff = SetDiff::by_name()
            .diff(&read_back, desired.blocks_for("backend"))
            .unwrap();
        assert!(!diff.is_change());
    }

    #[tokio::test]
    async fn product_toggle_does_not_clone() {
        let api = MockApi::new();
        api.ok("GET", "/service/svc1/details", details_body(Some(2), 2));

        let mut products = HashMap::new();
        products.insert("websockets".to_string(), Value::Bool(true));
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("tf-test-demo"));
        attrs.insert(
            "product_enablement".to_string(),
            Value::List(vec![Value::Map(products)]),
        );
        let desired = ServiceVcl::from_config(&attrs, &no_env).unwrap();

        update(&api, "svc1", &recorded(&[]), &desired).await.unwrap();

        assert_eq!(
            api.writes(),
            vec!["PUT /enabled-products/websockets/services/svc1"]
        );
    }

    #[tokio::test]
    async fn force_destroy_deactivates_first() {
        let api = MockApi::new();
        api.ok("GET", "/service/svc1/details", details_body(Some(4), 4));

        delete(&api, "svc1", true).await.unwrap();

        assert_eq!(
            api.writes(),
            vec!["PUT /service/svc1/version/4/deactivate", "DELETE /service/svc1"]
        );
    }

    #[tokio::test]
    async fn delete_of_missing_service_succeeds() {
        let api = MockApi::new();
        api.status("DELETE", "/service/gone", 404);
        delete(&api, "gone", false).await.unwrap();
    }
}
