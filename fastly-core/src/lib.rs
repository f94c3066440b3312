//! Fastly provider core
//!
//! Provider-agnostic building blocks: attribute values and schemas, the typed
//! attribute boundary, set-diff of nested blocks and the Provider trait.

pub mod attrs;
pub mod differ;
pub mod provider;
pub mod resource;
pub mod schema;
