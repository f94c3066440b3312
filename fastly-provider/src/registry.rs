//! Memoized API clients keyed by name
//!
//! Long-running tooling (the sweeper, test harnesses) needs one client per
//! account or endpoint. Clients are built on first use and shared after.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::client::{ApiResult, FastlyApi};

type Factory = Box<dyn Fn(&str) -> ApiResult<Arc<dyn FastlyApi>> + Send + Sync>;

pub struct ClientRegistry {
    factory: Factory,
    clients: Mutex<HashMap<String, Arc<dyn FastlyApi>>>,
}

impl ClientRegistry {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&str) -> ApiResult<Arc<dyn FastlyApi>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Client for `key`, building it on first use
    ///
    /// A failed build is not cached; the next call tries again.
    pub fn get(&self, key: &str) -> ApiResult<Arc<dyn FastlyApi>> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(key) {
            return Ok(client.clone());
        }

        log::debug!("creating API client for {}", key);
        let client = (self.factory)(key)?;
        clients.insert(key.to_string(), client.clone());
        Ok(client)
    }

    pub fn len(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
