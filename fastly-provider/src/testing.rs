//! Test doubles shared by the handler and resource tests

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value as Json, json};

use crate::client::{ApiError, ApiResult, FastlyApi};

/// One recorded API call
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Json>,
}

impl Call {
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Scripted in-memory API
///
/// Responses are queued per `(method, path)`; the last queued response is
/// reused once the queue drains. Unscripted writes echo their body, unscripted
/// deletes succeed and unscripted reads return 404.
#[derive(Default)]
pub struct MockApi {
    responses: Mutex<HashMap<(String, String), VecDeque<ApiResult<Json>>>>,
    calls: Mutex<Vec<Call>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, method: &str, path: &str, response: ApiResult<Json>) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    pub fn ok(&self, method: &str, path: &str, body: Json) -> &Self {
        self.on(method, path, Ok(body))
    }

    pub fn status(&self, method: &str, path: &str, status: u16) -> &Self {
        self.on(method, path, Err(ApiError::http(status, "scripted")))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls rendered as "METHOD path", in order
    pub fn call_log(&self) -> Vec<String> {
        self.calls().iter().map(Call::describe).collect()
    }

    /// Calls other than reads
    pub fn writes(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter(|c| c.method != "GET")
            .map(Call::describe)
            .collect()
    }

    pub fn body_of(&self, method: &str, path: &str) -> Option<Json> {
        self.calls()
            .into_iter()
            .find(|c| c.method == method && c.path == path)
            .and_then(|c| c.body)
    }

    fn respond(&self, method: &'static str, path: &str, body: Option<Json>) -> ApiResult<Json> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body: body.clone(),
        });

        let mut responses = self.responses.lock().unwrap();
        if let Some(queue) = responses.get_mut(&(method.to_string(), path.to_string())) {
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            if let Some(response) = next {
                return response;
            }
        }

        match method {
            "GET" => Err(ApiError::http(404, "not scripted")),
            "DELETE" => Ok(Json::Null),
            _ => Ok(body.unwrap_or(Json::Null)),
        }
    }
}

#[async_trait]
impl FastlyApi for MockApi {
    async fn get(&self, path: &str) -> ApiResult<Json> {
        self.respond("GET", path, None)
    }

    async fn post(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.respond("POST", path, Some(body))
    }

    async fn put(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.respond("PUT", path, Some(body))
    }

    async fn patch(&self, path: &str, body: Json) -> ApiResult<Json> {
        self.respond("PATCH", path, Some(body))
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        self.respond("DELETE", path, None).map(|_| ())
    }
}

/// PEM-armour arbitrary DER bytes as a certificate
///
/// The provider forwards certificate bodies untouched, so fixtures only need
/// the right framing.
pub fn pem_certificate(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for chunk in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}

/// Certificate fixture whose DER payload names the domain it was made for
pub fn certificate_for(domain: &str) -> String {
    pem_certificate(format!("fixture certificate for {}", domain).as_bytes())
}

/// JSON:API certificate record as returned by the API
pub fn certificate_record(id: &str, name: &str, domains: &[&str]) -> Json {
    json!({
        "data": {
            "id": id,
            "type": "tls_certificate",
            "attributes": {
                "name": name,
                "issued_to": domains.first().copied().unwrap_or_default(),
                "issuer": "Fixture CA",
                "serial_number": "1234",
            },
            "relationships": {
                "tls_domains": {
                    "data": domains
                        .iter()
                        .map(|d| json!({"id": d, "type": "tls_domain"}))
                        .collect::<Vec<_>>(),
                }
            }
        }
    })
}

#[test]
fn pem_fixture_is_framed() {
    let pem = certificate_for("example.com");
    assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
    assert!(pem.ends_with("-----END CERTIFICATE-----\n"));
    assert!(pem.lines().all(|line| line.len() <= 64));
}
