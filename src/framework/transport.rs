//! # Transport Contract
//!
//! The SDK never speaks HTTP itself. Every remote call goes through the
//! [`Transport`] trait, which a host application implements on top of its HTTP
//! client of choice (retries, auth and backoff live there, not here).
//!
//! ## Endpoint shapes
//!
//! | Operation | Method | Path |
//! |-----------|--------|------|
//! | list children | `GET` | `{base}{childPlural}` (+ `nextToken`, `limit` query) |
//! | create child | `POST` | `{base}{childPlural}` |
//! | batch create | `POST` | `{base}{childPlural}/batch` (array body) |
//! | fetch / update / delete | `GET` / `PATCH` / `DELETE` | `{parentBase}{resourceType}/{id}` |
//!
//! `{base}` of a resource is its own URL followed by `/`; root resources have an
//! empty parent base.

use crate::framework::error::{SdkError, SdkResult, TransportError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// HTTP verbs used by the resource layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(verb)
    }
}

/// Query string pairs, in order.
pub type Query = Vec<(String, String)>;

/// The remote API as seen by the core.
///
/// Implementations must be cheap to share (`Arc<dyn Transport>`) and safe to call
/// concurrently: a batch flush fans out many calls at once.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(String, String)],
    ) -> Result<Value, TransportError>;
}

/// One page of a listing: `{items: [...], nextToken?: string}`.
#[derive(Debug, Deserialize)]
pub struct ListPage {
    pub items: Vec<Value>,
    #[serde(rename = "nextToken", default)]
    pub next_token: Option<String>,
}

impl ListPage {
    pub fn decode(path: &str, body: Value) -> SdkResult<Self> {
        serde_json::from_value(body).map_err(|e| SdkError::decode(path, e.to_string()))
    }
}

/// Interprets a response body as a single record.
pub fn into_record(path: &str, body: Value) -> SdkResult<Map<String, Value>> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(SdkError::decode(
            path,
            format!("expected an object, got {}", other),
        )),
    }
}

/// Shared handle every resource and cache talks through.
///
/// Holds the transport together with the session-wide cache-mode flag, which can
/// be toggled at runtime. Turning cache mode off makes every `list()` flush dirty
/// entries and re-fetch.
pub struct Connection {
    transport: Arc<dyn Transport>,
    cache_enabled: AtomicBool,
}

impl Connection {
    pub fn new(transport: Arc<dyn Transport>, cache_enabled: bool) -> Arc<Self> {
        Arc::new(Self {
            transport,
            cache_enabled: AtomicBool::new(cache_enabled),
        })
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled.load(Ordering::SeqCst)
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        self.cache_enabled.store(enabled, Ordering::SeqCst);
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        tracing::trace!(%method, path, "Remote call");
        self.transport.call(method, path, body, query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_page_with_token() {
        let page = ListPage::decode("apps", json!({"items": [{"id": 1}], "nextToken": "t2"})).unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_token.as_deref(), Some("t2"));
    }

    #[test]
    fn list_page_without_token() {
        let page = ListPage::decode("apps", json!({"items": []})).unwrap();
        assert!(page.next_token.is_none());
    }

    #[test]
    fn list_page_rejects_other_shapes() {
        let err = ListPage::decode("apps", json!([1, 2])).unwrap_err();
        assert!(matches!(err, SdkError::Decode { .. }));
    }

    #[test]
    fn record_must_be_an_object() {
        assert!(into_record("app/1", json!({"name": "x"})).is_ok());
        assert!(into_record("app/1", json!("x")).is_err());
    }
}
