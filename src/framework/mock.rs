//! # Mock Framework
//!
//! An in-memory [`Transport`] for testing caches, clients and sessions without
//! a remote API.
//!
//! [`MockTransport`] behaves like the real endpoints (list with pagination,
//! create, batch create, fetch, patch, delete, 404 on unknown ids) and records
//! every call so tests can assert on what reached the "wire".
//!
//! # Example
//! ```ignore
//! let mock = MockTransport::new();
//! let business = mock.seed("", &BUSINESS, record);
//! mock.fail_on(Method::Patch, "chart/", 500);
//!
//! let session = Session::connect(config, mock.clone()).await?;
//! // ...
//! assert_eq!(mock.count(Method::Post), 1);
//! ```

use crate::framework::error::TransportError;
use crate::framework::resource::{lock, ResourceSchema};
use crate::framework::transport::{Method, Transport};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// One call as it reached the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
struct Failure {
    method: Method,
    path_contains: String,
    status: u16,
}

#[derive(Default)]
struct Store {
    /// Collection path -> ids, in creation order.
    collections: HashMap<String, Vec<Uuid>>,
    /// Id -> (collection path, record without its id).
    records: HashMap<Uuid, (String, Map<String, Value>)>,
}

impl Store {
    fn insert(&mut self, collection: &str, mut record: Map<String, Value>) -> Uuid {
        let id = Uuid::new_v4();
        record.remove("id");
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(id);
        self.records.insert(id, (collection.to_string(), record));
        id
    }

    fn render(&self, id: Uuid) -> Option<Value> {
        self.records.get(&id).map(|(_, record)| with_id(id, record))
    }

    fn remove(&mut self, id: Uuid) -> bool {
        match self.records.remove(&id) {
            Some((collection, _)) => {
                if let Some(ids) = self.collections.get_mut(&collection) {
                    ids.retain(|other| *other != id);
                }
                true
            }
            None => false,
        }
    }
}

fn with_id(id: Uuid, record: &Map<String, Value>) -> Value {
    let mut out = record.clone();
    out.insert("id".into(), Value::String(id.to_string()));
    Value::Object(out)
}

/// In-memory stand-in for the remote API.
#[derive(Default)]
pub struct MockTransport {
    store: Mutex<Store>,
    calls: Mutex<Vec<RecordedCall>>,
    failures: Mutex<Vec<Failure>>,
    page_size: Mutex<Option<usize>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Stores a record directly, bypassing the call log. Returns its new id.
    pub fn seed(&self, parent_base: &str, schema: &ResourceSchema, record: Map<String, Value>) -> Uuid {
        let collection = format!("{}{}", parent_base, schema.plural);
        lock(&self.store).insert(&collection, record)
    }

    /// Current remote state of one record.
    pub fn record(&self, id: Uuid) -> Option<Map<String, Value>> {
        lock(&self.store).records.get(&id).map(|(_, r)| r.clone())
    }

    /// Number of records stored under a collection path.
    pub fn collection_len(&self, collection: &str) -> usize {
        lock(&self.store)
            .collections
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Every call matching `method` whose path contains `path_contains` fails
    /// with `status` until [`clear_failures`](Self::clear_failures).
    pub fn fail_on(&self, method: Method, path_contains: &str, status: u16) {
        lock(&self.failures).push(Failure {
            method,
            path_contains: path_contains.to_string(),
            status,
        });
    }

    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    /// Splits listings into pages of `size` items linked by `nextToken`.
    pub fn set_page_size(&self, size: usize) {
        *lock(&self.page_size) = Some(size.max(1));
    }

    /// Delays every call, which makes overlap between concurrent calls observable.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    /// Highest number of calls that were in progress at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, method: Method) -> Vec<RecordedCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method) -> usize {
        lock(&self.calls).iter().filter(|c| c.method == method).count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn reset_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Panics unless no call was made since the last reset.
    pub fn verify_no_calls(&self) {
        let calls = lock(&self.calls);
        if !calls.is_empty() {
            panic!("Expected no remote calls, got {}: {:?}", calls.len(), *calls);
        }
    }

    fn failure_for(&self, method: Method, path: &str) -> Option<u16> {
        lock(&self.failures)
            .iter()
            .find(|f| f.method == method && path.contains(&f.path_contains))
            .map(|f| f.status)
    }

    fn handle(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        let not_found = || TransportError::new(method, path, 404, "no such record");
        let bad_request = |message: &str| TransportError::new(method, path, 400, message);
        let record_id = path
            .rsplit('/')
            .next()
            .and_then(|last| Uuid::parse_str(last).ok());

        let mut store = lock(&self.store);
        match (method, record_id) {
            (Method::Get, Some(id)) => store.render(id).ok_or_else(not_found),
            (Method::Get, None) => {
                let ids = store.collections.get(path).cloned().unwrap_or_default();
                let offset = param(query, "nextToken")
                    .map(|t| t.parse::<usize>().map_err(|_| bad_request("bad nextToken")))
                    .transpose()?
                    .unwrap_or(0);
                let mut size = (*lock(&self.page_size)).unwrap_or(usize::MAX);
                if let Some(limit) = param(query, "limit") {
                    let limit = limit.parse::<usize>().map_err(|_| bad_request("bad limit"))?;
                    size = size.min(limit);
                }
                let end = offset.saturating_add(size).min(ids.len());
                let items: Vec<Value> = ids
                    .get(offset..end)
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|id| store.render(*id))
                    .collect();
                let mut page = json!({ "items": items });
                if end < ids.len() {
                    page["nextToken"] = Value::String(end.to_string());
                }
                Ok(page)
            }
            (Method::Post, _) => {
                if let Some(collection) = path.strip_suffix("/batch") {
                    let Some(Value::Array(items)) = body else {
                        return Err(bad_request("batch body must be an array"));
                    };
                    let mut created = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Object(record) = item else {
                            return Err(bad_request("batch items must be objects"));
                        };
                        let id = store.insert(collection, record);
                        created.extend(store.render(id));
                    }
                    return Ok(json!({ "items": created }));
                }
                let Some(Value::Object(record)) = body else {
                    return Err(bad_request("create body must be an object"));
                };
                let id = store.insert(path, record);
                store.render(id).ok_or_else(not_found)
            }
            (Method::Patch, Some(id)) => {
                let Some(Value::Object(changes)) = body else {
                    return Err(bad_request("patch body must be an object"));
                };
                let (_, record) = store.records.get_mut(&id).ok_or_else(not_found)?;
                for (field, value) in changes {
                    if field != "id" {
                        record.insert(field, value);
                    }
                }
                store.render(id).ok_or_else(not_found)
            }
            (Method::Delete, Some(id)) => {
                if store.remove(id) {
                    Ok(Value::Null)
                } else {
                    Err(not_found())
                }
            }
            (Method::Patch | Method::Delete, None) => Err(bad_request("record path expected")),
        }
    }
}

fn param<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
}

#[async_trait]
impl Transport for MockTransport {
    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        query: &[(String, String)],
    ) -> Result<Value, TransportError> {
        lock(&self.calls).push(RecordedCall {
            method,
            path: path.to_string(),
            body: body.clone(),
            query: query.to_vec(),
        });

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let result = match self.failure_for(method, path) {
            Some(status) => Err(TransportError::new(method, path, status, "injected failure")),
            None => self.handle(method, path, body, query),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
