//! # Resource Handles
//!
//! A [`Resource`] is the local, typed handle to one remote record. It exposes a
//! dictionary-like view over the record's fields (`get` / `set`), tracks which
//! fields were changed locally (the dirty set) and knows where it lives in the
//! hierarchy (its parent and its [`ResourceSchema`]).
//!
//! ## Bound vs Unbound
//!
//! - **Bound**: the identifier is known; [`Resource::resolve`] fetches the record.
//! - **Unbound**: no identifier yet; [`Resource::resolve`] validates the mandatory
//!   fields and creates the record remotely, adopting the returned identifier.
//!
//! The identifier lives in a `OnceLock`: it is set exactly once and can never be
//! reassigned afterwards.
//!
//! ## Identity
//!
//! `Resource` is an `Arc` handle. Clones share state, and two handles are "the
//! same resource" when [`Resource::ptr_eq`] holds. Caches hand out the cached
//! handle itself, never a copy.
//!
//! ## Typed views
//!
//! Domain types (see [`crate::model`]) wrap a `Resource` and implement
//! [`ResourceEntity`], which ties the wrapper to its static schema.

use crate::framework::cache::ResourceCache;
use crate::framework::error::{SdkError, SdkResult};
use crate::framework::transport::{into_record, Connection, Method};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use tracing::{debug, info};
use uuid::Uuid;

// =============================================================================
// SCHEMA
// =============================================================================

/// Which field(s) of a record form its alias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasField {
    None,
    Single(&'static str),
    Tuple(&'static [&'static str]),
}

impl AliasField {
    /// Derives the alias from a record's fields. Missing or null fields yield `None`.
    pub fn extract(&self, params: &Map<String, Value>) -> Option<Alias> {
        match self {
            AliasField::None => None,
            AliasField::Single(field) => params.get(*field).and_then(render).map(Alias::Single),
            AliasField::Tuple(fields) => fields
                .iter()
                .map(|field| params.get(*field).and_then(render))
                .collect::<Option<Vec<_>>>()
                .map(Alias::Tuple),
        }
    }

    /// Writes `alias` into the alias field(s), returning the fields touched.
    /// Values are written as strings.
    pub fn apply(&self, alias: &Alias, params: &mut Map<String, Value>) -> SdkResult<Vec<String>> {
        match (self, alias) {
            (AliasField::Single(field), Alias::Single(value)) => {
                params.insert(field.to_string(), Value::String(value.clone()));
                Ok(vec![field.to_string()])
            }
            (AliasField::Tuple(fields), Alias::Tuple(values)) if fields.len() == values.len() => {
                for (field, value) in fields.iter().zip(values) {
                    params.insert(field.to_string(), Value::String(value.clone()));
                }
                Ok(fields.iter().map(|f| f.to_string()).collect())
            }
            (field, alias) => Err(SdkError::usage(format!(
                "alias {} does not fit alias field {:?}",
                alias, field
            ))),
        }
    }
}

fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// A human-meaningful lookup key, derived from a record's alias field(s).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Alias {
    Single(String),
    Tuple(Vec<String>),
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alias::Single(s) => f.write_str(s),
            Alias::Tuple(parts) => write!(f, "({})", parts.join(", ")),
        }
    }
}

impl From<&str> for Alias {
    fn from(s: &str) -> Self {
        Alias::Single(s.to_string())
    }
}

impl From<String> for Alias {
    fn from(s: String) -> Self {
        Alias::Single(s)
    }
}

impl From<Vec<String>> for Alias {
    fn from(parts: Vec<String>) -> Self {
        Alias::Tuple(parts)
    }
}

/// Static description of one resource type.
#[derive(Debug)]
pub struct ResourceSchema {
    /// Singular type tag, used in record URLs (`app/{id}`).
    pub resource_type: &'static str,
    /// Collection segment under a parent (`apps`).
    pub plural: &'static str,
    pub alias: AliasField,
    /// Fields that must be present before the record can be created.
    pub mandatory: &'static [&'static str],
    /// Child types this resource owns a cache for.
    pub children: &'static [&'static ResourceSchema],
}

impl ResourceSchema {
    pub fn declares(&self, child: &ResourceSchema) -> bool {
        self.children
            .iter()
            .any(|c| c.resource_type == child.resource_type)
    }

    fn missing_mandatory(&self, params: &Map<String, Value>) -> Vec<String> {
        self.mandatory
            .iter()
            .filter(|field| params.get(**field).map_or(true, Value::is_null))
            .map(|field| field.to_string())
            .collect()
    }
}

/// Trait implemented by the typed wrappers in [`crate::model`].
///
/// Ties a wrapper to its static [`ResourceSchema`] so that the generic verbs on
/// [`ResourceClient`](crate::framework::ResourceClient) can be called with a
/// type parameter instead of a schema value.
pub trait ResourceEntity: Clone + Send + Sync + 'static {
    fn schema() -> &'static ResourceSchema;

    /// Wraps an untyped handle. Fails when the record cannot be represented by
    /// this type (e.g. an unregistered report type).
    fn from_resource(resource: Resource) -> SdkResult<Self>;

    fn resource(&self) -> &Resource;

    fn id(&self) -> Option<Uuid> {
        self.resource().id()
    }
}

// =============================================================================
// RESOURCE
// =============================================================================

#[derive(Default)]
struct State {
    params: Map<String, Value>,
    dirty: BTreeSet<String>,
}

struct Inner {
    schema: &'static ResourceSchema,
    connection: Arc<Connection>,
    parent: Option<Weak<Inner>>,
    parent_base: String,
    id: OnceLock<Uuid>,
    state: Mutex<State>,
    children: Mutex<HashMap<&'static str, ResourceCache>>,
}

/// Local handle to one remote record.
#[derive(Clone)]
pub struct Resource {
    inner: Arc<Inner>,
}

/// Non-owning reference to a [`Resource`], held by child caches and children so
/// that the parent → cache → child graph has no reference cycle.
#[derive(Clone)]
pub(crate) struct WeakResource(Weak<Inner>);

impl WeakResource {
    pub(crate) fn upgrade(&self) -> Option<Resource> {
        self.0.upgrade().map(|inner| Resource { inner })
    }
}

/// Fields written by [`Resource::push_changes`], to be committed once the caller
/// has finished its own bookkeeping.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    fields: Vec<String>,
    record: Option<Map<String, Value>>,
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Resource {
    fn build(
        schema: &'static ResourceSchema,
        connection: Arc<Connection>,
        parent: Option<(&Resource, String)>,
        id: Option<Uuid>,
        params: Map<String, Value>,
    ) -> Self {
        let cell = OnceLock::new();
        if let Some(id) = id {
            let _ = cell.set(id);
        }
        let (parent, parent_base) = match parent {
            Some((p, base)) => (Some(Arc::downgrade(&p.inner)), base),
            None => (None, String::new()),
        };
        Self {
            inner: Arc::new(Inner {
                schema,
                connection,
                parent,
                parent_base,
                id: cell,
                state: Mutex::new(State {
                    params,
                    dirty: BTreeSet::new(),
                }),
                children: Mutex::new(HashMap::new()),
            }),
        }
    }

    fn build_child(
        &self,
        schema: &'static ResourceSchema,
        id: Option<Uuid>,
        params: Map<String, Value>,
    ) -> SdkResult<Self> {
        self.check_declares(schema)?;
        let base = self.base_url()?;
        Ok(Self::build(
            schema,
            self.inner.connection.clone(),
            Some((self, base)),
            id,
            params,
        ))
    }

    /// A top-level resource (no parent), bound when `id` is given.
    pub fn root(schema: &'static ResourceSchema, connection: Arc<Connection>, id: Option<Uuid>) -> Self {
        Self::build(schema, connection, None, id, Map::new())
    }

    /// An unbound child: created remotely on the first [`resolve`](Self::resolve).
    pub fn new_child(&self, schema: &'static ResourceSchema, params: Map<String, Value>) -> SdkResult<Self> {
        let child = self.build_child(schema, None, Map::new())?;
        {
            let mut state = lock(&child.inner.state);
            state.dirty.extend(params.keys().cloned());
            state.params = params;
        }
        Ok(child)
    }

    /// A bound child: fetched on the first [`resolve`](Self::resolve).
    pub fn bind_child(&self, schema: &'static ResourceSchema, id: Uuid) -> SdkResult<Self> {
        self.build_child(schema, Some(id), Map::new())
    }

    /// A child built from a record the remote already returned.
    pub(crate) fn from_record(
        &self,
        schema: &'static ResourceSchema,
        mut record: Map<String, Value>,
    ) -> SdkResult<Self> {
        let id = take_id(schema, &mut record)?;
        self.build_child(schema, Some(id), record)
    }

    fn check_declares(&self, schema: &ResourceSchema) -> SdkResult<()> {
        if self.inner.schema.declares(schema) {
            Ok(())
        } else {
            Err(SdkError::UnknownChild {
                parent: self.inner.schema.resource_type.to_string(),
                child: schema.resource_type.to_string(),
            })
        }
    }

    // --- Identity & addressing ---

    pub fn id(&self) -> Option<Uuid> {
        self.inner.id.get().copied()
    }

    pub fn schema(&self) -> &'static ResourceSchema {
        self.inner.schema
    }

    pub fn resource_type(&self) -> &'static str {
        self.inner.schema.resource_type
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.inner.connection
    }

    pub fn parent(&self) -> Option<Resource> {
        self.inner
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Resource { inner })
    }

    pub(crate) fn downgrade(&self) -> WeakResource {
        WeakResource(Arc::downgrade(&self.inner))
    }

    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// `{parentBase}{resourceType}/{id}`, once the record exists.
    pub fn url(&self) -> Option<String> {
        self.id().map(|id| {
            format!(
                "{}{}/{}",
                self.inner.parent_base, self.inner.schema.resource_type, id
            )
        })
    }

    /// Prefix for child collections. Requires an identifier.
    pub fn base_url(&self) -> SdkResult<String> {
        self.url().map(|url| format!("{}/", url)).ok_or_else(|| {
            SdkError::usage(format!(
                "{} must be created before it can own children",
                self.resource_type()
            ))
        })
    }

    /// Collection this resource is created in: `{parentBase}{plural}`.
    pub fn collection_url(&self) -> String {
        format!("{}{}", self.inner.parent_base, self.inner.schema.plural)
    }

    fn require_url(&self, action: &str) -> SdkResult<String> {
        self.url().ok_or_else(|| {
            SdkError::usage(format!(
                "cannot {} a {} that was never created",
                action,
                self.resource_type()
            ))
        })
    }

    // --- Field access ---

    pub fn get(&self, field: &str) -> Option<Value> {
        lock(&self.inner.state).params.get(field).cloned()
    }

    pub fn get_str(&self, field: &str) -> Option<String> {
        lock(&self.inner.state)
            .params
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Sets a field locally and marks it dirty. Nothing is sent until the
    /// resource is updated.
    pub fn set(&self, field: &str, value: impl Into<Value>) {
        let mut state = lock(&self.inner.state);
        state.params.insert(field.to_string(), value.into());
        state.dirty.insert(field.to_string());
    }

    pub fn set_all(&self, changes: Map<String, Value>) {
        let mut state = lock(&self.inner.state);
        for (field, value) in changes {
            state.dirty.insert(field.clone());
            state.params.insert(field, value);
        }
    }

    /// Snapshot of all fields.
    pub fn params(&self) -> Map<String, Value> {
        lock(&self.inner.state).params.clone()
    }

    pub fn alias(&self) -> Option<Alias> {
        self.inner.schema.alias.extract(&lock(&self.inner.state).params)
    }

    /// Writes `alias` into the alias field(s) and marks them dirty.
    pub fn set_alias(&self, alias: &Alias) -> SdkResult<()> {
        let mut state = lock(&self.inner.state);
        let fields = self.inner.schema.alias.apply(alias, &mut state.params)?;
        state.dirty.extend(fields);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        !lock(&self.inner.state).dirty.is_empty()
    }

    pub fn dirty_fields(&self) -> Vec<String> {
        lock(&self.inner.state).dirty.iter().cloned().collect()
    }

    /// Replaces local fields with a record from the remote and clears the dirty
    /// set. Adopts the record's identifier if this handle has none yet.
    pub(crate) fn adopt(&self, mut record: Map<String, Value>) -> SdkResult<()> {
        let remote_id = match record.remove("id") {
            Some(value) => Some(parse_id(self.inner.schema, &value)?),
            None => None,
        };
        match (self.id(), remote_id) {
            (None, Some(id)) => {
                let _ = self.inner.id.set(id);
            }
            (None, None) => {
                return Err(SdkError::decode(
                    self.collection_url(),
                    "created record carries no id",
                ))
            }
            (Some(local), Some(remote)) if local != remote => {
                return Err(SdkError::decode(
                    self.url().unwrap_or_default(),
                    format!("record id {} does not match {}", remote, local),
                ))
            }
            _ => {}
        }
        let mut state = lock(&self.inner.state);
        state.params = record;
        state.dirty.clear();
        Ok(())
    }

    // --- Remote protocol ---

    /// Create-or-fetch: the single choke point for turning a handle into a live
    /// record.
    ///
    /// - No identifier: validates mandatory fields, `POST`s to the collection,
    ///   adopts the returned identifier and fields.
    /// - Identifier: `GET`s the record and overwrites local fields.
    ///
    /// The dirty set is empty afterwards either way.
    pub async fn resolve(&self) -> SdkResult<()> {
        let resource_type = self.resource_type();
        match self.url() {
            None => {
                let params = self.params();
                let missing = self.inner.schema.missing_mandatory(&params);
                if !missing.is_empty() {
                    return Err(SdkError::MissingFields {
                        resource_type: resource_type.to_string(),
                        fields: missing,
                    });
                }
                let path = self.collection_url();
                debug!(resource_type, ?params, "Create");
                let body = self
                    .inner
                    .connection
                    .call(Method::Post, &path, Some(Value::Object(params)), &[])
                    .await?;
                self.adopt(into_record(&path, body)?)?;
                info!(resource_type, id = ?self.id(), "Created");
            }
            Some(path) => {
                debug!(resource_type, %path, "Fetch");
                let body = self.inner.connection.call(Method::Get, &path, None, &[]).await?;
                self.adopt(into_record(&path, body)?)?;
            }
        }
        Ok(())
    }

    /// Sends the dirty fields (`PATCH`) and clears them. Returns `false` when
    /// there was nothing to send.
    pub async fn update(&self) -> SdkResult<bool> {
        match self.push_changes().await? {
            Some(pending) => {
                self.commit(pending);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// First half of [`update`](Self::update): performs the remote write without
    /// touching the dirty set.
    pub(crate) async fn push_changes(&self) -> SdkResult<Option<PendingWrite>> {
        let (fields, body) = {
            let state = lock(&self.inner.state);
            if state.dirty.is_empty() {
                return Ok(None);
            }
            let body: Map<String, Value> = state
                .dirty
                .iter()
                .filter_map(|f| state.params.get(f).map(|v| (f.clone(), v.clone())))
                .collect();
            (state.dirty.iter().cloned().collect::<Vec<_>>(), body)
        };
        let path = self.require_url("update")?;
        debug!(resource_type = self.resource_type(), %path, ?fields, "Update");
        let response = self
            .inner
            .connection
            .call(Method::Patch, &path, Some(Value::Object(body)), &[])
            .await?;
        let record = match response {
            Value::Object(map) if !map.is_empty() => Some(map),
            _ => None,
        };
        Ok(Some(PendingWrite { fields, record }))
    }

    /// Second half of [`update`](Self::update). Fields changed locally while the
    /// write was in flight stay dirty.
    pub(crate) fn commit(&self, pending: PendingWrite) {
        let mut state = lock(&self.inner.state);
        for field in &pending.fields {
            state.dirty.remove(field);
        }
        if let Some(mut record) = pending.record {
            record.remove("id");
            for (field, value) in record {
                if !state.dirty.contains(&field) {
                    state.params.insert(field, value);
                }
            }
        }
        info!(resource_type = self.resource_type(), id = ?self.id(), "Updated");
    }

    /// `DELETE`s the record. The handle keeps its identifier.
    pub async fn delete_remote(&self) -> SdkResult<()> {
        let path = self.require_url("delete")?;
        debug!(resource_type = self.resource_type(), %path, "Delete");
        self.inner.connection.call(Method::Delete, &path, None, &[]).await?;
        info!(resource_type = self.resource_type(), id = ?self.id(), "Deleted");
        Ok(())
    }

    // --- Children ---

    /// The cache of children of type `schema`, created on first use.
    pub fn children(&self, schema: &'static ResourceSchema) -> SdkResult<ResourceCache> {
        self.check_declares(schema)?;
        let collection = format!("{}{}", self.base_url()?, schema.plural);
        let mut children = lock(&self.inner.children);
        let cache = children
            .entry(schema.resource_type)
            .or_insert_with(|| ResourceCache::new(schema, self, collection));
        Ok(cache.clone())
    }

    /// Tears down every child cache, e.g. when the surrounding context changes.
    pub fn invalidate_children(&self) {
        let caches: Vec<ResourceCache> = lock(&self.inner.children)
            .drain()
            .map(|(_, cache)| cache)
            .collect();
        for cache in caches {
            cache.clear();
        }
        debug!(resource_type = self.resource_type(), id = ?self.id(), "Children invalidated");
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("type", &self.resource_type())
            .field("id", &self.id())
            .field("alias", &self.alias())
            .finish()
    }
}

fn parse_id(schema: &ResourceSchema, value: &Value) -> SdkResult<Uuid> {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| {
            SdkError::decode(
                schema.plural,
                format!("invalid {} id: {}", schema.resource_type, value),
            )
        })
}

/// Reads the identifier of a record without consuming it.
pub(crate) fn record_id(schema: &ResourceSchema, record: &Map<String, Value>) -> SdkResult<Uuid> {
    match record.get("id") {
        Some(value) => parse_id(schema, value),
        None => Err(SdkError::decode(
            schema.plural,
            format!("{} record carries no id", schema.resource_type),
        )),
    }
}

fn take_id(schema: &ResourceSchema, record: &mut Map<String, Value>) -> SdkResult<Uuid> {
    match record.remove("id") {
        Some(value) => parse_id(schema, &value),
        None => Err(SdkError::decode(
            schema.plural,
            format!("{} record carries no id", schema.resource_type),
        )),
    }
}
