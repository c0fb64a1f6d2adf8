//! # Resource Cache
//!
//! One [`ResourceCache`] exists per (parent, child type) pair. It is created by
//! the parent [`Resource`] on first use and owned by it. The cache maps
//! identifiers to the live [`Resource`] handles and aliases to identifiers, and
//! implements the list/get/add/update/delete verbs on top of the transport.
//!
//! ## Cache mode vs no-cache mode
//!
//! | | cache mode | no-cache mode |
//! |---|---|---|
//! | `list()` after a full listing | served locally | dirty entries updated, cache dropped, re-fetched |
//! | `add()` alias collision | [`CacheError::AliasExists`] | stale entry evicted, add proceeds |
//! | `add()` of a cached id | [`CacheError::AlreadyCached`] | stale entry replaced |
//!
//! ## Locking
//!
//! Listings are serialized by an async mutex: concurrent callers never trigger
//! two overlapping fetches, and late callers read what the first one loaded. The
//! maps themselves sit behind a short-held `std::sync::Mutex` that is never held
//! across an `.await`.
//!
//! ## Alias tie-break
//!
//! Listed records are sorted by identifier before their aliases are registered.
//! When two remote records share an alias, the one with the smaller identifier
//! wins and the other is dropped with a warning.

use crate::framework::error::{CacheError, SdkError, SdkResult};
use crate::framework::resource::{lock, record_id, Alias, Resource, ResourceSchema, WeakResource};
use crate::framework::transport::{into_record, Connection, ListPage, Method, Query};
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// How a caller addresses one entry. Exactly one key, by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Lookup {
    Id(Uuid),
    Alias(Alias),
}

impl Lookup {
    /// Builds a lookup from optional parts. Giving both or neither is a usage error.
    pub fn from_parts(id: Option<Uuid>, alias: Option<Alias>) -> SdkResult<Self> {
        match (id, alias) {
            (Some(id), None) => Ok(Lookup::Id(id)),
            (None, Some(alias)) => Ok(Lookup::Alias(alias)),
            (Some(_), Some(_)) => Err(SdkError::usage("give either an id or an alias, not both")),
            (None, None) => Err(SdkError::usage("an id or an alias is required")),
        }
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "{}", id),
            Lookup::Alias(alias) => write!(f, "{}", alias),
        }
    }
}

impl From<Uuid> for Lookup {
    fn from(id: Uuid) -> Self {
        Lookup::Id(id)
    }
}

impl From<Alias> for Lookup {
    fn from(alias: Alias) -> Self {
        Lookup::Alias(alias)
    }
}

impl From<&str> for Lookup {
    fn from(alias: &str) -> Self {
        Lookup::Alias(Alias::from(alias))
    }
}

/// Arguments of [`ResourceCache::add`].
#[derive(Debug, Default)]
pub struct AddRequest {
    resource: Option<Resource>,
    alias: Option<Alias>,
    params: Map<String, Value>,
}

impl AddRequest {
    /// Add a new record built from `params`.
    pub fn params(params: Map<String, Value>) -> Self {
        Self {
            params,
            ..Self::default()
        }
    }

    /// Add an existing handle (created on admission if it has no id yet).
    pub fn resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }

    /// Writes `alias` into the alias field(s) before admission.
    pub fn with_alias(mut self, alias: impl Into<Alias>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params.extend(params);
        self
    }
}

#[derive(Default)]
struct Entries {
    by_id: BTreeMap<Uuid, Resource>,
    by_alias: HashMap<Alias, Uuid>,
    listed: bool,
}

impl Entries {
    fn lookup(&self, key: &Lookup) -> Option<Resource> {
        let id = match key {
            Lookup::Id(id) => *id,
            Lookup::Alias(alias) => *self.by_alias.get(alias)?,
        };
        self.by_id.get(&id).cloned()
    }

    fn holder(&self, alias: &Alias) -> Option<Uuid> {
        self.by_alias.get(alias).copied()
    }

    /// Removes the entry and every alias pointing at it.
    fn purge(&mut self, id: Uuid) -> Option<Resource> {
        self.by_alias.retain(|_, target| *target != id);
        self.by_id.remove(&id)
    }

    fn reindex(&mut self, id: Uuid, alias: Option<Alias>) {
        self.by_alias.retain(|_, target| *target != id);
        if let Some(alias) = alias {
            self.by_alias.insert(alias, id);
        }
    }

    /// Admits a listing sorted by id. Within an alias the smallest id wins,
    /// whatever was cached before; the other records are dropped.
    fn merge_listing(&mut self, fresh: Vec<(Uuid, Resource)>) {
        let mut winners: HashMap<Alias, Uuid> = HashMap::new();
        for (id, resource) in &fresh {
            if let Some(alias) = resource.alias() {
                winners.entry(alias).or_insert(*id);
            }
        }
        for (id, resource) in fresh {
            self.by_alias.retain(|_, target| *target != id);
            if let Some(alias) = resource.alias() {
                match winners.get(&alias) {
                    Some(winner) if *winner != id => {
                        warn!(%alias, kept = %winner, dropped = %id, "Duplicate alias dropped");
                        self.by_id.remove(&id);
                        continue;
                    }
                    _ => {
                        self.by_alias.insert(alias, id);
                    }
                }
            }
            self.by_id.insert(id, resource);
        }
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_alias.clear();
        self.listed = false;
    }

    fn take(&self, limit: Option<usize>) -> Vec<Resource> {
        self.by_id
            .values()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// A dangling alias means the cache logic itself is broken.
    fn assert_consistent(&self) {
        for (alias, id) in &self.by_alias {
            assert!(
                self.by_id.contains_key(id),
                "alias {} points at uncached id {}",
                alias,
                id
            );
        }
    }
}

struct CacheInner {
    schema: &'static ResourceSchema,
    parent: WeakResource,
    connection: Arc<Connection>,
    collection: String,
    entries: Mutex<Entries>,
    listing: tokio::sync::Mutex<()>,
}

/// The collection of all children of one type under one parent.
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<CacheInner>,
}

impl ResourceCache {
    pub(crate) fn new(schema: &'static ResourceSchema, parent: &Resource, collection: String) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                schema,
                parent: parent.downgrade(),
                connection: parent.connection().clone(),
                collection,
                entries: Mutex::new(Entries::default()),
                listing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn schema(&self) -> &'static ResourceSchema {
        self.inner.schema
    }

    /// `{parentBase}{plural}`.
    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_listed(&self) -> bool {
        lock(&self.inner.entries).listed
    }

    /// Everything currently cached, in id order, without any remote call.
    pub fn cached(&self) -> Vec<Resource> {
        lock(&self.inner.entries).take(None)
    }

    /// Drops every entry and forgets that a listing happened.
    pub fn clear(&self) {
        lock(&self.inner.entries).clear();
        debug!(resource_type = self.inner.schema.resource_type, "Cache cleared");
    }

    fn cache_enabled(&self) -> bool {
        self.inner.connection.cache_enabled()
    }

    fn resource_type(&self) -> &'static str {
        self.inner.schema.resource_type
    }

    fn parent(&self) -> SdkResult<Resource> {
        self.inner.parent.upgrade().ok_or_else(|| {
            SdkError::usage(format!(
                "parent of {} was dropped",
                self.inner.collection
            ))
        })
    }

    // =========================================================================
    // LIST
    // =========================================================================

    /// Lists the collection, following `nextToken` until the remote is exhausted
    /// or `limit` records are held.
    #[instrument(skip(self), fields(collection = %self.inner.collection))]
    pub async fn list(&self, limit: Option<usize>) -> SdkResult<Vec<Resource>> {
        let _listing = self.inner.listing.lock().await;

        if self.cache_enabled() {
            let entries = lock(&self.inner.entries);
            if entries.listed {
                debug!(size = entries.by_id.len(), "Listing served from cache");
                return Ok(entries.take(limit));
            }
        } else {
            self.update_dirty().await?;
            lock(&self.inner.entries).clear();
        }

        let mut records = self.fetch(limit).await?;
        let mut keyed = Vec::with_capacity(records.len());
        for record in records.drain(..) {
            keyed.push((record_id(self.inner.schema, &record)?, record));
        }
        keyed.sort_by_key(|(id, _)| *id);

        let parent = self.parent()?;
        let mut fresh = Vec::with_capacity(keyed.len());
        for (id, record) in keyed {
            let existing = lock(&self.inner.entries).by_id.get(&id).cloned();
            match existing {
                Some(resource) if resource.is_dirty() => fresh.push((id, resource)),
                Some(resource) => {
                    resource.adopt(record)?;
                    fresh.push((id, resource));
                }
                None => fresh.push((id, parent.from_record(self.inner.schema, record)?)),
            }
        }

        let mut entries = lock(&self.inner.entries);
        entries.merge_listing(fresh);
        if limit.is_none() {
            entries.listed = true;
        }
        entries.assert_consistent();
        info!(size = entries.by_id.len(), "Listed");
        Ok(entries.take(limit))
    }

    async fn update_dirty(&self) -> SdkResult<()> {
        let dirty: Vec<Resource> = lock(&self.inner.entries)
            .by_id
            .values()
            .filter(|r| r.is_dirty())
            .cloned()
            .collect();
        if !dirty.is_empty() {
            debug!(count = dirty.len(), "Updating dirty entries before re-listing");
            try_join_all(dirty.iter().map(|r| r.update())).await?;
        }
        Ok(())
    }

    async fn fetch(&self, limit: Option<usize>) -> SdkResult<Vec<Map<String, Value>>> {
        let path = &self.inner.collection;
        let mut records = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut query = Query::new();
            if let Some(limit) = limit {
                query.push(("limit".into(), (limit - records.len()).to_string()));
            }
            if let Some(token) = token.take() {
                query.push(("nextToken".into(), token));
            }
            let body = self
                .inner
                .connection
                .call(Method::Get, path, None, &query)
                .await?;
            let page = ListPage::decode(path, body)?;
            for item in page.items {
                records.push(into_record(path, item)?);
            }
            let wants_more = limit.map_or(true, |limit| records.len() < limit);
            match page.next_token {
                Some(next) if wants_more => token = Some(next),
                _ => break,
            }
        }
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    // =========================================================================
    // GET
    // =========================================================================

    /// Finds one entry. Absence is `Ok(None)`, never an error.
    ///
    /// - hit: returned as is;
    /// - alias miss: full listing, then re-check;
    /// - id miss: single fetch, admitted on success, `None` on 404.
    #[instrument(skip(self), fields(resource_type = self.resource_type()))]
    pub async fn get(&self, lookup: Lookup) -> SdkResult<Option<Resource>> {
        if let Some(hit) = lock(&self.inner.entries).lookup(&lookup) {
            return Ok(Some(hit));
        }
        match lookup {
            Lookup::Alias(_) => {
                self.list(None).await?;
                Ok(lock(&self.inner.entries).lookup(&lookup))
            }
            Lookup::Id(id) => {
                let resource = self.parent()?.bind_child(self.inner.schema, id)?;
                match resource.resolve().await {
                    Ok(()) => {}
                    Err(e) if e.is_not_found() => {
                        debug!(%id, "Not found");
                        return Ok(None);
                    }
                    Err(e) => return Err(e),
                }
                let mut entries = lock(&self.inner.entries);
                if let Some(existing) = entries.by_id.get(&id) {
                    return Ok(Some(existing.clone()));
                }
                if let Some(alias) = resource.alias() {
                    match entries.holder(&alias) {
                        Some(other) => {
                            warn!(%alias, %id, holder = %other, "Fetched record shares an alias, not indexed")
                        }
                        None => {
                            entries.by_alias.insert(alias, id);
                        }
                    }
                }
                entries.by_id.insert(id, resource.clone());
                entries.assert_consistent();
                Ok(Some(resource))
            }
        }
    }

    /// [`get`](Self::get) with optional parts; exactly one must be given.
    pub async fn get_by(&self, id: Option<Uuid>, alias: Option<Alias>) -> SdkResult<Option<Resource>> {
        self.get(Lookup::from_parts(id, alias)?).await
    }

    // =========================================================================
    // ADD
    // =========================================================================

    /// Admits a resource, creating it remotely first if it has no identifier.
    #[instrument(skip(self, request), fields(resource_type = self.resource_type()))]
    pub async fn add(&self, request: AddRequest) -> SdkResult<Resource> {
        let AddRequest {
            resource,
            alias,
            params,
        } = request;
        let resource = match resource {
            Some(resource) => {
                if resource.resource_type() != self.resource_type() {
                    return Err(SdkError::usage(format!(
                        "cannot add a {} to a {} cache",
                        resource.resource_type(),
                        self.resource_type()
                    )));
                }
                if !params.is_empty() {
                    resource.set_all(params);
                }
                resource
            }
            None => self.parent()?.new_child(self.inner.schema, params)?,
        };
        if let Some(alias) = &alias {
            resource.set_alias(alias)?;
        }

        if let Some(alias) = resource.alias() {
            self.ensure_alias_free(&alias, resource.id()).await?;
        }

        if resource.id().is_none() {
            resource.resolve().await?;
        }
        let id = resource
            .id()
            .ok_or_else(|| SdkError::decode(self.collection(), "resolved resource has no id"))?;

        let cache_enabled = self.cache_enabled();
        let mut entries = lock(&self.inner.entries);
        if entries.by_id.contains_key(&id) {
            if cache_enabled {
                return Err(CacheError::AlreadyCached {
                    resource_type: self.resource_type().to_string(),
                    id,
                }
                .into());
            }
            debug!(%id, "Replacing stale entry");
            entries.purge(id);
        }
        if let Some(alias) = resource.alias() {
            if let Some(other) = entries.holder(&alias).filter(|other| *other != id) {
                if cache_enabled {
                    return Err(self.alias_exists(&alias));
                }
                warn!(%alias, stale = %other, "Evicting stale alias");
                entries.purge(other);
            }
            entries.by_alias.insert(alias, id);
        }
        entries.by_id.insert(id, resource.clone());
        entries.assert_consistent();
        info!(%id, size = entries.by_id.len(), "Added");
        Ok(resource)
    }

    /// Checks the local index first, then (unless a full listing is already
    /// cached) forces one and checks again.
    async fn ensure_alias_free(&self, alias: &Alias, own: Option<Uuid>) -> SdkResult<()> {
        if self.claim_alias(alias, own)? {
            return Ok(());
        }
        if self.cache_enabled() && self.is_listed() {
            return Ok(());
        }
        self.list(None).await?;
        self.claim_alias(alias, own)?;
        Ok(())
    }

    /// `Ok(true)` when a collision was found and resolved by eviction.
    fn claim_alias(&self, alias: &Alias, own: Option<Uuid>) -> SdkResult<bool> {
        let mut entries = lock(&self.inner.entries);
        match entries.holder(alias) {
            Some(other) if Some(other) != own => {
                if self.cache_enabled() {
                    return Err(self.alias_exists(alias));
                }
                warn!(%alias, stale = %other, "Evicting stale alias");
                entries.purge(other);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn alias_exists(&self, alias: &Alias) -> SdkError {
        CacheError::AliasExists {
            resource_type: self.resource_type().to_string(),
            alias: alias.to_string(),
        }
        .into()
    }

    /// Creates several records with one `POST {collection}/batch` and admits them.
    #[instrument(skip(self, batch), fields(resource_type = self.resource_type(), count = batch.len()))]
    pub async fn add_batch(&self, batch: Vec<Map<String, Value>>) -> SdkResult<Vec<Resource>> {
        let schema = self.inner.schema;
        let mut seen = HashSet::new();
        for params in &batch {
            if let Some(alias) = schema.alias.extract(params) {
                if !seen.insert(alias.clone()) {
                    return Err(self.alias_exists(&alias));
                }
                self.ensure_alias_free(&alias, None).await?;
            }
        }

        let path = format!("{}/batch", self.inner.collection);
        let body = Value::Array(batch.into_iter().map(Value::Object).collect());
        let response = self
            .inner
            .connection
            .call(Method::Post, &path, Some(body), &[])
            .await?;
        let items = match response {
            Value::Array(items) => items,
            other => ListPage::decode(&path, other)?.items,
        };

        let parent = self.parent()?;
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            created.push(parent.from_record(schema, into_record(&path, item)?)?);
        }

        let mut entries = lock(&self.inner.entries);
        for resource in &created {
            let Some(id) = resource.id() else { continue };
            if let Some(alias) = resource.alias() {
                if let Some(other) = entries.holder(&alias).filter(|other| *other != id) {
                    warn!(%alias, stale = %other, "Evicting stale alias");
                    entries.purge(other);
                }
                entries.by_alias.insert(alias, id);
            }
            entries.by_id.insert(id, resource.clone());
        }
        entries.assert_consistent();
        info!(size = entries.by_id.len(), "Batch added");
        Ok(created)
    }

    // =========================================================================
    // UPDATE / DELETE
    // =========================================================================

    /// Applies `changes` (and an optional alias rename) to an existing entry and
    /// writes them remotely. Returns `false` when nothing matched.
    #[instrument(skip(self, changes), fields(resource_type = self.resource_type()))]
    pub async fn update(
        &self,
        lookup: Lookup,
        changes: Map<String, Value>,
        new_alias: Option<Alias>,
    ) -> SdkResult<bool> {
        let Some(resource) = self.get(lookup).await? else {
            return Ok(false);
        };
        let id = resource
            .id()
            .ok_or_else(|| SdkError::decode(self.collection(), "cached resource has no id"))?;

        if let Some(alias) = &new_alias {
            let holder = lock(&self.inner.entries).holder(alias);
            if matches!(holder, Some(other) if other != id) && self.cache_enabled() {
                return Err(self.alias_exists(alias));
            }
        }

        resource.set_all(changes);
        if let Some(alias) = &new_alias {
            resource.set_alias(alias)?;
        }
        let pending = resource.push_changes().await?;

        {
            let mut entries = lock(&self.inner.entries);
            let alias = resource.alias();
            if let Some(alias) = &alias {
                if let Some(other) = entries.holder(alias).filter(|other| *other != id) {
                    warn!(%alias, stale = %other, "Evicting stale alias");
                    entries.purge(other);
                }
            }
            entries.reindex(id, alias);
            entries.assert_consistent();
        }
        if let Some(pending) = pending {
            resource.commit(pending);
        }
        Ok(true)
    }

    /// Deletes an entry remotely and purges it locally.
    ///
    /// A missing entry addressed by alias yields `false`; a missing entry
    /// addressed by explicit id is a [`CacheError::NotFound`].
    #[instrument(skip(self), fields(resource_type = self.resource_type()))]
    pub async fn delete(&self, lookup: Lookup) -> SdkResult<bool> {
        let Some(resource) = self.get(lookup.clone()).await? else {
            return match lookup {
                Lookup::Id(id) => Err(CacheError::NotFound {
                    resource_type: self.resource_type().to_string(),
                    id,
                }
                .into()),
                Lookup::Alias(_) => Ok(false),
            };
        };
        resource.delete_remote().await?;
        if let Some(id) = resource.id() {
            let mut entries = lock(&self.inner.entries);
            entries.purge(id);
            entries.assert_consistent();
        }
        Ok(true)
    }
}

impl fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = lock(&self.inner.entries);
        f.debug_struct("ResourceCache")
            .field("collection", &self.inner.collection)
            .field("size", &entries.by_id.len())
            .field("listed", &entries.listed)
            .finish()
    }
}
