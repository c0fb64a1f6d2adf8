//! # Resource Client
//!
//! [`ResourceClient`] is the generic front door for child operations. Every verb
//! is routed through the session's [`Scheduler`]:
//!
//! | Verb | Mode | Conflict key |
//! |------|------|--------------|
//! | `get_child` / `require_child` / `list_children` | read (flushes first) | none |
//! | `create_child` / `create_children` | always executed | none |
//! | `update_child` | scheduled | record URL, order 0 |
//! | `delete_child` | scheduled | record URL, order 0 |
//!
//! Domain clients (see [`crate::clients`]) wrap it and add typed operations.

use crate::framework::cache::{AddRequest, Lookup, ResourceCache};
use crate::framework::context::ConflictKey;
use crate::framework::error::{CacheError, SdkError, SdkResult};
use crate::framework::resource::{Alias, Resource, ResourceEntity};
use crate::framework::scheduler::{Call, Outcome, Scheduler};
use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tracing::{debug, instrument};

/// Generic client for the child collections of any resource.
#[derive(Clone, Debug)]
pub struct ResourceClient {
    scheduler: Scheduler,
}

impl ResourceClient {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn cache_of<C: ResourceEntity>(parent: &Resource) -> SdkResult<ResourceCache> {
        parent.children(C::schema())
    }

    /// Looks up a child by id or alias.
    ///
    /// On a miss, `create_if_missing` (if given) is used to create the child;
    /// an alias lookup writes the alias into the new record.
    #[instrument(skip_all, fields(parent = parent.resource_type(), child = C::schema().resource_type))]
    pub async fn get_child<C: ResourceEntity>(
        &self,
        parent: &Resource,
        lookup: impl Into<Lookup>,
        create_if_missing: Option<Map<String, Value>>,
    ) -> SdkResult<Option<C>> {
        let lookup = lookup.into();
        let cache = Self::cache_of::<C>(parent)?;
        let found = self.scheduler.execute(cache.get(lookup.clone())).await?;
        match (found, create_if_missing) {
            (Some(resource), _) => Ok(Some(C::from_resource(resource)?)),
            (None, Some(params)) => {
                debug!(%lookup, "Missing, creating");
                let mut request = AddRequest::params(params);
                match lookup {
                    Lookup::Alias(alias) => request = request.with_alias(alias),
                    Lookup::Id(id) => {
                        return Err(SdkError::usage(format!(
                            "cannot create a {} with a caller-chosen id {}",
                            C::schema().resource_type,
                            id
                        )))
                    }
                }
                self.add(cache, request).await.map(Some)
            }
            (None, None) => Ok(None),
        }
    }

    /// Like [`get_child`](Self::get_child) without creation, but absence is an error.
    pub async fn require_child<C: ResourceEntity>(
        &self,
        parent: &Resource,
        lookup: impl Into<Lookup>,
    ) -> SdkResult<C> {
        let lookup = lookup.into();
        self.get_child::<C>(parent, lookup.clone(), None)
            .await?
            .ok_or_else(|| SdkError::NotFound {
                resource_type: C::schema().resource_type.to_string(),
                key: lookup.to_string(),
            })
    }

    #[instrument(skip_all, fields(parent = parent.resource_type(), child = C::schema().resource_type))]
    pub async fn list_children<C: ResourceEntity>(
        &self,
        parent: &Resource,
        limit: Option<usize>,
    ) -> SdkResult<Vec<C>> {
        let cache = Self::cache_of::<C>(parent)?;
        let resources = self.scheduler.execute(cache.list(limit)).await?;
        resources.into_iter().map(C::from_resource).collect()
    }

    /// Creates a child and returns it. Always executed, since the caller needs
    /// the new record.
    #[instrument(skip_all, fields(parent = parent.resource_type(), child = C::schema().resource_type))]
    pub async fn create_child<C: ResourceEntity>(
        &self,
        parent: &Resource,
        alias: Option<Alias>,
        params: Map<String, Value>,
    ) -> SdkResult<C> {
        let cache = Self::cache_of::<C>(parent)?;
        let mut request = AddRequest::params(params);
        if let Some(alias) = alias {
            request = request.with_alias(alias);
        }
        self.add(cache, request).await
    }

    async fn add<C: ResourceEntity>(&self, cache: ResourceCache, request: AddRequest) -> SdkResult<C> {
        let (respond_to, response) = oneshot::channel();
        let name = format!("create {}", cache.collection());
        let call = Call::new(name, (cache, request, respond_to), |(cache, request, respond_to)| async move {
            let resource = cache.add(request).await?;
            let _ = respond_to.send(resource);
            Ok(())
        })
        .always_execute();
        self.scheduler.submit(call).await?;
        let resource = response
            .await
            .map_err(|_| SdkError::usage("create finished without a result"))?;
        C::from_resource(resource)
    }

    /// Creates several children with one batch request.
    #[instrument(skip_all, fields(parent = parent.resource_type(), child = C::schema().resource_type, count = batch.len()))]
    pub async fn create_children<C: ResourceEntity>(
        &self,
        parent: &Resource,
        batch: Vec<Map<String, Value>>,
    ) -> SdkResult<Vec<C>> {
        let cache = Self::cache_of::<C>(parent)?;
        let (respond_to, response) = oneshot::channel();
        let name = format!("create batch {}", cache.collection());
        let call = Call::new(name, (cache, batch, respond_to), |(cache, batch, respond_to)| async move {
            let created = cache.add_batch(batch).await?;
            let _ = respond_to.send(created);
            Ok(())
        })
        .always_execute();
        self.scheduler.submit(call).await?;
        let created = response
            .await
            .map_err(|_| SdkError::usage("batch create finished without a result"))?;
        created.into_iter().map(C::from_resource).collect()
    }

    /// Applies `changes` (and an optional alias rename) to a child.
    ///
    /// The changes are captured now; in batched mode they are written on the
    /// next flush.
    #[instrument(skip_all, fields(resource_type = child.resource().resource_type()))]
    pub async fn update_child<C: ResourceEntity>(
        &self,
        child: &C,
        changes: Map<String, Value>,
        new_alias: Option<Alias>,
    ) -> SdkResult<Outcome> {
        let (target, url) = Self::target(child.resource(), "update")?;
        let call = Call::new(
            format!("update {}", url),
            (target, changes, new_alias),
            |(target, changes, new_alias)| async move {
                match target {
                    Target::Cached(cache, id) => {
                        if !cache.update(Lookup::Id(id), changes, new_alias).await? {
                            return Err(CacheError::NotFound {
                                resource_type: cache.schema().resource_type.to_string(),
                                id,
                            }
                            .into());
                        }
                    }
                    Target::Root(resource) => {
                        resource.set_all(changes);
                        if let Some(alias) = &new_alias {
                            resource.set_alias(alias)?;
                        }
                        resource.update().await?;
                    }
                }
                Ok(())
            },
        )
        .conflict_key(ConflictKey::new(url, 0));
        self.scheduler.submit(call).await
    }

    /// Deletes a child remotely and removes it from its parent's cache.
    #[instrument(skip_all, fields(resource_type = child.resource().resource_type()))]
    pub async fn delete_child<C: ResourceEntity>(&self, child: &C) -> SdkResult<Outcome> {
        let (target, url) = Self::target(child.resource(), "delete")?;
        let call = Call::new(format!("delete {}", url), target, |target| async move {
            match target {
                Target::Cached(cache, id) => {
                    cache.delete(Lookup::Id(id)).await?;
                }
                Target::Root(resource) => resource.delete_remote().await?,
            }
            Ok(())
        })
        .conflict_key(ConflictKey::new(url, 0));
        self.scheduler.submit(call).await
    }

    fn target(resource: &Resource, action: &str) -> SdkResult<(Target, String)> {
        let (Some(id), Some(url)) = (resource.id(), resource.url()) else {
            return Err(SdkError::usage(format!(
                "cannot {} a {} that was never created",
                action,
                resource.resource_type()
            )));
        };
        let target = match resource.parent() {
            Some(parent) => Target::Cached(parent.children(resource.schema())?, id),
            None => Target::Root(resource.clone()),
        };
        Ok((target, url))
    }

    /// Runs everything queued so far.
    pub async fn flush(&self) -> SdkResult<()> {
        self.scheduler.flush().await
    }
}

/// Where a scheduled write lands: the parent's cache, or a root resource.
enum Target {
    Cached(ResourceCache, uuid::Uuid),
    Root(Resource),
}
