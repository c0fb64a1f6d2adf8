use crate::framework::{Lookup, Outcome, ResourceClient, ResourceEntity, SdkResult};
use async_trait::async_trait;

/// Trait for domain clients to inherit the standard child operations.
///
/// This trait reduces boilerplate by providing default implementations for
/// `get`, `list` and `delete` on the collection of `Entity` under `Parent`.
#[async_trait]
pub trait EntityClient: Send + Sync {
    type Parent: ResourceEntity;
    type Entity: ResourceEntity;

    /// Access the inner generic ResourceClient.
    fn inner(&self) -> &ResourceClient;

    /// Fetch an entity by id or alias.
    #[tracing::instrument(skip(self, parent))]
    async fn get(&self, parent: &Self::Parent, lookup: Lookup) -> SdkResult<Option<Self::Entity>> {
        tracing::debug!("Sending request");
        self.inner()
            .get_child::<Self::Entity>(parent.resource(), lookup, None)
            .await
    }

    /// List every entity under `parent`.
    #[tracing::instrument(skip(self, parent))]
    async fn list(&self, parent: &Self::Parent) -> SdkResult<Vec<Self::Entity>> {
        tracing::debug!("Sending request");
        self.inner()
            .list_children::<Self::Entity>(parent.resource(), None)
            .await
    }

    /// Delete an entity.
    #[tracing::instrument(skip(self, entity))]
    async fn delete(&self, entity: &Self::Entity) -> SdkResult<Outcome> {
        tracing::debug!("Sending request");
        self.inner().delete_child(entity).await
    }
}
