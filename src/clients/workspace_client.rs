use crate::clients::entity_client::EntityClient;
use crate::framework::{Alias, Lookup, Outcome, ResourceClient, ResourceEntity, SdkError, SdkResult};
use crate::model::{
    to_params, App, Dataset, DatasetCreate, MenuPath, MenuPathCreate, Workspace, WorkspaceCreate,
};
use async_trait::async_trait;
use serde_json::Map;
use tracing::{debug, instrument};

/// Client for workspaces and the plain resources inside them.
#[derive(Clone, Debug)]
pub struct WorkspaceClient {
    inner: ResourceClient,
}

impl WorkspaceClient {
    pub fn new(inner: ResourceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EntityClient for WorkspaceClient {
    type Parent = App;
    type Entity = Workspace;

    fn inner(&self) -> &ResourceClient {
        &self.inner
    }
}

impl WorkspaceClient {
    #[instrument(skip(self, app))]
    pub async fn create_workspace(&self, app: &App, workspace: WorkspaceCreate) -> SdkResult<Workspace> {
        debug!("Sending request");
        self.inner
            .create_child(app.resource(), None, to_params(&workspace)?)
            .await
    }

    /// Renames a workspace; its alias follows the new name.
    #[instrument(skip(self, workspace))]
    pub async fn rename_workspace(&self, workspace: &Workspace, name: &str) -> SdkResult<Outcome> {
        debug!("Sending request");
        self.inner
            .update_child(workspace, Map::new(), Some(Alias::from(name)))
            .await
    }

    /// Returns the menu path at `menu_path.path`, creating it when missing.
    #[instrument(skip(self, workspace))]
    pub async fn ensure_menu_path(&self, workspace: &Workspace, menu_path: MenuPathCreate) -> SdkResult<MenuPath> {
        debug!("Sending request");
        let lookup = Lookup::from(Alias::from(menu_path.path.clone()));
        let found = self
            .inner
            .get_child::<MenuPath>(workspace.resource(), lookup.clone(), Some(to_params(&menu_path)?))
            .await?;
        found.ok_or_else(|| SdkError::NotFound {
            resource_type: "menuPath".into(),
            key: lookup.to_string(),
        })
    }

    pub async fn menu_paths(&self, workspace: &Workspace) -> SdkResult<Vec<MenuPath>> {
        self.inner.list_children(workspace.resource(), None).await
    }

    pub async fn datasets(&self, workspace: &Workspace) -> SdkResult<Vec<Dataset>> {
        self.inner.list_children(workspace.resource(), None).await
    }

    /// Creates several datasets with a single batch request.
    #[instrument(skip(self, workspace, datasets), fields(count = datasets.len()))]
    pub async fn create_datasets(&self, workspace: &Workspace, datasets: Vec<DatasetCreate>) -> SdkResult<Vec<Dataset>> {
        debug!("Sending request");
        let batch = datasets
            .iter()
            .map(to_params)
            .collect::<SdkResult<Vec<_>>>()?;
        self.inner.create_children(workspace.resource(), batch).await
    }
}
