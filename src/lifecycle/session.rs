use crate::clients::{ReportClient, WorkspaceClient};
use crate::framework::resource::lock;
use crate::framework::{
    Connection, ResourceClient, ResourceEntity, Scheduler, SdkError, SdkResult, Transport,
};
use crate::lifecycle::config::SdkConfig;
use crate::model::{App, Business, Workspace};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument, warn};

/// The per-session orchestrator.
///
/// `Session` is responsible for:
/// - **Wiring**: one [`Connection`] (transport + cache mode), one [`Scheduler`],
///   and the domain clients sharing them
/// - **Context**: the business root and the active workspace
/// - **Lifecycle**: flushing pending work on workspace switches and at shutdown
///
/// # Example
///
/// ```ignore
/// let session = Session::connect(config, transport).await?;
///
/// let app = session.app("Finance").await?;
/// let workspace = session.workspace_client.create_workspace(&app, create).await?;
/// session.switch_workspace(workspace).await?;
/// session.report_client.set_chart(&dashboard, placement).await?;
///
/// // Runs everything still queued
/// session.shutdown().await?;
/// ```
pub struct Session {
    /// Client for workspaces, menu paths and datasets
    pub workspace_client: WorkspaceClient,

    /// Client for reports and charts
    pub report_client: ReportClient,

    resources: ResourceClient,
    connection: Arc<Connection>,
    scheduler: Scheduler,
    business: Business,
    active: Mutex<Option<Workspace>>,
    config: SdkConfig,
}

impl Session {
    /// Validates `config`, wires the clients and fetches the business root.
    #[instrument(skip_all, fields(business = ?config.business_id))]
    pub async fn connect(config: SdkConfig, transport: Arc<dyn Transport>) -> SdkResult<Self> {
        config.validate()?;
        let business_id = config
            .business_id
            .ok_or_else(|| SdkError::Config("business_id is required to open a session".into()))?;

        let connection = Connection::new(transport, config.cache_enabled);
        let scheduler = Scheduler::new(config.sequential, config.max_concurrency);
        let resources = ResourceClient::new(scheduler.clone());

        let business = Business::open(connection.clone(), business_id);
        business.resource().resolve().await?;

        info!(
            cache_enabled = config.cache_enabled,
            sequential = config.sequential,
            max_concurrency = config.max_concurrency,
            "Session connected"
        );
        Ok(Self {
            workspace_client: WorkspaceClient::new(resources.clone()),
            report_client: ReportClient::new(resources.clone()),
            resources,
            connection,
            scheduler,
            business,
            active: Mutex::new(None),
            config,
        })
    }

    pub fn business(&self) -> &Business {
        &self.business
    }

    pub fn resources(&self) -> &ResourceClient {
        &self.resources
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn set_cache_enabled(&self, enabled: bool) {
        info!(enabled, "Cache mode changed");
        self.connection.set_cache_enabled(enabled);
    }

    pub fn set_sequential(&self, sequential: bool) {
        self.scheduler.set_sequential(sequential);
    }

    /// The app named `name` under the business.
    pub async fn app(&self, name: &str) -> SdkResult<App> {
        self.resources.require_child(self.business.resource(), name).await
    }

    pub fn active_workspace(&self) -> Option<Workspace> {
        lock(&self.active).clone()
    }

    /// Makes `workspace` the active one.
    ///
    /// Pending work is flushed first. The child caches of the previously active
    /// workspace are then invalidated, so nothing cached under the old context
    /// is served afterwards.
    #[instrument(skip_all, fields(workspace = ?workspace.name()))]
    pub async fn switch_workspace(&self, workspace: Workspace) -> SdkResult<()> {
        self.scheduler.flush().await?;
        let previous = lock(&self.active).replace(workspace.clone());
        if let Some(previous) = previous {
            if !previous.resource().ptr_eq(workspace.resource()) {
                previous.resource().invalidate_children();
                info!(from = ?previous.name(), "Workspace switched");
            }
        }
        Ok(())
    }

    /// Runs everything queued so far.
    pub async fn flush(&self) -> SdkResult<()> {
        self.scheduler.flush().await
    }

    /// Flushes pending work and closes the session.
    pub async fn shutdown(self) -> SdkResult<()> {
        info!(pending = self.scheduler.pending(), "Shutting down session...");
        if let Err(e) = self.scheduler.flush().await {
            warn!(error = %e, "Final flush failed");
            return Err(e);
        }
        info!("Session shutdown complete.");
        Ok(())
    }
}
