use crate::clients::entity_client::EntityClient;
use crate::framework::{
    AddRequest, Call, ConflictKey, Job, Lookup, Outcome, Resource, ResourceCache, ResourceClient,
    ResourceEntity, SdkError, SdkResult,
};
use crate::model::{
    to_params, Chart, ChartPlacement, DashboardReport, Report, ReportCreate, Workspace,
};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, instrument};

/// Client for reports and the charts on dashboards.
///
/// Chart placement is the write that most benefits from batching: a script
/// typically sets many charts on one dashboard, and each placement changes the
/// dashboard's layout. Placements are queued individually, and the layout is
/// recomputed once per dashboard after the batch (the `relayout` finalizer).
#[derive(Clone, Debug)]
pub struct ReportClient {
    inner: ResourceClient,
}

impl ReportClient {
    pub fn new(inner: ResourceClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EntityClient for ReportClient {
    type Parent = Workspace;
    type Entity = Report;

    fn inner(&self) -> &ResourceClient {
        &self.inner
    }
}

impl ReportClient {
    #[instrument(skip(self, workspace))]
    pub async fn create_report(&self, workspace: &Workspace, report: ReportCreate) -> SdkResult<Report> {
        debug!("Sending request");
        crate::model::report_type(&report.report_type)?;
        self.inner
            .create_child(workspace.resource(), None, to_params(&report)?)
            .await
    }

    /// Changes the type of a report, clearing the fields the new type does not
    /// declare. Fetch the report again after the write lands to get the new
    /// variant.
    #[instrument(skip(self, report), fields(from = report.tag()))]
    pub async fn convert_report(&self, report: &Report, tag: &str) -> SdkResult<Outcome> {
        debug!("Sending request");
        let changes = report.conversion(tag)?;
        self.inner.update_child(report, changes, None).await
    }

    /// Places a chart on a dashboard slot, creating it or updating the chart
    /// already there.
    ///
    /// Two placements on the same slot (collection, order and tab) in one batch
    /// are a conflict and abort the batch.
    #[instrument(skip(self, dashboard), fields(report = ?dashboard.id()))]
    pub async fn set_chart(&self, dashboard: &DashboardReport, placement: ChartPlacement) -> SdkResult<Outcome> {
        debug!(?placement, "set_chart called");
        let report_id = dashboard
            .id()
            .ok_or_else(|| SdkError::usage("charts can only be placed on a created dashboard"))?;
        let charts = dashboard.charts_cache()?;

        let mut key = ConflictKey::new(charts.collection(), placement.order);
        if !placement.tab.is_empty() {
            key = key.with_tab(placement.tab.clone());
        }
        let alias = placement.alias();
        let params = to_params(&placement)?;

        let relayout = relayout(dashboard.resource().clone(), charts.clone(), report_id);
        let call = Call::new(
            format!("set chart {} on report {}", alias, report_id),
            (charts, alias, params),
            |(charts, alias, params)| async move {
                match charts.get(Lookup::Alias(alias)).await? {
                    Some(chart) => {
                        let id = chart
                            .id()
                            .ok_or_else(|| SdkError::usage("cached chart has no id"))?;
                        charts.update(Lookup::Id(id), params, None).await?;
                    }
                    None => {
                        charts.add(AddRequest::params(params)).await?;
                    }
                }
                Ok(())
            },
        )
        .conflict_key(key)
        .finalizer(relayout);

        self.inner.scheduler().submit(call).await
    }

    pub async fn charts(&self, dashboard: &DashboardReport) -> SdkResult<Vec<Chart>> {
        self.inner.list_children(dashboard.resource(), None).await
    }
}

/// Rewrites the dashboard's `layout` from its current charts, ordered by tab
/// then order. Registered once per dashboard per batch.
fn relayout(report: Resource, charts: ResourceCache, report_id: uuid::Uuid) -> Job {
    Job::new(
        format!("relayout:{}", report_id),
        (report, charts),
        move |(report, charts)| async move {
            let mut slots = Vec::new();
            for resource in charts.list(None).await? {
                let chart = Chart::from_resource(resource)?;
                if let Some(id) = chart.id() {
                    slots.push((chart.tab().unwrap_or_default(), chart.order().unwrap_or(0), id));
                }
            }
            slots.sort();
            let layout: Vec<_> = slots
                .iter()
                .map(|(tab, order, id)| json!({ "tab": tab, "order": order, "chart": id.to_string() }))
                .collect();
            info!(report = %report_id, charts = layout.len(), "Relayout");
            report.set("layout", layout);
            report.update().await?;
            Ok(())
        },
    )
}
