//! # Resource SDK demo
//!
//! Runs a scripted session against the in-memory [`MockTransport`]:
//! 1.  Opening a [`Session`] on a seeded business.
//! 2.  Creating a workspace with a menu path, datasets and a dashboard.
//! 3.  Placing charts in batched mode, then showing a slot conflict.
//!
//! Configuration is read from `resource-sdk.toml` when present, and from the
//! `RESOURCE_SDK_*` environment variables.

use resource_sdk::clients::EntityClient;
use resource_sdk::framework::mock::MockTransport;
use resource_sdk::framework::{Lookup, Method, ResourceEntity};
use resource_sdk::lifecycle::{setup_tracing_with, SdkConfig, Session};
use resource_sdk::model::{
    ChartPlacement, DatasetCreate, MenuPathCreate, ReportCreate, WorkspaceCreate, APP, BUSINESS,
};
use serde_json::{json, Map, Value};
use std::path::Path;
use tracing::{error, info, warn, Instrument};

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let config = SdkConfig::load(Some(Path::new("resource-sdk.toml")))
        .await
        .map_err(|e| e.to_string())?;
    setup_tracing_with(&config.log_filter);

    info!("Starting demo session");

    // The remote side: one business with one app
    let mock = MockTransport::new();
    let business_id = mock.seed("", &BUSINESS, fields(json!({ "displayName": "Acme" })));
    mock.seed(
        &format!("business/{}/", business_id),
        &APP,
        fields(json!({ "name": "Finance" })),
    );

    let session = Session::connect(config.with_business(business_id), mock.clone())
        .await
        .map_err(|e| e.to_string())?;

    let span = tracing::info_span!("workspace_setup");
    let dashboard = async {
        let app = session.app("Finance").await?;
        let workspace = session
            .workspace_client
            .create_workspace(
                &app,
                WorkspaceCreate {
                    name: "Q3 Review".into(),
                    description: Some("Quarterly numbers".into()),
                },
            )
            .await?;
        session.switch_workspace(workspace.clone()).await?;

        session
            .workspace_client
            .ensure_menu_path(
                &workspace,
                MenuPathCreate {
                    path: "/finance/q3".into(),
                    title: Some("Q3".into()),
                },
            )
            .await?;
        let datasets = session
            .workspace_client
            .create_datasets(
                &workspace,
                vec![DatasetCreate::new("revenue"), DatasetCreate::new("costs")],
            )
            .await?;
        info!(count = datasets.len(), "Datasets created");

        let report = session
            .report_client
            .create_report(&workspace, ReportCreate::new("Overview", "dashboard").under("/finance/q3"))
            .await?;
        let found = session
            .report_client
            .get(&workspace, Lookup::from("Overview"))
            .await?;
        info!(same = found.is_some(), "Report resolved by alias");
        report
            .as_dashboard()
            .cloned()
            .ok_or_else(|| resource_sdk::framework::SdkError::usage("not a dashboard"))
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    // Batched chart placement: nothing is sent until the flush
    let span = tracing::info_span!("dashboard_layout");
    async {
        let placements = [
            ChartPlacement::new("/finance/q3", 1, "line").with_dataset("revenue"),
            ChartPlacement::new("/finance/q3", 2, "bar").with_dataset("costs"),
            ChartPlacement::new("/finance/q3", 1, "table").on_tab("Details"),
        ];
        for placement in placements {
            session.report_client.set_chart(&dashboard, placement).await?;
        }
        info!(
            pending = session.scheduler().pending(),
            patches = mock.count(Method::Patch),
            "Charts queued"
        );
        session.flush().await
    }
    .instrument(span)
    .await
    .map_err(|e| e.to_string())?;

    // Two writers on one slot in the same batch are refused
    let duplicate = ChartPlacement::new("/finance/q3", 3, "pie");
    session
        .report_client
        .set_chart(&dashboard, duplicate.clone())
        .await
        .map_err(|e| e.to_string())?;
    match session.report_client.set_chart(&dashboard, duplicate).await {
        Ok(_) => warn!("Expected a slot conflict"),
        Err(e) => error!(error = %e, "Batch aborted"),
    }

    let charts = session
        .report_client
        .charts(&dashboard)
        .await
        .map_err(|e| e.to_string())?;
    let layout = dashboard.resource().get("layout").unwrap_or(Value::Null);
    info!(charts = charts.len(), layout = %layout, "Dashboard ready");

    session.shutdown().await.map_err(|e| e.to_string())?;

    info!(calls = mock.total_calls(), "Application completed successfully");
    Ok(())
}
