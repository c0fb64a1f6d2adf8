use resource_sdk::framework::mock::MockTransport;
use resource_sdk::framework::{
    ConflictError, ConflictKey, Method, Outcome, ResourceEntity, SdkError,
};
use resource_sdk::lifecycle::{SdkConfig, Session};
use resource_sdk::model::{
    App, ChartPlacement, DashboardReport, ReportCreate, Workspace, WorkspaceCreate, APP, BUSINESS,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

async fn batched_session(max_concurrency: usize) -> (Arc<MockTransport>, Session, App) {
    let mock = MockTransport::new();
    let business = mock.seed("", &BUSINESS, fields(json!({ "displayName": "Acme" })));
    mock.seed(
        &format!("business/{}/", business),
        &APP,
        fields(json!({ "name": "Finance" })),
    );
    let config = SdkConfig {
        sequential: false,
        max_concurrency,
        ..SdkConfig::default()
    }
    .with_business(business);
    let session = Session::connect(config, mock.clone())
        .await
        .expect("Failed to connect");
    let app = session.app("Finance").await.expect("Failed to find app");
    (mock, session, app)
}

async fn workspace(session: &Session, app: &App, name: &str) -> Workspace {
    session
        .workspace_client
        .create_workspace(
            app,
            WorkspaceCreate {
                name: name.into(),
                description: None,
            },
        )
        .await
        .expect("Failed to create workspace")
}

async fn dashboard(session: &Session, ws: &Workspace, name: &str) -> DashboardReport {
    session
        .report_client
        .create_report(ws, ReportCreate::new(name, "dashboard"))
        .await
        .expect("Failed to create report")
        .as_dashboard()
        .cloned()
        .expect("Not a dashboard")
}

fn report_patches(mock: &MockTransport, report: &DashboardReport) -> usize {
    let url = report.resource().url().unwrap();
    mock.calls_for(Method::Patch)
        .iter()
        .filter(|c| c.path == url)
        .count()
}

#[tokio::test]
async fn test_creates_run_immediately_in_batched_mode() {
    let (mock, session, app) = batched_session(4).await;

    let ws = workspace(&session, &app, "Ops").await;

    assert!(ws.id().is_some());
    assert_eq!(mock.count(Method::Post), 1);
    assert_eq!(session.scheduler().pending(), 0);
}

#[tokio::test]
async fn test_chart_writes_wait_for_flush() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let report = dashboard(&session, &ws, "Overview").await;
    mock.reset_calls();

    let outcome = session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "line"))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Queued);
    assert_eq!(session.scheduler().pending(), 1);
    let key = ConflictKey::new(report.charts_cache().unwrap().collection(), 1);
    assert!(session.scheduler().is_claimed(&key));
    mock.verify_no_calls();

    // A read flushes first and sees the write
    let charts = session.report_client.charts(&report).await.unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(session.scheduler().pending(), 0);
    assert!(!session.scheduler().is_claimed(&key));
}

#[tokio::test]
async fn test_same_slot_twice_aborts_the_batch() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let report = dashboard(&session, &ws, "Overview").await;
    mock.reset_calls();

    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "line"))
        .await
        .unwrap();
    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 2, "bar"))
        .await
        .unwrap();
    // Same order on another tab is a different slot
    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "table").on_tab("Details"))
        .await
        .unwrap();
    assert_eq!(session.scheduler().pending(), 3);

    let err = session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "pie"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SdkError::Conflict(ConflictError::DuplicateKey { discarded: 3, .. })
    ));
    assert_eq!(session.scheduler().pending(), 0);
    assert!(session.scheduler().pending_finalizers().is_empty());

    session.flush().await.unwrap();
    mock.verify_no_calls();
}

#[tokio::test]
async fn test_sequential_mode_has_no_conflicts() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let report = dashboard(&session, &ws, "Overview").await;
    session.set_sequential(true);

    for chart_type in ["line", "pie"] {
        let outcome = session
            .report_client
            .set_chart(&report, ChartPlacement::new("/finance", 1, chart_type))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
    }

    let charts = report.charts_cache().unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(mock.collection_len(charts.collection()), 1);
    // One relayout per call
    assert_eq!(report_patches(&mock, &report), 2);
}

#[tokio::test]
async fn test_switching_to_sequential_flushes_pending_work() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let report = dashboard(&session, &ws, "Overview").await;

    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "line"))
        .await
        .unwrap();
    session.set_sequential(true);
    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 2, "bar"))
        .await
        .unwrap();

    assert_eq!(session.scheduler().pending(), 0);
    assert_eq!(
        mock.collection_len(report.charts_cache().unwrap().collection()),
        2
    );
}

#[tokio::test]
async fn test_relayout_runs_once_per_dashboard() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let first = dashboard(&session, &ws, "First").await;
    let second = dashboard(&session, &ws, "Second").await;
    mock.reset_calls();

    for order in 1..=3 {
        for report in [&first, &second] {
            session
                .report_client
                .set_chart(report, ChartPlacement::new("/finance", order, "line"))
                .await
                .unwrap();
        }
    }
    assert_eq!(session.scheduler().pending(), 6);
    assert_eq!(session.scheduler().pending_finalizers().len(), 2);

    session.flush().await.unwrap();

    assert_eq!(report_patches(&mock, &first), 1);
    assert_eq!(report_patches(&mock, &second), 1);
    for report in [&first, &second] {
        let layout = report.resource().get("layout").unwrap();
        assert_eq!(layout.as_array().unwrap().len(), 3);
    }
}

#[tokio::test]
async fn test_failed_job_does_not_stop_the_batch() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    let broken = dashboard(&session, &ws, "Broken").await;
    let healthy = dashboard(&session, &ws, "Healthy").await;
    let broken_charts = broken.charts_cache().unwrap().collection().to_string();
    let healthy_charts = healthy.charts_cache().unwrap().collection().to_string();
    mock.fail_on(Method::Post, &broken_charts, 500);

    for order in 1..=2 {
        for report in [&broken, &healthy] {
            session
                .report_client
                .set_chart(report, ChartPlacement::new("/finance", order, "line"))
                .await
                .unwrap();
        }
    }

    let err = session.flush().await.unwrap_err();

    assert!(matches!(err, SdkError::Transport(ref e) if e.status == 500));
    assert_eq!(mock.collection_len(&healthy_charts), 2);
    assert_eq!(mock.collection_len(&broken_charts), 0);
    // Finalizers ran for both dashboards
    assert_eq!(report_patches(&mock, &healthy), 1);
    assert_eq!(report_patches(&mock, &broken), 1);
    assert_eq!(session.scheduler().pending(), 0);

    // The context is reusable after a failed flush
    mock.clear_failures();
    session
        .report_client
        .set_chart(&broken, ChartPlacement::new("/finance", 1, "line"))
        .await
        .unwrap();
    session.flush().await.unwrap();
    assert_eq!(mock.collection_len(&broken_charts), 1);
}

#[tokio::test]
async fn test_flush_respects_concurrency_bound() {
    let (mock, session, app) = batched_session(2).await;
    let mut workspaces = Vec::new();
    for i in 0..6 {
        workspaces.push(workspace(&session, &app, &format!("ws-{}", i)).await);
    }
    mock.set_latency(Duration::from_millis(20));

    for ws in &workspaces {
        let outcome = session
            .resources()
            .update_child(ws, fields(json!({ "description": "archived" })), None)
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Queued);
    }
    session.flush().await.unwrap();

    assert_eq!(mock.count(Method::Patch), 6);
    assert_eq!(mock.max_in_flight(), 2);
    for ws in &workspaces {
        assert_eq!(mock.record(ws.id().unwrap()).unwrap()["description"], "archived");
    }
}

#[tokio::test]
async fn test_shutdown_flushes_pending_work() {
    let (mock, session, app) = batched_session(4).await;
    let ws = workspace(&session, &app, "Ops").await;
    session
        .resources()
        .update_child(&ws, fields(json!({ "description": "final" })), None)
        .await
        .unwrap();
    assert_eq!(mock.count(Method::Patch), 0);

    session.shutdown().await.unwrap();

    assert_eq!(mock.record(ws.id().unwrap()).unwrap()["description"], "final");
}
