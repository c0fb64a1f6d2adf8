use resource_sdk::clients::EntityClient;
use resource_sdk::framework::mock::MockTransport;
use resource_sdk::framework::{
    AddRequest, CacheError, Lookup, Method, Outcome, ResourceEntity, SdkError,
};
use resource_sdk::lifecycle::{SdkConfig, Session};
use resource_sdk::model::{
    App, ChartPlacement, DashboardReport, Dataset, DatasetCreate, MenuPathCreate, Report,
    ReportCreate, Workspace, WorkspaceCreate, APP, BUSINESS, DATASET, WORKSPACE,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn workspace(name: &str) -> WorkspaceCreate {
    WorkspaceCreate {
        name: name.to_string(),
        description: None,
    }
}

/// A business with one app ("Finance") on the mock remote, and a session on it.
async fn session_with(config: SdkConfig) -> (Arc<MockTransport>, Session, App) {
    let mock = MockTransport::new();
    let business = mock.seed("", &BUSINESS, fields(json!({ "displayName": "Acme" })));
    mock.seed(
        &format!("business/{}/", business),
        &APP,
        fields(json!({ "name": "Finance" })),
    );
    let session = Session::connect(config.with_business(business), mock.clone())
        .await
        .expect("Failed to connect");
    let app = session.app("Finance").await.expect("Failed to find app");
    (mock, session, app)
}

fn immediate() -> SdkConfig {
    SdkConfig {
        sequential: true,
        ..SdkConfig::default()
    }
}

async fn dashboard(session: &Session, ws: &Workspace, name: &str) -> DashboardReport {
    let report = session
        .report_client
        .create_report(ws, ReportCreate::new(name, "dashboard"))
        .await
        .expect("Failed to create report");
    report.as_dashboard().cloned().expect("Not a dashboard")
}

#[tokio::test]
async fn test_session_requires_business() {
    let mock = MockTransport::new();
    let result = Session::connect(SdkConfig::default(), mock.clone()).await;
    assert!(matches!(result, Err(SdkError::Config(_))));
    mock.verify_no_calls();
}

#[tokio::test]
async fn test_cached_handles_are_shared() {
    let (mock, session, app) = session_with(immediate()).await;

    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .expect("Failed to create workspace");
    mock.reset_calls();

    let by_alias = session
        .workspace_client
        .get(&app, Lookup::from("Ops"))
        .await
        .unwrap()
        .expect("Workspace not found");
    let by_id = session
        .workspace_client
        .get(&app, Lookup::Id(ws.id().unwrap()))
        .await
        .unwrap()
        .expect("Workspace not found");
    let listed = session.workspace_client.list(&app).await.unwrap();

    assert!(by_alias.resource().ptr_eq(ws.resource()));
    assert!(by_id.resource().ptr_eq(ws.resource()));
    assert_eq!(listed.len(), 1);
    assert!(listed[0].resource().ptr_eq(ws.resource()));

    // One handle, one state
    by_alias.set_description("edited");
    assert_eq!(ws.description().as_deref(), Some("edited"));
    assert!(ws.resource().is_dirty());

    mock.verify_no_calls();
}

#[tokio::test]
async fn test_alias_is_unique_per_cache() {
    let (mock, session, app) = session_with(immediate()).await;

    session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .expect("Failed to create workspace");
    mock.reset_calls();

    let err = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SdkError::Cache(CacheError::AliasExists { ref alias, .. }) if alias == "Ops"
    ));
    mock.verify_no_calls();
    assert_eq!(app.workspaces_cache().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_refuses_records_already_on_the_remote() {
    let (mock, session, app) = session_with(immediate()).await;
    let base = app.resource().base_url().unwrap();
    mock.seed(&base, &WORKSPACE, fields(json!({ "name": "Legacy" })));

    // The cache is not listed yet, so the alias check lists first
    let err = session
        .workspace_client
        .create_workspace(&app, workspace("Legacy"))
        .await
        .unwrap_err();

    assert!(matches!(err, SdkError::Cache(CacheError::AliasExists { .. })));
    assert_eq!(mock.count(Method::Post), 0);
    assert_eq!(mock.collection_len(&format!("{}workspaces", base)), 1);
}

#[tokio::test]
async fn test_duplicate_alias_evicts_without_cache() {
    let config = SdkConfig {
        cache_enabled: false,
        ..immediate()
    };
    let (mock, session, app) = session_with(config).await;

    let first = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let second = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .expect("No-cache mode evicts instead of refusing");

    assert_ne!(first.id(), second.id());
    assert_eq!(mock.count(Method::Post), 2);

    let cached = app.workspaces_cache().unwrap().cached();
    assert_eq!(cached.len(), 1);
    assert!(cached[0].ptr_eq(second.resource()));
}

#[tokio::test]
async fn test_no_cache_listing_writes_dirty_entries_and_refetches() {
    let (mock, session, app) = session_with(immediate()).await;
    session.set_cache_enabled(false);

    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    ws.set_description("local edit");

    // Someone else creates a workspace behind our back
    let base = app.resource().base_url().unwrap();
    mock.seed(&base, &WORKSPACE, fields(json!({ "name": "External" })));
    mock.reset_calls();

    let listed = session.workspace_client.list(&app).await.unwrap();

    let methods: Vec<Method> = mock.calls().iter().map(|c| c.method).collect();
    assert_eq!(methods, vec![Method::Patch, Method::Get]);
    assert_eq!(listed.len(), 2);
    assert_eq!(
        mock.record(ws.id().unwrap()).unwrap()["description"],
        "local edit"
    );
    assert!(!ws.resource().is_dirty());
}

#[tokio::test]
async fn test_get_by_unknown_id_is_none() {
    let (_mock, session, app) = session_with(immediate()).await;

    let missing = session
        .workspace_client
        .get(&app, Lookup::Id(Uuid::new_v4()))
        .await
        .expect("Absence is not an error");
    assert!(missing.is_none());

    let err = app
        .workspaces_cache()
        .unwrap()
        .delete(Lookup::Id(Uuid::new_v4()))
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::Cache(CacheError::NotFound { .. })));

    let deleted = app
        .workspaces_cache()
        .unwrap()
        .delete(Lookup::from("Nobody"))
        .await
        .unwrap();
    assert!(!deleted);
}

#[tokio::test]
async fn test_missing_mandatory_fields_are_refused_locally() {
    let (mock, _session, app) = session_with(immediate()).await;
    mock.reset_calls();

    let err = app
        .workspaces_cache()
        .unwrap()
        .add(AddRequest::params(Map::new()))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SdkError::MissingFields { ref fields, .. } if fields == &vec!["name".to_string()]
    ));
    mock.verify_no_calls();
}

#[tokio::test]
async fn test_rename_moves_the_alias() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();

    let outcome = session
        .workspace_client
        .rename_workspace(&ws, "Operations")
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(ws.name().as_deref(), Some("Operations"));
    assert_eq!(mock.record(ws.id().unwrap()).unwrap()["name"], "Operations");

    mock.reset_calls();
    let renamed = session
        .workspace_client
        .get(&app, Lookup::from("Operations"))
        .await
        .unwrap()
        .expect("New alias resolves");
    assert!(renamed.resource().ptr_eq(ws.resource()));
    let old = session
        .workspace_client
        .get(&app, Lookup::from("Ops"))
        .await
        .unwrap();
    assert!(old.is_none());
    // The full listing was already cached
    mock.verify_no_calls();
}

#[tokio::test]
async fn test_delete_workspace() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let id = ws.id().unwrap();

    session.workspace_client.delete(&ws).await.unwrap();

    assert!(mock.record(id).is_none());
    assert!(session
        .workspace_client
        .get(&app, Lookup::from("Ops"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_switch_workspace_invalidates_previous_children() {
    let (_mock, session, app) = session_with(immediate()).await;
    let first = session
        .workspace_client
        .create_workspace(&app, workspace("First"))
        .await
        .unwrap();
    let second = session
        .workspace_client
        .create_workspace(&app, workspace("Second"))
        .await
        .unwrap();

    session.switch_workspace(first.clone()).await.unwrap();
    session
        .workspace_client
        .ensure_menu_path(
            &first,
            MenuPathCreate {
                path: "/finance".into(),
                title: None,
            },
        )
        .await
        .unwrap();
    let menu_paths = first.menu_paths_cache().unwrap();
    assert!(menu_paths.is_listed());
    assert_eq!(menu_paths.len(), 1);

    // Re-activating the same workspace keeps its caches
    session.switch_workspace(first.clone()).await.unwrap();
    assert_eq!(menu_paths.len(), 1);

    session.switch_workspace(second.clone()).await.unwrap();
    assert!(menu_paths.is_empty());
    assert!(!menu_paths.is_listed());
    assert!(session
        .active_workspace()
        .unwrap()
        .resource()
        .ptr_eq(second.resource()));

    // The remote data is still there and is fetched again on demand
    let fetched = session.workspace_client.menu_paths(&first).await.unwrap();
    assert_eq!(fetched.len(), 1);
}

#[tokio::test]
async fn test_ensure_menu_path_creates_once() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    mock.reset_calls();

    let create = MenuPathCreate {
        path: "/finance/q3".into(),
        title: Some("Q3".into()),
    };
    let first = session
        .workspace_client
        .ensure_menu_path(&ws, create.clone())
        .await
        .unwrap();
    let second = session
        .workspace_client
        .ensure_menu_path(&ws, create)
        .await
        .unwrap();

    assert!(first.resource().ptr_eq(second.resource()));
    assert_eq!(first.title().as_deref(), Some("Q3"));
    assert_eq!(mock.count(Method::Post), 1);
}

#[tokio::test]
async fn test_set_chart_creates_then_updates_the_slot() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let report = dashboard(&session, &ws, "Overview").await;

    let outcome = session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "line"))
        .await
        .unwrap();
    assert_eq!(outcome, Outcome::Completed);

    session
        .report_client
        .set_chart(&report, ChartPlacement::new("/finance", 1, "bar"))
        .await
        .unwrap();

    let charts = session.report_client.charts(&report).await.unwrap();
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].chart_type().as_deref(), Some("bar"));
    let chart_id = charts[0].id().unwrap();
    assert_eq!(mock.record(chart_id).unwrap()["chartType"], "bar");

    let expected = json!([{ "tab": "", "order": 1, "chart": chart_id.to_string() }]);
    assert_eq!(report.resource().get("layout"), Some(expected.clone()));
    assert_eq!(mock.record(report.id().unwrap()).unwrap()["layout"], expected);
}

#[tokio::test]
async fn test_relayout_orders_by_tab_then_order() {
    let (_mock, session, app) = session_with(SdkConfig::default()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let report = dashboard(&session, &ws, "Overview").await;

    for placement in [
        ChartPlacement::new("/finance", 2, "bar").on_tab("B"),
        ChartPlacement::new("/finance", 1, "pie").on_tab("B"),
        ChartPlacement::new("/finance", 5, "line").on_tab("A"),
    ] {
        session.report_client.set_chart(&report, placement).await.unwrap();
    }
    session.flush().await.unwrap();

    let layout = report.resource().get("layout").expect("Layout written");
    let slots: Vec<(String, u64)> = layout
        .as_array()
        .unwrap()
        .iter()
        .map(|slot| {
            (
                slot["tab"].as_str().unwrap().to_string(),
                slot["order"].as_u64().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        slots,
        vec![("A".into(), 5), ("B".into(), 1), ("B".into(), 2)]
    );
}

#[tokio::test]
async fn test_convert_report_clears_undeclared_fields() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let report = session
        .report_client
        .create_report(&ws, ReportCreate::new("Sales", "table").under("/finance"))
        .await
        .unwrap();
    assert_eq!(report.tag(), "table");
    session
        .resources()
        .update_child(&report, fields(json!({ "dataset": "revenue" })), None)
        .await
        .unwrap();

    session
        .report_client
        .convert_report(&report, "markdown")
        .await
        .unwrap();

    let id = report.id().unwrap();
    let remote = mock.record(id).unwrap();
    assert_eq!(remote["reportType"], "markdown");
    assert_eq!(remote["dataset"], Value::Null);
    assert_eq!(remote["menuPath"], "/finance");

    let converted = Report::from_resource(report.resource().clone()).unwrap();
    assert!(matches!(converted, Report::Markdown(_)));
}

#[tokio::test]
async fn test_unknown_report_type_is_refused() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    mock.reset_calls();

    let err = session
        .report_client
        .create_report(&ws, ReportCreate::new("Odd", "pivot"))
        .await
        .unwrap_err();

    assert!(matches!(err, SdkError::UnknownReportType(ref tag) if tag == "pivot"));
    mock.verify_no_calls();
}

#[tokio::test]
async fn test_listing_follows_pagination() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    let base = ws.resource().base_url().unwrap();
    for name in ["a", "b", "c", "d", "e"] {
        mock.seed(&base, &DATASET, fields(json!({ "name": name })));
    }
    mock.set_page_size(2);
    mock.reset_calls();

    // A limited listing does not count as a full one
    let some = session
        .resources()
        .list_children::<Dataset>(ws.resource(), Some(3))
        .await
        .unwrap();
    assert_eq!(some.len(), 3);
    assert!(!ws.datasets_cache().unwrap().is_listed());

    mock.reset_calls();
    let all = session.workspace_client.datasets(&ws).await.unwrap();
    assert_eq!(all.len(), 5);

    let pages = mock.calls_for(Method::Get);
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[0].query_param("nextToken"), None);
    assert_eq!(pages[1].query_param("nextToken"), Some("2"));
    assert_eq!(pages[2].query_param("nextToken"), Some("4"));
    assert!(ws.datasets_cache().unwrap().is_listed());
}

#[tokio::test]
async fn test_create_datasets_in_one_batch() {
    let (mock, session, app) = session_with(immediate()).await;
    let ws = session
        .workspace_client
        .create_workspace(&app, workspace("Ops"))
        .await
        .unwrap();
    mock.reset_calls();

    let created = session
        .workspace_client
        .create_datasets(
            &ws,
            vec![
                DatasetCreate::new("revenue"),
                DatasetCreate::new("costs"),
            ],
        )
        .await
        .unwrap();

    assert_eq!(created.len(), 2);
    assert_eq!(mock.count(Method::Post), 1);
    let found = session
        .workspace_client
        .datasets(&ws)
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.name().as_deref() == Some("costs"))
        .count();
    assert_eq!(found, 1);
}

#[tokio::test]
async fn test_listing_keeps_smallest_id_per_alias() {
    let (mock, _session, app) = session_with(immediate()).await;
    let base = app.resource().base_url().unwrap();
    let a = mock.seed(&base, &WORKSPACE, fields(json!({ "name": "dup" })));
    let b = mock.seed(&base, &WORKSPACE, fields(json!({ "name": "dup" })));
    let (small, large) = if a < b { (a, b) } else { (b, a) };
    let cache = app.workspaces_cache().unwrap();

    // The larger id is cached first, and still loses the alias
    let early = cache
        .get(Lookup::Id(large))
        .await
        .unwrap()
        .expect("Workspace not found");
    let listed = cache.list(None).await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), Some(small));
    let winner = cache
        .get(Lookup::from("dup"))
        .await
        .unwrap()
        .expect("Alias resolves");
    assert_eq!(winner.id(), Some(small));
    assert!(!winner.ptr_eq(&early));
    assert!(cache.cached().iter().all(|r| r.id() != Some(large)));
}

#[tokio::test]
async fn test_concurrent_listings_fetch_once() {
    let (mock, _session, app) = session_with(immediate()).await;
    let base = app.resource().base_url().unwrap();
    for name in ["a", "b", "c"] {
        mock.seed(&base, &WORKSPACE, fields(json!({ "name": name })));
    }
    mock.set_latency(Duration::from_millis(20));
    mock.reset_calls();
    let cache = app.workspaces_cache().unwrap();

    let (first, second) = tokio::join!(cache.list(None), cache.list(None));

    assert_eq!(mock.count(Method::Get), 1);
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_eq!(first.len(), 3);
    assert_eq!(second.len(), 3);
    for (one, other) in first.iter().zip(&second) {
        assert!(one.ptr_eq(other));
    }
}
