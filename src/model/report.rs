//! # Reports and Charts
//!
//! A report record carries a `reportType` tag. The tag is resolved once, when a
//! [`Resource`] is wrapped, through the [`REPORT_TYPES`] registry:
//!
//! | tag | variant | own fields |
//! |-----|---------|------------|
//! | `dashboard` | [`DashboardReport`] | `layout`, `tabs` |
//! | `table` | [`TableReport`] | `dataset`, `columns`, `pageSize` |
//! | `markdown` | [`MarkdownReport`] | `content` |
//!
//! Changing the type of an existing report ([`Report::convert_to`]) keeps only
//! the fields the new variant declares; the others are cleared.

use super::schema::*;
use crate::framework::{Alias, Resource, ResourceEntity, ResourceSchema, SdkError, SdkResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields every report variant keeps.
const COMMON_FIELDS: &[&str] = &["name", "reportType", "menuPath", "description"];

resource_entity! {
    /// A report made of charts laid out in tabs.
    DashboardReport => REPORT {
        fields { name: "name", menu_path: "menuPath" }
        children { charts: CHART }
    }
}

resource_entity! {
    TableReport => REPORT {
        fields { name: "name", menu_path: "menuPath", dataset: "dataset" }
        children {}
    }
}

resource_entity! {
    MarkdownReport => REPORT {
        fields { name: "name", menu_path: "menuPath", content: "content" }
        children {}
    }
}

/// One entry of the report-type registry.
pub struct ReportType {
    pub tag: &'static str,
    /// Fields specific to this variant, on top of the common ones.
    pub fields: &'static [&'static str],
    build: fn(Resource) -> Report,
}

impl ReportType {
    pub fn declares(&self, field: &str) -> bool {
        COMMON_FIELDS.contains(&field) || self.fields.contains(&field)
    }
}

impl std::fmt::Debug for ReportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportType").field("tag", &self.tag).finish()
    }
}

pub static REPORT_TYPES: &[ReportType] = &[
    ReportType {
        tag: "dashboard",
        fields: &["layout", "tabs"],
        build: |r| Report::Dashboard(DashboardReport(r)),
    },
    ReportType {
        tag: "table",
        fields: &["dataset", "columns", "pageSize"],
        build: |r| Report::Table(TableReport(r)),
    },
    ReportType {
        tag: "markdown",
        fields: &["content"],
        build: |r| Report::Markdown(MarkdownReport(r)),
    },
];

pub fn report_type(tag: &str) -> SdkResult<&'static ReportType> {
    REPORT_TYPES
        .iter()
        .find(|t| t.tag == tag)
        .ok_or_else(|| SdkError::UnknownReportType(tag.to_string()))
}

/// A report of any registered type.
#[derive(Clone, Debug)]
pub enum Report {
    Dashboard(DashboardReport),
    Table(TableReport),
    Markdown(MarkdownReport),
}

impl ResourceEntity for Report {
    fn schema() -> &'static ResourceSchema {
        &REPORT
    }

    fn from_resource(resource: Resource) -> SdkResult<Self> {
        super::expect_type(&resource, &REPORT)?;
        let tag = resource
            .get_str("reportType")
            .ok_or_else(|| SdkError::UnknownReportType("<missing>".into()))?;
        Ok((report_type(&tag)?.build)(resource))
    }

    fn resource(&self) -> &Resource {
        match self {
            Report::Dashboard(r) => r.resource(),
            Report::Table(r) => r.resource(),
            Report::Markdown(r) => r.resource(),
        }
    }
}

impl Report {
    pub fn tag(&self) -> &'static str {
        match self {
            Report::Dashboard(_) => "dashboard",
            Report::Table(_) => "table",
            Report::Markdown(_) => "markdown",
        }
    }

    pub fn name(&self) -> Option<String> {
        self.resource().get_str("name")
    }

    pub fn as_dashboard(&self) -> Option<&DashboardReport> {
        match self {
            Report::Dashboard(d) => Some(d),
            _ => None,
        }
    }

    /// The field changes that turn this report into a `tag` report: the new
    /// tag, plus a `null` for every field the new variant does not declare.
    pub fn conversion(&self, tag: &str) -> SdkResult<Map<String, Value>> {
        let target = report_type(tag)?;
        let mut changes: Map<String, Value> = self
            .resource()
            .params()
            .into_iter()
            .filter(|(field, value)| !target.declares(field) && !value.is_null())
            .map(|(field, _)| (field, Value::Null))
            .collect();
        changes.insert("reportType".into(), Value::String(target.tag.into()));
        Ok(changes)
    }

    /// Converts the report locally. The changes are dirty until the report is
    /// next updated.
    pub fn convert_to(&self, tag: &str) -> SdkResult<Report> {
        let changes = self.conversion(tag)?;
        let resource = self.resource().clone();
        resource.set_all(changes);
        Report::from_resource(resource)
    }
}

/// Fields of a new report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCreate {
    pub name: String,
    pub report_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub menu_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ReportCreate {
    pub fn new(name: impl Into<String>, report_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            report_type: report_type.into(),
            menu_path: None,
            description: None,
        }
    }

    pub fn under(mut self, menu_path: impl Into<String>) -> Self {
        self.menu_path = Some(menu_path.into());
        self
    }
}

resource_entity! {
    Chart => CHART {
        fields { path: "path", tab: "tab", chart_type: "chartType", dataset: "dataset" }
        children {}
    }
}

impl Chart {
    pub fn order(&self) -> Option<u32> {
        self.0
            .get("order")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    }
}

/// Where and what to draw on a dashboard.
///
/// A placement is identified by `(path, tab, order)`; setting a chart on an
/// occupied slot updates the chart already there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPlacement {
    pub path: String,
    pub order: u32,
    #[serde(default)]
    pub tab: String,
    pub chart_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl ChartPlacement {
    pub fn new(path: impl Into<String>, order: u32, chart_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            order,
            tab: String::new(),
            chart_type: chart_type.into(),
            dataset: None,
            options: Map::new(),
        }
    }

    pub fn on_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = tab.into();
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The chart alias this placement resolves to.
    pub fn alias(&self) -> Alias {
        Alias::Tuple(vec![self.path.clone(), self.tab.clone(), self.order.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::mock::MockTransport;
    use crate::framework::Connection;
    use crate::model::to_params;
    use serde_json::json;

    fn report_resource(fields: Value) -> Resource {
        let Value::Object(fields) = fields else {
            unreachable!()
        };
        let resource = Resource::root(&REPORT, Connection::new(MockTransport::new(), true), None);
        resource.set_all(fields);
        resource
    }

    #[test]
    fn registry_dispatch() {
        let report = Report::from_resource(report_resource(json!({"name": "r", "reportType": "table"}))).unwrap();
        assert!(matches!(report, Report::Table(_)));
        assert_eq!(report.tag(), "table");

        let err = Report::from_resource(report_resource(json!({"name": "r", "reportType": "pie"}))).unwrap_err();
        assert!(matches!(err, SdkError::UnknownReportType(ref t) if t == "pie"));
    }

    #[test]
    fn conversion_clears_undeclared_fields() {
        let report = Report::from_resource(report_resource(json!({
            "name": "r",
            "reportType": "table",
            "dataset": "sales",
            "pageSize": 50
        })))
        .unwrap();

        let changes = report.conversion("markdown").unwrap();
        assert_eq!(
            Value::Object(changes),
            json!({"reportType": "markdown", "dataset": null, "pageSize": null})
        );

        let converted = report.convert_to("markdown").unwrap();
        assert!(matches!(converted, Report::Markdown(_)));
        assert!(converted.resource().ptr_eq(report.resource()));
        assert!(report.conversion("gantt").is_err());
    }

    #[test]
    fn placement_alias_matches_chart_alias_field() {
        let placement = ChartPlacement::new("/sales", 2, "bar").on_tab("Q1");
        let params = to_params(&placement).unwrap();
        assert_eq!(CHART.alias.extract(&params), Some(placement.alias()));
    }
}
