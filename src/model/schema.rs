//! Static schemas of the resource hierarchy.

use crate::framework::{AliasField, ResourceSchema};

pub static BUSINESS: ResourceSchema = ResourceSchema {
    resource_type: "business",
    plural: "businesses",
    alias: AliasField::None,
    mandatory: &[],
    children: &[&APP],
};

pub static APP: ResourceSchema = ResourceSchema {
    resource_type: "app",
    plural: "apps",
    alias: AliasField::Single("name"),
    mandatory: &["name"],
    children: &[&WORKSPACE],
};

pub static WORKSPACE: ResourceSchema = ResourceSchema {
    resource_type: "workspace",
    plural: "workspaces",
    alias: AliasField::Single("name"),
    mandatory: &["name"],
    children: &[&MENU_PATH, &DATASET, &REPORT],
};

pub static MENU_PATH: ResourceSchema = ResourceSchema {
    resource_type: "menuPath",
    plural: "menuPaths",
    alias: AliasField::Single("path"),
    mandatory: &["path"],
    children: &[],
};

pub static DATASET: ResourceSchema = ResourceSchema {
    resource_type: "dataset",
    plural: "datasets",
    alias: AliasField::Single("name"),
    mandatory: &["name"],
    children: &[],
};

/// All report variants share one schema; the variant is chosen from the
/// `reportType` field (see [`REPORT_TYPES`](crate::model::REPORT_TYPES)).
pub static REPORT: ResourceSchema = ResourceSchema {
    resource_type: "report",
    plural: "reports",
    alias: AliasField::Single("name"),
    mandatory: &["name", "reportType"],
    children: &[&CHART],
};

/// Charts are addressed by their slot on the dashboard.
pub static CHART: ResourceSchema = ResourceSchema {
    resource_type: "chart",
    plural: "charts",
    alias: AliasField::Tuple(&["path", "tab", "order"]),
    mandatory: &["path", "order", "chartType"],
    children: &[],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_is_declared() {
        assert!(BUSINESS.declares(&APP));
        assert!(APP.declares(&WORKSPACE));
        assert!(WORKSPACE.declares(&REPORT));
        assert!(WORKSPACE.declares(&MENU_PATH));
        assert!(REPORT.declares(&CHART));
        assert!(!WORKSPACE.declares(&CHART));
    }
}
