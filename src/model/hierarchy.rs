//! Business, App, Workspace and the workspace's plain children.

use super::schema::*;
use crate::framework::{Connection, Resource};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

resource_entity! {
    /// Root of the hierarchy. Always bound: the business already exists remotely.
    Business => BUSINESS {
        fields { display_name: "displayName" }
        children { apps: APP }
    }
}

impl Business {
    pub fn open(connection: Arc<Connection>, id: Uuid) -> Self {
        Self(Resource::root(&BUSINESS, connection, Some(id)))
    }
}

resource_entity! {
    App => APP {
        fields { name: "name", description: "description" }
        children { workspaces: WORKSPACE }
    }
}

resource_entity! {
    /// The unit of work a session operates in. Switching the active workspace
    /// invalidates the caches below the previous one.
    Workspace => WORKSPACE {
        fields { name: "name", description: "description" }
        children { menu_paths: MENU_PATH, datasets: DATASET, reports: REPORT }
    }
}

resource_entity! {
    /// A navigation entry reports hang off.
    MenuPath => MENU_PATH {
        fields { path: "path", title: "title" }
        children {}
    }
}

resource_entity! {
    Dataset => DATASET {
        fields { name: "name", source: "source" }
        children {}
    }
}

impl Dataset {
    pub fn columns(&self) -> Vec<String> {
        self.0
            .get("columns")
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuPathCreate {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl DatasetCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            columns: Vec::new(),
        }
    }
}
