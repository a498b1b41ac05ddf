//! Workspaces: persona-facing dashboards composed of data regions.

use serde::{Deserialize, Serialize};

use super::expressions::{ComputedExpr, ConditionExpr};
use super::surface::SortSpec;
use crate::error::Location;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "personas", rename_all = "snake_case")]
pub enum WorkspaceAccess {
    Public,
    Authenticated,
    Personas(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    List,
    Grid,
    Timeline,
    Map,
    Detail,
    Summary,
    Metrics,
    Kanban,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionAggregate {
    pub name: String,
    pub expr: ComputedExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceRegion {
    pub name: String,
    /// Entity the region draws from; aggregate-only regions may omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ConditionExpr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    pub display: DisplayMode,
    /// Surface opened when an item is selected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aggregates: Vec<RegionAggregate>,
}

impl WorkspaceRegion {
    pub fn new(name: impl Into<String>) -> Self {
        WorkspaceRegion {
            name: name.into(),
            source: None,
            filter: None,
            sort: Vec::new(),
            limit: None,
            display: DisplayMode::List,
            action: None,
            empty_message: None,
            group_by: None,
            aggregates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub access: WorkspaceAccess,
    pub regions: Vec<WorkspaceRegion>,
}

impl WorkspaceSpec {
    pub fn get_region(&self, name: &str) -> Option<&WorkspaceRegion> {
        self.regions.iter().find(|r| r.name == name)
    }
}
