use serde::{Deserialize, Serialize};

use super::expressions::Duration;
use super::fields::FieldSpec;
use crate::error::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Intent,
    Fact,
    Observation,
    Derived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderingScope {
    PerPartition,
    Global,
}

/// One event shape carried by a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub kind: StreamKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key: Option<String>,
    pub ordering_scope: OrderingScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention: Option<Duration>,
    pub schemas: Vec<StreamSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derives_from: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<String>,
}

impl StreamSpec {
    pub fn get_schema(&self, name: &str) -> Option<&StreamSchema> {
        self.schemas.iter().find(|s| s.name == name)
    }
}
