//! Governance sections: data policies, tenancy, API interfaces and data
//! products.

use serde::{Deserialize, Serialize};

use super::entity::AccessOperation;
use super::expressions::Duration;
use crate::error::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataClassification {
    PiiDirect,
    PiiIndirect,
    PiiSensitive,
    Financial,
    Health,
    Confidential,
    Public,
}

/// `classify Customer.email as pii_direct`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub entity: String,
    pub field: String,
    pub classification: DataClassification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasureMode {
    Delete,
    Anonymize,
    Retain,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasurePolicy {
    pub entity: String,
    pub mode: ErasureMode,
}

/// Application-wide singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoliciesSpec {
    pub loc: Location,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classifications: Vec<Classification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub erasures: Vec<ErasurePolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_retention: Option<Duration>,
    #[serde(default)]
    pub audit_access: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenancyMode {
    SharedSchema,
    SchemaPerTenant,
    DatabasePerTenant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    Strict,
    Relaxed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    Auto,
    Manual,
}

/// Application-wide singleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenancySpec {
    pub loc: Location,
    pub mode: TenancyMode,
    pub isolation: IsolationLevel,
    pub provisioning: Provisioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStyle {
    Rest,
    Graphql,
    Grpc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiAuth {
    None,
    ApiKey,
    Oauth2,
    Jwt,
}

/// `expose Task: [list, read]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiExposure {
    pub entity: String,
    pub operations: Vec<AccessOperation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiInterfaceSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub style: ApiStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub auth: ApiAuth,
    pub exposes: Vec<ApiExposure>,
    /// Requests per minute per client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshCadence {
    Realtime,
    Hourly,
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataProductSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub sources: Vec<String>,
    pub refresh: RefreshCadence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Classifications excluded from the product
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classification_filter: Vec<DataClassification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}
