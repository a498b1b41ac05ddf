//! External and domain services, foreign models and integrations.

use serde::{Deserialize, Serialize};

use super::expressions::FieldPath;
use super::fields::FieldSpec;
use crate::error::Location;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ApiSpecSource {
    Url(String),
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthProfile {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<(String, String)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainServiceKind {
    DomainLogic,
    Validation,
    Integration,
    Workflow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ServiceBody {
    /// Third-party API described by a spec document
    Api {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        spec: Option<ApiSpecSource>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auth_profile: Option<AuthProfile>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<String>,
    },
    /// Business logic implemented outside the DSL as a stub
    Domain {
        kind: DomainServiceKind,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inputs: Vec<FieldSpec>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        outputs: Vec<FieldSpec>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        guarantees: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stub: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub body: ServiceBody,
}

impl ServiceSpec {
    pub fn is_domain(&self) -> bool {
        matches!(self.body, ServiceBody::Domain { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignConstraint {
    ReadOnly,
    EventDriven,
    BatchImport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignModelSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub service: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub key_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ForeignConstraint>,
    pub fields: Vec<FieldSpec>,
}

/// `target <- source.path`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    pub target: String,
    pub source: FieldPath,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMapping {
    pub foreign_model: String,
    pub entity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<MappingRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationAction {
    pub name: String,
    /// Surface whose event fires the action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_event: Option<String>,
    pub call_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mapping: Vec<MappingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMapping>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncMode {
    Scheduled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cron: Option<String>,
    },
    EventDriven,
}

/// `foreign_field <-> entity_field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    pub foreign_field: String,
    pub entity_field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSync {
    pub name: String,
    pub mode: SyncMode,
    pub from_service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_foreign_model: Option<String>,
    pub into_entity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_rules: Vec<MatchRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<IntegrationAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub syncs: Vec<IntegrationSync>,
}

impl IntegrationSpec {
    pub fn get_action(&self, name: &str) -> Option<&IntegrationAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}
