//! Surfaces: entity-bound screens with sections, actions and UX hints.

use serde::{Deserialize, Serialize};

use super::expressions::ConditionExpr;
use crate::error::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceMode {
    List,
    View,
    Create,
    Edit,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceElement {
    pub field_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceSection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub elements: Vec<SurfaceElement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Surface,
    Experience,
    Integration,
}

/// Where an action leads: `-> surface task_detail`,
/// `-> integration billing action charge`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceAction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Event that fires the action, e.g. `click` or `submit`
    pub trigger: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionLevel {
    Critical,
    Warning,
    Notice,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttentionSignal {
    pub level: AttentionLevel,
    pub condition: ConditionExpr,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "filter", rename_all = "snake_case")]
pub enum PersonaScope {
    All,
    Filter(ConditionExpr),
}

/// Per-persona adjustments inside a `ux` block: `for admin:`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaVariant {
    pub persona: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<PersonaScope>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hide: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub show: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub show_aggregate: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_primary: Option<String>,
    #[serde(default)]
    pub read_only: bool,
}

impl PersonaVariant {
    pub fn new(persona: impl Into<String>) -> Self {
        PersonaVariant {
            persona: persona.into(),
            scope: None,
            hide: Vec::new(),
            show: Vec::new(),
            show_aggregate: Vec::new(),
            action_primary: None,
            read_only: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UxSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attention_signals: Vec<AttentionSignal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub persona_variants: Vec<PersonaVariant>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceAccessSpec {
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allow_personas: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deny_personas: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_ref: Option<String>,
    pub mode: SurfaceMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SurfaceSection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<SurfaceAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ux: Option<UxSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<SurfaceAccessSpec>,
}

impl SurfaceSpec {
    pub fn new(name: impl Into<String>, mode: SurfaceMode, loc: Location) -> Self {
        SurfaceSpec {
            loc,
            name: name.into(),
            title: None,
            entity_ref: None,
            mode,
            sections: Vec::new(),
            actions: Vec::new(),
            ux: None,
            access: None,
        }
    }

    /// Every field named by any section, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.sections
            .iter()
            .flat_map(|s| s.elements.iter().map(|e| e.field_name.as_str()))
    }

    pub fn get_action(&self, name: &str) -> Option<&SurfaceAction> {
        self.actions.iter().find(|a| a.name == name)
    }
}
