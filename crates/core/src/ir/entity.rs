//! Entities, archetypes, enums, state machines and access rules.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::expressions::{ConditionExpr, Duration};
use super::fields::{
    ComputedFieldSpec, ConstraintSpec, FieldModifier, FieldSpec, FieldType, InvariantSpec,
};
use crate::error::Location;

/// Semantic archetype kinds that trigger structural rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchetypeKind {
    Settings,
    Tenant,
    TenantSettings,
    User,
    UserMembership,
}

impl ArchetypeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchetypeKind::Settings => "settings",
            ArchetypeKind::Tenant => "tenant",
            ArchetypeKind::TenantSettings => "tenant_settings",
            ArchetypeKind::User => "user",
            ArchetypeKind::UserMembership => "user_membership",
        }
    }
}

impl fmt::Display for ArchetypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// State machines
// ──────────────────────────────────────────────

pub const WILDCARD_STATE: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTrigger {
    Manual,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionGuard {
    RequiresField {
        field: String,
    },
    Role {
        role: String,
    },
    Expression {
        expr: ConditionExpr,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTransition {
    pub after: Duration,
    /// `auto after 7 days or manual`
    #[serde(default)]
    pub or_manual: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub trigger: TransitionTrigger,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guards: Vec<TransitionGuard>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto: Option<AutoTransition>,
}

impl StateTransition {
    pub fn is_wildcard(&self) -> bool {
        self.from_state == WILDCARD_STATE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateMachineSpec {
    pub status_field: String,
    pub states: Vec<String>,
    pub transitions: Vec<StateTransition>,
}

/// Every concrete state mentioned by a transition list, in first-seen order.
pub fn transition_states(transitions: &[StateTransition]) -> Vec<String> {
    let mut states: Vec<String> = Vec::new();
    for t in transitions {
        for s in [&t.from_state, &t.to_state] {
            if s != WILDCARD_STATE && !states.contains(s) {
                states.push(s.clone());
            }
        }
    }
    states
}

/// Pick the field a `transitions` block drives: the first enum field
/// whose values cover every transition state, else a field literally
/// named `status`.
pub fn select_status_field(fields: &[FieldSpec], transitions: &[StateTransition]) -> Option<String> {
    let needed = transition_states(transitions);
    let covering = fields.iter().find(|f| match &f.field_type {
        FieldType::Enum { values } => needed.iter().all(|s| values.contains(s)),
        _ => false,
    });
    if let Some(field) = covering {
        return Some(field.name.clone());
    }
    fields
        .iter()
        .find(|f| f.name == "status")
        .map(|f| f.name.clone())
}

// ──────────────────────────────────────────────
// Access rules
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOperation {
    Read,
    List,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyEffect {
    Permit,
    Forbid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRule {
    pub operation: AccessOperation,
    pub effect: PolicyEffect,
    pub condition: ConditionExpr,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccessSpec {
    pub rules: Vec<AccessRule>,
}

impl AccessSpec {
    /// Permit every operation to `role(admin)` only.
    pub fn admin_only() -> Self {
        let admin = ConditionExpr::Role {
            role: "admin".into(),
        };
        let rules = [
            AccessOperation::Read,
            AccessOperation::List,
            AccessOperation::Create,
            AccessOperation::Update,
            AccessOperation::Delete,
        ]
        .into_iter()
        .map(|operation| AccessRule {
            operation,
            effect: PolicyEffect::Permit,
            condition: admin.clone(),
        })
        .collect();
        AccessSpec { rules }
    }

    pub fn rules_for(&self, operation: AccessOperation) -> impl Iterator<Item = &AccessRule> {
        self.rules.iter().filter(move |r| r.operation == operation)
    }
}

// ──────────────────────────────────────────────
// Entities
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed_fields: Vec<ComputedFieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<InvariantSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<AccessSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine: Option<StateMachineSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archetype_kind: Option<ArchetypeKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extends: Vec<String>,
    #[serde(default)]
    pub is_tenant_root: bool,
    #[serde(default)]
    pub is_singleton: bool,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
}

impl EntitySpec {
    pub fn new(name: impl Into<String>, loc: Location) -> Self {
        EntitySpec {
            loc,
            name: name.into(),
            title: None,
            intent: None,
            domain: None,
            patterns: Vec::new(),
            fields: Vec::new(),
            computed_fields: Vec::new(),
            invariants: Vec::new(),
            constraints: Vec::new(),
            access: None,
            state_machine: None,
            archetype_kind: None,
            extends: Vec::new(),
            is_tenant_root: false,
            is_singleton: false,
            soft_delete: false,
            display_field: None,
        }
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some() || self.computed_fields.iter().any(|c| c.name == name)
    }

    pub fn primary_key(&self) -> Option<&FieldSpec> {
        self.fields
            .iter()
            .find(|f| f.has(FieldModifier::Pk))
    }

    /// Fields that reference another entity, with the target name.
    pub fn references(&self) -> impl Iterator<Item = (&FieldSpec, &str)> {
        self.fields
            .iter()
            .filter_map(|f| f.reference_target().map(|t| (f, t)))
    }

    pub fn with_fields(self, fields: Vec<FieldSpec>) -> Self {
        EntitySpec { fields, ..self }
    }

    pub fn with_computed_fields(self, computed_fields: Vec<ComputedFieldSpec>) -> Self {
        EntitySpec {
            computed_fields,
            ..self
        }
    }

    pub fn with_invariants(self, invariants: Vec<InvariantSpec>) -> Self {
        EntitySpec { invariants, ..self }
    }

    pub fn with_access(self, access: AccessSpec) -> Self {
        EntitySpec {
            access: Some(access),
            ..self
        }
    }
}

/// A reusable bundle of fields an entity may inherit via `extends`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchetypeSpec {
    pub loc: Location,
    pub name: String,
    pub fields: Vec<FieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub computed_fields: Vec<ComputedFieldSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<InvariantSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub values: Vec<EnumValue>,
}

impl EnumSpec {
    pub fn value_names(&self) -> Vec<&str> {
        self.values.iter().map(|v| v.name.as_str()).collect()
    }
}
