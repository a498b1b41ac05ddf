//! Field declarations: types, modifiers, defaults, computed fields,
//! invariants and constraints.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::expressions::{ComputedExpr, DateExpr, InvariantExpr, Literal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Ref,
    HasMany,
    HasOne,
    BelongsTo,
    Embeds,
}

impl RelationKind {
    /// Kinds that store a key pointing at the target.
    pub fn is_reference(self) -> bool {
        matches!(self, RelationKind::Ref | RelationKind::BelongsTo)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Ref => "ref",
            RelationKind::HasMany => "has_many",
            RelationKind::HasOne => "has_one",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::Embeds => "embeds",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteBehavior {
    Cascade,
    Restrict,
    Nullify,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationType {
    pub kind: RelationKind,
    pub target: String,
    /// Foreign key on the target side for `has_many`/`has_one`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<DeleteBehavior>,
    #[serde(default)]
    pub readonly: bool,
}

impl RelationType {
    pub fn new(kind: RelationKind, target: impl Into<String>) -> Self {
        RelationType {
            kind,
            target: target.into(),
            via: None,
            on_delete: None,
            readonly: false,
        }
    }
}

/// Exactly one kind per field: scalar, enum, or relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Str {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<u32>,
    },
    Text,
    Int,
    Float,
    Decimal {
        precision: u32,
        scale: u32,
    },
    Bool,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Time,
    Uuid,
    Email,
    Url,
    Phone,
    Json,
    Money {
        currency: String,
    },
    File,
    Image,
    Timezone,
    Enum {
        values: Vec<String>,
    },
    /// `enum TaskStatus`: values come from a top-level `enum` declaration
    EnumRef {
        name: String,
    },
    Relation(RelationType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldTypeKind {
    Scalar,
    Enum,
    Relation(RelationKind),
}

impl FieldType {
    pub fn kind(&self) -> FieldTypeKind {
        match self {
            FieldType::Enum { .. } | FieldType::EnumRef { .. } => FieldTypeKind::Enum,
            FieldType::Relation(rel) => FieldTypeKind::Relation(rel.kind),
            _ => FieldTypeKind::Scalar,
        }
    }

    pub fn relation(&self) -> Option<&RelationType> {
        match self {
            FieldType::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn enum_values(&self) -> Option<&[String]> {
        match self {
            FieldType::Enum { values } => Some(values),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Str { max_length: Some(n) } => write!(f, "str({})", n),
            FieldType::Str { max_length: None } => f.write_str("str"),
            FieldType::Text => f.write_str("text"),
            FieldType::Int => f.write_str("int"),
            FieldType::Float => f.write_str("float"),
            FieldType::Decimal { precision, scale } => write!(f, "decimal({},{})", precision, scale),
            FieldType::Bool => f.write_str("bool"),
            FieldType::Date => f.write_str("date"),
            FieldType::DateTime => f.write_str("datetime"),
            FieldType::Time => f.write_str("time"),
            FieldType::Uuid => f.write_str("uuid"),
            FieldType::Email => f.write_str("email"),
            FieldType::Url => f.write_str("url"),
            FieldType::Phone => f.write_str("phone"),
            FieldType::Json => f.write_str("json"),
            FieldType::Money { currency } => write!(f, "money({})", currency),
            FieldType::File => f.write_str("file"),
            FieldType::Image => f.write_str("image"),
            FieldType::Timezone => f.write_str("timezone"),
            FieldType::Enum { values } => write!(f, "enum[{}]", values.join(",")),
            FieldType::EnumRef { name } => write!(f, "enum {}", name),
            FieldType::Relation(rel) => write!(f, "{} {}", rel.kind.as_str(), rel.target),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldModifier {
    Required,
    Optional,
    Unique,
    Pk,
    AutoAdd,
    AutoUpdate,
    Sensitive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum DefaultValue {
    Literal(Literal),
    /// Enum value or symbolic default such as `current_user`
    Identifier(String),
    Date(DateExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<FieldModifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldSpec {
            name: name.into(),
            field_type,
            modifiers: Vec::new(),
            default: None,
        }
    }

    pub fn with_modifier(mut self, modifier: FieldModifier) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    pub fn has(&self, modifier: FieldModifier) -> bool {
        self.modifiers.contains(&modifier)
    }

    pub fn is_required(&self) -> bool {
        self.has(FieldModifier::Required) || self.has(FieldModifier::Pk)
    }

    /// Target entity when this field is a `ref`/`belongs_to`.
    pub fn reference_target(&self) -> Option<&str> {
        match &self.field_type {
            FieldType::Relation(rel) if rel.kind.is_reference() => Some(&rel.target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedFieldSpec {
    pub name: String,
    pub expr: ComputedExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvariantSpec {
    pub expr: InvariantExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    Unique,
    Index,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSpec {
    pub kind: ConstraintKind,
    pub fields: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_target_only_for_key_holding_relations() {
        let owner = FieldSpec::new(
            "owner",
            FieldType::Relation(RelationType::new(RelationKind::Ref, "User")),
        );
        let tasks = FieldSpec::new(
            "tasks",
            FieldType::Relation(RelationType::new(RelationKind::HasMany, "Task")),
        );
        assert_eq!(owner.reference_target(), Some("User"));
        assert_eq!(tasks.reference_target(), None);
        assert_eq!(tasks.field_type.kind(), FieldTypeKind::Relation(RelationKind::HasMany));
    }

    #[test]
    fn modifiers_are_a_set() {
        let f = FieldSpec::new("title", FieldType::Str { max_length: Some(200) })
            .with_modifier(FieldModifier::Required)
            .with_modifier(FieldModifier::Required);
        assert_eq!(f.modifiers, vec![FieldModifier::Required]);
        assert!(f.is_required());
        assert_eq!(f.field_type.to_string(), "str(200)");
    }
}
