//! Expression trees shared by conditions, computed fields and invariants.
//!
//! All three are closed, non-recursive-by-call grammars: the only
//! "functions" are the aggregate allow-list in [`AggregateFunction`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keywords::Keyword;

// ──────────────────────────────────────────────
// Paths and literals
// ──────────────────────────────────────────────

/// A dotted field reference such as `owner.team.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath {
    pub segments: Vec<String>,
}

impl FieldPath {
    pub fn new(segments: Vec<String>) -> Self {
        FieldPath { segments }
    }

    pub fn single(name: impl Into<String>) -> Self {
        FieldPath {
            segments: vec![name.into()],
        }
    }

    /// First segment: the field on the owning entity.
    pub fn root(&self) -> &str {
        self.segments.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_simple(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Str(String),
    Int(i64),
    /// Kept as written to preserve exact representation
    Decimal(String),
    Bool(bool),
    Null,
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "\"{}\"", s),
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Decimal(d) => f.write_str(d),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

// ──────────────────────────────────────────────
// Durations and dates
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Years,
}

impl DurationUnit {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "ms" => Some(DurationUnit::Milliseconds),
            "s" => Some(DurationUnit::Seconds),
            "m" | "min" => Some(DurationUnit::Minutes),
            "h" => Some(DurationUnit::Hours),
            "d" => Some(DurationUnit::Days),
            "w" => Some(DurationUnit::Weeks),
            "y" => Some(DurationUnit::Years),
            _ => None,
        }
    }

    /// Long spelling used by `auto after N days` style guards.
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "millisecond" | "milliseconds" => Some(DurationUnit::Milliseconds),
            "second" | "seconds" => Some(DurationUnit::Seconds),
            "minute" | "minutes" => Some(DurationUnit::Minutes),
            "hour" | "hours" => Some(DurationUnit::Hours),
            "day" | "days" => Some(DurationUnit::Days),
            "week" | "weeks" => Some(DurationUnit::Weeks),
            "year" | "years" => Some(DurationUnit::Years),
            other => DurationUnit::from_suffix(other),
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            DurationUnit::Milliseconds => "ms",
            DurationUnit::Seconds => "s",
            DurationUnit::Minutes => "m",
            DurationUnit::Hours => "h",
            DurationUnit::Days => "d",
            DurationUnit::Weeks => "w",
            DurationUnit::Years => "y",
        }
    }

    fn millis(self) -> u64 {
        match self {
            DurationUnit::Milliseconds => 1,
            DurationUnit::Seconds => 1_000,
            DurationUnit::Minutes => 60_000,
            DurationUnit::Hours => 3_600_000,
            DurationUnit::Days => 86_400_000,
            DurationUnit::Weeks => 7 * 86_400_000,
            DurationUnit::Years => 365 * 86_400_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Duration {
    pub amount: u64,
    pub unit: DurationUnit,
}

impl Duration {
    pub fn new(amount: u64, unit: DurationUnit) -> Self {
        Duration { amount, unit }
    }

    /// Parse a DURATION token text such as `7d` or `15min`.
    pub fn parse(text: &str) -> Option<Self> {
        let split = text.find(|c: char| !c.is_ascii_digit())?;
        let (digits, suffix) = text.split_at(split);
        let amount = digits.parse().ok()?;
        Some(Duration {
            amount,
            unit: DurationUnit::from_suffix(suffix)?,
        })
    }

    pub fn as_millis(&self) -> u64 {
        self.amount.saturating_mul(self.unit.millis())
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateAnchor {
    Today,
    Now,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffsetSign {
    Plus,
    Minus,
}

/// `today`, `now`, optionally shifted: `today + 7d`, `now - 2h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateExpr {
    pub anchor: DateAnchor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<(OffsetSign, Duration)>,
}

impl fmt::Display for DateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let anchor = match self.anchor {
            DateAnchor::Today => "today",
            DateAnchor::Now => "now",
        };
        f.write_str(anchor)?;
        if let Some((sign, duration)) = &self.offset {
            let s = match sign {
                OffsetSign::Plus => '+',
                OffsetSign::Minus => '-',
            };
            write!(f, " {} {}", s, duration)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Condition expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    In,
    NotIn,
    Is,
    IsNot,
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Ge => ">=",
            ComparisonOp::Le => "<=",
            ComparisonOp::In => "in",
            ComparisonOp::NotIn => "not in",
            ComparisonOp::Is => "is",
            ComparisonOp::IsNot => "is not",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalOp {
    And,
    Or,
}

/// Right-hand side of a comparison. One case per shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ConditionValue {
    Literal(Literal),
    /// Bare word: an enum value or a reference like `current_user`
    Identifier(String),
    Path(FieldPath),
    List(Vec<ConditionValue>),
    Date(DateExpr),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionExpr {
    Comparison {
        field: FieldPath,
        op: ComparisonOp,
        value: ConditionValue,
    },
    Role {
        role: String,
    },
    Logical {
        op: LogicalOp,
        left: Box<ConditionExpr>,
        right: Box<ConditionExpr>,
    },
}

impl ConditionExpr {
    pub fn and(left: ConditionExpr, right: ConditionExpr) -> Self {
        ConditionExpr::Logical {
            op: LogicalOp::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: ConditionExpr, right: ConditionExpr) -> Self {
        ConditionExpr::Logical {
            op: LogicalOp::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Every left-hand field path, depth first.
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            ConditionExpr::Comparison { field, .. } => out.push(field),
            ConditionExpr::Role { .. } => {}
            ConditionExpr::Logical { left, right, .. } => {
                left.collect_paths(out);
                right.collect_paths(out);
            }
        }
    }

    pub fn roles(&self) -> Vec<&str> {
        match self {
            ConditionExpr::Comparison { .. } => Vec::new(),
            ConditionExpr::Role { role } => vec![role.as_str()],
            ConditionExpr::Logical { left, right, .. } => {
                let mut out = left.roles();
                out.extend(right.roles());
                out
            }
        }
    }
}

// ──────────────────────────────────────────────
// Computed expressions
// ──────────────────────────────────────────────

/// The closed set of callable functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    DaysUntil,
    DaysSince,
}

impl AggregateFunction {
    pub fn from_keyword(keyword: Keyword) -> Option<Self> {
        match keyword {
            Keyword::Count => Some(AggregateFunction::Count),
            Keyword::Sum => Some(AggregateFunction::Sum),
            Keyword::Avg => Some(AggregateFunction::Avg),
            Keyword::Min => Some(AggregateFunction::Min),
            Keyword::Max => Some(AggregateFunction::Max),
            Keyword::DaysUntil => Some(AggregateFunction::DaysUntil),
            Keyword::DaysSince => Some(AggregateFunction::DaysSince),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::DaysUntil => "days_until",
            AggregateFunction::DaysSince => "days_since",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithmeticOp {
    pub fn symbol(self) -> char {
        match self {
            ArithmeticOp::Add => '+',
            ArithmeticOp::Sub => '-',
            ArithmeticOp::Mul => '*',
            ArithmeticOp::Div => '/',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComputedExpr {
    Field {
        path: FieldPath,
    },
    Number {
        value: String,
    },
    Aggregate {
        function: AggregateFunction,
        argument: FieldPath,
    },
    Binary {
        op: ArithmeticOp,
        left: Box<ComputedExpr>,
        right: Box<ComputedExpr>,
    },
}

impl ComputedExpr {
    pub fn binary(op: ArithmeticOp, left: ComputedExpr, right: ComputedExpr) -> Self {
        ComputedExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn field_paths(&self) -> Vec<&FieldPath> {
        match self {
            ComputedExpr::Field { path } => vec![path],
            ComputedExpr::Number { .. } => Vec::new(),
            ComputedExpr::Aggregate { argument, .. } => vec![argument],
            ComputedExpr::Binary { left, right, .. } => {
                let mut out = left.field_paths();
                out.extend(right.field_paths());
                out
            }
        }
    }
}

impl fmt::Display for ComputedExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComputedExpr::Field { path } => write!(f, "{}", path),
            ComputedExpr::Number { value } => f.write_str(value),
            ComputedExpr::Aggregate { function, argument } => {
                write!(f, "{}({})", function.as_str(), argument)
            }
            ComputedExpr::Binary { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
        }
    }
}

// ──────────────────────────────────────────────
// Invariant expressions
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantTerm {
    Field {
        path: FieldPath,
    },
    Literal {
        value: Literal,
    },
    Duration {
        value: Duration,
    },
    Date {
        value: DateExpr,
    },
    /// `start_date + 7d`
    Offset {
        path: FieldPath,
        sign: OffsetSign,
        duration: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantExpr {
    Comparison {
        left: InvariantTerm,
        op: ComparisonOp,
        right: InvariantTerm,
    },
    Logical {
        op: LogicalOp,
        left: Box<InvariantExpr>,
        right: Box<InvariantExpr>,
    },
    Not {
        operand: Box<InvariantExpr>,
    },
}

impl InvariantExpr {
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        fn term_path(term: &InvariantTerm) -> Option<&FieldPath> {
            match term {
                InvariantTerm::Field { path } | InvariantTerm::Offset { path, .. } => Some(path),
                _ => None,
            }
        }
        match self {
            InvariantExpr::Comparison { left, right, .. } => {
                term_path(left).into_iter().chain(term_path(right)).collect()
            }
            InvariantExpr::Logical { left, right, .. } => {
                let mut out = left.field_paths();
                out.extend(right.field_paths());
                out
            }
            InvariantExpr::Not { operand } => operand.field_paths(),
        }
    }
}
