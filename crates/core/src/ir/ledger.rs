//! Double-entry ledgers and the transactions that move value between them.

use serde::{Deserialize, Serialize};

use super::expressions::{ComputedExpr, Duration, FieldPath, InvariantExpr};
use crate::error::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

/// `sync_to: Customer.balance_cache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTarget {
    pub entity: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub account_code: u32,
    pub ledger_id: u32,
    pub account_type: AccountType,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_to: Option<SyncTarget>,
    #[serde(default)]
    pub tenant_scoped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionPriority {
    Critical,
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferSpec {
    pub name: String,
    pub debit_ledger: String,
    pub credit_ledger: String,
    pub amount: ComputedExpr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSpec {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub execution: ExecutionMode,
    pub priority: TransactionPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    pub transfers: Vec<TransferSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<FieldPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<InvariantExpr>,
}

impl TransactionSpec {
    /// Ledger names referenced by any transfer, debit before credit.
    pub fn ledgers(&self) -> impl Iterator<Item = &str> {
        self.transfers
            .iter()
            .flat_map(|t| [t.debit_ledger.as_str(), t.credit_ledger.as_str()])
    }
}
