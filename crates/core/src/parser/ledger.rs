use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    AccountType, ExecutionMode, LedgerSpec, SyncTarget, TransactionPriority, TransactionSpec,
    TransferSpec,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const ACCOUNT_TYPES: &[(&str, AccountType)] = &[
    ("asset", AccountType::Asset),
    ("liability", AccountType::Liability),
    ("equity", AccountType::Equity),
    ("revenue", AccountType::Revenue),
    ("expense", AccountType::Expense),
];

const EXECUTION_MODES: &[(&str, ExecutionMode)] =
    &[("sync", ExecutionMode::Sync), ("async", ExecutionMode::Async)];

const TRANSACTION_PRIORITIES: &[(&str, TransactionPriority)] = &[
    ("critical", TransactionPriority::Critical),
    ("high", TransactionPriority::High),
    ("normal", TransactionPriority::Normal),
    ("low", TransactionPriority::Low),
];

impl Parser {
    pub(crate) fn parse_ledger(&mut self) -> Result<LedgerSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Ledger)?;
        let (name, title) = self.declaration_header()?;
        let mut account_code = None;
        let mut ledger_id = None;
        let mut account_type = None;
        let mut currency = None;
        let mut flags = Vec::new();
        let mut sync_to = None;
        let mut tenant_scoped = false;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::AccountCode) => {
                    p.advance();
                    account_code = Some(p.colon_u32()?);
                }
                Some(Keyword::LedgerId) => {
                    p.advance();
                    ledger_id = Some(p.colon_u32()?);
                }
                Some(Keyword::AccountType) => {
                    p.advance();
                    account_type = Some(p.colon_choice("account type", ACCOUNT_TYPES)?);
                }
                Some(Keyword::Currency) => {
                    p.advance();
                    currency = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::Flags) => {
                    p.advance();
                    flags = p.colon_identifier_list()?;
                }
                Some(Keyword::SyncTo) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let entity = p.expect_identifier()?;
                    p.expect(TokenKind::Dot)?;
                    let field = p.expect_identifier()?;
                    p.end_statement()?;
                    sync_to = Some(SyncTarget { entity, field });
                }
                Some(Keyword::TenantScoped) => {
                    p.advance();
                    tenant_scoped = p.colon_bool()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let missing = |directive: &str| Parser::missing("ledger", &name, directive, &loc);
        let account_code = account_code.ok_or_else(|| missing("account_code"))?;
        let ledger_id = ledger_id.ok_or_else(|| missing("ledger_id"))?;
        let account_type = account_type.ok_or_else(|| missing("account_type"))?;
        let currency = currency.ok_or_else(|| missing("currency"))?;
        Ok(LedgerSpec {
            loc,
            name,
            title,
            account_code,
            ledger_id,
            account_type,
            currency,
            flags,
            sync_to,
            tenant_scoped,
        })
    }

    pub(crate) fn parse_transaction(&mut self) -> Result<TransactionSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Transaction)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = TransactionSpec {
            loc,
            name,
            title,
            execution: ExecutionMode::Sync,
            priority: TransactionPriority::Normal,
            timeout: None,
            transfers: Vec::new(),
            idempotency_key: None,
            validation: Vec::new(),
        };

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Execution) => {
                    p.advance();
                    spec.execution = p.colon_choice("execution mode", EXECUTION_MODES)?;
                }
                Some(Keyword::Priority) => {
                    p.advance();
                    spec.priority = p.colon_choice("priority", TRANSACTION_PRIORITIES)?;
                }
                Some(Keyword::Timeout) => {
                    p.advance();
                    spec.timeout = Some(p.colon_duration()?);
                }
                Some(Keyword::Transfer) => {
                    p.advance();
                    let tok = p.current().clone();
                    let transfer = p.parse_transfer()?;
                    if spec.transfers.iter().any(|t| t.name == transfer.name) {
                        return Err(p.err_at(&tok, format!("duplicate transfer '{}'", transfer.name)));
                    }
                    spec.transfers.push(transfer);
                }
                Some(Keyword::IdempotencyKey) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    spec.idempotency_key = Some(p.parse_field_path()?);
                    p.end_statement()?;
                }
                Some(Keyword::Validation) => {
                    p.advance();
                    p.block(|p| {
                        p.expect(TokenKind::Minus)?;
                        let expr = p.parse_invariant()?;
                        p.end_statement()?;
                        spec.validation.push(expr);
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        if spec.transfers.is_empty() {
            return Err(Parser::missing("transaction", &spec.name, "transfer", &spec.loc));
        }
        Ok(spec)
    }

    fn parse_transfer(&mut self) -> Result<TransferSpec, ParseError> {
        let loc = self.loc();
        let name = self.expect_identifier()?;
        let mut debit = None;
        let mut credit = None;
        let mut amount = None;
        let mut code = None;
        let mut flags = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Debit) => {
                    p.advance();
                    debit = Some(p.colon_identifier()?);
                }
                Some(Keyword::Credit) => {
                    p.advance();
                    credit = Some(p.colon_identifier()?);
                }
                Some(Keyword::Amount) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    amount = Some(p.parse_computed()?);
                    p.end_statement()?;
                }
                Some(Keyword::Code) => {
                    p.advance();
                    code = Some(p.colon_u32()?);
                }
                Some(Keyword::Flags) => {
                    p.advance();
                    flags = p.colon_identifier_list()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let missing = |directive: &str| Parser::missing("transfer", &name, directive, &loc);
        let debit_ledger = debit.ok_or_else(|| missing("debit"))?;
        let credit_ledger = credit.ok_or_else(|| missing("credit"))?;
        let amount = amount.ok_or_else(|| missing("amount"))?;
        if debit_ledger == credit_ledger {
            return Err(ParseError::new(
                loc,
                format!("transfer '{}' debits and credits the same ledger '{}'", name, debit_ledger),
            ));
        }
        Ok(TransferSpec {
            name,
            debit_ledger,
            credit_ledger,
            amount,
            code,
            flags,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    #[test]
    fn ledger_and_transaction() {
        let f = parse_module(
            r#"ledger customer_wallet "Customer wallet":
  account_code: 1001
  ledger_id: 1
  account_type: liability
  currency: USD
  flags: [debits_must_not_exceed_credits]
  sync_to: Customer.balance
  tenant_scoped: true

transaction record_payment:
  execution: async
  priority: high
  timeout: 5s
  transfer main:
    debit: cash
    credit: customer_wallet
    amount: payment.amount * 100
    code: 7
  idempotency_key: payment.id
  validation:
    - payment.amount > 0
"#,
            "l.dsl",
        )
        .unwrap()
        .fragment;
        let l = &f.ledgers[0];
        assert_eq!(l.account_type, AccountType::Liability);
        assert_eq!(l.currency, "USD");
        assert_eq!(
            l.sync_to,
            Some(SyncTarget { entity: "Customer".into(), field: "balance".into() })
        );
        assert!(l.tenant_scoped);

        let t = &f.transactions[0];
        assert_eq!(t.execution, ExecutionMode::Async);
        assert_eq!(t.priority, TransactionPriority::High);
        assert_eq!(t.ledgers().collect::<Vec<_>>(), vec!["cash", "customer_wallet"]);
        assert_eq!(t.transfers[0].amount.to_string(), "(payment.amount * 100)");
        assert_eq!(t.transfers[0].code, Some(7));
        assert_eq!(t.idempotency_key.as_ref().map(|k| k.to_string()).as_deref(), Some("payment.id"));
        assert_eq!(t.validation.len(), 1);
    }

    #[test]
    fn ledger_requires_currency() {
        let err = parse_module(
            "ledger l:\n  account_code: 1\n  ledger_id: 1\n  account_type: asset\n",
            "l.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("ledger 'l' is missing required 'currency'"));
    }

    #[test]
    fn transaction_without_transfers() {
        let err = parse_module("transaction t:\n  execution: sync\n", "l.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'transfer'"));
    }

    #[test]
    fn self_transfer_is_rejected() {
        let err = parse_module(
            "transaction t:\n  transfer x:\n    debit: a\n    credit: a\n    amount: 1\n",
            "l.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("same ledger 'a'"));
    }
}
