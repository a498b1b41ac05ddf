//! Condition, computed and invariant expression grammars.
//!
//! ```text
//! condition  := and ("or" and)*
//! and        := primary ("and" primary)*
//! primary    := "(" condition ")" | "role" "(" name ")" | path op value
//!
//! computed   := term (("+" | "-") term)*
//! term       := factor (("*" | "/") factor)*
//! factor     := "(" computed ")" | aggregate "(" path ")" | number | path
//!
//! invariant  := inv_and ("or" inv_and)*
//! inv_and    := inv_not ("and" inv_not)*
//! inv_not    := "not" inv_not | "(" invariant ")" | operand op operand
//! ```

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    AggregateFunction, ArithmeticOp, ComparisonOp, ComputedExpr, ConditionExpr, ConditionValue,
    DateAnchor, DateExpr, FieldPath, InvariantExpr, InvariantTerm, Literal, LogicalOp, OffsetSign,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

impl Parser {
    // -- Shared pieces ------------------------------------------

    /// `owner.team.name`
    pub(crate) fn parse_field_path(&mut self) -> Result<FieldPath, ParseError> {
        let mut segments = vec![self.expect_identifier()?];
        while self.at(TokenKind::Dot) {
            self.advance();
            segments.push(self.expect_identifier()?);
        }
        Ok(FieldPath::new(segments))
    }

    pub(crate) fn at_literal(&self) -> bool {
        match self.current().kind {
            TokenKind::Str | TokenKind::Number => true,
            TokenKind::Minus => self.peek_is(1, TokenKind::Number),
            TokenKind::Keyword(Keyword::True | Keyword::False | Keyword::Null) => true,
            _ => false,
        }
    }

    pub(crate) fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Str => {
                self.advance();
                Ok(Literal::Str(tok.text))
            }
            TokenKind::Number | TokenKind::Minus => {
                let text = self.expect_number_text()?;
                number_literal(&text).ok_or_else(|| {
                    self.err_at(&tok, format!("number '{}' is out of range", text))
                })
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(Literal::Bool(true))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(Literal::Bool(false))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(Literal::Null)
            }
            _ => Err(self.unexpected("literal value")),
        }
    }

    pub(crate) fn at_date_anchor(&self) -> bool {
        self.at_kw(Keyword::Today) || self.at_kw(Keyword::Now)
    }

    /// `today`, `now - 2h`, `today + 7d`
    pub(crate) fn parse_date_expr(&mut self) -> Result<DateExpr, ParseError> {
        let anchor = if self.eat_kw(Keyword::Today) {
            DateAnchor::Today
        } else if self.eat_kw(Keyword::Now) {
            DateAnchor::Now
        } else {
            return Err(self.unexpected("'today' or 'now'"));
        };
        let offset = match self.parse_offset_sign() {
            Some(sign) => Some((sign, self.expect_duration()?)),
            None => None,
        };
        Ok(DateExpr { anchor, offset })
    }

    /// Consume `+`/`-` only when a duration follows.
    fn parse_offset_sign(&mut self) -> Option<OffsetSign> {
        let sign = match self.current().kind {
            TokenKind::Plus => OffsetSign::Plus,
            TokenKind::Minus => OffsetSign::Minus,
            _ => return None,
        };
        let next = self.peek(1).kind;
        let duration_follows = next == TokenKind::Duration
            || (next == TokenKind::Number && self.peek(2).is_word());
        if duration_follows {
            self.advance();
            Some(sign)
        } else {
            None
        }
    }

    // -- Conditions ---------------------------------------------

    pub(crate) fn parse_condition(&mut self) -> Result<ConditionExpr, ParseError> {
        let mut left = self.parse_condition_and()?;
        while self.eat_kw(Keyword::Or) {
            let right = self.parse_condition_and()?;
            left = ConditionExpr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_condition_and(&mut self) -> Result<ConditionExpr, ParseError> {
        let mut left = self.parse_condition_primary()?;
        while self.eat_kw(Keyword::And) {
            let right = self.parse_condition_primary()?;
            left = ConditionExpr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_condition_primary(&mut self) -> Result<ConditionExpr, ParseError> {
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_condition()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        if self.at_kw(Keyword::Role) && self.peek_is(1, TokenKind::LParen) {
            return self.parse_role_check().map(|role| ConditionExpr::Role { role });
        }
        let field = self.parse_field_path()?;
        let op = self.parse_comparison_op()?;
        let value = self.parse_condition_value()?;
        Ok(ConditionExpr::Comparison { field, op, value })
    }

    /// `role(name)`
    pub(crate) fn parse_role_check(&mut self) -> Result<String, ParseError> {
        self.expect_kw(Keyword::Role)?;
        self.expect(TokenKind::LParen)?;
        let role = self.expect_identifier()?;
        self.expect(TokenKind::RParen)?;
        Ok(role)
    }

    pub(crate) fn parse_comparison_op(&mut self) -> Result<ComparisonOp, ParseError> {
        let op = match self.current().kind {
            TokenKind::Eq | TokenKind::EqEq => ComparisonOp::Eq,
            TokenKind::NotEq => ComparisonOp::NotEq,
            TokenKind::Gt => ComparisonOp::Gt,
            TokenKind::Lt => ComparisonOp::Lt,
            TokenKind::Ge => ComparisonOp::Ge,
            TokenKind::Le => ComparisonOp::Le,
            TokenKind::Keyword(Keyword::In) => ComparisonOp::In,
            TokenKind::Keyword(Keyword::Not) if self.peek_is(1, TokenKind::Keyword(Keyword::In)) => {
                self.advance();
                ComparisonOp::NotIn
            }
            TokenKind::Keyword(Keyword::Is) => {
                if self.peek_is(1, TokenKind::Keyword(Keyword::Not)) {
                    self.advance();
                    ComparisonOp::IsNot
                } else {
                    ComparisonOp::Is
                }
            }
            _ => return Err(self.unexpected("comparison operator")),
        };
        self.advance();
        Ok(op)
    }

    pub(crate) fn parse_condition_value(&mut self) -> Result<ConditionValue, ParseError> {
        if self.at_literal() {
            return self.parse_literal().map(ConditionValue::Literal);
        }
        if self.at_date_anchor() {
            return self.parse_date_expr().map(ConditionValue::Date);
        }
        if self.eat(TokenKind::LBracket) {
            let mut items = Vec::new();
            if !self.eat(TokenKind::RBracket) {
                loop {
                    items.push(self.parse_condition_value()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
            }
            return Ok(ConditionValue::List(items));
        }
        if self.current().is_word() {
            let path = self.parse_field_path()?;
            return Ok(if path.is_simple() {
                ConditionValue::Identifier(path.root().to_owned())
            } else {
                ConditionValue::Path(path)
            });
        }
        Err(self.unexpected("comparison value"))
    }

    // -- Computed expressions -----------------------------------

    pub(crate) fn parse_computed(&mut self) -> Result<ComputedExpr, ParseError> {
        let mut left = self.parse_computed_term()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Plus => ArithmeticOp::Add,
                TokenKind::Minus => ArithmeticOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_computed_term()?;
            left = ComputedExpr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_computed_term(&mut self) -> Result<ComputedExpr, ParseError> {
        let mut left = self.parse_computed_factor()?;
        loop {
            let op = match self.current().kind {
                TokenKind::Star => ArithmeticOp::Mul,
                TokenKind::Slash => ArithmeticOp::Div,
                _ => break,
            };
            self.advance();
            let right = self.parse_computed_factor()?;
            left = ComputedExpr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_computed_factor(&mut self) -> Result<ComputedExpr, ParseError> {
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_computed()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        if self.at(TokenKind::Number) || (self.at(TokenKind::Minus) && self.peek_is(1, TokenKind::Number)) {
            let value = self.expect_number_text()?;
            return Ok(ComputedExpr::Number { value });
        }
        if self.current().is_word() && self.peek_is(1, TokenKind::LParen) {
            let tok = self.current().clone();
            let function = tok
                .keyword()
                .and_then(AggregateFunction::from_keyword)
                .ok_or_else(|| {
                    self.err(format!(
                        "unknown function '{}': only count, sum, avg, min, max, days_until and days_since may be called",
                        tok.text
                    ))
                })?;
            self.advance();
            self.expect(TokenKind::LParen)?;
            let argument = self.parse_field_path()?;
            self.expect(TokenKind::RParen)?;
            return Ok(ComputedExpr::Aggregate { function, argument });
        }
        if self.current().is_word() {
            return self.parse_field_path().map(|path| ComputedExpr::Field { path });
        }
        Err(self.unexpected("expression"))
    }

    // -- Invariants ---------------------------------------------

    pub(crate) fn parse_invariant(&mut self) -> Result<InvariantExpr, ParseError> {
        let mut left = self.parse_invariant_and()?;
        while self.eat_kw(Keyword::Or) {
            let right = self.parse_invariant_and()?;
            left = InvariantExpr::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_invariant_and(&mut self) -> Result<InvariantExpr, ParseError> {
        let mut left = self.parse_invariant_not()?;
        while self.eat_kw(Keyword::And) {
            let right = self.parse_invariant_not()?;
            left = InvariantExpr::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_invariant_not(&mut self) -> Result<InvariantExpr, ParseError> {
        if self.eat_kw(Keyword::Not) {
            let operand = self.parse_invariant_not()?;
            return Ok(InvariantExpr::Not {
                operand: Box::new(operand),
            });
        }
        if self.eat(TokenKind::LParen) {
            let inner = self.parse_invariant()?;
            self.expect(TokenKind::RParen)?;
            return Ok(inner);
        }
        let left = self.parse_invariant_term()?;
        let op = self.parse_comparison_op()?;
        if matches!(
            op,
            ComparisonOp::In | ComparisonOp::NotIn | ComparisonOp::Is | ComparisonOp::IsNot
        ) {
            return Err(self.err(format!("operator '{}' is not allowed in an invariant", op)));
        }
        let right = self.parse_invariant_term()?;
        Ok(InvariantExpr::Comparison { left, op, right })
    }

    fn parse_invariant_term(&mut self) -> Result<InvariantTerm, ParseError> {
        if self.at(TokenKind::Duration) {
            let value = self.expect_duration()?;
            return Ok(InvariantTerm::Duration { value });
        }
        if self.at_literal() {
            return self.parse_literal().map(|value| InvariantTerm::Literal { value });
        }
        if self.at_date_anchor() {
            return self.parse_date_expr().map(|value| InvariantTerm::Date { value });
        }
        let path = self.parse_field_path()?;
        match self.parse_offset_sign() {
            Some(sign) => {
                let duration = self.expect_duration()?;
                Ok(InvariantTerm::Offset {
                    path,
                    sign,
                    duration,
                })
            }
            None => Ok(InvariantTerm::Field { path }),
        }
    }
}

fn number_literal(text: &str) -> Option<Literal> {
    if text.contains('.') {
        Some(Literal::Decimal(text.to_owned()))
    } else {
        text.parse::<i64>().ok().map(Literal::Int)
    }
}
