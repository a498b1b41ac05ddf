//! Field declarations: `name: type modifier* [= default]`.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    DefaultValue, DeleteBehavior, FieldModifier, FieldSpec, FieldType, RelationKind, RelationType,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

/// Keywords that can open a field type.
const TYPE_KEYWORDS: &[Keyword] = &[
    Keyword::Str,
    Keyword::Text,
    Keyword::Int,
    Keyword::Float,
    Keyword::Decimal,
    Keyword::Bool,
    Keyword::Date,
    Keyword::Datetime,
    Keyword::Time,
    Keyword::Uuid,
    Keyword::Email,
    Keyword::Url,
    Keyword::Phone,
    Keyword::Json,
    Keyword::Money,
    Keyword::File,
    Keyword::Image,
    Keyword::Timezone,
    Keyword::Enum,
    Keyword::Ref,
    Keyword::HasMany,
    Keyword::HasOne,
    Keyword::BelongsTo,
    Keyword::Embeds,
];

const MODIFIERS: &[(Keyword, FieldModifier)] = &[
    (Keyword::Required, FieldModifier::Required),
    (Keyword::Optional, FieldModifier::Optional),
    (Keyword::Unique, FieldModifier::Unique),
    (Keyword::Pk, FieldModifier::Pk),
    (Keyword::AutoAdd, FieldModifier::AutoAdd),
    (Keyword::AutoUpdate, FieldModifier::AutoUpdate),
    (Keyword::Sensitive, FieldModifier::Sensitive),
];

impl Parser {
    /// `word ":" <type keyword>`: the statement is a field declaration.
    pub(crate) fn at_field_declaration(&self) -> bool {
        self.current().is_word()
            && self.peek_is(1, TokenKind::Colon)
            && self
                .peek(2)
                .keyword()
                .is_some_and(|k| TYPE_KEYWORDS.contains(&k))
    }

    /// One full field line, including the terminating newline.
    pub(crate) fn parse_field(&mut self) -> Result<FieldSpec, ParseError> {
        let name = self.expect_identifier()?;
        self.expect(TokenKind::Colon)?;
        let field_type = self.parse_field_type()?;
        let mut field = FieldSpec::new(name, field_type);

        loop {
            let tok = self.current().clone();
            if let Some((_, modifier)) = tok
                .keyword()
                .and_then(|k| MODIFIERS.iter().find(|(m, _)| *m == k))
            {
                field = field.with_modifier(*modifier);
                self.advance();
                continue;
            }
            if tok.kind == TokenKind::Eq {
                if field.default.is_some() {
                    return Err(self.err_at(
                        &tok,
                        format!("field '{}' declares more than one default", field.name),
                    ));
                }
                self.advance();
                field.default = Some(self.parse_default_value()?);
                continue;
            }
            break;
        }
        if field.has(FieldModifier::Required) && field.has(FieldModifier::Optional) {
            return Err(self.err(format!(
                "field '{}' cannot be both required and optional",
                field.name
            )));
        }
        self.end_statement()?;
        Ok(field)
    }

    /// Field lines until the block closes; anything else is an error.
    pub(crate) fn parse_field_block(&mut self) -> Result<Vec<FieldSpec>, ParseError> {
        let mut fields: Vec<FieldSpec> = Vec::new();
        self.block(|p| {
            let tok = p.current().clone();
            let field = p.parse_field()?;
            if fields.iter().any(|f| f.name == field.name) {
                return Err(p.err_at(&tok, format!("duplicate field '{}'", field.name)));
            }
            fields.push(field);
            Ok(())
        })?;
        Ok(fields)
    }

    pub(crate) fn parse_field_type(&mut self) -> Result<FieldType, ParseError> {
        let tok = self.current().clone();
        let Some(keyword) = tok.keyword().filter(|k| TYPE_KEYWORDS.contains(k)) else {
            return Err(self.err(format!(
                "unknown field type {}",
                if tok.is_word() {
                    format!("'{}'", tok.text)
                } else {
                    tok.kind.describe()
                }
            )));
        };
        self.advance();
        let ty = match keyword {
            Keyword::Str => {
                let max_length = if self.eat(TokenKind::LParen) {
                    let n = self.expect_u32()?;
                    self.expect(TokenKind::RParen)?;
                    Some(n)
                } else {
                    None
                };
                FieldType::Str { max_length }
            }
            Keyword::Text => FieldType::Text,
            Keyword::Int => FieldType::Int,
            Keyword::Float => FieldType::Float,
            Keyword::Decimal => {
                self.expect(TokenKind::LParen)?;
                let precision = self.expect_u32()?;
                self.expect(TokenKind::Comma)?;
                let scale = self.expect_u32()?;
                self.expect(TokenKind::RParen)?;
                if scale > precision {
                    return Err(self.err_at(
                        &tok,
                        format!("decimal scale {} exceeds precision {}", scale, precision),
                    ));
                }
                FieldType::Decimal { precision, scale }
            }
            Keyword::Bool => FieldType::Bool,
            Keyword::Date => FieldType::Date,
            Keyword::Datetime => FieldType::DateTime,
            Keyword::Time => FieldType::Time,
            Keyword::Uuid => FieldType::Uuid,
            Keyword::Email => FieldType::Email,
            Keyword::Url => FieldType::Url,
            Keyword::Phone => FieldType::Phone,
            Keyword::Json => FieldType::Json,
            Keyword::Money => {
                let currency = if self.eat(TokenKind::LParen) {
                    let c = self.expect_identifier()?;
                    self.expect(TokenKind::RParen)?;
                    c
                } else {
                    "USD".to_owned()
                };
                FieldType::Money { currency }
            }
            Keyword::File => FieldType::File,
            Keyword::Image => FieldType::Image,
            Keyword::Timezone => FieldType::Timezone,
            Keyword::Enum if !self.at(TokenKind::LBracket) => FieldType::EnumRef {
                name: self.expect_identifier()?,
            },
            Keyword::Enum => {
                self.expect(TokenKind::LBracket)?;
                let mut values: Vec<String> = Vec::new();
                loop {
                    let vtok = self.current().clone();
                    let v = self.expect_identifier()?;
                    if values.contains(&v) {
                        return Err(self.err_at(&vtok, format!("duplicate enum value '{}'", v)));
                    }
                    values.push(v);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                FieldType::Enum { values }
            }
            Keyword::Ref => FieldType::Relation(self.parse_relation(RelationKind::Ref)?),
            Keyword::HasMany => FieldType::Relation(self.parse_relation(RelationKind::HasMany)?),
            Keyword::HasOne => FieldType::Relation(self.parse_relation(RelationKind::HasOne)?),
            Keyword::BelongsTo => {
                FieldType::Relation(self.parse_relation(RelationKind::BelongsTo)?)
            }
            Keyword::Embeds => FieldType::Relation(self.parse_relation(RelationKind::Embeds)?),
            _ => return Err(self.err_at(&tok, format!("unknown field type '{}'", tok.text))),
        };
        Ok(ty)
    }

    /// `Target [via fk] [cascade|restrict|nullify] [readonly]`
    fn parse_relation(&mut self, kind: RelationKind) -> Result<RelationType, ParseError> {
        let target = self.expect_identifier()?;
        let mut rel = RelationType::new(kind, target);
        loop {
            match self.current_keyword() {
                Some(Keyword::Via) => {
                    self.advance();
                    rel.via = Some(self.expect_identifier()?);
                }
                Some(Keyword::Cascade) => {
                    self.advance();
                    rel.on_delete = Some(DeleteBehavior::Cascade);
                }
                Some(Keyword::Restrict) => {
                    self.advance();
                    rel.on_delete = Some(DeleteBehavior::Restrict);
                }
                Some(Keyword::Nullify) => {
                    self.advance();
                    rel.on_delete = Some(DeleteBehavior::Nullify);
                }
                Some(Keyword::Readonly) => {
                    self.advance();
                    rel.readonly = true;
                }
                _ => break,
            }
        }
        if rel.via.is_some() && !matches!(kind, RelationKind::HasMany | RelationKind::HasOne) {
            return Err(self.err(format!(
                "'via' is only valid on has_many and has_one, not {}",
                kind.as_str()
            )));
        }
        Ok(rel)
    }

    fn parse_default_value(&mut self) -> Result<DefaultValue, ParseError> {
        if self.at_literal() {
            return self.parse_literal().map(DefaultValue::Literal);
        }
        if self.at_date_anchor() {
            return self.parse_date_expr().map(DefaultValue::Date);
        }
        self.expect_identifier().map(DefaultValue::Identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{DateAnchor, Literal};
    use crate::lexer::tokenize;

    fn field(src: &str) -> Result<FieldSpec, ParseError> {
        let mut p = Parser::new(tokenize(src, "f.dsl").expect("tokenize"), "f.dsl");
        p.parse_field()
    }

    #[test]
    fn scalar_with_modifiers_and_default() {
        let f = field("title: str(200) required unique = \"Untitled\"\n").unwrap();
        assert_eq!(f.name, "title");
        assert_eq!(f.field_type, FieldType::Str { max_length: Some(200) });
        assert_eq!(f.modifiers, vec![FieldModifier::Required, FieldModifier::Unique]);
        assert_eq!(f.default, Some(DefaultValue::Literal(Literal::Str("Untitled".into()))));
    }

    #[test]
    fn enum_with_identifier_default() {
        let f = field("status: enum[draft, open, done] = draft\n").unwrap();
        assert_eq!(f.field_type.enum_values().map(|v| v.len()), Some(3));
        assert_eq!(f.default, Some(DefaultValue::Identifier("draft".into())));
    }

    #[test]
    fn keywords_are_valid_enum_values() {
        let f = field("kind: enum[list, view, create]\n").unwrap();
        assert_eq!(
            f.field_type.enum_values().unwrap(),
            &["list".to_string(), "view".into(), "create".into()]
        );
    }

    #[test]
    fn named_enum_reference() {
        let f = field("status: enum TaskStatus required\n").unwrap();
        assert_eq!(f.field_type, FieldType::EnumRef { name: "TaskStatus".into() });
        assert!(f.is_required());
    }

    #[test]
    fn relations_with_options() {
        let f = field("lines: has_many OrderLine via order cascade\n").unwrap();
        let rel = f.field_type.relation().unwrap();
        assert_eq!(rel.kind, RelationKind::HasMany);
        assert_eq!(rel.target, "OrderLine");
        assert_eq!(rel.via.as_deref(), Some("order"));
        assert_eq!(rel.on_delete, Some(DeleteBehavior::Cascade));
    }

    #[test]
    fn via_on_ref_is_rejected() {
        let err = field("owner: ref User via id\n").unwrap_err();
        assert!(err.message.contains("'via' is only valid"));
    }

    #[test]
    fn decimal_and_money() {
        let f = field("total: decimal(10,2) required\n").unwrap();
        assert_eq!(f.field_type, FieldType::Decimal { precision: 10, scale: 2 });
        let f = field("price: money(GBP)\n").unwrap();
        assert_eq!(f.field_type, FieldType::Money { currency: "GBP".into() });
    }

    #[test]
    fn date_defaults() {
        let f = field("created: datetime auto_add = now\n").unwrap();
        assert!(matches!(
            f.default,
            Some(DefaultValue::Date(ref d)) if d.anchor == DateAnchor::Now
        ));
    }

    #[test]
    fn unknown_type_is_reported() {
        let err = field("title: strng\n").unwrap_err();
        assert!(err.message.contains("unknown field type 'strng'"));
        assert_eq!(err.location.column, 8);
    }

    #[test]
    fn required_and_optional_conflict() {
        let err = field("x: int required optional\n").unwrap_err();
        assert!(err.message.contains("both required and optional"));
    }

    #[test]
    fn duplicate_enum_value() {
        let err = field("s: enum[a, b, a]\n").unwrap_err();
        assert!(err.message.contains("duplicate enum value 'a'"));
    }
}
