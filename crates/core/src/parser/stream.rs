use super::Parser;
use crate::error::ParseError;
use crate::ir::{OrderingScope, StreamKind, StreamSchema, StreamSpec};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const STREAM_KINDS: &[(&str, StreamKind)] = &[
    ("intent", StreamKind::Intent),
    ("fact", StreamKind::Fact),
    ("observation", StreamKind::Observation),
    ("derived", StreamKind::Derived),
];

const ORDERING_SCOPES: &[(&str, OrderingScope)] = &[
    ("per_partition", OrderingScope::PerPartition),
    ("global", OrderingScope::Global),
];

impl Parser {
    /// ```text
    /// stream order_events:
    ///   kind: fact
    ///   partition_key: order_id
    ///   retention: 90d
    ///   schema OrderPlaced:
    ///     order_id: uuid required
    /// ```
    pub(crate) fn parse_stream(&mut self) -> Result<StreamSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Stream)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = StreamSpec {
            loc,
            name,
            title,
            kind: StreamKind::Fact,
            partition_key: None,
            ordering_scope: OrderingScope::PerPartition,
            retention: None,
            schemas: Vec::new(),
            derives_from: Vec::new(),
            invariants: Vec::new(),
        };

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Kind) => {
                    p.advance();
                    spec.kind = p.colon_choice("stream kind", STREAM_KINDS)?;
                }
                Some(Keyword::PartitionKey) => {
                    p.advance();
                    spec.partition_key = Some(p.colon_identifier()?);
                }
                Some(Keyword::OrderingScope) => {
                    p.advance();
                    spec.ordering_scope = p.colon_choice("ordering scope", ORDERING_SCOPES)?;
                }
                Some(Keyword::Retention) => {
                    p.advance();
                    spec.retention = Some(p.colon_duration()?);
                }
                Some(Keyword::Schema) if !p.peek_is(1, TokenKind::Colon) => {
                    p.advance();
                    let tok = p.current().clone();
                    let name = p.expect_identifier()?;
                    if spec.get_schema(&name).is_some() {
                        return Err(p.err_at(&tok, format!("duplicate schema '{}'", name)));
                    }
                    let fields = p.parse_field_block()?;
                    spec.schemas.push(StreamSchema { name, fields });
                }
                Some(Keyword::DerivesFrom) => {
                    p.advance();
                    spec.derives_from = p.colon_identifier_list()?;
                }
                Some(Keyword::Invariant) => {
                    p.advance();
                    spec.invariants.push(p.colon_string()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        if spec.schemas.is_empty() {
            return Err(Parser::missing("stream", &spec.name, "schema", &spec.loc));
        }
        if spec.kind == StreamKind::Derived && spec.derives_from.is_empty() {
            return Err(Parser::missing("derived stream", &spec.name, "derives_from", &spec.loc));
        }
        Ok(spec)
    }
}
