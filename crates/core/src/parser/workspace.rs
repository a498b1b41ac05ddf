use super::Parser;
use crate::error::ParseError;
use crate::ir::{DisplayMode, RegionAggregate, WorkspaceAccess, WorkspaceRegion, WorkspaceSpec};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const DISPLAY_MODES: &[(&str, DisplayMode)] = &[
    ("list", DisplayMode::List),
    ("grid", DisplayMode::Grid),
    ("timeline", DisplayMode::Timeline),
    ("map", DisplayMode::Map),
    ("detail", DisplayMode::Detail),
    ("summary", DisplayMode::Summary),
    ("metrics", DisplayMode::Metrics),
    ("kanban", DisplayMode::Kanban),
];

impl Parser {
    /// Any `name:` line opening a block is a region. Workspaces default to
    /// `authenticated` access.
    pub(crate) fn parse_workspace(&mut self) -> Result<WorkspaceSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Workspace)?;
        let (name, title) = self.declaration_header()?;
        let mut purpose = None;
        let mut stage = None;
        let mut access = WorkspaceAccess::Authenticated;
        let mut regions: Vec<WorkspaceRegion> = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Purpose) if p.peek_is(2, TokenKind::Str) => {
                    p.advance();
                    purpose = Some(p.colon_string()?);
                }
                Some(Keyword::Stage) if !p.peek_is(2, TokenKind::Newline) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    stage = Some(match p.opt_string() {
                        Some(s) => s,
                        None => p.expect_identifier()?,
                    });
                    p.end_statement()?;
                }
                Some(Keyword::Access) if !p.peek_is(2, TokenKind::Newline) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    access = p.parse_workspace_access()?;
                    p.end_statement()?;
                }
                _ if p.current().is_word()
                    && p.peek_is(1, TokenKind::Colon)
                    && p.peek_is(2, TokenKind::Newline) =>
                {
                    let tok = p.current().clone();
                    let region = p.parse_region()?;
                    if regions.iter().any(|r| r.name == region.name) {
                        return Err(p.err_at(&tok, format!("duplicate region '{}'", region.name)));
                    }
                    regions.push(region);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        Ok(WorkspaceSpec {
            loc,
            name,
            title,
            purpose,
            stage,
            access,
            regions,
        })
    }

    /// `public`, `authenticated` or `persona(a, b)`
    fn parse_workspace_access(&mut self) -> Result<WorkspaceAccess, ParseError> {
        if self.eat_word("public") {
            return Ok(WorkspaceAccess::Public);
        }
        if self.eat_word("authenticated") {
            return Ok(WorkspaceAccess::Authenticated);
        }
        if self.eat_kw(Keyword::Persona) {
            self.expect(TokenKind::LParen)?;
            let mut personas = Vec::new();
            loop {
                personas.push(self.expect_identifier()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen)?;
            return Ok(WorkspaceAccess::Personas(personas));
        }
        Err(self.unexpected("'public', 'authenticated' or 'persona(...)'"))
    }

    fn parse_region(&mut self) -> Result<WorkspaceRegion, ParseError> {
        let mut region = WorkspaceRegion::new(self.expect_identifier()?);
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Source) => {
                    p.advance();
                    region.source = Some(p.colon_identifier()?);
                }
                Some(Keyword::Filter) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    region.filter = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::Sort) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    region.sort = p.parse_sort_list()?;
                    p.end_statement()?;
                }
                Some(Keyword::Limit) => {
                    p.advance();
                    region.limit = Some(p.colon_u32()?);
                }
                Some(Keyword::Display) => {
                    p.advance();
                    region.display = p.colon_choice("display mode", DISPLAY_MODES)?;
                }
                Some(Keyword::Action) => {
                    p.advance();
                    region.action = Some(p.colon_identifier()?);
                }
                Some(Keyword::Empty) => {
                    p.advance();
                    region.empty_message = Some(p.colon_string()?);
                }
                Some(Keyword::GroupBy) => {
                    p.advance();
                    region.group_by = Some(p.colon_identifier()?);
                }
                Some(Keyword::Aggregate) => {
                    p.advance();
                    p.block(|p| {
                        let name = p.expect_identifier()?;
                        p.expect(TokenKind::Colon)?;
                        let expr = p.parse_computed()?;
                        p.end_statement()?;
                        region.aggregates.push(RegionAggregate { name, expr });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(region)
    }
}
