//! Recursive-descent parser over the indentation-aware token stream.
//!
//! Every construct grammar is an `impl Parser` method living in the
//! submodule for its family. The top level is a dispatch table from the
//! leading keyword to a function that parses one declaration and folds it
//! into the file's [`Fragment`].
//!
//! Shared block shape:
//!
//! ```text
//! KEYWORD name ["Title"] ":" NEWLINE INDENT statement* DEDENT
//! ```
//!
//! Statements end at NEWLINE. Statements a body does not recognize are
//! skipped together with any indented sub-block. Everything else is
//! fail-fast: the first error aborts the file.

use indexmap::IndexMap;

use crate::error::{Location, ParseError};
use crate::ir::{AppConfig, AppDeclaration, Duration, DurationUnit, Fragment, ModuleIR};
use crate::keywords::{suggestions_for, Keyword};
use crate::lexer::{tokenize, Token, TokenKind};

mod entity;
mod experience;
mod expressions;
mod governance;
mod ledger;
mod llm;
mod process;
mod services;
mod stream;
mod surface;
mod testing;
mod types;
mod workflow;
mod workspace;

// ──────────────────────────────────────────────
// Dispatch table
// ──────────────────────────────────────────────

type ConstructFn = fn(&mut Parser, Fragment) -> Result<Fragment, ParseError>;

const CONSTRUCTS: &[(Keyword, ConstructFn)] = &[
    (Keyword::Entity, |p, f| Ok(f.with_entity(p.parse_entity()?))),
    (Keyword::Archetype, |p, f| Ok(f.with_archetype(p.parse_archetype()?))),
    (Keyword::Enum, |p, f| Ok(f.with_enum(p.parse_enum()?))),
    (Keyword::Surface, |p, f| Ok(f.with_surface(p.parse_surface()?))),
    (Keyword::Workspace, |p, f| Ok(f.with_workspace(p.parse_workspace()?))),
    (Keyword::Experience, |p, f| Ok(f.with_experience(p.parse_experience()?))),
    (Keyword::Service, |p, f| Ok(f.with_service(p.parse_service()?))),
    (Keyword::ForeignModel, |p, f| Ok(f.with_foreign_model(p.parse_foreign_model()?))),
    (Keyword::Integration, |p, f| Ok(f.with_integration(p.parse_integration()?))),
    (Keyword::Test, |p, f| Ok(f.with_test(p.parse_test()?))),
    (Keyword::Flow, |p, f| Ok(f.with_flow(p.parse_flow()?))),
    (Keyword::Persona, |p, f| Ok(f.with_persona(p.parse_persona()?))),
    (Keyword::Scenario, |p, f| Ok(f.with_scenario(p.parse_scenario()?))),
    (Keyword::Story, |p, f| Ok(f.with_story(p.parse_story()?))),
    (Keyword::LlmModel, |p, f| Ok(f.with_llm_model(p.parse_llm_model()?))),
    (Keyword::LlmConfig, |p, f| {
        if let Some(existing) = &f.llm_config {
            return Err(p.err(format!(
                "llm_config already declared at {}",
                existing.loc
            )));
        }
        Ok(f.with_llm_config(p.parse_llm_config()?))
    }),
    (Keyword::LlmIntent, |p, f| Ok(f.with_llm_intent(p.parse_llm_intent()?))),
    (Keyword::Ledger, |p, f| Ok(f.with_ledger(p.parse_ledger()?))),
    (Keyword::Transaction, |p, f| Ok(f.with_transaction(p.parse_transaction()?))),
    (Keyword::Process, |p, f| Ok(f.with_process(p.parse_process()?))),
    (Keyword::Schedule, |p, f| Ok(f.with_schedule(p.parse_schedule()?))),
    (Keyword::Stream, |p, f| Ok(f.with_stream(p.parse_stream()?))),
    (Keyword::Policies, |p, f| {
        if let Some(existing) = &f.policies {
            return Err(p.err(format!("policies already declared at {}", existing.loc)));
        }
        Ok(f.with_policies(p.parse_policies()?))
    }),
    (Keyword::Tenancy, |p, f| {
        if let Some(existing) = &f.tenancy {
            return Err(p.err(format!("tenancy already declared at {}", existing.loc)));
        }
        Ok(f.with_tenancy(p.parse_tenancy()?))
    }),
    (Keyword::Interfaces, |p, f| {
        Ok(p.parse_interfaces()?.into_iter().fold(f, Fragment::with_api))
    }),
    (Keyword::DataProducts, |p, f| {
        Ok(p
            .parse_data_products()?
            .into_iter()
            .fold(f, Fragment::with_data_product))
    }),
    (Keyword::Approval, |p, f| Ok(f.with_approval(p.parse_approval()?))),
    (Keyword::Sla, |p, f| Ok(f.with_sla(p.parse_sla()?))),
    (Keyword::Webhook, |p, f| Ok(f.with_webhook(p.parse_webhook()?))),
    (Keyword::View, |p, f| Ok(f.with_view(p.parse_view()?))),
];

/// Keywords that open a top-level declaration, in dispatch order.
pub fn construct_keywords() -> impl Iterator<Item = Keyword> {
    CONSTRUCTS.iter().map(|(k, _)| *k)
}

fn construct_for(keyword: Keyword) -> Option<ConstructFn> {
    CONSTRUCTS
        .iter()
        .find(|(k, _)| *k == keyword)
        .map(|(_, f)| *f)
}

// ──────────────────────────────────────────────
// Entry points
// ──────────────────────────────────────────────

/// Tokenize and parse one source file into a module.
///
/// Errors carry a caret snippet of the offending line. A file without a
/// `module` declaration is named after its file stem.
pub fn parse_module(text: &str, file: &str) -> Result<ModuleIR, ParseError> {
    let tokens = tokenize(text, file).map_err(|e| e.with_source(text))?;
    let mut parser = Parser::new(tokens, file);
    let module = parser.parse_file().map_err(|e| e.with_source(text))?;
    tracing::debug!(
        file,
        module = %module.name,
        declarations = module.fragment.len(),
        "parsed module"
    );
    Ok(module)
}

/// Parse a bare declaration list (no header) into a fragment.
pub fn parse_fragment(text: &str, file: &str) -> Result<Fragment, ParseError> {
    parse_module(text, file).map(|m| m.fragment)
}

pub fn default_module_name(file: &str) -> String {
    let base = file.rsplit(['/', '\\']).next().unwrap_or(file);
    base.strip_suffix(".dsl").unwrap_or(base).to_owned()
}

// ──────────────────────────────────────────────
// Parser
// ──────────────────────────────────────────────

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    file: String,
    module: Option<String>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, file: &str) -> Self {
        let mut tokens = tokens;
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let line = tokens.last().map(|t| t.line + 1).unwrap_or(1);
            tokens.push(Token {
                kind: TokenKind::Eof,
                text: String::new(),
                line,
                column: 1,
            });
        }
        Parser {
            tokens,
            pos: 0,
            file: file.to_owned(),
            module: None,
        }
    }

    // -- Cursor -------------------------------------------------

    pub(crate) fn current(&self) -> &Token {
        self.peek(0)
    }

    /// Token `n` positions ahead; clamps to the trailing EOF.
    pub(crate) fn peek(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    pub(crate) fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    pub(crate) fn at_kw(&self, keyword: Keyword) -> bool {
        self.at(TokenKind::Keyword(keyword))
    }

    pub(crate) fn peek_is(&self, n: usize, kind: TokenKind) -> bool {
        self.peek(n).kind == kind
    }

    /// Current token is the word `text`, keyword or not.
    pub(crate) fn at_word(&self, text: &str) -> bool {
        self.current().is_word() && self.current().text == text
    }

    pub(crate) fn current_keyword(&self) -> Option<Keyword> {
        self.current().keyword()
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_kw(&mut self, keyword: Keyword) -> bool {
        self.eat(TokenKind::Keyword(keyword))
    }

    pub(crate) fn eat_word(&mut self, text: &str) -> bool {
        if self.at_word(text) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&kind.describe()))
        }
    }

    pub(crate) fn expect_kw(&mut self, keyword: Keyword) -> Result<Token, ParseError> {
        self.expect(TokenKind::Keyword(keyword))
    }

    // -- Errors -------------------------------------------------

    pub(crate) fn loc(&self) -> Location {
        self.loc_of(self.current())
    }

    pub(crate) fn loc_of(&self, tok: &Token) -> Location {
        let loc = Location::new(&self.file, tok.line, tok.column);
        match &self.module {
            Some(m) => loc.in_module(m),
            None => loc,
        }
    }

    pub(crate) fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.loc(), message)
    }

    pub(crate) fn err_at(&self, tok: &Token, message: impl Into<String>) -> ParseError {
        ParseError::new(self.loc_of(tok), message)
    }

    pub(crate) fn unexpected(&self, expected: &str) -> ParseError {
        self.err(format!(
            "expected {}, got {}",
            expected,
            describe(self.current())
        ))
    }

    // -- Names and literals -------------------------------------

    /// A plain identifier, or a contextual keyword standing in for one.
    /// Reserved keywords are rejected with suggested alternatives.
    pub(crate) fn expect_identifier(&mut self) -> Result<String, ParseError> {
        let tok = self.current();
        match tok.kind {
            TokenKind::Identifier => Ok(self.advance().text),
            TokenKind::Keyword(k) if k.usable_as_identifier() => Ok(self.advance().text),
            TokenKind::Keyword(k) => Err(self
                .err(format!(
                    "'{}' is a reserved keyword and cannot be used as a name",
                    k
                ))
                .with_suggestions(suggestions_for(k))),
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// Any word, reserved or not. Used for option values such as
    /// `mode: list` where the value set is closed.
    pub(crate) fn expect_word(&mut self) -> Result<String, ParseError> {
        if self.current().is_word() {
            Ok(self.advance().text)
        } else {
            Err(self.unexpected("word"))
        }
    }

    /// One of a closed set of words, mapped to its value.
    pub(crate) fn expect_choice<T: Copy>(
        &mut self,
        what: &str,
        choices: &[(&str, T)],
    ) -> Result<T, ParseError> {
        let tok = self.current().clone();
        if tok.is_word() {
            if let Some((_, value)) = choices.iter().find(|(text, _)| *text == tok.text) {
                self.advance();
                return Ok(*value);
            }
        }
        let allowed: Vec<&str> = choices.iter().map(|(text, _)| *text).collect();
        Err(self.err_at(
            &tok,
            format!(
                "invalid {} {}, expected one of: {}",
                what,
                describe(&tok),
                allowed.join(", ")
            ),
        ))
    }

    pub(crate) fn expect_string(&mut self) -> Result<String, ParseError> {
        Ok(self.expect(TokenKind::Str)?.text)
    }

    pub(crate) fn opt_string(&mut self) -> Option<String> {
        if self.at(TokenKind::Str) {
            Some(self.advance().text)
        } else {
            None
        }
    }

    pub(crate) fn expect_u32(&mut self) -> Result<u32, ParseError> {
        let tok = self.expect(TokenKind::Number)?;
        tok.text
            .parse::<u32>()
            .map_err(|_| self.err_at(&tok, format!("expected a whole number, got '{}'", tok.text)))
    }

    /// Number text, optionally negative, kept as written.
    pub(crate) fn expect_number_text(&mut self) -> Result<String, ParseError> {
        let negative = self.eat(TokenKind::Minus);
        let tok = self.expect(TokenKind::Number)?;
        Ok(if negative {
            format!("-{}", tok.text)
        } else {
            tok.text
        })
    }

    pub(crate) fn expect_bool(&mut self) -> Result<bool, ParseError> {
        if self.eat_kw(Keyword::True) {
            Ok(true)
        } else if self.eat_kw(Keyword::False) {
            Ok(false)
        } else {
            Err(self.unexpected("'true' or 'false'"))
        }
    }

    /// `7d`, or the spelled-out `7 days`.
    pub(crate) fn expect_duration(&mut self) -> Result<Duration, ParseError> {
        let tok = self.current().clone();
        match tok.kind {
            TokenKind::Duration => {
                self.advance();
                Duration::parse(&tok.text)
                    .ok_or_else(|| self.err_at(&tok, format!("invalid duration '{}'", tok.text)))
            }
            TokenKind::Number if self.peek(1).is_word() => {
                let amount = self.expect_u32()?;
                let unit_tok = self.advance();
                let unit = DurationUnit::from_word(&unit_tok.text).ok_or_else(|| {
                    self.err_at(&unit_tok, format!("unknown duration unit '{}'", unit_tok.text))
                })?;
                Ok(Duration::new(u64::from(amount), unit))
            }
            _ => Err(self.unexpected("duration")),
        }
    }

    /// A module path `a.b.c`. Segments only name files, so any word is
    /// accepted, reserved keywords included (`shop.app`).
    pub(crate) fn module_path(&mut self) -> Result<String, ParseError> {
        let mut path = self.expect_word()?;
        while self.eat(TokenKind::Dot) {
            path.push('.');
            path.push_str(&self.expect_word()?);
        }
        Ok(path)
    }

    /// `[a, b, c]` or a bare comma-separated list `a, b, c`.
    pub(crate) fn identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        let bracketed = self.eat(TokenKind::LBracket);
        let mut items = Vec::new();
        if bracketed && self.eat(TokenKind::RBracket) {
            return Ok(items);
        }
        loop {
            items.push(self.expect_identifier()?);
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if bracketed {
            self.expect(TokenKind::RBracket)?;
        }
        Ok(items)
    }

    /// `["a", "b"]`, a single string, or an indented block of `- "a"` lines.
    pub(crate) fn string_list(&mut self) -> Result<Vec<String>, ParseError> {
        if self.at(TokenKind::Str) {
            let s = self.advance().text;
            self.end_statement()?;
            return Ok(vec![s]);
        }
        if self.eat(TokenKind::LBracket) {
            let mut items = Vec::new();
            if !self.eat(TokenKind::RBracket) {
                loop {
                    items.push(self.expect_string()?);
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
            }
            self.end_statement()?;
            return Ok(items);
        }
        self.expect(TokenKind::Newline)?;
        let mut items = Vec::new();
        if !self.eat(TokenKind::Indent) {
            return Ok(items);
        }
        self.block_loop(|p| {
            p.expect(TokenKind::Minus)?;
            items.push(p.expect_string()?);
            p.end_statement()
        })?;
        Ok(items)
    }

    // -- Statements and blocks ----------------------------------

    pub(crate) fn end_statement(&mut self) -> Result<(), ParseError> {
        if self.at(TokenKind::Eof) || self.at(TokenKind::Dedent) {
            return Ok(());
        }
        self.expect(TokenKind::Newline).map(|_| ())
    }

    /// `":" NEWLINE INDENT`
    pub(crate) fn begin_block(&mut self) -> Result<(), ParseError> {
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.expect(TokenKind::Indent)?;
        Ok(())
    }

    /// Run `body` once per statement until the closing DEDENT, then
    /// consume it.
    pub(crate) fn block_loop<F>(&mut self, mut body: F) -> Result<(), ParseError>
    where
        F: FnMut(&mut Parser) -> Result<(), ParseError>,
    {
        loop {
            while self.eat(TokenKind::Newline) {}
            if self.at(TokenKind::Dedent) || self.at(TokenKind::Eof) {
                break;
            }
            let before = self.pos;
            body(self)?;
            if self.pos == before {
                self.skip_statement();
            }
        }
        self.eat(TokenKind::Dedent);
        Ok(())
    }

    /// `":" NEWLINE INDENT ... DEDENT`, or just `NEWLINE` for an empty block.
    pub(crate) fn block<F>(&mut self, body: F) -> Result<(), ParseError>
    where
        F: FnMut(&mut Parser) -> Result<(), ParseError>,
    {
        self.begin_block()?;
        self.block_loop(body)
    }

    /// Skip the rest of the current statement and any block nested
    /// under it.
    pub(crate) fn skip_statement(&mut self) {
        tracing::trace!(
            file = %self.file,
            line = self.current().line,
            token = %self.current().text,
            "skipping unrecognized statement"
        );
        while !matches!(
            self.current().kind,
            TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof | TokenKind::Indent
        ) {
            self.advance();
        }
        self.eat(TokenKind::Newline);
        if self.at(TokenKind::Indent) {
            let mut depth = 0usize;
            loop {
                match self.current().kind {
                    TokenKind::Indent => depth += 1,
                    TokenKind::Dedent => {
                        depth -= 1;
                        if depth == 0 {
                            self.advance();
                            break;
                        }
                    }
                    TokenKind::Eof => break,
                    _ => {}
                }
                self.advance();
            }
        }
    }

    /// `name ["Title"]`
    pub(crate) fn declaration_header(&mut self) -> Result<(String, Option<String>), ParseError> {
        let name = self.expect_identifier()?;
        let title = self.opt_string();
        Ok((name, title))
    }

    /// `":" value NEWLINE` after a directive keyword, for string values.
    pub(crate) fn colon_string(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::Colon)?;
        let s = self.expect_string()?;
        self.end_statement()?;
        Ok(s)
    }

    pub(crate) fn colon_identifier(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::Colon)?;
        let s = self.expect_identifier()?;
        self.end_statement()?;
        Ok(s)
    }

    pub(crate) fn colon_u32(&mut self) -> Result<u32, ParseError> {
        self.expect(TokenKind::Colon)?;
        let n = self.expect_u32()?;
        self.end_statement()?;
        Ok(n)
    }

    pub(crate) fn colon_bool(&mut self) -> Result<bool, ParseError> {
        self.expect(TokenKind::Colon)?;
        let b = self.expect_bool()?;
        self.end_statement()?;
        Ok(b)
    }

    pub(crate) fn colon_duration(&mut self) -> Result<Duration, ParseError> {
        self.expect(TokenKind::Colon)?;
        let d = self.expect_duration()?;
        self.end_statement()?;
        Ok(d)
    }

    pub(crate) fn colon_identifier_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(TokenKind::Colon)?;
        let items = self.identifier_list()?;
        self.end_statement()?;
        Ok(items)
    }

    pub(crate) fn colon_choice<T: Copy>(
        &mut self,
        what: &str,
        choices: &[(&str, T)],
    ) -> Result<T, ParseError> {
        self.expect(TokenKind::Colon)?;
        let v = self.expect_choice(what, choices)?;
        self.end_statement()?;
        Ok(v)
    }

    /// A mandatory directive was absent from a declaration.
    pub(crate) fn missing(construct: &str, name: &str, directive: &str, loc: &Location) -> ParseError {
        ParseError::new(
            loc.clone(),
            format!("{} '{}' is missing required '{}'", construct, name, directive),
        )
    }

    // -- File ---------------------------------------------------

    pub fn parse_file(&mut self) -> Result<ModuleIR, ParseError> {
        while self.eat(TokenKind::Newline) {}

        let mut name = None;
        if self.at_kw(Keyword::Module) {
            self.advance();
            let module = self.module_path()?;
            self.end_statement()?;
            self.module = Some(module.clone());
            name = Some(module);
        }

        let mut uses = Vec::new();
        let mut aliases = IndexMap::new();
        let mut app: Option<AppDeclaration> = None;
        let mut fragment = Fragment::default();
        let mut seen_declaration = false;

        loop {
            while self.eat(TokenKind::Newline) {}
            let tok = self.current().clone();
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Keyword(Keyword::Module) => {
                    return Err(self.err("'module' must be the first statement of a file"));
                }
                TokenKind::Keyword(Keyword::Use) => {
                    if seen_declaration {
                        return Err(self.err("'use' must appear before any declaration"));
                    }
                    self.advance();
                    let target = self.module_path()?;
                    if self.eat_kw(Keyword::As) {
                        let alias = self.expect_identifier()?;
                        aliases.insert(alias, target.clone());
                    }
                    self.end_statement()?;
                    if !uses.contains(&target) {
                        uses.push(target);
                    }
                }
                TokenKind::Keyword(Keyword::App) => {
                    if let Some(existing) = &app {
                        return Err(self.err(format!("app already declared at {}", existing.loc)));
                    }
                    app = Some(self.parse_app()?);
                    seen_declaration = true;
                }
                TokenKind::Keyword(k) => match construct_for(k) {
                    Some(construct) => {
                        fragment = construct(self, fragment)?;
                        seen_declaration = true;
                    }
                    None => return Err(self.unexpected("a top-level declaration")),
                },
                TokenKind::Indent => {
                    return Err(self.err("unexpected indentation at top level"));
                }
                _ => return Err(self.unexpected("a top-level declaration")),
            }
        }

        Ok(ModuleIR {
            name: name.unwrap_or_else(|| default_module_name(&self.file)),
            source_file: self.file.clone(),
            uses,
            aliases,
            app,
            fragment,
        })
    }

    /// `app name ["Title"] [: config]`
    fn parse_app(&mut self) -> Result<AppDeclaration, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::App)?;
        let (name, title) = self.declaration_header()?;
        let mut config = AppConfig::default();
        if self.at(TokenKind::Colon) {
            self.block(|p| {
                match p.current_keyword() {
                    Some(Keyword::Description) => {
                        p.advance();
                        config.description = Some(p.colon_string()?);
                    }
                    Some(Keyword::MultiTenant) => {
                        p.advance();
                        config.multi_tenant = p.colon_bool()?;
                    }
                    Some(Keyword::AuditTrail) => {
                        p.advance();
                        config.audit_trail = p.colon_bool()?;
                    }
                    Some(Keyword::SecurityProfile) => {
                        p.advance();
                        config.security_profile =
                            Some(p.colon_choice("security profile", SECURITY_PROFILES)?);
                    }
                    _ if p.current().is_word() && p.peek_is(1, TokenKind::Colon) => {
                        let key = p.advance().text;
                        p.advance();
                        let value = p.advance();
                        if matches!(
                            value.kind,
                            TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent | TokenKind::Eof
                        ) {
                            return Err(p.err_at(&value, format!("missing value for '{}'", key)));
                        }
                        p.end_statement()?;
                        config.extensions.insert(key, value.text);
                    }
                    _ => p.skip_statement(),
                }
                Ok(())
            })?;
        } else {
            self.end_statement()?;
        }
        Ok(AppDeclaration {
            loc,
            name,
            title,
            config,
        })
    }
}

const SECURITY_PROFILES: &[(&str, crate::ir::SecurityProfile)] = &[
    ("basic", crate::ir::SecurityProfile::Basic),
    ("standard", crate::ir::SecurityProfile::Standard),
    ("strict", crate::ir::SecurityProfile::Strict),
];

fn describe(tok: &Token) -> String {
    match tok.kind {
        TokenKind::Identifier => format!("identifier '{}'", tok.text),
        TokenKind::Str => format!("string \"{}\"", tok.text),
        TokenKind::Number | TokenKind::Duration => format!("'{}'", tok.text),
        kind => kind.describe(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module(src: &str) -> ModuleIR {
        parse_module(src, "test.dsl").expect("parse")
    }

    #[test]
    fn header_is_optional() {
        let m = module("entity Task:\n  title: str\n");
        assert_eq!(m.name, "test");
        assert!(m.uses.is_empty());
        assert_eq!(m.fragment.entities.len(), 1);
    }

    #[test]
    fn header_module_uses_and_aliases() {
        let m = module("module shop.orders\nuse shop.core\nuse shop.billing as billing\n\nentity Order:\n  id: uuid pk\n");
        assert_eq!(m.name, "shop.orders");
        assert_eq!(m.uses, vec!["shop.core", "shop.billing"]);
        assert_eq!(m.aliases.get("billing").map(String::as_str), Some("shop.billing"));
        assert_eq!(
            m.fragment.entities[0].loc.module.as_deref(),
            Some("shop.orders")
        );
    }

    #[test]
    fn module_paths_accept_keyword_segments() {
        let m = module("module shop.app\nuse shop.entity\nuse crm.surface as views\n\napp shop\n");
        assert_eq!(m.name, "shop.app");
        assert_eq!(m.uses, vec!["shop.entity", "crm.surface"]);
        assert_eq!(m.aliases.get("views").map(String::as_str), Some("crm.surface"));
        assert_eq!(module("module entity\n").name, "entity");
    }

    #[test]
    fn aliases_are_serialized_for_backends() {
        let m = module("module shop.orders\nuse shop.billing as billing\n");
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["aliases"]["billing"], "shop.billing");
        let plain = serde_json::to_value(module("module shop.core\n")).unwrap();
        assert!(plain.get("aliases").is_none());
    }

    #[test]
    fn module_path_still_needs_a_word() {
        let err = parse_module("module shop.\n", "t.dsl").unwrap_err();
        assert!(err.message.contains("expected word"), "{}", err.message);
        assert_eq!(err.location.line, 1);
    }

    #[test]
    fn app_block_with_extensions() {
        let src = "app shop \"Shop\":\n  description: \"Sells things\"\n  multi_tenant: true\n  security_profile: strict\n  theme: dark\n";
        let app = module(src).app.expect("app");
        assert_eq!(app.name, "shop");
        assert_eq!(app.title.as_deref(), Some("Shop"));
        assert!(app.config.multi_tenant);
        assert!(!app.config.audit_trail);
        assert_eq!(
            app.config.security_profile,
            Some(crate::ir::SecurityProfile::Strict)
        );
        assert_eq!(app.config.extensions.get("theme").map(String::as_str), Some("dark"));
    }

    #[test]
    fn app_without_block() {
        let app = module("app tiny\n").app.expect("app");
        assert_eq!(app.name, "tiny");
        assert!(app.title.is_none());
    }

    #[test]
    fn use_after_declaration_is_rejected() {
        let err = parse_module("entity A:\n  x: int\nuse other\n", "t.dsl").unwrap_err();
        assert!(err.message.contains("'use' must appear before"));
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn unknown_top_level_word_fails_with_location() {
        let err = parse_module("entity A:\n  x: int\nwidget B:\n", "t.dsl").unwrap_err();
        assert_eq!(err.location.line, 3);
        assert_eq!(err.location.column, 1);
        assert!(err.message.contains("expected a top-level declaration"));
        assert!(err.snippet.is_some());
    }

    #[test]
    fn reserved_keyword_as_name_offers_suggestions() {
        let err = parse_module("entity Task:\n  entity: str\n", "t.dsl").unwrap_err();
        assert!(err.message.contains("reserved keyword"));
        assert!(!err.suggestions.is_empty());
    }

    #[test]
    fn every_construct_keyword_is_reserved_or_contextual_once() {
        let kws: Vec<Keyword> = construct_keywords().collect();
        assert_eq!(kws.len(), 30);
        let mut sorted = kws.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), kws.len());
    }

    #[test]
    fn default_module_name_strips_dirs_and_extension() {
        assert_eq!(default_module_name("dsl/orders.dsl"), "orders");
        assert_eq!(default_module_name("plain"), "plain");
    }

    #[test]
    fn duplicate_singleton_in_one_file() {
        let src = "tenancy:\n  mode: shared_schema\ntenancy:\n  mode: shared_schema\n";
        let err = parse_module(src, "t.dsl").unwrap_err();
        assert!(err.message.contains("tenancy already declared"));
    }
}
