//! Error and warning types shared by every stage of the pipeline.
//!
//! Parse errors are fail-fast and carry a single location. Link and
//! validation errors are batch-style: each carries every [`Diagnostic`]
//! found within one category.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::lexer::TAB_WIDTH;

/// A source position, rendered as `<file>:<line>:<column>[ in module <name>]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
}

impl Location {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Location {
            file: file.into(),
            line,
            column,
            module: None,
        }
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)?;
        if let Some(module) = &self.module {
            write!(f, " in module {}", module)?;
        }
        Ok(())
    }
}

/// Render the source line at `line` with a `^^^` marker under `column`.
///
/// `column` counts characters. Tabs are echoed as [`TAB_WIDTH`] spaces and
/// the marker is shifted to match.
pub fn render_snippet(source: &str, line: u32, column: u32, width: usize) -> Option<String> {
    let raw = source.lines().nth(line.checked_sub(1)? as usize)?;
    let text = raw.replace('\t', &" ".repeat(TAB_WIDTH));
    let gutter = format!("{:>4}", line);
    let offset: usize = raw
        .chars()
        .take(column.saturating_sub(1) as usize)
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum();
    let pad = " ".repeat(offset);
    let marker = "^".repeat(width.max(1));
    Some(format!(
        "{} | {}\n{} | {}{}",
        gutter,
        text,
        " ".repeat(gutter.len()),
        pad,
        marker
    ))
}

// ──────────────────────────────────────────────
// Parse errors
// ──────────────────────────────────────────────

/// A lexical or syntactic error. The first one aborts the parse of a file.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ParseError {
    pub location: Location,
    pub message: String,
    /// Alternative identifiers offered when a reserved keyword was used as a name.
    pub suggestions: Vec<String>,
    pub snippet: Option<String>,
}

impl ParseError {
    pub fn new(location: Location, message: impl Into<String>) -> Self {
        ParseError {
            location,
            message: message.into(),
            suggestions: Vec::new(),
            snippet: None,
        }
    }

    pub fn at(file: &str, line: u32, column: u32, message: impl Into<String>) -> Self {
        ParseError::new(Location::new(file, line, column), message)
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Attach a caret snippet taken from the original source text.
    pub fn with_source(mut self, source: &str) -> Self {
        self.snippet = render_snippet(source, self.location.line, self.location.column, 3);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)?;
        if !self.suggestions.is_empty() {
            write!(f, " (try: {})", self.suggestions.join(", "))?;
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n{}", snippet)?;
        }
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Batch diagnostics
// ──────────────────────────────────────────────

/// One finding inside a batch-reported link or validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Diagnostic {
            location: None,
            message: message.into(),
            hint: None,
        }
    }

    pub fn at(mut self, location: &Location) -> Self {
        self.location = Some(location.clone());
        self
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(loc) = &self.location {
            write!(f, "{}: ", loc)?;
        }
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({})", hint)?;
        }
        Ok(())
    }
}

fn join_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| format!("  - {}", d))
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_warnings(warnings: &[Warning]) -> String {
    warnings
        .iter()
        .map(|w| format!("  - {}", w))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkCategory {
    MissingDependency,
    CircularDependency,
    DuplicateSymbol,
    Visibility,
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkCategory::MissingDependency => "missing module dependency",
            LinkCategory::CircularDependency => "circular module dependency",
            LinkCategory::DuplicateSymbol => "duplicate definition",
            LinkCategory::Visibility => "module visibility violation",
        };
        f.write_str(s)
    }
}

/// Structural problems across modules: missing, cyclic, duplicate, or
/// not-imported definitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("link error ({category}):\n{}", join_diagnostics(.diagnostics))]
pub struct LinkError {
    pub category: LinkCategory,
    pub diagnostics: Vec<Diagnostic>,
}

impl LinkError {
    pub fn new(category: LinkCategory, diagnostics: Vec<Diagnostic>) -> Self {
        LinkError {
            category,
            diagnostics,
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.message.clone()).collect()
    }
}

/// Semantic problems: references that do not resolve.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed:\n{}", join_diagnostics(.diagnostics))]
pub struct ValidationError {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationError {
    pub fn messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.message.clone()).collect()
    }
}

// ──────────────────────────────────────────────
// Warnings
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    UnusedImport,
    EntityCycle,
}

/// A non-fatal finding. Warnings never block linking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: warning: {}", loc, self.message),
            None => write!(f, "warning: {}", self.message),
        }
    }
}

// ──────────────────────────────────────────────
// Umbrella error
// ──────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TrellisError {
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Link(#[from] LinkError),
    #[error("{0}")]
    Validation(#[from] ValidationError),
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest '{path}': {message}")]
    Manifest { path: String, message: String },
    #[error("{count} warning(s) denied:\n{}", join_warnings(.warnings))]
    DeniedWarnings { count: usize, warnings: Vec<Warning> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_renders_module_suffix() {
        let loc = Location::new("shop.dsl", 4, 7).in_module("shop.core");
        assert_eq!(loc.to_string(), "shop.dsl:4:7 in module shop.core");
        assert_eq!(Location::new("a.dsl", 1, 1).to_string(), "a.dsl:1:1");
    }

    #[test]
    fn snippet_places_caret_under_column() {
        let src = "entity Task:\n  title: str(200) requried\n";
        let snippet = render_snippet(src, 2, 19, 3).expect("line exists");
        let lines: Vec<&str> = snippet.lines().collect();
        assert_eq!(lines[0], "   2 |   title: str(200) requried");
        let caret_at = lines[1].find('^').expect("caret present");
        let text_at = lines[0].find("requried").expect("token present");
        assert_eq!(caret_at, text_at);
    }

    #[test]
    fn snippet_expands_tabs_under_caret() {
        let src = "entity Task:\n\ttitle: str(200) requried\n";
        let snippet = render_snippet(src, 2, 18, 3).expect("line exists");
        let lines: Vec<&str> = snippet.lines().collect();
        assert!(!lines[0].contains('\t'));
        assert_eq!(lines[0], "   2 |     title: str(200) requried");
        let caret_at = lines[1].find('^').expect("caret present");
        let text_at = lines[0].find("requried").expect("token present");
        assert_eq!(caret_at, text_at);
    }

    #[test]
    fn snippet_out_of_range_is_none() {
        assert!(render_snippet("one line", 5, 1, 1).is_none());
    }

    #[test]
    fn parse_error_display_includes_suggestions() {
        let err = ParseError::at("a.dsl", 3, 5, "'entity' is a reserved keyword")
            .with_suggestions(vec!["entity_ref".into(), "target_entity".into()]);
        let shown = err.to_string();
        assert!(shown.starts_with("a.dsl:3:5: "));
        assert!(shown.contains("try: entity_ref, target_entity"));
    }

    #[test]
    fn link_error_lists_every_diagnostic() {
        let err = LinkError::new(
            LinkCategory::DuplicateSymbol,
            vec![Diagnostic::new("first"), Diagnostic::new("second").hint("fix it")],
        );
        let shown = err.to_string();
        assert!(shown.contains("duplicate definition"));
        assert!(shown.contains("  - first"));
        assert!(shown.contains("  - second (fix it)"));
    }
}
