#![allow(clippy::result_large_err)]
//! trellis-core: front end of the Trellis application DSL.
//!
//! Turns `.dsl` source files into one validated application IR:
//!
//! - [`lexer`] -- indentation-aware tokenizer
//! - [`parser`] -- recursive-descent parser, one grammar per construct
//! - [`ir`] -- the IR value model
//! - [`linker`] -- module ordering, symbol table, reference validation
//! - [`archetype`] -- archetype expansion and default surfaces
//! - [`compile`] -- the whole pipeline, from sources or a `trellis.toml`
//!   project
//!
//! Every stage logs through `tracing`; installing a subscriber is up to the
//! caller.

pub mod archetype;
pub mod compile;
pub mod error;
pub mod ir;
pub mod keywords;
pub mod lexer;
pub mod linker;
pub mod manifest;
pub mod parser;
pub mod source;

// ── Convenience re-exports: key types ────────────────────────────────

pub use compile::{AppSpec, CompileOptions, SourceFile};
pub use error::{
    Diagnostic, LinkCategory, LinkError, Location, ParseError, TrellisError, ValidationError,
    Warning, WarningKind,
};
pub use ir::{Fragment, ModuleIR};
pub use linker::{LinkedApp, SymbolKind, SymbolTable};
pub use manifest::Manifest;
pub use source::{FileSystemProvider, InMemoryProvider, SourceProvider};

// ── Convenience re-exports: pipeline entry points ────────────────────

pub use archetype::{expand, generate_archetype_surfaces};
pub use compile::{compile_modules, compile_project, compile_sources, parse_sources};
pub use lexer::tokenize;
pub use linker::link;
pub use parser::{parse_fragment, parse_module};
