//! Cross-module linking.
//!
//! Linking runs over the whole application at once:
//!
//! 1. order modules by their `use` graph ([`deps`])
//! 2. build the symbol table in that order ([`symbols`])
//! 3. check that cross-module references are imported ([`visibility`])
//! 4. check that every reference resolves ([`references`])
//! 5. warn about entity reference cycles ([`cycles`])
//! 6. flatten into one application fragment ([`merge`])
//!
//! Structural problems abort with a [`LinkError`], broken references with a
//! [`ValidationError`](crate::error::ValidationError). Both carry every
//! finding of their category. Warnings never block linking.

pub mod cycles;
pub mod deps;
pub mod merge;
pub mod references;
pub mod symbols;
pub mod visibility;

pub use cycles::find_entity_cycles;
pub use deps::resolve_dependencies;
pub use references::{collect_references, Reference};
pub use symbols::{build_symbol_table, SymbolKind, SymbolTable};

use crate::error::{TrellisError, Warning};
use crate::ir::{AppDeclaration, Fragment, ModuleIR};

/// The result of linking every module of an application.
#[derive(Debug, Clone)]
pub struct LinkedApp {
    /// Module names in dependency order
    pub order: Vec<String>,
    pub symbols: SymbolTable,
    pub fragment: Fragment,
    pub app: Option<AppDeclaration>,
    pub warnings: Vec<Warning>,
}

#[tracing::instrument(skip_all, fields(modules = modules.len()))]
pub fn link(modules: &[ModuleIR]) -> Result<LinkedApp, TrellisError> {
    let ordered = deps::resolve_dependencies(modules)?;
    let symbols = symbols::build_symbol_table(&ordered)?;
    let app = merge::app_declaration(&ordered)?;

    visibility::check_visibility(&ordered, &symbols)?;
    let fragment = merge::merge(&symbols);
    references::validate_references(&fragment, &symbols)?;

    let mut warnings = visibility::unused_imports(&ordered, &symbols);
    warnings.extend(cycles::cycle_warnings(&fragment.entities));
    for warning in &warnings {
        tracing::warn!(kind = ?warning.kind, "{}", warning.message);
    }

    Ok(LinkedApp {
        order: ordered.iter().map(|m| m.name.clone()).collect(),
        symbols,
        fragment,
        app,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LinkCategory, WarningKind};
    use crate::parser::parse_module;

    fn parse(sources: &[(&str, &str)]) -> Vec<ModuleIR> {
        sources
            .iter()
            .map(|(file, src)| parse_module(src, file).expect("parse"))
            .collect()
    }

    #[test]
    fn links_in_dependency_order() {
        let modules = parse(&[
            (
                "orders.dsl",
                "module shop.orders\nuse shop.core\nentity Order:\n  id: uuid pk\n  customer: ref Customer\n",
            ),
            ("core.dsl", "module shop.core\nentity Customer:\n  id: uuid pk\n"),
        ]);
        let linked = link(&modules).unwrap();
        assert_eq!(linked.order, vec!["shop.core", "shop.orders"]);
        let names: Vec<_> = linked.fragment.entities.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Customer", "Order"]);
        assert!(linked.warnings.is_empty());
    }

    #[test]
    fn circular_modules_fail() {
        let modules = parse(&[
            ("a.dsl", "module a\nuse b\n"),
            ("b.dsl", "module b\nuse a\n"),
        ]);
        match link(&modules).unwrap_err() {
            TrellisError::Link(err) => {
                assert_eq!(err.category, LinkCategory::CircularDependency);
                let message = &err.diagnostics[0].message;
                assert!(message.contains('a') && message.contains('b'));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn broken_reference_is_a_validation_error() {
        let modules = parse(&[(
            "billing.dsl",
            "entity Invoice:\n  id: uuid pk\n  client: ref Client\n",
        )]);
        match link(&modules).unwrap_err() {
            TrellisError::Validation(err) => {
                assert_eq!(err.diagnostics.len(), 1);
                let message = &err.diagnostics[0].message;
                for needle in ["Invoice", "client", "Client"] {
                    assert!(message.contains(needle), "{message}");
                }
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn entity_cycles_are_warnings() {
        let modules = parse(&[(
            "m.dsl",
            "entity A:\n  id: uuid pk\n  b: ref B\n\nentity B:\n  id: uuid pk\n  a: ref A\n",
        )]);
        let linked = link(&modules).unwrap();
        assert_eq!(linked.warnings.len(), 1);
        assert_eq!(linked.warnings[0].kind, WarningKind::EntityCycle);
    }
}
