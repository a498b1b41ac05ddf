//! Module visibility: a module may only refer to its own declarations and
//! to those of the modules it `use`s.

use std::collections::HashSet;

use super::references::collect_references;
use super::symbols::SymbolTable;
use crate::error::{Diagnostic, LinkCategory, LinkError, Warning, WarningKind};
use crate::ir::ModuleIR;

/// Owning modules of everything `module` refers to. Unresolved names are
/// left to reference validation.
fn referenced_modules<'a>(module: &ModuleIR, symbols: &'a SymbolTable) -> HashSet<&'a str> {
    collect_references(&module.fragment)
        .into_iter()
        .filter_map(|r| symbols.owner(r.resolve(symbols)?, r.name))
        .collect()
}

/// Report every reference to a module that is neither the referring
/// module nor one of its imports.
pub fn check_visibility(modules: &[&ModuleIR], symbols: &SymbolTable) -> Result<(), LinkError> {
    let mut violations = Vec::new();
    for module in modules {
        let refs = collect_references(&module.fragment);
        for r in refs {
            let Some(kind) = r.resolve(symbols) else {
                continue;
            };
            let Some(owner) = symbols.owner(kind, r.name) else {
                continue;
            };
            if module.uses_module(owner) {
                continue;
            }
            violations.push(
                Diagnostic::new(format!(
                    "{} references {} '{}' from module '{}', which module '{}' does not import",
                    r.context, kind, r.name, owner, module.name
                ))
                .at(r.loc)
                .hint(format!("add: use {}", owner)),
            );
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(LinkError::new(LinkCategory::Visibility, violations))
    }
}

/// Imports a module declares but never refers to.
pub fn unused_imports(modules: &[&ModuleIR], symbols: &SymbolTable) -> Vec<Warning> {
    let mut warnings = Vec::new();
    for module in modules {
        let used = referenced_modules(module, symbols);
        for import in &module.uses {
            if import == &module.name || used.contains(import.as_str()) {
                continue;
            }
            warnings.push(Warning {
                kind: WarningKind::UnusedImport,
                message: format!(
                    "module '{}' imports '{}' but never references it",
                    module.name, import
                ),
                location: None,
            });
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::symbols::build_symbol_table;
    use crate::parser::parse_module;

    fn modules(sources: &[(&str, &str)]) -> Vec<ModuleIR> {
        sources
            .iter()
            .map(|(file, src)| parse_module(src, file).expect("parse"))
            .collect()
    }

    #[test]
    fn reference_without_import_is_a_violation() {
        let ms = modules(&[
            ("crm.dsl", "module crm\nentity Client:\n  id: uuid pk\n"),
            (
                "billing.dsl",
                "module billing\nentity Invoice:\n  id: uuid pk\n  client: ref Client\n",
            ),
        ]);
        let refs: Vec<&ModuleIR> = ms.iter().collect();
        let symbols = build_symbol_table(&refs).unwrap();
        let err = check_visibility(&refs, &symbols).unwrap_err();
        assert_eq!(err.category, LinkCategory::Visibility);
        assert_eq!(err.diagnostics.len(), 1);
        let d = &err.diagnostics[0];
        assert!(d.message.contains("from module 'crm'"));
        assert_eq!(d.hint.as_deref(), Some("add: use crm"));
    }

    #[test]
    fn imported_reference_is_visible() {
        let ms = modules(&[
            ("crm.dsl", "module crm\nentity Client:\n  id: uuid pk\n"),
            (
                "billing.dsl",
                "module billing\nuse crm\nentity Invoice:\n  id: uuid pk\n  client: ref Client\n",
            ),
        ]);
        let refs: Vec<&ModuleIR> = ms.iter().collect();
        let symbols = build_symbol_table(&refs).unwrap();
        check_visibility(&refs, &symbols).unwrap();
        assert!(unused_imports(&refs, &symbols).is_empty());
    }

    #[test]
    fn unused_import_warns() {
        let ms = modules(&[
            ("crm.dsl", "module crm\nentity Client:\n  id: uuid pk\n"),
            ("billing.dsl", "module billing\nuse crm\nentity Invoice:\n  id: uuid pk\n"),
        ]);
        let refs: Vec<&ModuleIR> = ms.iter().collect();
        let symbols = build_symbol_table(&refs).unwrap();
        let warnings = unused_imports(&refs, &symbols);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::UnusedImport);
        assert!(warnings[0].message.contains("imports 'crm'"));
    }
}
