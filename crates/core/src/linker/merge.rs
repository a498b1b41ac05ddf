//! Flatten the symbol table into the application-wide fragment.

use super::symbols::SymbolTable;
use crate::error::{Diagnostic, LinkCategory, LinkError};
use crate::ir::{AppDeclaration, Fragment, ModuleIR};

/// One fragment holding every declaration exactly once, in module
/// dependency order.
pub fn merge(symbols: &SymbolTable) -> Fragment {
    let fragment = symbols.to_fragment();
    tracing::debug!(
        declarations = fragment.len(),
        entities = fragment.entities.len(),
        surfaces = fragment.surfaces.len(),
        "merged application fragment"
    );
    fragment
}

/// The single `app` declaration, if any module has one.
pub fn app_declaration(modules: &[&ModuleIR]) -> Result<Option<AppDeclaration>, LinkError> {
    let mut declared = modules
        .iter()
        .filter_map(|m| m.app.as_ref().map(|app| (m.name.as_str(), app)));
    let Some((first_module, first)) = declared.next() else {
        return Ok(None);
    };
    let extra: Vec<Diagnostic> = declared
        .map(|(module, app)| {
            Diagnostic::new(format!(
                "app '{}' in module '{}' conflicts with app '{}' declared in module '{}'",
                app.name, module, first.name, first_module
            ))
            .at(&app.loc)
            .hint("only one module may declare the app")
        })
        .collect();
    if !extra.is_empty() {
        return Err(LinkError::new(LinkCategory::DuplicateSymbol, extra));
    }
    Ok(Some(first.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    #[test]
    fn second_app_is_rejected() {
        let a = parse_module("module a\napp shop \"Shop\"\n", "a.dsl").unwrap();
        let b = parse_module("module b\napp store\n", "b.dsl").unwrap();
        let err = app_declaration(&[&a, &b]).unwrap_err();
        assert_eq!(err.category, LinkCategory::DuplicateSymbol);
        assert!(err.diagnostics[0].message.contains("module 'a'"));
    }

    #[test]
    fn single_app_is_kept() {
        let a = parse_module("module a\napp shop \"Shop\"\n", "a.dsl").unwrap();
        let b = parse_module("module b\n", "b.dsl").unwrap();
        let app = app_declaration(&[&a, &b]).unwrap().unwrap();
        assert_eq!(app.name, "shop");
        assert_eq!(app.title.as_deref(), Some("Shop"));
    }
}
