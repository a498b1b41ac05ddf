//! Module dependency ordering over the `use` graph.

use indexmap::IndexMap;
use std::collections::VecDeque;

use crate::error::{Diagnostic, LinkCategory, LinkError, Location};
use crate::ir::ModuleIR;

fn module_loc(module: &ModuleIR) -> Location {
    Location::new(&module.source_file, 1, 1).in_module(&module.name)
}

/// Order modules so that every module follows all the modules it uses.
///
/// Fails when a used module does not exist, when two files declare the
/// same module, or when the `use` graph has a cycle. A cycle is reported
/// once, naming every module that could not be ordered.
pub fn resolve_dependencies(modules: &[ModuleIR]) -> Result<Vec<&ModuleIR>, LinkError> {
    let mut by_name: IndexMap<&str, usize> = IndexMap::new();
    let mut duplicates = Vec::new();
    for (i, module) in modules.iter().enumerate() {
        if let Some(&first) = by_name.get(module.name.as_str()) {
            duplicates.push(
                Diagnostic::new(format!(
                    "module '{}' is defined in both '{}' and '{}'",
                    module.name, modules[first].source_file, module.source_file
                ))
                .at(&module_loc(module)),
            );
            continue;
        }
        by_name.insert(module.name.as_str(), i);
    }
    if !duplicates.is_empty() {
        return Err(LinkError::new(LinkCategory::DuplicateSymbol, duplicates));
    }

    let mut missing = Vec::new();
    for module in modules {
        for dep in &module.uses {
            if !by_name.contains_key(dep.as_str()) {
                missing.push(
                    Diagnostic::new(format!(
                        "module '{}' depends on '{}', but '{}' is not defined",
                        module.name, dep, dep
                    ))
                    .at(&module_loc(module)),
                );
            }
        }
    }
    if !missing.is_empty() {
        return Err(LinkError::new(LinkCategory::MissingDependency, missing));
    }

    // Kahn: edges run from a dependency to the modules that use it.
    let mut in_degree = vec![0usize; modules.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
    for (i, module) in modules.iter().enumerate() {
        let mut seen: Vec<usize> = Vec::new();
        for dep in &module.uses {
            let Some(&d) = by_name.get(dep.as_str()) else {
                continue;
            };
            if d == i || seen.contains(&d) {
                continue;
            }
            seen.push(d);
            in_degree[i] += 1;
            dependents[d].push(i);
        }
    }

    let mut queue: VecDeque<usize> = (0..modules.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<&ModuleIR> = Vec::with_capacity(modules.len());
    while let Some(i) = queue.pop_front() {
        order.push(&modules[i]);
        for &next in &dependents[i] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                queue.push_back(next);
            }
        }
    }

    if order.len() < modules.len() {
        let stuck: Vec<&str> = modules
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, m)| m.name.as_str())
            .collect();
        let first = modules
            .iter()
            .find(|m| stuck.contains(&m.name.as_str()))
            .map(module_loc);
        let mut diagnostic = Diagnostic::new(format!(
            "circular dependency between modules: {}",
            stuck.join(", ")
        ))
        .hint("remove one of the 'use' lines to break the cycle");
        diagnostic.location = first;
        return Err(LinkError::new(LinkCategory::CircularDependency, vec![diagnostic]));
    }

    tracing::debug!(
        order = ?order.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
        "resolved module order"
    );
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Fragment;

    fn bare(name: &str, uses: &[&str]) -> ModuleIR {
        ModuleIR {
            name: name.into(),
            source_file: format!("{}.dsl", name),
            uses: uses.iter().map(|u| u.to_string()).collect(),
            aliases: IndexMap::new(),
            app: None,
            fragment: Fragment::default(),
        }
    }

    fn names(order: &[&ModuleIR]) -> Vec<String> {
        order.iter().map(|m| m.name.clone()).collect()
    }

    #[test]
    fn dependency_comes_first() {
        let modules = vec![bare("b", &["a"]), bare("a", &[])];
        let order = resolve_dependencies(&modules).unwrap();
        assert_eq!(names(&order), vec!["a", "b"]);
    }

    #[test]
    fn independent_modules_keep_input_order() {
        let modules = vec![bare("x", &[]), bare("y", &[]), bare("z", &["x"])];
        let order = resolve_dependencies(&modules).unwrap();
        assert_eq!(names(&order), vec!["x", "y", "z"]);
    }

    #[test]
    fn missing_dependency() {
        let modules = vec![bare("b", &["nowhere"])];
        let err = resolve_dependencies(&modules).unwrap_err();
        assert_eq!(err.category, LinkCategory::MissingDependency);
        assert_eq!(
            err.diagnostics[0].message,
            "module 'b' depends on 'nowhere', but 'nowhere' is not defined"
        );
    }

    #[test]
    fn cycle_names_every_stuck_module() {
        let modules = vec![
            bare("root", &[]),
            bare("a", &["b"]),
            bare("b", &["c"]),
            bare("c", &["a"]),
            bare("leaf", &["a"]),
        ];
        let err = resolve_dependencies(&modules).unwrap_err();
        assert_eq!(err.category, LinkCategory::CircularDependency);
        assert_eq!(err.diagnostics.len(), 1);
        let message = &err.diagnostics[0].message;
        for name in ["a", "b", "c", "leaf"] {
            assert!(message.contains(name), "{message}");
        }
        assert!(!message.contains("root"));
    }

    #[test]
    fn self_use_is_ignored() {
        let modules = vec![bare("a", &["a"])];
        assert_eq!(names(&resolve_dependencies(&modules).unwrap()), vec!["a"]);
    }

    #[test]
    fn duplicate_module_names() {
        let modules = vec![bare("a", &[]), bare("a", &[])];
        let err = resolve_dependencies(&modules).unwrap_err();
        assert_eq!(err.category, LinkCategory::DuplicateSymbol);
    }
}
