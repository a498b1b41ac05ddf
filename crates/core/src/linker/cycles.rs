//! Reference cycles between entities. These are legal and only warned
//! about.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

use crate::error::{Warning, WarningKind};
use crate::ir::EntitySpec;

/// Every distinct cycle in the `ref` graph, each rotated to start at its
/// lexicographically smallest entity. Self-references are not cycles.
pub fn find_entity_cycles(entities: &[EntitySpec]) -> Vec<Vec<String>> {
    let mut graph: IndexMap<&str, Vec<&str>> = IndexMap::new();
    for entity in entities {
        let targets = entity
            .references()
            .map(|(_, target)| target)
            .filter(|t| *t != entity.name)
            .collect();
        graph.insert(entity.name.as_str(), targets);
    }

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut cycles = Vec::new();
    for &start in graph.keys() {
        let mut path: IndexSet<&str> = IndexSet::new();
        let mut expanded: HashSet<&str> = HashSet::new();
        walk(start, &graph, &mut path, &mut expanded, &mut |cycle: &[&str]| {
            let normalized = normalize(cycle);
            if seen.insert(normalized.clone()) {
                cycles.push(normalized);
            }
        });
    }
    cycles
}

fn walk<'a>(
    node: &'a str,
    graph: &IndexMap<&'a str, Vec<&'a str>>,
    path: &mut IndexSet<&'a str>,
    expanded: &mut HashSet<&'a str>,
    found: &mut dyn FnMut(&[&str]),
) {
    if let Some(at) = path.get_index_of(node) {
        let members: Vec<&str> = path.iter().skip(at).copied().collect();
        found(&members);
        return;
    }
    if !expanded.insert(node) {
        return;
    }
    path.insert(node);
    for &next in graph.get(node).map(Vec::as_slice).unwrap_or_default() {
        walk(next, graph, path, expanded, found);
    }
    path.pop();
}

fn normalize(cycle: &[&str]) -> Vec<String> {
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, name)| **name)
        .map(|(i, _)| i)
        .unwrap_or(0);
    cycle[start..]
        .iter()
        .chain(&cycle[..start])
        .map(|s| s.to_string())
        .collect()
}

pub fn cycle_warnings(entities: &[EntitySpec]) -> Vec<Warning> {
    find_entity_cycles(entities)
        .into_iter()
        .map(|cycle| {
            let location = entities
                .iter()
                .find(|e| e.name == cycle[0])
                .map(|e| e.loc.clone());
            let mut path = cycle.clone();
            path.push(cycle[0].clone());
            Warning {
                kind: WarningKind::EntityCycle,
                message: format!("entity reference cycle: {}", path.join(" -> ")),
                location,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Location;
    use crate::ir::{FieldSpec, FieldType, RelationKind, RelationType};

    fn entity(name: &str, refs: &[&str]) -> EntitySpec {
        let fields = refs
            .iter()
            .map(|t| {
                FieldSpec::new(
                    t.to_lowercase(),
                    FieldType::Relation(RelationType::new(RelationKind::Ref, *t)),
                )
            })
            .collect();
        EntitySpec::new(name, Location::new("m.dsl", 1, 1)).with_fields(fields)
    }

    #[test]
    fn mutual_reference_is_one_cycle() {
        let cycles = find_entity_cycles(&[entity("B", &["A"]), entity("A", &["B"])]);
        assert_eq!(cycles, vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[test]
    fn rotation_does_not_duplicate() {
        let cycles = find_entity_cycles(&[
            entity("C", &["A"]),
            entity("B", &["C"]),
            entity("A", &["B"]),
        ]);
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A", "B", "C"]);
    }

    #[test]
    fn self_reference_is_ignored() {
        assert!(find_entity_cycles(&[entity("Task", &["Task"])]).is_empty());
    }

    #[test]
    fn acyclic_graph() {
        let cycles = find_entity_cycles(&[
            entity("Order", &["Customer"]),
            entity("Customer", &[]),
            entity("Line", &["Order"]),
        ]);
        assert!(cycles.is_empty());
    }

    #[test]
    fn warning_closes_the_loop() {
        let warnings = cycle_warnings(&[entity("A", &["B"]), entity("B", &["A"])]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, WarningKind::EntityCycle);
        assert_eq!(warnings[0].message, "entity reference cycle: A -> B -> A");
    }
}
