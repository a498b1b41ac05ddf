//! Multi-module linking through the public API.

use trellis_core::{
    compile_sources, link, parse_module, CompileOptions, LinkCategory, ModuleIR, SourceFile,
    TrellisError, WarningKind,
};

fn modules(files: &[(&str, &str)]) -> Vec<ModuleIR> {
    files
        .iter()
        .map(|(file, text)| {
            parse_module(text, file).unwrap_or_else(|e| panic!("{} failed to parse: {}", file, e))
        })
        .collect()
}

fn link_error(files: &[(&str, &str)]) -> trellis_core::LinkError {
    match link(&modules(files)).unwrap_err() {
        TrellisError::Link(err) => err,
        other => panic!("expected a link error, got: {}", other),
    }
}

#[test]
fn missing_dependency_names_both_modules() {
    let err = link_error(&[("b.dsl", "module b\nuse payments\n")]);
    assert_eq!(err.category, LinkCategory::MissingDependency);
    assert_eq!(
        err.diagnostics[0].message,
        "module 'b' depends on 'payments', but 'payments' is not defined"
    );
}

#[test]
fn duplicate_symbols_are_all_reported() {
    let err = link_error(&[
        ("a.dsl", "module a\nentity Task:\n  id: uuid pk\nentity Tag:\n  id: uuid pk\n"),
        ("b.dsl", "module b\nentity Task:\n  id: uuid pk\nentity Tag:\n  id: uuid pk\n"),
    ]);
    assert_eq!(err.category, LinkCategory::DuplicateSymbol);
    assert_eq!(err.diagnostics.len(), 2);
    for (d, name) in err.diagnostics.iter().zip(["Task", "Tag"]) {
        assert!(d.message.contains(&format!("'{}'", name)), "{}", d.message);
        assert!(d.message.contains("module 'a'") && d.message.contains("module 'b'"));
    }
}

#[test]
fn same_name_different_kinds_is_fine() {
    let linked = link(&modules(&[(
        "a.dsl",
        "entity Task:\n  id: uuid pk\n  title: str(100)\n\nsurface Task:\n  uses entity Task\n  section main:\n    field title\n",
    )]))
    .unwrap();
    assert_eq!(linked.fragment.entities.len(), 1);
    assert_eq!(linked.fragment.surfaces.len(), 1);
}

#[test]
fn singleton_declared_twice() {
    let err = link_error(&[
        ("a.dsl", "module a\ntenancy:\n  mode: shared_schema\n"),
        ("b.dsl", "module b\ntenancy:\n  mode: schema_per_tenant\n"),
    ]);
    assert_eq!(err.category, LinkCategory::DuplicateSymbol);
    assert!(err.diagnostics[0].message.contains("tenancy"));
}

#[test]
fn visibility_requires_use() {
    let err = link_error(&[
        ("crm.dsl", "module crm\nentity Client:\n  id: uuid pk\n"),
        (
            "billing.dsl",
            "module billing\nentity Invoice:\n  id: uuid pk\n  client: ref Client\n",
        ),
    ]);
    assert_eq!(err.category, LinkCategory::Visibility);
    assert_eq!(err.diagnostics[0].hint.as_deref(), Some("add: use crm"));
}

#[test]
fn every_broken_reference_is_collected() {
    let files = [(
        "app.dsl",
        r#"entity Invoice:
  id: uuid pk
  client: ref Client
  kind: enum InvoiceKind

surface invoice_list:
  uses entity Invoice
  section main:
    field total

workspace billing:
  open:
    source: Payment
"#,
    )];
    match link(&modules(&files)).unwrap_err() {
        TrellisError::Validation(err) => {
            let messages = err.messages();
            assert_eq!(messages.len(), 4, "{:#?}", messages);
            assert!(messages.iter().any(|m| m.contains("unknown entity 'Client'")));
            assert!(messages.iter().any(|m| m.contains("'InvoiceKind'")));
            assert!(messages.iter().any(|m| m.contains("'total'")));
            assert!(messages.iter().any(|m| m.contains("'Payment'")));
        }
        other => panic!("expected a validation error, got: {}", other),
    }
}

#[test]
fn entity_cycle_is_only_a_warning() {
    let sources = vec![SourceFile::new(
        "org.dsl",
        "entity Team:\n  id: uuid pk\n  lead: ref Person\n\nentity Person:\n  id: uuid pk\n  team: ref Team\n",
    )];
    let spec = compile_sources(&sources, &CompileOptions::default()).unwrap();
    assert_eq!(spec.warnings.len(), 1);
    assert_eq!(spec.warnings[0].kind, WarningKind::EntityCycle);
    assert_eq!(spec.warnings[0].message, "entity reference cycle: Person -> Team -> Person");
}

#[test]
fn link_order_is_stable_for_independent_modules() {
    let linked = link(&modules(&[
        ("z.dsl", "module z\n"),
        ("a.dsl", "module a\n"),
        ("m.dsl", "module m\nuse z\n"),
    ]))
    .unwrap();
    assert_eq!(linked.order, vec!["z", "a", "m"]);
}
