//! End-to-end compilation of on-disk projects.

use std::path::{Path, PathBuf};

use trellis_core::{
    compile_project, compile_sources, CompileOptions, FileSystemProvider, SourceFile,
    TrellisError,
};

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn field_names(spec: &trellis_core::AppSpec, entity: &str) -> Vec<String> {
    spec.fragment
        .get_entity(entity)
        .unwrap_or_else(|| panic!("entity {} missing", entity))
        .fields
        .iter()
        .map(|f| f.name.clone())
        .collect()
}

#[test]
fn shop_fixture_compiles() {
    let spec = compile_project(&FileSystemProvider, &fixture("shop"))
        .unwrap_or_else(|e| panic!("shop fixture failed: {}", e));

    assert_eq!(spec.project.as_deref(), Some("shop"));
    assert_eq!(spec.modules, vec!["shop.core", "shop.orders", "shop.app"]);
    assert_eq!(spec.app.as_ref().map(|a| a.title.as_deref()), Some(Some("Shop")));
    assert!(spec.warnings.is_empty());

    // archetype fields come first, then the tenant key in front of them
    assert_eq!(
        field_names(&spec, "Order"),
        vec!["organization", "created_at", "updated_at", "id", "customer", "status", "total"]
    );
    assert_eq!(field_names(&spec, "Organization"), vec!["id", "name"]);
    assert_eq!(field_names(&spec, "StoreSettings"), vec!["id", "currency"]);

    let settings = spec.fragment.get_entity("StoreSettings").unwrap();
    assert!(settings.is_singleton);
    assert!(settings.access.is_some());

    let order = spec.fragment.get_entity("Order").unwrap();
    let machine = order.state_machine.as_ref().expect("state machine");
    assert_eq!(machine.status_field, "status");

    let surfaces: Vec<&str> = spec
        .fragment
        .surfaces
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(
        surfaces,
        vec!["order_list", "order_detail", "organization_list", "store_settings_edit"]
    );
}

#[test]
fn shop_fixture_json() {
    let spec = compile_project(&FileSystemProvider, &fixture("shop")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();
    assert_eq!(json["project"], "shop");
    assert_eq!(json["fragment"]["workspaces"][0]["name"], "ops");
    assert_eq!(json["fragment"]["personas"][0]["name"], "staff");
}

#[test]
fn broken_reference_is_reported_with_location() {
    let path = fixture("scratch/notes.dsl");
    let text = std::fs::read_to_string(&path).unwrap();
    let sources = vec![SourceFile::new("notes.dsl", text)];
    match compile_sources(&sources, &CompileOptions::default()).unwrap_err() {
        TrellisError::Validation(err) => {
            assert_eq!(err.diagnostics.len(), 1);
            let d = &err.diagnostics[0];
            assert!(d.message.contains("unknown entity 'Author'"), "{}", d.message);
            assert_eq!(d.location.as_ref().map(|l| l.line), Some(2));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn project_in_temp_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("trellis.toml"),
        "[project]\nname = \"tasks\"\n\n[modules]\npaths = [\"src\"]\n",
    )
    .unwrap();
    std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
    std::fs::write(
        dir.path().join("src/core.dsl"),
        "module tasks.core\nentity Task:\n  id: uuid pk\n  title: str(200) required\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("src/nested/views.dsl"),
        "module tasks.views\nuse tasks.core\nsurface task_list:\n  uses entity Task\n  mode: list\n  section main:\n    field title\n",
    )
    .unwrap();

    let spec = compile_project(&FileSystemProvider, dir.path()).unwrap();
    assert_eq!(spec.modules, vec!["tasks.core", "tasks.views"]);
    assert_eq!(spec.fragment.surfaces.len(), 1);
}

#[test]
fn parse_error_names_the_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("trellis.toml"), "[project]\nname = \"p\"\n").unwrap();
    std::fs::create_dir_all(dir.path().join("dsl")).unwrap();
    std::fs::write(dir.path().join("dsl/bad.dsl"), "entity Task:\n  title: str(200) requried\n")
        .unwrap();

    match compile_project(&FileSystemProvider, dir.path()).unwrap_err() {
        TrellisError::Parse(err) => {
            assert!(err.location.file.ends_with("bad.dsl"));
            assert_eq!(err.location.line, 2);
            assert!(err.snippet.is_some());
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn missing_manifest_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    match compile_project(&FileSystemProvider, dir.path()).unwrap_err() {
        TrellisError::Io { path, .. } => assert!(path.ends_with("trellis.toml")),
        other => panic!("unexpected error: {}", other),
    }
}

#[cfg(unix)]
#[test]
fn symlinked_directory_loop_compiles_once() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("trellis.toml"), "[project]\nname = \"looped\"\n").unwrap();
    std::fs::create_dir_all(dir.path().join("dsl")).unwrap();
    std::fs::write(dir.path().join("dsl/core.dsl"), "module looped.core\nentity Task:\n  id: uuid pk\n")
        .unwrap();
    std::os::unix::fs::symlink(dir.path().join("dsl"), dir.path().join("dsl/again")).unwrap();

    let spec = compile_project(&FileSystemProvider, dir.path()).unwrap();
    assert_eq!(spec.modules, vec!["looped.core"]);
}
