//! The compilation pipeline: parse every source, link the modules, expand
//! archetypes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::archetype::{expand, generate_archetype_surfaces};
use crate::error::{ParseError, TrellisError, Warning};
use crate::ir::{AppDeclaration, Fragment, ModuleIR};
use crate::linker::link;
use crate::manifest::{Manifest, MANIFEST_FILE};
use crate::parser::parse_module;
use crate::source::SourceProvider;

/// The `[compiler]` section of `trellis.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileOptions {
    /// Parse files concurrently. Ignored without the `parallel` feature.
    pub parallel: bool,
    /// Fail when linking produced any warning
    pub deny_warnings: bool,
    /// Add default surfaces for archetype-tagged entities
    pub archetype_surfaces: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            parallel: true,
            deny_warnings: false,
            archetype_surfaces: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            text: text.into(),
        }
    }

    fn parse(&self) -> Result<ModuleIR, ParseError> {
        parse_module(&self.text, &self.path)
    }
}

/// The final application IR handed to backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppDeclaration>,
    /// Module names in dependency order
    pub modules: Vec<String>,
    pub fragment: Fragment,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl AppSpec {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Parse every file. On failure the error of the first failing file in
/// input order is returned, whether or not parsing ran in parallel.
pub fn parse_sources(sources: &[SourceFile], parallel: bool) -> Result<Vec<ModuleIR>, ParseError> {
    parse_each(sources, parallel).into_iter().collect()
}

fn parse_each(sources: &[SourceFile], parallel: bool) -> Vec<Result<ModuleIR, ParseError>> {
    #[cfg(feature = "parallel")]
    {
        if parallel && sources.len() > 1 {
            use rayon::prelude::*;
            return sources.par_iter().map(SourceFile::parse).collect();
        }
    }
    #[cfg(not(feature = "parallel"))]
    let _ = parallel;
    sources.iter().map(SourceFile::parse).collect()
}

#[tracing::instrument(skip_all, fields(files = sources.len()))]
pub fn compile_sources(
    sources: &[SourceFile],
    options: &CompileOptions,
) -> Result<AppSpec, TrellisError> {
    let modules = parse_sources(sources, options.parallel)?;
    compile_modules(&modules, options)
}

/// Link already parsed modules and expand archetypes.
pub fn compile_modules(
    modules: &[ModuleIR],
    options: &CompileOptions,
) -> Result<AppSpec, TrellisError> {
    let linked = link(modules)?;
    if options.deny_warnings && !linked.warnings.is_empty() {
        return Err(TrellisError::DeniedWarnings {
            count: linked.warnings.len(),
            warnings: linked.warnings,
        });
    }

    let entities = expand(&linked.fragment.entities, &linked.symbols);
    let mut surfaces = linked.fragment.surfaces.clone();
    if options.archetype_surfaces {
        let generated = generate_archetype_surfaces(&entities, &surfaces);
        tracing::debug!(surfaces = generated.len(), "generated archetype surfaces");
        surfaces.extend(generated);
    }
    let fragment = linked
        .fragment
        .with_entities(entities)
        .with_surfaces(surfaces);

    Ok(AppSpec {
        project: None,
        app: linked.app,
        modules: linked.order,
        fragment,
        warnings: linked.warnings,
    })
}

/// Compile the project whose `trellis.toml` lives in `project_dir`.
#[tracing::instrument(skip(provider), fields(dir = %project_dir.display()))]
pub fn compile_project(
    provider: &dyn SourceProvider,
    project_dir: &Path,
) -> Result<AppSpec, TrellisError> {
    let manifest_path = project_dir.join(MANIFEST_FILE);
    let manifest = Manifest::load(provider, &manifest_path)?;

    let sources = read_sources(provider, &manifest.source_roots(project_dir))?;
    tracing::debug!(files = sources.len(), project = %manifest.project.name, "discovered sources");

    let mut modules = parse_sources(&sources, manifest.compiler.parallel)?;
    if let Some(root) = &manifest.project.root {
        modules = reachable_from(modules, root).ok_or_else(|| TrellisError::Manifest {
            path: manifest_path.display().to_string(),
            message: format!("root module '{}' is not defined by any source file", root),
        })?;
    }

    let mut spec = compile_modules(&modules, &manifest.compiler)?;
    spec.project = Some(manifest.project.name);
    Ok(spec)
}

fn read_sources(
    provider: &dyn SourceProvider,
    roots: &[PathBuf],
) -> Result<Vec<SourceFile>, TrellisError> {
    let io_error = |path: &Path| {
        let path = path.display().to_string();
        move |source: std::io::Error| TrellisError::Io { path, source }
    };

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut sources = Vec::new();
    for root in roots {
        for path in provider.discover(root).map_err(io_error(root))? {
            if !seen.insert(path.clone()) {
                continue;
            }
            let text = provider.read_source(&path).map_err(io_error(&path))?;
            sources.push(SourceFile::new(path.display().to_string(), text));
        }
    }
    Ok(sources)
}

/// The modules `root` reaches through `use`, in their original order.
/// `None` if no module is named `root`. Missing imports are left for the
/// linker to report.
fn reachable_from(modules: Vec<ModuleIR>, root: &str) -> Option<Vec<ModuleIR>> {
    let by_name: HashMap<&str, &ModuleIR> = modules.iter().map(|m| (m.name.as_str(), m)).collect();
    by_name.get(root)?;

    let mut keep: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::from([root]);
    while let Some(name) = queue.pop_front() {
        if !keep.insert(name.to_string()) {
            continue;
        }
        if let Some(module) = by_name.get(name) {
            queue.extend(module.uses.iter().map(String::as_str));
        }
    }

    let dropped = modules.len() - modules.iter().filter(|m| keep.contains(&m.name)).count();
    if dropped > 0 {
        tracing::debug!(root, dropped, "skipped modules unreachable from root");
    }
    Some(modules.into_iter().filter(|m| keep.contains(&m.name)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryProvider;

    fn sources(files: &[(&str, &str)]) -> Vec<SourceFile> {
        files.iter().map(|(p, t)| SourceFile::new(*p, *t)).collect()
    }

    #[test]
    fn first_parse_error_in_input_order() {
        let files = sources(&[
            ("ok.dsl", "entity A:\n  id: uuid pk\n"),
            ("bad1.dsl", "entity B\n"),
            ("bad2.dsl", "entity C\n"),
        ]);
        for parallel in [false, true] {
            let err = parse_sources(&files, parallel).unwrap_err();
            assert_eq!(err.location.file, "bad1.dsl");
        }
    }

    #[test]
    fn archetype_surfaces_follow_the_option() {
        let files = sources(&[(
            "app.dsl",
            "entity SiteSettings:\n  archetype: settings\n  id: uuid pk\n  motd: text\n",
        )]);
        let with = compile_sources(&files, &CompileOptions::default()).unwrap();
        assert_eq!(with.fragment.surfaces.len(), 1);
        assert!(with.fragment.entities[0].is_singleton);

        let options = CompileOptions {
            archetype_surfaces: false,
            ..CompileOptions::default()
        };
        let without = compile_sources(&files, &options).unwrap();
        assert!(without.fragment.surfaces.is_empty());
    }

    #[test]
    fn denied_warnings() {
        let files = sources(&[
            ("a.dsl", "module a\nentity A:\n  id: uuid pk\n"),
            ("b.dsl", "module b\nuse a\nentity B:\n  id: uuid pk\n"),
        ]);
        let spec = compile_sources(&files, &CompileOptions::default()).unwrap();
        assert_eq!(spec.warnings.len(), 1);

        let strict = CompileOptions {
            deny_warnings: true,
            ..CompileOptions::default()
        };
        match compile_sources(&files, &strict).unwrap_err() {
            TrellisError::DeniedWarnings { count, .. } => assert_eq!(count, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn project_root_prunes_unreachable_modules() {
        let provider = InMemoryProvider::new()
            .with_file(
                "shop/trellis.toml",
                "[project]\nname = \"shop\"\nroot = \"shop.app\"\n",
            )
            .with_file(
                "shop/dsl/app.dsl",
                "module shop.app\nuse shop.core\napp shop \"Shop\"\nentity Order:\n  id: uuid pk\n  customer: ref Customer\n",
            )
            .with_file("shop/dsl/core.dsl", "module shop.core\nentity Customer:\n  id: uuid pk\n")
            .with_file("shop/dsl/scratch.dsl", "module scratch\nentity Draft:\n  id: uuid pk\n");

        let spec = compile_project(&provider, Path::new("shop")).unwrap();
        assert_eq!(spec.project.as_deref(), Some("shop"));
        assert_eq!(spec.modules, vec!["shop.core", "shop.app"]);
        assert!(spec.fragment.get_entity("Draft").is_none());
        assert_eq!(spec.app.map(|a| a.name).as_deref(), Some("shop"));
    }

    #[test]
    fn unknown_root_module() {
        let provider = InMemoryProvider::new()
            .with_file("p/trellis.toml", "[project]\nname = \"p\"\nroot = \"missing\"\n")
            .with_file("p/dsl/a.dsl", "module a\n");
        match compile_project(&provider, Path::new("p")).unwrap_err() {
            TrellisError::Manifest { message, .. } => assert!(message.contains("missing")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn app_spec_serializes() {
        let files = sources(&[("a.dsl", "app demo\nentity A:\n  id: uuid pk\n")]);
        let spec = compile_sources(&files, &CompileOptions::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();
        assert_eq!(json["app"]["name"], "demo");
        assert_eq!(json["modules"][0], "a");
        assert_eq!(json["fragment"]["entities"][0]["name"], "A");
    }
}
