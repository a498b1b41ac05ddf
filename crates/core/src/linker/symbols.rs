//! The application-wide symbol table: one ordered map per declaration
//! kind plus the module that owns every name.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Diagnostic, LinkCategory, LinkError, Location};
use crate::ir::*;

macro_rules! symbol_table {
    ($($kind:ident => $field:ident : $ty:ty = $label:literal,)*) => {
        /// Every kind of named top-level declaration. Names are unique per kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum SymbolKind {
            $($kind,)*
        }

        impl SymbolKind {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(SymbolKind::$kind => $label,)*
                }
            }
        }

        #[derive(Debug, Clone, Default)]
        pub struct SymbolTable {
            $(pub $field: IndexMap<String, $ty>,)*
            pub llm_config: Option<LlmConfigSpec>,
            pub policies: Option<PoliciesSpec>,
            pub tenancy: Option<TenancySpec>,
            /// Owning module of every named declaration
            sources: IndexMap<(SymbolKind, String), String>,
        }

        impl SymbolTable {
            pub fn contains(&self, kind: SymbolKind, name: &str) -> bool {
                match kind {
                    $(SymbolKind::$kind => self.$field.contains_key(name),)*
                }
            }

            /// Number of named declarations across every kind.
            pub fn len(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            fn insert_fragment(
                &mut self,
                module: &str,
                fragment: &Fragment,
                duplicates: &mut Vec<Diagnostic>,
            ) {
                $(
                    for item in &fragment.$field {
                        if self.claim(SymbolKind::$kind, &item.name, module, &item.loc, duplicates) {
                            self.$field.insert(item.name.clone(), item.clone());
                        }
                    }
                )*
            }

            /// Flatten every map back into one fragment, in insertion order.
            pub fn to_fragment(&self) -> Fragment {
                Fragment {
                    $($field: self.$field.values().cloned().collect(),)*
                    llm_config: self.llm_config.clone(),
                    policies: self.policies.clone(),
                    tenancy: self.tenancy.clone(),
                }
            }
        }
    };
}

symbol_table! {
    Entity => entities: EntitySpec = "entity",
    Archetype => archetypes: ArchetypeSpec = "archetype",
    Enum => enums: EnumSpec = "enum",
    Surface => surfaces: SurfaceSpec = "surface",
    Workspace => workspaces: WorkspaceSpec = "workspace",
    Experience => experiences: ExperienceSpec = "experience",
    Service => services: ServiceSpec = "service",
    ForeignModel => foreign_models: ForeignModelSpec = "foreign_model",
    Integration => integrations: IntegrationSpec = "integration",
    Test => tests: TestSpec = "test",
    Flow => flows: FlowSpec = "flow",
    Persona => personas: PersonaSpec = "persona",
    Scenario => scenarios: ScenarioSpec = "scenario",
    Story => stories: StorySpec = "story",
    LlmModel => llm_models: LlmModelSpec = "llm_model",
    LlmIntent => llm_intents: LlmIntentSpec = "llm_intent",
    Ledger => ledgers: LedgerSpec = "ledger",
    Transaction => transactions: TransactionSpec = "transaction",
    Process => processes: ProcessSpec = "process",
    Schedule => schedules: ScheduleSpec = "schedule",
    Stream => streams: StreamSpec = "stream",
    Api => apis: ApiInterfaceSpec = "api",
    DataProduct => data_products: DataProductSpec = "data_product",
    Approval => approvals: ApprovalSpec = "approval",
    Sla => slas: SlaSpec = "sla",
    Webhook => webhooks: WebhookSpec = "webhook",
    View => views: ViewSpec = "view",
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SymbolTable {
    /// Module that declared `name`.
    pub fn owner(&self, kind: SymbolKind, name: &str) -> Option<&str> {
        self.sources
            .get(&(kind, name.to_owned()))
            .map(String::as_str)
    }

    /// Record `module` as the owner of `name`, or report the clash.
    fn claim(
        &mut self,
        kind: SymbolKind,
        name: &str,
        module: &str,
        loc: &Location,
        duplicates: &mut Vec<Diagnostic>,
    ) -> bool {
        let key = (kind, name.to_owned());
        if let Some(owner) = self.sources.get(&key) {
            let message = if owner == module {
                format!("duplicate {} '{}' in module '{}'", kind, name, module)
            } else {
                format!(
                    "duplicate {} '{}': defined in module '{}' and module '{}'",
                    kind, name, owner, module
                )
            };
            duplicates.push(Diagnostic::new(message).at(loc));
            return false;
        }
        self.sources.insert(key, module.to_owned());
        true
    }
}

/// Application-wide singletons and who declared them.
#[derive(Default)]
struct Singletons {
    llm_config: Option<String>,
    policies: Option<String>,
    tenancy: Option<String>,
}

fn claim_singleton(
    slot: &mut Option<String>,
    what: &str,
    module: &str,
    loc: &Location,
    duplicates: &mut Vec<Diagnostic>,
) -> bool {
    match slot {
        Some(owner) => {
            duplicates.push(
                Diagnostic::new(format!(
                    "{} is declared in module '{}' and again in module '{}'",
                    what, owner, module
                ))
                .at(loc)
                .hint(format!("only one {} may exist per application", what)),
            );
            false
        }
        None => {
            *slot = Some(module.to_owned());
            true
        }
    }
}

/// Insert every declaration of every module, in the given order.
///
/// A name that already exists is never overwritten: every clash is
/// collected and reported together.
pub fn build_symbol_table(modules: &[&ModuleIR]) -> Result<SymbolTable, LinkError> {
    let mut table = SymbolTable::default();
    let mut singletons = Singletons::default();
    let mut duplicates = Vec::new();

    for module in modules {
        let name = module.name.as_str();
        let fragment = &module.fragment;
        table.insert_fragment(name, fragment, &mut duplicates);

        if let Some(config) = &fragment.llm_config {
            if claim_singleton(&mut singletons.llm_config, "llm_config", name, &config.loc, &mut duplicates) {
                table.llm_config = Some(config.clone());
            }
        }
        if let Some(policies) = &fragment.policies {
            if claim_singleton(&mut singletons.policies, "policies", name, &policies.loc, &mut duplicates) {
                table.policies = Some(policies.clone());
            }
        }
        if let Some(tenancy) = &fragment.tenancy {
            if claim_singleton(&mut singletons.tenancy, "tenancy", name, &tenancy.loc, &mut duplicates) {
                table.tenancy = Some(tenancy.clone());
            }
        }
    }

    if !duplicates.is_empty() {
        return Err(LinkError::new(LinkCategory::DuplicateSymbol, duplicates));
    }
    tracing::debug!(symbols = table.len(), "built symbol table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_module;

    fn module(src: &str, file: &str) -> ModuleIR {
        parse_module(src, file).expect("parse")
    }

    #[test]
    fn records_owner_per_kind() {
        let a = module("module a\nentity Task:\n  id: uuid pk\n", "a.dsl");
        let b = module(
            "module b\nsurface Task:\n  uses entity Task\n  mode: list\n",
            "b.dsl",
        );
        let table = build_symbol_table(&[&a, &b]).unwrap();
        assert_eq!(table.owner(SymbolKind::Entity, "Task"), Some("a"));
        assert_eq!(table.owner(SymbolKind::Surface, "Task"), Some("b"));
        assert!(table.contains(SymbolKind::Entity, "Task"));
        assert!(!table.contains(SymbolKind::Workspace, "Task"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicates_across_modules_name_both_owners() {
        let a = module("module a\nentity Order:\n  id: uuid pk\n", "a.dsl");
        let b = module("module b\nentity Order:\n  id: uuid pk\n", "b.dsl");
        let err = build_symbol_table(&[&a, &b]).unwrap_err();
        assert_eq!(err.category, LinkCategory::DuplicateSymbol);
        assert_eq!(err.diagnostics.len(), 1);
        let message = &err.diagnostics[0].message;
        assert!(message.contains("'Order'"));
        assert!(message.contains("module 'a'"));
        assert!(message.contains("module 'b'"));
    }

    #[test]
    fn every_duplicate_is_reported() {
        let a = module(
            "module a\nentity X:\n  id: uuid pk\nentity Y:\n  id: uuid pk\n",
            "a.dsl",
        );
        let b = module(
            "module b\nentity X:\n  id: uuid pk\nentity Y:\n  id: uuid pk\n",
            "b.dsl",
        );
        let err = build_symbol_table(&[&a, &b]).unwrap_err();
        assert_eq!(err.diagnostics.len(), 2);
    }

    #[test]
    fn second_llm_config_is_rejected() {
        let a = module("module a\nllm_config:\n  artifact_store: s3\n", "a.dsl");
        let b = module("module b\nllm_config:\n  artifact_store: gcs\n", "b.dsl");
        let err = build_symbol_table(&[&a, &b]).unwrap_err();
        assert!(err.diagnostics[0].message.contains("llm_config is declared in module 'a'"));
    }

    #[test]
    fn fragment_keeps_insertion_order() {
        let a = module("module a\nentity B:\n  id: uuid pk\nentity A:\n  id: uuid pk\n", "a.dsl");
        let table = build_symbol_table(&[&a]).unwrap();
        let names: Vec<_> = table.to_fragment().entities.into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["B", "A"]);
    }
}
