//! The intermediate representation: pure value types built by the parser
//! and consumed by the linker, the archetype expander and downstream
//! generators.
//!
//! IR values are never mutated once built. Every "update" goes through a
//! consuming builder (`Fragment::with_entity`, `EntitySpec::with_fields`,
//! ...) that hands back a new value.

pub mod entity;
pub mod experience;
pub mod expressions;
pub mod fields;
pub mod governance;
pub mod ledger;
pub mod llm;
pub mod process;
pub mod services;
pub mod stream;
pub mod surface;
pub mod testing;
pub mod workflow;
pub mod workspace;

pub use entity::*;
pub use experience::*;
pub use expressions::*;
pub use fields::*;
pub use governance::*;
pub use ledger::*;
pub use llm::*;
pub use process::*;
pub use services::*;
pub use stream::*;
pub use surface::*;
pub use testing::*;
pub use workflow::*;
pub use workspace::*;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::Location;

// ──────────────────────────────────────────────
// App declaration
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityProfile {
    Basic,
    Standard,
    Strict,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub multi_tenant: bool,
    #[serde(default)]
    pub audit_trail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_profile: Option<SecurityProfile>,
    /// Unrecognized `key: value` lines, kept verbatim for generators
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub extensions: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDeclaration {
    pub loc: Location,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub config: AppConfig,
}

// ──────────────────────────────────────────────
// Fragment
// ──────────────────────────────────────────────

macro_rules! fragment {
    (
        lists { $($list:ident : $ty:ty => $with:ident,)* }
        singletons { $($single:ident : $sty:ty => $swith:ident,)* }
    ) => {
        /// Every top-level declaration parsed from one source file, or,
        /// after linking, from the whole application.
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct Fragment {
            $(
                #[serde(default, skip_serializing_if = "Vec::is_empty")]
                pub $list: Vec<$ty>,
            )*
            $(
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $single: Option<$sty>,
            )*
        }

        impl Fragment {
            $(
                pub fn $with(self, item: $ty) -> Self {
                    let mut $list = self.$list;
                    $list.push(item);
                    Fragment { $list, ..self }
                }
            )*
            $(
                pub fn $swith(self, item: $sty) -> Self {
                    Fragment { $single: Some(item), ..self }
                }
            )*

            /// Number of top-level declarations.
            pub fn len(&self) -> usize {
                0 $(+ self.$list.len())* $(+ usize::from(self.$single.is_some()))*
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }
    };
}

fragment! {
    lists {
        entities: EntitySpec => with_entity,
        archetypes: ArchetypeSpec => with_archetype,
        enums: EnumSpec => with_enum,
        surfaces: SurfaceSpec => with_surface,
        workspaces: WorkspaceSpec => with_workspace,
        experiences: ExperienceSpec => with_experience,
        services: ServiceSpec => with_service,
        foreign_models: ForeignModelSpec => with_foreign_model,
        integrations: IntegrationSpec => with_integration,
        tests: TestSpec => with_test,
        flows: FlowSpec => with_flow,
        personas: PersonaSpec => with_persona,
        scenarios: ScenarioSpec => with_scenario,
        stories: StorySpec => with_story,
        llm_models: LlmModelSpec => with_llm_model,
        llm_intents: LlmIntentSpec => with_llm_intent,
        ledgers: LedgerSpec => with_ledger,
        transactions: TransactionSpec => with_transaction,
        processes: ProcessSpec => with_process,
        schedules: ScheduleSpec => with_schedule,
        streams: StreamSpec => with_stream,
        apis: ApiInterfaceSpec => with_api,
        data_products: DataProductSpec => with_data_product,
        approvals: ApprovalSpec => with_approval,
        slas: SlaSpec => with_sla,
        webhooks: WebhookSpec => with_webhook,
        views: ViewSpec => with_view,
    }
    singletons {
        llm_config: LlmConfigSpec => with_llm_config,
        policies: PoliciesSpec => with_policies,
        tenancy: TenancySpec => with_tenancy,
    }
}

impl Fragment {
    pub fn get_entity(&self, name: &str) -> Option<&EntitySpec> {
        self.entities.iter().find(|e| e.name == name)
    }

    pub fn get_surface(&self, name: &str) -> Option<&SurfaceSpec> {
        self.surfaces.iter().find(|s| s.name == name)
    }

    pub fn with_entities(self, entities: Vec<EntitySpec>) -> Self {
        Fragment { entities, ..self }
    }

    pub fn with_surfaces(self, surfaces: Vec<SurfaceSpec>) -> Self {
        Fragment { surfaces, ..self }
    }
}

// ──────────────────────────────────────────────
// Modules
// ──────────────────────────────────────────────

/// One parsed source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleIR {
    pub name: String,
    pub source_file: String,
    /// Explicit imports: the only basis for cross-module references
    pub uses: Vec<String>,
    /// `use a.b as x`: alias to module name. Linking resolves references by
    /// plain name and never reads this map; it is carried for backends.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub aliases: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppDeclaration>,
    pub fragment: Fragment,
}

impl ModuleIR {
    pub fn uses_module(&self, module: &str) -> bool {
        self.name == module || self.uses.iter().any(|u| u == module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_builders_do_not_touch_the_original() {
        let base = Fragment::default();
        let one = base
            .clone()
            .with_entity(EntitySpec::new("Task", Location::new("a.dsl", 1, 1)));
        let two = one
            .clone()
            .with_entity(EntitySpec::new("User", Location::new("a.dsl", 5, 1)));
        assert!(base.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(two.len(), 2);
        assert_eq!(two.entities[1].name, "User");
    }

    #[test]
    fn singletons_count_towards_len() {
        let frag = Fragment::default().with_tenancy(TenancySpec {
            loc: Location::new("a.dsl", 1, 1),
            mode: TenancyMode::SharedSchema,
            isolation: IsolationLevel::Strict,
            provisioning: Provisioning::Auto,
        });
        assert_eq!(frag.len(), 1);
    }
}
