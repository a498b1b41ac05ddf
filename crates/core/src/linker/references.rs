//! Cross-declaration references: one collector shared by visibility
//! checking, unused-import detection and reference validation.

use std::collections::HashSet;

use super::symbols::{SymbolKind, SymbolTable};
use crate::error::{Diagnostic, Location, ValidationError};
use crate::ir::*;

const ENTITY: &[SymbolKind] = &[SymbolKind::Entity];
const ENUM: &[SymbolKind] = &[SymbolKind::Enum];
const ARCHETYPE: &[SymbolKind] = &[SymbolKind::Archetype];
const SURFACE: &[SymbolKind] = &[SymbolKind::Surface];
const EXPERIENCE: &[SymbolKind] = &[SymbolKind::Experience];
const WORKSPACE: &[SymbolKind] = &[SymbolKind::Workspace];
const SERVICE: &[SymbolKind] = &[SymbolKind::Service];
const FOREIGN_MODEL: &[SymbolKind] = &[SymbolKind::ForeignModel];
const INTEGRATION: &[SymbolKind] = &[SymbolKind::Integration];
const PERSONA: &[SymbolKind] = &[SymbolKind::Persona];
const STORY: &[SymbolKind] = &[SymbolKind::Story];
const LLM_MODEL: &[SymbolKind] = &[SymbolKind::LlmModel];
const LEDGER: &[SymbolKind] = &[SymbolKind::Ledger];
const PROCESS: &[SymbolKind] = &[SymbolKind::Process];
const STREAM: &[SymbolKind] = &[SymbolKind::Stream];
/// Workspace regions and views may read from an entity or a view.
const DATA_SOURCE: &[SymbolKind] = &[SymbolKind::Entity, SymbolKind::View];

/// One use of a named declaration by another declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    /// Kinds the name may resolve to; the first is used in messages
    pub kinds: &'static [SymbolKind],
    pub name: &'a str,
    pub loc: &'a Location,
    /// Who refers, e.g. `entity 'Invoice' field 'client'`
    pub context: String,
}

impl Reference<'_> {
    pub fn kind(&self) -> SymbolKind {
        self.kinds[0]
    }

    /// First kind under which the name is declared.
    pub fn resolve(&self, symbols: &SymbolTable) -> Option<SymbolKind> {
        self.kinds
            .iter()
            .copied()
            .find(|k| symbols.contains(*k, self.name))
    }
}

#[derive(Default)]
struct Collector<'a> {
    refs: Vec<Reference<'a>>,
}

impl<'a> Collector<'a> {
    fn add(&mut self, kinds: &'static [SymbolKind], name: &'a str, loc: &'a Location, context: String) {
        self.refs.push(Reference {
            kinds,
            name,
            loc,
            context,
        });
    }

    fn field_types(&mut self, fields: &'a [FieldSpec], loc: &'a Location, owner: &str) {
        for field in fields {
            match &field.field_type {
                FieldType::Relation(rel) => self.add(
                    ENTITY,
                    &rel.target,
                    loc,
                    format!("{} field '{}'", owner, field.name),
                ),
                FieldType::EnumRef { name } => {
                    self.add(ENUM, name, loc, format!("{} field '{}'", owner, field.name))
                }
                _ => {}
            }
        }
    }

    fn process_steps(&mut self, steps: &'a [ProcessStep], loc: &'a Location, owner: &str) {
        for step in steps.iter().flat_map(ProcessStep::flatten) {
            let context = format!("{} step '{}'", owner, step.name);
            match &step.kind {
                ProcessStepKind::Service { service } => self.add(SERVICE, service, loc, context),
                ProcessStepKind::HumanTask(task) => self.add(SURFACE, &task.surface, loc, context),
                ProcessStepKind::Subprocess { process } => self.add(PROCESS, process, loc, context),
                ProcessStepKind::WaitFor { .. } | ProcessStepKind::Parallel { .. } => {}
            }
        }
    }
}

/// Every named reference made by the declarations in `fragment`.
pub fn collect_references(fragment: &Fragment) -> Vec<Reference<'_>> {
    let mut c = Collector::default();

    for entity in &fragment.entities {
        let owner = format!("entity '{}'", entity.name);
        c.field_types(&entity.fields, &entity.loc, &owner);
        for archetype in &entity.extends {
            c.add(ARCHETYPE, archetype, &entity.loc, format!("{} extends", owner));
        }
    }
    for archetype in &fragment.archetypes {
        let owner = format!("archetype '{}'", archetype.name);
        c.field_types(&archetype.fields, &archetype.loc, &owner);
    }

    for surface in &fragment.surfaces {
        let owner = format!("surface '{}'", surface.name);
        if let Some(entity) = &surface.entity_ref {
            c.add(ENTITY, entity, &surface.loc, owner.clone());
        }
        for action in &surface.actions {
            let Some(outcome) = &action.outcome else {
                continue;
            };
            let kinds = match outcome.kind {
                OutcomeKind::Surface => SURFACE,
                OutcomeKind::Experience => EXPERIENCE,
                OutcomeKind::Integration => INTEGRATION,
            };
            c.add(
                kinds,
                &outcome.target,
                &surface.loc,
                format!("{} action '{}'", owner, action.name),
            );
        }
    }

    for workspace in &fragment.workspaces {
        for region in &workspace.regions {
            let context = format!("workspace '{}' region '{}'", workspace.name, region.name);
            if let Some(source) = &region.source {
                c.add(DATA_SOURCE, source, &workspace.loc, context.clone());
            }
            if let Some(action) = &region.action {
                c.add(SURFACE, action, &workspace.loc, context);
            }
        }
    }

    for experience in &fragment.experiences {
        for step in &experience.steps {
            let context = format!("experience '{}' step '{}'", experience.name, step.name);
            if let Some(surface) = &step.surface {
                c.add(SURFACE, surface, &experience.loc, context.clone());
            }
            if let Some(process) = &step.process {
                c.add(PROCESS, process, &experience.loc, context.clone());
            }
            if let Some(integration) = &step.integration {
                c.add(INTEGRATION, integration, &experience.loc, context);
            }
        }
    }

    for service in &fragment.services {
        if let ServiceBody::Domain { inputs, outputs, .. } = &service.body {
            let owner = format!("service '{}'", service.name);
            c.field_types(inputs, &service.loc, &owner);
            c.field_types(outputs, &service.loc, &owner);
        }
    }

    for model in &fragment.foreign_models {
        c.add(
            SERVICE,
            &model.service,
            &model.loc,
            format!("foreign_model '{}'", model.name),
        );
    }

    for integration in &fragment.integrations {
        let owner = format!("integration '{}'", integration.name);
        let loc = &integration.loc;
        for service in &integration.services {
            c.add(SERVICE, service, loc, owner.clone());
        }
        for model in &integration.foreign_models {
            c.add(FOREIGN_MODEL, model, loc, owner.clone());
        }
        for action in &integration.actions {
            let context = format!("{} action '{}'", owner, action.name);
            if let Some(surface) = &action.when_surface {
                c.add(SURFACE, surface, loc, context.clone());
            }
            c.add(SERVICE, &action.call_service, loc, context.clone());
            if let Some(response) = &action.response {
                c.add(FOREIGN_MODEL, &response.foreign_model, loc, context.clone());
                c.add(ENTITY, &response.entity, loc, context);
            }
        }
        for sync in &integration.syncs {
            let context = format!("{} sync '{}'", owner, sync.name);
            c.add(SERVICE, &sync.from_service, loc, context.clone());
            if let Some(model) = &sync.from_foreign_model {
                c.add(FOREIGN_MODEL, model, loc, context.clone());
            }
            c.add(ENTITY, &sync.into_entity, loc, context);
        }
    }

    for test in &fragment.tests {
        let owner = format!("test '{}'", test.name);
        for step in &test.setup {
            c.add(
                ENTITY,
                &step.entity,
                &test.loc,
                format!("{} setup '{}'", owner, step.binding),
            );
        }
        c.add(ENTITY, &test.action.entity, &test.loc, format!("{} action", owner));
    }

    for persona in &fragment.personas {
        if let Some(workspace) = &persona.default_workspace {
            c.add(
                WORKSPACE,
                workspace,
                &persona.loc,
                format!("persona '{}' default_workspace", persona.name),
            );
        }
    }

    for scenario in &fragment.scenarios {
        for entry in &scenario.persona_entries {
            c.add(
                PERSONA,
                &entry.persona,
                &scenario.loc,
                format!("scenario '{}'", scenario.name),
            );
        }
    }

    for story in &fragment.stories {
        let owner = format!("story '{}'", story.name);
        c.add(PERSONA, &story.actor, &story.loc, format!("{} actor", owner));
        for entity in &story.scope {
            c.add(ENTITY, entity, &story.loc, format!("{} scope", owner));
        }
    }

    for intent in &fragment.llm_intents {
        let owner = format!("llm_intent '{}'", intent.name);
        if let Some(model) = &intent.model {
            c.add(LLM_MODEL, model, &intent.loc, owner.clone());
        }
        if let Some(schema) = &intent.output_schema {
            c.add(ENTITY, schema, &intent.loc, format!("{} output_schema", owner));
        }
    }
    if let Some(config) = &fragment.llm_config {
        if let Some(model) = &config.default_model {
            c.add(LLM_MODEL, model, &config.loc, "llm_config default_model".into());
        }
        for limit in &config.rate_limits {
            c.add(LLM_MODEL, &limit.model, &config.loc, "llm_config rate_limits".into());
        }
    }

    for ledger in &fragment.ledgers {
        if let Some(target) = &ledger.sync_to {
            c.add(
                ENTITY,
                &target.entity,
                &ledger.loc,
                format!("ledger '{}' sync_to", ledger.name),
            );
        }
    }
    for transaction in &fragment.transactions {
        for transfer in &transaction.transfers {
            let context = format!("transaction '{}' transfer '{}'", transaction.name, transfer.name);
            c.add(LEDGER, &transfer.debit_ledger, &transaction.loc, context.clone());
            c.add(LEDGER, &transfer.credit_ledger, &transaction.loc, context);
        }
    }

    for process in &fragment.processes {
        let owner = format!("process '{}'", process.name);
        for story in &process.implements {
            c.add(STORY, story, &process.loc, format!("{} implements", owner));
        }
        if let ProcessTrigger::Entity { entity, .. } = &process.trigger {
            c.add(ENTITY, entity, &process.loc, format!("{} trigger", owner));
        }
        c.field_types(&process.inputs, &process.loc, &owner);
        c.field_types(&process.outputs, &process.loc, &owner);
        c.process_steps(&process.steps, &process.loc, &owner);
        for compensation in &process.compensations {
            c.add(
                SERVICE,
                &compensation.service,
                &process.loc,
                format!("{} compensation '{}'", owner, compensation.name),
            );
        }
    }
    for schedule in &fragment.schedules {
        let owner = format!("schedule '{}'", schedule.name);
        c.process_steps(&schedule.steps, &schedule.loc, &owner);
    }

    for stream in &fragment.streams {
        for source in &stream.derives_from {
            c.add(
                STREAM,
                source,
                &stream.loc,
                format!("stream '{}' derives_from", stream.name),
            );
        }
    }

    if let Some(policies) = &fragment.policies {
        for classification in &policies.classifications {
            c.add(ENTITY, &classification.entity, &policies.loc, "policies classify".into());
        }
        for erasure in &policies.erasures {
            c.add(ENTITY, &erasure.entity, &policies.loc, "policies erasure".into());
        }
    }
    for api in &fragment.apis {
        for exposure in &api.exposes {
            c.add(ENTITY, &exposure.entity, &api.loc, format!("api '{}' expose", api.name));
        }
    }
    for product in &fragment.data_products {
        for source in &product.sources {
            c.add(
                DATA_SOURCE,
                source,
                &product.loc,
                format!("data_product '{}' source", product.name),
            );
        }
    }

    for approval in &fragment.approvals {
        c.add(ENTITY, &approval.entity, &approval.loc, format!("approval '{}'", approval.name));
    }
    for sla in &fragment.slas {
        c.add(ENTITY, &sla.entity, &sla.loc, format!("sla '{}'", sla.name));
    }
    for webhook in &fragment.webhooks {
        c.add(ENTITY, &webhook.entity, &webhook.loc, format!("webhook '{}'", webhook.name));
    }
    for view in &fragment.views {
        c.add(DATA_SOURCE, &view.source, &view.loc, format!("view '{}' source", view.name));
    }

    c.refs
}

// ──────────────────────────────────────────────
// Validation
// ──────────────────────────────────────────────

/// Field names an entity exposes before archetype expansion: its own
/// fields and computed fields plus those of every archetype it extends.
fn known_fields<'a>(entity: &'a EntitySpec, symbols: &'a SymbolTable) -> HashSet<&'a str> {
    let mut names: HashSet<&str> = entity
        .fields
        .iter()
        .map(|f| f.name.as_str())
        .chain(entity.computed_fields.iter().map(|f| f.name.as_str()))
        .collect();
    for archetype in entity.extends.iter().filter_map(|a| symbols.archetypes.get(a)) {
        names.extend(archetype.fields.iter().map(|f| f.name.as_str()));
        names.extend(archetype.computed_fields.iter().map(|f| f.name.as_str()));
    }
    names
}

struct Checker<'a> {
    symbols: &'a SymbolTable,
    diagnostics: Vec<Diagnostic>,
}

impl Checker<'_> {
    fn report(&mut self, loc: &Location, message: String) {
        self.diagnostics.push(Diagnostic::new(message).at(loc));
    }

    /// Each name in `fields` must exist on `entity`, when that entity resolves.
    fn fields_exist<'f>(
        &mut self,
        entity: &str,
        fields: impl IntoIterator<Item = &'f str>,
        loc: &Location,
        context: &str,
    ) {
        let symbols = self.symbols;
        let Some(spec) = symbols.entities.get(entity) else {
            return;
        };
        let known = known_fields(spec, symbols);
        let unknown: Vec<String> = fields
            .into_iter()
            .filter(|f| !known.contains(f))
            .map(|f| format!("{} references unknown field '{}' of entity '{}'", context, f, entity))
            .collect();
        for message in unknown {
            self.report(loc, message);
        }
    }

    fn entities(&mut self, fragment: &Fragment) {
        for entity in &fragment.entities {
            let owner = format!("entity '{}'", entity.name);
            for constraint in &entity.constraints {
                self.fields_exist(
                    &entity.name,
                    constraint.fields.iter().map(String::as_str),
                    &entity.loc,
                    &format!("{} constraint", owner),
                );
            }
            if let Some(display) = &entity.display_field {
                self.fields_exist(
                    &entity.name,
                    [display.as_str()],
                    &entity.loc,
                    &format!("{} display_field", owner),
                );
            }
        }
    }

    fn surfaces(&mut self, fragment: &Fragment) {
        for surface in &fragment.surfaces {
            let owner = format!("surface '{}'", surface.name);
            if let Some(entity) = &surface.entity_ref {
                self.fields_exist(entity, surface.field_names(), &surface.loc, &owner);
                if let Some(ux) = &surface.ux {
                    let ux_fields = ux
                        .sort
                        .iter()
                        .map(|s| s.field.as_str())
                        .chain(ux.filter.iter().map(String::as_str))
                        .chain(ux.search.iter().map(String::as_str));
                    self.fields_exist(entity, ux_fields, &surface.loc, &format!("{} ux", owner));
                }
            }
            for action in &surface.actions {
                let Some(Outcome {
                    kind: OutcomeKind::Integration,
                    target,
                    action: Some(integration_action),
                }) = &action.outcome
                else {
                    continue;
                };
                let symbols = self.symbols;
                let Some(integration) = symbols.integrations.get(target) else {
                    continue;
                };
                if integration.get_action(integration_action).is_none() {
                    self.report(
                        &surface.loc,
                        format!(
                            "{} action '{}' references unknown action '{}' of integration '{}'",
                            owner, action.name, integration_action, target
                        ),
                    );
                }
            }
        }
    }

    fn experiences(&mut self, fragment: &Fragment) {
        for experience in &fragment.experiences {
            let owner = format!("experience '{}'", experience.name);
            if experience.get_step(&experience.start_step).is_none() {
                self.report(
                    &experience.loc,
                    format!("{} starts at unknown step '{}'", owner, experience.start_step),
                );
            }
            for step in &experience.steps {
                for transition in &step.transitions {
                    if experience.get_step(&transition.next_step).is_none() {
                        self.report(
                            &experience.loc,
                            format!(
                                "{} step '{}' transitions on '{}' to unknown step '{}'",
                                owner, step.name, transition.event, transition.next_step
                            ),
                        );
                    }
                }
            }
        }
    }

    fn governance(&mut self, fragment: &Fragment) {
        if let Some(policies) = &fragment.policies {
            for c in &policies.classifications {
                self.fields_exist(&c.entity, [c.field.as_str()], &policies.loc, "policies classify");
            }
        }
        for ledger in &fragment.ledgers {
            if let Some(target) = &ledger.sync_to {
                self.fields_exist(
                    &target.entity,
                    [target.field.as_str()],
                    &ledger.loc,
                    &format!("ledger '{}' sync_to", ledger.name),
                );
            }
        }
    }

    /// An intent without a model falls back to the configured default,
    /// and failing that to any declared model.
    fn llm(&mut self, fragment: &Fragment) {
        let has_default = fragment
            .llm_config
            .as_ref()
            .is_some_and(|c| c.default_model.is_some());
        if has_default || !fragment.llm_models.is_empty() {
            return;
        }
        for intent in fragment.llm_intents.iter().filter(|i| i.model.is_none()) {
            self.report(
                &intent.loc,
                format!(
                    "llm_intent '{}' has no model, no default_model is configured and no llm_model is declared",
                    intent.name
                ),
            );
        }
    }
}

/// Check that every reference in the merged application resolves.
///
/// All findings are collected before reporting.
pub fn validate_references(fragment: &Fragment, symbols: &SymbolTable) -> Result<(), ValidationError> {
    let mut checker = Checker {
        symbols,
        diagnostics: Vec::new(),
    };

    for reference in collect_references(fragment) {
        if reference.resolve(symbols).is_none() {
            checker.report(
                reference.loc,
                format!(
                    "{} references unknown {} '{}'",
                    reference.context,
                    reference.kind(),
                    reference.name
                ),
            );
        }
    }
    checker.entities(fragment);
    checker.surfaces(fragment);
    checker.experiences(fragment);
    checker.governance(fragment);
    checker.llm(fragment);

    if checker.diagnostics.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            diagnostics: checker.diagnostics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linker::symbols::build_symbol_table;
    use crate::parser::parse_module;

    fn check(src: &str) -> Result<(), ValidationError> {
        let module = parse_module(src, "app.dsl").expect("parse");
        let symbols = build_symbol_table(&[&module]).expect("symbols");
        validate_references(&symbols.to_fragment(), &symbols)
    }

    #[test]
    fn unknown_ref_target_names_entity_field_and_target() {
        let err = check("entity Invoice:\n  id: uuid pk\n  client: ref Client\n").unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["entity 'Invoice' field 'client' references unknown entity 'Client'"]
        );
    }

    #[test]
    fn collector_sees_surface_outcomes() {
        let module = parse_module(
            r#"surface task_list:
  uses entity Task
  mode: list
  action open "Open":
    on click -> surface task_detail
"#,
            "app.dsl",
        )
        .unwrap();
        let refs = collect_references(&module.fragment);
        let names: Vec<_> = refs.iter().map(|r| (r.kind(), r.name)).collect();
        assert_eq!(
            names,
            vec![(SymbolKind::Entity, "Task"), (SymbolKind::Surface, "task_detail")]
        );
    }

    #[test]
    fn surface_fields_include_archetype_fields() {
        check(
            r#"archetype Timestamped:
  created_at: datetime auto_add

entity Task:
  id: uuid pk
  title: str(200)
  extends: Timestamped

surface task_list:
  uses entity Task
  mode: list
  section main:
    field title "Title"
    field created_at "Created"
"#,
        )
        .unwrap();
    }

    #[test]
    fn unknown_surface_field() {
        let err = check(
            "entity Task:\n  id: uuid pk\n\nsurface s:\n  uses entity Task\n  section main:\n    field nope\n",
        )
        .unwrap_err();
        assert!(err.messages()[0].contains("unknown field 'nope' of entity 'Task'"));
    }

    #[test]
    fn experience_transitions_must_target_steps() {
        let err = check(
            r#"surface a:
  mode: custom

experience onboarding:
  start at step first
  step first:
    surface a
    on done -> step missing
"#,
        )
        .unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        assert!(err.messages()[0].contains("unknown step 'missing'"));
    }

    #[test]
    fn intent_without_any_model() {
        let err = check("llm_intent summarize:\n  prompt: \"p\"\n").unwrap_err();
        assert!(err.messages()[0].contains("no llm_model is declared"));
    }

    #[test]
    fn intent_falls_back_to_declared_model() {
        check(
            "llm_model m:\n  provider: openai\n  model_id: \"gpt\"\n\nllm_intent i:\n  prompt: \"p\"\n",
        )
        .unwrap();
    }

    #[test]
    fn region_source_may_be_a_view() {
        check(
            r#"entity Task:
  id: uuid pk
  owner: str(50)

view by_owner:
  source: Task
  fields:
    owner

workspace home:
  mine:
    source: by_owner
"#,
        )
        .unwrap();
    }

    #[test]
    fn every_broken_reference_is_reported() {
        let err = check(
            "approval a:\n  entity: Ghost\n  approver_role: r\n\nwebhook w:\n  entity: Phantom\n  events: created\n  url: \"u\"\n",
        )
        .unwrap_err();
        assert_eq!(err.diagnostics.len(), 2);
    }
}
