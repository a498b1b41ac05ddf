//! `entity`, `archetype` and `enum` declarations.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    select_status_field, transition_states, AccessOperation, AccessRule, AccessSpec,
    ArchetypeKind, ArchetypeSpec, AutoTransition, ComputedFieldSpec, ConstraintKind,
    ConstraintSpec, EntitySpec, EnumSpec, EnumValue, FieldSpec, FieldType, InvariantSpec,
    PolicyEffect, StateMachineSpec, StateTransition, TransitionGuard, TransitionTrigger,
    WILDCARD_STATE,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const ARCHETYPE_KINDS: &[(&str, ArchetypeKind)] = &[
    ("settings", ArchetypeKind::Settings),
    ("tenant", ArchetypeKind::Tenant),
    ("tenant_settings", ArchetypeKind::TenantSettings),
    ("user", ArchetypeKind::User),
    ("user_membership", ArchetypeKind::UserMembership),
];

/// Members shared by entities and archetypes.
#[derive(Default)]
struct Members {
    fields: Vec<FieldSpec>,
    computed_fields: Vec<ComputedFieldSpec>,
    invariants: Vec<InvariantSpec>,
}

impl Members {
    fn declares(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name == name)
            || self.computed_fields.iter().any(|c| c.name == name)
    }
}

impl Parser {
    pub(crate) fn parse_entity(&mut self) -> Result<EntitySpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Entity)?;
        let (name, title) = self.declaration_header()?;
        let mut entity = EntitySpec::new(name, loc);
        entity.title = title;

        let mut members = Members::default();
        let mut transitions: Vec<StateTransition> = Vec::new();

        self.block(|p| {
            if p.parse_member(&mut members)? {
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Intent) if p.peek_is(1, TokenKind::Colon) => {
                    p.advance();
                    entity.intent = Some(p.colon_string()?);
                }
                Some(Keyword::Domain) if p.peek_is(1, TokenKind::Colon) => {
                    p.advance();
                    entity.domain = Some(p.colon_string()?);
                }
                Some(Keyword::Patterns) => {
                    p.advance();
                    entity.patterns = p.colon_identifier_list()?;
                }
                Some(Keyword::Archetype) => {
                    p.advance();
                    entity.archetype_kind = Some(p.colon_choice("archetype kind", ARCHETYPE_KINDS)?);
                }
                Some(Keyword::Extends) => {
                    p.advance();
                    p.eat(TokenKind::Colon);
                    let names = p.identifier_list()?;
                    p.end_statement()?;
                    entity.extends.extend(names);
                }
                Some(Keyword::DisplayField) => {
                    p.advance();
                    entity.display_field = Some(p.colon_identifier()?);
                }
                Some(Keyword::SoftDelete) => {
                    p.advance();
                    entity.soft_delete = if p.at(TokenKind::Colon) {
                        p.colon_bool()?
                    } else {
                        p.end_statement()?;
                        true
                    };
                }
                Some(kind @ (Keyword::Unique | Keyword::Index)) => {
                    p.advance();
                    let fields = p.identifier_list()?;
                    p.end_statement()?;
                    entity.constraints.push(ConstraintSpec {
                        kind: if kind == Keyword::Unique {
                            ConstraintKind::Unique
                        } else {
                            ConstraintKind::Index
                        },
                        fields,
                    });
                }
                Some(Keyword::Transitions) => {
                    p.advance();
                    transitions.extend(p.parse_transitions()?);
                }
                Some(Keyword::Access) => {
                    p.advance();
                    let access = p.parse_access()?;
                    let merged = match entity.access.take() {
                        Some(mut existing) => {
                            existing.rules.extend(access.rules);
                            existing
                        }
                        None => access,
                    };
                    entity.access = Some(merged);
                }
                _ if p.current().is_word() && p.peek_is(1, TokenKind::Colon) => {
                    // word ":" <not a type>: report the bad type
                    let field = p.parse_field()?;
                    members.fields.push(field);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        entity.fields = members.fields;
        entity.computed_fields = members.computed_fields;
        entity.invariants = members.invariants;

        if !transitions.is_empty() {
            entity.state_machine = build_state_machine(&entity, transitions);
            if entity.state_machine.is_none() {
                tracing::debug!(
                    entity = %entity.name,
                    "transitions declared but no enum field covers their states; no state machine attached"
                );
            }
        }
        Ok(entity)
    }

    pub(crate) fn parse_archetype(&mut self) -> Result<ArchetypeSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Archetype)?;
        let name = self.expect_identifier()?;
        let mut members = Members::default();
        self.block(|p| {
            if !p.parse_member(&mut members)? {
                if p.current().is_word() && p.peek_is(1, TokenKind::Colon) {
                    let field = p.parse_field()?;
                    members.fields.push(field);
                } else {
                    p.skip_statement();
                }
            }
            Ok(())
        })?;
        Ok(ArchetypeSpec {
            loc,
            name,
            fields: members.fields,
            computed_fields: members.computed_fields,
            invariants: members.invariants,
        })
    }

    /// `enum Name ["Title"]:` followed by `value ["Label"]` lines.
    pub(crate) fn parse_enum(&mut self) -> Result<EnumSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Enum)?;
        let (name, title) = self.declaration_header()?;
        let mut values: Vec<EnumValue> = Vec::new();
        self.block(|p| {
            let tok = p.current().clone();
            let value = p.expect_identifier()?;
            if values.iter().any(|v| v.name == value) {
                return Err(p.err_at(&tok, format!("duplicate enum value '{}'", value)));
            }
            let label = p.opt_string();
            p.end_statement()?;
            values.push(EnumValue { name: value, label });
            Ok(())
        })?;
        if values.is_empty() {
            return Err(ParseError::new(loc, format!("enum '{}' declares no values", name)));
        }
        Ok(EnumSpec {
            loc,
            name,
            title,
            values,
        })
    }

    /// Field, `computed` or `invariant` line. Returns false when the
    /// statement is something else and nothing was consumed.
    fn parse_member(&mut self, members: &mut Members) -> Result<bool, ParseError> {
        if self.at_field_declaration() {
            let tok = self.current().clone();
            let field = self.parse_field()?;
            if members.declares(&field.name) {
                return Err(self.err_at(&tok, format!("duplicate field '{}'", field.name)));
            }
            members.fields.push(field);
            return Ok(true);
        }
        if self.at_kw(Keyword::Computed) && !self.peek_is(1, TokenKind::Colon) {
            self.advance();
            let tok = self.current().clone();
            let name = self.expect_identifier()?;
            if members.declares(&name) {
                return Err(self.err_at(&tok, format!("duplicate field '{}'", name)));
            }
            self.expect(TokenKind::Colon)?;
            let expr = self.parse_computed()?;
            self.end_statement()?;
            members.computed_fields.push(ComputedFieldSpec { name, expr });
            return Ok(true);
        }
        if self.at_kw(Keyword::Invariant) && self.peek_is(1, TokenKind::Colon) {
            self.advance();
            self.advance();
            members.invariants.push(self.parse_invariant_spec()?);
            return Ok(true);
        }
        Ok(false)
    }

    /// `expr NEWLINE [INDENT message/code DEDENT]`
    fn parse_invariant_spec(&mut self) -> Result<InvariantSpec, ParseError> {
        let expr = self.parse_invariant()?;
        self.expect(TokenKind::Newline)?;
        let mut spec = InvariantSpec {
            expr,
            message: None,
            code: None,
        };
        if self.eat(TokenKind::Indent) {
            self.block_loop(|p| {
                match p.current_keyword() {
                    Some(Keyword::Message) => {
                        p.advance();
                        spec.message = Some(p.colon_string()?);
                    }
                    Some(Keyword::Code) => {
                        p.advance();
                        spec.code = Some(p.colon_string()?);
                    }
                    _ => p.skip_statement(),
                }
                Ok(())
            })?;
        }
        Ok(spec)
    }

    // -- State machines -----------------------------------------

    fn parse_transitions(&mut self) -> Result<Vec<StateTransition>, ParseError> {
        let mut transitions = Vec::new();
        self.block(|p| {
            transitions.push(p.parse_transition()?);
            Ok(())
        })?;
        Ok(transitions)
    }

    /// `from -> to [: guard, guard]` or `from -> to:` with an indented
    /// guard block.
    fn parse_transition(&mut self) -> Result<StateTransition, ParseError> {
        let from_state = if self.eat(TokenKind::Star) {
            WILDCARD_STATE.to_owned()
        } else {
            self.expect_identifier()?
        };
        self.expect(TokenKind::Arrow)?;
        let to_tok = self.current().clone();
        let to_state = self.expect_identifier()?;
        let mut transition = StateTransition {
            from_state,
            to_state,
            trigger: TransitionTrigger::Manual,
            guards: Vec::new(),
            auto: None,
        };

        if self.eat(TokenKind::Colon) {
            if self.eat(TokenKind::Newline) {
                self.expect(TokenKind::Indent)?;
                self.block_loop(|p| {
                    if p.at_kw(Keyword::Guard) {
                        p.advance();
                        p.expect(TokenKind::Colon)?;
                        let expr = p.parse_condition()?;
                        p.end_statement()?;
                        transition.guards.push(TransitionGuard::Expression { expr, message: None });
                    } else if p.at_kw(Keyword::Message) {
                        p.advance();
                        let message = p.colon_string()?;
                        match transition.guards.last_mut() {
                            Some(TransitionGuard::Expression { message: slot, .. }) => {
                                *slot = Some(message)
                            }
                            _ => return Err(p.err("'message' must follow a 'guard'")),
                        }
                    } else {
                        p.parse_inline_guards(&mut transition)?;
                        p.end_statement()?;
                    }
                    Ok(())
                })?;
            } else {
                self.parse_inline_guards(&mut transition)?;
                self.end_statement()?;
            }
        } else {
            self.end_statement()?;
        }

        if transition.to_state == WILDCARD_STATE {
            return Err(self.err_at(&to_tok, "a transition cannot target the wildcard state"));
        }
        if transition.auto.is_some() {
            transition.trigger = TransitionTrigger::Auto;
        }
        Ok(transition)
    }

    /// Comma-separated `requires f`, `role(r)`, `auto after N unit [or manual]`.
    fn parse_inline_guards(&mut self, transition: &mut StateTransition) -> Result<(), ParseError> {
        loop {
            match self.current_keyword() {
                Some(Keyword::Requires) => {
                    self.advance();
                    let field = self.expect_identifier()?;
                    transition.guards.push(TransitionGuard::RequiresField { field });
                }
                Some(Keyword::Role) => {
                    let role = self.parse_role_check()?;
                    transition.guards.push(TransitionGuard::Role { role });
                }
                Some(Keyword::Auto) => {
                    self.advance();
                    self.expect_kw(Keyword::After)?;
                    let after = self.expect_duration()?;
                    let or_manual = if self.eat_kw(Keyword::Or) {
                        self.expect_kw(Keyword::Manual)?;
                        true
                    } else {
                        false
                    };
                    transition.auto = Some(AutoTransition { after, or_manual });
                }
                _ => return Err(self.unexpected("'requires', 'role(...)' or 'auto after'")),
            }
            if !self.eat(TokenKind::Comma) {
                return Ok(());
            }
        }
    }

    // -- Access -------------------------------------------------

    /// ```text
    /// access:
    ///   read: <condition>
    ///   permit write: <condition>
    ///   forbid delete: <condition>
    /// ```
    pub(crate) fn parse_access(&mut self) -> Result<AccessSpec, ParseError> {
        let mut rules = Vec::new();
        self.block(|p| {
            let effect = if p.eat_kw(Keyword::Forbid) {
                PolicyEffect::Forbid
            } else {
                p.eat_kw(Keyword::Permit);
                PolicyEffect::Permit
            };
            let operations = p.parse_access_operation()?;
            p.expect(TokenKind::Colon)?;
            let condition = p.parse_condition()?;
            p.end_statement()?;
            for operation in operations {
                rules.push(AccessRule {
                    operation,
                    effect,
                    condition: condition.clone(),
                });
            }
            Ok(())
        })?;
        Ok(AccessSpec { rules })
    }

    /// `write` expands to create, update and delete.
    pub(crate) fn parse_access_operation(&mut self) -> Result<Vec<AccessOperation>, ParseError> {
        let op = match self.current_keyword() {
            Some(Keyword::Read) => vec![AccessOperation::Read],
            Some(Keyword::List) => vec![AccessOperation::List],
            Some(Keyword::Create) => vec![AccessOperation::Create],
            Some(Keyword::Update) => vec![AccessOperation::Update],
            Some(Keyword::Delete) => vec![AccessOperation::Delete],
            Some(Keyword::Write) => vec![
                AccessOperation::Create,
                AccessOperation::Update,
                AccessOperation::Delete,
            ],
            _ => return Err(self.unexpected("access operation (read, list, create, update, delete, write)")),
        };
        self.advance();
        Ok(op)
    }
}

/// Attach a state machine when a status field can be chosen.
fn build_state_machine(entity: &EntitySpec, transitions: Vec<StateTransition>) -> Option<StateMachineSpec> {
    let status_field = select_status_field(&entity.fields, &transitions)?;
    let states = match entity.get_field(&status_field).map(|f| &f.field_type) {
        Some(FieldType::Enum { values }) => values.clone(),
        _ => transition_states(&transitions),
    };
    Some(StateMachineSpec {
        status_field,
        states,
        transitions,
    })
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn entity(src: &str) -> EntitySpec {
        let m = parse_module(src, "e.dsl").expect("parse");
        m.fragment.entities.into_iter().next().expect("one entity")
    }

    #[test]
    fn full_entity() {
        let e = entity(
            r#"entity Task "Task":
  intent: "Track work"
  id: uuid pk
  title: str(200) required
  status: enum[draft, open, done] = draft
  owner: ref User
  computed age: days_since(created_at)
  invariant: title != ""
    message: "Title required"
    code: "TASK_TITLE"
  unique title, owner
  index status
  display_field: title
  soft_delete
"#,
        );
        assert_eq!(e.name, "Task");
        assert_eq!(e.title.as_deref(), Some("Task"));
        assert_eq!(e.intent.as_deref(), Some("Track work"));
        assert_eq!(e.fields.len(), 4);
        assert_eq!(e.computed_fields[0].name, "age");
        assert_eq!(e.invariants[0].message.as_deref(), Some("Title required"));
        assert_eq!(e.invariants[0].code.as_deref(), Some("TASK_TITLE"));
        assert_eq!(e.constraints.len(), 2);
        assert_eq!(e.constraints[0].fields, vec!["title", "owner"]);
        assert_eq!(e.display_field.as_deref(), Some("title"));
        assert!(e.soft_delete);
        assert_eq!(e.primary_key().map(|f| f.name.as_str()), Some("id"));
    }

    #[test]
    fn fields_named_like_directives() {
        let e = entity("entity Doc:\n  index: int\n  unique: bool\n  computed: str\n  domain: str\n");
        let names: Vec<&str> = e.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["index", "unique", "computed", "domain"]);
    }

    #[test]
    fn transitions_with_every_guard_form() {
        let e = entity(
            r#"entity Ticket:
  status: enum[open, review, approved, closed, expired]
  transitions:
    open -> review: requires assignee
    review -> approved:
      guard: score > 5
      message: "Score too low"
      role(lead)
    open -> expired: auto after 7 days or manual
    * -> closed: role(admin)
"#,
        );
        let sm = e.state_machine.expect("state machine");
        assert_eq!(sm.status_field, "status");
        assert_eq!(sm.states.len(), 5);
        assert_eq!(sm.transitions.len(), 4);
        assert_eq!(
            sm.transitions[0].guards,
            vec![TransitionGuard::RequiresField { field: "assignee".into() }]
        );
        match &sm.transitions[1].guards[0] {
            TransitionGuard::Expression { message, .. } => {
                assert_eq!(message.as_deref(), Some("Score too low"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sm.transitions[1].guards[1], TransitionGuard::Role { role: "lead".into() });
        assert_eq!(sm.transitions[1].trigger, TransitionTrigger::Manual);
        let auto = &sm.transitions[2];
        assert_eq!(auto.trigger, TransitionTrigger::Auto);
        let a = auto.auto.as_ref().unwrap();
        assert_eq!(a.after, Duration::new(7, DurationUnit::Days));
        assert!(a.or_manual);
        assert!(sm.transitions[3].is_wildcard());
    }

    #[test]
    fn state_machine_picks_covering_enum_before_status_name() {
        let e = entity(
            "entity Doc:\n  status: enum[a]\n  phase: enum[draft, live]\n  transitions:\n    draft -> live\n",
        );
        assert_eq!(e.state_machine.unwrap().status_field, "phase");
    }

    #[test]
    fn no_state_machine_without_a_match() {
        let e = entity("entity Doc:\n  phase: enum[a]\n  transitions:\n    x -> y\n");
        assert!(e.state_machine.is_none());
    }

    #[test]
    fn access_rules_expand_write() {
        let e = entity(
            "entity Doc:\n  title: str\n  access:\n    read: role(viewer) or owner = current_user\n    write: role(admin)\n    forbid delete: status = locked\n",
        );
        let access = e.access.unwrap();
        assert_eq!(access.rules.len(), 5);
        assert_eq!(access.rules_for(AccessOperation::Update).count(), 1);
        let deletes: Vec<_> = access.rules_for(AccessOperation::Delete).collect();
        assert_eq!(deletes.len(), 2);
        assert_eq!(deletes[1].effect, PolicyEffect::Forbid);
    }

    #[test]
    fn archetype_and_extends() {
        let m = parse_module(
            "archetype Timestamped:\n  created_at: datetime auto_add\n  updated_at: datetime auto_update\n\nentity Doc:\n  extends: Timestamped\n  archetype: settings\n  title: str\n",
            "a.dsl",
        )
        .unwrap();
        assert_eq!(m.fragment.archetypes[0].fields.len(), 2);
        let e = &m.fragment.entities[0];
        assert_eq!(e.extends, vec!["Timestamped"]);
        assert_eq!(e.archetype_kind, Some(ArchetypeKind::Settings));
    }

    #[test]
    fn enum_declaration() {
        let m = parse_module("enum Priority \"Priority\":\n  low \"Low\"\n  high\n", "e.dsl").unwrap();
        let en = &m.fragment.enums[0];
        assert_eq!(en.value_names(), vec!["low", "high"]);
        assert_eq!(en.values[0].label.as_deref(), Some("Low"));
    }

    #[test]
    fn duplicate_field_is_an_error() {
        let err = parse_module("entity A:\n  x: int\n  x: str\n", "d.dsl").unwrap_err();
        assert!(err.message.contains("duplicate field 'x'"));
        assert_eq!(err.location.line, 3);
    }

    #[test]
    fn unknown_directives_are_skipped_with_their_blocks() {
        let e = entity("entity A:\n  x: int\n  future_thing\n    nested stuff here\n  y: int\n");
        assert_eq!(e.fields.len(), 2);
    }
}
