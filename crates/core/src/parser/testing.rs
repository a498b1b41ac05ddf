//! `test`, `flow`, `persona`, `scenario` and `story` declarations.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    ComparisonOp, Expectation, FlowPreconditions, FlowPriority, FlowSpec, FlowStep, KeyValue,
    PersonaScenarioEntry, PersonaSpec, Proficiency, ScenarioSpec, SetupStep, StorySpec,
    StoryStatus, StoryTrigger, TestAction, TestOperation, TestSpec, UnlessClause,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const TEST_OPERATIONS: &[(&str, TestOperation)] = &[
    ("create", TestOperation::Create),
    ("update", TestOperation::Update),
    ("delete", TestOperation::Delete),
    ("get", TestOperation::Get),
    ("list", TestOperation::List),
    ("transition", TestOperation::Transition),
];

const FLOW_PRIORITIES: &[(&str, FlowPriority)] = &[
    ("high", FlowPriority::High),
    ("medium", FlowPriority::Medium),
    ("low", FlowPriority::Low),
];

const PROFICIENCIES: &[(&str, Proficiency)] = &[
    ("novice", Proficiency::Novice),
    ("intermediate", Proficiency::Intermediate),
    ("expert", Proficiency::Expert),
];

const STORY_TRIGGERS: &[(&str, StoryTrigger)] = &[
    ("form_submitted", StoryTrigger::FormSubmitted),
    ("status_changed", StoryTrigger::StatusChanged),
    ("timer", StoryTrigger::Timer),
    ("external_event", StoryTrigger::ExternalEvent),
    ("user_click", StoryTrigger::UserClick),
    ("cron_daily", StoryTrigger::CronDaily),
    ("cron_hourly", StoryTrigger::CronHourly),
];

const STORY_STATUSES: &[(&str, StoryStatus)] = &[
    ("draft", StoryStatus::Draft),
    ("accepted", StoryStatus::Accepted),
    ("rejected", StoryStatus::Rejected),
];

impl Parser {
    // ──────────────────────────────────────────────
    // test
    // ──────────────────────────────────────────────

    /// ```text
    /// test create_task:
    ///   setup:
    ///     owner: create User with email="a@b.c", role=admin
    ///   action: create Task
    ///   data:
    ///     title: "Write docs"
    ///   expect:
    ///     status: draft
    ///     priority > 2
    /// ```
    pub(crate) fn parse_test(&mut self) -> Result<TestSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Test)?;
        let (name, title) = self.declaration_header()?;
        let mut setup = Vec::new();
        let mut action = None;
        let mut data = Vec::new();
        let mut expect = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Setup) => {
                    p.advance();
                    p.block(|p| {
                        let binding = p.expect_identifier()?;
                        p.expect(TokenKind::Colon)?;
                        let operation = p.expect_choice("test operation", TEST_OPERATIONS)?;
                        let entity = p.expect_identifier()?;
                        let data = if p.eat_kw(Keyword::With) {
                            p.parse_assignments()?
                        } else {
                            Vec::new()
                        };
                        p.end_statement()?;
                        setup.push(SetupStep {
                            binding,
                            operation,
                            entity,
                            data,
                        });
                        Ok(())
                    })?;
                }
                Some(Keyword::Action) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let operation = p.expect_choice("test operation", TEST_OPERATIONS)?;
                    let entity = p.expect_identifier()?;
                    let target = if p.current().is_word() {
                        Some(p.expect_identifier()?)
                    } else {
                        None
                    };
                    p.end_statement()?;
                    action = Some(TestAction {
                        operation,
                        entity,
                        target,
                    });
                }
                Some(Keyword::Data) => {
                    p.advance();
                    p.block(|p| {
                        let key = p.expect_identifier()?;
                        p.expect(TokenKind::Colon)?;
                        let value = p.parse_condition_value()?;
                        p.end_statement()?;
                        data.push(KeyValue { key, value });
                        Ok(())
                    })?;
                }
                Some(Keyword::Expect) => {
                    p.advance();
                    p.block(|p| {
                        let field = p.expect_identifier()?;
                        let op = if p.eat(TokenKind::Colon) {
                            ComparisonOp::Eq
                        } else {
                            p.parse_comparison_op()?
                        };
                        let value = p.parse_condition_value()?;
                        p.end_statement()?;
                        expect.push(Expectation { field, op, value });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let action = action.ok_or_else(|| Parser::missing("test", &name, "action", &loc))?;
        Ok(TestSpec {
            loc,
            name,
            title,
            setup,
            action,
            data,
            expect,
        })
    }

    /// `key=value, key=value`
    fn parse_assignments(&mut self) -> Result<Vec<KeyValue>, ParseError> {
        let mut pairs = Vec::new();
        loop {
            let key = self.expect_identifier()?;
            self.expect(TokenKind::Eq)?;
            let value = self.parse_condition_value()?;
            pairs.push(KeyValue { key, value });
            if !self.eat(TokenKind::Comma) {
                return Ok(pairs);
            }
        }
    }

    // ──────────────────────────────────────────────
    // flow
    // ──────────────────────────────────────────────

    pub(crate) fn parse_flow(&mut self) -> Result<FlowSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Flow)?;
        let (name, title) = self.declaration_header()?;
        let mut flow = FlowSpec {
            loc,
            name,
            title,
            priority: FlowPriority::Medium,
            tags: Vec::new(),
            preconditions: FlowPreconditions::default(),
            steps: Vec::new(),
        };

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Priority) => {
                    p.advance();
                    flow.priority = p.colon_choice("flow priority", FLOW_PRIORITIES)?;
                }
                Some(Keyword::Tags) => {
                    p.advance();
                    flow.tags = p.colon_identifier_list()?;
                }
                Some(Keyword::Preconditions) => {
                    p.advance();
                    flow.preconditions = p.parse_preconditions()?;
                }
                Some(Keyword::Steps) => {
                    p.advance();
                    p.block(|p| {
                        let step = p.parse_flow_step()?;
                        flow.steps.push(step);
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(flow)
    }

    fn parse_preconditions(&mut self) -> Result<FlowPreconditions, ParseError> {
        let mut pre = FlowPreconditions::default();
        self.block(|p| {
            if p.eat_word("user_role") {
                pre.user_role = Some(p.colon_identifier()?);
            } else if p.eat_word("fixtures") {
                pre.fixtures = p.colon_identifier_list()?;
            } else if p.eat_word("authenticated") {
                pre.authenticated = p.colon_bool()?;
            } else if p.eat_word("view") {
                pre.view = Some(p.colon_name_or_string()?);
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        Ok(pre)
    }

    /// `navigate X`, `click X`, `fill field "value"`, `wait 500ms`,
    /// `assert check arg...`, `snapshot`
    fn parse_flow_step(&mut self) -> Result<FlowStep, ParseError> {
        let verb = self.current().clone();
        let step = match verb.text.as_str() {
            "navigate" => {
                self.advance();
                FlowStep::Navigate {
                    target: self.flow_target()?,
                }
            }
            "click" => {
                self.advance();
                FlowStep::Click {
                    target: self.flow_target()?,
                }
            }
            "fill" => {
                self.advance();
                let field = self.flow_target()?;
                let value = self.expect_string()?;
                FlowStep::Fill { field, value }
            }
            "wait" => {
                self.advance();
                FlowStep::Wait {
                    duration: self.expect_duration()?,
                }
            }
            "assert" => {
                self.advance();
                let check = self.expect_word()?;
                let mut args = Vec::new();
                while !matches!(
                    self.current().kind,
                    TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof
                ) {
                    args.push(self.flow_target()?);
                }
                FlowStep::Assert { check, args }
            }
            "snapshot" => {
                self.advance();
                FlowStep::Snapshot
            }
            _ => {
                return Err(self.unexpected(
                    "flow step (navigate, click, fill, wait, assert, snapshot)",
                ))
            }
        };
        self.end_statement()?;
        Ok(step)
    }

    /// A dotted name, a string or a number, kept as text.
    fn flow_target(&mut self) -> Result<String, ParseError> {
        match self.current().kind {
            TokenKind::Str | TokenKind::Number => Ok(self.advance().text),
            _ if self.current().is_word() => {
                let mut name = self.expect_word()?;
                while self.eat(TokenKind::Dot) {
                    name.push('.');
                    name.push_str(&self.expect_word()?);
                }
                Ok(name)
            }
            _ => Err(self.unexpected("target")),
        }
    }

    // ──────────────────────────────────────────────
    // persona / scenario
    // ──────────────────────────────────────────────

    pub(crate) fn parse_persona(&mut self) -> Result<PersonaSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Persona)?;
        let (name, title) = self.declaration_header()?;
        let mut persona = PersonaSpec {
            loc,
            name,
            title,
            description: None,
            goals: Vec::new(),
            proficiency: Proficiency::Intermediate,
            default_workspace: None,
            default_route: None,
        };
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Description) => {
                    p.advance();
                    persona.description = Some(p.colon_string()?);
                }
                Some(Keyword::Goals) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    persona.goals = p.string_list()?;
                }
                Some(Keyword::Proficiency) => {
                    p.advance();
                    persona.proficiency = p.colon_choice("proficiency", PROFICIENCIES)?;
                }
                Some(Keyword::DefaultWorkspace) => {
                    p.advance();
                    persona.default_workspace = Some(p.colon_identifier()?);
                }
                Some(Keyword::DefaultRoute) => {
                    p.advance();
                    persona.default_route = Some(p.colon_string()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(persona)
    }

    pub(crate) fn parse_scenario(&mut self) -> Result<ScenarioSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Scenario)?;
        let (name, title) = self.declaration_header()?;
        let mut scenario = ScenarioSpec {
            loc,
            name,
            title,
            description: None,
            seed_script: None,
            persona_entries: Vec::new(),
        };
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Description) => {
                    p.advance();
                    scenario.description = Some(p.colon_string()?);
                }
                Some(Keyword::SeedScript) => {
                    p.advance();
                    scenario.seed_script = Some(p.colon_string()?);
                }
                Some(Keyword::For) => {
                    p.advance();
                    p.expect_kw(Keyword::Persona)?;
                    let mut entry = PersonaScenarioEntry {
                        persona: p.expect_identifier()?,
                        start_route: None,
                        seed_script: None,
                    };
                    p.block(|p| {
                        match p.current_keyword() {
                            Some(Keyword::StartRoute) => {
                                p.advance();
                                entry.start_route = Some(p.colon_string()?);
                            }
                            Some(Keyword::SeedScript) => {
                                p.advance();
                                entry.seed_script = Some(p.colon_string()?);
                            }
                            _ => p.skip_statement(),
                        }
                        Ok(())
                    })?;
                    scenario.persona_entries.push(entry);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(scenario)
    }

    // ──────────────────────────────────────────────
    // story
    // ──────────────────────────────────────────────

    pub(crate) fn parse_story(&mut self) -> Result<StorySpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Story)?;
        let (name, title) = self.declaration_header()?;
        let mut actor = None;
        let mut trigger = None;
        let mut scope = Vec::new();
        let mut given = Vec::new();
        let mut when = Vec::new();
        let mut then = Vec::new();
        let mut unless = Vec::new();
        let mut status = StoryStatus::Draft;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Actor) => {
                    p.advance();
                    actor = Some(p.colon_identifier()?);
                }
                Some(Keyword::Trigger) => {
                    p.advance();
                    trigger = Some(p.colon_choice("story trigger", STORY_TRIGGERS)?);
                }
                Some(Keyword::Scope) => {
                    p.advance();
                    scope = p.colon_identifier_list()?;
                }
                Some(Keyword::Given) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    given = p.string_list()?;
                }
                Some(Keyword::When) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    when = p.string_list()?;
                }
                Some(Keyword::Then) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    then = p.string_list()?;
                }
                Some(Keyword::Unless) => {
                    p.advance();
                    unless = p.parse_unless_clauses()?;
                }
                Some(Keyword::Status) => {
                    p.advance();
                    status = p.colon_choice("story status", STORY_STATUSES)?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let actor = actor.ok_or_else(|| Parser::missing("story", &name, "actor", &loc))?;
        let trigger = trigger.ok_or_else(|| Parser::missing("story", &name, "trigger", &loc))?;
        Ok(StorySpec {
            loc,
            name,
            title,
            actor,
            trigger,
            scope,
            given,
            when,
            then,
            unless,
            status,
        })
    }

    /// ```text
    /// unless:
    ///   - "Title is empty":
    ///       then: "Show a validation error"
    /// ```
    fn parse_unless_clauses(&mut self) -> Result<Vec<UnlessClause>, ParseError> {
        let mut clauses = Vec::new();
        self.block(|p| {
            p.expect(TokenKind::Minus)?;
            let condition = p.expect_string()?;
            let mut then_outcomes = Vec::new();
            if p.at(TokenKind::Colon) {
                p.block(|p| {
                    if p.eat_kw(Keyword::Then) {
                        p.expect(TokenKind::Colon)?;
                        then_outcomes.extend(p.string_list()?);
                    } else {
                        p.skip_statement();
                    }
                    Ok(())
                })?;
            } else {
                p.end_statement()?;
            }
            clauses.push(UnlessClause {
                condition,
                then_outcomes,
            });
            Ok(())
        })?;
        Ok(clauses)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "t.dsl").expect("parse").fragment
    }

    #[test]
    fn crud_test() {
        let f = fragment(
            r#"test create_task "Creating a task":
  setup:
    owner: create User with email="a@b.c", role=admin
  action: create Task
  data:
    title: "Write docs"
    owner: owner
  expect:
    status: draft
    priority > 2
"#,
        );
        let t = &f.tests[0];
        assert_eq!(t.setup[0].binding, "owner");
        assert_eq!(t.setup[0].entity, "User");
        assert_eq!(t.setup[0].data.len(), 2);
        assert_eq!(t.action.operation, TestOperation::Create);
        assert_eq!(t.action.entity, "Task");
        assert_eq!(t.data[1].value, ConditionValue::Identifier("owner".into()));
        assert_eq!(t.expect[0].op, ComparisonOp::Eq);
        assert_eq!(t.expect[1].op, ComparisonOp::Gt);
    }

    #[test]
    fn test_requires_action() {
        let err = parse_module("test t:\n  data:\n    a: 1\n", "t.dsl").unwrap_err();
        assert!(err.message.contains("test 't' is missing required 'action'"));
    }

    #[test]
    fn e2e_flow() {
        let f = fragment(
            r#"flow checkout "Checkout":
  priority: high
  tags: [smoke, checkout]
  preconditions:
    user_role: customer
    fixtures: [products]
    authenticated: true
  steps:
    navigate product_list
    click product.add_to_cart
    fill email "a@b.c"
    wait 500ms
    assert visible cart_badge "1"
    snapshot
"#,
        );
        let flow = &f.flows[0];
        assert_eq!(flow.priority, FlowPriority::High);
        assert_eq!(flow.tags, vec!["smoke", "checkout"]);
        assert_eq!(flow.preconditions.user_role.as_deref(), Some("customer"));
        assert!(flow.preconditions.authenticated);
        assert_eq!(flow.steps.len(), 6);
        assert_eq!(
            flow.steps[1],
            FlowStep::Click { target: "product.add_to_cart".into() }
        );
        assert_eq!(
            flow.steps[3],
            FlowStep::Wait { duration: Duration::new(500, DurationUnit::Milliseconds) }
        );
        assert_eq!(
            flow.steps[4],
            FlowStep::Assert { check: "visible".into(), args: vec!["cart_badge".into(), "1".into()] }
        );
        assert_eq!(flow.steps[5], FlowStep::Snapshot);
    }

    #[test]
    fn persona_and_scenario() {
        let f = fragment(
            r#"persona admin "Administrator":
  description: "Runs the shop"
  goals:
    - "Keep stock accurate"
    - "Resolve disputes"
  proficiency: expert
  default_workspace: ops
  default_route: "/admin"

scenario busy_day "Busy day":
  seed_script: "fixtures/busy.json"
  for persona admin:
    start_route: "/admin/orders"
"#,
        );
        let p = &f.personas[0];
        assert_eq!(p.goals.len(), 2);
        assert_eq!(p.proficiency, Proficiency::Expert);
        assert_eq!(p.default_workspace.as_deref(), Some("ops"));
        let s = &f.scenarios[0];
        assert_eq!(s.seed_script.as_deref(), Some("fixtures/busy.json"));
        assert_eq!(s.persona_entries[0].persona, "admin");
        assert_eq!(s.persona_entries[0].start_route.as_deref(), Some("/admin/orders"));
    }

    #[test]
    fn story_with_unless() {
        let f = fragment(
            r#"story ST001 "Staff creates a task":
  actor: staff
  trigger: form_submitted
  scope: [Task]
  given: "The staff member is signed in"
  when: ["They submit the form"]
  then:
    - "A task is created"
  unless:
    - "Title is empty":
        then: "Show a validation error"
  status: accepted
"#,
        );
        let s = &f.stories[0];
        assert_eq!(s.actor, "staff");
        assert_eq!(s.trigger, StoryTrigger::FormSubmitted);
        assert_eq!(s.scope, vec!["Task"]);
        assert_eq!(s.given.len(), 1);
        assert_eq!(s.when.len(), 1);
        assert_eq!(s.then, vec!["A task is created"]);
        assert_eq!(s.unless[0].condition, "Title is empty");
        assert_eq!(s.unless[0].then_outcomes, vec!["Show a validation error"]);
        assert_eq!(s.status, StoryStatus::Accepted);
    }
}
