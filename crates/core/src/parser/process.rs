//! `process` and `schedule` declarations and their step blocks.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    CompensationSpec, EntityEvent, HumanTaskSpec, OverlapPolicy, ProcessSpec, ProcessStep,
    ProcessStepKind, ProcessTrigger, ScheduleSpec, ScheduleTiming, TaskOutcome,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const OVERLAP_POLICIES: &[(&str, OverlapPolicy)] = &[
    ("skip", OverlapPolicy::Skip),
    ("queue", OverlapPolicy::Queue),
    ("cancel", OverlapPolicy::Cancel),
    ("allow", OverlapPolicy::Allow),
];

impl Parser {
    /// Processes allow overlapping runs unless told otherwise.
    pub(crate) fn parse_process(&mut self) -> Result<ProcessSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Process)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = ProcessSpec {
            loc,
            name,
            title,
            implements: Vec::new(),
            trigger: ProcessTrigger::Manual,
            inputs: Vec::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
            compensations: Vec::new(),
            timeout: None,
            overlap: OverlapPolicy::Allow,
        };

        self.block(|p| {
            if p.parse_step_member(&mut spec.steps)? {
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Implements) => {
                    p.advance();
                    spec.implements = p.colon_identifier_list()?;
                }
                Some(Keyword::Trigger) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    spec.trigger = p.parse_process_trigger()?;
                    p.end_statement()?;
                }
                Some(Keyword::Input) => {
                    p.advance();
                    spec.inputs = p.parse_field_block()?;
                }
                Some(Keyword::Output) => {
                    p.advance();
                    spec.outputs = p.parse_field_block()?;
                }
                Some(Keyword::Compensations) => {
                    p.advance();
                    p.block(|p| {
                        let name = p.expect_identifier()?;
                        let service = p.colon_identifier()?;
                        spec.compensations.push(CompensationSpec { name, service });
                        Ok(())
                    })?;
                }
                Some(Keyword::Timeout) => {
                    p.advance();
                    spec.timeout = Some(p.colon_duration()?);
                }
                Some(Keyword::Overlap) => {
                    p.advance();
                    spec.overlap = p.colon_choice("overlap policy", OVERLAP_POLICIES)?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        if spec.steps.is_empty() {
            return Err(Parser::missing("process", &spec.name, "step", &spec.loc));
        }
        check_unique_steps(&spec.steps).map_err(|dup| {
            ParseError::new(
                spec.loc.clone(),
                format!("process '{}' declares step '{}' more than once", spec.name, dup),
            )
        })?;
        Ok(spec)
    }

    /// Schedules skip a run while the previous one is still going unless
    /// told otherwise.
    pub(crate) fn parse_schedule(&mut self) -> Result<ScheduleSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Schedule)?;
        let (name, title) = self.declaration_header()?;
        let mut timing = None;
        let mut timezone = None;
        let mut catch_up = false;
        let mut overlap = OverlapPolicy::Skip;
        let mut steps = Vec::new();

        self.block(|p| {
            if p.parse_step_member(&mut steps)? {
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Cron) => {
                    p.advance();
                    timing = Some(ScheduleTiming::Cron {
                        expression: p.colon_string()?,
                    });
                }
                Some(Keyword::Interval) => {
                    p.advance();
                    timing = Some(ScheduleTiming::Interval {
                        every: p.colon_duration()?,
                    });
                }
                Some(Keyword::Timezone) => {
                    p.advance();
                    timezone = Some(p.colon_string()?);
                }
                Some(Keyword::CatchUp) => {
                    p.advance();
                    catch_up = p.colon_bool()?;
                }
                Some(Keyword::Overlap) => {
                    p.advance();
                    overlap = p.colon_choice("overlap policy", OVERLAP_POLICIES)?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let timing =
            timing.ok_or_else(|| Parser::missing("schedule", &name, "cron' or 'interval", &loc))?;
        if steps.is_empty() {
            return Err(Parser::missing("schedule", &name, "step", &loc));
        }
        Ok(ScheduleSpec {
            loc,
            name,
            title,
            timing,
            timezone,
            catch_up,
            overlap,
            steps,
        })
    }

    /// `entity E created|updated|deleted`, `entity E status [from] -> to`,
    /// `signal name` or `manual`.
    fn parse_process_trigger(&mut self) -> Result<ProcessTrigger, ParseError> {
        if self.eat_kw(Keyword::Entity) {
            let entity = self.expect_identifier()?;
            let event = if self.eat_kw(Keyword::Status) {
                let from = if self.at(TokenKind::Arrow) {
                    None
                } else {
                    Some(self.expect_identifier()?)
                };
                self.expect(TokenKind::Arrow)?;
                EntityEvent::StatusChanged {
                    from,
                    to: self.expect_identifier()?,
                }
            } else if self.eat_word("created") {
                EntityEvent::Created
            } else if self.eat_word("updated") {
                EntityEvent::Updated
            } else if self.eat_word("deleted") {
                EntityEvent::Deleted
            } else {
                return Err(self.unexpected("'created', 'updated', 'deleted' or 'status'"));
            };
            return Ok(ProcessTrigger::Entity { entity, event });
        }
        if self.eat_word("signal") {
            return Ok(ProcessTrigger::Signal {
                name: self.expect_identifier()?,
            });
        }
        if self.eat_kw(Keyword::Manual) {
            return Ok(ProcessTrigger::Manual);
        }
        Err(self.unexpected("'entity', 'signal' or 'manual'"))
    }

    /// `step name:` or `parallel name:`. Returns false when the statement
    /// is neither.
    fn parse_step_member(&mut self, steps: &mut Vec<ProcessStep>) -> Result<bool, ParseError> {
        let step = match self.current_keyword() {
            Some(Keyword::Step) if !self.peek_is(1, TokenKind::Colon) => {
                self.advance();
                self.parse_process_step()?
            }
            Some(Keyword::Parallel) if !self.peek_is(1, TokenKind::Colon) => {
                self.advance();
                let loc = self.loc();
                let name = self.expect_identifier()?;
                let mut branches = Vec::new();
                self.block(|p| {
                    if !p.parse_step_member(&mut branches)? {
                        p.skip_statement();
                    }
                    Ok(())
                })?;
                if branches.len() < 2 {
                    return Err(ParseError::new(
                        loc,
                        format!("parallel block '{}' needs at least two steps", name),
                    ));
                }
                ProcessStep::new(name, ProcessStepKind::Parallel { steps: branches })
            }
            _ => return Ok(false),
        };
        steps.push(step);
        Ok(true)
    }

    fn parse_process_step(&mut self) -> Result<ProcessStep, ParseError> {
        let loc = self.loc();
        let name = self.expect_identifier()?;
        let mut kind = None;
        let mut condition = None;
        let mut timeout = None;
        let mut retry = None;
        let mut on_success = None;
        let mut on_failure = None;
        let mut on_timeout = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Service) => {
                    p.advance();
                    kind = Some(ProcessStepKind::Service {
                        service: p.colon_identifier()?,
                    });
                }
                Some(Keyword::WaitFor) => {
                    p.advance();
                    kind = Some(ProcessStepKind::WaitFor {
                        signal: p.colon_identifier()?,
                    });
                }
                Some(Keyword::Subprocess) => {
                    p.advance();
                    kind = Some(ProcessStepKind::Subprocess {
                        process: p.colon_identifier()?,
                    });
                }
                Some(Keyword::HumanTask) => {
                    p.advance();
                    kind = Some(ProcessStepKind::HumanTask(p.parse_human_task()?));
                }
                Some(Keyword::Condition) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    condition = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::Timeout) => {
                    p.advance();
                    timeout = Some(p.colon_duration()?);
                }
                Some(Keyword::Retry) => {
                    p.advance();
                    retry = Some(p.parse_retry_policy()?);
                }
                Some(Keyword::OnSuccess) => {
                    p.advance();
                    on_success = Some(p.colon_identifier()?);
                }
                Some(Keyword::OnFailure) => {
                    p.advance();
                    on_failure = Some(p.colon_identifier()?);
                }
                Some(Keyword::OnTimeout) => {
                    p.advance();
                    on_timeout = Some(p.colon_identifier()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let kind = kind.ok_or_else(|| {
            Parser::missing("step", &name, "service', 'wait_for', 'human_task' or 'subprocess", &loc)
        })?;
        Ok(ProcessStep {
            condition,
            timeout,
            retry,
            on_success,
            on_failure,
            on_timeout,
            ..ProcessStep::new(name, kind)
        })
    }

    fn parse_human_task(&mut self) -> Result<HumanTaskSpec, ParseError> {
        let loc = self.loc();
        let mut surface = None;
        let mut assignee_role = None;
        let mut outcomes = Vec::new();
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Surface) => {
                    p.advance();
                    surface = Some(p.colon_identifier()?);
                }
                Some(Keyword::AssigneeRole) => {
                    p.advance();
                    assignee_role = Some(p.colon_identifier()?);
                }
                Some(Keyword::Outcomes) => {
                    p.advance();
                    p.block(|p| {
                        let name = p.expect_identifier()?;
                        p.expect(TokenKind::Arrow)?;
                        let next = p.expect_identifier()?;
                        p.end_statement()?;
                        outcomes.push(TaskOutcome { name, next });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        let surface = surface
            .ok_or_else(|| ParseError::new(loc, "human_task is missing required 'surface'"))?;
        Ok(HumanTaskSpec {
            surface,
            assignee_role,
            outcomes,
        })
    }
}

/// First step name that appears twice, counting nested parallel branches.
fn check_unique_steps(steps: &[ProcessStep]) -> Result<(), String> {
    let mut seen = std::collections::HashSet::new();
    for step in steps.iter().flat_map(|s| s.flatten()) {
        if !seen.insert(step.name.as_str()) {
            return Err(step.name.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "p.dsl").expect("parse").fragment
    }

    #[test]
    fn process_with_every_step_kind() {
        let f = fragment(
            r#"process fulfil "Fulfil order":
  implements: [ST001]
  trigger: entity Order status -> confirmed
  input:
    order_id: uuid required
  step reserve:
    service: reserve_stock
    timeout: 30s
    retry:
      max_attempts: 2
    on_failure: release
  step approve:
    condition: total > 1000
    human_task:
      surface: approval_form
      assignee_role: manager
      outcomes:
        approved -> ship
        rejected -> fail
  step await_payment:
    wait_for: payment_received
    on_timeout: release
  parallel notify:
    step email:
      service: send_email
    step sms:
      service: send_sms
  step ship:
    subprocess: shipping
  compensations:
    release: release_stock
  timeout: 24h
  overlap: queue
"#,
        );
        let p = &f.processes[0];
        assert_eq!(p.implements, vec!["ST001"]);
        assert_eq!(
            p.trigger,
            ProcessTrigger::Entity {
                entity: "Order".into(),
                event: EntityEvent::StatusChanged { from: None, to: "confirmed".into() }
            }
        );
        assert_eq!(p.inputs.len(), 1);
        assert_eq!(p.steps.len(), 5);
        assert_eq!(p.all_steps().len(), 7);
        let reserve = p.get_step("reserve").unwrap();
        assert_eq!(reserve.retry.as_ref().unwrap().max_attempts, 2);
        assert_eq!(reserve.on_failure.as_deref(), Some("release"));
        match &p.get_step("approve").unwrap().kind {
            ProcessStepKind::HumanTask(task) => {
                assert_eq!(task.surface, "approval_form");
                assert_eq!(task.outcomes.len(), 2);
                assert_eq!(task.outcomes[1].next, "fail");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(p.get_step("approve").unwrap().condition.is_some());
        assert!(matches!(p.get_step("sms").unwrap().kind, ProcessStepKind::Service { .. }));
        assert_eq!(p.compensations[0].service, "release_stock");
        assert_eq!(p.overlap, OverlapPolicy::Queue);
    }

    #[test]
    fn triggers() {
        let p = |t: &str| {
            fragment(&format!("process x:\n  trigger: {}\n  step a:\n    service: s\n", t))
                .processes
                .remove(0)
                .trigger
        };
        assert_eq!(
            p("entity Order created"),
            ProcessTrigger::Entity { entity: "Order".into(), event: EntityEvent::Created }
        );
        assert_eq!(
            p("entity Order status draft -> sent"),
            ProcessTrigger::Entity {
                entity: "Order".into(),
                event: EntityEvent::StatusChanged { from: Some("draft".into()), to: "sent".into() }
            }
        );
        assert_eq!(p("signal paid"), ProcessTrigger::Signal { name: "paid".into() });
        assert_eq!(p("manual"), ProcessTrigger::Manual);
    }

    #[test]
    fn step_without_kind() {
        let err = parse_module("process x:\n  step a:\n    timeout: 5s\n", "p.dsl").unwrap_err();
        assert!(err.message.contains("step 'a' is missing required"));
    }

    #[test]
    fn duplicate_nested_step() {
        let err = parse_module(
            "process x:\n  step a:\n    service: s\n  parallel p:\n    step a:\n      service: s\n    step b:\n      service: s\n",
            "p.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("declares step 'a' more than once"));
    }

    #[test]
    fn schedule() {
        let f = fragment(
            r#"schedule nightly "Nightly cleanup":
  cron: "0 2 * * *"
  timezone: "Europe/London"
  catch_up: true
  step purge:
    service: purge_old_records

schedule poll:
  interval: 15m
  overlap: cancel
  step fetch:
    service: fetch_rates
"#,
        );
        assert_eq!(
            f.schedules[0].timing,
            ScheduleTiming::Cron { expression: "0 2 * * *".into() }
        );
        assert!(f.schedules[0].catch_up);
        assert_eq!(f.schedules[0].overlap, OverlapPolicy::Skip);
        assert_eq!(
            f.schedules[1].timing,
            ScheduleTiming::Interval { every: Duration::new(15, DurationUnit::Minutes) }
        );
        assert_eq!(f.schedules[1].overlap, OverlapPolicy::Cancel);
    }

    #[test]
    fn schedule_needs_timing() {
        let err = parse_module("schedule s:\n  step a:\n    service: x\n", "p.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'cron' or 'interval'"));
    }
}
