use super::Parser;
use crate::error::ParseError;
use crate::ir::{ExperienceSpec, ExperienceStep, StepKind, StepTransition};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const STEP_KINDS: &[(&str, StepKind)] = &[
    ("surface", StepKind::Surface),
    ("process", StepKind::Process),
    ("integration", StepKind::Integration),
];

impl Parser {
    /// ```text
    /// experience onboarding:
    ///   start at step welcome
    ///   step welcome:
    ///     kind: surface
    ///     surface welcome_screen
    ///     on continue -> step profile
    /// ```
    pub(crate) fn parse_experience(&mut self) -> Result<ExperienceSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Experience)?;
        let (name, title) = self.declaration_header()?;
        let mut start_step = None;
        let mut steps: Vec<ExperienceStep> = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Start) => {
                    p.advance();
                    p.expect_kw(Keyword::At)?;
                    p.expect_kw(Keyword::Step)?;
                    start_step = Some(p.expect_identifier()?);
                    p.end_statement()?;
                }
                Some(Keyword::Step) => {
                    p.advance();
                    let tok = p.current().clone();
                    let step = p.parse_experience_step()?;
                    if steps.iter().any(|s| s.name == step.name) {
                        return Err(p.err_at(&tok, format!("duplicate step '{}'", step.name)));
                    }
                    steps.push(step);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let start_step =
            start_step.ok_or_else(|| Parser::missing("experience", &name, "start at step", &loc))?;
        Ok(ExperienceSpec {
            loc,
            name,
            title,
            start_step,
            steps,
        })
    }

    /// Without an explicit `kind`, the step takes the kind of its target.
    fn parse_experience_step(&mut self) -> Result<ExperienceStep, ParseError> {
        let mut step = ExperienceStep {
            name: self.expect_identifier()?,
            kind: StepKind::Surface,
            surface: None,
            process: None,
            integration: None,
            action: None,
            transitions: Vec::new(),
        };
        let mut explicit_kind = None;
        let mut inferred_kind = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Kind) => {
                    p.advance();
                    explicit_kind = Some(p.colon_choice("step kind", STEP_KINDS)?);
                }
                Some(Keyword::Surface) => {
                    p.advance();
                    step.surface = Some(p.expect_identifier()?);
                    inferred_kind.get_or_insert(StepKind::Surface);
                    p.end_statement()?;
                }
                Some(Keyword::Process) => {
                    p.advance();
                    step.process = Some(p.expect_identifier()?);
                    inferred_kind.get_or_insert(StepKind::Process);
                    p.end_statement()?;
                }
                Some(Keyword::Integration) => {
                    p.advance();
                    step.integration = Some(p.expect_identifier()?);
                    if p.eat_kw(Keyword::Action) {
                        step.action = Some(p.expect_identifier()?);
                    }
                    inferred_kind.get_or_insert(StepKind::Integration);
                    p.end_statement()?;
                }
                Some(Keyword::On) => {
                    p.advance();
                    let event = p.expect_word()?;
                    p.expect(TokenKind::Arrow)?;
                    p.expect_kw(Keyword::Step)?;
                    let next_step = p.expect_identifier()?;
                    p.end_statement()?;
                    step.transitions.push(StepTransition { event, next_step });
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        step.kind = explicit_kind.or(inferred_kind).unwrap_or(StepKind::Surface);
        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    #[test]
    fn steps_and_transitions() {
        let m = parse_module(
            r#"experience onboarding "Onboarding":
  start at step welcome
  step welcome:
    kind: surface
    surface welcome_screen
    on continue -> step sync
  step sync:
    integration crm action push
    on success -> step welcome
    on failure -> step welcome
"#,
            "x.dsl",
        )
        .unwrap();
        let e = &m.fragment.experiences[0];
        assert_eq!(e.start_step, "welcome");
        assert_eq!(e.steps.len(), 2);
        let welcome = e.get_step("welcome").unwrap();
        assert_eq!(welcome.surface.as_deref(), Some("welcome_screen"));
        assert_eq!(
            welcome.transitions,
            vec![StepTransition { event: "continue".into(), next_step: "sync".into() }]
        );
        let sync = e.get_step("sync").unwrap();
        assert_eq!(sync.kind, StepKind::Integration);
        assert_eq!(sync.action.as_deref(), Some("push"));
        assert_eq!(sync.transitions.len(), 2);
    }

    #[test]
    fn start_is_required() {
        let err = parse_module("experience x:\n  step a:\n    surface s\n", "x.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'start at step'"));
    }

    #[test]
    fn duplicate_step_names() {
        let err = parse_module(
            "experience x:\n  start at step a\n  step a:\n    surface s\n  step a:\n    surface t\n",
            "x.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("duplicate step 'a'"));
    }
}
