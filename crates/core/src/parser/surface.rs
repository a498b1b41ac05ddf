use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    AttentionLevel, AttentionSignal, Outcome, OutcomeKind, PersonaScope, PersonaVariant,
    SortSpec, SurfaceAccessSpec, SurfaceAction, SurfaceElement, SurfaceMode, SurfaceSection,
    SurfaceSpec, UxSpec,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const SURFACE_MODES: &[(&str, SurfaceMode)] = &[
    ("list", SurfaceMode::List),
    ("view", SurfaceMode::View),
    ("create", SurfaceMode::Create),
    ("edit", SurfaceMode::Edit),
    ("custom", SurfaceMode::Custom),
];

const OUTCOME_KINDS: &[(&str, OutcomeKind)] = &[
    ("surface", OutcomeKind::Surface),
    ("experience", OutcomeKind::Experience),
    ("integration", OutcomeKind::Integration),
];

const ATTENTION_LEVELS: &[(&str, AttentionLevel)] = &[
    ("critical", AttentionLevel::Critical),
    ("warning", AttentionLevel::Warning),
    ("notice", AttentionLevel::Notice),
    ("info", AttentionLevel::Info),
];

impl Parser {
    /// ```text
    /// surface task_list "Tasks":
    ///   uses entity Task
    ///   mode: list
    ///   section main:
    ///     field title "Title"
    ///   action open:
    ///     on click -> surface task_detail
    ///   ux:
    ///     sort: due_date desc
    /// ```
    ///
    /// A surface without `mode` is `custom`.
    pub(crate) fn parse_surface(&mut self) -> Result<SurfaceSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Surface)?;
        let (name, title) = self.declaration_header()?;
        let mut surface = SurfaceSpec::new(name, SurfaceMode::Custom, loc);
        surface.title = title;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Uses) => {
                    p.advance();
                    p.expect_kw(Keyword::Entity)?;
                    surface.entity_ref = Some(p.expect_identifier()?);
                    p.end_statement()?;
                }
                Some(Keyword::Mode) => {
                    p.advance();
                    surface.mode = p.colon_choice("surface mode", SURFACE_MODES)?;
                }
                Some(Keyword::Section) => {
                    p.advance();
                    let section = p.parse_section()?;
                    surface.sections.push(section);
                }
                Some(Keyword::Action) => {
                    p.advance();
                    let action = p.parse_surface_action()?;
                    if surface.get_action(&action.name).is_some() {
                        return Err(p.err(format!(
                            "duplicate action '{}' in surface '{}'",
                            action.name, surface.name
                        )));
                    }
                    surface.actions.push(action);
                }
                Some(Keyword::Ux) => {
                    p.advance();
                    surface.ux = Some(p.parse_ux()?);
                }
                Some(Keyword::Access) => {
                    p.advance();
                    surface.access = Some(p.parse_surface_access()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(surface)
    }

    fn parse_section(&mut self) -> Result<SurfaceSection, ParseError> {
        let (name, title) = self.declaration_header()?;
        let mut elements = Vec::new();
        self.block(|p| {
            if p.eat_kw(Keyword::Field) {
                let field_name = p.expect_identifier()?;
                let label = p.opt_string();
                p.end_statement()?;
                elements.push(SurfaceElement { field_name, label });
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        Ok(SurfaceSection {
            name,
            title,
            elements,
        })
    }

    /// `action name ["Label"]` with an optional `on <event> -> <outcome>` block.
    fn parse_surface_action(&mut self) -> Result<SurfaceAction, ParseError> {
        let (name, label) = self.declaration_header()?;
        let mut action = SurfaceAction {
            name,
            label,
            trigger: "click".to_owned(),
            outcome: None,
        };
        if !self.at(TokenKind::Colon) {
            self.end_statement()?;
            return Ok(action);
        }
        self.block(|p| {
            if p.eat_kw(Keyword::On) {
                action.trigger = p.expect_word()?;
                p.expect(TokenKind::Arrow)?;
                action.outcome = Some(p.parse_outcome()?);
                p.end_statement()?;
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        Ok(action)
    }

    /// `surface X`, `experience X`, `integration X [action a]`
    fn parse_outcome(&mut self) -> Result<Outcome, ParseError> {
        let kind = self.expect_choice("outcome", OUTCOME_KINDS)?;
        let target = self.expect_identifier()?;
        let action = if self.eat_kw(Keyword::Action) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok(Outcome {
            kind,
            target,
            action,
        })
    }

    /// `field [asc|desc], ...`
    pub(crate) fn parse_sort_list(&mut self) -> Result<Vec<SortSpec>, ParseError> {
        let mut sort = Vec::new();
        loop {
            let field = self.expect_identifier()?;
            let descending = if self.eat_word("desc") {
                true
            } else {
                self.eat_word("asc");
                false
            };
            sort.push(SortSpec { field, descending });
            if !self.eat(TokenKind::Comma) {
                return Ok(sort);
            }
        }
    }

    fn parse_ux(&mut self) -> Result<UxSpec, ParseError> {
        let mut ux = UxSpec::default();
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Purpose) => {
                    p.advance();
                    ux.purpose = Some(p.colon_string()?);
                }
                Some(Keyword::Sort) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    ux.sort = p.parse_sort_list()?;
                    p.end_statement()?;
                }
                Some(Keyword::Filter) => {
                    p.advance();
                    ux.filter = p.colon_identifier_list()?;
                }
                Some(Keyword::Search) => {
                    p.advance();
                    ux.search = p.colon_identifier_list()?;
                }
                Some(Keyword::Empty) => {
                    p.advance();
                    ux.empty_message = Some(p.colon_string()?);
                }
                Some(Keyword::Attention) => {
                    p.advance();
                    let signal = p.parse_attention_signal()?;
                    ux.attention_signals.push(signal);
                }
                Some(Keyword::For) => {
                    p.advance();
                    let variant = p.parse_persona_variant()?;
                    ux.persona_variants.push(variant);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(ux)
    }

    fn parse_attention_signal(&mut self) -> Result<AttentionSignal, ParseError> {
        let loc = self.loc();
        let level_name = self.current().text.clone();
        let level = self.expect_choice("attention level", ATTENTION_LEVELS)?;
        let mut condition = None;
        let mut message = None;
        let mut action = None;
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::When) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    condition = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::Message) => {
                    p.advance();
                    message = Some(p.colon_string()?);
                }
                Some(Keyword::Action) => {
                    p.advance();
                    action = Some(p.colon_identifier()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        let condition =
            condition.ok_or_else(|| Parser::missing("attention", &level_name, "when", &loc))?;
        let message =
            message.ok_or_else(|| Parser::missing("attention", &level_name, "message", &loc))?;
        Ok(AttentionSignal {
            level,
            condition,
            message,
            action,
        })
    }

    fn parse_persona_variant(&mut self) -> Result<PersonaVariant, ParseError> {
        let mut variant = PersonaVariant::new(self.expect_identifier()?);
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Scope) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let bare_all = p.at_word("all")
                        && matches!(p.peek(1).kind, TokenKind::Newline | TokenKind::Dedent | TokenKind::Eof);
                    variant.scope = Some(if bare_all {
                        p.advance();
                        PersonaScope::All
                    } else {
                        PersonaScope::Filter(p.parse_condition()?)
                    });
                    p.end_statement()?;
                }
                Some(Keyword::Hide) => {
                    p.advance();
                    variant.hide = p.colon_identifier_list()?;
                }
                Some(Keyword::Show) => {
                    p.advance();
                    variant.show = p.colon_identifier_list()?;
                }
                Some(Keyword::ShowAggregate) => {
                    p.advance();
                    variant.show_aggregate = p.colon_identifier_list()?;
                }
                Some(Keyword::ActionPrimary) => {
                    p.advance();
                    variant.action_primary = Some(p.colon_identifier()?);
                }
                Some(Keyword::ReadOnly) => {
                    p.advance();
                    variant.read_only = p.colon_bool()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(variant)
    }

    fn parse_surface_access(&mut self) -> Result<SurfaceAccessSpec, ParseError> {
        let mut access = SurfaceAccessSpec::default();
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::RequireAuth) => {
                    p.advance();
                    access.require_auth = p.colon_bool()?;
                }
                Some(Keyword::AllowPersonas) => {
                    p.advance();
                    access.allow_personas = p.colon_identifier_list()?;
                }
                Some(Keyword::DenyPersonas) => {
                    p.advance();
                    access.deny_personas = p.colon_identifier_list()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn surface(src: &str) -> SurfaceSpec {
        let m = parse_module(src, "s.dsl").expect("parse");
        m.fragment.surfaces.into_iter().next().expect("surface")
    }

    #[test]
    fn sections_and_actions() {
        let s = surface(
            r#"surface task_list "Tasks":
  uses entity Task
  mode: list
  section main "Main":
    field title "Title"
    field status
  action open "Open":
    on click -> surface task_detail
  action charge:
    on submit -> integration billing action charge
  action noop
"#,
        );
        assert_eq!(s.entity_ref.as_deref(), Some("Task"));
        assert_eq!(s.mode, SurfaceMode::List);
        assert_eq!(s.field_names().collect::<Vec<_>>(), vec!["title", "status"]);
        assert_eq!(s.sections[0].elements[0].label.as_deref(), Some("Title"));
        let open = s.get_action("open").unwrap();
        assert_eq!(
            open.outcome,
            Some(Outcome {
                kind: OutcomeKind::Surface,
                target: "task_detail".into(),
                action: None
            })
        );
        let charge = s.get_action("charge").unwrap();
        assert_eq!(charge.trigger, "submit");
        assert_eq!(charge.outcome.as_ref().unwrap().action.as_deref(), Some("charge"));
        assert!(s.get_action("noop").unwrap().outcome.is_none());
    }

    #[test]
    fn ux_block() {
        let s = surface(
            r#"surface inbox:
  uses entity Task
  mode: list
  ux:
    purpose: "Triage work"
    sort: due_date desc, title
    filter: status, owner
    search: title
    empty: "Nothing to do"
    attention critical:
      when: due_date < today
      message: "Overdue"
      action: escalate
    for manager:
      scope: all
      show_aggregate: total
      action_primary: approve
    for member:
      scope: owner = current_user
      hide: salary
      read_only: true
"#,
        );
        let ux = s.ux.unwrap();
        assert_eq!(ux.purpose.as_deref(), Some("Triage work"));
        assert_eq!(
            ux.sort,
            vec![
                SortSpec { field: "due_date".into(), descending: true },
                SortSpec { field: "title".into(), descending: false }
            ]
        );
        assert_eq!(ux.filter, vec!["status", "owner"]);
        assert_eq!(ux.attention_signals[0].level, AttentionLevel::Critical);
        assert_eq!(ux.attention_signals[0].action.as_deref(), Some("escalate"));
        assert_eq!(ux.persona_variants.len(), 2);
        assert_eq!(ux.persona_variants[0].scope, Some(PersonaScope::All));
        assert!(matches!(ux.persona_variants[1].scope, Some(PersonaScope::Filter(_))));
        assert!(ux.persona_variants[1].read_only);
    }

    #[test]
    fn access_block() {
        let s = surface(
            "surface admin_panel:\n  mode: custom\n  access:\n    require_auth: true\n    allow_personas: [admin]\n    deny_personas: guest, bot\n",
        );
        let access = s.access.unwrap();
        assert!(access.require_auth);
        assert_eq!(access.allow_personas, vec!["admin"]);
        assert_eq!(access.deny_personas, vec!["guest", "bot"]);
    }

    #[test]
    fn missing_mode_defaults_to_custom() {
        assert_eq!(surface("surface x:\n  uses entity A\n").mode, SurfaceMode::Custom);
    }

    #[test]
    fn bad_mode_lists_choices() {
        let err = parse_module("surface x:\n  mode: grid\n", "s.dsl").unwrap_err();
        assert!(err.message.contains("invalid surface mode"));
        assert!(err.message.contains("list, view, create, edit, custom"));
    }

    #[test]
    fn attention_requires_condition() {
        let err = parse_module(
            "surface x:\n  ux:\n    attention info:\n      message: \"hi\"\n",
            "s.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("missing required 'when'"));
    }
}
