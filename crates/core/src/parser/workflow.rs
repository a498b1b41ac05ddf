use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    ApprovalOutcome, ApprovalSpec, BreachAction, FieldAssignment, PayloadFormat, SlaSpec, SlaTier,
    TimeoutAction, ViewField, ViewSpec, WebhookAuth, WebhookAuthMethod, WebhookEvent,
    WebhookPayload, WebhookSpec,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const TIMEOUT_ACTIONS: &[(&str, TimeoutAction)] = &[
    ("escalate", TimeoutAction::Escalate),
    ("auto_approve", TimeoutAction::AutoApprove),
    ("auto_reject", TimeoutAction::AutoReject),
];

const WEBHOOK_EVENTS: &[(&str, WebhookEvent)] = &[
    ("created", WebhookEvent::Created),
    ("updated", WebhookEvent::Updated),
    ("deleted", WebhookEvent::Deleted),
];

const WEBHOOK_AUTH_METHODS: &[(&str, WebhookAuthMethod)] = &[
    ("hmac_sha256", WebhookAuthMethod::HmacSha256),
    ("bearer", WebhookAuthMethod::Bearer),
    ("basic", WebhookAuthMethod::Basic),
];

const PAYLOAD_FORMATS: &[(&str, PayloadFormat)] =
    &[("json", PayloadFormat::Json), ("form", PayloadFormat::Form)];

impl Parser {
    /// `entity:` as a directive, not the start of a nested declaration.
    fn at_entity_directive(&self) -> bool {
        self.at_kw(Keyword::Entity) && self.peek_is(1, TokenKind::Colon)
    }

    /// ```text
    /// approval purchase_approval "Purchase approval":
    ///   entity: PurchaseOrder
    ///   trigger: amount > 1000
    ///   approver_role: finance_manager
    ///   quorum: 2
    ///   timeout: 48h
    ///   on_timeout: escalate
    ///   outcomes:
    ///     approved -> approved
    ///     rejected -> rejected
    /// ```
    pub(crate) fn parse_approval(&mut self) -> Result<ApprovalSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Approval)?;
        let (name, title) = self.declaration_header()?;
        let mut entity = None;
        let mut trigger = None;
        let mut approver_role = None;
        let mut quorum = 1;
        let mut timeout = None;
        let mut on_timeout = None;
        let mut escalation_role = None;
        let mut outcomes: Vec<ApprovalOutcome> = Vec::new();

        self.block(|p| {
            if p.at_entity_directive() {
                p.advance();
                entity = Some(p.colon_identifier()?);
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Trigger) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    trigger = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::ApproverRole) => {
                    p.advance();
                    approver_role = Some(p.colon_identifier()?);
                }
                Some(Keyword::Quorum) => {
                    p.advance();
                    let tok = p.current().clone();
                    quorum = p.colon_u32()?;
                    if quorum == 0 {
                        return Err(p.err_at(&tok, "approval quorum must be at least 1"));
                    }
                }
                Some(Keyword::Timeout) => {
                    p.advance();
                    timeout = Some(p.colon_duration()?);
                }
                Some(Keyword::OnTimeout) => {
                    p.advance();
                    on_timeout = Some(p.colon_choice("timeout action", TIMEOUT_ACTIONS)?);
                }
                Some(Keyword::EscalationRole) => {
                    p.advance();
                    escalation_role = Some(p.colon_identifier()?);
                }
                Some(Keyword::Outcomes) => {
                    p.advance();
                    p.block(|p| {
                        let decision = p.expect_identifier()?;
                        p.expect(TokenKind::Arrow)?;
                        let target_state = p.expect_identifier()?;
                        p.end_statement()?;
                        outcomes.push(ApprovalOutcome {
                            decision,
                            target_state,
                        });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let entity = entity.ok_or_else(|| Parser::missing("approval", &name, "entity", &loc))?;
        let approver_role = approver_role
            .ok_or_else(|| Parser::missing("approval", &name, "approver_role", &loc))?;
        Ok(ApprovalSpec {
            loc,
            name,
            title,
            entity,
            trigger,
            approver_role,
            quorum,
            timeout,
            on_timeout,
            escalation_role,
            outcomes,
        })
    }

    pub(crate) fn parse_sla(&mut self) -> Result<SlaSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Sla)?;
        let (name, title) = self.declaration_header()?;
        let mut entity = None;
        let mut starts_when = None;
        let mut pauses_when = None;
        let mut completes_when = None;
        let mut tiers: Vec<SlaTier> = Vec::new();
        let mut business_hours = None;
        let mut on_breach = None;

        self.block(|p| {
            if p.at_entity_directive() {
                p.advance();
                entity = Some(p.colon_identifier()?);
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::StartsWhen) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    starts_when = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::PausesWhen) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    pauses_when = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::CompletesWhen) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    completes_when = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::Tiers) => {
                    p.advance();
                    p.block(|p| {
                        let tok = p.current().clone();
                        let name = p.expect_identifier()?;
                        if tiers.iter().any(|t| t.name == name) {
                            return Err(p.err_at(&tok, format!("duplicate sla tier '{}'", name)));
                        }
                        let duration = p.colon_duration()?;
                        tiers.push(SlaTier { name, duration });
                        Ok(())
                    })?;
                }
                Some(Keyword::BusinessHours) => {
                    p.advance();
                    business_hours = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::OnBreach) => {
                    p.advance();
                    on_breach = Some(p.parse_breach_action()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let missing = |directive: &str| Parser::missing("sla", &name, directive, &loc);
        let entity = entity.ok_or_else(|| missing("entity"))?;
        let starts_when = starts_when.ok_or_else(|| missing("starts_when"))?;
        let completes_when = completes_when.ok_or_else(|| missing("completes_when"))?;
        if tiers.is_empty() {
            return Err(missing("tiers"));
        }
        Ok(SlaSpec {
            loc,
            name,
            title,
            entity,
            starts_when,
            pauses_when,
            completes_when,
            tiers,
            business_hours,
            on_breach,
        })
    }

    /// `notify: role` and any number of `set: field = literal` lines.
    fn parse_breach_action(&mut self) -> Result<BreachAction, ParseError> {
        let mut action = BreachAction::default();
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Notify) => {
                    p.advance();
                    action.notify = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::Set) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let field = p.expect_identifier()?;
                    p.expect(TokenKind::Eq)?;
                    let value = p.parse_literal()?;
                    p.end_statement()?;
                    action.set.push(FieldAssignment { field, value });
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(action)
    }

    /// ```text
    /// webhook order_updates:
    ///   entity: Order
    ///   events: [created, updated]
    ///   url: "https://hooks.example.com/orders"
    ///   auth: hmac_sha256 secret "ORDER_HOOK_SECRET"
    ///   payload:
    ///     include: [id, status]
    ///     format: json
    ///   retry:
    ///     max_attempts: 5
    /// ```
    pub(crate) fn parse_webhook(&mut self) -> Result<WebhookSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Webhook)?;
        let (name, title) = self.declaration_header()?;
        let mut entity = None;
        let mut events: Vec<WebhookEvent> = Vec::new();
        let mut url = None;
        let mut auth = None;
        let mut payload = None;
        let mut retry = None;

        self.block(|p| {
            if p.at_entity_directive() {
                p.advance();
                entity = Some(p.colon_identifier()?);
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Events) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let bracketed = p.eat(TokenKind::LBracket);
                    loop {
                        let event = p.expect_choice("webhook event", WEBHOOK_EVENTS)?;
                        if !events.contains(&event) {
                            events.push(event);
                        }
                        if !p.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    if bracketed {
                        p.expect(TokenKind::RBracket)?;
                    }
                    p.end_statement()?;
                }
                Some(Keyword::Url) => {
                    p.advance();
                    url = Some(p.colon_string()?);
                }
                Some(Keyword::Auth) => {
                    p.advance();
                    auth = Some(p.parse_webhook_auth()?);
                }
                Some(Keyword::Payload) => {
                    p.advance();
                    let mut spec = WebhookPayload {
                        include: Vec::new(),
                        format: PayloadFormat::Json,
                    };
                    p.block(|p| {
                        match p.current_keyword() {
                            Some(Keyword::Include) => {
                                p.advance();
                                spec.include = p.colon_identifier_list()?;
                            }
                            Some(Keyword::Format) => {
                                p.advance();
                                spec.format = p.colon_choice("payload format", PAYLOAD_FORMATS)?;
                            }
                            _ => p.skip_statement(),
                        }
                        Ok(())
                    })?;
                    payload = Some(spec);
                }
                Some(Keyword::Retry) => {
                    p.advance();
                    retry = Some(p.parse_retry_policy()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let missing = |directive: &str| Parser::missing("webhook", &name, directive, &loc);
        let entity = entity.ok_or_else(|| missing("entity"))?;
        let url = url.ok_or_else(|| missing("url"))?;
        if events.is_empty() {
            return Err(missing("events"));
        }
        Ok(WebhookSpec {
            loc,
            name,
            title,
            entity,
            events,
            url,
            auth,
            payload,
            retry,
        })
    }

    /// Inline `: method [secret "ENV"]`, or a block of `method:` and
    /// `secret:` lines.
    fn parse_webhook_auth(&mut self) -> Result<WebhookAuth, ParseError> {
        if !self.peek_is(1, TokenKind::Newline) {
            self.expect(TokenKind::Colon)?;
            let method = self.expect_choice("webhook auth method", WEBHOOK_AUTH_METHODS)?;
            let secret_ref = if self.eat_word("secret") {
                Some(self.expect_string()?)
            } else {
                None
            };
            self.end_statement()?;
            return Ok(WebhookAuth { method, secret_ref });
        }
        let loc = self.loc();
        let mut method = None;
        let mut secret_ref = None;
        self.block(|p| {
            if p.eat_word("method") {
                method = Some(p.colon_choice("webhook auth method", WEBHOOK_AUTH_METHODS)?);
            } else if p.eat_word("secret") {
                secret_ref = Some(p.colon_name_or_string()?);
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        let method = method.ok_or_else(|| ParseError::new(loc, "webhook auth is missing required 'method'"))?;
        Ok(WebhookAuth { method, secret_ref })
    }

    /// ```text
    /// view open_by_owner:
    ///   source: Task
    ///   filter: status != done
    ///   group_by: [owner]
    ///   fields:
    ///     owner
    ///     open_count: count(id)
    /// ```
    pub(crate) fn parse_view(&mut self) -> Result<ViewSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::View)?;
        let (name, title) = self.declaration_header()?;
        let mut source = None;
        let mut filter = None;
        let mut group_by = Vec::new();
        let mut fields: Vec<ViewField> = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Source) => {
                    p.advance();
                    source = Some(p.colon_identifier()?);
                }
                Some(Keyword::Filter) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    filter = Some(p.parse_condition()?);
                    p.end_statement()?;
                }
                Some(Keyword::GroupBy) => {
                    p.advance();
                    group_by = p.colon_identifier_list()?;
                }
                Some(Keyword::Fields) => {
                    p.advance();
                    p.block(|p| {
                        let tok = p.current().clone();
                        let name = p.expect_identifier()?;
                        if fields.iter().any(|f| f.name == name) {
                            return Err(p.err_at(&tok, format!("duplicate view field '{}'", name)));
                        }
                        let expr = if p.eat(TokenKind::Colon) {
                            Some(p.parse_computed()?)
                        } else {
                            None
                        };
                        p.end_statement()?;
                        fields.push(ViewField { name, expr });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let source = source.ok_or_else(|| Parser::missing("view", &name, "source", &loc))?;
        if fields.is_empty() {
            return Err(Parser::missing("view", &name, "fields", &loc));
        }
        Ok(ViewSpec {
            loc,
            name,
            title,
            source,
            filter,
            group_by,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "w.dsl").expect("parse").fragment
    }

    #[test]
    fn approval_with_outcomes() {
        let f = fragment(
            r#"approval po_approval "Purchase approval":
  entity: PurchaseOrder
  trigger: amount > 1000
  approver_role: finance_manager
  quorum: 2
  timeout: 48h
  on_timeout: escalate
  escalation_role: cfo
  outcomes:
    approved -> approved
    rejected -> draft
"#,
        );
        let a = &f.approvals[0];
        assert_eq!(a.entity, "PurchaseOrder");
        assert!(a.trigger.is_some());
        assert_eq!(a.quorum, 2);
        assert_eq!(a.on_timeout, Some(TimeoutAction::Escalate));
        assert_eq!(a.escalation_role.as_deref(), Some("cfo"));
        assert_eq!(a.outcomes[1].target_state, "draft");
    }

    #[test]
    fn approval_defaults_to_quorum_of_one() {
        let f = fragment("approval a:\n  entity: Order\n  approver_role: manager\n");
        assert_eq!(f.approvals[0].quorum, 1);
    }

    #[test]
    fn approval_requires_role() {
        let err = parse_module("approval a:\n  entity: Order\n", "w.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'approver_role'"));
    }

    #[test]
    fn sla_with_breach_action() {
        let f = fragment(
            r#"sla first_response:
  entity: Ticket
  starts_when: status = open
  pauses_when: status = waiting
  completes_when: status = resolved
  tiers:
    warning: 4h
    breach: 8h
  business_hours: "mon-fri 09:00-17:00"
  on_breach:
    notify: support_lead
    set: escalated = true
"#,
        );
        let s = &f.slas[0];
        assert_eq!(s.tiers.len(), 2);
        assert_eq!(s.tiers[1].duration, Duration::new(8, DurationUnit::Hours));
        assert!(s.pauses_when.is_some());
        let breach = s.on_breach.as_ref().unwrap();
        assert_eq!(breach.notify.as_deref(), Some("support_lead"));
        assert_eq!(breach.set[0].field, "escalated");
        assert_eq!(breach.set[0].value, Literal::Bool(true));
    }

    #[test]
    fn sla_requires_tiers() {
        let err = parse_module(
            "sla s:\n  entity: T\n  starts_when: a = 1\n  completes_when: a = 2\n",
            "w.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("missing required 'tiers'"));
    }

    #[test]
    fn webhook_inline_and_block_auth() {
        let f = fragment(
            r#"webhook order_updates:
  entity: Order
  events: [created, updated, created]
  url: "https://hooks.example.com/orders"
  auth: hmac_sha256 secret "ORDER_HOOK_SECRET"
  payload:
    include: [id, status]
    format: form
  retry:
    max_attempts: 5

webhook audit_feed:
  entity: Order
  events: deleted
  url: "https://audit.example.com"
  auth:
    method: bearer
    secret: AUDIT_TOKEN
"#,
        );
        let w = &f.webhooks[0];
        assert_eq!(w.events, vec![WebhookEvent::Created, WebhookEvent::Updated]);
        let auth = w.auth.as_ref().unwrap();
        assert_eq!(auth.method, WebhookAuthMethod::HmacSha256);
        assert_eq!(auth.secret_ref.as_deref(), Some("ORDER_HOOK_SECRET"));
        assert_eq!(w.payload.as_ref().unwrap().format, PayloadFormat::Form);
        assert_eq!(w.retry.as_ref().unwrap().max_attempts, 5);

        let b = f.webhooks[1].auth.as_ref().unwrap();
        assert_eq!(b.method, WebhookAuthMethod::Bearer);
        assert_eq!(b.secret_ref.as_deref(), Some("AUDIT_TOKEN"));
    }

    #[test]
    fn view_fields() {
        let f = fragment(
            r#"view open_by_owner:
  source: Task
  filter: status != done
  group_by: [owner]
  fields:
    owner
    open_count: count(id)
"#,
        );
        let v = &f.views[0];
        assert_eq!(v.source, "Task");
        assert_eq!(v.group_by, vec!["owner"]);
        assert!(v.fields[0].expr.is_none());
        assert!(v.fields[1].expr.is_some());
    }

    #[test]
    fn view_rejects_duplicate_field() {
        let err = parse_module(
            "view v:\n  source: T\n  fields:\n    a\n    a\n",
            "w.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("duplicate view field 'a'"));
    }
}
