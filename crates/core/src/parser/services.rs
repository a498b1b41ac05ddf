//! `service`, `foreign_model` and `integration` declarations.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    ApiSpecSource, AuthProfile, DomainServiceKind, FieldSpec, ForeignConstraint,
    ForeignModelSpec, IntegrationAction, IntegrationSpec, IntegrationSync, MappingRule,
    MatchRule, ResponseMapping, ServiceBody, ServiceSpec, SyncMode,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const DOMAIN_SERVICE_KINDS: &[(&str, DomainServiceKind)] = &[
    ("domain_logic", DomainServiceKind::DomainLogic),
    ("validation", DomainServiceKind::Validation),
    ("integration", DomainServiceKind::Integration),
    ("workflow", DomainServiceKind::Workflow),
];

const FOREIGN_CONSTRAINTS: &[(&str, ForeignConstraint)] = &[
    ("read_only", ForeignConstraint::ReadOnly),
    ("event_driven", ForeignConstraint::EventDriven),
    ("batch_import", ForeignConstraint::BatchImport),
];

impl Parser {
    // ──────────────────────────────────────────────
    // service
    // ──────────────────────────────────────────────

    /// External API services carry `spec`/`auth_profile`/`owner`; a
    /// `kind` makes it a domain service with `input`/`output` blocks.
    pub(crate) fn parse_service(&mut self) -> Result<ServiceSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Service)?;
        let (name, title) = self.declaration_header()?;

        let mut spec = None;
        let mut auth_profile = None;
        let mut owner = None;
        let mut kind = None;
        let mut inputs: Vec<FieldSpec> = Vec::new();
        let mut outputs: Vec<FieldSpec> = Vec::new();
        let mut guarantees = Vec::new();
        let mut stub = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Spec) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    spec = Some(if p.eat_kw(Keyword::Url) {
                        ApiSpecSource::Url(p.expect_string()?)
                    } else if p.eat_word("inline") {
                        ApiSpecSource::Inline(p.expect_string()?)
                    } else {
                        return Err(p.unexpected("'url' or 'inline'"));
                    });
                    p.end_statement()?;
                }
                Some(Keyword::AuthProfile) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    auth_profile = Some(p.parse_auth_profile()?);
                    p.end_statement()?;
                }
                Some(Keyword::Owner) => {
                    p.advance();
                    owner = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::Kind) => {
                    p.advance();
                    kind = Some(p.colon_choice("service kind", DOMAIN_SERVICE_KINDS)?);
                }
                Some(Keyword::Input) => {
                    p.advance();
                    inputs = p.parse_field_block()?;
                }
                Some(Keyword::Output) => {
                    p.advance();
                    outputs = p.parse_field_block()?;
                }
                Some(Keyword::Guarantees) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    guarantees = p.string_list()?;
                }
                Some(Keyword::Stub) => {
                    p.advance();
                    stub = Some(p.colon_name_or_string()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let is_domain = kind.is_some() || !inputs.is_empty() || !outputs.is_empty();
        let body = if is_domain {
            if spec.is_some() || auth_profile.is_some() {
                return Err(ParseError::new(
                    loc,
                    format!("service '{}' mixes external API and domain service directives", name),
                ));
            }
            let kind = kind.ok_or_else(|| Parser::missing("service", &name, "kind", &loc))?;
            ServiceBody::Domain {
                kind,
                inputs,
                outputs,
                guarantees,
                stub,
            }
        } else {
            ServiceBody::Api {
                spec,
                auth_profile,
                owner,
            }
        };
        Ok(ServiceSpec {
            loc,
            name,
            title,
            body,
        })
    }

    /// `kind [key=value ...]`
    fn parse_auth_profile(&mut self) -> Result<AuthProfile, ParseError> {
        let kind = self.expect_word()?;
        let mut options = Vec::new();
        while self.current().is_word() && self.peek_is(1, TokenKind::Eq) {
            let key = self.advance().text;
            self.advance();
            let value = match self.opt_string() {
                Some(s) => s,
                None => self.expect_word()?,
            };
            options.push((key, value));
        }
        Ok(AuthProfile { kind, options })
    }

    /// `: name` or `: "string"`
    pub(crate) fn colon_name_or_string(&mut self) -> Result<String, ParseError> {
        self.expect(TokenKind::Colon)?;
        let value = match self.opt_string() {
            Some(s) => s,
            None => self.expect_identifier()?,
        };
        self.end_statement()?;
        Ok(value)
    }

    // ──────────────────────────────────────────────
    // foreign_model
    // ──────────────────────────────────────────────

    /// `foreign_model Name from service ["Title"]:`
    pub(crate) fn parse_foreign_model(&mut self) -> Result<ForeignModelSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::ForeignModel)?;
        let (name, mut title) = self.declaration_header()?;
        self.expect_kw(Keyword::From)?;
        let service = self.expect_identifier()?;
        if title.is_none() {
            title = self.opt_string();
        }

        let mut key_fields = Vec::new();
        let mut constraints: Vec<ForeignConstraint> = Vec::new();
        let mut fields: Vec<FieldSpec> = Vec::new();

        self.block(|p| {
            if p.at_field_declaration() {
                let tok = p.current().clone();
                let field = p.parse_field()?;
                if fields.iter().any(|f| f.name == field.name) {
                    return Err(p.err_at(&tok, format!("duplicate field '{}'", field.name)));
                }
                fields.push(field);
                return Ok(());
            }
            match p.current_keyword() {
                Some(Keyword::Key) => {
                    p.advance();
                    key_fields = p.colon_identifier_list()?;
                }
                Some(Keyword::Constraint) => {
                    p.advance();
                    let constraint = p.expect_choice("foreign model constraint", FOREIGN_CONSTRAINTS)?;
                    p.end_statement()?;
                    if !constraints.contains(&constraint) {
                        constraints.push(constraint);
                    }
                }
                _ if p.current().is_word() && p.peek_is(1, TokenKind::Colon) => {
                    let field = p.parse_field()?;
                    fields.push(field);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        Ok(ForeignModelSpec {
            loc,
            name,
            title,
            service,
            key_fields,
            constraints,
            fields,
        })
    }

    // ──────────────────────────────────────────────
    // integration
    // ──────────────────────────────────────────────

    pub(crate) fn parse_integration(&mut self) -> Result<IntegrationSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Integration)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = IntegrationSpec {
            loc,
            name,
            title,
            services: Vec::new(),
            foreign_models: Vec::new(),
            actions: Vec::new(),
            syncs: Vec::new(),
        };

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Uses) => {
                    p.advance();
                    if p.eat_kw(Keyword::Service) {
                        spec.services.extend(p.identifier_list()?);
                    } else if p.eat_word("foreign") {
                        spec.foreign_models.extend(p.identifier_list()?);
                    } else {
                        return Err(p.unexpected("'service' or 'foreign'"));
                    }
                    p.end_statement()?;
                }
                Some(Keyword::Action) => {
                    p.advance();
                    let tok = p.current().clone();
                    let action = p.parse_integration_action()?;
                    if spec.get_action(&action.name).is_some() {
                        return Err(p.err_at(&tok, format!("duplicate action '{}'", action.name)));
                    }
                    spec.actions.push(action);
                }
                Some(Keyword::Sync) => {
                    p.advance();
                    let sync = p.parse_integration_sync()?;
                    spec.syncs.push(sync);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(spec)
    }

    /// `service[.operation]`
    fn parse_service_call(&mut self) -> Result<(String, Option<String>), ParseError> {
        let service = self.expect_identifier()?;
        let operation = if self.eat(TokenKind::Dot) {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        Ok((service, operation))
    }

    fn parse_integration_action(&mut self) -> Result<IntegrationAction, ParseError> {
        let loc = self.loc();
        let name = self.expect_identifier()?;
        let mut when_surface = None;
        let mut when_event = None;
        let mut call = None;
        let mut mapping = Vec::new();
        let mut response = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::When) => {
                    p.advance();
                    p.expect_kw(Keyword::Surface)?;
                    when_surface = Some(p.expect_identifier()?);
                    if p.current().is_word() {
                        when_event = Some(p.expect_word()?);
                    }
                    p.end_statement()?;
                }
                Some(Keyword::Call) => {
                    p.advance();
                    call = Some(p.parse_service_call()?);
                    p.end_statement()?;
                }
                Some(Keyword::Mapping) => {
                    p.advance();
                    mapping = p.parse_mapping_rules()?;
                }
                Some(Keyword::Response) => {
                    p.advance();
                    let foreign_model = p.expect_identifier()?;
                    p.expect_kw(Keyword::Into)?;
                    let entity = p.expect_identifier()?;
                    let rules = p.parse_mapping_rules()?;
                    response = Some(ResponseMapping {
                        foreign_model,
                        entity,
                        rules,
                    });
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let (call_service, call_operation) =
            call.ok_or_else(|| Parser::missing("action", &name, "call", &loc))?;
        Ok(IntegrationAction {
            name,
            when_surface,
            when_event,
            call_service,
            call_operation,
            mapping,
            response,
        })
    }

    /// Block of `target <- source.path` lines.
    fn parse_mapping_rules(&mut self) -> Result<Vec<MappingRule>, ParseError> {
        let mut rules = Vec::new();
        self.block(|p| {
            let target = p.expect_identifier()?;
            p.expect(TokenKind::LArrow)?;
            let source = p.parse_field_path()?;
            p.end_statement()?;
            rules.push(MappingRule { target, source });
            Ok(())
        })?;
        Ok(rules)
    }

    fn parse_integration_sync(&mut self) -> Result<IntegrationSync, ParseError> {
        let loc = self.loc();
        let name = self.expect_identifier()?;
        let mut mode = SyncMode::EventDriven;
        let mut from = None;
        let mut from_foreign_model = None;
        let mut into_entity = None;
        let mut match_rules = Vec::new();

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Mode) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    if p.eat_word("scheduled") {
                        mode = SyncMode::Scheduled { cron: p.opt_string() };
                    } else if p.eat_word("event_driven") {
                        mode = SyncMode::EventDriven;
                    } else {
                        return Err(p.unexpected("'scheduled' or 'event_driven'"));
                    }
                    p.end_statement()?;
                }
                Some(Keyword::From) => {
                    p.advance();
                    from = Some(p.parse_service_call()?);
                    if p.eat_kw(Keyword::As) {
                        from_foreign_model = Some(p.expect_identifier()?);
                    }
                    p.end_statement()?;
                }
                Some(Keyword::Into) => {
                    p.advance();
                    into_entity = Some(p.expect_identifier()?);
                    p.end_statement()?;
                }
                Some(Keyword::Match) => {
                    p.advance();
                    p.expect_kw(Keyword::Rules)?;
                    p.block(|p| {
                        let foreign_field = p.expect_identifier()?;
                        p.expect(TokenKind::BiArrow)?;
                        let entity_field = p.expect_identifier()?;
                        p.end_statement()?;
                        match_rules.push(MatchRule {
                            foreign_field,
                            entity_field,
                        });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let (from_service, from_operation) =
            from.ok_or_else(|| Parser::missing("sync", &name, "from", &loc))?;
        let into_entity = into_entity.ok_or_else(|| Parser::missing("sync", &name, "into", &loc))?;
        Ok(IntegrationSync {
            name,
            mode,
            from_service,
            from_operation,
            from_foreign_model,
            into_entity,
            match_rules,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "svc.dsl").expect("parse").fragment
    }

    #[test]
    fn external_api_service() {
        let f = fragment(
            r#"service stripe "Stripe":
  spec: url "https://stripe.example/openapi.json"
  auth_profile: oauth2 scopes="charges" audience=payments
  owner: "payments-team"
"#,
        );
        let s = &f.services[0];
        assert!(!s.is_domain());
        match &s.body {
            ServiceBody::Api {
                spec,
                auth_profile,
                owner,
            } => {
                assert_eq!(
                    spec,
                    &Some(ApiSpecSource::Url("https://stripe.example/openapi.json".into()))
                );
                let auth = auth_profile.as_ref().unwrap();
                assert_eq!(auth.kind, "oauth2");
                assert_eq!(
                    auth.options,
                    vec![
                        ("scopes".to_string(), "charges".to_string()),
                        ("audience".to_string(), "payments".to_string())
                    ]
                );
                assert_eq!(owner.as_deref(), Some("payments-team"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn domain_service() {
        let f = fragment(
            r#"service calculate_tax:
  kind: domain_logic
  input:
    amount: decimal(10,2) required
    region: str
  output:
    tax: decimal(10,2)
  guarantees:
    - "Never negative"
    - "Rounded to cents"
  stub: python
"#,
        );
        match &f.services[0].body {
            ServiceBody::Domain {
                kind,
                inputs,
                outputs,
                guarantees,
                stub,
            } => {
                assert_eq!(*kind, DomainServiceKind::DomainLogic);
                assert_eq!(inputs.len(), 2);
                assert_eq!(outputs[0].name, "tax");
                assert_eq!(guarantees.len(), 2);
                assert_eq!(stub.as_deref(), Some("python"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn domain_service_needs_kind() {
        let err = parse_module("service s:\n  input:\n    x: int\n", "s.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'kind'"));
    }

    #[test]
    fn foreign_model() {
        let f = fragment(
            r#"foreign_model StripeCustomer from stripe "Customer":
  key: id
  constraint read_only
  constraint event_driven
  id: str required
  email: email
"#,
        );
        let fm = &f.foreign_models[0];
        assert_eq!(fm.service, "stripe");
        assert_eq!(fm.title.as_deref(), Some("Customer"));
        assert_eq!(fm.key_fields, vec!["id"]);
        assert_eq!(
            fm.constraints,
            vec![ForeignConstraint::ReadOnly, ForeignConstraint::EventDriven]
        );
        assert_eq!(fm.fields.len(), 2);
    }

    #[test]
    fn integration_actions_and_syncs() {
        let f = fragment(
            r#"integration billing "Billing":
  uses service stripe
  uses foreign StripeCustomer, StripeCharge
  action charge:
    when surface checkout submitted
    call stripe.create_charge
    mapping:
      amount <- order.total
      customer <- order.customer.external_id
    response StripeCharge into Payment:
      charge_id <- id
  sync customers:
    mode: scheduled "0 * * * *"
    from stripe.list_customers as StripeCustomer
    into Customer
    match rules:
      email <-> email
"#,
        );
        let i = &f.integrations[0];
        assert_eq!(i.services, vec!["stripe"]);
        assert_eq!(i.foreign_models.len(), 2);
        let a = i.get_action("charge").unwrap();
        assert_eq!(a.when_surface.as_deref(), Some("checkout"));
        assert_eq!(a.when_event.as_deref(), Some("submitted"));
        assert_eq!(a.call_service, "stripe");
        assert_eq!(a.call_operation.as_deref(), Some("create_charge"));
        assert_eq!(a.mapping[1].source.to_string(), "order.customer.external_id");
        assert_eq!(a.response.as_ref().unwrap().entity, "Payment");
        let s = &i.syncs[0];
        assert_eq!(s.mode, SyncMode::Scheduled { cron: Some("0 * * * *".into()) });
        assert_eq!(s.from_foreign_model.as_deref(), Some("StripeCustomer"));
        assert_eq!(s.into_entity, "Customer");
        assert_eq!(s.match_rules[0].foreign_field, "email");
    }

    #[test]
    fn action_requires_call() {
        let err = parse_module("integration i:\n  action a:\n    when surface s\n", "i.dsl")
            .unwrap_err();
        assert!(err.message.contains("action 'a' is missing required 'call'"));
    }
}
