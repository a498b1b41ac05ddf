//! `policies`, `tenancy`, `interfaces` and `data_products` sections.

use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    AccessOperation, ApiAuth, ApiExposure, ApiInterfaceSpec, ApiStyle, Classification,
    DataClassification, DataProductSpec, ErasureMode, ErasurePolicy, IsolationLevel,
    PoliciesSpec, Provisioning, RefreshCadence, TenancyMode, TenancySpec,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const CLASSIFICATIONS: &[(&str, DataClassification)] = &[
    ("pii_direct", DataClassification::PiiDirect),
    ("pii_indirect", DataClassification::PiiIndirect),
    ("pii_sensitive", DataClassification::PiiSensitive),
    ("financial", DataClassification::Financial),
    ("health", DataClassification::Health),
    ("confidential", DataClassification::Confidential),
    ("public", DataClassification::Public),
];

const ERASURE_MODES: &[(&str, ErasureMode)] = &[
    ("delete", ErasureMode::Delete),
    ("anonymize", ErasureMode::Anonymize),
    ("retain", ErasureMode::Retain),
];

const TENANCY_MODES: &[(&str, TenancyMode)] = &[
    ("shared_schema", TenancyMode::SharedSchema),
    ("schema_per_tenant", TenancyMode::SchemaPerTenant),
    ("database_per_tenant", TenancyMode::DatabasePerTenant),
];

const ISOLATION_LEVELS: &[(&str, IsolationLevel)] = &[
    ("strict", IsolationLevel::Strict),
    ("relaxed", IsolationLevel::Relaxed),
];

const PROVISIONING: &[(&str, Provisioning)] =
    &[("auto", Provisioning::Auto), ("manual", Provisioning::Manual)];

const API_STYLES: &[(&str, ApiStyle)] = &[
    ("rest", ApiStyle::Rest),
    ("graphql", ApiStyle::Graphql),
    ("grpc", ApiStyle::Grpc),
];

const API_AUTH: &[(&str, ApiAuth)] = &[
    ("none", ApiAuth::None),
    ("api_key", ApiAuth::ApiKey),
    ("oauth2", ApiAuth::Oauth2),
    ("jwt", ApiAuth::Jwt),
];

const REFRESH_CADENCES: &[(&str, RefreshCadence)] = &[
    ("realtime", RefreshCadence::Realtime),
    ("hourly", RefreshCadence::Hourly),
    ("daily", RefreshCadence::Daily),
    ("weekly", RefreshCadence::Weekly),
];

impl Parser {
    /// ```text
    /// policies:
    ///   classify Customer.email as pii_direct
    ///   erasure Customer: anonymize
    ///   default_retention: 7y
    ///   audit_access: true
    /// ```
    pub(crate) fn parse_policies(&mut self) -> Result<PoliciesSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Policies)?;
        let mut spec = PoliciesSpec {
            loc,
            classifications: Vec::new(),
            erasures: Vec::new(),
            default_retention: None,
            audit_access: false,
        };
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Classify) => {
                    p.advance();
                    let entity = p.expect_identifier()?;
                    p.expect(TokenKind::Dot)?;
                    let field = p.expect_identifier()?;
                    p.expect_kw(Keyword::As)?;
                    let classification = p.expect_choice("classification", CLASSIFICATIONS)?;
                    p.end_statement()?;
                    spec.classifications.push(Classification {
                        entity,
                        field,
                        classification,
                    });
                }
                Some(Keyword::Erasure) => {
                    p.advance();
                    let entity = p.expect_identifier()?;
                    let mode = p.colon_choice("erasure mode", ERASURE_MODES)?;
                    spec.erasures.push(ErasurePolicy { entity, mode });
                }
                Some(Keyword::DefaultRetention) => {
                    p.advance();
                    spec.default_retention = Some(p.colon_duration()?);
                }
                Some(Keyword::AuditAccess) => {
                    p.advance();
                    spec.audit_access = p.colon_bool()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(spec)
    }

    /// `mode` is required; isolation defaults to strict and provisioning
    /// to auto.
    pub(crate) fn parse_tenancy(&mut self) -> Result<TenancySpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Tenancy)?;
        let mut mode = None;
        let mut isolation = IsolationLevel::Strict;
        let mut provisioning = Provisioning::Auto;
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Mode) => {
                    p.advance();
                    mode = Some(p.colon_choice("tenancy mode", TENANCY_MODES)?);
                }
                Some(Keyword::Isolation) => {
                    p.advance();
                    isolation = p.colon_choice("isolation level", ISOLATION_LEVELS)?;
                }
                Some(Keyword::Provisioning) => {
                    p.advance();
                    provisioning = p.colon_choice("provisioning", PROVISIONING)?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        let mode = mode.ok_or_else(|| ParseError::new(loc.clone(), "tenancy is missing required 'mode'"))?;
        Ok(TenancySpec {
            loc,
            mode,
            isolation,
            provisioning,
        })
    }

    /// `interfaces:` holding `api name ["Title"]:` blocks.
    pub(crate) fn parse_interfaces(&mut self) -> Result<Vec<ApiInterfaceSpec>, ParseError> {
        self.expect_kw(Keyword::Interfaces)?;
        let mut apis: Vec<ApiInterfaceSpec> = Vec::new();
        self.block(|p| {
            if p.at_kw(Keyword::Api) {
                let api = p.parse_api()?;
                apis.push(api);
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        Ok(apis)
    }

    fn parse_api(&mut self) -> Result<ApiInterfaceSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::Api)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = ApiInterfaceSpec {
            loc,
            name,
            title,
            style: ApiStyle::Rest,
            version: None,
            auth: ApiAuth::None,
            exposes: Vec::new(),
            rate_limit: None,
        };
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Style) => {
                    p.advance();
                    spec.style = p.colon_choice("api style", API_STYLES)?;
                }
                Some(Keyword::Version) => {
                    p.advance();
                    spec.version = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::Auth) => {
                    p.advance();
                    spec.auth = p.colon_choice("api auth", API_AUTH)?;
                }
                Some(Keyword::Expose) => {
                    p.advance();
                    let entity = p.expect_identifier()?;
                    p.expect(TokenKind::Colon)?;
                    let operations = p.parse_operation_list()?;
                    p.end_statement()?;
                    spec.exposes.push(ApiExposure { entity, operations });
                }
                Some(Keyword::RateLimit) => {
                    p.advance();
                    spec.rate_limit = Some(p.colon_u32()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(spec)
    }

    /// `[list, read, write]` or a bare list; `write` expands.
    fn parse_operation_list(&mut self) -> Result<Vec<AccessOperation>, ParseError> {
        let bracketed = self.eat(TokenKind::LBracket);
        let mut operations: Vec<AccessOperation> = Vec::new();
        loop {
            for op in self.parse_access_operation()? {
                if !operations.contains(&op) {
                    operations.push(op);
                }
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        if bracketed {
            self.expect(TokenKind::RBracket)?;
        }
        Ok(operations)
    }

    /// `data_products:` holding `data_product name ["Title"]:` blocks.
    pub(crate) fn parse_data_products(&mut self) -> Result<Vec<DataProductSpec>, ParseError> {
        self.expect_kw(Keyword::DataProducts)?;
        let mut products: Vec<DataProductSpec> = Vec::new();
        self.block(|p| {
            if p.at_kw(Keyword::DataProduct) {
                let product = p.parse_data_product()?;
                products.push(product);
            } else {
                p.skip_statement();
            }
            Ok(())
        })?;
        Ok(products)
    }

    fn parse_data_product(&mut self) -> Result<DataProductSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::DataProduct)?;
        let (name, title) = self.declaration_header()?;
        let mut spec = DataProductSpec {
            loc,
            name,
            title,
            sources: Vec::new(),
            refresh: RefreshCadence::Daily,
            output: None,
            classification_filter: Vec::new(),
            owner: None,
        };
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Source) => {
                    p.advance();
                    spec.sources = p.colon_identifier_list()?;
                }
                Some(Keyword::Refresh) => {
                    p.advance();
                    spec.refresh = p.colon_choice("refresh cadence", REFRESH_CADENCES)?;
                }
                Some(Keyword::Output) => {
                    p.advance();
                    spec.output = Some(p.colon_name_or_string()?);
                }
                Some(Keyword::ClassificationFilter) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    let bracketed = p.eat(TokenKind::LBracket);
                    loop {
                        let c = p.expect_choice("classification", CLASSIFICATIONS)?;
                        spec.classification_filter.push(c);
                        if !p.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    if bracketed {
                        p.expect(TokenKind::RBracket)?;
                    }
                    p.end_statement()?;
                }
                Some(Keyword::Owner) => {
                    p.advance();
                    spec.owner = Some(p.colon_name_or_string()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        if spec.sources.is_empty() {
            return Err(Parser::missing("data_product", &spec.name, "source", &spec.loc));
        }
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "g.dsl").expect("parse").fragment
    }

    #[test]
    fn policies_section() {
        let f = fragment(
            r#"policies:
  classify Customer.email as pii_direct
  classify Order.total as financial
  erasure Customer: anonymize
  default_retention: 7y
  audit_access: true
"#,
        );
        let p = f.policies.unwrap();
        assert_eq!(p.classifications.len(), 2);
        assert_eq!(p.classifications[0].field, "email");
        assert_eq!(p.classifications[1].classification, DataClassification::Financial);
        assert_eq!(
            p.erasures,
            vec![ErasurePolicy { entity: "Customer".into(), mode: ErasureMode::Anonymize }]
        );
        assert_eq!(p.default_retention, Some(Duration::new(7, DurationUnit::Years)));
        assert!(p.audit_access);
    }

    #[test]
    fn tenancy_defaults() {
        let t = fragment("tenancy:\n  mode: schema_per_tenant\n").tenancy.unwrap();
        assert_eq!(t.mode, TenancyMode::SchemaPerTenant);
        assert_eq!(t.isolation, IsolationLevel::Strict);
        assert_eq!(t.provisioning, Provisioning::Auto);
    }

    #[test]
    fn tenancy_requires_mode() {
        let err = parse_module("tenancy:\n  isolation: relaxed\n", "g.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'mode'"));
    }

    #[test]
    fn interfaces_fold_into_apis() {
        let f = fragment(
            r#"interfaces:
  api public_api "Public API":
    style: graphql
    version: "v2"
    auth: oauth2
    expose Task: [list, read]
    expose Comment: write
    rate_limit: 100
  api internal:
    auth: jwt
"#,
        );
        assert_eq!(f.apis.len(), 2);
        let api = &f.apis[0];
        assert_eq!(api.style, ApiStyle::Graphql);
        assert_eq!(api.version.as_deref(), Some("v2"));
        assert_eq!(api.exposes[0].operations, vec![AccessOperation::List, AccessOperation::Read]);
        assert_eq!(api.exposes[1].operations.len(), 3);
        assert_eq!(api.rate_limit, Some(100));
        assert_eq!(f.apis[1].style, ApiStyle::Rest);
    }

    #[test]
    fn data_products() {
        let f = fragment(
            r#"data_products:
  data_product sales "Sales summary":
    source: Order, Customer
    refresh: hourly
    output: "warehouse.sales"
    classification_filter: [pii_direct, pii_sensitive]
    owner: analytics
"#,
        );
        let d = &f.data_products[0];
        assert_eq!(d.sources, vec!["Order", "Customer"]);
        assert_eq!(d.refresh, RefreshCadence::Hourly);
        assert_eq!(d.classification_filter.len(), 2);
        assert_eq!(d.owner.as_deref(), Some("analytics"));
    }
}
