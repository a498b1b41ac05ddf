//! The DSL keyword table.
//!
//! Every keyword is declared exactly once in the `keywords!` invocation
//! below. The lexer uses [`Keyword::lookup`] to classify words and the
//! parser uses [`Keyword::usable_as_identifier`] to decide whether a
//! keyword may stand in for a name, so the two can never diverge.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! keywords {
    (
        reserved { $($r_variant:ident = $r_text:literal,)* }
        contextual { $($c_variant:ident = $c_text:literal,)* }
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum Keyword {
            $($r_variant,)*
            $($c_variant,)*
        }

        impl Keyword {
            pub const ALL: &'static [Keyword] = &[
                $(Keyword::$r_variant,)*
                $(Keyword::$c_variant,)*
            ];

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Keyword::$r_variant => $r_text,)*
                    $(Keyword::$c_variant => $c_text,)*
                }
            }

            pub fn lookup(text: &str) -> Option<Keyword> {
                match text {
                    $($r_text => Some(Keyword::$r_variant),)*
                    $($c_text => Some(Keyword::$c_variant),)*
                    _ => None,
                }
            }

            /// Contextual keywords may double as field, enum-value or
            /// declaration names; reserved ones may not.
            pub fn usable_as_identifier(self) -> bool {
                !matches!(self, $(Keyword::$r_variant)|*)
            }
        }
    };
}

keywords! {
    reserved {
        Module = "module",
        Use = "use",
        App = "app",
        Entity = "entity",
        Archetype = "archetype",
        Surface = "surface",
        Workspace = "workspace",
        Experience = "experience",
        ForeignModel = "foreign_model",
        Integration = "integration",
        Persona = "persona",
        Scenario = "scenario",
        LlmModel = "llm_model",
        LlmConfig = "llm_config",
        LlmIntent = "llm_intent",
        Ledger = "ledger",
        Process = "process",
        Schedule = "schedule",
        Stream = "stream",
        Policies = "policies",
        Tenancy = "tenancy",
        Interfaces = "interfaces",
        DataProducts = "data_products",
        Approval = "approval",
        Sla = "sla",
        Webhook = "webhook",
        And = "and",
        Or = "or",
        Not = "not",
        True = "true",
        False = "false",
        Null = "null",
    }
    contextual {
        // declarations that commonly double as names
        Enum = "enum",
        Service = "service",
        Test = "test",
        Flow = "flow",
        Story = "story",
        Transaction = "transaction",
        View = "view",
        // header / app
        As = "as",
        Description = "description",
        MultiTenant = "multi_tenant",
        AuditTrail = "audit_trail",
        SecurityProfile = "security_profile",
        // entity body
        Extends = "extends",
        Computed = "computed",
        Invariant = "invariant",
        Message = "message",
        Code = "code",
        Unique = "unique",
        Index = "index",
        Transitions = "transitions",
        Access = "access",
        Permit = "permit",
        Forbid = "forbid",
        SoftDelete = "soft_delete",
        Intent = "intent",
        Domain = "domain",
        Patterns = "patterns",
        DisplayField = "display_field",
        Requires = "requires",
        Role = "role",
        Auto = "auto",
        After = "after",
        Manual = "manual",
        Guard = "guard",
        Read = "read",
        Write = "write",
        Create = "create",
        Update = "update",
        Delete = "delete",
        List = "list",
        // field types and modifiers
        Str = "str",
        Text = "text",
        Int = "int",
        Float = "float",
        Decimal = "decimal",
        Bool = "bool",
        Date = "date",
        Datetime = "datetime",
        Time = "time",
        Uuid = "uuid",
        Email = "email",
        Url = "url",
        Phone = "phone",
        Json = "json",
        Money = "money",
        File = "file",
        Image = "image",
        Timezone = "timezone",
        Ref = "ref",
        HasMany = "has_many",
        HasOne = "has_one",
        BelongsTo = "belongs_to",
        Embeds = "embeds",
        Via = "via",
        Cascade = "cascade",
        Restrict = "restrict",
        Nullify = "nullify",
        Readonly = "readonly",
        Required = "required",
        Optional = "optional",
        Pk = "pk",
        AutoAdd = "auto_add",
        AutoUpdate = "auto_update",
        Sensitive = "sensitive",
        // expressions
        In = "in",
        Is = "is",
        Today = "today",
        Now = "now",
        Count = "count",
        Sum = "sum",
        Avg = "avg",
        Min = "min",
        Max = "max",
        DaysUntil = "days_until",
        DaysSince = "days_since",
        // surfaces and workspaces
        Uses = "uses",
        Mode = "mode",
        Section = "section",
        Field = "field",
        Action = "action",
        On = "on",
        Ux = "ux",
        Purpose = "purpose",
        Sort = "sort",
        Filter = "filter",
        Search = "search",
        Empty = "empty",
        Attention = "attention",
        When = "when",
        For = "for",
        Scope = "scope",
        Hide = "hide",
        Show = "show",
        ShowAggregate = "show_aggregate",
        ActionPrimary = "action_primary",
        ReadOnly = "read_only",
        Priority = "priority",
        RequireAuth = "require_auth",
        AllowPersonas = "allow_personas",
        DenyPersonas = "deny_personas",
        Stage = "stage",
        Source = "source",
        Limit = "limit",
        Display = "display",
        GroupBy = "group_by",
        Aggregate = "aggregate",
        // experiences
        Start = "start",
        At = "at",
        Step = "step",
        Kind = "kind",
        // services and integrations
        Spec = "spec",
        AuthProfile = "auth_profile",
        Owner = "owner",
        Input = "input",
        Output = "output",
        Guarantees = "guarantees",
        Stub = "stub",
        From = "from",
        Key = "key",
        Constraint = "constraint",
        Call = "call",
        Operation = "operation",
        Mapping = "mapping",
        Response = "response",
        Sync = "sync",
        Into = "into",
        Match = "match",
        Rules = "rules",
        // tests and flows
        Setup = "setup",
        Data = "data",
        Expect = "expect",
        With = "with",
        Tags = "tags",
        Preconditions = "preconditions",
        Steps = "steps",
        // personas, scenarios, stories
        Goals = "goals",
        Proficiency = "proficiency",
        DefaultWorkspace = "default_workspace",
        DefaultRoute = "default_route",
        SeedScript = "seed_script",
        StartRoute = "start_route",
        Actor = "actor",
        Trigger = "trigger",
        Given = "given",
        Then = "then",
        Unless = "unless",
        Status = "status",
        // llm
        Provider = "provider",
        ModelId = "model_id",
        Tier = "tier",
        MaxTokens = "max_tokens",
        CostPer1kInput = "cost_per_1k_input",
        CostPer1kOutput = "cost_per_1k_output",
        DefaultModel = "default_model",
        ArtifactStore = "artifact_store",
        Logging = "logging",
        RateLimits = "rate_limits",
        Model = "model",
        Prompt = "prompt",
        OutputSchema = "output_schema",
        Timeout = "timeout",
        Retry = "retry",
        MaxAttempts = "max_attempts",
        Backoff = "backoff",
        InitialDelay = "initial_delay",
        Pii = "pii",
        // ledgers
        AccountCode = "account_code",
        LedgerId = "ledger_id",
        AccountType = "account_type",
        Currency = "currency",
        Flags = "flags",
        SyncTo = "sync_to",
        TenantScoped = "tenant_scoped",
        Execution = "execution",
        Transfer = "transfer",
        Debit = "debit",
        Credit = "credit",
        Amount = "amount",
        IdempotencyKey = "idempotency_key",
        Validation = "validation",
        // processes and schedules
        Implements = "implements",
        Parallel = "parallel",
        Compensations = "compensations",
        Overlap = "overlap",
        WaitFor = "wait_for",
        HumanTask = "human_task",
        Condition = "condition",
        OnSuccess = "on_success",
        OnFailure = "on_failure",
        OnTimeout = "on_timeout",
        AssigneeRole = "assignee_role",
        Outcomes = "outcomes",
        Subprocess = "subprocess",
        Cron = "cron",
        Interval = "interval",
        CatchUp = "catch_up",
        // streams
        PartitionKey = "partition_key",
        OrderingScope = "ordering_scope",
        Retention = "retention",
        Schema = "schema",
        DerivesFrom = "derives_from",
        // governance
        Classify = "classify",
        Erasure = "erasure",
        DefaultRetention = "default_retention",
        AuditAccess = "audit_access",
        Isolation = "isolation",
        Provisioning = "provisioning",
        Api = "api",
        Expose = "expose",
        Style = "style",
        Version = "version",
        Auth = "auth",
        RateLimit = "rate_limit",
        DataProduct = "data_product",
        Refresh = "refresh",
        ClassificationFilter = "classification_filter",
        // approvals, slas, webhooks, views
        ApproverRole = "approver_role",
        Quorum = "quorum",
        EscalationRole = "escalation_role",
        StartsWhen = "starts_when",
        PausesWhen = "pauses_when",
        CompletesWhen = "completes_when",
        Tiers = "tiers",
        BusinessHours = "business_hours",
        OnBreach = "on_breach",
        Notify = "notify",
        Set = "set",
        Events = "events",
        Payload = "payload",
        Include = "include",
        Format = "format",
        Fields = "fields",
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alternative names offered when a reserved keyword is used where a
/// name is expected.
pub fn suggestions_for(keyword: Keyword) -> Vec<String> {
    let curated: &[&str] = match keyword {
        Keyword::Entity => &["entity_ref", "target_entity", "record"],
        Keyword::Surface => &["screen", "page", "surface_name"],
        Keyword::Workspace => &["work_area", "dashboard", "workspace_name"],
        Keyword::Experience => &["journey", "experience_name"],
        Keyword::Module => &["module_name", "component"],
        Keyword::Use => &["usage", "used_by"],
        Keyword::App => &["application", "app_name"],
        Keyword::Archetype => &["template", "base_type"],
        Keyword::Persona => &["persona_name", "user_type", "audience"],
        Keyword::Scenario => &["situation", "scenario_name"],
        Keyword::Process => &["procedure", "workflow", "process_name"],
        Keyword::Schedule => &["timetable", "cadence", "schedule_name"],
        Keyword::Stream => &["event_stream", "feed", "channel"],
        Keyword::Ledger => &["account_book", "ledger_name"],
        Keyword::Integration => &["connector", "integration_name"],
        Keyword::ForeignModel => &["external_model", "remote_model"],
        Keyword::Approval => &["approval_state", "sign_off"],
        Keyword::Sla => &["service_level", "deadline"],
        Keyword::Webhook => &["callback", "hook_url"],
        Keyword::Policies => &["policy_set", "rules"],
        Keyword::Tenancy => &["tenant_mode", "tenant_info"],
        Keyword::Interfaces => &["apis", "endpoints"],
        Keyword::DataProducts => &["datasets", "exports"],
        Keyword::LlmModel | Keyword::LlmConfig | Keyword::LlmIntent => {
            &["ai_model", "model_ref", "assistant"]
        }
        Keyword::And | Keyword::Or | Keyword::Not => &["flag", "condition_flag"],
        Keyword::True | Keyword::False => &["is_enabled", "flag"],
        Keyword::Null => &["empty_value", "none_value"],
        _ => &[],
    };
    if curated.is_empty() {
        let base = keyword.as_str();
        return vec![format!("{}_name", base), format!("{}_value", base)];
    }
    curated.iter().map(|s| (*s).to_owned()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn lookup_round_trips_every_keyword() {
        for kw in Keyword::ALL {
            assert_eq!(Keyword::lookup(kw.as_str()), Some(*kw));
        }
    }

    #[test]
    fn keyword_texts_are_unique() {
        let mut seen = HashSet::new();
        for kw in Keyword::ALL {
            assert!(seen.insert(kw.as_str()), "duplicate keyword text {}", kw);
        }
    }

    #[test]
    fn construct_keywords_are_reserved() {
        assert!(!Keyword::Entity.usable_as_identifier());
        assert!(!Keyword::Surface.usable_as_identifier());
        assert!(!Keyword::And.usable_as_identifier());
    }

    #[test]
    fn common_field_names_are_contextual() {
        for kw in [
            Keyword::Status,
            Keyword::Priority,
            Keyword::Email,
            Keyword::Date,
            Keyword::Source,
            Keyword::Amount,
            Keyword::Service,
            Keyword::View,
        ] {
            assert!(kw.usable_as_identifier(), "{} should be usable", kw);
        }
    }

    #[test]
    fn suggestions_are_curated_or_derived() {
        assert!(suggestions_for(Keyword::Entity).contains(&"entity_ref".to_string()));
        assert_eq!(
            suggestions_for(Keyword::Flags),
            vec!["flags_name".to_string(), "flags_value".to_string()]
        );
    }
}
