use super::Parser;
use crate::error::ParseError;
use crate::ir::{
    ArtifactStore, BackoffStrategy, LlmConfigSpec, LlmIntentSpec, LlmLogging, LlmModelSpec,
    LlmProvider, ModelTier, PiiAction, PiiPolicy, RateLimit, RetryPolicy,
};
use crate::keywords::Keyword;
use crate::lexer::TokenKind;

const PROVIDERS: &[(&str, LlmProvider)] = &[
    ("anthropic", LlmProvider::Anthropic),
    ("openai", LlmProvider::Openai),
    ("google", LlmProvider::Google),
    ("local", LlmProvider::Local),
];

const TIERS: &[(&str, ModelTier)] = &[
    ("fast", ModelTier::Fast),
    ("balanced", ModelTier::Balanced),
    ("quality", ModelTier::Quality),
];

const ARTIFACT_STORES: &[(&str, ArtifactStore)] = &[
    ("local", ArtifactStore::Local),
    ("s3", ArtifactStore::S3),
    ("gcs", ArtifactStore::Gcs),
];

const BACKOFF_STRATEGIES: &[(&str, BackoffStrategy)] = &[
    ("fixed", BackoffStrategy::Fixed),
    ("linear", BackoffStrategy::Linear),
    ("exponential", BackoffStrategy::Exponential),
];

const PII_ACTIONS: &[(&str, PiiAction)] = &[
    ("redact", PiiAction::Redact),
    ("reject", PiiAction::Reject),
    ("warn", PiiAction::Warn),
];

impl Parser {
    pub(crate) fn parse_llm_model(&mut self) -> Result<LlmModelSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::LlmModel)?;
        let (name, title) = self.declaration_header()?;
        let mut provider = None;
        let mut model_id = None;
        let mut tier = ModelTier::Balanced;
        let mut max_tokens = None;
        let mut cost_per_1k_input = None;
        let mut cost_per_1k_output = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Provider) => {
                    p.advance();
                    provider = Some(p.colon_choice("provider", PROVIDERS)?);
                }
                Some(Keyword::ModelId) => {
                    p.advance();
                    model_id = Some(p.colon_string()?);
                }
                Some(Keyword::Tier) => {
                    p.advance();
                    tier = p.colon_choice("model tier", TIERS)?;
                }
                Some(Keyword::MaxTokens) => {
                    p.advance();
                    max_tokens = Some(p.colon_u32()?);
                }
                Some(Keyword::CostPer1kInput) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    cost_per_1k_input = Some(p.expect_number_text()?);
                    p.end_statement()?;
                }
                Some(Keyword::CostPer1kOutput) => {
                    p.advance();
                    p.expect(TokenKind::Colon)?;
                    cost_per_1k_output = Some(p.expect_number_text()?);
                    p.end_statement()?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let provider = provider.ok_or_else(|| Parser::missing("llm_model", &name, "provider", &loc))?;
        let model_id = model_id.ok_or_else(|| Parser::missing("llm_model", &name, "model_id", &loc))?;
        Ok(LlmModelSpec {
            loc,
            name,
            title,
            provider,
            model_id,
            tier,
            max_tokens,
            cost_per_1k_input,
            cost_per_1k_output,
        })
    }

    /// The unnamed `llm_config:` block.
    pub(crate) fn parse_llm_config(&mut self) -> Result<LlmConfigSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::LlmConfig)?;
        let mut config = LlmConfigSpec {
            loc,
            default_model: None,
            artifact_store: ArtifactStore::Local,
            logging: LlmLogging::default(),
            rate_limits: Vec::new(),
        };

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::DefaultModel) => {
                    p.advance();
                    config.default_model = Some(p.colon_identifier()?);
                }
                Some(Keyword::ArtifactStore) => {
                    p.advance();
                    config.artifact_store = p.colon_choice("artifact store", ARTIFACT_STORES)?;
                }
                Some(Keyword::Logging) => {
                    p.advance();
                    p.block(|p| {
                        if p.eat_word("log_prompts") {
                            config.logging.log_prompts = p.colon_bool()?;
                        } else if p.eat_word("log_completions") {
                            config.logging.log_completions = p.colon_bool()?;
                        } else if p.eat_word("redact_pii") {
                            config.logging.redact_pii = p.colon_bool()?;
                        } else {
                            p.skip_statement();
                        }
                        Ok(())
                    })?;
                }
                Some(Keyword::RateLimits) => {
                    p.advance();
                    p.block(|p| {
                        let model = p.expect_identifier()?;
                        let per_minute = p.colon_u32()?;
                        config.rate_limits.push(RateLimit { model, per_minute });
                        Ok(())
                    })?;
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        Ok(config)
    }

    pub(crate) fn parse_llm_intent(&mut self) -> Result<LlmIntentSpec, ParseError> {
        let loc = self.loc();
        self.expect_kw(Keyword::LlmIntent)?;
        let (name, title) = self.declaration_header()?;
        let mut model = None;
        let mut prompt = None;
        let mut output_schema = None;
        let mut timeout = None;
        let mut retry = None;
        let mut pii = None;

        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::Model) => {
                    p.advance();
                    model = Some(p.colon_identifier()?);
                }
                Some(Keyword::Prompt) => {
                    p.advance();
                    prompt = Some(p.colon_string()?);
                }
                Some(Keyword::OutputSchema) => {
                    p.advance();
                    output_schema = Some(p.colon_identifier()?);
                }
                Some(Keyword::Timeout) => {
                    p.advance();
                    timeout = Some(p.colon_duration()?);
                }
                Some(Keyword::Retry) => {
                    p.advance();
                    retry = Some(p.parse_retry_policy()?);
                }
                Some(Keyword::Pii) => {
                    p.advance();
                    let mut policy = PiiPolicy {
                        scan: true,
                        action: PiiAction::Redact,
                    };
                    p.block(|p| {
                        if p.eat_word("scan") {
                            policy.scan = p.colon_bool()?;
                        } else if p.eat_kw(Keyword::Action) {
                            policy.action = p.colon_choice("pii action", PII_ACTIONS)?;
                        } else {
                            p.skip_statement();
                        }
                        Ok(())
                    })?;
                    pii = Some(policy);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;

        let prompt = prompt.ok_or_else(|| Parser::missing("llm_intent", &name, "prompt", &loc))?;
        Ok(LlmIntentSpec {
            loc,
            name,
            title,
            model,
            prompt,
            output_schema,
            timeout,
            retry,
            pii,
        })
    }

    /// `retry:` block with `max_attempts`, `backoff`, `initial_delay`.
    /// Unset keys keep the default policy's values.
    pub(crate) fn parse_retry_policy(&mut self) -> Result<RetryPolicy, ParseError> {
        let mut policy = RetryPolicy::default();
        self.block(|p| {
            match p.current_keyword() {
                Some(Keyword::MaxAttempts) => {
                    p.advance();
                    policy.max_attempts = p.colon_u32()?;
                }
                Some(Keyword::Backoff) => {
                    p.advance();
                    policy.backoff = p.colon_choice("backoff strategy", BACKOFF_STRATEGIES)?;
                }
                Some(Keyword::InitialDelay) => {
                    p.advance();
                    policy.initial_delay = Some(p.colon_duration()?);
                }
                _ => p.skip_statement(),
            }
            Ok(())
        })?;
        if policy.max_attempts == 0 {
            return Err(self.err("retry max_attempts must be at least 1"));
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::*;
    use crate::parser::parse_module;

    fn fragment(src: &str) -> Fragment {
        parse_module(src, "llm.dsl").expect("parse").fragment
    }

    #[test]
    fn model_config_and_intent() {
        let f = fragment(
            r#"llm_model fast_model "Fast":
  provider: anthropic
  model_id: "claude-3-haiku"
  tier: fast
  max_tokens: 4096
  cost_per_1k_input: 0.00025
  cost_per_1k_output: 0.00125

llm_config:
  default_model: fast_model
  artifact_store: s3
  logging:
    log_prompts: true
    redact_pii: true
  rate_limits:
    fast_model: 60

llm_intent summarize "Summarize":
  model: fast_model
  prompt: "Summarize the ticket"
  output_schema: Summary
  timeout: 30s
  retry:
    max_attempts: 5
    backoff: linear
    initial_delay: 1s
  pii:
    action: reject
"#,
        );
        let m = &f.llm_models[0];
        assert_eq!(m.provider, LlmProvider::Anthropic);
        assert_eq!(m.tier, ModelTier::Fast);
        assert_eq!(m.max_tokens, Some(4096));
        assert_eq!(m.cost_per_1k_input.as_deref(), Some("0.00025"));

        let c = f.llm_config.as_ref().unwrap();
        assert_eq!(c.default_model.as_deref(), Some("fast_model"));
        assert_eq!(c.artifact_store, ArtifactStore::S3);
        assert!(c.logging.log_prompts);
        assert!(!c.logging.log_completions);
        assert_eq!(c.rate_limits, vec![RateLimit { model: "fast_model".into(), per_minute: 60 }]);

        let i = &f.llm_intents[0];
        assert_eq!(i.model.as_deref(), Some("fast_model"));
        assert_eq!(i.timeout, Some(Duration::new(30, DurationUnit::Seconds)));
        let retry = i.retry.as_ref().unwrap();
        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.backoff, BackoffStrategy::Linear);
        let pii = i.pii.as_ref().unwrap();
        assert!(pii.scan);
        assert_eq!(pii.action, PiiAction::Reject);
    }

    #[test]
    fn model_requires_provider() {
        let err = parse_module("llm_model m:\n  model_id: \"x\"\n", "l.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'provider'"));
    }

    #[test]
    fn intent_requires_prompt() {
        let err = parse_module("llm_intent i:\n  model: m\n", "l.dsl").unwrap_err();
        assert!(err.message.contains("missing required 'prompt'"));
    }

    #[test]
    fn zero_retry_attempts() {
        let err = parse_module(
            "llm_intent i:\n  prompt: \"p\"\n  retry:\n    max_attempts: 0\n",
            "l.dsl",
        )
        .unwrap_err();
        assert!(err.message.contains("at least 1"));
    }
}
