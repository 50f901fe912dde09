use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// JSON schema a structured completion must conform to
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredSchema {
  pub name: String,
  pub schema: Value,
}

/// Outcome of a structured completion
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
  Content(Value),
  Refusal(String),
}

/// Prompt-in, text-out model access
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LanguageModel: Send + Sync {
  /// Free-text completion
  async fn complete(&self, prompt: &str) -> Result<String>;

  /// Completion constrained to `schema`
  async fn complete_structured(&self, prompt: &str, schema: &StructuredSchema)
    -> Result<Completion>;
}
