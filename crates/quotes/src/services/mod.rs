//! Collaborator seams and their reference implementations
//!
//! The engine never talks to a database, a model host or a tokenizer
//! directly; it goes through the traits re-exported here, bundled in
//! [`Services`].

pub mod embeddings;
pub mod llm;
pub mod memory;
pub mod openai;
pub mod redaction;
pub mod store;
pub mod tokens;

use std::sync::Arc;

pub use embeddings::Embedder;
pub use llm::{Completion, LanguageModel, StructuredSchema};
pub use memory::MemoryStore;
pub use openai::OpenAiClient;
pub use redaction::{NoopRedactor, PatternRedactor, Redactor};
pub use store::{DistanceMetric, QuoteStore, QuoteTx};
pub use tokens::{ApproxTokenCounter, TokenCounter};

/// Every collaborator an engine call may reach for
#[derive(Clone)]
pub struct Services {
  pub store: Arc<dyn QuoteStore>,
  pub embedder: Arc<dyn Embedder>,
  pub llm: Arc<dyn LanguageModel>,
  pub tokens: Arc<dyn TokenCounter>,
  pub redactor: Arc<dyn Redactor>,
}

impl Services {
  /// Bundle with the approximate token counter and no redaction
  pub fn new(
    store: Arc<dyn QuoteStore>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
  ) -> Self {
    Self {
      store,
      embedder,
      llm,
      tokens: Arc::new(ApproxTokenCounter),
      redactor: Arc::new(NoopRedactor),
    }
  }

  pub fn with_tokens(mut self, tokens: Arc<dyn TokenCounter>) -> Self {
    self.tokens = tokens;
    self
  }

  pub fn with_redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
    self.redactor = redactor;
    self
  }
}
