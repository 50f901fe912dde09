use thiserror::Error;
use uuid::Uuid;

/// Fatal failures that abort one logical unit of work (a conversation's
/// segmentation, an aspect's centroid, a view's drafting)
#[derive(Error, Debug)]
pub enum QuotesError {
  #[error("Language model refused the request: {message}")]
  Refusal { message: String },

  #[error("Sentence splitter returned {parts} usable parts, expected 2")]
  SplitFailed { parts: usize },

  #[error("{kind} {id} not found")]
  MissingEntity { kind: &'static str, id: Uuid },

  #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Invalid configuration: {message}")]
  InvalidConfig { message: String },

  #[error("{service} request failed: {message}")]
  Transport { service: &'static str, message: String },
}

impl QuotesError {
  pub fn refusal(message: impl Into<String>) -> Self {
    Self::Refusal { message: message.into() }
  }

  pub fn missing(kind: &'static str, id: Uuid) -> Self {
    Self::MissingEntity { kind, id }
  }

  pub fn invalid_config(message: impl Into<String>) -> Self {
    Self::InvalidConfig { message: message.into() }
  }

  pub fn transport(service: &'static str, message: impl Into<String>) -> Self {
    Self::Transport { service, message: message.into() }
  }
}
