//! PII redaction applied to every transcript before segmentation

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

#[async_trait]
pub trait Redactor: Send + Sync {
  async fn redact(&self, text: &str) -> Result<String>;
}

/// Passes text through untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRedactor;

#[async_trait]
impl Redactor for NoopRedactor {
  async fn redact(&self, text: &str) -> Result<String> {
    Ok(text.to_string())
  }
}

/// Masks e-mail addresses, URLs and phone numbers with typed placeholders
pub struct PatternRedactor {
  patterns: Vec<(Regex, &'static str)>,
}

impl PatternRedactor {
  pub fn new() -> Result<Self> {
    // Order matters: e-mail before URL so "x@y.com" is not half-matched as a host
    let patterns = vec![
      (Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?, "<redacted:email>"),
      (Regex::new(r"(?i)\bhttps?://[^\s]+|\bwww\.[^\s]+")?, "<redacted:url>"),
      (Regex::new(r"\+?\d[\d\s().-]{7,}\d")?, "<redacted:phone>"),
    ];
    Ok(Self { patterns })
  }

  fn apply(&self, text: &str) -> String {
    self
      .patterns
      .iter()
      .fold(text.to_string(), |acc, (pattern, placeholder)| {
        pattern.replace_all(&acc, *placeholder).into_owned()
      })
  }
}

#[async_trait]
impl Redactor for PatternRedactor {
  async fn redact(&self, text: &str) -> Result<String> {
    Ok(self.apply(text))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_noop_redactor() {
    assert_eq!(NoopRedactor.redact("call me maybe").await.unwrap(), "call me maybe");
  }

  #[tokio::test]
  async fn test_pattern_redactor_masks_contact_details() {
    let redactor = PatternRedactor::new().unwrap();
    let redacted = redactor
      .redact("Mail jan@example.org or call +31 6 1234 5678, see https://example.org/x.")
      .await
      .unwrap();

    assert_eq!(
      redacted,
      "Mail <redacted:email> or call <redacted:phone>, see <redacted:url>"
    );
  }

  #[tokio::test]
  async fn test_pattern_redactor_leaves_plain_numbers() {
    let redactor = PatternRedactor::new().unwrap();
    let text = "We had 42 participants in 2023.";
    assert_eq!(redactor.redact(text).await.unwrap(), text);
  }
}
