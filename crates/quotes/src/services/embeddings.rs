use anyhow::Result;
use async_trait::async_trait;

/// Text to fixed-dimension vector. Retries and backoff belong to the
/// implementation; the engine treats any error as fatal for the current unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
