//! Configuration management for the quote engine
//!
//! Handles loading, validating, and defaulting segmentation thresholds,
//! sampling budgets, insight clustering knobs and service endpoints.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::QuotesError;

/// Env var pointing at an explicit config file
pub const CONFIG_ENV: &str = "QUOTES_CONFIG";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  #[serde(default)]
  pub segmentation: SegmentationConfig,
  #[serde(default)]
  pub sampling: SamplingConfig,
  #[serde(default)]
  pub insights: InsightConfig,
  #[serde(default)]
  pub commit_policy: CommitPolicy,
  #[serde(default)]
  pub openai: OpenAiConfig,
}

/// Word-count thresholds for turning sentences into quotes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationConfig {
  /// Sentences shorter than this are glued onto the previous buffer entry
  #[serde(default = "default_lower_words")]
  pub lower_words: usize,
  /// A buffer longer than this is emitted
  #[serde(default = "default_upper_words")]
  pub upper_words: usize,
  /// A buffer longer than this is split in two by the language model
  #[serde(default = "default_long_words")]
  pub long_words: usize,
  /// Adjacent quotes whose combined length fits are merged right-to-left
  #[serde(default = "default_backward_upper_words")]
  pub backward_upper_words: usize,
}

/// Token budget settings for representative sampling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingConfig {
  #[serde(default = "default_context_limit")]
  pub context_limit: usize,
  /// Page size used when loading a run's quote pool
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  /// Downstream token accounting under-counts; the budget is divided by this
  #[serde(default = "default_token_undercount_factor")]
  pub token_undercount_factor: usize,
}

/// K-means settings for unsupervised insight discovery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightConfig {
  /// Runs with fewer quotes skip insight generation
  #[serde(default = "default_min_quotes")]
  pub min_quotes: usize,
  /// `k = floor(quote_count / quotes_per_cluster)`
  #[serde(default = "default_quotes_per_cluster")]
  pub quotes_per_cluster: usize,
  #[serde(default = "default_max_iterations")]
  pub max_iterations: usize,
  /// Lloyd iterations stop once no centroid moves further than this
  #[serde(default = "default_tolerance")]
  pub tolerance: f32,
}

/// Transaction granularity for the assignment loops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
  /// Commit after every quote/cluster: a crash keeps the finished prefix
  #[default]
  PerItem,
  /// Commit once at the end: a crash leaves nothing behind
  WholePass,
}

/// Endpoint settings for the OpenAI-compatible collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  #[serde(default = "default_embedding_model")]
  pub embedding_model: String,
  #[serde(default = "default_completion_model")]
  pub completion_model: String,
  /// Name of the env var holding the API key, never the key itself
  #[serde(default = "default_api_key_env")]
  pub api_key_env: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

// Default threshold functions
fn default_lower_words() -> usize {
  8
}
fn default_upper_words() -> usize {
  45
}
fn default_long_words() -> usize {
  75
}
fn default_backward_upper_words() -> usize {
  35
}
fn default_context_limit() -> usize {
  100_000
}
fn default_batch_size() -> usize {
  1_000
}
fn default_token_undercount_factor() -> usize {
  2
}
fn default_min_quotes() -> usize {
  4
}
fn default_quotes_per_cluster() -> usize {
  4
}
fn default_max_iterations() -> usize {
  300
}
fn default_tolerance() -> f32 {
  1e-4
}
fn default_base_url() -> String {
  "https://api.openai.com/v1".to_string()
}
fn default_embedding_model() -> String {
  "text-embedding-3-large".to_string()
}
fn default_completion_model() -> String {
  "gpt-4o".to_string()
}
fn default_api_key_env() -> String {
  "OPENAI_API_KEY".to_string()
}
fn default_timeout_secs() -> u64 {
  120
}

impl Default for SegmentationConfig {
  fn default() -> Self {
    Self {
      lower_words: default_lower_words(),
      upper_words: default_upper_words(),
      long_words: default_long_words(),
      backward_upper_words: default_backward_upper_words(),
    }
  }
}

impl Default for SamplingConfig {
  fn default() -> Self {
    Self {
      context_limit: default_context_limit(),
      batch_size: default_batch_size(),
      token_undercount_factor: default_token_undercount_factor(),
    }
  }
}

impl Default for InsightConfig {
  fn default() -> Self {
    Self {
      min_quotes: default_min_quotes(),
      quotes_per_cluster: default_quotes_per_cluster(),
      max_iterations: default_max_iterations(),
      tolerance: default_tolerance(),
    }
  }
}

impl Default for OpenAiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      embedding_model: default_embedding_model(),
      completion_model: default_completion_model(),
      api_key_env: default_api_key_env(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

impl EngineConfig {
  /// Load configuration from a JSON or YAML file, chosen by extension
  pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let config: EngineConfig = match path.extension().and_then(|ext| ext.to_str()) {
      Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
      _ => serde_json::from_str(&content)?,
    };

    config.validate()?;
    Ok(config)
  }

  /// Load configuration from `QUOTES_CONFIG`, the working directory, the
  /// user config directory, or defaults, in that order
  pub fn load() -> Result<Self> {
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
      return Self::load_from_file(explicit);
    }

    for path in candidate_paths() {
      if path.exists() {
        bentley::verbose!(&format!("loading config from {}", path.display()));
        return Self::load_from_file(path);
      }
    }

    Ok(EngineConfig::default())
  }

  /// Save configuration as pretty JSON
  pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let content = serde_json::to_string_pretty(self)?;
    std::fs::write(path, content)?;
    Ok(())
  }

  /// Reject threshold combinations the segmenter and sampler cannot honour
  pub fn validate(&self) -> Result<()> {
    let seg = &self.segmentation;
    if seg.lower_words >= seg.upper_words {
      return Err(QuotesError::invalid_config("lower_words must be below upper_words").into());
    }
    if seg.upper_words >= seg.long_words {
      return Err(QuotesError::invalid_config("upper_words must be below long_words").into());
    }
    if self.sampling.batch_size == 0 {
      return Err(QuotesError::invalid_config("batch_size must be > 0").into());
    }
    if self.sampling.token_undercount_factor == 0 {
      return Err(QuotesError::invalid_config("token_undercount_factor must be > 0").into());
    }
    if self.insights.quotes_per_cluster == 0 {
      return Err(QuotesError::invalid_config("quotes_per_cluster must be > 0").into());
    }
    Ok(())
  }
}

fn candidate_paths() -> Vec<PathBuf> {
  let mut paths = vec![PathBuf::from("quotes.yaml"), PathBuf::from("quotes.json")];
  if let Some(config_dir) = dirs::config_dir() {
    paths.push(config_dir.join("quotes").join("config.yaml"));
  }
  paths
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::fs;
  use tempfile::TempDir;

  #[test]
  fn test_defaults() {
    let config = EngineConfig::default();
    assert_eq!(config.segmentation.lower_words, 8);
    assert_eq!(config.segmentation.upper_words, 45);
    assert_eq!(config.segmentation.long_words, 75);
    assert_eq!(config.segmentation.backward_upper_words, 35);
    assert_eq!(config.sampling.token_undercount_factor, 2);
    assert_eq!(config.insights.quotes_per_cluster, 4);
    assert_eq!(config.commit_policy, CommitPolicy::PerItem);
    assert!(config.validate().is_ok());
  }

  #[test]
  fn test_partial_yaml_fills_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("quotes.yaml");
    fs::write(&path, "commit_policy: whole_pass\nsampling:\n  context_limit: 4000\n").unwrap();

    let config = EngineConfig::load_from_file(&path).unwrap();
    assert_eq!(config.commit_policy, CommitPolicy::WholePass);
    assert_eq!(config.sampling.context_limit, 4000);
    assert_eq!(config.sampling.batch_size, 1_000);
    assert_eq!(config.segmentation, SegmentationConfig::default());
  }

  #[test]
  fn test_json_round_trip_through_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("quotes.json");

    let mut config = EngineConfig::default();
    config.insights.min_quotes = 12;
    config.save_to_file(&path).unwrap();

    assert_eq!(EngineConfig::load_from_file(&path).unwrap(), config);
  }

  #[test]
  fn test_invalid_thresholds_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("bad.json");
    fs::write(&path, r#"{"segmentation": {"lower_words": 50}}"#).unwrap();

    let err = EngineConfig::load_from_file(&path).unwrap_err();
    assert!(err.to_string().contains("lower_words"));
  }

  #[test]
  fn test_zero_batch_size_rejected() {
    let mut config = EngineConfig::default();
    config.sampling.batch_size = 0;
    assert!(config.validate().is_err());
  }

  #[test]
  #[serial]
  fn test_load_honours_env_var() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.yml");
    fs::write(&path, "insights:\n  min_quotes: 20\n").unwrap();

    std::env::set_var(CONFIG_ENV, &path);
    let config = EngineConfig::load();
    std::env::remove_var(CONFIG_ENV);

    assert_eq!(config.unwrap().insights.min_quotes, 20);
  }
}
