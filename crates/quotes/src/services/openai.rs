//! HTTP client for OpenAI-compatible embedding and chat endpoints
//!
//! Implements both [`Embedder`] and [`LanguageModel`] against `/embeddings`
//! and `/chat/completions`, so one client can back a whole [`Services`]
//! bundle in production.
//!
//! [`Services`]: super::Services

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::embeddings::Embedder;
use super::llm::{Completion, LanguageModel, StructuredSchema};
use crate::config::OpenAiConfig;
use crate::error::QuotesError;

pub struct OpenAiClient {
  client: Client,
  config: OpenAiConfig,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
  role: &'a str,
  content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<ChatMessage<'a>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
  message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
  #[serde(default)]
  content: Option<String>,
  #[serde(default)]
  refusal: Option<String>,
}

fn response_format(schema: &StructuredSchema) -> Value {
  json!({
    "type": "json_schema",
    "json_schema": {
      "name": schema.name,
      "schema": schema.schema,
      "strict": true
    }
  })
}

/// Refusal wins over content; content must be JSON
fn structured_outcome(reply: ChatReply) -> Result<Completion> {
  if let Some(refusal) = reply.refusal {
    return Ok(Completion::Refusal(refusal));
  }
  let content = reply.content.unwrap_or_default();
  let value = serde_json::from_str(&content).map_err(|e| {
    QuotesError::transport("chat", format!("structured reply is not valid JSON: {e}"))
  })?;
  Ok(Completion::Content(value))
}

impl OpenAiClient {
  /// Build a client; the API key is read from the env var the config names
  pub fn new(config: OpenAiConfig) -> Result<Self> {
    let key = std::env::var(&config.api_key_env).map_err(|_| {
      QuotesError::invalid_config(format!("environment variable {} is not set", config.api_key_env))
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {key}"))?);

    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .default_headers(headers)
      .build()?;

    bentley::verbose!(&format!("OpenAI client ready for {}", config.base_url));
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
  }

  async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
    &self,
    service: &'static str,
    path: &str,
    body: &B,
  ) -> Result<T> {
    let response = self
      .client
      .post(self.url(path))
      .json(body)
      .send()
      .await
      .map_err(|e| QuotesError::transport(service, e.to_string()))?;

    if !response.status().is_success() {
      let status = response.status();
      let error_text = response.text().await.unwrap_or_default();
      return Err(QuotesError::transport(service, format!("{status}: {error_text}")).into());
    }

    let parsed =
      response.json::<T>().await.map_err(|e| QuotesError::transport(service, e.to_string()))?;
    Ok(parsed)
  }

  async fn chat(&self, prompt: &str, response_format: Option<Value>) -> Result<ChatReply> {
    let request = ChatRequest {
      model: &self.config.completion_model,
      messages: vec![ChatMessage { role: "user", content: prompt }],
      response_format,
    };
    let response: ChatResponse = self.post("chat", "chat/completions", &request).await?;
    response
      .choices
      .into_iter()
      .next()
      .map(|choice| choice.message)
      .ok_or_else(|| QuotesError::transport("chat", "response contained no choices").into())
  }
}

#[async_trait]
impl Embedder for OpenAiClient {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    let request = EmbeddingRequest { model: &self.config.embedding_model, input: text };
    let response: EmbeddingResponse = self.post("embeddings", "embeddings", &request).await?;
    response
      .data
      .into_iter()
      .next()
      .map(|data| data.embedding)
      .ok_or_else(|| QuotesError::transport("embeddings", "response contained no vectors").into())
  }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
  async fn complete(&self, prompt: &str) -> Result<String> {
    let reply = self.chat(prompt, None).await?;
    if let Some(refusal) = reply.refusal {
      return Err(QuotesError::refusal(refusal).into());
    }
    Ok(reply.content.unwrap_or_default())
  }

  async fn complete_structured(
    &self,
    prompt: &str,
    schema: &StructuredSchema,
  ) -> Result<Completion> {
    let reply = self.chat(prompt, Some(response_format(schema))).await?;
    structured_outcome(reply)
  }
}
