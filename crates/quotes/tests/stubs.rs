// Shared by several test binaries; each uses a subset
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use quotes::models::{Aspect, ConversationChunk, Insight, Quote, View};
use quotes::services::{
  Completion, DistanceMetric, Embedder, LanguageModel, MemoryStore, QuoteStore, QuoteTx,
  StructuredSchema,
};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Same text, same vector
pub struct HashEmbedder {
  pub dimension: usize,
}

#[async_trait]
impl Embedder for HashEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>> {
    Ok(
      (0..self.dimension)
        .map(|axis| {
          let mut hasher = DefaultHasher::new();
          text.hash(&mut hasher);
          axis.hash(&mut hasher);
          (hasher.finish() % 1000) as f32 / 1000.0
        })
        .collect(),
    )
  }
}

/// Replays queued replies in order; an empty queue is an error
#[derive(Default)]
pub struct ScriptedModel {
  replies: Mutex<VecDeque<String>>,
  structured: Mutex<VecDeque<Completion>>,
  pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reply(self, text: &str) -> Self {
    self.replies.lock().unwrap().push_back(text.to_string());
    self
  }

  pub fn structured(self, completion: Completion) -> Self {
    self.structured.lock().unwrap().push_back(completion);
    self
  }

  pub fn prompt_count(&self) -> usize {
    self.prompts.lock().unwrap().len()
  }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
  async fn complete(&self, prompt: &str) -> Result<String> {
    self.prompts.lock().unwrap().push(prompt.to_string());
    self.replies.lock().unwrap().pop_front().ok_or_else(|| anyhow!("no scripted reply left"))
  }

  async fn complete_structured(
    &self,
    prompt: &str,
    _schema: &StructuredSchema,
  ) -> Result<Completion> {
    self.prompts.lock().unwrap().push(prompt.to_string());
    self
      .structured
      .lock()
      .unwrap()
      .pop_front()
      .ok_or_else(|| anyhow!("no scripted structured reply left"))
  }
}

/// Write kinds a [`FlakyStore`] can be told to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
  InsertAspect,
  SetCentroid,
  AddAspectQuote,
  InsertInsight,
}

struct Gate {
  ops: Vec<Op>,
  fail_after: usize,
  writes: AtomicUsize,
}

impl Gate {
  fn tick(&self, op: Op) -> Result<()> {
    if !self.ops.contains(&op) {
      return Ok(());
    }
    if self.writes.fetch_add(1, Ordering::SeqCst) >= self.fail_after {
      return Err(anyhow!("connection reset"));
    }
    Ok(())
  }
}

/// Memory store whose watched writes start failing after a fixed number
/// succeed. Relation writes are watched unless `failing_on` says otherwise.
pub struct FlakyStore {
  pub inner: MemoryStore,
  gate: Arc<Gate>,
}

impl FlakyStore {
  pub fn new(inner: MemoryStore, fail_after: usize) -> Self {
    let ops = vec![Op::AddAspectQuote, Op::InsertInsight];
    Self { inner, gate: Arc::new(Gate { ops, fail_after, writes: AtomicUsize::new(0) }) }
  }

  pub fn failing_on(self, ops: &[Op]) -> Self {
    let fail_after = self.gate.fail_after;
    let gate = Gate { ops: ops.to_vec(), fail_after, writes: AtomicUsize::new(0) };
    Self { inner: self.inner, gate: Arc::new(gate) }
  }
}

struct FlakyTx {
  inner: Box<dyn QuoteTx>,
  gate: Arc<Gate>,
}

#[async_trait]
impl QuoteTx for FlakyTx {
  async fn insert_quotes(&mut self, quotes: &[Quote]) -> Result<()> {
    self.inner.insert_quotes(quotes).await
  }

  async fn attach_unassigned_quotes(
    &mut self,
    conversation_id: Uuid,
    run_id: Uuid,
  ) -> Result<usize> {
    self.inner.attach_unassigned_quotes(conversation_id, run_id).await
  }

  async fn insert_view(&mut self, view: &View) -> Result<()> {
    self.inner.insert_view(view).await
  }

  async fn insert_aspect(&mut self, aspect: &Aspect) -> Result<()> {
    self.gate.tick(Op::InsertAspect)?;
    self.inner.insert_aspect(aspect).await
  }

  async fn set_representative_quotes(
    &mut self,
    aspect_id: Uuid,
    quote_ids: &[Uuid],
  ) -> Result<()> {
    self.inner.set_representative_quotes(aspect_id, quote_ids).await
  }

  async fn set_centroid(&mut self, aspect_id: Uuid, centroid: &[f32]) -> Result<()> {
    self.gate.tick(Op::SetCentroid)?;
    self.inner.set_centroid(aspect_id, centroid).await
  }

  async fn add_aspect_quote(&mut self, aspect_id: Uuid, quote_id: Uuid) -> Result<()> {
    self.gate.tick(Op::AddAspectQuote)?;
    self.inner.add_aspect_quote(aspect_id, quote_id).await
  }

  async fn insert_insight(&mut self, insight: &Insight) -> Result<()> {
    self.gate.tick(Op::InsertInsight)?;
    self.inner.insert_insight(insight).await
  }

  async fn commit(&mut self) -> Result<()> {
    self.inner.commit().await
  }

  async fn rollback(&mut self) -> Result<()> {
    self.inner.rollback().await
  }
}

#[async_trait]
impl QuoteStore for FlakyStore {
  async fn conversation_chunks(&self, conversation_id: Uuid) -> Result<Vec<ConversationChunk>> {
    self.inner.conversation_chunks(conversation_id).await
  }

  async fn run_conversation_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
    self.inner.run_conversation_ids(run_id).await
  }

  async fn count_quotes(&self, run_id: Uuid, conversation_id: Option<Uuid>) -> Result<usize> {
    self.inner.count_quotes(run_id, conversation_id).await
  }

  async fn quote_page(
    &self,
    run_id: Uuid,
    conversation_id: Option<Uuid>,
    offset: usize,
    limit: usize,
  ) -> Result<Vec<Quote>> {
    self.inner.quote_page(run_id, conversation_id, offset, limit).await
  }

  async fn nearest_quote(
    &self,
    run_id: Uuid,
    probe: &[f32],
    exclude: &[Uuid],
    metric: DistanceMetric,
  ) -> Result<Option<Quote>> {
    self.inner.nearest_quote(run_id, probe, exclude, metric).await
  }

  async fn quote_embeddings(&self, run_id: Uuid) -> Result<Vec<(Uuid, Vec<f32>)>> {
    self.inner.quote_embeddings(run_id).await
  }

  async fn view(&self, view_id: Uuid) -> Result<Option<View>> {
    self.inner.view(view_id).await
  }

  async fn aspect(&self, aspect_id: Uuid) -> Result<Option<Aspect>> {
    self.inner.aspect(aspect_id).await
  }

  async fn view_aspects(&self, view_id: Uuid) -> Result<Vec<Aspect>> {
    self.inner.view_aspects(view_id).await
  }

  async fn begin(&self) -> Result<Box<dyn QuoteTx>> {
    let inner = self.inner.begin().await?;
    Ok(Box::new(FlakyTx { inner, gate: Arc::clone(&self.gate) }))
  }
}

/// Quote already attached to `run_id`
pub fn quote_at(conversation_id: Uuid, run_id: Uuid, text: &str, embedding: Vec<f32>) -> Quote {
  Quote::new(conversation_id, Some(run_id), text.to_string(), 0, None, embedding)
}
