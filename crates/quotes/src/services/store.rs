//! Persistence abstraction for quotes, views, aspects and insights
//!
//! Reads go through [`QuoteStore`] and see committed data only. Writes are
//! staged on a [`QuoteTx`] opened with [`QuoteStore::begin`], one per engine
//! call, so a rollback or commit in one call never touches another call's
//! staged rows. Implementations may back this with a relational database, a
//! vector database, or the in-process [`super::MemoryStore`].

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Aspect, ConversationChunk, Insight, Quote, View};

/// Distance formulation for nearest-neighbour queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistanceMetric {
  /// Native Euclidean distance operator
  L2,
  /// Sum of squared differences; ranks identically to `L2`
  SquaredL2,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteStore: Send + Sync {
  /// All chunks of a conversation, transcribed or not, in any order
  async fn conversation_chunks(&self, conversation_id: Uuid) -> Result<Vec<ConversationChunk>>;

  /// Distinct conversations that have quotes in the run
  async fn run_conversation_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>>;

  async fn count_quotes(&self, run_id: Uuid, conversation_id: Option<Uuid>) -> Result<usize>;

  /// Stable-ordered page of a run's quotes, optionally narrowed to one conversation
  async fn quote_page(
    &self,
    run_id: Uuid,
    conversation_id: Option<Uuid>,
    offset: usize,
    limit: usize,
  ) -> Result<Vec<Quote>>;

  /// Closest quote in the run to `probe`, skipping `exclude`
  async fn nearest_quote(
    &self,
    run_id: Uuid,
    probe: &[f32],
    exclude: &[Uuid],
    metric: DistanceMetric,
  ) -> Result<Option<Quote>>;

  /// `(id, embedding)` for every quote in the run
  async fn quote_embeddings(&self, run_id: Uuid) -> Result<Vec<(Uuid, Vec<f32>)>>;

  async fn view(&self, view_id: Uuid) -> Result<Option<View>>;

  async fn aspect(&self, aspect_id: Uuid) -> Result<Option<Aspect>>;

  async fn view_aspects(&self, view_id: Uuid) -> Result<Vec<Aspect>>;

  /// Open a unit of work; dropping it uncommitted discards its writes
  async fn begin(&self) -> Result<Box<dyn QuoteTx>>;
}

/// Writes staged by one engine call
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteTx: Send {
  /// Stage a bulk insert
  async fn insert_quotes(&mut self, quotes: &[Quote]) -> Result<()>;

  /// Attach a conversation's not-yet-attached quotes to `run_id`; returns how many move
  async fn attach_unassigned_quotes(
    &mut self,
    conversation_id: Uuid,
    run_id: Uuid,
  ) -> Result<usize>;

  async fn insert_view(&mut self, view: &View) -> Result<()>;

  async fn insert_aspect(&mut self, aspect: &Aspect) -> Result<()>;

  async fn set_representative_quotes(
    &mut self,
    aspect_id: Uuid,
    quote_ids: &[Uuid],
  ) -> Result<()>;

  async fn set_centroid(&mut self, aspect_id: Uuid, centroid: &[f32]) -> Result<()>;

  /// Add to the aspect/quote relation; adding an existing pair is a no-op
  async fn add_aspect_quote(&mut self, aspect_id: Uuid, quote_id: Uuid) -> Result<()>;

  /// Stage an insight together with its insight/quote relation rows
  async fn insert_insight(&mut self, insight: &Insight) -> Result<()>;

  /// Publish everything staged since the last commit, all or nothing.
  /// The transaction stays open for further writes.
  async fn commit(&mut self) -> Result<()>;

  /// Discard everything staged since the last commit
  async fn rollback(&mut self) -> Result<()>;
}
