//! In-process `QuoteStore` with real commit/rollback semantics
//!
//! Each [`MemoryTx`] keeps its own journal of staged writes. `commit()`
//! replays that journal onto the shared state under one lock, all or
//! nothing; `rollback()` drops it. Reads see committed state only.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{DistanceMetric, QuoteStore, QuoteTx};
use crate::error::QuotesError;
use crate::models::{Aspect, ConversationChunk, Insight, Quote, View};
use crate::vector::{euclidean_distance, squared_euclidean_distance};

/// Snapshot of everything the store holds
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
  pub chunks: Vec<ConversationChunk>,
  /// Keyed by id so pagination order is stable
  pub quotes: BTreeMap<Uuid, Quote>,
  /// Views are kept without their aspects; see `aspects`
  pub views: Vec<View>,
  pub aspects: Vec<Aspect>,
  pub insights: Vec<Insight>,
}

#[derive(Debug, Clone)]
enum Write {
  InsertQuotes(Vec<Quote>),
  Attach { conversation_id: Uuid, run_id: Uuid },
  InsertView(View),
  InsertAspect(Aspect),
  SetRepresentatives { aspect_id: Uuid, quote_ids: Vec<Uuid> },
  SetCentroid { aspect_id: Uuid, centroid: Vec<f32> },
  AddAspectQuote { aspect_id: Uuid, quote_id: Uuid },
  InsertInsight(Insight),
}

impl MemoryState {
  fn aspect_mut(&mut self, aspect_id: Uuid) -> Result<&mut Aspect> {
    self
      .aspects
      .iter_mut()
      .find(|aspect| aspect.id == aspect_id)
      .ok_or_else(|| QuotesError::missing("aspect", aspect_id).into())
  }

  /// Apply one write. Every arm checks before it mutates, so a failed
  /// write leaves the state untouched.
  fn apply(&mut self, write: &Write) -> Result<()> {
    match write {
      Write::InsertQuotes(quotes) => {
        for quote in quotes {
          if self.quotes.contains_key(&quote.id) {
            return Err(anyhow!("quote {} already exists", quote.id));
          }
        }
        for quote in quotes {
          self.quotes.insert(quote.id, quote.clone());
        }
      }
      Write::Attach { conversation_id, run_id } => {
        for quote in self.quotes.values_mut() {
          if is_unattached(quote, *conversation_id) {
            quote.project_analysis_run_id = Some(*run_id);
          }
        }
      }
      Write::InsertView(view) => {
        let mut stored = view.clone();
        stored.aspects.clear();
        self.views.push(stored);
        self.aspects.extend(view.aspects.iter().cloned());
      }
      Write::InsertAspect(aspect) => {
        if !self.views.iter().any(|view| view.id == aspect.view_id) {
          return Err(QuotesError::missing("view", aspect.view_id).into());
        }
        self.aspects.push(aspect.clone());
      }
      Write::SetRepresentatives { aspect_id, quote_ids } => {
        self.aspect_mut(*aspect_id)?.representative_quote_ids = quote_ids.clone();
      }
      Write::SetCentroid { aspect_id, centroid } => {
        self.aspect_mut(*aspect_id)?.centroid_embedding = Some(centroid.clone());
      }
      Write::AddAspectQuote { aspect_id, quote_id } => {
        if !self.quotes.contains_key(quote_id) {
          return Err(QuotesError::missing("quote", *quote_id).into());
        }
        let aspect = self.aspect_mut(*aspect_id)?;
        if !aspect.quote_ids.contains(quote_id) {
          aspect.quote_ids.push(*quote_id);
        }
      }
      Write::InsertInsight(insight) => {
        self.insights.push(insight.clone());
      }
    }
    Ok(())
  }

  /// Apply a whole journal, or none of it
  fn apply_all(&mut self, journal: &[Write]) -> Result<()> {
    match journal {
      [] => Ok(()),
      [write] => self.apply(write),
      _ => {
        let mut next = self.clone();
        for write in journal {
          next.apply(write)?;
        }
        *self = next;
        Ok(())
      }
    }
  }

  fn run_quotes(&self, run_id: Uuid) -> impl Iterator<Item = &Quote> {
    self.quotes.values().filter(move |quote| quote.project_analysis_run_id == Some(run_id))
  }
}

fn is_unattached(quote: &Quote, conversation_id: Uuid) -> bool {
  quote.conversation_id == conversation_id && quote.project_analysis_run_id.is_none()
}

/// Reference store used by tests and single-process deployments
#[derive(Default)]
pub struct MemoryStore {
  state: Arc<Mutex<MemoryState>>,
  unsupported_metrics: HashSet<DistanceMetric>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Make `nearest_quote` fail for the listed formulations, the way a
  /// backend without the matching operator would
  pub fn with_unsupported_metrics(mut self, metrics: &[DistanceMetric]) -> Self {
    self.unsupported_metrics = metrics.iter().copied().collect();
    self
  }

  /// Load chunks as already-committed data
  pub async fn add_chunks(&self, chunks: Vec<ConversationChunk>) {
    self.state.lock().await.chunks.extend(chunks);
  }

  /// Load quotes as already-committed data
  pub async fn seed_quotes(&self, quotes: Vec<Quote>) -> Result<()> {
    let mut tx = self.begin().await?;
    tx.insert_quotes(&quotes).await?;
    tx.commit().await
  }

  /// Copy of the committed state
  pub async fn committed(&self) -> MemoryState {
    self.state.lock().await.clone()
  }
}

/// Staged writes of one unit of work against a [`MemoryStore`]
pub struct MemoryTx {
  state: Arc<Mutex<MemoryState>>,
  journal: Vec<Write>,
  /// Conversations already attached since the last commit
  attached: HashSet<Uuid>,
}

impl MemoryTx {
  fn stage(&mut self, write: Write) {
    self.journal.push(write);
  }
}

#[async_trait]
impl QuoteTx for MemoryTx {
  async fn insert_quotes(&mut self, quotes: &[Quote]) -> Result<()> {
    self.stage(Write::InsertQuotes(quotes.to_vec()));
    Ok(())
  }

  /// Counted against committed rows plus this transaction's staged inserts
  async fn attach_unassigned_quotes(
    &mut self,
    conversation_id: Uuid,
    run_id: Uuid,
  ) -> Result<usize> {
    if !self.attached.insert(conversation_id) {
      return Ok(0);
    }

    let committed = {
      let state = self.state.lock().await;
      state.quotes.values().filter(|quote| is_unattached(quote, conversation_id)).count()
    };
    let staged = self
      .journal
      .iter()
      .filter_map(|write| match write {
        Write::InsertQuotes(quotes) => Some(quotes),
        _ => None,
      })
      .flatten()
      .filter(|quote| is_unattached(quote, conversation_id))
      .count();

    self.stage(Write::Attach { conversation_id, run_id });
    Ok(committed + staged)
  }

  async fn insert_view(&mut self, view: &View) -> Result<()> {
    self.stage(Write::InsertView(view.clone()));
    Ok(())
  }

  async fn insert_aspect(&mut self, aspect: &Aspect) -> Result<()> {
    self.stage(Write::InsertAspect(aspect.clone()));
    Ok(())
  }

  async fn set_representative_quotes(
    &mut self,
    aspect_id: Uuid,
    quote_ids: &[Uuid],
  ) -> Result<()> {
    self.stage(Write::SetRepresentatives { aspect_id, quote_ids: quote_ids.to_vec() });
    Ok(())
  }

  async fn set_centroid(&mut self, aspect_id: Uuid, centroid: &[f32]) -> Result<()> {
    self.stage(Write::SetCentroid { aspect_id, centroid: centroid.to_vec() });
    Ok(())
  }

  async fn add_aspect_quote(&mut self, aspect_id: Uuid, quote_id: Uuid) -> Result<()> {
    self.stage(Write::AddAspectQuote { aspect_id, quote_id });
    Ok(())
  }

  async fn insert_insight(&mut self, insight: &Insight) -> Result<()> {
    self.stage(Write::InsertInsight(insight.clone()));
    Ok(())
  }

  async fn commit(&mut self) -> Result<()> {
    let journal = std::mem::take(&mut self.journal);
    self.attached.clear();
    self.state.lock().await.apply_all(&journal)
  }

  async fn rollback(&mut self) -> Result<()> {
    self.journal.clear();
    self.attached.clear();
    Ok(())
  }
}

#[async_trait]
impl QuoteStore for MemoryStore {
  async fn conversation_chunks(&self, conversation_id: Uuid) -> Result<Vec<ConversationChunk>> {
    let state = self.state.lock().await;
    Ok(
      state
        .chunks
        .iter()
        .filter(|chunk| chunk.conversation_id == conversation_id)
        .cloned()
        .collect(),
    )
  }

  async fn run_conversation_ids(&self, run_id: Uuid) -> Result<Vec<Uuid>> {
    let state = self.state.lock().await;
    let mut seen = HashSet::new();
    Ok(
      state
        .run_quotes(run_id)
        .map(|quote| quote.conversation_id)
        .filter(|id| seen.insert(*id))
        .collect(),
    )
  }

  async fn count_quotes(&self, run_id: Uuid, conversation_id: Option<Uuid>) -> Result<usize> {
    let state = self.state.lock().await;
    Ok(
      state
        .run_quotes(run_id)
        .filter(|quote| conversation_id.map_or(true, |id| quote.conversation_id == id))
        .count(),
    )
  }

  async fn quote_page(
    &self,
    run_id: Uuid,
    conversation_id: Option<Uuid>,
    offset: usize,
    limit: usize,
  ) -> Result<Vec<Quote>> {
    let state = self.state.lock().await;
    Ok(
      state
        .run_quotes(run_id)
        .filter(|quote| conversation_id.map_or(true, |id| quote.conversation_id == id))
        .skip(offset)
        .take(limit)
        .cloned()
        .collect(),
    )
  }

  async fn nearest_quote(
    &self,
    run_id: Uuid,
    probe: &[f32],
    exclude: &[Uuid],
    metric: DistanceMetric,
  ) -> Result<Option<Quote>> {
    if self.unsupported_metrics.contains(&metric) {
      return Err(anyhow!("distance operator {metric:?} is not supported by this store"));
    }

    let distance: fn(&[f32], &[f32]) -> f32 = match metric {
      DistanceMetric::L2 => euclidean_distance,
      DistanceMetric::SquaredL2 => squared_euclidean_distance,
    };

    let excluded: HashSet<&Uuid> = exclude.iter().collect();
    let state = self.state.lock().await;

    let mut best: Option<(f32, &Quote)> = None;
    for quote in state.run_quotes(run_id) {
      if excluded.contains(&quote.id) {
        continue;
      }
      if quote.embedding.len() != probe.len() {
        return Err(
          QuotesError::DimensionMismatch { expected: probe.len(), actual: quote.embedding.len() }
            .into(),
        );
      }
      let d = distance(probe, &quote.embedding);
      if best.map_or(true, |(best_d, _)| d < best_d) {
        best = Some((d, quote));
      }
    }

    Ok(best.map(|(_, quote)| quote.clone()))
  }

  async fn quote_embeddings(&self, run_id: Uuid) -> Result<Vec<(Uuid, Vec<f32>)>> {
    let state = self.state.lock().await;
    Ok(state.run_quotes(run_id).map(|quote| (quote.id, quote.embedding.clone())).collect())
  }

  async fn view(&self, view_id: Uuid) -> Result<Option<View>> {
    let state = self.state.lock().await;
    Ok(state.views.iter().find(|view| view.id == view_id).map(|view| {
      let mut view = view.clone();
      view.aspects =
        state.aspects.iter().filter(|aspect| aspect.view_id == view_id).cloned().collect();
      view
    }))
  }

  async fn aspect(&self, aspect_id: Uuid) -> Result<Option<Aspect>> {
    let state = self.state.lock().await;
    Ok(state.aspects.iter().find(|aspect| aspect.id == aspect_id).cloned())
  }

  async fn view_aspects(&self, view_id: Uuid) -> Result<Vec<Aspect>> {
    let state = self.state.lock().await;
    Ok(state.aspects.iter().filter(|aspect| aspect.view_id == view_id).cloned().collect())
  }

  async fn begin(&self) -> Result<Box<dyn QuoteTx>> {
    Ok(Box::new(MemoryTx {
      state: Arc::clone(&self.state),
      journal: Vec::new(),
      attached: HashSet::new(),
    }))
  }
}
