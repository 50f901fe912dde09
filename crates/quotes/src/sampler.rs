//! Token-budgeted representative sampling of a run's quote pool
//!
//! Three phases share one running token total and stop as soon as it
//! reaches the budget:
//!
//! 1. one random quote per conversation (coverage)
//! 2. nearest quotes to random Gaussian probes in embedding space (diversity)
//! 3. shuffled remainder, greedily (fill)

use anyhow::Result;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::engine::Engine;
use crate::models::Quote;
use crate::services::DistanceMetric;
use crate::vector::gaussian_probe;

/// Running token total against a hard ceiling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
  limit: usize,
  used: usize,
}

impl Budget {
  pub fn new(limit: usize) -> Self {
    Self { limit, used: 0 }
  }

  pub fn fits(&self, tokens: usize) -> bool {
    self.used + tokens <= self.limit
  }

  pub fn exhausted(&self) -> bool {
    self.used >= self.limit
  }

  pub fn remaining(&self) -> usize {
    self.limit.saturating_sub(self.used)
  }

  pub fn used(&self) -> usize {
    self.used
  }

  fn spend(&mut self, tokens: usize) {
    self.used += tokens;
  }
}

/// Selected quotes in selection order, deduplicated by id
#[derive(Default)]
struct Selection {
  quotes: Vec<Quote>,
  ids: HashSet<Uuid>,
  /// Same ids in selection order, handed to nearest-neighbour queries
  excluded: Vec<Uuid>,
}

impl Selection {
  fn contains(&self, id: &Uuid) -> bool {
    self.ids.contains(id)
  }

  fn excluded_ids(&self) -> &[Uuid] {
    &self.excluded
  }

  /// Add `quote` if it is new and fits; returns whether it was added
  fn offer(&mut self, quote: Quote, tokens: usize, budget: &mut Budget) -> bool {
    if self.contains(&quote.id) || !budget.fits(tokens) {
      return false;
    }
    budget.spend(tokens);
    self.ids.insert(quote.id);
    self.excluded.push(quote.id);
    self.quotes.push(quote);
    true
  }
}

// Public API
impl Engine {
  /// Draw a token-budgeted, diverse sample of the run's quotes.
  ///
  /// The budget is `context_limit` divided by the configured undercount
  /// factor. Output is in selection order and is not deterministic unless
  /// `rng` is.
  pub async fn get_random_sample_quotes<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    context_limit: usize,
    batch_size: usize,
    rng: &mut R,
  ) -> Result<Vec<Quote>> {
    let mut budget = Budget::new(context_limit / self.config.sampling.token_undercount_factor);
    let mut selection = Selection::default();

    self.sample_per_conversation(run_id, &mut budget, &mut selection, rng).await?;
    let after_coverage = selection.quotes.len();

    if !budget.exhausted() {
      let pool = self.load_pool(run_id, batch_size.max(1)).await?;
      let token_counts: HashMap<Uuid, usize> = pool
        .iter()
        .map(|quote| (quote.id, self.services.tokens.count_tokens(&quote.text)))
        .collect();

      self.sample_by_probes(run_id, &pool, &token_counts, &mut budget, &mut selection, rng).await;
      let after_probes = selection.quotes.len();

      sample_remainder(&pool, &token_counts, &mut budget, &mut selection, rng);

      bentley::debug!(&format!(
        "sampled run {run_id}: {after_coverage} coverage, {} diversity, {} fill, {}/{} tokens",
        after_probes - after_coverage,
        selection.quotes.len() - after_probes,
        budget.used(),
        context_limit / self.config.sampling.token_undercount_factor,
      ));
    }

    Ok(selection.quotes)
  }
}

// Sampling phases
impl Engine {
  async fn sample_per_conversation<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    budget: &mut Budget,
    selection: &mut Selection,
    rng: &mut R,
  ) -> Result<()> {
    let store = &self.services.store;

    for conversation_id in store.run_conversation_ids(run_id).await? {
      if budget.exhausted() {
        break;
      }

      let count = store.count_quotes(run_id, Some(conversation_id)).await?;
      if count == 0 {
        continue;
      }

      let offset = rng.random_range(0..count);
      let page = store.quote_page(run_id, Some(conversation_id), offset, 1).await?;
      if let Some(quote) = page.into_iter().next() {
        let tokens = self.services.tokens.count_tokens(&quote.text);
        selection.offer(quote, tokens, budget);
      }
    }

    Ok(())
  }

  /// Whole pool, loaded page by page
  async fn load_pool(&self, run_id: Uuid, batch_size: usize) -> Result<Vec<Quote>> {
    let mut pool = Vec::new();
    loop {
      let page = self.services.store.quote_page(run_id, None, pool.len(), batch_size).await?;
      let page_len = page.len();
      pool.extend(page);
      if page_len < batch_size {
        break;
      }
    }
    Ok(pool)
  }

  async fn sample_by_probes<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    pool: &[Quote],
    token_counts: &HashMap<Uuid, usize>,
    budget: &mut Budget,
    selection: &mut Selection,
    rng: &mut R,
  ) {
    let Some(dimension) = pool.first().map(|quote| quote.embedding.len()) else {
      return;
    };

    let average_tokens = (token_counts.values().sum::<usize>() / pool.len()).max(1);
    let probes = (budget.remaining() / average_tokens).min(pool.len());

    for _ in 0..probes {
      if budget.exhausted() {
        break;
      }

      let probe = gaussian_probe(rng, dimension);
      let candidate = self.nearest_unselected(run_id, &probe, pool, selection, rng).await;

      if let Some(quote) = candidate {
        let tokens = token_counts.get(&quote.id).copied().unwrap_or_else(|| {
          self.services.tokens.count_tokens(&quote.text)
        });
        selection.offer(quote, tokens, budget);
      }
    }
  }

  /// Native L2 query, then the squared-L2 formulation, then a uniform pick
  async fn nearest_unselected<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    probe: &[f32],
    pool: &[Quote],
    selection: &Selection,
    rng: &mut R,
  ) -> Option<Quote> {
    let store = &self.services.store;
    let exclude = selection.excluded_ids();

    for metric in [DistanceMetric::L2, DistanceMetric::SquaredL2] {
      match store.nearest_quote(run_id, probe, exclude, metric).await {
        Ok(found) => return found,
        Err(e) => {
          bentley::warn!(&format!("nearest-quote query ({metric:?}) failed: {e}"));
        }
      }
    }

    bentley::warn!("falling back to a random unselected quote");
    let unselected: Vec<&Quote> =
      pool.iter().filter(|quote| !selection.contains(&quote.id)).collect();
    unselected.choose(rng).map(|quote| (*quote).clone())
  }
}

fn sample_remainder<R: Rng + ?Sized>(
  pool: &[Quote],
  token_counts: &HashMap<Uuid, usize>,
  budget: &mut Budget,
  selection: &mut Selection,
  rng: &mut R,
) {
  let mut remaining: Vec<&Quote> =
    pool.iter().filter(|quote| !selection.contains(&quote.id)).collect();
  remaining.shuffle(rng);

  for quote in remaining {
    if budget.exhausted() {
      break;
    }
    let tokens = token_counts.get(&quote.id).copied().unwrap_or_default();
    selection.offer(quote.clone(), tokens, budget);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::services::embeddings::MockEmbedder;
  use crate::services::llm::MockLanguageModel;
  use crate::services::{MemoryStore, Services, TokenCounter};
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use std::sync::Arc;

  /// One token per word
  struct WordTokens;

  impl TokenCounter for WordTokens {
    fn count_tokens(&self, text: &str) -> usize {
      text.split_whitespace().count()
    }
  }

  fn engine(store: Arc<MemoryStore>) -> Engine {
    let services =
      Services::new(store, Arc::new(MockEmbedder::new()), Arc::new(MockLanguageModel::new()))
        .with_tokens(Arc::new(WordTokens));
    Engine::new(services, EngineConfig::default()).unwrap()
  }

  async fn seeded_store(
    run_id: Uuid,
    conversations: usize,
    per_conversation: usize,
  ) -> MemoryStore {
    let store = MemoryStore::new();
    let mut quotes = Vec::new();
    for c in 0..conversations {
      let conversation_id = Uuid::new_v4();
      for q in 0..per_conversation {
        let embedding = vec![c as f32, q as f32, (c * q) as f32];
        quotes.push(Quote::new(
          conversation_id,
          Some(run_id),
          "four words per quote".to_string(),
          q as i64,
          None,
          embedding,
        ));
      }
    }
    store.seed_quotes(quotes).await.unwrap();
    store
  }

  #[test]
  fn test_budget_accounting() {
    let mut budget = Budget::new(10);
    assert!(budget.fits(10));
    assert!(!budget.fits(11));

    budget.spend(7);
    assert_eq!(budget.remaining(), 3);
    assert!(!budget.exhausted());
    assert!(!budget.fits(4));

    budget.spend(3);
    assert!(budget.exhausted());
  }

  #[test]
  fn test_selection_rejects_duplicates_and_overflow() {
    let mut budget = Budget::new(5);
    let mut selection = Selection::default();
    let quote = Quote::new(Uuid::new_v4(), None, "a b".to_string(), 0, None, vec![]);
    let quote_id = quote.id;

    assert!(selection.offer(quote.clone(), 2, &mut budget));
    assert!(!selection.offer(quote, 2, &mut budget));

    let big = Quote::new(Uuid::new_v4(), None, "x".to_string(), 0, None, vec![]);
    assert!(!selection.offer(big, 4, &mut budget));
    assert_eq!(budget.used(), 2);
    assert_eq!(selection.excluded_ids(), [quote_id]);
  }

  #[tokio::test]
  async fn test_budget_is_halved_context_limit() {
    let run_id = Uuid::new_v4();
    let store = Arc::new(seeded_store(run_id, 3, 10).await);
    let engine = engine(store);

    // 41 / 2 = 20 tokens = five four-word quotes
    let sample =
      engine.get_random_sample_quotes(run_id, 41, 7, &mut StdRng::seed_from_u64(1)).await.unwrap();
    assert_eq!(sample.len(), 5);
  }

  #[tokio::test]
  async fn test_large_budget_takes_whole_pool_once() {
    let run_id = Uuid::new_v4();
    let store = Arc::new(seeded_store(run_id, 4, 5).await);
    let engine = engine(store);

    let sample = engine
      .get_random_sample_quotes(run_id, 1_000_000, 3, &mut StdRng::seed_from_u64(2))
      .await
      .unwrap();

    let ids: HashSet<Uuid> = sample.iter().map(|quote| quote.id).collect();
    assert_eq!(sample.len(), 20);
    assert_eq!(ids.len(), 20);
  }

  #[tokio::test]
  async fn test_distance_fallbacks_never_fail_the_sample() {
    let run_id = Uuid::new_v4();
    let store = seeded_store(run_id, 2, 6)
      .await
      .with_unsupported_metrics(&[DistanceMetric::L2, DistanceMetric::SquaredL2]);
    let engine = engine(Arc::new(store));

    let sample =
      engine.get_random_sample_quotes(run_id, 40, 4, &mut StdRng::seed_from_u64(3)).await.unwrap();
    assert_eq!(sample.len(), 5);
  }

  #[tokio::test]
  async fn test_empty_run_yields_empty_sample() {
    let engine = engine(Arc::new(MemoryStore::new()));
    let sample = engine
      .get_random_sample_quotes(Uuid::new_v4(), 1_000, 10, &mut StdRng::seed_from_u64(4))
      .await
      .unwrap();
    assert!(sample.is_empty());
  }

  #[tokio::test]
  async fn test_same_seed_same_sample() {
    let run_id = Uuid::new_v4();
    let store = Arc::new(seeded_store(run_id, 3, 8).await);
    let engine = engine(store);

    let a = engine.get_random_sample_quotes(run_id, 30, 5, &mut StdRng::seed_from_u64(9)).await;
    let b = engine.get_random_sample_quotes(run_id, 30, 5, &mut StdRng::seed_from_u64(9)).await;
    assert_eq!(a.unwrap(), b.unwrap());
  }
}
