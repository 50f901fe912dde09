mod stubs;

use quotes::services::{ApproxTokenCounter, DistanceMetric, MemoryStore, Services, TokenCounter};
use quotes::{Engine, EngineConfig, Quote};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;
use stubs::{quote_at, HashEmbedder, ScriptedModel};
use uuid::Uuid;

fn engine(store: Arc<MemoryStore>) -> Engine {
  let services =
    Services::new(store, Arc::new(HashEmbedder { dimension: 3 }), Arc::new(ScriptedModel::new()));
  Engine::new(services, EngineConfig::default()).unwrap()
}

async fn run_with(store: &MemoryStore, conversations: usize, per_conversation: usize) -> Uuid {
  let run_id = Uuid::new_v4();
  let mut quotes = Vec::new();
  for c in 0..conversations {
    let conversation_id = Uuid::new_v4();
    for q in 0..per_conversation {
      let text = format!("conversation {c} said thing number {q} about the product");
      quotes.push(quote_at(conversation_id, run_id, &text, vec![c as f32, q as f32, 1.0]));
    }
  }
  store.seed_quotes(quotes).await.unwrap();
  run_id
}

fn tokens(sample: &[Quote]) -> usize {
  sample.iter().map(|quote| ApproxTokenCounter.count_tokens(&quote.text)).sum()
}

#[tokio::test]
async fn test_every_conversation_is_represented() {
  let store = Arc::new(MemoryStore::new());
  let run_id = run_with(&store, 6, 15).await;

  let sample = engine(store.clone())
    .get_random_sample_quotes(run_id, 2_000, 10, &mut StdRng::seed_from_u64(1))
    .await
    .unwrap();

  let conversations: HashSet<Uuid> = sample.iter().map(|quote| quote.conversation_id).collect();
  assert_eq!(conversations.len(), 6);
}

#[tokio::test]
async fn test_sample_stays_within_half_the_context_limit() {
  let store = Arc::new(MemoryStore::new());
  let run_id = run_with(&store, 4, 25).await;
  let engine = engine(store);

  for (seed, limit) in [(1u64, 64usize), (2, 300), (3, 1_000), (4, 5_000)] {
    let sample = engine
      .get_random_sample_quotes(run_id, limit, 7, &mut StdRng::seed_from_u64(seed))
      .await
      .unwrap();

    assert!(tokens(&sample) <= limit / 2, "limit {limit} exceeded");
    let ids: HashSet<Uuid> = sample.iter().map(|quote| quote.id).collect();
    assert_eq!(ids.len(), sample.len(), "duplicate quote in sample");
  }
}

#[tokio::test]
async fn test_generous_budget_returns_the_whole_run() {
  let store = Arc::new(MemoryStore::new());
  let run_id = run_with(&store, 3, 8).await;

  let sample = engine(store)
    .get_random_sample_quotes(run_id, 1_000_000, 5, &mut StdRng::seed_from_u64(9))
    .await
    .unwrap();

  assert_eq!(sample.len(), 24);
}

#[tokio::test]
async fn test_store_without_distance_operators_still_samples() {
  let store = Arc::new(
    MemoryStore::new().with_unsupported_metrics(&[DistanceMetric::L2, DistanceMetric::SquaredL2]),
  );
  let run_id = run_with(&store, 3, 10).await;

  let sample = engine(store)
    .get_random_sample_quotes(run_id, 400, 4, &mut StdRng::seed_from_u64(5))
    .await
    .unwrap();

  assert!(sample.len() > 3);
  assert!(tokens(&sample) <= 200);
}

#[tokio::test]
async fn test_quotes_outside_the_run_are_never_sampled() {
  let store = Arc::new(MemoryStore::new());
  let run_id = run_with(&store, 2, 5).await;
  let other_run = run_with(&store, 2, 5).await;

  let sample = engine(store)
    .get_random_sample_quotes(run_id, 1_000_000, 3, &mut StdRng::seed_from_u64(2))
    .await
    .unwrap();

  assert_eq!(sample.len(), 10);
  assert!(sample.iter().all(|quote| quote.project_analysis_run_id == Some(run_id)));
  assert!(sample.iter().all(|quote| quote.project_analysis_run_id != Some(other_run)));
}
