//! Quote-to-aspect assignment and unsupervised insight grouping

use anyhow::Result;
use rand::Rng;
use uuid::Uuid;

use crate::config::CommitPolicy;
use crate::engine::Engine;
use crate::error::QuotesError;
use crate::kmeans::KMeans;
use crate::models::Insight;
use crate::services::QuoteTx;
use crate::vector::{euclidean_distance, stack};

/// Closest centroid by Euclidean distance. `centroids` must be sorted by id;
/// an equally close later centroid never displaces an earlier one.
pub fn nearest_aspect(centroids: &[(Uuid, Vec<f32>)], embedding: &[f32]) -> Result<Option<Uuid>> {
  let mut best: Option<(Uuid, f32)> = None;
  for (aspect_id, centroid) in centroids {
    if centroid.len() != embedding.len() {
      return Err(
        QuotesError::DimensionMismatch { expected: centroid.len(), actual: embedding.len() }.into(),
      );
    }
    let distance = euclidean_distance(centroid, embedding);
    match best {
      Some((_, closest)) if distance >= closest => {}
      _ => best = Some((*aspect_id, distance)),
    }
  }
  Ok(best.map(|(aspect_id, _)| aspect_id))
}

// Public API
impl Engine {
  /// Put every quote of the view's run into the aspect with the nearest centroid.
  /// Aspects without a centroid take no part.
  pub async fn cluster_quotes_using_aspect_centroids(&self, view_id: Uuid) -> Result<()> {
    let store = &self.services.store;
    let view = store.view(view_id).await?.ok_or(QuotesError::missing("view", view_id))?;

    let mut centroids = Vec::new();
    for aspect in store.view_aspects(view_id).await? {
      match aspect.centroid_embedding {
        Some(centroid) => centroids.push((aspect.id, centroid)),
        None => {
          bentley::warn!(&format!("aspect {} has no centroid; skipping it", aspect.id));
        }
      }
    }
    if centroids.is_empty() {
      bentley::warn!(&format!("view {view_id} has no aspects with centroids; nothing to cluster"));
      return Ok(());
    }
    centroids.sort_by_key(|(aspect_id, _)| *aspect_id);

    let quotes = store.quote_embeddings(view.project_analysis_run_id).await?;
    let mut tx = store.begin().await?;
    if let Err(e) = self.assign_to_nearest(tx.as_mut(), &centroids, &quotes).await {
      tx.rollback().await?;
      return Err(e);
    }
    if self.config.commit_policy == CommitPolicy::WholePass {
      tx.commit().await?;
    }

    bentley::info!(&format!(
      "assigned {} quotes across {} aspects of view {view_id}",
      quotes.len(),
      centroids.len()
    ));
    Ok(())
  }

  /// Partition the run's quotes into insights with seeded k-means.
  /// Returns the created insight ids; runs too small to cluster yield none.
  pub async fn initialize_insights<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    rng: &mut R,
  ) -> Result<Vec<Uuid>> {
    let store = &self.services.store;
    let settings = &self.config.insights;

    let mut embeddings = store.quote_embeddings(run_id).await?;
    if embeddings.is_empty() {
      return Ok(Vec::new());
    }

    let n = embeddings.len();
    let k = n / settings.quotes_per_cluster;
    if n < settings.min_quotes || k == 0 {
      bentley::warn!(&format!(
        "run {run_id} has {n} quotes, too few to form insights (minimum {})",
        settings.min_quotes
      ));
      return Ok(Vec::new());
    }

    embeddings.sort_by_key(|(quote_id, _)| *quote_id);
    let (quote_ids, vectors): (Vec<Uuid>, Vec<Vec<f32>>) = embeddings.into_iter().unzip();
    let matrix = stack(&vectors)?;
    let kmeans = KMeans::new(k, settings.max_iterations, settings.tolerance)?;
    let clustering = kmeans.fit(&matrix, rng)?;

    let insights: Vec<Insight> = clustering
      .members()
      .into_iter()
      .filter(|rows| !rows.is_empty())
      .map(|rows| {
        let mut insight = Insight::new(run_id);
        insight.quote_ids = rows.into_iter().map(|row| quote_ids[row]).collect();
        insight
      })
      .collect();

    let mut tx = store.begin().await?;
    if let Err(e) = self.persist_insights(tx.as_mut(), &insights).await {
      tx.rollback().await?;
      return Err(e);
    }
    if self.config.commit_policy == CommitPolicy::WholePass {
      tx.commit().await?;
    }

    bentley::success!(&format!(
      "formed {} insights from {n} quotes in {} k-means iterations",
      insights.len(),
      clustering.iterations
    ));
    Ok(insights.into_iter().map(|insight| insight.id).collect())
  }
}

impl Engine {
  async fn assign_to_nearest(
    &self,
    tx: &mut dyn QuoteTx,
    centroids: &[(Uuid, Vec<f32>)],
    quotes: &[(Uuid, Vec<f32>)],
  ) -> Result<()> {
    for (quote_id, embedding) in quotes {
      let Some(aspect_id) = nearest_aspect(centroids, embedding)? else {
        continue;
      };
      tx.add_aspect_quote(aspect_id, *quote_id).await?;
      if self.config.commit_policy == CommitPolicy::PerItem {
        tx.commit().await?;
      }
    }
    Ok(())
  }

  async fn persist_insights(&self, tx: &mut dyn QuoteTx, insights: &[Insight]) -> Result<()> {
    for insight in insights {
      tx.insert_insight(insight).await?;
      if self.config.commit_policy == CommitPolicy::PerItem {
        tx.commit().await?;
      }
    }
    Ok(())
  }
}
