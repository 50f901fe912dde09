//! Aspect drafting and centroid placement
//!
//! A view's aspects are drafted in one structured model call over a sample
//! of the run. Each aspect is then anchored in embedding space: the model
//! picks representative quotes from a fresh sample, and the centroid is the
//! mean of the aspect's own name/description embedding and those quotes.

use anyhow::Result;
use rand::Rng;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::engine::Engine;
use crate::error::QuotesError;
use crate::models::{Aspect, Quote, View};
use crate::prompts::{aspect_draft_prompt, representative_quotes_prompt};
use crate::repair::parse_string_array;
use crate::services::{Completion, QuoteTx, StructuredSchema};
use crate::vector::mean_vector;

/// Shape of the structured drafting reply; either field may come back null
#[derive(Debug, Deserialize)]
pub struct AspectDraftList {
  pub aspect_list: Vec<AspectDraft>,
}

#[derive(Debug, Deserialize)]
pub struct AspectDraft {
  pub name: Option<String>,
  pub description: Option<String>,
}

pub fn aspect_list_schema() -> StructuredSchema {
  StructuredSchema {
    name: "aspect_list".to_string(),
    schema: json!({
      "type": "object",
      "properties": {
        "aspect_list": {
          "type": "array",
          "items": {
            "type": "object",
            "properties": {
              "name": { "type": "string" },
              "description": { "type": "string" }
            },
            "required": ["name", "description"],
            "additionalProperties": false
          }
        }
      },
      "required": ["aspect_list"],
      "additionalProperties": false
    }),
  }
}

/// Sampled quotes containing any fragment, case-insensitively, in sample order
pub fn match_representatives<'a>(sample: &'a [Quote], fragments: &[String]) -> Vec<&'a Quote> {
  let patterns: Vec<Regex> = fragments
    .iter()
    .map(|fragment| fragment.trim())
    .filter(|fragment| !fragment.is_empty())
    .filter_map(|fragment| {
      RegexBuilder::new(&regex::escape(fragment)).case_insensitive(true).build().ok()
    })
    .collect();

  sample
    .iter()
    .filter(|quote| patterns.iter().any(|pattern| pattern.is_match(&quote.text)))
    .collect()
}

async fn stage_aspects(tx: &mut dyn QuoteTx, aspects: &[Aspect]) -> Result<()> {
  for aspect in aspects {
    tx.insert_aspect(aspect).await?;
  }
  Ok(())
}

// Public API
impl Engine {
  /// Create a view and draft its aspects from a sample of the run
  pub async fn initialize_view<R: Rng + Send + ?Sized>(
    &self,
    run_id: Uuid,
    user_input: &str,
    initial_aspects: Option<&str>,
    language: &str,
    rng: &mut R,
  ) -> Result<View> {
    let store = &self.services.store;
    let sampling = &self.config.sampling;

    let mut view = View::new(run_id, user_input.to_string());
    let mut tx = store.begin().await?;
    tx.insert_view(&view).await?;
    tx.commit().await?;

    let sample = self
      .get_random_sample_quotes(run_id, sampling.context_limit, sampling.batch_size, rng)
      .await?;
    let prompt = aspect_draft_prompt(user_input, initial_aspects, language, &sample);

    let completion = self.services.llm.complete_structured(&prompt, &aspect_list_schema()).await?;
    let drafts = match completion {
      Completion::Content(value) => serde_json::from_value::<AspectDraftList>(value)?,
      Completion::Refusal(message) => return Err(QuotesError::refusal(message).into()),
    };

    let mut aspects = Vec::new();
    for draft in drafts.aspect_list {
      let (Some(name), Some(description)) = (draft.name, draft.description) else {
        bentley::warn!("dropping drafted aspect with a missing name or description");
        continue;
      };
      aspects.push(Aspect::new(view.id, name, description));
    }

    // All drafted aspects land together or not at all
    if let Err(e) = stage_aspects(tx.as_mut(), &aspects).await {
      tx.rollback().await?;
      return Err(e);
    }
    tx.commit().await?;
    view.aspects = aspects;

    bentley::info!(&format!("drafted {} aspects for view {}", view.aspects.len(), view.id));
    Ok(view)
  }

  /// Pick representative quotes for an aspect and persist its centroid.
  /// Returns the centroid that was stored.
  pub async fn assign_aspect_centroid<R: Rng + Send + ?Sized>(
    &self,
    aspect_id: Uuid,
    language: &str,
    rng: &mut R,
  ) -> Result<Vec<f32>> {
    let store = &self.services.store;
    let sampling = &self.config.sampling;

    let aspect = store.aspect(aspect_id).await?.ok_or(QuotesError::missing("aspect", aspect_id))?;
    let view =
      store.view(aspect.view_id).await?.ok_or(QuotesError::missing("view", aspect.view_id))?;

    let sample = self
      .get_random_sample_quotes(
        view.project_analysis_run_id,
        sampling.context_limit,
        sampling.batch_size,
        rng,
      )
      .await?;

    let others: Vec<String> = view
      .aspects
      .iter()
      .filter(|other| other.id != aspect.id)
      .map(|other| other.name.clone())
      .collect();
    let prompt = representative_quotes_prompt(&view.name, &aspect, &others, &sample, language);
    let reply = self.services.llm.complete(&prompt).await?;

    let fragments = parse_string_array(&reply).unwrap_or_else(|e| {
      bentley::warn!(&format!("aspect {aspect_id}: {e}; continuing without representatives"));
      Vec::new()
    });
    let representatives = match_representatives(&sample, &fragments);

    let representative_ids: Vec<Uuid> = representatives.iter().map(|quote| quote.id).collect();
    let mut tx = store.begin().await?;
    if let Err(e) = tx.set_representative_quotes(aspect.id, &representative_ids).await {
      tx.rollback().await?;
      return Err(e);
    }
    tx.commit().await?;

    let mut vectors = vec![self.services.embedder.embed(&aspect.anchor_text()).await?];
    vectors.extend(representatives.iter().map(|quote| quote.embedding.clone()));
    let centroid = mean_vector(&vectors)?;

    if let Err(e) = tx.set_centroid(aspect.id, &centroid).await {
      tx.rollback().await?;
      return Err(e);
    }
    tx.commit().await?;

    bentley::verbose!(&format!(
      "aspect {aspect_id}: centroid from {} representative quotes",
      representatives.len()
    ));
    Ok(centroid)
  }
}
