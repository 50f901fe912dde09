//! Transcript segmentation: chunk transcripts in, ordered quotes out
//!
//! Redacted chunk transcripts are joined into one text and split into
//! sentences. A forward pass packs sentences into quotes of bounded length,
//! asking the language model to halve anything too long. A backward pass then
//! merges short neighbours. Each quote is embedded and stamped with the
//! timestamp of the first chunk that contains it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::SegmentationConfig;
use crate::engine::Engine;
use crate::error::QuotesError;
use crate::models::Quote;
use crate::prompts::sentence_split_prompt;
use crate::repair::parse_string_array;
use crate::services::LanguageModel;

/// Quote text with its position in the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
  pub order: i64,
  pub text: String,
}

pub fn word_count(text: &str) -> usize {
  text.split_whitespace().count()
}

/// Drop ellipsis characters and dot runs, collapse whitespace
pub fn normalize_ellipses(text: &str) -> String {
  let mut cleaned = String::with_capacity(text.len());
  let mut dots = 0;

  for c in text.chars() {
    if c == '.' {
      dots += 1;
      continue;
    }
    flush_dots(&mut cleaned, dots);
    dots = 0;
    if c != '\u{2026}' {
      cleaned.push(c);
    }
  }
  flush_dots(&mut cleaned, dots);

  cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A single dot is punctuation and stays; two or more are an ellipsis
fn flush_dots(out: &mut String, dots: usize) {
  if dots == 1 {
    out.push('.');
  }
}

/// Concatenate transcripts, adding a full stop where a chunk ends mid-sentence
pub fn join_transcripts<S: AsRef<str>>(parts: &[S]) -> String {
  let mut joined = String::new();

  for part in parts {
    let part = part.as_ref().trim();
    if part.is_empty() {
      continue;
    }
    if !joined.is_empty() {
      if joined.ends_with(['.', '!', '?']) {
        joined.push(' ');
      } else {
        joined.push_str(". ");
      }
    }
    joined.push_str(part);
  }

  joined
}

/// Split on whitespace that follows `.`, `!` or `?`
pub fn split_sentences(text: &str) -> Vec<String> {
  let mut sentences = Vec::new();
  let mut current = String::new();
  let mut previous: Option<char> = None;

  for c in text.chars() {
    if c.is_whitespace() {
      if matches!(previous, Some('.' | '!' | '?')) && !current.is_empty() {
        sentences.push(std::mem::take(&mut current));
      } else if !current.is_empty() {
        current.push(c);
      }
    } else {
      current.push(c);
    }
    previous = Some(c);
  }

  let tail = current.trim_end();
  if !tail.is_empty() {
    sentences.push(tail.to_string());
  }
  sentences
}

/// Pack sentences left to right into quotes, splitting oversized ones in two
pub async fn forward_pass(
  sentences: &[String],
  thresholds: &SegmentationConfig,
  llm: &dyn LanguageModel,
) -> Result<Vec<Segment>> {
  let mut segments = Vec::new();
  let mut buffer: Vec<String> = Vec::new();
  let mut order = 0i64;

  for sentence in sentences {
    match buffer.last_mut() {
      Some(last) if word_count(sentence) < thresholds.lower_words => {
        last.push(' ');
        last.push_str(sentence);
      }
      _ => buffer.push(sentence.clone()),
    }

    let joined = buffer.join(" ");
    let words = word_count(&joined);
    if words <= thresholds.upper_words {
      continue;
    }

    if words > thresholds.long_words {
      let (first, second) = split_in_two(llm, &joined).await?;
      segments.push(Segment { order, text: first });
      segments.push(Segment { order: order + 1, text: second });
      order += 2;
    } else {
      segments.push(Segment { order, text: joined });
      order += 1;
    }
    buffer.clear();
  }

  if !buffer.is_empty() {
    segments.push(Segment { order, text: buffer.join(" ") });
  }

  Ok(segments)
}

/// Merge adjacent pairs right to left while their combined length fits
pub fn backward_merge(segments: Vec<Segment>, backward_upper_words: usize) -> Vec<Segment> {
  let mut merged = Vec::with_capacity(segments.len());
  let mut remaining = segments.len();

  while remaining >= 2 {
    let previous = &segments[remaining - 2];
    let current = &segments[remaining - 1];

    if word_count(&previous.text) + word_count(&current.text) <= backward_upper_words {
      merged.push(Segment {
        order: previous.order,
        text: format!("{} {}", previous.text, current.text),
      });
      remaining -= 2;
    } else {
      merged.push(current.clone());
      remaining -= 1;
    }
  }

  if remaining == 1 {
    merged.push(segments[0].clone());
  }

  merged.reverse();
  merged
}

/// Ask the model for exactly two parts; anything else is fatal
async fn split_in_two(llm: &dyn LanguageModel, text: &str) -> Result<(String, String)> {
  let reply = llm.complete(&sentence_split_prompt(text)).await?;
  let parts: Vec<String> = parse_string_array(&reply)
    .unwrap_or_default()
    .into_iter()
    .map(|part| part.trim().to_string())
    .filter(|part| !part.is_empty())
    .collect();

  match <[String; 2]>::try_from(parts) {
    Ok([first, second]) => Ok((first, second)),
    Err(parts) => Err(QuotesError::SplitFailed { parts: parts.len() }.into()),
  }
}

/// Redacted, normalised chunk text and the playback timestamp it carries
struct SourceText {
  text: String,
  timestamp: Option<DateTime<Utc>>,
}

fn resolve_timestamp(sources: &[SourceText], quote_text: &str) -> Option<DateTime<Utc>> {
  sources.iter().find(|source| source.text.contains(quote_text)).and_then(|source| source.timestamp)
}

// Public API
impl Engine {
  /// Segment one conversation into embedded quotes and persist them in a
  /// single commit. `run_id = None` leaves the quotes unattached.
  ///
  /// Chunks are taken in upload (`created_at`) order, not playback order.
  pub async fn generate_quotes(
    &self,
    conversation_id: Uuid,
    run_id: Option<Uuid>,
  ) -> Result<Vec<Quote>> {
    let store = &self.services.store;

    let mut chunks = store.conversation_chunks(conversation_id).await?;
    chunks.retain(|chunk| chunk.transcript.is_some());
    chunks.sort_by_key(|chunk| chunk.created_at);

    if chunks.is_empty() {
      bentley::info!(&format!("conversation {conversation_id} has no transcribed chunks"));
      return Ok(Vec::new());
    }

    let mut sources = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
      let transcript = chunk.transcript.as_deref().unwrap_or_default();
      let redacted = self.services.redactor.redact(transcript).await?;
      sources.push(SourceText { text: normalize_ellipses(&redacted), timestamp: chunk.timestamp });
    }

    let texts: Vec<&str> = sources.iter().map(|source| source.text.as_str()).collect();
    let sentences = split_sentences(&join_transcripts(&texts));
    let thresholds = &self.config.segmentation;

    let segments = forward_pass(&sentences, thresholds, self.services.llm.as_ref()).await?;
    let segments = backward_merge(segments, thresholds.backward_upper_words);

    let mut quotes = Vec::with_capacity(segments.len());
    for segment in segments {
      let timestamp = resolve_timestamp(&sources, &segment.text);
      let embedding = self.services.embedder.embed(&segment.text).await?;
      quotes.push(Quote::new(
        conversation_id,
        run_id,
        segment.text,
        segment.order,
        timestamp,
        embedding,
      ));
    }

    if quotes.is_empty() {
      return Ok(quotes);
    }

    let mut tx = store.begin().await?;
    if let Err(e) = tx.insert_quotes(&quotes).await {
      tx.rollback().await?;
      return Err(e);
    }
    tx.commit().await?;

    bentley::success!(&format!(
      "created {} quotes for conversation {conversation_id}",
      quotes.len()
    ));
    Ok(quotes)
  }

  /// Attach the still-unattached quotes of `conversation_ids` to `run_id`
  pub async fn attach_quotes_to_run(
    &self,
    conversation_ids: &[Uuid],
    run_id: Uuid,
  ) -> Result<usize> {
    let mut tx = self.services.store.begin().await?;
    let mut moved = 0;
    for conversation_id in conversation_ids {
      match tx.attach_unassigned_quotes(*conversation_id, run_id).await {
        Ok(count) => moved += count,
        Err(e) => {
          tx.rollback().await?;
          return Err(e);
        }
      }
    }
    tx.commit().await?;

    bentley::info!(&format!("attached {moved} quotes to run {run_id}"));
    Ok(moved)
  }
}
