//! Prompt rendering for the three model calls the engine makes

use crate::models::{Aspect, Quote};

/// Human-readable language name for the instruction line
pub fn language_name(code: &str) -> &str {
  match code.to_ascii_lowercase().as_str() {
    "en" => "English",
    "nl" => "Dutch",
    "de" => "German",
    "fr" => "French",
    "es" => "Spanish",
    "it" => "Italian",
    _ => code,
  }
}

/// Render quotes as one JSON string literal per line
pub fn quote_list(quotes: &[Quote]) -> String {
  quotes
    .iter()
    .map(|quote| serde_json::Value::String(quote.text.clone()).to_string())
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn sentence_split_prompt(text: &str) -> String {
  format!(
    "Split the following transcript excerpt into exactly two consecutive parts at the most \
natural sentence boundary. Keep every word and its order; do not summarise, translate or \
rephrase.\n\
Respond with a JSON array containing exactly two strings and nothing else.\n\n\
Excerpt:\n{text}"
  )
}

pub fn aspect_draft_prompt(
  user_input: &str,
  initial_aspects: Option<&str>,
  language: &str,
  quotes: &[Quote],
) -> String {
  let suggested = match initial_aspects.map(str::trim) {
    Some(aspects) if !aspects.is_empty() => {
      format!("\nThe researcher suggested these aspects to start from:\n{aspects}\n")
    }
    _ => String::new(),
  };

  format!(
    "You are helping a qualitative researcher organise interview material.\n\
Research question: {user_input}\n{suggested}\n\
Based on the quotes below, propose a list of distinct aspects that together answer the \
research question. Each aspect needs a short name and a one or two sentence description. \
Aspects must not overlap in meaning.\n\
Write names and descriptions in {language}.\n\n\
Quotes:\n{quotes}",
    language = language_name(language),
    quotes = quote_list(quotes),
  )
}

pub fn representative_quotes_prompt(
  view_name: &str,
  aspect: &Aspect,
  other_aspect_names: &[String],
  quotes: &[Quote],
  language: &str,
) -> String {
  let others = if other_aspect_names.is_empty() {
    "(none)".to_string()
  } else {
    other_aspect_names.join(", ")
  };

  format!(
    "View: {view_name}\n\
Aspect: {name}\n\
Description: {description}\n\
Other aspects in this view: {others}\n\n\
From the quotes below, pick the ones that clearly belong to this aspect and not to any of \
the other aspects. Copy a distinctive part of each chosen quote verbatim.\n\
Respond with a JSON array of strings and nothing else. The quotes are in {language}; do \
not translate them.\n\n\
Quotes:\n{quotes}",
    name = aspect.name,
    description = aspect.description,
    language = language_name(language),
    quotes = quote_list(quotes),
  )
}
