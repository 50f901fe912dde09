//! Permissive parsing of model-produced JSON string arrays
//!
//! Models truncate output, forget closing brackets and wrap answers in code
//! fences. [`parse_string_array`] tries the raw text first, then a fixed
//! sequence of closing repairs, then truncation to the last complete element.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RepairError {
  #[error("no JSON array found in model output")]
  NoArray,

  #[error("model output is not a repairable JSON array: {reason}")]
  Unrepairable { reason: String },
}

/// Parse `raw` as a JSON array of strings, repairing common truncations.
/// Non-string elements are dropped.
pub fn parse_string_array(raw: &str) -> Result<Vec<String>, RepairError> {
  let body = locate_array(raw).ok_or(RepairError::NoArray)?;

  let mut last_error = match try_parse(body) {
    Ok(items) => return Ok(items),
    Err(e) => e,
  };

  if !body.ends_with(']') {
    if let Some(closed) = close_array(body) {
      match try_parse(&closed) {
        Ok(items) => return Ok(items),
        Err(e) => last_error = e,
      }
    }
  }

  if let Some(truncated) = truncate_to_last_element(body) {
    if let Ok(items) = try_parse(&truncated) {
      return Ok(items);
    }
  }

  Err(RepairError::Unrepairable { reason: last_error })
}

/// Strip code fences and anything before the first `[`
fn locate_array(raw: &str) -> Option<&str> {
  let trimmed = raw.trim();
  let start = trimmed.find('[')?;
  let body = trimmed[start..].trim_end();
  Some(body.strip_suffix("```").map(str::trim_end).unwrap_or(body))
}

fn try_parse(candidate: &str) -> Result<Vec<String>, String> {
  let values: Vec<Value> = serde_json::from_str(candidate).map_err(|e| e.to_string())?;
  Ok(
    values
      .into_iter()
      .filter_map(|value| match value {
        Value::String(text) => Some(text),
        _ => None,
      })
      .collect(),
  )
}

/// One closing repair, picked by the trailing character
fn close_array(body: &str) -> Option<String> {
  let last = body.chars().last()?;

  let closed = if let Some(without_comma) = body.strip_suffix(',') {
    format!("{}]", without_comma.trim_end())
  } else if matches!(last, '"' | ' ' | '}' | '[') {
    format!("{body}]")
  } else {
    format!("{body}\"]")
  };
  Some(closed)
}

/// Keep everything up to the last `",` boundary and close the array there
fn truncate_to_last_element(body: &str) -> Option<String> {
  let cut = body.rfind("\",")?;
  Some(format!("{}]", &body[..=cut]))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_well_formed_array() {
    assert_eq!(parse_string_array(r#"["a", "b"]"#).unwrap(), vec!["a", "b"]);
    assert_eq!(parse_string_array("[]").unwrap(), Vec::<String>::new());
  }

  #[test]
  fn test_code_fence_and_preamble_stripped() {
    let raw = "Here you go:\n```json\n[\"too expensive\", \"slow support\"]\n```";
    assert_eq!(parse_string_array(raw).unwrap(), vec!["too expensive", "slow support"]);
  }

  #[test]
  fn test_trailing_comma_is_dropped() {
    assert_eq!(parse_string_array(r#"["a", "b","#).unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_closed_after_complete_string() {
    assert_eq!(parse_string_array(r#"["a", "b""#).unwrap(), vec!["a", "b"]);
    assert_eq!(parse_string_array(r#"["a", "b" "#).unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_unterminated_string_is_closed() {
    assert_eq!(parse_string_array(r#"["alpha", "be"#).unwrap(), vec!["alpha", "be"]);
  }

  #[test]
  fn test_truncation_to_last_complete_element() {
    // closing the dangling escape cannot produce valid JSON, truncation can
    let raw = r#"["first", "second", "thi\"#;
    assert_eq!(parse_string_array(raw).unwrap(), vec!["first", "second"]);
  }

  #[test]
  fn test_non_string_elements_dropped() {
    assert_eq!(parse_string_array(r#"["a", 3, null, "b"]"#).unwrap(), vec!["a", "b"]);
  }

  #[test]
  fn test_no_array() {
    assert_eq!(parse_string_array("I could not find any quotes."), Err(RepairError::NoArray));
  }

  #[test]
  fn test_unrepairable() {
    let err = parse_string_array("[{\"a\": ").unwrap_err();
    assert!(matches!(err, RepairError::Unrepairable { .. }));
  }
}
