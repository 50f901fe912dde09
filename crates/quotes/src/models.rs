//! Typed records exchanged with the persistence layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One uploaded slice of a conversation, with its (possibly missing) transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationChunk {
  pub id: Uuid,
  pub conversation_id: Uuid,
  pub transcript: Option<String>,
  /// Playback position of the chunk
  pub timestamp: Option<DateTime<Utc>>,
  /// Upload time; segmentation orders chunks by this field
  pub created_at: DateTime<Utc>,
}

impl ConversationChunk {
  pub fn new(
    conversation_id: Uuid,
    transcript: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self { id: Uuid::new_v4(), conversation_id, transcript, timestamp, created_at }
  }
}

/// Short embedded excerpt of a transcript, the unit every other stage works on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
  pub id: Uuid,
  pub text: String,
  pub order: i64,
  pub timestamp: Option<DateTime<Utc>>,
  pub embedding: Vec<f32>,
  pub conversation_id: Uuid,
  /// `None` until the quote is attached to an analysis run
  pub project_analysis_run_id: Option<Uuid>,
}

impl Quote {
  pub fn new(
    conversation_id: Uuid,
    project_analysis_run_id: Option<Uuid>,
    text: String,
    order: i64,
    timestamp: Option<DateTime<Utc>>,
    embedding: Vec<f32>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      text,
      order,
      timestamp,
      embedding,
      conversation_id,
      project_analysis_run_id,
    }
  }

  pub fn word_count(&self) -> usize {
    self.text.split_whitespace().count()
  }
}

/// Named collection of aspects answering one analytical question
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct View {
  pub id: Uuid,
  pub name: String,
  pub project_analysis_run_id: Uuid,
  pub aspects: Vec<Aspect>,
}

impl View {
  pub fn new(project_analysis_run_id: Uuid, name: String) -> Self {
    Self { id: Uuid::new_v4(), name, project_analysis_run_id, aspects: Vec::new() }
  }
}

/// Theme inside a view, located in embedding space by its centroid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aspect {
  pub id: Uuid,
  pub view_id: Uuid,
  pub name: String,
  pub description: String,
  /// `None` until centroid assignment has run
  pub centroid_embedding: Option<Vec<f32>>,
  pub representative_quote_ids: Vec<Uuid>,
  pub quote_ids: Vec<Uuid>,
}

impl Aspect {
  pub fn new(view_id: Uuid, name: String, description: String) -> Self {
    Self {
      id: Uuid::new_v4(),
      view_id,
      name,
      description,
      centroid_embedding: None,
      representative_quote_ids: Vec::new(),
      quote_ids: Vec::new(),
    }
  }

  /// Text embedded as the anchor of the centroid
  pub fn anchor_text(&self) -> String {
    format!("{}. {}", self.name, self.description)
  }
}

/// Unsupervised cluster of quotes, independent of any view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
  pub id: Uuid,
  pub project_analysis_run_id: Uuid,
  /// Filled later by the summariser
  pub title: Option<String>,
  pub summary: Option<String>,
  pub quote_ids: Vec<Uuid>,
}

impl Insight {
  pub fn new(project_analysis_run_id: Uuid) -> Self {
    Self {
      id: Uuid::new_v4(),
      project_analysis_run_id,
      title: None,
      summary: None,
      quote_ids: Vec::new(),
    }
  }
}
