//! Quotes - turn conversation transcripts into a semantically organised corpus
//!
//! Transcripts are segmented into short verbatim quotes, sampled under a
//! token budget, grouped under model-drafted aspects and partitioned into
//! insights. Storage, embeddings and the language model are injected through
//! [`services::Services`].

pub mod aspects;
pub mod clustering;
pub mod config;
pub mod engine;
pub mod error;
pub mod kmeans;
pub mod models;
pub mod prompts;
pub mod repair;
pub mod sampler;
pub mod segmenter;
pub mod services;
pub mod vector;

pub use config::{CommitPolicy, EngineConfig};
pub use engine::Engine;
pub use error::QuotesError;
pub use models::{Aspect, ConversationChunk, Insight, Quote, View};
pub use services::Services;
