//! Extraction boundary: turns a conversation transcript into a flat field
//! map via an external text-generation service.
//!
//! The engine is purely functional from the pipeline's perspective and is
//! re-run over the entire transcript on every turn; a failed call degrades
//! to an empty map, never an error that aborts the turn.

pub mod engine;
pub mod error;
pub mod llm;
pub mod parser;

pub use engine::{ExtractionEngine, ReplyEngine};
pub use error::ExtractError;
pub use llm::{LlmClient, LlmEngine};
pub use parser::parse_field_map;
