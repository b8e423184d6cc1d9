//! Per-turn pipeline: append message, extract over the full transcript,
//! merge with persisted truth, evolve schema, write topic tables, update
//! the session snapshot.

pub mod error;
pub mod locks;
pub mod merge;
pub mod orchestrator;
pub mod topics;

pub use error::PipelineError;
pub use locks::SessionLocks;
pub use merge::merge;
pub use orchestrator::IntakePipeline;
