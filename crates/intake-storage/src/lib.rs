//! SQLite persistence for the intake pipeline.
//!
//! Provides the durable session store, the parent-record repository, the
//! catalog-driven schema evolver, and the per-topic upsert writer.

pub mod db;
pub mod evolver;
pub mod migrations;
pub mod records;
pub mod session;
pub mod writer;

pub use db::Database;
pub use evolver::{SchemaEvolver, SchemaOutcome};
pub use records::PatientRepository;
pub use session::SessionRepository;
pub use writer::{normalize_value, RecordWriter, WriteOutcome};
