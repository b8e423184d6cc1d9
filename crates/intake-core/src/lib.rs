pub mod catalog;
pub mod config;
pub mod error;
pub mod types;

pub use catalog::{is_safe_identifier, Catalog, FieldKind, FieldSpec, TopicCatalog};
pub use config::IntakeConfig;
pub use error::{IntakeError, Result};
pub use types::*;
