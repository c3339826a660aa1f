//! Population and dependency-orchestration engine for Seedsmith.
//!
//! Populates a PostgreSQL schema with synthetic data in three layers:
//! fixed vocabulary datasets loaded verbatim with their foreign-key
//! constraints suspended, standalone per-table row generation in
//! dependency order, and multi-table stories executed transactionally
//! with database-assigned values fed back into later steps.

pub mod errors;
pub mod generator;
mod insert;
pub mod orchestrator;
pub mod remove;
pub mod story;
pub mod unique;
pub mod vocabulary;

pub use errors::{PopulateError, Result};
pub use generator::{
    classify_column, value_for_kind, ColumnKind, GeneratorMap, RowGenerator, TypedRowGenerator,
};
pub use orchestrator::{populate, PopulateEngine, PopulateOptions, RowCounts};
pub use remove::remove_db_data;
pub use story::{Story, StoryDescriptor, StoryFactory, StoryStep};
pub use unique::{UniqueGenerator, UniqueTrackers, DEFAULT_MAX_TRIES};
pub use vocabulary::{create_db_vocab, VocabularySet};
