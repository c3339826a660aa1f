//! Core contracts and helpers for Seedsmith.
//!
//! This crate defines the schema catalog types shared by the population
//! engine and the CLI, the SQL value model, dependency resolution over
//! foreign-key edges, and catalog validation.

pub mod constraints;
pub mod error;
pub mod graph;
pub mod schema;
pub mod validation;
pub mod value;

pub use constraints::{Constraint, ForeignKey, PrimaryKey, UniqueConstraint};
pub use error::{Error, Result};
pub use graph::{resolve_order, TableOrder};
pub use schema::{Column, ColumnType, SchemaCatalog, Table};
pub use validation::validate_catalog;
pub use value::{merge_rows, Row, Value};

/// Current contract version for `schema.json` artifacts.
pub const CATALOG_VERSION: &str = "0.1";
