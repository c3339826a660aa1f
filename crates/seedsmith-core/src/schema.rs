use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constraints::{Constraint, ForeignKey, PrimaryKey, UniqueConstraint};
use crate::graph::resolve_order;

/// Schema snapshot a population run consumes.
///
/// Produced by an external introspection tool as a `schema.json` artifact;
/// immutable for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaCatalog {
    /// Contract version for this catalog format.
    pub catalog_version: String,
    /// Target namespace, when not the connection default.
    pub schema: Option<String>,
    /// Tables in the target schema.
    pub tables: Vec<Table>,
}

/// A table: ordered columns plus declared constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    pub constraints: Vec<Constraint>,
}

/// Column metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub is_nullable: bool,
    pub default: Option<String>,
}

/// Formatted Postgres type metadata for a column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnType {
    /// User-friendly formatted type (e.g. `character varying(255)`).
    pub data_type: String,
    pub character_max_length: Option<i32>,
    pub numeric_scale: Option<i32>,
}

impl SchemaCatalog {
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Non-vocabulary tables in dependency order: a table follows every
    /// table it references via foreign key, except across reported cycles.
    ///
    /// Cycles are broken deterministically and surfaced as warnings; the
    /// returned order still contains every selected table exactly once.
    pub fn sorted_tables(&self, exclude: &BTreeSet<String>) -> Vec<&Table> {
        let names: Vec<String> = self
            .tables
            .iter()
            .map(|table| table.name.clone())
            .filter(|name| !exclude.contains(name))
            .collect();

        let order = resolve_order(&names, |name| {
            self.table(name)
                .map(|table| table.referenced_tables())
                .unwrap_or_default()
        });
        for cycle in &order.cycles {
            warn!(tables = ?cycle, "dependency cycle between tables, breaking arbitrarily");
        }

        order
            .order
            .iter()
            .filter_map(|name| self.table(name))
            .collect()
    }
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_key(&self) -> Option<&PrimaryKey> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::PrimaryKey(pk) => Some(pk),
            _ => None,
        })
    }

    pub fn foreign_keys(&self) -> impl Iterator<Item = &ForeignKey> {
        self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::ForeignKey(fk) => Some(fk),
            _ => None,
        })
    }

    pub fn unique_constraints(&self) -> impl Iterator<Item = &UniqueConstraint> {
        self.constraints.iter().filter_map(|constraint| match constraint {
            Constraint::Unique(unique) => Some(unique),
            _ => None,
        })
    }

    /// Column lists that must hold unique tuples: declared unique
    /// constraints, plus the primary key when it spans several columns
    /// (an implicit unique constraint for generation purposes).
    pub fn unique_column_sets(&self) -> Vec<Vec<String>> {
        let mut sets: Vec<Vec<String>> = self
            .unique_constraints()
            .map(|unique| unique.columns.clone())
            .collect();
        if let Some(pk) = self.primary_key() {
            if pk.columns.len() > 1 {
                sets.push(pk.columns.clone());
            }
        }
        sets
    }

    /// Names of tables this table references via foreign keys. A
    /// self-referencing table lists itself; the resolver reports that as
    /// a single-node cycle.
    pub fn referenced_tables(&self) -> Vec<String> {
        let names: BTreeSet<String> = self
            .foreign_keys()
            .map(|fk| fk.referenced_table.clone())
            .collect();
        names.into_iter().collect()
    }
}
