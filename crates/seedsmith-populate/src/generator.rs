use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fake::Fake;
use fake::faker::internet::en::SafeEmail;
use fake::faker::lorem::en::Words;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sqlx::PgConnection;
use tracing::warn;

use seedsmith_core::{Column, Row, Table, Value};

use crate::errors::{PopulateError, Result};
use crate::insert::sample_column_value;
use crate::unique::UniqueTrackers;

/// Per-table unit producing one synthetic row's column values.
///
/// The live connection lets a generator look values up mid-row, e.g.
/// sample an existing foreign-key value from an already-populated table.
/// Unique trackers are borrowed from the orchestrator so every generator
/// touching the same declared constraint shares one seen set.
#[async_trait]
pub trait RowGenerator: Send {
    /// Rows to insert for this table during each standalone pass.
    fn rows_per_pass(&self) -> u32;

    /// Produce one row's column values.
    async fn generate(
        &mut self,
        conn: &mut PgConnection,
        uniques: &mut UniqueTrackers,
    ) -> Result<Row>;
}

/// Registered generators, keyed by table name. Tables without an entry
/// are skipped during standalone population (typically vocabulary tables
/// or tables intentionally excluded).
pub type GeneratorMap = BTreeMap<String, Box<dyn RowGenerator>>;

/// Closed tag for the semantic column kinds the typed generator supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Database-assigned (serial/identity); left out of generated rows.
    Serial,
    /// Foreign-key column; sampled from the referenced table.
    ForeignKey,
    Bool,
    Int,
    Float,
    Email,
    Text,
    Uuid,
    Date,
    Time,
    Timestamp,
    Json,
    /// No strategy; generates NULL with a warning.
    Unsupported,
}

/// Classify a column through an explicit ordered rule list: database-
/// assigned columns first, then foreign keys, then the declared type,
/// with a name-based email refinement for textual columns.
pub fn classify_column(table: &Table, column: &Column) -> ColumnKind {
    if column
        .default
        .as_deref()
        .is_some_and(|default| default.starts_with("nextval("))
    {
        return ColumnKind::Serial;
    }
    if table.foreign_keys().any(|fk| fk.columns.contains(&column.name)) {
        return ColumnKind::ForeignKey;
    }

    let base_type = column
        .column_type
        .data_type
        .split('(')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match base_type.as_str() {
        "boolean" => ColumnKind::Bool,
        "smallint" | "integer" | "bigint" => ColumnKind::Int,
        "real" | "double precision" => ColumnKind::Float,
        "numeric" | "decimal" => {
            if column.column_type.numeric_scale.unwrap_or(0) > 0 {
                ColumnKind::Float
            } else {
                ColumnKind::Int
            }
        }
        "uuid" => ColumnKind::Uuid,
        "date" => ColumnKind::Date,
        "time with time zone" | "time without time zone" => ColumnKind::Time,
        "timestamp with time zone" | "timestamp without time zone" => ColumnKind::Timestamp,
        "json" | "jsonb" => ColumnKind::Json,
        "character varying" | "character" | "varchar" | "bpchar" | "text" => {
            if column.name.to_lowercase().contains("email") {
                ColumnKind::Email
            } else {
                ColumnKind::Text
            }
        }
        _ => ColumnKind::Unsupported,
    }
}

/// Draw a value for a (sync-generable) column kind.
pub fn value_for_kind(rng: &mut ChaCha8Rng, kind: ColumnKind, column: &Column) -> Value {
    let base_date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    match kind {
        ColumnKind::Bool => Value::Bool(rng.random_bool(0.5)),
        ColumnKind::Int => Value::Int(rng.random_range(1..=100_000)),
        ColumnKind::Float => {
            let value: f64 = rng.random_range(0.0..=100_000.0);
            match column.column_type.numeric_scale {
                Some(scale) if scale >= 0 => {
                    let factor = 10_f64.powi(scale);
                    Value::Float((value * factor).round() / factor)
                }
                _ => Value::Float(value),
            }
        }
        ColumnKind::Email => Value::Text(SafeEmail().fake_with_rng(rng)),
        ColumnKind::Text => {
            let words: Vec<String> = Words(1..4).fake_with_rng(rng);
            let mut value = words.join(" ");
            if let Some(max_len) = column.column_type.character_max_length {
                value.truncate(max_len.max(0) as usize);
            }
            Value::Text(value)
        }
        ColumnKind::Uuid => Value::Uuid(random_uuid(rng)),
        ColumnKind::Date => {
            let offset = rng.random_range(0..=365);
            Value::Date(base_date + Duration::days(offset))
        }
        ColumnKind::Time => {
            let seconds = rng.random_range(0..86_400);
            Value::Time(NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default())
        }
        ColumnKind::Timestamp => {
            let offset = rng.random_range(0..=365);
            let date = base_date + Duration::days(offset);
            let time = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
            Value::Timestamp(NaiveDateTime::new(date, time))
        }
        ColumnKind::Json => Value::Json(serde_json::Value::Object(serde_json::Map::new())),
        ColumnKind::Serial | ColumnKind::ForeignKey | ColumnKind::Unsupported => Value::Null,
    }
}

fn random_uuid(rng: &mut ChaCha8Rng) -> uuid::Uuid {
    let mut bytes = [0_u8; 16];
    rng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    uuid::Uuid::from_bytes(bytes)
}

/// Type-driven row generator for a table: one strategy per column kind,
/// serial columns left to the database, foreign keys sampled from the
/// referenced table, single-column unique constraints enforced through
/// the run's unique trackers.
pub struct TypedRowGenerator {
    table: Table,
    rows_per_pass: u32,
    rng: ChaCha8Rng,
}

impl TypedRowGenerator {
    pub fn new(table: Table, rows_per_pass: u32, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(hash_seed(seed, &table.name)),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            table,
            rows_per_pass,
            rng,
        }
    }

    /// Columns covered by a single-column unique constraint or a
    /// single-column primary key.
    fn unique_single_columns(&self) -> Vec<String> {
        let mut names = Vec::new();
        for unique in self.table.unique_constraints() {
            if let [column] = unique.columns.as_slice() {
                names.push(column.clone());
            }
        }
        if let Some(pk) = self.table.primary_key() {
            if let [column] = pk.columns.as_slice() {
                names.push(column.clone());
            }
        }
        names
    }

    async fn foreign_key_value(
        &self,
        conn: &mut PgConnection,
        column: &Column,
    ) -> Result<Value> {
        let Some((fk, position)) = self.table.foreign_keys().find_map(|fk| {
            fk.columns
                .iter()
                .position(|name| name == &column.name)
                .map(|position| (fk, position))
        }) else {
            return Ok(Value::Null);
        };
        let referenced_column = fk
            .referenced_columns
            .get(position)
            .cloned()
            .unwrap_or_else(|| column.name.clone());

        match sample_column_value(conn, &fk.referenced_table, &referenced_column).await? {
            Some(value) => Ok(value),
            None if column.is_nullable => Ok(Value::Null),
            None => Err(PopulateError::MissingParentRows {
                table: self.table.name.clone(),
                column: column.name.clone(),
                referenced_table: fk.referenced_table.clone(),
            }),
        }
    }
}

#[async_trait]
impl RowGenerator for TypedRowGenerator {
    fn rows_per_pass(&self) -> u32 {
        self.rows_per_pass
    }

    async fn generate(
        &mut self,
        conn: &mut PgConnection,
        uniques: &mut UniqueTrackers,
    ) -> Result<Row> {
        let unique_columns = self.unique_single_columns();
        let columns = self.table.columns.clone();
        let mut row = Row::new();

        for column in &columns {
            let kind = classify_column(&self.table, column);
            let value = match kind {
                ColumnKind::Serial => continue,
                ColumnKind::ForeignKey => self.foreign_key_value(conn, column).await?,
                ColumnKind::Unsupported => {
                    warn!(
                        table = %self.table.name,
                        column = %column.name,
                        column_type = %column.column_type.data_type,
                        "no generation strategy for column type, using null"
                    );
                    Value::Null
                }
                kind if unique_columns.contains(&column.name) => {
                    let rng = &mut self.rng;
                    let tracker = uniques
                        .tracker(&self.table.name, std::slice::from_ref(&column.name));
                    tracker
                        .generate(None, || vec![value_for_kind(rng, kind, column)])?
                        .into_iter()
                        .next()
                        .unwrap_or(Value::Null)
                }
                kind => value_for_kind(&mut self.rng, kind, column),
            };
            row.insert(column.name.clone(), value);
        }

        Ok(row)
    }
}

fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}
