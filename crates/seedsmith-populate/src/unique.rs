use std::collections::{HashMap, HashSet};

use seedsmith_core::Value;

use crate::errors::{PopulateError, Result};

/// Default attempt bound for [`UniqueTrackers`].
pub const DEFAULT_MAX_TRIES: u32 = 100;

/// Retry-until-unique wrapper around a candidate-producing function,
/// scoped to one (table, column list) constraint.
///
/// Tracks the canonical string key of every tuple it has handed out; a
/// candidate whose key was already seen is discarded and the producer is
/// invoked again, up to the attempt bound.
#[derive(Debug)]
pub struct UniqueGenerator {
    table: String,
    columns: Vec<String>,
    max_tries: u32,
    seen: HashSet<String>,
}

impl UniqueGenerator {
    pub fn new(table: impl Into<String>, columns: Vec<String>, max_tries: u32) -> Self {
        Self {
            table: table.into(),
            columns,
            max_tries,
            seen: HashSet::new(),
        }
    }

    /// Invoke `produce` until it yields a tuple not seen before, record
    /// the tuple, and return it.
    ///
    /// `key_indices` selects which positions of the candidate make up the
    /// tracked key; `None` tracks the whole candidate. A producer may
    /// return a wider tuple than the constraint's columns (e.g. a full
    /// row), with the indices pointing at the constrained positions.
    ///
    /// Exceeding the attempt bound is reported as
    /// [`PopulateError::UniqueExhausted`], distinct from ordinary
    /// generation errors: it usually means the value space is smaller
    /// than the requested row count.
    pub fn generate<F>(&mut self, key_indices: Option<&[usize]>, mut produce: F) -> Result<Vec<Value>>
    where
        F: FnMut() -> Vec<Value>,
    {
        for _ in 0..self.max_tries {
            let candidate = produce();
            let key = match key_indices {
                Some(indices) => Self::key_of(indices.iter().map(|index| candidate.get(*index))),
                None => Self::key_of(candidate.iter().map(Some)),
            };
            if self.seen.insert(key) {
                return Ok(candidate);
            }
        }

        Err(PopulateError::UniqueExhausted {
            table: self.table.clone(),
            columns: self.columns.join(", "),
            max_tries: self.max_tries,
        })
    }

    fn key_of<'a>(values: impl Iterator<Item = Option<&'a Value>>) -> String {
        values
            .map(|value| value.map(Value::key_str).unwrap_or_else(|| "<missing>".to_string()))
            .collect::<Vec<_>>()
            .join("\u{1f}")
    }
}

/// Per-run registry of unique generators, scoped per (table, column list).
///
/// Owned by the orchestrator, created fresh for each population run and
/// discarded afterwards. Row generators borrow trackers from here so that
/// every generator touching the same declared constraint shares one seen
/// set.
#[derive(Debug)]
pub struct UniqueTrackers {
    trackers: HashMap<String, UniqueGenerator>,
    max_tries: u32,
}

impl UniqueTrackers {
    pub fn new(max_tries: u32) -> Self {
        Self {
            trackers: HashMap::new(),
            max_tries,
        }
    }

    /// The tracker for the given constraint scope, created on first use.
    pub fn tracker(&mut self, table: &str, columns: &[String]) -> &mut UniqueGenerator {
        let key = format!("{table}\u{1f}{}", columns.join("\u{1f}"));
        self.trackers.entry(key).or_insert_with(|| {
            UniqueGenerator::new(table, columns.to_vec(), self.max_tries)
        })
    }
}

impl Default for UniqueTrackers {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TRIES)
    }
}
