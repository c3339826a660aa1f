use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;

/// Run configuration, loaded from a TOML file.
///
/// Tables not mentioned get the defaults: not vocabulary, not ignored,
/// zero rows per pass (skipped during standalone generation).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Seed for deterministic generation; omit for a random run.
    pub seed: Option<u64>,
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TableConfig {
    /// Rows come from a fixed dataset, not generation.
    pub vocabulary_table: bool,
    /// Leave the table completely untouched.
    pub ignore: bool,
    pub num_rows_per_pass: u32,
}

impl RunConfig {
    /// Table names flagged `vocabulary_table = true`.
    pub fn vocabulary_tables(&self) -> BTreeSet<String> {
        self.tables
            .iter()
            .filter(|(_, table)| table.vocabulary_table)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn is_ignored(&self, table: &str) -> bool {
        self.tables
            .get(table)
            .map(|config| config.ignore)
            .unwrap_or(false)
    }

    pub fn rows_per_pass(&self, table: &str) -> u32 {
        self.tables
            .get(table)
            .map(|config| config.num_rows_per_pass)
            .unwrap_or(0)
    }
}
