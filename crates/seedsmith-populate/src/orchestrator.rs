use std::collections::{BTreeMap, BTreeSet};

use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, info};

use seedsmith_core::{merge_rows, Row, SchemaCatalog, Table};

use crate::errors::{PopulateError, Result};
use crate::generator::GeneratorMap;
use crate::insert::{apply_search_path, insert_returning, insert_row};
use crate::story::{Story, StoryDescriptor, StoryStep};
use crate::unique::{UniqueTrackers, DEFAULT_MAX_TRIES};

/// Rows inserted per table, accumulated additively across stories, table
/// batches, and passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowCounts(BTreeMap<String, u64>);

impl RowCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, table: &str) {
        *self.0.entry(table.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: RowCounts) {
        for (table, count) in other.0 {
            *self.0.entry(table).or_insert(0) += count;
        }
    }

    pub fn get(&self, table: &str) -> u64 {
        self.0.get(table).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(table, count)| (table.as_str(), *count))
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Options for a population run.
#[derive(Debug, Clone)]
pub struct PopulateOptions {
    /// Full story-then-tables cycles to run.
    pub num_passes: u32,
    /// Attempt bound for unique-value generation.
    pub max_unique_tries: u32,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            num_passes: 1,
            max_unique_tries: DEFAULT_MAX_TRIES,
        }
    }
}

/// Drives population passes against a target database.
pub struct PopulateEngine {
    options: PopulateOptions,
}

impl PopulateEngine {
    pub fn new(options: PopulateOptions) -> Self {
        Self { options }
    }

    /// Run the configured number of passes and return accumulated row
    /// counts. Unique trackers live for the whole run; counts from every
    /// pass are added together.
    ///
    /// Any unhandled database error aborts the active story or table
    /// batch, rolls back its transaction, and propagates; transactions
    /// committed by earlier passes, stories, or batches stay committed.
    pub async fn run(
        &self,
        pool: &PgPool,
        catalog: &SchemaCatalog,
        vocabulary: &BTreeSet<String>,
        generators: &mut GeneratorMap,
        stories: &[StoryDescriptor],
    ) -> Result<RowCounts> {
        let sorted: Vec<Table> = catalog
            .sorted_tables(vocabulary)
            .into_iter()
            .cloned()
            .collect();

        let mut conn = pool.acquire().await?;
        apply_search_path(&mut conn, catalog).await?;

        let mut uniques = UniqueTrackers::new(self.options.max_unique_tries);
        let mut totals = RowCounts::new();
        for pass in 1..=self.options.num_passes {
            debug!(pass, "starting population pass");
            let counts = populate(&mut conn, &sorted, generators, stories, &mut uniques).await?;
            totals.merge(counts);
        }

        info!(
            passes = self.options.num_passes,
            rows = totals.total(),
            "population finished"
        );
        Ok(totals)
    }
}

/// Run one population pass: every story execution first, each in its own
/// transaction, then standalone generation table by table in dependency
/// order, one transaction per table.
pub async fn populate(
    conn: &mut PgConnection,
    tables: &[Table],
    generators: &mut GeneratorMap,
    stories: &[StoryDescriptor],
    uniques: &mut UniqueTrackers,
) -> Result<RowCounts> {
    let mut counts = RowCounts::new();
    let table_index: BTreeMap<&str, &Table> =
        tables.iter().map(|table| (table.name.as_str(), table)).collect();

    for descriptor in stories {
        for _ in 0..descriptor.stories_per_pass {
            debug!(story = %descriptor.name, "generating data for story");
            let mut story = descriptor.instantiate();
            let mut tx = conn.begin().await?;
            let story_counts = run_story(
                &mut tx,
                &descriptor.name,
                story.as_mut(),
                &table_index,
                generators,
                uniques,
            )
            .await?;
            tx.commit().await?;
            counts.merge(story_counts);
        }
    }

    for table in tables {
        let Some(generator) = generators.get_mut(&table.name) else {
            // No generator registered: vocabulary table or intentionally
            // excluded.
            continue;
        };
        let rows_per_pass = generator.rows_per_pass();
        if rows_per_pass == 0 {
            continue;
        }

        debug!(table = %table.name, rows = rows_per_pass, "generating data for table");
        let mut tx = conn.begin().await?;
        for _ in 0..rows_per_pass {
            let row = generator.generate(&mut tx, uniques).await?;
            insert_row(&mut tx, &table.name, &row).await?;
            counts.increment(&table.name);
        }
        tx.commit().await?;
    }

    Ok(counts)
}

/// Drive one story to completion inside the caller's transaction.
///
/// Per emitted step: generator defaults are overlaid with the story's
/// provided values (provided wins), the insert returns every
/// database-assigned value, and the story is resumed with the merged
/// final row (returned wins) so later steps can reference it.
async fn run_story(
    conn: &mut PgConnection,
    story_name: &str,
    story: &mut dyn Story,
    tables: &BTreeMap<&str, &Table>,
    generators: &mut GeneratorMap,
    uniques: &mut UniqueTrackers,
) -> Result<RowCounts> {
    let mut counts = RowCounts::new();
    let mut feedback: Option<Row> = None;

    loop {
        let step = story.next(&mut *conn, feedback.take()).await?;
        let (table_name, provided_values) = match step {
            StoryStep::Done => break,
            StoryStep::Emit { table, values } => (table, values),
        };

        if !tables.contains_key(table_name.as_str()) {
            return Err(PopulateError::Story {
                name: story_name.to_string(),
                message: format!("emitted a row for unknown table '{table_name}'"),
            });
        }

        let default_values = match generators.get_mut(&table_name) {
            Some(generator) => generator.generate(&mut *conn, uniques).await?,
            None => Row::new(),
        };
        let insert_values = merge_rows(&default_values, &provided_values);
        let returned_values = insert_returning(&mut *conn, &table_name, &insert_values).await?;
        let final_values = merge_rows(&insert_values, &returned_values);

        counts.increment(&table_name);
        feedback = Some(final_values);
    }

    Ok(counts)
}
