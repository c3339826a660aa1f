mod config;
mod logging;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use seedsmith_core::{validate_catalog, Row, SchemaCatalog, Value};
use seedsmith_populate::{
    create_db_vocab, remove_db_data, GeneratorMap, PopulateEngine, PopulateOptions,
    TypedRowGenerator, VocabularySet,
};

use config::RunConfig;

#[derive(Debug, Error)]
enum CliError {
    #[error("core error: {0}")]
    Core(#[from] seedsmith_core::Error),
    #[error("population error: {0}")]
    Populate(#[from] seedsmith_populate::PopulateError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid schema file: {0}")]
    SchemaFile(#[from] serde_json::Error),
    #[error("invalid config file: {0}")]
    ConfigFile(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Parser, Debug)]
#[command(
    name = "seedsmith",
    version,
    about = "Populate a PostgreSQL schema with synthetic data"
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Database connection string; falls back to the DATABASE_URL
    /// environment variable.
    #[arg(long, value_name = "CONNECTION_STRING")]
    dsn: Option<String>,
    /// Schema catalog produced by introspection.
    #[arg(long, default_value = "schema.json")]
    schema_file: PathBuf,
    /// Run configuration.
    #[arg(long, default_value = "seedsmith.toml")]
    config: PathBuf,
    /// Enable debug logging.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load fixed vocabulary datasets, suspending the foreign keys that
    /// touch each vocabulary table while it loads.
    CreateVocab {
        /// Directory containing one `<table>.json` dataset per
        /// vocabulary table.
        #[arg(long, default_value = "vocab")]
        vocab_dir: PathBuf,
    },
    /// Generate synthetic rows for every configured table.
    CreateData {
        /// Story-then-tables cycles to run.
        #[arg(long, default_value_t = 1)]
        num_passes: u32,
    },
    /// Delete synthetic rows, leaving vocabulary tables intact.
    RemoveData,
    /// Check the schema catalog and report the population order.
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.common.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "seedsmith failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let catalog = load_catalog(&cli.common.schema_file)?;
    validate_catalog(&catalog)?;
    let config = load_config(&cli.common.config)?;

    if let Command::Validate = cli.command {
        return validate(&catalog, &config);
    }

    let pool = connect(&cli.common).await?;
    match cli.command {
        Command::CreateVocab { vocab_dir } => {
            create_vocab(&pool, &catalog, &config, &vocab_dir).await
        }
        Command::CreateData { num_passes } => {
            create_data(&pool, &catalog, &config, num_passes).await
        }
        Command::RemoveData => {
            remove_db_data(&pool, &catalog, &config.vocabulary_tables()).await?;
            info!("synthetic data removed");
            Ok(())
        }
        Command::Validate => unreachable!("handled above"),
    }
}

fn load_catalog(path: &Path) -> Result<SchemaCatalog, CliError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn load_config(path: &Path) -> Result<RunConfig, CliError> {
    if !path.exists() {
        warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(RunConfig::default());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&raw)?)
}

async fn connect(common: &CommonArgs) -> Result<PgPool, CliError> {
    let dsn = match &common.dsn {
        Some(dsn) => dsn.clone(),
        None => std::env::var("DATABASE_URL").map_err(|_| {
            CliError::InvalidConfig("pass --dsn or set DATABASE_URL".to_string())
        })?,
    };
    Ok(PgPoolOptions::new()
        .max_connections(5)
        .connect(&dsn)
        .await?)
}

fn validate(catalog: &SchemaCatalog, config: &RunConfig) -> Result<(), CliError> {
    let vocabulary = config.vocabulary_tables();
    let order = catalog.sorted_tables(&vocabulary);

    println!("population order:");
    for table in order {
        println!("  {}", table.name);
    }
    for name in &vocabulary {
        if catalog.table(name).is_none() {
            return Err(CliError::InvalidConfig(format!(
                "vocabulary table '{name}' is not in the schema file"
            )));
        }
        println!("  {name} (vocabulary)");
    }
    Ok(())
}

async fn create_vocab(
    pool: &PgPool,
    catalog: &SchemaCatalog,
    config: &RunConfig,
    vocab_dir: &Path,
) -> Result<(), CliError> {
    let vocabulary = load_vocabulary(vocab_dir, catalog, &config.vocabulary_tables())?;
    let loaded = create_db_vocab(pool, catalog, &vocabulary).await?;
    info!(tables = loaded.len(), "vocabulary tables loaded");
    for table in loaded {
        println!("{table}");
    }
    Ok(())
}

async fn create_data(
    pool: &PgPool,
    catalog: &SchemaCatalog,
    config: &RunConfig,
    num_passes: u32,
) -> Result<(), CliError> {
    let vocabulary = config.vocabulary_tables();
    let mut generators = build_generators(catalog, config, &vocabulary);

    let engine = PopulateEngine::new(PopulateOptions {
        num_passes,
        ..PopulateOptions::default()
    });
    let counts = engine
        .run(pool, catalog, &vocabulary, &mut generators, &[])
        .await?;

    for (table, count) in counts.iter() {
        println!("{table}: {count}");
    }
    Ok(())
}

/// One typed generator per non-vocabulary, non-ignored table. Stories
/// are code, not configuration; library consumers register them through
/// the engine directly.
fn build_generators(
    catalog: &SchemaCatalog,
    config: &RunConfig,
    vocabulary: &BTreeSet<String>,
) -> GeneratorMap {
    let mut generators = GeneratorMap::new();
    for table in &catalog.tables {
        if vocabulary.contains(&table.name) || config.is_ignored(&table.name) {
            continue;
        }
        let rows_per_pass = config.rows_per_pass(&table.name);
        if rows_per_pass == 0 {
            continue;
        }
        generators.insert(
            table.name.clone(),
            Box::new(TypedRowGenerator::new(table.clone(), rows_per_pass, config.seed)),
        );
    }
    generators
}

fn load_vocabulary(
    dir: &Path,
    catalog: &SchemaCatalog,
    names: &BTreeSet<String>,
) -> Result<VocabularySet, CliError> {
    let mut vocabulary = VocabularySet::new();
    for name in names {
        let table = catalog.table(name).ok_or_else(|| {
            CliError::InvalidConfig(format!(
                "vocabulary table '{name}' is not in the schema file"
            ))
        })?;

        let path = dir.join(format!("{name}.json"));
        let raw = std::fs::read_to_string(&path)?;
        let dataset: serde_json::Value = serde_json::from_str(&raw)?;
        let entries = dataset.as_array().ok_or_else(|| {
            CliError::InvalidConfig(format!("{} must contain a JSON array", path.display()))
        })?;

        let mut rows = Vec::with_capacity(entries.len());
        for entry in entries {
            let object = entry.as_object().ok_or_else(|| {
                CliError::InvalidConfig(format!(
                    "{} rows must be JSON objects",
                    path.display()
                ))
            })?;

            let mut row = Row::new();
            for (column_name, value) in object {
                let column = table.column(column_name).ok_or_else(|| {
                    CliError::InvalidConfig(format!(
                        "{name}.{column_name} is not in the schema file"
                    ))
                })?;
                row.insert(column_name.clone(), Value::from_json(value, column)?);
            }
            rows.push(row);
        }

        vocabulary.insert(name.clone(), rows);
    }
    Ok(vocabulary)
}
