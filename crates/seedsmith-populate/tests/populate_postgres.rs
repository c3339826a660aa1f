use std::collections::BTreeSet;
use std::env;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};

use seedsmith_core::{
    Column, ColumnType, Constraint, ForeignKey, PrimaryKey, Row, SchemaCatalog, Table,
    UniqueConstraint, Value,
};
use seedsmith_populate::{
    create_db_vocab, remove_db_data, PopulateEngine, PopulateOptions, Story, StoryDescriptor,
    StoryStep, TypedRowGenerator, VocabularySet,
};

fn database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
}

async fn connect(db_url: &str) -> Result<PgPool> {
    // A single connection keeps the fixture's search_path stable.
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(std::time::Duration::from_secs(10))
        .connect(db_url)
        .await
        .context("connecting to Postgres")
}

async fn reset_schema(pool: &PgPool, schema: &str, ddl: &[&str]) -> Result<()> {
    let mut statements = vec![
        format!("drop schema if exists {schema} cascade"),
        format!("create schema {schema}"),
        format!("set search_path to {schema}"),
    ];
    statements.extend(ddl.iter().map(|statement| statement.to_string()));

    for statement in statements {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .with_context(|| format!("executing fixture statement: {statement}"))?;
    }
    Ok(())
}

async fn count_rows(pool: &PgPool, table: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!("select count(*) from {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn int_column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        column_type: ColumnType {
            data_type: "integer".to_string(),
            character_max_length: None,
            numeric_scale: None,
        },
        is_nullable: true,
        default: None,
    }
}

fn text_column(name: &str) -> Column {
    Column {
        name: name.to_string(),
        column_type: ColumnType {
            data_type: "text".to_string(),
            character_max_length: None,
            numeric_scale: None,
        },
        is_nullable: true,
        default: None,
    }
}

fn serial_column(name: &str, sequence: &str) -> Column {
    Column {
        name: name.to_string(),
        column_type: ColumnType {
            data_type: "integer".to_string(),
            character_max_length: None,
            numeric_scale: None,
        },
        is_nullable: false,
        default: Some(format!("nextval('{sequence}'::regclass)")),
    }
}

fn primary_key(column: &str) -> Constraint {
    Constraint::PrimaryKey(PrimaryKey {
        name: None,
        columns: vec![column.to_string()],
    })
}

#[tokio::test]
async fn standalone_generation_yields_rows_per_pass_times_passes() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = connect(&db_url).await?;
    reset_schema(
        &pool,
        "ss_counts",
        &[
            "create table person (
                person_id serial primary key,
                nhs_number varchar(12) unique,
                born_on date
            )",
        ],
    )
    .await?;

    let person = Table {
        name: "person".to_string(),
        columns: vec![
            serial_column("person_id", "person_person_id_seq"),
            Column {
                name: "nhs_number".to_string(),
                column_type: ColumnType {
                    data_type: "character varying(12)".to_string(),
                    character_max_length: Some(12),
                    numeric_scale: None,
                },
                is_nullable: true,
                default: None,
            },
            Column {
                name: "born_on".to_string(),
                column_type: ColumnType {
                    data_type: "date".to_string(),
                    character_max_length: None,
                    numeric_scale: None,
                },
                is_nullable: true,
                default: None,
            },
        ],
        constraints: vec![
            primary_key("person_id"),
            Constraint::Unique(UniqueConstraint {
                name: Some("person_nhs_number_key".to_string()),
                columns: vec!["nhs_number".to_string()],
            }),
        ],
    };
    let catalog = SchemaCatalog {
        catalog_version: "0.1".to_string(),
        schema: Some("ss_counts".to_string()),
        tables: vec![person.clone()],
    };

    let mut generators = seedsmith_populate::GeneratorMap::new();
    generators.insert(
        "person".to_string(),
        Box::new(TypedRowGenerator::new(person, 3, Some(11))),
    );

    let engine = PopulateEngine::new(PopulateOptions {
        num_passes: 4,
        ..PopulateOptions::default()
    });
    let counts = engine
        .run(&pool, &catalog, &BTreeSet::new(), &mut generators, &[])
        .await?;

    assert_eq!(counts.get("person"), 12);
    assert_eq!(count_rows(&pool, "ss_counts.person").await?, 12);
    Ok(())
}

/// Create a person, then a visit referencing the person's
/// database-assigned identifier.
struct AdmissionStory {
    state: u8,
}

#[async_trait]
impl Story for AdmissionStory {
    async fn next(
        &mut self,
        _conn: &mut PgConnection,
        feedback: Option<Row>,
    ) -> seedsmith_populate::Result<StoryStep> {
        match self.state {
            0 => {
                self.state = 1;
                Ok(StoryStep::emit("person", Row::new()))
            }
            1 => {
                self.state = 2;
                let person = feedback.expect("resolved person row");
                let person_id = person
                    .get("person_id")
                    .cloned()
                    .expect("database-assigned person_id");
                let mut values = Row::new();
                values.insert("person_id".to_string(), person_id);
                values.insert("ward".to_string(), Value::Text("observation".to_string()));
                Ok(StoryStep::emit("visit", values))
            }
            _ => Ok(StoryStep::Done),
        }
    }
}

#[tokio::test]
async fn stories_feed_database_assigned_values_into_later_steps() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = connect(&db_url).await?;
    reset_schema(
        &pool,
        "ss_story",
        &[
            "create table person (
                person_id serial primary key,
                notes text
            )",
            "create table visit (
                visit_id serial primary key,
                person_id integer not null references person (person_id),
                ward text
            )",
        ],
    )
    .await?;

    let person = Table {
        name: "person".to_string(),
        columns: vec![
            serial_column("person_id", "person_person_id_seq"),
            text_column("notes"),
        ],
        constraints: vec![primary_key("person_id")],
    };
    let visit = Table {
        name: "visit".to_string(),
        columns: vec![
            serial_column("visit_id", "visit_visit_id_seq"),
            int_column("person_id"),
            text_column("ward"),
        ],
        constraints: vec![
            primary_key("visit_id"),
            Constraint::ForeignKey(ForeignKey {
                name: Some("visit_person_id_fkey".to_string()),
                columns: vec!["person_id".to_string()],
                referenced_table: "person".to_string(),
                referenced_columns: vec!["person_id".to_string()],
            }),
        ],
    };
    let catalog = SchemaCatalog {
        catalog_version: "0.1".to_string(),
        schema: Some("ss_story".to_string()),
        tables: vec![person, visit],
    };

    let stories = vec![StoryDescriptor::new("admission", 2, || {
        Box::new(AdmissionStory { state: 0 })
    })];

    let mut generators = seedsmith_populate::GeneratorMap::new();
    let engine = PopulateEngine::new(PopulateOptions {
        num_passes: 3,
        ..PopulateOptions::default()
    });
    let counts = engine
        .run(&pool, &catalog, &BTreeSet::new(), &mut generators, &stories)
        .await?;

    // Two stories per pass, three passes, one person and one visit each.
    assert_eq!(counts.get("person"), 6);
    assert_eq!(counts.get("visit"), 6);

    // Every visit must reference the person created by its own story.
    let linked: i64 = sqlx::query_scalar(
        "select count(*) from ss_story.visit v
         join ss_story.person p on p.person_id = v.person_id",
    )
    .fetch_one(&pool)
    .await?;
    assert_eq!(linked, 6);
    Ok(())
}

#[tokio::test]
async fn vocabulary_load_restores_foreign_keys() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = connect(&db_url).await?;
    reset_schema(
        &pool,
        "ss_vocab",
        &[
            "create table concept (
                concept_id integer primary key,
                name text not null
            )",
            "create table person (
                person_id serial primary key,
                favourite_concept_id integer,
                constraint person_favourite_concept_id_fkey
                    foreign key (favourite_concept_id) references concept (concept_id)
            )",
        ],
    )
    .await?;

    let concept = Table {
        name: "concept".to_string(),
        columns: vec![int_column("concept_id"), text_column("name")],
        constraints: vec![primary_key("concept_id")],
    };
    let person = Table {
        name: "person".to_string(),
        columns: vec![
            serial_column("person_id", "person_person_id_seq"),
            int_column("favourite_concept_id"),
        ],
        constraints: vec![
            primary_key("person_id"),
            Constraint::ForeignKey(ForeignKey {
                name: Some("person_favourite_concept_id_fkey".to_string()),
                columns: vec!["favourite_concept_id".to_string()],
                referenced_table: "concept".to_string(),
                referenced_columns: vec!["concept_id".to_string()],
            }),
        ],
    };
    let catalog = SchemaCatalog {
        catalog_version: "0.1".to_string(),
        schema: Some("ss_vocab".to_string()),
        tables: vec![concept, person],
    };

    let mut rows = Vec::new();
    for (concept_id, name) in [(100, "systolic blood pressure"), (200, "heart rate")] {
        let mut row = Row::new();
        row.insert("concept_id".to_string(), Value::Int(concept_id));
        row.insert("name".to_string(), Value::Text(name.to_string()));
        rows.push(row);
    }
    let mut vocabulary = VocabularySet::new();
    vocabulary.insert("concept".to_string(), rows);

    let loaded = create_db_vocab(&pool, &catalog, &vocabulary).await?;
    assert_eq!(loaded, vec!["concept".to_string()]);
    assert_eq!(count_rows(&pool, "ss_vocab.concept").await?, 2);

    // The inbound constraint must be back, with its original declaration.
    let restored: Vec<(String, String)> = sqlx::query_as(
        "select c.conname, c.confrelid::regclass::text
         from pg_constraint c
         join pg_class r on r.oid = c.conrelid
         join pg_namespace n on n.oid = r.relnamespace
         where n.nspname = 'ss_vocab' and c.contype = 'f'",
    )
    .fetch_all(&pool)
    .await?;
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].0, "person_favourite_concept_id_fkey");
    assert!(restored[0].1.ends_with("concept"));

    // The constraint is live again: a dangling reference must be rejected.
    let dangling = sqlx::query(
        "insert into ss_vocab.person (favourite_concept_id) values (999999)",
    )
    .execute(&pool)
    .await;
    assert!(dangling.is_err());
    Ok(())
}

#[tokio::test]
async fn remove_data_spares_vocabulary_tables() -> Result<()> {
    let Some(db_url) = database_url() else {
        eprintln!("skipping: set TEST_DATABASE_URL or DATABASE_URL");
        return Ok(());
    };
    let pool = connect(&db_url).await?;
    reset_schema(
        &pool,
        "ss_remove",
        &[
            "create table concept (
                concept_id integer primary key,
                name text not null
            )",
            "create table person (
                person_id serial primary key,
                notes text
            )",
            "insert into concept values (1, 'kept')",
            "insert into person (notes) values ('synthetic')",
        ],
    )
    .await?;

    let concept = Table {
        name: "concept".to_string(),
        columns: vec![int_column("concept_id"), text_column("name")],
        constraints: vec![primary_key("concept_id")],
    };
    let person = Table {
        name: "person".to_string(),
        columns: vec![
            serial_column("person_id", "person_person_id_seq"),
            text_column("notes"),
        ],
        constraints: vec![primary_key("person_id")],
    };
    let catalog = SchemaCatalog {
        catalog_version: "0.1".to_string(),
        schema: Some("ss_remove".to_string()),
        tables: vec![concept, person],
    };

    let vocabulary: BTreeSet<String> = [String::from("concept")].into();
    remove_db_data(&pool, &catalog, &vocabulary).await?;

    assert_eq!(count_rows(&pool, "ss_remove.person").await?, 0);
    assert_eq!(count_rows(&pool, "ss_remove.concept").await?, 1);
    Ok(())
}
