use std::collections::BTreeMap;

use sqlx::{Connection, PgConnection, PgPool};
use tracing::{debug, info, warn};

use seedsmith_core::{ForeignKey, Row, SchemaCatalog};

use crate::errors::{
    is_duplicate_object, is_integrity_violation, is_undefined_object, PopulateError, Result,
};
use crate::insert::{apply_search_path, insert_row, quote_ident};

/// Fixed reference rows per vocabulary table, supplied in memory. The
/// engine performs no file I/O; callers deserialize datasets themselves.
pub type VocabularySet = BTreeMap<String, Vec<Row>>;

/// A foreign-key constraint suspended while vocabulary data loads.
#[derive(Debug, Clone)]
struct SuspendedConstraint {
    owner_table: String,
    fk: ForeignKey,
}

/// Load fixed vocabulary datasets, suspending and restoring the
/// foreign-key constraints that touch each vocabulary table.
///
/// Constraints are dropped so bulk loads need not follow population
/// order. Every drop, every table load, and every restore runs in its own
/// transaction, so one failing table never blocks the others. Returns the
/// names of the tables that loaded successfully, in load order.
pub async fn create_db_vocab(
    pool: &PgPool,
    catalog: &SchemaCatalog,
    vocabulary: &VocabularySet,
) -> Result<Vec<String>> {
    let mut conn = pool.acquire().await?;
    apply_search_path(&mut conn, catalog).await?;

    let mut loaded = Vec::new();
    let mut suspended: Vec<SuspendedConstraint> = Vec::new();

    for (table_name, rows) in vocabulary {
        if catalog.table(table_name).is_none() {
            return Err(PopulateError::UnknownTable(table_name.clone()));
        }

        for constraint in constraints_touching(catalog, table_name) {
            drop_constraint(&mut conn, &constraint).await?;
            suspended.push(constraint);
        }

        match load_rows(&mut conn, table_name, rows).await {
            Ok(()) => {
                info!(table = %table_name, rows = rows.len(), "loaded vocabulary table");
                loaded.push(table_name.clone());
            }
            Err(err) if is_load_failure(&err) => {
                warn!(table = %table_name, error = %err, "loading vocabulary table failed");
            }
            Err(err) => return Err(err),
        }
    }

    for constraint in &suspended {
        restore_constraint(&mut conn, constraint).await?;
    }

    Ok(loaded)
}

/// Every foreign-key constraint that originates at or references the
/// given table, paired with its owning table.
fn constraints_touching(catalog: &SchemaCatalog, table_name: &str) -> Vec<SuspendedConstraint> {
    let mut constraints = Vec::new();
    for table in &catalog.tables {
        for fk in table.foreign_keys() {
            if table.name == table_name || fk.referenced_table == table_name {
                constraints.push(SuspendedConstraint {
                    owner_table: table.name.clone(),
                    fk: fk.clone(),
                });
            }
        }
    }
    constraints
}

fn drop_constraint_sql(constraint: &SuspendedConstraint) -> String {
    format!(
        "alter table {} drop constraint {}",
        quote_ident(&constraint.owner_table),
        quote_ident(&constraint.fk.constraint_name(&constraint.owner_table))
    )
}

fn restore_constraint_sql(constraint: &SuspendedConstraint) -> String {
    let columns = constraint
        .fk
        .columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let referenced_columns = constraint
        .fk
        .referenced_columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "alter table {} add constraint {} foreign key ({}) references {} ({})",
        quote_ident(&constraint.owner_table),
        quote_ident(&constraint.fk.constraint_name(&constraint.owner_table)),
        columns,
        quote_ident(&constraint.fk.referenced_table),
        referenced_columns
    )
}

async fn drop_constraint(conn: &mut PgConnection, constraint: &SuspendedConstraint) -> Result<()> {
    let name = constraint.fk.constraint_name(&constraint.owner_table);
    debug!(table = %constraint.owner_table, constraint = %name, "dropping constraint");

    let sql = drop_constraint_sql(constraint);
    let mut tx = conn.begin().await?;
    match sqlx::query(&sql).execute(&mut *tx).await {
        Ok(_) => {
            tx.commit().await?;
            Ok(())
        }
        Err(err) if is_undefined_object(&err) => {
            debug!(constraint = %name, "constraint does not exist");
            Ok(())
        }
        Err(err) if is_integrity_violation(&err) => {
            warn!(
                table = %constraint.owner_table,
                constraint = %name,
                error = %err,
                "dropping constraint failed, leaving it in place"
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn restore_constraint(
    conn: &mut PgConnection,
    constraint: &SuspendedConstraint,
) -> Result<()> {
    let name = constraint.fk.constraint_name(&constraint.owner_table);
    debug!(table = %constraint.owner_table, constraint = %name, "restoring constraint");

    let sql = restore_constraint_sql(constraint);
    let mut tx = conn.begin().await?;
    match sqlx::query(&sql).execute(&mut *tx).await {
        Ok(_) => {
            tx.commit().await?;
            Ok(())
        }
        Err(err) if is_duplicate_object(&err) => {
            debug!(constraint = %name, "constraint already present");
            Ok(())
        }
        Err(err) if is_integrity_violation(&err) => {
            warn!(
                table = %constraint.owner_table,
                constraint = %name,
                error = %err,
                "restoring constraint failed"
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

async fn load_rows(conn: &mut PgConnection, table: &str, rows: &[Row]) -> Result<()> {
    let mut tx = conn.begin().await?;
    for row in rows {
        insert_row(&mut tx, table, row).await?;
    }
    tx.commit().await?;
    Ok(())
}

fn is_load_failure(err: &PopulateError) -> bool {
    match err {
        PopulateError::Db(db) => is_integrity_violation(db),
        _ => false,
    }
}
