use std::collections::{BTreeMap, BTreeSet};

use crate::constraints::Constraint;
use crate::error::{Error, Result};
use crate::schema::SchemaCatalog;

/// Validate internal consistency of a schema catalog.
///
/// This checks:
/// - duplicate tables/columns
/// - primary key and unique constraint columns exist
/// - foreign key columns and referenced targets exist
pub fn validate_catalog(catalog: &SchemaCatalog) -> Result<()> {
    let mut tables: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for table in &catalog.tables {
        if tables.contains_key(&table.name) {
            return Err(Error::InvalidCatalog(format!(
                "duplicate table name: {}",
                table.name
            )));
        }

        let mut columns = BTreeSet::new();
        for column in &table.columns {
            if !columns.insert(column.name.clone()) {
                return Err(Error::InvalidCatalog(format!(
                    "duplicate column name: {}.{}",
                    table.name, column.name
                )));
            }
        }

        tables.insert(table.name.clone(), columns);
    }

    for table in &catalog.tables {
        let columns = &tables[&table.name];

        for constraint in &table.constraints {
            match constraint {
                Constraint::PrimaryKey(pk) => {
                    require_columns(&table.name, "primary key", &pk.columns, columns)?;
                }
                Constraint::Unique(unique) => {
                    require_columns(&table.name, "unique constraint", &unique.columns, columns)?;
                }
                Constraint::ForeignKey(fk) => {
                    require_columns(&table.name, "foreign key", &fk.columns, columns)?;

                    let target = tables.get(&fk.referenced_table).ok_or_else(|| {
                        Error::InvalidCatalog(format!(
                            "foreign key on {} references unknown table {}",
                            table.name, fk.referenced_table
                        ))
                    })?;
                    require_columns(
                        &fk.referenced_table,
                        "foreign key target",
                        &fk.referenced_columns,
                        target,
                    )?;

                    if fk.columns.len() != fk.referenced_columns.len() {
                        return Err(Error::InvalidCatalog(format!(
                            "foreign key on {} has mismatched column lists",
                            table.name
                        )));
                    }
                }
            }
        }
    }

    Ok(())
}

fn require_columns(
    table: &str,
    what: &str,
    wanted: &[String],
    present: &BTreeSet<String>,
) -> Result<()> {
    for column in wanted {
        if !present.contains(column) {
            return Err(Error::InvalidCatalog(format!(
                "{what} column not found: {table}.{column}"
            )));
        }
    }
    Ok(())
}
