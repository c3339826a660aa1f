use std::collections::BTreeSet;

use sqlx::PgPool;
use tracing::debug;

use seedsmith_core::SchemaCatalog;

use crate::errors::Result;
use crate::insert::{apply_search_path, quote_ident};

/// Delete all synthetic rows, leaving vocabulary tables intact.
///
/// Tables are cleared in reverse dependency order so child rows go before
/// the rows they reference.
pub async fn remove_db_data(
    pool: &PgPool,
    catalog: &SchemaCatalog,
    vocabulary: &BTreeSet<String>,
) -> Result<()> {
    let sorted = catalog.sorted_tables(vocabulary);

    let mut conn = pool.acquire().await?;
    apply_search_path(&mut conn, catalog).await?;

    for table in sorted.iter().rev() {
        debug!(table = %table.name, "deleting synthetic rows");
        let sql = format!("delete from {}", quote_ident(&table.name));
        sqlx::query(&sql).execute(&mut *conn).await?;
    }

    Ok(())
}
