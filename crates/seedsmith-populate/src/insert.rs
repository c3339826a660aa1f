use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column as _, PgConnection, Postgres, Row as _, TypeInfo as _};
use tracing::warn;

use seedsmith_core::{Row, SchemaCatalog, Value};

use crate::errors::Result;

/// Quote an identifier for interpolation into a statement.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Point the session at the catalog's target namespace, if one is set.
pub(crate) async fn apply_search_path(
    conn: &mut PgConnection,
    catalog: &SchemaCatalog,
) -> Result<()> {
    if let Some(schema) = &catalog.schema {
        let sql = format!("set search_path to {}", quote_ident(schema));
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

/// Build an INSERT statement and its ordered bind values.
///
/// Explicit NULLs are omitted from the column list: a bound NULL carries
/// a concrete parameter type that Postgres rejects against most columns,
/// while an omitted column picks up the table default or NULL. A row with
/// no bindable values inserts as `DEFAULT VALUES`.
pub(crate) fn build_insert(table: &str, row: &Row, returning: bool) -> (String, Vec<Value>) {
    let present: Vec<(&String, &Value)> = row
        .iter()
        .filter(|(_, value)| !value.is_null())
        .collect();

    let mut sql = if present.is_empty() {
        format!("insert into {} default values", quote_ident(table))
    } else {
        let columns = present
            .iter()
            .map(|(column, _)| quote_ident(column))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=present.len())
            .map(|position| format!("${position}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "insert into {} ({}) values ({})",
            quote_ident(table),
            columns,
            placeholders
        )
    };
    if returning {
        sql.push_str(" returning *");
    }

    let values = present.into_iter().map(|(_, value)| value.clone()).collect();
    (sql, values)
}

fn bind_values<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Uuid(v) => query.bind(*v),
            Value::Date(v) => query.bind(*v),
            Value::Time(v) => query.bind(*v),
            Value::Timestamp(v) => query.bind(*v),
            Value::Json(v) => query.bind(v),
        };
    }
    query
}

/// Insert one row without reading anything back.
pub(crate) async fn insert_row(conn: &mut PgConnection, table: &str, row: &Row) -> Result<()> {
    let (sql, values) = build_insert(table, row, false);
    bind_values(sqlx::query(&sql), &values)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Insert one row and return the persisted row, including
/// database-assigned values such as serial identifiers and defaults.
pub(crate) async fn insert_returning(
    conn: &mut PgConnection,
    table: &str,
    row: &Row,
) -> Result<Row> {
    let (sql, values) = build_insert(table, row, true);
    let returned = bind_values(sqlx::query(&sql), &values)
        .fetch_one(&mut *conn)
        .await?;
    Ok(decode_pg_row(&returned))
}

/// Sample one existing value from a column, for foreign-key generation.
pub(crate) async fn sample_column_value(
    conn: &mut PgConnection,
    table: &str,
    column: &str,
) -> Result<Option<Value>> {
    let sql = format!(
        "select {} from {} order by random() limit 1",
        quote_ident(column),
        quote_ident(table)
    );
    let row = sqlx::query(&sql).fetch_optional(&mut *conn).await?;
    Ok(row.map(|row| decode_pg_row(&row).into_values().next().unwrap_or(Value::Null)))
}

/// Decode a database row into the engine's value model.
///
/// Column types without a mapping decode as NULL with a warning rather
/// than failing the run.
pub(crate) fn decode_pg_row(row: &PgRow) -> Row {
    let mut out = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = decode_column(row, index, column.type_info().name());
        let value = match value {
            Ok(value) => value,
            Err(err) => {
                warn!(column = %name, error = %err, "failed to decode returned column, using null");
                Value::Null
            }
        };
        out.insert(name, value);
    }
    out
}

fn decode_column(row: &PgRow, index: usize, type_name: &str) -> sqlx::Result<Value> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::Text)
        }
        "UUID" => row.try_get::<Option<uuid::Uuid>, _>(index)?.map(Value::Uuid),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(Value::Date),
        "TIME" => row
            .try_get::<Option<chrono::NaiveTime>, _>(index)?
            .map(Value::Time),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(Value::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|v| Value::Timestamp(v.naive_utc())),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)?
            .map(Value::Json),
        other => {
            warn!(column_type = %other, "unsupported column type in returned row, using null");
            Some(Value::Null)
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
