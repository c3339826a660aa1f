use thiserror::Error;

/// Errors emitted by the population engine.
#[derive(Debug, Error)]
pub enum PopulateError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    /// The bounded-retry unique generator ran out of attempts: the value
    /// space is likely too small for the requested row count.
    #[error(
        "could not generate a novel value for {table} ({columns}) within {max_tries} attempts"
    )]
    UniqueExhausted {
        table: String,
        columns: String,
        max_tries: u32,
    },
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("no rows to sample in {referenced_table} for foreign key {table}.{column}")]
    MissingParentRows {
        table: String,
        column: String,
        referenced_table: String,
    },
    #[error("story '{name}': {message}")]
    Story { name: String, message: String },
    #[error(transparent)]
    Core(#[from] seedsmith_core::Error),
}

/// Convenience alias for results returned by the population engine.
pub type Result<T> = std::result::Result<T, PopulateError>;

/// SQLSTATE of a database-reported error, when available.
pub(crate) fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    }
}

/// Integrity-constraint violation class (SQLSTATE 23xxx).
pub(crate) fn is_integrity_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code.starts_with("23"))
}

/// The named object does not exist (SQLSTATE 42704).
pub(crate) fn is_undefined_object(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == "42704")
}

/// The named object already exists (SQLSTATE 42710).
pub(crate) fn is_duplicate_object(err: &sqlx::Error) -> bool {
    sqlstate(err).is_some_and(|code| code == "42710")
}
