use thiserror::Error;

/// Core error type shared across Seedsmith crates.
#[derive(Debug, Error)]
pub enum Error {
    /// The catalog violates internal invariants.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    /// A table was referenced that the catalog does not contain.
    #[error("unknown table: {0}")]
    UnknownTable(String),
    /// A value could not be converted to the column's declared type.
    #[error("invalid value for {column}: {message}")]
    InvalidValue { column: String, message: String },
}

/// Convenience alias for results returned by Seedsmith crates.
pub type Result<T> = std::result::Result<T, Error>;
