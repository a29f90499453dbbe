// ⚠️ Error types - resolver and store boundaries
// Everything else propagates anyhow::Error with context

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A record id that is not in `table:key` form
    #[error("Malformed record id in field '{field}': {value:?}")]
    MalformedId { field: &'static str, value: String },

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
