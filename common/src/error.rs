/// The error type for store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("malformed block trace {number}: {source}")]
    MalformedTrace {
        number: i64,
        source: serde_json::Error,
    },
    #[error("value {0} does not fit the column type")]
    OutOfRange(u64),
}
