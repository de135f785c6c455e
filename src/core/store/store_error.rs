// Storage failures shared by every persisted feature.
//
// Any of these is fatal for the operation that triggered it, but never for
// the process: callers log and keep serving other guilds.

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Database(String),
}
