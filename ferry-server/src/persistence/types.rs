use thiserror::Error;

/// Persistence error types
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Log corrupted at offset {offset}: {reason}")]
    Corrupted { offset: u64, reason: String },

    #[error("Range {pos}+{len} is outside the log ({size} bytes flushed)")]
    OutOfRange { pos: u64, len: u64, size: u64 },

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        PersistenceError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
