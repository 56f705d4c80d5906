use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsumptionError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid tolerance {0}: must be a finite, non-negative amount")]
    InvalidTolerance(f64),

    #[error("Failed to read rows from source '{source_name}': {details}")]
    SourceRead {
        source_name: String,
        details: String,
    },

    #[error("Reconciliation mismatch in '{comparison}': expected {expected:.2}, got {actual:.2} (difference {difference:.2})")]
    ReconciliationMismatch {
        comparison: String,
        expected: f64,
        actual: f64,
        difference: f64,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConsumptionError>;
