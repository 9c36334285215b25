use thiserror::Error;

/// Main error type for Enclavegen operations
#[derive(Error, Debug)]
pub enum EnclavegenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Analyzer error: {0}")]
    Analyzer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Template error: {0}")]
    Template(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Boundary validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, EnclavegenError>;
