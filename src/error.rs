use thiserror::Error;

/// Errors that can occur while polling the Monit status endpoint
#[derive(Error, Debug)]
pub enum PollError {
    #[error("Monit endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("Monit returned HTTP {0}")]
    BadStatus(u16),

    #[error("Failed to parse status XML: {0}")]
    ParseError(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that can occur in the snapshot store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to open database: {0}")]
    OpenFailed(String),

    #[error("Failed to read from store: {0}")]
    ReadFailed(String),

    #[error("Failed to write to store: {0}")]
    WriteFailed(String),

    #[error("SQL error: {0}")]
    SqlError(#[from] rusqlite::Error),
}

/// Errors that can occur during AI analysis handoff
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Backend communication failed: {0}")]
    BackendError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
