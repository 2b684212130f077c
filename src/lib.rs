/// Error types for the monitoring pipeline
pub mod error;

/// Core data types shared across components
pub mod types;

/// Configuration management
pub mod config;

/// Monit HTTP status client
pub mod monit;

/// Snapshot and failure state persistence
pub mod store;

/// Failure transition classification
pub mod tracker;

/// Per-service log fetching strategies
pub mod logs;

/// Scheduled status ingestion
pub mod poller;

/// Detection, log fetch, and analysis handoff
pub mod pipeline;

/// LLM analysis backends
pub mod analysis;

// Re-export commonly used types
pub use error::{AnalysisError, ConfigError, PollError, StoreError};
