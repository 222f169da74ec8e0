//! Unified error type hierarchy for the benchmark harness.
//!
//! Each subsystem gets its own `thiserror` enum; `AppError` unifies them for
//! `main.rs`, which maps variants to the process exit codes in §6/§7 of the spec.

use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("invalid TOML in config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("invalid JSON in config: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("targets file missing: {0}")]
    TargetsFileMissing(String),

    #[error("I/O error during config operations: {0}")]
    Io(#[from] std::io::Error),
}

/// Sampler-level errors. Samplers isolate these internally and never
/// propagate them into a dropped row, but they are surfaced for logging.
#[derive(Error, Debug, Clone)]
pub enum SamplerError {
    #[error("read failed for {source}: {reason}")]
    ReadFailed { source: String, reason: String },

    #[error("sampler deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("RPC call failed: {0}")]
    Rpc(String),
}

/// Aggregator write-path errors.
#[derive(Error, Debug)]
pub enum AggregatorError {
    #[error("CSV append failed: {0}")]
    CsvWrite(String),

    #[error("symlink update failed: {0}")]
    SymlinkUpdate(String),

    #[error("snapshot write-rename failed: {0}")]
    SnapshotWrite(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Detector errors. Only raised for durable-write failures; missed ticks are
/// logged and otherwise silent per the spec's failure semantics.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("failed to persist bottleneck event: {0}")]
    EventWrite(String),

    #[error("failed to persist bottleneck verdict: {0}")]
    VerdictWrite(String),
}

/// Ramp controller errors.
#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("load generator invocation failed: {0}")]
    LoadGenFailed(String),

    #[error("load generator result file unparseable: {0}")]
    ResultUnparseable(String),

    #[error("status file write failed: {0}")]
    StatusWrite(String),
}

/// Archiver errors.
#[derive(Error, Debug)]
pub enum ArchiverError {
    #[error("failed to create archive directory: {0}")]
    CreateDir(String),

    #[error("failed to move run artifact {path}: {reason}")]
    MoveArtifact { path: String, reason: String },

    #[error("history index I/O failed: {0}")]
    HistoryIo(String),

    #[error("disk full or permission error: {0}")]
    Disk(String),
}

/// RPC client errors shared by the node and mainnet adapters.
#[derive(Error, Debug, Clone)]
pub enum RpcError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("response did not contain expected field: {0}")]
    MalformedResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Top-level error type for the harness binary and public library surface.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error(transparent)]
    Aggregator(#[from] AggregatorError),

    #[error(transparent)]
    Detector(#[from] DetectorError),

    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Archiver(#[from] ArchiverError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("pre-check failed: {0}")]
    PreCheck(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Single-line diagnostic suitable for CLI stderr output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Config(e) => format!("configuration error: {e}"),
            AppError::Sampler(e) => format!("sampler error: {e}"),
            AppError::Aggregator(e) => format!("metrics aggregator error: {e}"),
            AppError::Detector(e) => format!("bottleneck detector error: {e}"),
            AppError::Controller(e) => format!("ramp controller error: {e}"),
            AppError::Archiver(e) => format!("archiver error: {e}"),
            AppError::Rpc(e) => format!("RPC error: {e}"),
            AppError::InvalidArgs(msg) => format!("invalid arguments: {msg} (see --help)"),
            AppError::PreCheck(msg) => format!("pre-check failed: {msg}"),
            AppError::Io(e) => format!("I/O error: {e}"),
        }
    }

    /// Process exit code per the CLI contract in the spec's §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::InvalidArgs(_) => 2,
            AppError::Config(_) | AppError::PreCheck(_) => 3,
            _ => 1,
        }
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
