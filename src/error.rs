//! Error types for the symbol index.
//!
//! Structured, `thiserror`-based error kinds. Per spec §7, no failure may
//! cross a public read API as an exception — reads degrade to empty/partial
//! results and log. Write-side operations (`write`, `updateFile`, `flush`)
//! return `IndexResult<T>` and the caller is expected to log and continue.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for indexing, shard, and persistence operations.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {language} file '{path}': {reason}")]
    ParseError {
        path: PathBuf,
        language: String,
        reason: String,
    },

    #[error(
        "unsupported file type '{extension}' for file '{path}'; only .ts, .tsx, .js, .jsx, .mjs, .cjs are indexed"
    )]
    UnsupportedFileType { path: PathBuf, extension: String },

    #[error("failed to persist shard for '{uri}': {source}")]
    PersistenceError {
        uri: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to load shard for '{uri}': {source}")]
    LoadError {
        uri: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("symbol '{name}' not found")]
    SymbolNotFound { name: String },

    #[error("no shard found for '{uri}'; the file may not be indexed yet")]
    FileNotFound { uri: String },

    #[error("invalid configuration: {reason}")]
    ConfigError { reason: String },

    #[error("shard for '{uri}' is corrupted: {reason}")]
    ShardCorrupted { uri: String, reason: String },

    #[error("shard version mismatch for '{uri}': on-disk {on_disk}, current {current}")]
    ShardVersionMismatch {
        uri: String,
        on_disk: u32,
        current: u32,
    },

    #[error("path '{path}' rejected during sanitization: {reason}")]
    PathSanitizationFailure { path: String, reason: String },

    #[error("worker pool task for '{uri}' timed out after {timeout_secs}s")]
    WorkerTimeout { uri: String, timeout_secs: u64 },

    #[error("worker crashed while processing '{uri}': {reason}")]
    WorkerCrashed { uri: String, reason: String },

    #[error("finalization of '{uri}' exceeded its {timeout_secs}s cap")]
    FinalizationTimeout { uri: String, timeout_secs: u64 },

    #[error("internal mutex was poisoned, likely due to a panic in another thread")]
    MutexPoisoned,

    #[error("{0}")]
    General(String),
}

impl IndexError {
    /// Short recovery hint for CLI surfaces; not exhaustive.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::ShardCorrupted { .. } | Self::ShardVersionMismatch { .. } => {
                vec!["the file will be re-indexed on the next ensure_up_to_date pass"]
            }
            Self::MutexPoisoned => vec!["restart the process to clear the poisoned state"],
            Self::LoadError { .. } | Self::PersistenceError { .. } => {
                vec!["check disk space and permissions under the cache root"]
            }
            Self::WorkerTimeout { .. } | Self::WorkerCrashed { .. } => {
                vec!["the offending worker was replaced; re-run indexing for this file"]
            }
            Self::UnsupportedFileType { .. } => {
                vec!["only TypeScript/JavaScript sources are indexed"]
            }
            _ => vec![],
        }
    }
}

/// Result type alias used throughout the crate.
pub type IndexResult<T> = Result<T, IndexError>;

/// Helper trait for adding context to foreign errors.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T, IndexError>;
    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> Result<T, IndexError> {
        self.map_err(|e| IndexError::General(format!("{msg}: {e}")))
    }

    fn with_path(self, path: &std::path::Path) -> Result<T, IndexError> {
        self.map_err(|e| {
            IndexError::General(format!("error processing '{}': {}", path.display(), e))
        })
    }
}
