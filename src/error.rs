//! Error types for cache-dance
//!
//! All modules use `DanceResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache-dance operations
pub type DanceResult<T> = Result<T, DanceError>;

/// All errors that can occur while moving caches in or out of BuildKit
#[derive(Error, Debug)]
pub enum DanceError {
    // Configuration errors
    #[error("Invalid cache mount for '{source_path}': {reason}")]
    Config { source_path: String, reason: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Invalid cache map: {0}")]
    CacheMapInvalid(String),

    #[error("Invalid setting {key}: {reason}")]
    Setting { key: String, reason: String },

    // Transfer errors
    #[error("Builder failed for job {job}: {reason}")]
    BuilderExecution { job: String, reason: String },

    #[error("Failed to relocate cache at {path}: {reason}")]
    Relocation { path: PathBuf, reason: String },

    #[error("Cleanup of {what} failed: {reason}")]
    Cleanup { what: String, reason: String },

    #[error("{failed} of {total} cache transfer(s) failed: {}", summarize(.errors))]
    Aggregate {
        failed: usize,
        total: usize,
        errors: Vec<DanceError>,
    },

    #[error("Cache transfer timed out after {secs}s")]
    Timeout { secs: u64 },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command exited with {}: {command}", exit_label(.code))]
    CommandExit { command: String, code: Option<i32> },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("code {}", code),
        None => "signal".to_string(),
    }
}

fn summarize(errors: &[DanceError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DanceError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a mount configuration error
    pub fn config(source_path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            source_path: source_path.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid setting error
    pub fn setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Setting {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a relocation error
    pub fn relocation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Relocation {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a cleanup error
    pub fn cleanup(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cleanup {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a process error as a builder failure for `job`
    pub fn builder(job: impl Into<String>, err: DanceError) -> Self {
        Self::BuilderExecution {
            job: job.into(),
            reason: err.to_string(),
        }
    }

    /// Whether this error belongs to a configuration problem detected before
    /// any process was spawned
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. }
                | Self::ConfigInvalid { .. }
                | Self::CacheMapInvalid(_)
                | Self::Setting { .. }
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::CommandFailed { command, .. } if command.starts_with("docker") => {
                Some("Install Docker with the buildx plugin, or set builder.command")
            }
            Self::CommandFailed { command, .. } if command.starts_with("tar") => {
                Some("Install tar, or set builder.archive_command")
            }
            Self::BuilderExecution { .. } => {
                Some("Check that the buildx builder exists: docker buildx ls")
            }
            Self::CacheMapInvalid(_) => {
                Some(r#"Expected JSON like {"cache": "/root/.cache"} or {"cache": {"target": "/root/.cache", "id": "pkg"}}"#)
            }
            Self::Timeout { .. } => Some("Raise transfer.timeout_secs or pass --timeout 0"),
            _ => None,
        }
    }
}

/// Log the outcome of a best-effort operation and discard it
pub fn best_effort(what: &str, result: DanceResult<()>) {
    if let Err(e) = result {
        tracing::warn!("Best-effort {} failed: {}", what, e);
    }
}
