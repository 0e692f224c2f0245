//! Error types for trustree-core

use std::path::PathBuf;

/// Result type for trustree-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trustree-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// URL or class resolution/construction failed for one repository path.
    /// Aborts the current commit's load pass.
    #[error("Could not instantiate repository {path}: {message}")]
    RepositoryInstantiation { path: String, message: String },

    /// Query against an auth repo or commit that was never loaded, or a
    /// custom-data filter that matched nothing
    #[error("{message}")]
    RepositoriesNotFound { message: String },

    /// A required metadata file is absent at a revision or fails to parse
    #[error("{message}")]
    InvalidOrMissingMetadata { message: String },

    /// A lifecycle hook script exited with a non-zero status
    #[error("Hook script {script} failed: {message}")]
    HookFailed { script: PathBuf, message: String },

    /// Git error from trustree-git
    #[error(transparent)]
    Git(#[from] trustree_git::Error),

    /// JSON serialization/deserialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
