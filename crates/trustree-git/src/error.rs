//! Error types for trustree-git

use std::path::PathBuf;

/// Result type for trustree-git operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trustree-git operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Repository not found at {path}")]
    RepositoryNotFound { path: PathBuf },

    #[error("{path} not available at revision {commit}")]
    NoSuchRevisionPath { path: String, commit: String },

    #[error("{path} not a valid json at revision {commit}: {message}")]
    InvalidJson {
        path: String,
        commit: String,
        message: String,
    },

    #[error("Invalid repository name: {name}")]
    InvalidRepositoryName { name: String },
}
