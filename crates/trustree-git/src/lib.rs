//! Git-backed authentication repository access for Trustree
//!
//! Layer 0 of the trustree workspace: typed handles for target
//! repositories, the [`AuthRepo`] trait behind which the signed-metadata
//! subsystem and git plumbing live, and working-tree state probing.

pub mod auth;
pub mod error;
pub mod repository;
pub mod sync;

pub use auth::{
    AuthRepo, GitAuthRepository, SignedTarget, METADATA_DIRECTORY_NAME, TARGETS_DIRECTORY_NAME,
};
pub use error::{Error, Result};
pub use repository::{GitRepository, RepositoryHandle};
pub use sync::{SyncState, ValidationState};
