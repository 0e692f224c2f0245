//! Working-tree state probing for target repositories
//!
//! Read-only checks used by the update pipeline to classify a repository
//! relative to its expected on-disk state and the last signed commit.

use git2::{Repository, StatusOptions};

use crate::repository::{GitRepository, RepositoryHandle};
use crate::Result;

/// On-disk state of a target repository's working tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not cloned (or not a git repository)
    Missing,
    /// Cloned as a bare repository
    Bare,
    /// Has uncommitted local changes
    Dirty,
    /// Cloned, non-bare, no local changes
    Clean,
}

/// State of a repository's HEAD relative to the last signed commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// HEAD matches the last signed commit
    UpToDate,
    /// HEAD differs from the last signed commit, or no commit was signed
    Unsigned,
    /// The repository or its HEAD does not exist
    NotFound,
}

impl GitRepository {
    /// Classify the working tree without mutating anything.
    pub fn sync_state(&self) -> Result<SyncState> {
        let path = self.path();
        let Ok(repo) = Repository::open(&path) else {
            tracing::debug!("Repository {} not found on disk", path.display());
            return Ok(SyncState::Missing);
        };
        if repo.is_bare() {
            return Ok(SyncState::Bare);
        }
        let mut options = StatusOptions::new();
        options.include_untracked(true).include_ignored(false);
        let statuses = repo.statuses(Some(&mut options))?;
        if statuses.is_empty() {
            Ok(SyncState::Clean)
        } else {
            Ok(SyncState::Dirty)
        }
    }

    /// Compare HEAD against the last signed commit.
    pub fn validation_state(&self, last_signed: Option<&str>) -> Result<ValidationState> {
        let Ok(repo) = Repository::open(self.path()) else {
            return Ok(ValidationState::NotFound);
        };
        let Some(head) = repo.head().ok().and_then(|head| head.peel_to_commit().ok()) else {
            return Ok(ValidationState::NotFound);
        };
        match last_signed {
            Some(signed) if head.id().to_string() == signed => Ok(ValidationState::UpToDate),
            _ => Ok(ValidationState::Unsigned),
        }
    }
}
