//! Shared test utilities for the trustree workspace.
//!
//! Provides git repository fixtures used by the crate test suites and the
//! integration tests. It is a dev-dependency only — never published.

pub mod git;

pub use git::{commit_files, init_repo, json};
