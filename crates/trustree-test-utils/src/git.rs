//! Git repository fixtures built with `git2`.
//!
//! All helpers panic on failure — they are only ever called from tests,
//! where a broken fixture should abort the test immediately.

use std::fs;
use std::path::Path;

use git2::{IndexAddOption, Repository};

/// Initialises a real git repository at `path` with commit identity
/// configured, creating the directory first if needed.
///
/// # Panics
/// Panics if directory creation or `git2::Repository::init` fails.
pub fn init_repo(path: &Path) -> Repository {
    fs::create_dir_all(path)
        .unwrap_or_else(|e| panic!("init_repo: failed to create {}: {e}", path.display()));
    let repo = Repository::init(path)
        .unwrap_or_else(|e| panic!("init_repo: failed to init repository at {}: {e}", path.display()));
    {
        let mut config = repo
            .config()
            .unwrap_or_else(|e| panic!("init_repo: failed to open config: {e}"));
        config
            .set_str("user.name", "Test User")
            .unwrap_or_else(|e| panic!("init_repo: failed to set user.name: {e}"));
        config
            .set_str("user.email", "test@test.com")
            .unwrap_or_else(|e| panic!("init_repo: failed to set user.email: {e}"));
    }
    repo
}

/// Writes `files` (relative path, content) into the working tree of the
/// repository at `repo_path`, stages everything and commits. Returns the
/// new commit sha.
///
/// # Panics
/// Panics if any filesystem or git operation fails.
pub fn commit_files(repo_path: &Path, files: &[(&str, &str)], message: &str) -> String {
    let repo = Repository::open(repo_path)
        .unwrap_or_else(|e| panic!("commit_files: failed to open {}: {e}", repo_path.display()));

    for (rel_path, content) in files {
        let full = repo_path.join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("commit_files: failed to create {}: {e}", parent.display()));
        }
        fs::write(&full, content)
            .unwrap_or_else(|e| panic!("commit_files: failed to write {}: {e}", full.display()));
    }

    let mut index = repo.index().unwrap_or_else(|e| panic!("commit_files: no index: {e}"));
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap_or_else(|e| panic!("commit_files: add_all failed: {e}"));
    index.write().unwrap_or_else(|e| panic!("commit_files: index write failed: {e}"));
    let tree_id = index
        .write_tree()
        .unwrap_or_else(|e| panic!("commit_files: write_tree failed: {e}"));
    let tree = repo
        .find_tree(tree_id)
        .unwrap_or_else(|e| panic!("commit_files: find_tree failed: {e}"));

    let signature = repo
        .signature()
        .unwrap_or_else(|e| panic!("commit_files: no signature: {e}"));
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<&git2::Commit> = parent.iter().collect();

    let oid = repo
        .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap_or_else(|e| panic!("commit_files: commit failed: {e}"));
    oid.to_string()
}

/// Renders a `serde_json::Value` as a pretty-printed string, for writing
/// manifest fixtures with [`commit_files`].
///
/// # Panics
/// Panics if serialization fails (it cannot for `Value`).
pub fn json(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| panic!("json: serialization failed: {e}"))
}
