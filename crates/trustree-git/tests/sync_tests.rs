//! Tests for working-tree state probing.

use std::fs;
use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use trustree_git::{GitRepository, RepositoryHandle, SyncState, ValidationState};
use trustree_test_utils::{commit_files, init_repo};

fn handle(root: &Path) -> GitRepository {
    GitRepository::new(root, "ns/repo", vec![], serde_json::Map::new())
        .expect("valid repository handle")
}

#[test]
fn missing_repository_reports_missing() {
    let temp = TempDir::new().unwrap();
    let repo = handle(temp.path());
    assert_eq!(repo.sync_state().unwrap(), SyncState::Missing);
}

#[test]
fn bare_repository_reports_bare() {
    let temp = TempDir::new().unwrap();
    let repo = handle(temp.path());
    fs::create_dir_all(repo.path()).unwrap();
    git2::Repository::init_bare(repo.path()).unwrap();
    assert_eq!(repo.sync_state().unwrap(), SyncState::Bare);
}

#[test]
fn committed_tree_reports_clean_and_local_edits_report_dirty() {
    let temp = TempDir::new().unwrap();
    let repo = handle(temp.path());
    init_repo(&repo.path());
    commit_files(&repo.path(), &[("README.md", "# repo")], "initial");
    assert_eq!(repo.sync_state().unwrap(), SyncState::Clean);

    fs::write(repo.path().join("untracked.txt"), "local change").unwrap();
    assert_eq!(repo.sync_state().unwrap(), SyncState::Dirty);
}

#[test]
fn validation_state_compares_head_to_the_signed_commit() {
    let temp = TempDir::new().unwrap();
    let repo = handle(temp.path());
    init_repo(&repo.path());
    let c1 = commit_files(&repo.path(), &[("README.md", "# repo")], "c1");
    let c2 = commit_files(&repo.path(), &[("README.md", "# repo v2")], "c2");

    assert_eq!(
        repo.validation_state(Some(&c2)).unwrap(),
        ValidationState::UpToDate
    );
    assert_eq!(
        repo.validation_state(Some(&c1)).unwrap(),
        ValidationState::Unsigned
    );
    assert_eq!(repo.validation_state(None).unwrap(), ValidationState::Unsigned);
}

#[test]
fn validation_state_is_not_found_without_a_repository() {
    let temp = TempDir::new().unwrap();
    let repo = handle(temp.path());
    assert_eq!(
        repo.validation_state(Some("0000000000000000000000000000000000000000"))
            .unwrap(),
        ValidationState::NotFound
    );
}
