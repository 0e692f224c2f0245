//! End-to-end resolution against real git repositories: signed manifests
//! committed with git2, handles resolved through the store.

use std::path::Path;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use trustree_core::{DependencyLoadOptions, LoadOptions, RepositoryStore};
use trustree_git::{AuthRepo, GitAuthRepository, RepositoryHandle};
use trustree_test_utils::{commit_files, init_repo, json as json_str};

const AUTH_NAME: &str = "org/auth";
const NESTED_NAME: &str = "org/nested-auth";

/// Commits a full manifest set and returns the first and second commit.
fn seed_auth_repo(root: &Path) -> (String, String) {
    let auth_path = root.join(AUTH_NAME);
    init_repo(&auth_path);

    let first = commit_files(
        &auth_path,
        &[
            (
                "metadata/targets.json",
                &json_str(&json!({"signed": {
                    "targets": {
                        "org/html": {"custom": {"type": "html"}},
                    },
                    "delegations": {"roles": [{"name": "delegated"}]},
                }})),
            ),
            (
                "metadata/delegated.json",
                &json_str(&json!({"signed": {"targets": {"org/xml": {}}}})),
            ),
            (
                "targets/mirrors.json",
                &json_str(&json!({"mirrors": [
                    "https://git.example.com/{org_name}/{repo_name}.git",
                ]})),
            ),
            (
                "targets/repositories.json",
                &json_str(&json!({"repositories": {
                    "org/html": {"custom": {"owner": "docs"}},
                    "org/xml": {},
                    "org/undeclared-target": {},
                }})),
            ),
            (
                "targets/dependencies.json",
                &json_str(&json!({"dependencies": {NESTED_NAME: {}}})),
            ),
            (
                "targets/hosts.json",
                &json_str(&json!({"example.com": {
                    "auth_repos": [NESTED_NAME],
                    "location": "eu",
                }})),
            ),
        ],
        "initial manifests",
    );

    let second = commit_files(
        &auth_path,
        &[(
            "targets/repositories.json",
            &json_str(&json!({"repositories": {
                "org/html": {"custom": {"owner": "docs", "version": 2}},
                "org/xml": {},
            }})),
        )],
        "bump org/html",
    );

    (first, second)
}

fn auth_repo(root: &Path) -> GitAuthRepository {
    GitAuthRepository::new(root, AUTH_NAME, vec![], serde_json::Map::new()).unwrap()
}

#[test]
fn target_repositories_resolve_from_signed_manifests() {
    let root = TempDir::new().unwrap();
    let (first, _) = seed_auth_repo(root.path());
    let auth = auth_repo(root.path());

    let mut store = RepositoryStore::new();
    store
        .load_repositories(
            &auth,
            LoadOptions {
                commits: Some(vec![first.clone()]),
                ..LoadOptions::new()
            },
        )
        .unwrap();

    let loaded = store.get_repositories(&auth, Some(&first)).unwrap();
    // org/xml is signed through the delegated role; the undeclared
    // signed-only path and the unsigned declaration are both absent
    assert_eq!(loaded.keys().collect::<Vec<_>>(), vec!["org/html", "org/xml"]);

    let html = &loaded["org/html"];
    assert_eq!(html.urls(), ["https://git.example.com/org/html.git".to_string()]);
    assert_eq!(html.custom().get("owner"), Some(&json!("docs")));
    assert_eq!(html.custom().get("type"), Some(&json!("html")));
    assert_eq!(html.path(), root.path().join("org/html"));
}

#[test]
fn newest_wins_across_the_update_window() {
    let root = TempDir::new().unwrap();
    let (first, second) = seed_auth_repo(root.path());
    let auth = auth_repo(root.path());

    let commits = auth.all_commits_since_commit(None).unwrap();
    assert_eq!(commits, vec![first.clone(), second.clone()]);

    let mut store = RepositoryStore::new();
    store
        .load_repositories(
            &auth,
            LoadOptions {
                commits: Some(commits.clone()),
                ..LoadOptions::new()
            },
        )
        .unwrap();

    let deduplicated = store.get_deduplicated_repositories(&auth, &commits).unwrap();
    assert_eq!(
        deduplicated["org/html"].custom().get("version"),
        Some(&json!(2))
    );
}

#[test]
fn dependencies_attach_hosts_from_parent_and_own_declarations() {
    let root = TempDir::new().unwrap();
    let (first, _) = seed_auth_repo(root.path());

    // the nested repository exists on disk with its own hosts.json
    let nested_path = root.path().join(NESTED_NAME);
    init_repo(&nested_path);
    commit_files(
        &nested_path,
        &[(
            "targets/hosts.json",
            &json_str(&json!({"internal.example.com": {"auth_repos": [NESTED_NAME]}})),
        )],
        "own hosts",
    );

    let auth = auth_repo(root.path());
    let mut store = RepositoryStore::new();
    store
        .load_dependencies(
            &auth,
            DependencyLoadOptions {
                commits: Some(vec![first.clone()]),
                ..DependencyLoadOptions::default()
            },
        )
        .unwrap();

    let nested = store
        .get_auth_repository(&auth, NESTED_NAME, Some(&first))
        .unwrap()
        .unwrap();
    assert_eq!(nested.path(), nested_path);

    let hosts = nested.hosts();
    assert_eq!(hosts.len(), 2);
    assert_eq!(hosts["example.com"], json!({"location": "eu"}));
    assert_eq!(hosts["internal.example.com"], json!({}));
}

#[test]
fn dependencies_resolve_even_when_the_nested_repository_is_not_on_disk() {
    let root = TempDir::new().unwrap();
    let (first, _) = seed_auth_repo(root.path());
    let auth = auth_repo(root.path());

    let mut store = RepositoryStore::new();
    store
        .load_dependencies(
            &auth,
            DependencyLoadOptions {
                commits: Some(vec![first.clone()]),
                ..DependencyLoadOptions::default()
            },
        )
        .unwrap();

    let nested = store
        .get_auth_repository(&auth, NESTED_NAME, Some(&first))
        .unwrap()
        .unwrap();
    assert_eq!(
        nested.urls(),
        ["https://git.example.com/org/nested-auth.git".to_string()]
    );
    // only the parent's declaration claims it
    assert_eq!(nested.hosts().len(), 1);
}
