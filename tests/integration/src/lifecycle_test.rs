//! Lifecycle hook execution against a real git repository, exercising
//! the commit-pinned script discovery that development mode bypasses.

use std::fs;

use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;
use trustree_core::{
    handle_update_event, CommitsData, Event, HookSettings, PERSISTENT_FILE_NAME,
};
use trustree_git::GitAuthRepository;
use trustree_test_utils::{commit_files, init_repo};

const AUTH_NAME: &str = "org/auth";
const SCRIPT_PATH: &str = "targets/scripts/update/succeeded/00-run.py";

fn sh_settings() -> HookSettings {
    HookSettings {
        development_mode: false,
        interpreter: "sh".to_string(),
    }
}

fn commits_data(after_pull: Option<&str>) -> CommitsData {
    CommitsData {
        before_pull: None,
        new: Vec::new(),
        after_pull: after_pull.map(str::to_string),
    }
}

#[test]
fn scripts_run_from_the_last_validated_commit_not_the_working_tree() {
    let root = TempDir::new().unwrap();
    let auth_path = root.path().join(AUTH_NAME);
    init_repo(&auth_path);

    let log = root.path().join("events.log");
    let commit = commit_files(
        &auth_path,
        &[(
            SCRIPT_PATH,
            &format!("cat > /dev/null\necho committed >> \"{}\"\n", log.display()),
        )],
        "add update hook",
    );

    // tamper with the committed script and drop in an uncommitted one
    fs::write(
        auth_path.join(SCRIPT_PATH),
        format!("cat > /dev/null\necho tampered >> \"{}\"\n", log.display()),
    )
    .unwrap();
    fs::write(
        auth_path.join("targets/scripts/update/succeeded/99-stray.py"),
        format!("cat > /dev/null\necho stray >> \"{}\"\n", log.display()),
    )
    .unwrap();

    let auth = GitAuthRepository::new(root.path(), AUTH_NAME, vec![], serde_json::Map::new())
        .unwrap();
    handle_update_event(
        Event::Succeeded,
        &auth,
        &commits_data(Some(&commit)),
        None,
        None,
        &sh_settings(),
    )
    .unwrap();

    let lines: Vec<String> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["committed"]);
}

#[test]
fn persistent_state_is_flushed_next_to_the_repository() {
    let root = TempDir::new().unwrap();
    let auth_path = root.path().join(AUTH_NAME);
    init_repo(&auth_path);

    let commit = commit_files(
        &auth_path,
        &[(
            SCRIPT_PATH,
            "cat > /dev/null\necho '{\"persistent\": {\"last\": \"ok\"}}'\n",
        )],
        "add state hook",
    );

    let auth = GitAuthRepository::new(root.path(), AUTH_NAME, vec![], serde_json::Map::new())
        .unwrap();
    let (_, persistent) = handle_update_event(
        Event::Succeeded,
        &auth,
        &commits_data(Some(&commit)),
        None,
        None,
        &sh_settings(),
    )
    .unwrap();
    assert_eq!(persistent.get("last"), Some(&json!("ok")));

    let on_disk: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(root.path().join(PERSISTENT_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk, json!({"last": "ok"}));
}

#[test]
fn nothing_runs_without_a_last_validated_commit() {
    let root = TempDir::new().unwrap();
    let auth_path = root.path().join(AUTH_NAME);
    init_repo(&auth_path);

    let log = root.path().join("events.log");
    // present in the working tree only, and no commit to pin to anyway
    fs::create_dir_all(auth_path.join("targets/scripts/update/succeeded")).unwrap();
    fs::write(
        auth_path.join(SCRIPT_PATH),
        format!("cat > /dev/null\necho ran >> \"{}\"\n", log.display()),
    )
    .unwrap();

    let auth = GitAuthRepository::new(root.path(), AUTH_NAME, vec![], serde_json::Map::new())
        .unwrap();
    let (transient, persistent) = handle_update_event(
        Event::Succeeded,
        &auth,
        &commits_data(None),
        None,
        None,
        &sh_settings(),
    )
    .unwrap();

    assert!(transient.is_empty());
    assert!(persistent.is_empty());
    assert!(!log.exists());
}
