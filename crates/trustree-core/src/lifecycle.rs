//! Lifecycle events and hook script dispatch
//!
//! After an update pass the engine reports what happened to each
//! repository, each host and the run as a whole by executing hook
//! scripts committed inside the authentication repository, under
//! `targets/scripts/<stage>/<event>/`. Scripts receive a JSON document
//! on stdin and may emit a JSON document on stdout to thread transient
//! and persistent state to the scripts that follow. Persistent state is
//! additionally flushed to `last_successful_commits.json` next to the
//! repository after every script that returns it.
//!
//! Outside development mode scripts are read at the last validated
//! commit, never from the working tree, so an attacker who can write to
//! the clone but not sign metadata cannot inject code.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use trustree_git::{AuthRepo, Error as GitError, TARGETS_DIRECTORY_NAME};

use crate::{Error, Result};

const SCRIPTS_DIR: &str = "scripts";
const SCRIPT_SUFFIX: &str = "py";

/// State file written next to the authentication repository
pub const PERSISTENT_FILE_NAME: &str = "last_successful_commits.json";

const TRANSIENT_KEY: &str = "transient";
const PERSISTENT_KEY: &str = "persistent";

/// What kind of subject an event is being reported for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    /// A single authentication repository and its targets
    Repo,
    /// All authentication repositories belonging to one host
    Host,
    /// The update run as a whole
    Update,
}

impl LifecycleStage {
    pub fn as_name(self) -> &'static str {
        match self {
            Self::Repo => "repo",
            Self::Host => "host",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// Outcome of an update pass for one subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    /// Update succeeded and pulled new commits
    Changed,
    /// Update succeeded with nothing new
    Unchanged,
    /// Update succeeded (aggregate of changed and unchanged)
    Succeeded,
    /// Update failed
    Failed,
    /// Terminal event fired for every subject regardless of outcome
    Completed,
}

impl Event {
    pub fn as_name(self) -> &'static str {
        match self {
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "changed" => Some(Self::Changed),
            "unchanged" => Some(Self::Unchanged),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// How hook scripts are located and executed
#[derive(Debug, Clone)]
pub struct HookSettings {
    /// Read scripts from the working tree instead of the last validated
    /// commit. Never enable outside local development.
    pub development_mode: bool,
    /// Interpreter the scripts are run with
    pub interpreter: String,
}

impl Default for HookSettings {
    fn default() -> Self {
        Self {
            development_mode: false,
            interpreter: if cfg!(windows) { "py" } else { "python3" }.to_string(),
        }
    }
}

/// Commit window of one update pass
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommitsData {
    /// Head commit before the pull, if the repository existed
    pub before_pull: Option<String>,
    /// Commits the pull brought in, oldest first
    pub new: Vec<String>,
    /// Head commit after the pull
    pub after_pull: Option<String>,
}

/// Report the outcome of updating one authentication repository and run
/// its repo-stage scripts. Returns the transient and persistent state
/// after the last script.
pub fn handle_repo_event<A: AuthRepo>(
    event: Event,
    auth_repo: &A,
    commits_data: &CommitsData,
    error: Option<&str>,
    targets_data: &Value,
    persistent_data: Option<Map<String, Value>>,
    transient_data: Option<Map<String, Value>>,
    settings: &HookSettings,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let data = prepare_data_repo(
        event,
        auth_repo,
        commits_data,
        error,
        targets_data,
        persistent_data,
        transient_data,
    );
    handle_event(LifecycleStage::Repo, event, auth_repo, commits_data, data, settings)
}

/// Report the outcome of updating every repository of one host and run
/// the host-stage scripts of `auth_repo`.
pub fn handle_host_event<A: AuthRepo>(
    event: Event,
    auth_repo: &A,
    commits_data: &CommitsData,
    persistent_data: Option<Map<String, Value>>,
    transient_data: Option<Map<String, Value>>,
    settings: &HookSettings,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let data = prepare_data_minimal(persistent_data, transient_data);
    handle_event(LifecycleStage::Host, event, auth_repo, commits_data, data, settings)
}

/// Report the outcome of the update run as a whole and run the
/// update-stage scripts of the root authentication repository.
pub fn handle_update_event<A: AuthRepo>(
    event: Event,
    auth_repo: &A,
    commits_data: &CommitsData,
    persistent_data: Option<Map<String, Value>>,
    transient_data: Option<Map<String, Value>>,
    settings: &HookSettings,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    let data = prepare_data_minimal(persistent_data, transient_data);
    handle_event(LifecycleStage::Update, event, auth_repo, commits_data, data, settings)
}

fn handle_event<A: AuthRepo>(
    stage: LifecycleStage,
    event: Event,
    auth_repo: &A,
    commits_data: &CommitsData,
    mut data: Map<String, Value>,
    settings: &HookSettings,
) -> Result<(Map<String, Value>, Map<String, Value>)> {
    tracing::debug!(
        "Auth repo {}: handling event {event} of stage {stage}",
        auth_repo.path().display()
    );
    let last_commit = commits_data.after_pull.as_deref();

    // Aggregate events fan out: a changed or unchanged run is also a
    // succeeded run, and every run completes.
    match event {
        Event::Changed => {
            execute_scripts(stage, Event::Changed, auth_repo, last_commit, &mut data, settings)?;
            execute_scripts(stage, Event::Succeeded, auth_repo, last_commit, &mut data, settings)?;
        }
        Event::Unchanged => {
            execute_scripts(stage, Event::Unchanged, auth_repo, last_commit, &mut data, settings)?;
            execute_scripts(stage, Event::Succeeded, auth_repo, last_commit, &mut data, settings)?;
        }
        Event::Succeeded => {
            execute_scripts(stage, Event::Succeeded, auth_repo, last_commit, &mut data, settings)?;
        }
        Event::Failed => {
            execute_scripts(stage, Event::Failed, auth_repo, last_commit, &mut data, settings)?;
        }
        Event::Completed => {}
    }
    execute_scripts(stage, Event::Completed, auth_repo, last_commit, &mut data, settings)?;

    Ok((extract_state(&data, TRANSIENT_KEY), extract_state(&data, PERSISTENT_KEY)))
}

fn prepare_data_repo<A: AuthRepo>(
    event: Event,
    auth_repo: &A,
    commits_data: &CommitsData,
    error: Option<&str>,
    targets_data: &Value,
    persistent_data: Option<Map<String, Value>>,
    transient_data: Option<Map<String, Value>>,
) -> Map<String, Value> {
    // Scripts see the aggregate outcome; the exact event only survives
    // through the changed flag and the script directory it ran from.
    let bucket = match event {
        Event::Succeeded | Event::Changed | Event::Unchanged => Event::Succeeded,
        Event::Failed | Event::Completed => Event::Failed,
    };
    let mut data = Map::new();
    data.insert("changed".into(), Value::Bool(event == Event::Changed));
    data.insert("event".into(), json!(format!("event/{}", bucket.as_name())));
    data.insert("repo_name".into(), json!(auth_repo.name()));
    data.insert("error_msg".into(), json!(error.unwrap_or_default()));
    data.insert(
        "auth_repo".into(),
        json!({"data": auth_repo.summary(), "commits": commits_data}),
    );
    data.insert("target_repos".into(), targets_data.clone());
    data.insert(
        TRANSIENT_KEY.into(),
        Value::Object(transient_data.unwrap_or_default()),
    );
    data.insert(
        PERSISTENT_KEY.into(),
        Value::Object(persistent_data.unwrap_or_default()),
    );
    data
}

fn prepare_data_minimal(
    persistent_data: Option<Map<String, Value>>,
    transient_data: Option<Map<String, Value>>,
) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        TRANSIENT_KEY.into(),
        Value::Object(transient_data.unwrap_or_default()),
    );
    data.insert(
        PERSISTENT_KEY.into(),
        Value::Object(persistent_data.unwrap_or_default()),
    );
    data
}

fn scripts_rel_path(stage: LifecycleStage, event: Event) -> String {
    format!("{TARGETS_DIRECTORY_NAME}/{SCRIPTS_DIR}/{stage}/{event}")
}

/// Run every script of one `<stage>/<event>` directory in lexicographic
/// order, threading `data` through the chain. Fail-fast on the first
/// script that exits non-zero.
fn execute_scripts<A: AuthRepo>(
    stage: LifecycleStage,
    event: Event,
    auth_repo: &A,
    last_commit: Option<&str>,
    data: &mut Map<String, Value>,
    settings: &HookSettings,
) -> Result<()> {
    let scripts = discover_scripts(stage, event, auth_repo, last_commit, settings)?;
    if scripts.is_empty() {
        return Ok(());
    }
    tracing::debug!(
        "Auth repo {}: executing {} script(s) for {stage}/{event}",
        auth_repo.path().display(),
        scripts.len()
    );
    let persistent_path = auth_repo.root_dir().join(PERSISTENT_FILE_NAME);

    for script in scripts {
        let input = serde_json::to_string(&Value::Object(data.clone()))?;
        let output = run_script(&script, input, settings)?;
        if output.is_empty() {
            continue;
        }
        let returned: Value = serde_json::from_str(&output)?;
        if let Some(transient) = returned.get(TRANSIENT_KEY).and_then(Value::as_object) {
            merge_state(data, TRANSIENT_KEY, transient);
        }
        if let Some(persistent) = returned.get(PERSISTENT_KEY).and_then(Value::as_object) {
            merge_state(data, PERSISTENT_KEY, persistent);
            fs::write(
                &persistent_path,
                serde_json::to_string_pretty(&data[PERSISTENT_KEY])?,
            )?;
        }
    }
    Ok(())
}

/// Absolute paths of the scripts to run, sorted.
///
/// Outside development mode the listing comes from the last validated
/// commit and the files are checked out from it first; the working tree
/// content is not trusted.
fn discover_scripts<A: AuthRepo>(
    stage: LifecycleStage,
    event: Event,
    auth_repo: &A,
    last_commit: Option<&str>,
    settings: &HookSettings,
) -> Result<Vec<PathBuf>> {
    let rel = scripts_rel_path(stage, event);

    if settings.development_mode {
        let dir = auth_repo.path().join(&rel);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(Vec::new()),
        };
        let mut scripts: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| is_script(path))
            .collect();
        scripts.sort();
        return Ok(scripts);
    }

    let Some(commit) = last_commit else {
        return Ok(Vec::new());
    };
    let listed = match auth_repo.list_files_at_revision(commit, &rel) {
        Ok(listed) => listed,
        Err(GitError::NoSuchRevisionPath { .. }) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut rel_paths: Vec<String> = listed
        .into_iter()
        .filter(|name| is_script(Path::new(name)))
        .map(|name| format!("{rel}/{name}"))
        .collect();
    rel_paths.sort();
    if rel_paths.is_empty() {
        return Ok(Vec::new());
    }
    auth_repo.checkout_paths(commit, &rel_paths)?;
    Ok(rel_paths
        .into_iter()
        .map(|rel_path| auth_repo.path().join(rel_path))
        .collect())
}

fn is_script(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SCRIPT_SUFFIX)
}

fn run_script(script: &Path, input: String, settings: &HookSettings) -> Result<String> {
    tracing::debug!("Executing script {}", script.display());
    let mut child = Command::new(&settings.interpreter)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    // The context is offered on stdin, not forced: a script may exit or
    // close its input without draining it, and a large context written
    // inline would deadlock against a script that fills stdout first.
    // Feed from a separate thread and ignore write errors; the exit
    // status alone decides the outcome.
    let stdin = child.stdin.take();
    let feeder = thread::spawn(move || {
        if let Some(mut stdin) = stdin {
            let _ = stdin.write_all(input.as_bytes());
        }
    });
    let output = child.wait_with_output()?;
    let _ = feeder.join();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr_snippet = stderr.trim();
        let message = if stderr_snippet.is_empty() {
            format!(
                "exited with non-zero status (exit code: {:?})",
                output.status.code()
            )
        } else {
            format!(
                "exited with non-zero status (exit code: {:?}): {}",
                output.status.code(),
                stderr_snippet
            )
        };
        return Err(Error::HookFailed {
            script: script.to_path_buf(),
            message,
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn merge_state(data: &mut Map<String, Value>, key: &str, returned: &Map<String, Value>) {
    let state = data
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if let Some(state) = state.as_object_mut() {
        for (name, value) in returned {
            state.insert(name.clone(), value.clone());
        }
    }
}

fn extract_state(data: &Map<String, Value>, key: &str) -> Map<String, Value> {
    data.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
