//! Host resolution
//!
//! A host groups authentication repositories for deployment targeting.
//! The host set of a nested authentication repository is declared in
//! hosts.json — its own, its parent's, or any ancestor's — so resolution
//! takes the accumulated declarations and unions every host that claims
//! the repository by name.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::manifests::HostsFile;

/// Union over `declarations` of the hosts whose membership list contains
/// `repo_name`. The membership list itself is structural and is stripped
/// from the stored per-host data. An unclaimed repository gets an empty
/// set and a warning, never an error.
pub fn resolve_hosts(
    repo_name: &str,
    declarations: &[HostsFile],
) -> BTreeMap<String, Value> {
    let mut hosts_of_repo = BTreeMap::new();
    for declaration in declarations {
        for (host, host_spec) in declaration {
            if !host_spec.auth_repos.iter().any(|name| name == repo_name) {
                continue;
            }
            hosts_of_repo.insert(host.clone(), Value::Object(host_spec.extra.clone()));
        }
    }
    if hosts_of_repo.is_empty() {
        tracing::warn!("Host of authentication repository {repo_name} not specified");
    }
    hosts_of_repo
}
