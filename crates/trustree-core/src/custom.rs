//! Custom-data merging and matching
//!
//! A repository's effective custom data starts from its declaration in
//! repositories.json and is overwritten key-by-key by the custom data the
//! signing pipeline attached to the matching target.

use serde_json::{Map, Value};

/// Merge repository-declared custom data with the matching signed
/// target's custom data. Target-declared keys win on conflict; neither
/// input is mutated.
pub fn merge_custom(
    repo_custom: &Map<String, Value>,
    target_custom: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    let mut merged = repo_custom.clone();
    if let Some(target_custom) = target_custom {
        for (key, value) in target_custom {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// True when every key/value pair of `filter` appears in `data`.
pub fn is_subset(filter: &Map<String, Value>, data: &Map<String, Value>) -> bool {
    filter.iter().all(|(key, value)| data.get(key) == Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn target_wins_on_conflicting_keys() {
        let repo = map(json!({"type": "html", "owner": "x"}));
        let target = map(json!({"type": "xml"}));
        let merged = merge_custom(&repo, Some(&target));
        assert_eq!(merged, map(json!({"type": "xml", "owner": "x"})));
    }

    #[test]
    fn target_only_keys_are_added() {
        let repo = map(json!({"owner": "x"}));
        let target = map(json!({"version": 2}));
        let merged = merge_custom(&repo, Some(&target));
        assert_eq!(merged, map(json!({"owner": "x", "version": 2})));
    }

    #[test]
    fn absent_target_keeps_repository_data_unchanged() {
        let repo = map(json!({"type": "html"}));
        assert_eq!(merge_custom(&repo, None), repo);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let repo = map(json!({"type": "html"}));
        let target = map(json!({"type": "xml"}));
        let _ = merge_custom(&repo, Some(&target));
        assert_eq!(repo, map(json!({"type": "html"})));
        assert_eq!(target, map(json!({"type": "xml"})));
    }

    #[test]
    fn subset_matching() {
        let data = map(json!({"type": "html", "owner": "x"}));
        assert!(is_subset(&map(json!({})), &data));
        assert!(is_subset(&map(json!({"type": "html"})), &data));
        assert!(!is_subset(&map(json!({"type": "xml"})), &data));
        assert!(!is_subset(&map(json!({"missing": true})), &data));
    }
}
