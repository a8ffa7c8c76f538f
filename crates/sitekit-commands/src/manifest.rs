//! Manifest dependency snapshots and upgrade detection

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// Read the manifest's dependency map once. `None` when the file is missing
/// or unparseable; callers retry transient failures at a higher level.
pub(crate) fn read_deps_once(manifest_path: &Path) -> Option<BTreeMap<String, String>> {
    let raw = std::fs::read_to_string(manifest_path).ok()?;
    let manifest: Manifest = serde_json::from_str(&raw).ok()?;
    Some(manifest.dependencies)
}

/// Dependencies whose resolved version changed between two snapshots.
///
/// Version requirements are normalized (range sigils and a leading `v`
/// stripped) before comparison, so `^1.2.0` and `1.2.0` are the same
/// version. Added and removed dependencies count as changes too.
pub fn changed_dependencies(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (name, version) in after {
        match before.get(name) {
            Some(previous) if same_version(previous, version) => {}
            Some(previous) => {
                debug!(package = %name, from = %previous, to = %version, "dependency version changed");
                changed.push(name.clone());
            }
            None => changed.push(name.clone()),
        }
    }
    for name in before.keys() {
        if !after.contains_key(name) {
            changed.push(name.clone());
        }
    }
    changed
}

fn same_version(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Some(a), Some(b)) => a == b,
        // Tags and URLs compare textually.
        _ => a == b,
    }
}

fn normalize(requirement: &str) -> Option<semver::Version> {
    let trimmed = requirement
        .trim()
        .trim_start_matches(['^', '~', '=', 'v']);
    semver::Version::parse(trimmed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_range_sigils_are_ignored() {
        let before = deps(&[("forms", "^1.2.0")]);
        let after = deps(&[("forms", "1.2.0")]);
        assert!(changed_dependencies(&before, &after).is_empty());
    }

    #[test]
    fn test_version_bump_is_a_change() {
        let before = deps(&[("forms", "^1.2.0")]);
        let after = deps(&[("forms", "^1.3.0")]);
        assert_eq!(changed_dependencies(&before, &after), ["forms"]);
    }

    #[test]
    fn test_additions_and_removals_are_changes() {
        let before = deps(&[("old", "1.0.0")]);
        let after = deps(&[("new", "2.0.0")]);
        let mut changed = changed_dependencies(&before, &after);
        changed.sort();
        assert_eq!(changed, ["new", "old"]);
    }

    #[test]
    fn test_non_semver_requirements_compare_textually() {
        let before = deps(&[("fork", "github:acme/fork#main")]);
        let after = deps(&[("fork", "github:acme/fork#next")]);
        assert_eq!(changed_dependencies(&before, &after), ["fork"]);
    }
}
