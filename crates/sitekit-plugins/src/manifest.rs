//! Installed-plugin discovery from the project manifest

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{PluginError, Result};

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
}

/// List installed plugin package names: manifest dependencies whose name
/// starts with `plugin_prefix`, in manifest (sorted) order.
pub fn installed_plugins(manifest_path: &Path, plugin_prefix: &str) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(manifest_path).map_err(|source| PluginError::ManifestRead {
        path: manifest_path.to_path_buf(),
        source,
    })?;
    let manifest: Manifest = serde_json::from_str(&raw)?;
    Ok(manifest
        .dependencies
        .into_keys()
        .filter(|name| name.starts_with(plugin_prefix))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_filters_dependencies_by_prefix() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"name":"demo-site","dependencies":{{"sitekit-plugin-forms":"^1.2.0","left-pad":"1.0.0","sitekit-plugin-core":"2.0.1"}}}}"#
        )
        .unwrap();
        let plugins = installed_plugins(file.path(), "sitekit-plugin-").unwrap();
        assert_eq!(plugins, ["sitekit-plugin-core", "sitekit-plugin-forms"]);
    }

    #[test]
    fn test_missing_manifest_is_a_read_error() {
        let err = installed_plugins(Path::new("/nonexistent/manifest.json"), "p-").unwrap_err();
        assert!(matches!(err, PluginError::ManifestRead { .. }));
    }

    #[test]
    fn test_manifest_without_dependencies_is_empty() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"name":"demo-site"}}"#).unwrap();
        let plugins = installed_plugins(file.path(), "sitekit-plugin-").unwrap();
        assert!(plugins.is_empty());
    }
}
