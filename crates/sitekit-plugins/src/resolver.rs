//! Dependency-ordered plugin resolution

use std::collections::HashSet;

use tracing::warn;

use crate::error::{PluginError, Result};

/// An installed plugin and its declared dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginNode {
    /// Package name as it appears in the manifest
    pub package_name: String,
    /// Packages that must load before this one
    pub depends_on: Vec<String>,
}

impl PluginNode {
    pub fn new(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            depends_on: vec![],
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Compute the base order: configured always-first plugins (deduplicated,
/// keeping only those actually installed), then every other installed
/// package in lexicographic order.
pub fn base_order(always_first: &[String], nodes: &[PluginNode]) -> Vec<String> {
    let installed: HashSet<&str> = nodes.iter().map(|n| n.package_name.as_str()).collect();
    let mut order: Vec<String> = Vec::with_capacity(nodes.len());
    let mut seen: HashSet<&str> = HashSet::new();
    for name in always_first {
        if installed.contains(name.as_str()) && seen.insert(name.as_str()) {
            order.push(name.clone());
        }
    }
    let mut rest: Vec<&str> = installed
        .iter()
        .copied()
        .filter(|name| !seen.contains(name))
        .collect();
    rest.sort_unstable();
    order.extend(rest.into_iter().map(String::from));
    order
}

/// Resolve the plugin load order.
///
/// Walks `order` depth-first: before emitting a package, its declared
/// dependencies are emitted (recursively), so the result is a linear
/// extension of the dependency graph with minimal displacement from the
/// base order. Dependencies on packages that are not installed are logged
/// and skipped. A dependency cycle yields [`PluginError::CyclicDependency`]
/// naming the chain that closed it.
pub fn resolve_load_order(order: &[String], nodes: &[PluginNode]) -> Result<Vec<String>> {
    let mut emitted: Vec<String> = Vec::with_capacity(order.len());
    let mut done: HashSet<String> = HashSet::new();
    let mut visiting: Vec<String> = Vec::new();
    for name in order {
        emit(name, nodes, &mut emitted, &mut done, &mut visiting)?;
    }
    Ok(emitted)
}

fn emit(
    name: &str,
    nodes: &[PluginNode],
    emitted: &mut Vec<String>,
    done: &mut HashSet<String>,
    visiting: &mut Vec<String>,
) -> Result<()> {
    if done.contains(name) {
        return Ok(());
    }
    if visiting.iter().any(|n| n == name) {
        let mut chain = visiting.clone();
        chain.push(name.to_string());
        return Err(PluginError::CyclicDependency { chain });
    }
    let Some(node) = nodes.iter().find(|n| n.package_name == name) else {
        warn!(package = name, "skipping dependency on a package that is not installed");
        done.insert(name.to_string());
        return Ok(());
    };
    visiting.push(name.to_string());
    for dep in &node.depends_on {
        emit(dep, nodes, emitted, done, visiting)?;
    }
    visiting.pop();
    done.insert(name.to_string());
    emitted.push(name.to_string());
    Ok(())
}
