//! Property-based tests for plugin dependency resolution

use std::collections::HashMap;

use proptest::prelude::*;
use sitekit_plugins::{base_order, resolve_load_order, PluginNode};

/// Strategy for an acyclic dependency graph: packages `p00..pNN`, with
/// edges only from later indices to earlier ones, so cycles are impossible
/// by construction.
fn acyclic_graph_strategy() -> impl Strategy<Value = Vec<PluginNode>> {
    (2usize..12).prop_flat_map(|n| {
        let edges = proptest::collection::vec(
            (0..n, 0..n).prop_filter("dependency must precede dependent", |(dep, pkg)| dep < pkg),
            0..n * 2,
        );
        edges.prop_map(move |edges| {
            let mut deps: Vec<Vec<String>> = vec![vec![]; n];
            for (dep, pkg) in edges {
                let name = format!("p{dep:02}");
                if !deps[pkg].contains(&name) {
                    deps[pkg].push(name);
                }
            }
            (0..n)
                .map(|i| PluginNode::new(format!("p{i:02}")).depends_on(deps[i].clone()))
                .collect()
        })
    })
}

proptest! {
    /// Every dependency loads before its dependent.
    #[test]
    fn resolution_is_a_linear_extension(nodes in acyclic_graph_strategy()) {
        let order = base_order(&[], &nodes);
        let resolved = resolve_load_order(&order, &nodes).unwrap();

        let index: HashMap<&str, usize> = resolved
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        for node in &nodes {
            for dep in &node.depends_on {
                prop_assert!(
                    index[dep.as_str()] < index[node.package_name.as_str()],
                    "{dep} must precede {}",
                    node.package_name
                );
            }
        }
    }

    /// The result is a permutation of the input, nothing dropped or invented.
    #[test]
    fn resolution_is_a_permutation(nodes in acyclic_graph_strategy()) {
        let order = base_order(&[], &nodes);
        let resolved = resolve_load_order(&order, &nodes).unwrap();

        let mut expected = order.clone();
        let mut actual = resolved.clone();
        expected.sort();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    /// With no edges, the base order passes through untouched.
    #[test]
    fn edgeless_graphs_resolve_to_identity(n in 1usize..16) {
        let nodes: Vec<PluginNode> = (0..n).map(|i| PluginNode::new(format!("p{i:02}"))).collect();
        let order = base_order(&[], &nodes);
        let resolved = resolve_load_order(&order, &nodes).unwrap();
        prop_assert_eq!(resolved, order);
    }
}
