//! Deterministic merge of per-role subgraphs into one multi-identity
//! graph.
//!
//! The merge is a plain union: every node and edge keeps its role
//! stamp, and states captured under two roles appear twice (their
//! fingerprints already differ because the roles saw different pages,
//! and even identical pages are meaningful per role). Input order
//! decides output order, so merging the same inputs always yields the
//! same snapshot.

use std::collections::HashMap;
use tracing::info;

use crate::graph::{GraphSnapshot, GraphStats};
use crate::model::{current_timestamp, PageState, Transition};

/// Merge role subgraphs in the given order.
pub fn merge_role_graphs(subgraphs: &[(String, GraphSnapshot)]) -> GraphSnapshot {
    let mut nodes: Vec<PageState> = Vec::new();
    let mut edges: Vec<Transition> = Vec::new();
    let mut seen: HashMap<(String, String), ()> = HashMap::new();

    for (role, snapshot) in subgraphs {
        for node in &snapshot.nodes {
            let key = (role.clone(), node.state_hash.clone());
            if seen.insert(key, ()).is_none() {
                let mut stamped = node.clone();
                stamped.role = role.clone();
                nodes.push(stamped);
            }
        }
        for edge in &snapshot.edges {
            let mut stamped = edge.clone();
            stamped.role = role.clone();
            edges.push(stamped);
        }
    }

    let stats = GraphStats::compute(&nodes, &edges);
    info!(
        roles = subgraphs.len(),
        nodes = stats.node_count,
        edges = stats.edge_count,
        "merged role subgraphs"
    );
    GraphSnapshot {
        nodes,
        edges,
        current_hash: None,
        exported_at: current_timestamp(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(role: &str, hashes: &[&str]) -> GraphSnapshot {
        let nodes: Vec<PageState> = hashes
            .iter()
            .map(|h| PageState {
                state_hash: h.to_string(),
                url: format!("https://x.example/{h}"),
                normalized_url: format!("https://x.example/{h}"),
                title: h.to_string(),
                timestamp: 1,
                role: role.to_string(),
                depth: 0,
                synthetic: false,
                features: serde_json::Value::Null,
            })
            .collect();
        let stats = GraphStats::compute(&nodes, &[]);
        GraphSnapshot {
            nodes,
            edges: vec![],
            current_hash: None,
            exported_at: 1,
            stats,
        }
    }

    #[test]
    fn merge_keeps_same_state_under_different_roles() {
        let merged = merge_role_graphs(&[
            ("default".to_string(), snapshot("default", &["a", "b"])),
            ("admin".to_string(), snapshot("admin", &["a", "c"])),
        ]);
        // No cross-role dedup: "a" appears once per role.
        assert_eq!(merged.stats.node_count, 4);
        assert_eq!(merged.stats.nodes_per_role["default"], 2);
        assert_eq!(merged.stats.nodes_per_role["admin"], 2);
    }

    #[test]
    fn merge_is_deterministic() {
        let inputs = [
            ("default".to_string(), snapshot("default", &["a"])),
            ("admin".to_string(), snapshot("admin", &["b"])),
        ];
        let m1 = merge_role_graphs(&inputs);
        let m2 = merge_role_graphs(&inputs);
        let order = |m: &GraphSnapshot| -> Vec<String> {
            m.nodes.iter().map(|n| n.state_hash.clone()).collect()
        };
        assert_eq!(order(&m1), order(&m2));
    }

    #[test]
    fn duplicate_nodes_within_one_role_collapse() {
        let merged = merge_role_graphs(&[(
            "default".to_string(),
            snapshot("default", &["a", "a"]),
        )]);
        assert_eq!(merged.stats.node_count, 1);
    }
}
