//! The in-memory state graph and its serializable snapshot form.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::model::{current_timestamp, FeatureBlob, PageState, Transition};

/// Directed graph of captured page states. Nodes are keyed by state
/// hash; insertion order is preserved for deterministic export.
#[derive(Debug, Clone, Default)]
pub struct StateGraph {
    nodes: HashMap<String, PageState>,
    node_order: Vec<String>,
    edges: Vec<Transition>,
    /// Hash of the most recently captured state, used to attach the
    /// next transition.
    current_hash: Option<String>,
}

impl StateGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, or merge collaborator features into the existing
    /// one. Re-capturing a state never duplicates it and never clobbers
    /// its original capture metadata.
    pub fn add_node(&mut self, state: PageState) -> bool {
        match self.nodes.get_mut(&state.state_hash) {
            Some(existing) => {
                merge_features(&mut existing.features, &state.features);
                // A real capture supersedes an earlier placeholder.
                if existing.synthetic && !state.synthetic {
                    existing.synthetic = false;
                    existing.title = state.title;
                    existing.timestamp = state.timestamp;
                }
                false
            }
            None => {
                debug!(hash = %state.state_hash, url = %state.normalized_url, "new graph node");
                self.node_order.push(state.state_hash.clone());
                self.nodes.insert(state.state_hash.clone(), state);
                true
            }
        }
    }

    /// Append a transition. Both endpoints must already exist.
    pub fn add_edge(&mut self, edge: Transition) -> Result<()> {
        if !self.nodes.contains_key(&edge.from_hash) {
            return Err(CoreError::UnknownNode(edge.from_hash));
        }
        if !self.nodes.contains_key(&edge.to_hash) {
            return Err(CoreError::UnknownNode(edge.to_hash));
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn get_node(&self, hash: &str) -> Option<&PageState> {
        self.nodes.get(hash)
    }

    pub fn contains_node(&self, hash: &str) -> bool {
        self.nodes.contains_key(hash)
    }

    /// Whether any node was captured from the given normalized URL.
    pub fn contains_url(&self, normalized_url: &str) -> bool {
        self.nodes.values().any(|n| n.normalized_url == normalized_url)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn current_hash(&self) -> Option<&str> {
        self.current_hash.as_deref()
    }

    pub fn set_current(&mut self, hash: &str) -> Result<()> {
        if !self.nodes.contains_key(hash) {
            return Err(CoreError::UnknownNode(hash.to_string()));
        }
        self.current_hash = Some(hash.to_string());
        Ok(())
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PageState> {
        self.node_order.iter().filter_map(|h| self.nodes.get(h))
    }

    pub fn edges(&self) -> impl Iterator<Item = &Transition> {
        self.edges.iter()
    }

    /// Remove nodes whose (origin+path) duplicates an earlier node,
    /// re-pointing their edges at the survivor so connectivity holds.
    pub fn prune_near_duplicates(&mut self, same_page: impl Fn(&str, &str) -> bool) -> usize {
        let mut survivor_for: HashMap<String, String> = HashMap::new();
        let mut doomed: HashSet<String> = HashSet::new();

        for hash in &self.node_order {
            let Some(node) = self.nodes.get(hash) else { continue };
            if node.synthetic {
                continue;
            }
            let dup_of = survivor_for
                .iter()
                .find(|(url, _)| same_page(url, &node.normalized_url))
                .map(|(_, h)| h.clone());
            match dup_of {
                Some(survivor) if survivor != *hash => {
                    doomed.insert(hash.clone());
                    survivor_for.insert(node.normalized_url.clone(), survivor);
                }
                _ => {
                    survivor_for.insert(node.normalized_url.clone(), hash.clone());
                }
            }
        }

        if doomed.is_empty() {
            return 0;
        }

        let redirect: HashMap<String, String> = doomed
            .iter()
            .filter_map(|d| {
                let url = &self.nodes.get(d)?.normalized_url;
                let survivor = survivor_for
                    .iter()
                    .find(|(u, h)| !doomed.contains(*h) && same_page(u, url))
                    .map(|(_, h)| h.clone())?;
                Some((d.clone(), survivor))
            })
            .collect();

        for edge in &mut self.edges {
            if let Some(s) = redirect.get(&edge.from_hash) {
                edge.from_hash = s.clone();
            }
            if let Some(s) = redirect.get(&edge.to_hash) {
                edge.to_hash = s.clone();
            }
        }
        self.edges
            .retain(|e| !doomed.contains(&e.from_hash) && !doomed.contains(&e.to_hash));
        self.edges.dedup_by(|a, b| {
            a.from_hash == b.from_hash && a.to_hash == b.to_hash && a.action == b.action
        });

        if let Some(cur) = &self.current_hash {
            if let Some(s) = redirect.get(cur) {
                self.current_hash = Some(s.clone());
            }
        }

        for hash in &doomed {
            self.nodes.remove(hash);
        }
        self.node_order.retain(|h| !doomed.contains(h));
        debug!(removed = doomed.len(), "pruned near-duplicate nodes");
        doomed.len()
    }

    pub fn export(&self) -> GraphSnapshot {
        let nodes: Vec<PageState> = self.nodes().cloned().collect();
        let edges = self.edges.clone();
        let stats = GraphStats::compute(&nodes, &edges);
        GraphSnapshot {
            nodes,
            edges,
            current_hash: self.current_hash.clone(),
            exported_at: current_timestamp(),
            stats,
        }
    }

    pub fn import(snapshot: GraphSnapshot) -> Self {
        let mut graph = Self::new();
        for node in snapshot.nodes {
            graph.add_node(node);
        }
        // Snapshot edges were validated on the way out.
        graph.edges = snapshot.edges;
        graph.current_hash = snapshot
            .current_hash
            .filter(|h| graph.nodes.contains_key(h));
        graph
    }
}

fn merge_features(into: &mut FeatureBlob, from: &FeatureBlob) {
    if from.is_null() {
        return;
    }
    match (into.as_object_mut(), from.as_object()) {
        (Some(dst), Some(src)) => {
            for (k, v) in src {
                dst.insert(k.clone(), v.clone());
            }
        }
        _ => *into = from.clone(),
    }
}

/// Serializable form of a [`StateGraph`]. The wire and storage format
/// for checkpoints, role subgraphs and merged exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<PageState>,
    pub edges: Vec<Transition>,
    #[serde(default)]
    pub current_hash: Option<String>,
    pub exported_at: i64,
    pub stats: GraphStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub synthetic_count: usize,
    pub max_depth: usize,
    /// Node counts per identity role.
    pub nodes_per_role: HashMap<String, usize>,
}

impl GraphStats {
    pub fn compute(nodes: &[PageState], edges: &[Transition]) -> Self {
        let mut nodes_per_role: HashMap<String, usize> = HashMap::new();
        let mut synthetic_count = 0;
        let mut max_depth = 0;
        for node in nodes {
            *nodes_per_role.entry(node.role.clone()).or_insert(0) += 1;
            if node.synthetic {
                synthetic_count += 1;
            }
            max_depth = max_depth.max(node.depth);
        }
        Self {
            node_count: nodes.len(),
            edge_count: edges.len(),
            synthetic_count,
            max_depth,
            nodes_per_role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(hash: &str, url: &str) -> PageState {
        PageState {
            state_hash: hash.to_string(),
            url: url.to_string(),
            normalized_url: url.to_string(),
            title: format!("page {hash}"),
            timestamp: current_timestamp(),
            role: "default".to_string(),
            depth: 0,
            synthetic: false,
            features: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> Transition {
        Transition {
            from_hash: from.to_string(),
            to_hash: to.to_string(),
            action: format!("click:{to}"),
            metadata: serde_json::Value::Null,
            role: "default".to_string(),
            timestamp: current_timestamp(),
        }
    }

    #[test]
    fn add_node_is_idempotent_and_merges_features() {
        let mut g = StateGraph::new();
        let mut a = node("a", "https://x.example/a");
        a.features = json!({"forms": 1});
        assert!(g.add_node(a));

        let mut again = node("a", "https://x.example/a");
        again.features = json!({"buttons": 2});
        assert!(!g.add_node(again));

        assert_eq!(g.node_count(), 1);
        let merged = &g.get_node("a").unwrap().features;
        assert_eq!(merged["forms"], 1);
        assert_eq!(merged["buttons"], 2);
    }

    #[test]
    fn real_capture_supersedes_synthetic_placeholder() {
        let mut g = StateGraph::new();
        let mut placeholder = node("a", "https://x.example/a");
        placeholder.synthetic = true;
        placeholder.title = "(unreachable)".to_string();
        g.add_node(placeholder);

        g.add_node(node("a", "https://x.example/a"));
        let n = g.get_node("a").unwrap();
        assert!(!n.synthetic);
        assert_eq!(n.title, "page a");
    }

    #[test]
    fn edges_require_both_endpoints() {
        let mut g = StateGraph::new();
        g.add_node(node("a", "https://x.example/a"));
        assert!(g.add_edge(edge("a", "missing")).is_err());
        g.add_node(node("b", "https://x.example/b"));
        assert!(g.add_edge(edge("a", "b")).is_ok());
        assert_eq!(g.edge_count(), 1);
    }

    #[test]
    fn export_import_round_trip() {
        let mut g = StateGraph::new();
        g.add_node(node("a", "https://x.example/a"));
        g.add_node(node("b", "https://x.example/b"));
        g.add_edge(edge("a", "b")).unwrap();
        g.set_current("b").unwrap();

        let snap = g.export();
        assert_eq!(snap.stats.node_count, 2);
        assert_eq!(snap.stats.edge_count, 1);

        let restored = StateGraph::import(snap);
        assert_eq!(restored.node_count(), 2);
        assert_eq!(restored.edge_count(), 1);
        assert_eq!(restored.current_hash(), Some("b"));
    }

    #[test]
    fn prune_reparents_edges_onto_survivor() {
        let mut g = StateGraph::new();
        g.add_node(node("a", "https://x.example/a"));
        g.add_node(node("a2", "https://x.example/a?p=1"));
        g.add_node(node("c", "https://x.example/c"));
        g.add_edge(edge("a2", "c")).unwrap();

        let same_page = |u1: &str, u2: &str| {
            let strip = |u: &str| u.split('?').next().unwrap_or(u).to_string();
            strip(u1) == strip(u2)
        };
        let removed = g.prune_near_duplicates(same_page);
        assert_eq!(removed, 1);
        assert!(g.get_node("a2").is_none());
        // Edge survives, re-pointed at the kept node.
        let e: Vec<_> = g.edges().collect();
        assert_eq!(e.len(), 1);
        assert_eq!(e[0].from_hash, "a");
        assert_eq!(e[0].to_hash, "c");
    }

    #[test]
    fn stats_count_roles_and_synthetics() {
        let mut admin = node("x", "https://x.example/x");
        admin.role = "admin".to_string();
        admin.depth = 3;
        let mut synth = node("y", "https://x.example/y");
        synth.synthetic = true;

        let stats = GraphStats::compute(&[admin, synth], &[]);
        assert_eq!(stats.node_count, 2);
        assert_eq!(stats.synthetic_count, 1);
        assert_eq!(stats.max_depth, 3);
        assert_eq!(stats.nodes_per_role["admin"], 1);
        assert_eq!(stats.nodes_per_role["default"], 1);
    }
}
