// Tests for the CLI helper functions

use std::path::PathBuf;

use webatlas::handlers::{parse_roles, render_summary, resolve_db_path, write_graph_json};
use webatlas_core::graph::{GraphSnapshot, GraphStats};
use webatlas_core::model::{current_timestamp, PageState, RoleCrawlSession};
use webatlas_engine::CrawlReport;

fn snapshot_with_nodes(role: &str, count: usize) -> GraphSnapshot {
    let nodes: Vec<PageState> = (0..count)
        .map(|i| PageState {
            state_hash: format!("{role}{i}"),
            url: format!("https://x.example/{i}"),
            normalized_url: format!("https://x.example/{i}"),
            title: format!("page {i}"),
            timestamp: current_timestamp(),
            role: role.to_string(),
            depth: i,
            synthetic: false,
            features: serde_json::Value::Null,
        })
        .collect();
    let stats = GraphStats::compute(&nodes, &[]);
    GraphSnapshot {
        nodes,
        edges: vec![],
        current_hash: None,
        exported_at: current_timestamp(),
        stats,
    }
}

// ============================================================================
// Role Parsing Tests
// ============================================================================

#[test]
fn test_parse_roles_trims_and_dedups() {
    assert_eq!(
        parse_roles(" default, admin ,default,, user"),
        vec!["default", "admin", "user"]
    );
}

#[test]
fn test_parse_roles_empty_input() {
    assert!(parse_roles("").is_empty());
    assert!(parse_roles(" , ,").is_empty());
}

// ============================================================================
// Database Path Tests
// ============================================================================

#[test]
fn test_resolve_db_path_default() {
    let path = resolve_db_path(None);
    assert!(path.ends_with(".config/webatlas/webatlas.db"));
}

#[test]
fn test_resolve_db_path_directory_gets_filename() {
    let path = resolve_db_path(Some(&"/tmp/atlas".to_string()));
    assert_eq!(path, PathBuf::from("/tmp/atlas/webatlas.db"));
}

#[test]
fn test_resolve_db_path_explicit_file_kept() {
    let path = resolve_db_path(Some(&"/tmp/custom.db".to_string()));
    assert_eq!(path, PathBuf::from("/tmp/custom.db"));
}

// ============================================================================
// Summary Rendering Tests
// ============================================================================

#[test]
fn test_render_summary_lists_roles_and_totals() {
    let mut ok_role = RoleCrawlSession::started("default");
    ok_role.complete(snapshot_with_nodes("default", 3));
    let mut bad_role = RoleCrawlSession::started("admin");
    bad_role.fail("login endpoint returned 401".to_string());

    let merged = snapshot_with_nodes("default", 3);
    let report = CrawlReport {
        session_id: "abc-123".to_string(),
        merged,
        roles: vec![ok_role, bad_role],
    };

    let summary = render_summary(&report);
    println!("{summary}");

    assert!(summary.contains("abc-123"));
    assert!(summary.contains("default"));
    assert!(summary.contains("3 states"));
    assert!(summary.contains("failed"));
    assert!(summary.contains("login endpoint returned 401"));
    assert!(summary.contains("max depth 2"));
}

// ============================================================================
// Export Tests
// ============================================================================

#[test]
fn test_write_graph_json_round_trips() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("graph.json");

    let snapshot = snapshot_with_nodes("default", 2);
    write_graph_json(&path, &snapshot).unwrap();

    let loaded: GraphSnapshot =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(loaded.stats.node_count, 2);
    assert_eq!(loaded.nodes[1].normalized_url, "https://x.example/1");
}
