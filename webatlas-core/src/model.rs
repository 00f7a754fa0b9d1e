use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque collaborator-supplied data attached to nodes and edges.
pub type FeatureBlob = serde_json::Value;

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// A captured page state - one node in the state graph.
///
/// Never mutated after creation, except that collaborator feature data
/// may be merged into `features` when the same state is re-captured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageState {
    pub state_hash: String,
    pub url: String,
    pub normalized_url: String,
    pub title: String,
    pub timestamp: i64,
    pub role: String,
    pub depth: usize,
    /// Set on placeholder nodes created when real navigation could not
    /// be confirmed.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(default)]
    pub features: FeatureBlob,
}

/// A confirmed state change - one edge in the state graph.
///
/// Action labels follow the `click:<text>` / `goto:<url>` convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from_hash: String,
    pub to_hash: String,
    pub action: String,
    #[serde(default)]
    pub metadata: FeatureBlob,
    pub role: String,
    pub timestamp: i64,
}

/// How a link candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Dom,
    DeepScan,
}

/// A raw outgoing link as returned by an extraction collaborator,
/// before any normalization or dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCandidate {
    pub href: String,
    pub text: String,
    #[serde(default)]
    pub title: String,
}

/// A unit of frontier work. Immutable once enqueued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkTask {
    pub target_url: String,
    pub source_hash: String,
    pub link_text: String,
    pub depth: usize,
    pub task_hash: String,
    pub discovery_source: DiscoverySource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Stopped => "stopped",
        }
    }
}

/// One identity pass over the target, owned by the session manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCrawlSession {
    pub role: String,
    pub subgraph: Option<crate::graph::GraphSnapshot>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
    pub status: SessionStatus,
    pub error: Option<String>,
}

impl RoleCrawlSession {
    pub fn started(role: &str) -> Self {
        Self {
            role: role.to_string(),
            subgraph: None,
            started_at: current_timestamp(),
            completed_at: None,
            status: SessionStatus::Running,
            error: None,
        }
    }

    pub fn complete(&mut self, subgraph: crate::graph::GraphSnapshot) {
        self.subgraph = Some(subgraph);
        self.completed_at = Some(current_timestamp());
        self.status = SessionStatus::Completed;
    }

    /// The pass was cut short; whatever it checkpointed stands.
    pub fn stop(&mut self, subgraph: crate::graph::GraphSnapshot) {
        self.subgraph = Some(subgraph);
        self.completed_at = Some(current_timestamp());
        self.status = SessionStatus::Stopped;
    }

    pub fn fail(&mut self, error: String) {
        self.completed_at = Some(current_timestamp());
        self.status = SessionStatus::Failed;
        self.error = Some(error);
    }
}
