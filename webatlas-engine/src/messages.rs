//! Message types for the agent/orchestrator handshake and for crawl
//! progress observers.
//!
//! An agent incarnation never outlives the page it was built on, so it
//! talks to the orchestrator exclusively through [`AgentMessage`]s on
//! an in-order channel. The checkpoint save always precedes the
//! navigation request that destroys the agent; draining the channel in
//! order is what makes resume-after-destruction safe.

use webatlas_core::{Checkpoint, GraphSnapshot, LinkTask};

/// Sent by an exploration agent to the orchestrator.
#[derive(Debug)]
pub enum AgentMessage {
    /// Bootstrap finished; collaborators listed failed to come up but
    /// the core did.
    Ready { degraded: Vec<String> },
    /// The one-shot whole-site discovery pass ran on this page.
    DeepDiscoveryComplete { links_found: usize },
    /// Persist this before acting on any later message.
    SaveCheckpoint(Box<Checkpoint>),
    /// Navigate to the task's target; this agent is done.
    RequestNavigation(Box<LinkTask>),
    /// Frontier exhausted; the role pass is complete.
    CrawlComplete(Box<GraphSnapshot>),
}

/// Progress events published to observers (CLI progress bar, logs).
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    RoleStarted {
        role: String,
    },
    PageCaptured {
        role: String,
        url: String,
        depth: usize,
        synthetic: bool,
        nodes_total: usize,
        frontier_len: usize,
    },
    NavigationTimedOut {
        url: String,
    },
    MemoryWarning {
        used_bytes: u64,
    },
    RoleCompleted {
        role: String,
        nodes: usize,
        edges: usize,
    },
    RoleFailed {
        role: String,
        error: String,
    },
}
