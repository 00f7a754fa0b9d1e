//! The crawl frontier: a FIFO queue of link tasks plus the dedup sets
//! that keep breadth-first order honest across process restarts.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

use crate::graph::GraphSnapshot;
use crate::model::{current_timestamp, LinkTask};

/// Why an enqueue attempt was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueRejection {
    DuplicateTask,
    UrlAlreadyVisited,
    UrlAlreadyCaptured,
    DepthExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct Frontier {
    queue: VecDeque<LinkTask>,
    /// Task hashes ever enqueued, visited or not.
    seen_tasks: HashSet<String>,
    /// Normalized URLs already dispatched for navigation.
    visited_urls: HashSet<String>,
    /// One-shot: the expensive whole-site link discovery pass ran.
    deep_discovery_done: bool,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a task unless it duplicates work or its depth reaches
    /// `max_depth` (zero means unbounded). Captured depths stay
    /// strictly below the bound; the seed is depth zero. `captured`
    /// answers whether the graph already holds a node for the task's
    /// normalized target URL.
    pub fn enqueue(
        &mut self,
        task: LinkTask,
        normalized_target: &str,
        max_depth: usize,
        captured: impl Fn(&str) -> bool,
    ) -> std::result::Result<(), EnqueueRejection> {
        if max_depth > 0 && task.depth >= max_depth {
            return Err(EnqueueRejection::DepthExceeded);
        }
        if self.seen_tasks.contains(&task.task_hash) {
            return Err(EnqueueRejection::DuplicateTask);
        }
        if self.visited_urls.contains(normalized_target) {
            return Err(EnqueueRejection::UrlAlreadyVisited);
        }
        if captured(normalized_target) {
            return Err(EnqueueRejection::UrlAlreadyCaptured);
        }
        self.seen_tasks.insert(task.task_hash.clone());
        debug!(url = %task.target_url, depth = task.depth, "enqueued link task");
        self.queue.push_back(task);
        Ok(())
    }

    /// Pop the next task whose target has not been visited since it was
    /// enqueued, marking its URL visited at dispatch time. Stale heads
    /// are dropped silently.
    pub fn dequeue_next(&mut self, normalize: impl Fn(&str) -> String) -> Option<LinkTask> {
        while let Some(task) = self.queue.pop_front() {
            let normalized = normalize(&task.target_url);
            if self.visited_urls.contains(&normalized) {
                debug!(url = %task.target_url, "dropping stale frontier head");
                continue;
            }
            self.visited_urls.insert(normalized);
            return Some(task);
        }
        None
    }

    /// Record a URL as visited without dequeuing - used when restoring
    /// on a page the previous incarnation already navigated to.
    pub fn mark_visited(&mut self, normalized_url: &str) -> bool {
        self.visited_urls.insert(normalized_url.to_string())
    }

    pub fn is_visited(&self, normalized_url: &str) -> bool {
        self.visited_urls.contains(normalized_url)
    }

    pub fn deep_discovery_done(&self) -> bool {
        self.deep_discovery_done
    }

    /// Latches true; the deep discovery pass never runs twice.
    pub fn set_deep_discovery_done(&mut self) {
        self.deep_discovery_done = true;
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn visited_count(&self) -> usize {
        self.visited_urls.len()
    }

    pub fn peek(&self) -> Option<&LinkTask> {
        self.queue.front()
    }

    pub fn snapshot(&self) -> FrontierSnapshot {
        FrontierSnapshot {
            queue: self.queue.iter().cloned().collect(),
            seen_tasks: self.seen_tasks.iter().cloned().collect(),
            visited_urls: self.visited_urls.iter().cloned().collect(),
            deep_discovery_done: self.deep_discovery_done,
        }
    }

    pub fn from_snapshot(snapshot: FrontierSnapshot) -> Self {
        Self {
            queue: snapshot.queue.into(),
            seen_tasks: snapshot.seen_tasks.into_iter().collect(),
            visited_urls: snapshot.visited_urls.into_iter().collect(),
            deep_discovery_done: snapshot.deep_discovery_done,
        }
    }
}

/// Serializable frontier state. Queue order is preserved exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub queue: Vec<LinkTask>,
    pub seen_tasks: Vec<String>,
    pub visited_urls: Vec<String>,
    #[serde(default)]
    pub deep_discovery_done: bool,
}

/// Everything a fresh agent incarnation needs to resume mid-crawl.
/// Written before every navigation; a single slot, last write wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub graph: GraphSnapshot,
    pub frontier: FrontierSnapshot,
    pub current_depth: usize,
    pub max_depth: usize,
    pub role: String,
    pub saved_at: i64,
}

impl Checkpoint {
    pub fn new(
        graph: GraphSnapshot,
        frontier: FrontierSnapshot,
        current_depth: usize,
        max_depth: usize,
        role: &str,
    ) -> Self {
        Self {
            graph,
            frontier,
            current_depth,
            max_depth,
            role: role.to_string(),
            saved_at: current_timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscoverySource;

    fn task(url: &str, depth: usize) -> LinkTask {
        LinkTask {
            target_url: url.to_string(),
            source_hash: "src".to_string(),
            link_text: "link".to_string(),
            depth,
            task_hash: crate::hash::url_hash(url),
            discovery_source: DiscoverySource::Dom,
        }
    }

    fn identity(u: &str) -> String {
        u.to_string()
    }

    #[test]
    fn enqueue_preserves_fifo_order() {
        let mut f = Frontier::new();
        for u in ["https://x.example/a", "https://x.example/b", "https://x.example/c"] {
            f.enqueue(task(u, 1), u, 0, |_| false).unwrap();
        }
        assert_eq!(f.dequeue_next(identity).unwrap().target_url, "https://x.example/a");
        assert_eq!(f.dequeue_next(identity).unwrap().target_url, "https://x.example/b");
        assert_eq!(f.dequeue_next(identity).unwrap().target_url, "https://x.example/c");
        assert!(f.dequeue_next(identity).is_none());
    }

    #[test]
    fn enqueue_rejects_duplicates_visited_captured_and_deep() {
        let mut f = Frontier::new();
        let u = "https://x.example/a";
        f.enqueue(task(u, 1), u, 3, |_| false).unwrap();
        assert_eq!(
            f.enqueue(task(u, 1), u, 3, |_| false),
            Err(EnqueueRejection::DuplicateTask)
        );

        f.mark_visited("https://x.example/b");
        assert_eq!(
            f.enqueue(task("https://x.example/b", 1), "https://x.example/b", 3, |_| false),
            Err(EnqueueRejection::UrlAlreadyVisited)
        );

        assert_eq!(
            f.enqueue(task("https://x.example/c", 1), "https://x.example/c", 3, |_| true),
            Err(EnqueueRejection::UrlAlreadyCaptured)
        );

        // Reaching the bound is already too deep.
        assert_eq!(
            f.enqueue(task("https://x.example/d", 3), "https://x.example/d", 3, |_| false),
            Err(EnqueueRejection::DepthExceeded)
        );
        assert!(f
            .enqueue(task("https://x.example/e", 2), "https://x.example/e", 3, |_| false)
            .is_ok());
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn depth_zero_means_unbounded() {
        let mut f = Frontier::new();
        let u = "https://x.example/deep";
        assert!(f.enqueue(task(u, 999), u, 0, |_| false).is_ok());
    }

    #[test]
    fn dequeue_skips_heads_visited_after_enqueue() {
        let mut f = Frontier::new();
        let a = "https://x.example/a";
        let b = "https://x.example/b";
        f.enqueue(task(a, 1), a, 0, |_| false).unwrap();
        f.enqueue(task(b, 1), b, 0, |_| false).unwrap();

        // Restore-on-page marks the head's URL visited before dequeue.
        f.mark_visited(a);
        let next = f.dequeue_next(identity).unwrap();
        assert_eq!(next.target_url, b);
    }

    #[test]
    fn dequeue_marks_visited_at_dispatch() {
        let mut f = Frontier::new();
        let a = "https://x.example/a";
        f.enqueue(task(a, 1), a, 0, |_| false).unwrap();
        assert!(!f.is_visited(a));
        f.dequeue_next(identity).unwrap();
        assert!(f.is_visited(a));
    }

    #[test]
    fn snapshot_round_trip_keeps_order_and_flags() {
        let mut f = Frontier::new();
        for u in ["https://x.example/1", "https://x.example/2"] {
            f.enqueue(task(u, 1), u, 0, |_| false).unwrap();
        }
        f.mark_visited("https://x.example/0");
        f.set_deep_discovery_done();

        let mut restored = Frontier::from_snapshot(f.snapshot());
        assert_eq!(restored.len(), 2);
        assert!(restored.deep_discovery_done());
        assert!(restored.is_visited("https://x.example/0"));
        assert_eq!(
            restored.dequeue_next(identity).unwrap().target_url,
            "https://x.example/1"
        );
    }
}
