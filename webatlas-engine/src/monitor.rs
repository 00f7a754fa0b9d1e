//! Memory pressure tracking over the in-flight crawl state.
//!
//! Usage is modeled as the serialized size of the resume checkpoint,
//! which is the state that actually has to fit through persistence on
//! every navigation.

use tracing::warn;
use webatlas_core::Checkpoint;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    Normal,
    /// Export incrementally and keep crawling.
    Warning,
    /// Finalize the current role pass early.
    Critical,
}

#[derive(Debug, Clone, Copy)]
pub struct MemoryMonitor {
    warning_bytes: u64,
    critical_bytes: u64,
}

impl MemoryMonitor {
    pub fn new(warning_bytes: u64, critical_bytes: u64) -> Self {
        Self {
            warning_bytes,
            critical_bytes,
        }
    }

    pub fn assess(&self, checkpoint: &Checkpoint) -> Result<(MemoryPressure, u64)> {
        let used = serde_json::to_string(checkpoint)?.len() as u64;
        let pressure = if used >= self.critical_bytes {
            warn!(used, limit = self.critical_bytes, "crawl state critically large");
            MemoryPressure::Critical
        } else if used >= self.warning_bytes {
            warn!(used, limit = self.warning_bytes, "crawl state above warning threshold");
            MemoryPressure::Warning
        } else {
            MemoryPressure::Normal
        };
        Ok((pressure, used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use webatlas_core::model::{current_timestamp, PageState};
    use webatlas_core::{Frontier, StateGraph};

    fn checkpoint_with_nodes(count: usize) -> Checkpoint {
        let mut graph = StateGraph::new();
        for i in 0..count {
            graph.add_node(PageState {
                state_hash: format!("h{i}"),
                url: format!("https://x.example/{i}"),
                normalized_url: format!("https://x.example/{i}"),
                title: format!("page {i}"),
                timestamp: current_timestamp(),
                role: "default".to_string(),
                depth: 1,
                synthetic: false,
                features: serde_json::Value::Null,
            });
        }
        Checkpoint::new(graph.export(), Frontier::new().snapshot(), 1, 3, "default")
    }

    #[test]
    fn pressure_escalates_with_state_size() {
        let monitor = MemoryMonitor::new(200, 4000);

        let (p, _) = monitor.assess(&checkpoint_with_nodes(0)).unwrap();
        assert_eq!(p, MemoryPressure::Normal);

        let (p, used) = monitor.assess(&checkpoint_with_nodes(5)).unwrap();
        assert_eq!(p, MemoryPressure::Warning);
        assert!(used >= 200);

        let (p, _) = monitor.assess(&checkpoint_with_nodes(50)).unwrap();
        assert_eq!(p, MemoryPressure::Critical);
    }
}
