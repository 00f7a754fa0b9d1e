pub mod error;
pub mod frontier;
pub mod graph;
pub mod hash;
pub mod merge;
pub mod model;
pub mod store;
pub mod url_norm;

pub use error::CoreError;
pub use frontier::{Checkpoint, EnqueueRejection, Frontier, FrontierSnapshot};
pub use graph::{GraphSnapshot, GraphStats, StateGraph};
pub use model::{
    DiscoverySource, LinkCandidate, LinkTask, PageState, RoleCrawlSession, SessionStatus,
    Transition,
};
pub use store::Database;
pub use url_norm::UrlNormalizer;
