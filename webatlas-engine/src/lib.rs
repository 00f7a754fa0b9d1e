pub mod agent;
pub mod collab;
pub mod config;
pub mod error;
pub mod messages;
pub mod monitor;
pub mod orchestrator;
pub mod plugins;
pub mod session;
pub mod synthetic;

pub use agent::{AgentDeps, ExplorationAgent, LoadedPage};
pub use collab::{
    AuthenticationHandler, DomLinkExtractor, FormAuthenticator, LinkExtractor,
    SemanticFingerprinter, StateFingerprinter,
};
pub use config::{CrawlConfig, RetryPolicy};
pub use error::EngineError;
pub use messages::{AgentMessage, CrawlEvent};
pub use monitor::{MemoryMonitor, MemoryPressure};
pub use orchestrator::{Orchestrator, RoleCredential};
pub use plugins::{FeatureModule, FormInventory, PluginRegistry};
pub use session::{CrawlReport, SessionManager, DEFAULT_ROLE};
