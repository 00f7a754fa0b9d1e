use std::time::Duration;

/// Retry schedule for the agent readiness handshake and other polls
/// that may race a page that is still settling.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(200),
        }
    }
}

/// Crawl-wide configuration. Built once by the caller, shared read-only
/// by the orchestrator and every agent incarnation.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Zero means unbounded.
    pub max_depth: usize,
    /// Ceiling on one navigation, page fetch included.
    pub navigation_timeout: Duration,
    /// Settle time after a load before the agent captures state.
    pub stabilization_delay: Duration,
    /// Per-request HTTP timeout, below `navigation_timeout`.
    pub request_timeout: Duration,
    pub readiness_retry: RetryPolicy,
    /// Soft threshold: incremental export and keep going.
    pub memory_warning_bytes: u64,
    /// Hard threshold: finalize the role pass early.
    pub memory_critical_bytes: u64,
    pub user_agent: String,
    /// Run the whole-site deep link discovery pass on the first page.
    pub deep_discovery: bool,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            navigation_timeout: Duration::from_secs(30),
            stabilization_delay: Duration::from_millis(500),
            request_timeout: Duration::from_secs(10),
            readiness_retry: RetryPolicy::default(),
            memory_warning_bytes: 256 * 1024 * 1024,
            memory_critical_bytes: 512 * 1024 * 1024,
            user_agent: format!("Webatlas/{}", env!("CARGO_PKG_VERSION")),
            deep_discovery: true,
        }
    }
}

impl CrawlConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_stabilization_delay(mut self, delay: Duration) -> Self {
        self.stabilization_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_readiness_retry(mut self, policy: RetryPolicy) -> Self {
        self.readiness_retry = policy;
        self
    }

    pub fn with_memory_thresholds(mut self, warning: u64, critical: u64) -> Self {
        self.memory_warning_bytes = warning;
        self.memory_critical_bytes = critical;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_deep_discovery(mut self, enabled: bool) -> Self {
        self.deep_discovery = enabled;
        self
    }
}
