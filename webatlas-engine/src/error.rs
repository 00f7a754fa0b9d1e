use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    #[error("Navigation to {0} already in flight")]
    NavigationInFlight(String),

    #[error("Agent bootstrap incomplete: {0}")]
    BootstrapPartial(String),

    #[error("Agent never became ready after {attempts} attempts")]
    ReadinessTimeout { attempts: u32 },

    #[error("Authentication failed for role {role}: {reason}")]
    AuthenticationFailure { role: String, reason: String },

    #[error("Store error: {0}")]
    Store(#[from] webatlas_core::CoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
