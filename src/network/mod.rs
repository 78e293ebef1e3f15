pub mod request;

pub use request::{OutcomeKind, RequestId, RequestOutcome};

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub retry_transient: bool,
    pub retry_backoff_ms: u64,
    pub accept_language: String,
    pub pool_idle_per_host: usize,
}

impl HttpSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retry_transient: true,
            retry_backoff_ms: 250,
            accept_language: "en-US,en;q=0.5".to_string(),
            pool_idle_per_host: 16,
        }
    }
}
