pub mod agent;
pub mod error;
pub mod flavor;
pub mod metrics;
pub mod network;
pub mod profile;
pub mod selector;
pub mod session;
pub mod strategies;

pub use agent::{Agent, HttpFetcher, PageFetcher};
pub use error::{ConfigError, FetchError, FlavorError, SessionError};
pub use metrics::MetricsCollector;
pub use session::{Generator, SessionHandle, TrafficConfig, TrafficRun};
pub use strategies::RateStrategy;

pub mod prelude {
    pub use crate::agent::{HttpFetcher, PageFetcher};
    pub use crate::metrics::report::{RunReport, SessionReport};
    pub use crate::profile::{PageTarget, ProfileSelector, UserProfile};
    pub use crate::session::{Generator, SessionState, TrafficConfig, TrafficRun};
    pub use crate::strategies::{RateRegistry, RateStrategy};
}
