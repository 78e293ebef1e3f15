use crate::metrics::report::SessionReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("bad value for {var}: {value}")]
    Env { var: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("session {} aborted: {}", .0.session_id, .0.abort_reason.map(|r| r.to_string()).unwrap_or_default())]
    Aborted(Box<SessionReport>),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

/// Network-level failure of a single GET. Never escapes a session.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout | FetchError::Connect(_) | FetchError::Network(_))
    }

    /// Host could not be reached at all (DNS, refused, unroutable).
    pub fn is_unreachable(&self) -> bool {
        matches!(self, FetchError::Connect(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Connect(_) => "connect",
            FetchError::Network(_) => "network",
            FetchError::InvalidUrl(_) => "invalid_url",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else if err.is_builder() {
            FetchError::InvalidUrl(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlavorError {
    #[error("flavor text unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(FetchError::Timeout.is_retryable());
        assert!(FetchError::Connect("refused".into()).is_retryable());
        assert!(!FetchError::InvalidUrl("nope".into()).is_retryable());
        assert!(FetchError::Connect("dns".into()).is_unreachable());
        assert!(!FetchError::Timeout.is_unreachable());
    }

    #[test]
    fn config_error_becomes_configuration() {
        let err: SessionError = ConfigError::Invalid("no pages".into()).into();
        assert!(matches!(err, SessionError::Configuration(msg) if msg.contains("no pages")));
    }
}
