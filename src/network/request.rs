use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeKind {
    Status(u16),
    Failed(FetchError),
}

impl OutcomeKind {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeKind::Status(code) if (200..400).contains(code))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            OutcomeKind::Status(code) => Some(*code),
            OutcomeKind::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match self {
            OutcomeKind::Failed(err) => Some(err),
            OutcomeKind::Status(_) => None,
        }
    }
}

/// One logical page visit. Retries are folded into `attempts`.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub id: RequestId,
    pub page: String,
    pub url: String,
    pub kind: OutcomeKind,
    pub elapsed: Duration,
    pub bytes: u64,
    pub attempts: u8,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.kind.is_success()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn status_label(&self) -> String {
        match &self.kind {
            OutcomeKind::Status(code) => code.to_string(),
            OutcomeKind::Failed(err) => err.kind().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_2xx_and_3xx() {
        assert!(OutcomeKind::Status(200).is_success());
        assert!(OutcomeKind::Status(301).is_success());
        assert!(OutcomeKind::Status(399).is_success());
        assert!(!OutcomeKind::Status(404).is_success());
        assert!(!OutcomeKind::Status(500).is_success());
        assert!(!OutcomeKind::Status(199).is_success());
        assert!(!OutcomeKind::Failed(FetchError::Timeout).is_success());
    }

    #[test]
    fn status_label_names_error_kind() {
        let outcome = RequestOutcome {
            id: RequestId::new(7),
            page: "home".into(),
            url: "http://localhost/".into(),
            kind: OutcomeKind::Failed(FetchError::Timeout),
            elapsed: Duration::from_millis(30),
            bytes: 0,
            attempts: 2,
        };
        assert_eq!(outcome.status_label(), "timeout");
        assert_eq!(outcome.kind.status(), None);
    }
}
