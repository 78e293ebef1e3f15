use crate::error::FetchError;
use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTarget {
    pub name: String,
    /// Absolute URL, or a path joined onto the session's base URL.
    pub url: String,
    pub weight: f64,
}

impl PageTarget {
    pub fn new(name: impl Into<String>, url: impl Into<String>, weight: f64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            weight,
        }
    }

    pub fn resolve(&self, base: &Url) -> Result<Url, FetchError> {
        Url::options()
            .base_url(Some(base))
            .parse(&self.url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", self.url, e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    #[serde(default)]
    pub age_range: String,
    #[serde(default)]
    pub interests: Vec<String>,
    /// Page names visited in order before falling back to weighted draws.
    #[serde(default)]
    pub preferred_sequence: Vec<String>,
    #[serde(default = "default_profile_weight")]
    pub weight: f64,
    /// Seeds the initial request rate of sessions using this profile.
    #[serde(default)]
    pub rate_per_minute: Option<f64>,
}

fn default_profile_weight() -> f64 {
    1.0
}

impl UserProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            age_range: String::new(),
            interests: Vec::new(),
            preferred_sequence: Vec::new(),
            weight: 1.0,
            rate_per_minute: None,
        }
    }

    /// Used when no profiles are configured: pure weighted-random browsing.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    pub fn with_sequence<I, S>(mut self, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_sequence = pages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ProfileSelector {
    #[default]
    Random,
    Pinned(String),
}

impl ProfileSelector {
    pub fn from_option(name: Option<String>) -> Self {
        name.map(ProfileSelector::Pinned).unwrap_or_default()
    }
}
