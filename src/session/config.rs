use crate::agent::DEFAULT_USER_AGENTS;
use crate::error::ConfigError;
use crate::network::HttpSettings;
use crate::profile::{PageTarget, UserProfile};
use crate::selector::WeightedPages;
use crate::strategies::{AdaptationConfig, RateRegistry};
use rand::Rng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const ENV_PREFIX: &str = "TRAFFICFLOU_";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JitterConfig {
    pub min_secs: f64,
    pub max_secs: f64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            min_secs: 0.5,
            max_secs: 3.0,
        }
    }
}

impl JitterConfig {
    pub fn none() -> Self {
        Self {
            min_secs: 0.0,
            max_secs: 0.0,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        if self.max_secs > self.min_secs && self.max_secs.is_finite() && self.min_secs.is_finite() {
            rng.gen_range(self.min_secs..=self.max_secs)
        } else {
            self.min_secs
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficConfig {
    pub target_base_url: String,
    pub duration_secs: u64,
    pub sessions: u32,
    pub max_concurrent_sessions: usize,
    pub initial_rate_per_minute: f64,
    pub rate_strategy: String,
    pub adaptation: AdaptationConfig,
    pub jitter: JitterConfig,
    pub http: HttpSettings,
    pub pages: Vec<PageTarget>,
    pub profiles: Vec<UserProfile>,
    pub follow_preferred_sequence: bool,
    pub strict_weights: bool,
    pub user_agents: Vec<String>,
    pub user_agents_file: Option<PathBuf>,
    pub seed: Option<u64>,
    pub report_dir: Option<PathBuf>,
    pub request_log: Option<PathBuf>,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            target_base_url: "http://127.0.0.1:8080".to_string(),
            duration_secs: 60,
            sessions: 1,
            max_concurrent_sessions: 4,
            initial_rate_per_minute: 30.0,
            rate_strategy: "adaptive".to_string(),
            adaptation: AdaptationConfig::default(),
            jitter: JitterConfig::default(),
            http: HttpSettings::default(),
            pages: vec![PageTarget::new("home", "/", 1.0)],
            profiles: Vec::new(),
            follow_preferred_sequence: true,
            strict_weights: false,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            user_agents_file: None,
            seed: None,
            report_dir: Some(PathBuf::from("results")),
            request_log: None,
        }
    }
}

impl TrafficConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_target(mut self, url: impl Into<String>) -> Self {
        self.target_base_url = url.into();
        self
    }

    pub fn with_pages(mut self, pages: Vec<PageTarget>) -> Self {
        self.pages = pages;
        self
    }

    pub fn with_profiles(mut self, profiles: Vec<UserProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    pub fn with_rate_strategy(mut self, name: impl Into<String>) -> Self {
        self.rate_strategy = name.into();
        self
    }

    pub fn with_fixed_rate(mut self, rate_per_minute: f64) -> Self {
        self.rate_strategy = "fixed".to_string();
        self.initial_rate_per_minute = rate_per_minute;
        self
    }

    pub fn with_jitter(mut self, min_secs: f64, max_secs: f64) -> Self {
        self.jitter = JitterConfig { min_secs, max_secs };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// `lookup` receives the full variable name, e.g. `TRAFFICFLOU_TARGET_URL`.
    pub fn apply_overrides<L>(&mut self, lookup: L) -> Result<(), ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = get("TARGET_URL") {
            self.target_base_url = v;
        }
        if let Some(v) = get("DURATION_SECS") {
            self.duration_secs = parse_env("DURATION_SECS", &v)?;
        }
        if let Some(v) = get("SESSIONS") {
            self.sessions = parse_env("SESSIONS", &v)?;
        }
        if let Some(v) = get("MAX_CONCURRENT_SESSIONS") {
            self.max_concurrent_sessions = parse_env("MAX_CONCURRENT_SESSIONS", &v)?;
        }
        if let Some(v) = get("RATE_PER_MINUTE") {
            self.initial_rate_per_minute = parse_env("RATE_PER_MINUTE", &v)?;
        }
        if let Some(v) = get("RATE_STRATEGY") {
            self.rate_strategy = v;
        }
        if let Some(v) = get("SEED") {
            self.seed = Some(parse_env("SEED", &v)?);
        }
        if let Some(v) = get("REPORT_DIR") {
            self.report_dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Appends one User-Agent per non-empty, non-comment line.
    pub fn load_user_agents_file(&mut self) -> Result<(), ConfigError> {
        let Some(path) = &self.user_agents_file else {
            return Ok(());
        };
        let content = std::fs::read_to_string(path)?;
        self.user_agents.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
        Ok(())
    }

    pub fn weighted_pages(&self) -> Result<WeightedPages, ConfigError> {
        WeightedPages::new(self.pages.clone(), self.strict_weights)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        parse_target(&self.target_base_url).map_err(ConfigError::Invalid)?;

        if self.duration_secs == 0 {
            return Err(invalid("duration_secs must be positive"));
        }
        if self.sessions == 0 {
            return Err(invalid("sessions must be at least 1"));
        }
        if self.max_concurrent_sessions == 0 {
            return Err(invalid("max_concurrent_sessions must be at least 1"));
        }

        let pages = self.weighted_pages()?;

        let mut profile_names = HashSet::new();
        for profile in &self.profiles {
            if !profile.weight.is_finite() || profile.weight <= 0.0 {
                return Err(invalid(format!("profile '{}' needs a positive weight", profile.name)));
            }
            if !profile_names.insert(profile.name.as_str()) {
                return Err(invalid(format!("duplicate profile name '{}'", profile.name)));
            }
            for page in &profile.preferred_sequence {
                if pages.index_of(page).is_none() {
                    return Err(invalid(format!(
                        "profile '{}' references unknown page '{}'",
                        profile.name, page
                    )));
                }
            }
            if let Some(rate) = profile.rate_per_minute {
                if !rate.is_finite() || rate <= 0.0 {
                    return Err(invalid(format!("profile '{}' has invalid rate {}", profile.name, rate)));
                }
            }
        }

        let a = &self.adaptation;
        if !(a.min_rate_per_minute > 0.0) || !a.max_rate_per_minute.is_finite() {
            return Err(invalid("rate bounds must be positive and finite"));
        }
        if a.min_rate_per_minute > a.max_rate_per_minute {
            return Err(invalid("min_rate_per_minute exceeds max_rate_per_minute"));
        }
        if !self.initial_rate_per_minute.is_finite()
            || self.initial_rate_per_minute < a.min_rate_per_minute
            || self.initial_rate_per_minute > a.max_rate_per_minute
        {
            return Err(invalid(format!(
                "initial rate {} outside [{}, {}]",
                self.initial_rate_per_minute, a.min_rate_per_minute, a.max_rate_per_minute
            )));
        }
        if !(a.success_target > 0.0 && a.success_target <= 1.0) {
            return Err(invalid("success_target must be in (0, 1]"));
        }
        for (name, fraction) in [("decrease_fraction", a.decrease_fraction), ("increase_fraction", a.increase_fraction)] {
            if !(0.0..1.0).contains(&fraction) {
                return Err(invalid(format!("{} must be in [0, 1)", name)));
            }
        }
        if a.interval_requests == 0 || a.window_size == 0 {
            return Err(invalid("interval_requests and window_size must be at least 1"));
        }
        if !(a.additive_step_per_minute >= 0.0) {
            return Err(invalid("additive_step_per_minute must not be negative"));
        }

        let j = &self.jitter;
        if !j.min_secs.is_finite() || !j.max_secs.is_finite() {
            return Err(invalid("jitter bounds must be finite"));
        }
        if j.min_secs < 0.0 || j.max_secs < j.min_secs {
            return Err(invalid("jitter needs 0 <= min_secs <= max_secs"));
        }

        if !RateRegistry::global().contains(&self.rate_strategy) {
            return Err(invalid(format!(
                "unknown rate strategy '{}' (available: {})",
                self.rate_strategy,
                RateRegistry::global().list().join(", ")
            )));
        }

        if self.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(invalid("user agent pool is empty"));
        }

        if self.http.timeout_secs == 0 {
            return Err(invalid("http.timeout_secs must be positive"));
        }

        Ok(())
    }
}

/// Accepts only absolute http(s) URLs.
pub fn parse_target(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("target '{}' is not a valid URL: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(format!("target '{}' must be an http(s) URL", raw)),
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        var: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
    })
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
