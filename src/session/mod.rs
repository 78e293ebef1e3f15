pub mod config;
pub mod manager;

pub use config::{JitterConfig, TrafficConfig};
pub use manager::TrafficRun;

use crate::agent::{Agent, DEFAULT_USER_AGENTS, HttpFetcher, PageFetcher};
use crate::error::{FetchError, SessionError};
use crate::flavor::{self, FlavorContext, FlavorSource, ProfileFlavor};
use crate::metrics::MetricsCollector;
use crate::metrics::logger::RequestLogger;
use crate::metrics::report::SessionReport;
use crate::network::{RequestId, RequestOutcome};
use crate::profile::{ProfileSelector, UserProfile};
use crate::selector::{self, VisitHistory, WeightedPages};
use crate::strategies::{RateController, RateRegistry};
use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Stand-in deadline for durations past what `Instant` can represent
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Running,
    Completed,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Created => "created",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    Cancelled,
    /// Every weighted page failed at the network level in one streak.
    Unreachable,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Cancelled => f.write_str("cancelled"),
            AbortReason::Unreachable => f.write_str("target unreachable"),
        }
    }
}

/// One paced run against one target. Owned by the loop driving it.
#[derive(Debug)]
pub struct Session {
    id: String,
    target: Url,
    duration: Duration,
    profile: UserProfile,
    state: SessionState,
    started_at: DateTime<Utc>,
    pages: Arc<WeightedPages>,
    urls: Vec<Url>,
    rate: RateController,
    initial_rate: f64,
    history: VisitHistory,
    rng: StdRng,
    requests_sent: u64,
    successes: u64,
    failures: u64,
    bytes_received: u64,
    page_hits: BTreeMap<String, u64>,
    flavor_fallbacks: u64,
    unreachable_streak: HashSet<usize>,
}

impl Session {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn rate_per_minute(&self) -> f64 {
        self.rate.rate()
    }

    fn record(&mut self, page_idx: usize, outcome: &RequestOutcome) {
        self.requests_sent += 1;
        if outcome.is_success() {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.bytes_received += outcome.bytes;
        *self.page_hits.entry(outcome.page.clone()).or_insert(0) += 1;

        match outcome.kind.error() {
            Some(err) if err.is_unreachable() => {
                self.unreachable_streak.insert(page_idx);
            }
            _ => self.unreachable_streak.clear(),
        }

        if let Some(change) = self.rate.observe(outcome.is_success()) {
            info!(
                "Session {} rate {:.1} -> {:.1} req/min (success {:.1}%)",
                self.short_id(),
                change.from,
                change.to,
                change.success_rate * 100.0
            );
        }
    }

    fn target_unreachable(&self) -> bool {
        if self.unreachable_streak.is_empty() {
            return false;
        }
        (0..self.pages.len())
            .filter(|&idx| self.pages.get(idx).weight > 0.0)
            .all(|idx| self.unreachable_streak.contains(&idx))
    }

    fn short_id(&self) -> &str {
        &self.id[..8.min(self.id.len())]
    }

    fn finish(&mut self, abort: Option<AbortReason>, elapsed: Duration) -> SessionReport {
        self.state = if abort.is_some() { SessionState::Aborted } else { SessionState::Completed };

        SessionReport {
            session_id: self.id.clone(),
            target: self.target.to_string(),
            profile: self.profile.name.clone(),
            status: self.state,
            abort_reason: abort,
            total_requests: self.requests_sent,
            successes: self.successes,
            failures: self.failures,
            bytes_received: self.bytes_received,
            initial_rate_per_minute: self.initial_rate,
            final_rate_per_minute: self.rate.rate(),
            rate_strategy: self.rate.strategy_name().to_string(),
            rate_adjustments: self.rate.adjustments(),
            page_hits: self.page_hits.clone(),
            flavor_fallbacks: self.flavor_fallbacks,
            started_at: self.started_at,
            finished_at: Utc::now(),
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}

pub struct SessionHandle {
    session: Session,
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        self.session.id()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Cancelling this token stops the session at its next suspension point.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Ties the session to a parent token, e.g. a whole run.
    pub fn bind(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }
}

/// Creates and drives sessions. Shares the fetcher (and its connection
/// pool), the process-wide metrics and the request log across sessions.
pub struct Generator<F> {
    config: Arc<TrafficConfig>,
    agent: Agent<F>,
    metrics: MetricsCollector,
    flavor: Arc<dyn FlavorSource>,
    request_log: Option<RequestLogger>,
    session_counter: AtomicU64,
}

impl Generator<HttpFetcher> {
    pub fn http(config: TrafficConfig) -> Result<Self, FetchError> {
        let fetcher = HttpFetcher::new(&config.http)?;
        Ok(Self::new(config, fetcher))
    }
}

impl<F: PageFetcher> Generator<F> {
    pub fn new(config: TrafficConfig, fetcher: F) -> Self {
        let mut pool: Vec<String> = config
            .user_agents
            .iter()
            .filter(|ua| !ua.trim().is_empty())
            .cloned()
            .collect();
        if pool.is_empty() {
            pool = DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect();
        }

        let agent = Agent::new(Arc::new(fetcher), pool.into(), config.http.clone());

        Self {
            config: Arc::new(config),
            agent,
            metrics: MetricsCollector::new(),
            flavor: Arc::new(ProfileFlavor),
            request_log: None,
            session_counter: AtomicU64::new(0),
        }
    }

    pub fn with_flavor(mut self, source: impl FlavorSource + 'static) -> Self {
        self.flavor = Arc::new(source);
        self
    }

    pub fn with_request_log(mut self, logger: RequestLogger) -> Self {
        self.request_log = Some(logger);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &TrafficConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn create_session(
        &self,
        target_base_url: &str,
        duration_secs: u64,
        profile_selector: ProfileSelector,
    ) -> Result<SessionHandle, SessionError> {
        if duration_secs == 0 {
            return Err(SessionError::InvalidArgument("duration must be positive".into()));
        }
        let target = config::parse_target(target_base_url).map_err(SessionError::InvalidArgument)?;

        let (pages, urls) = self.pages_for(&target)?;

        let index = self.session_counter.fetch_add(1, Ordering::Relaxed);
        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(index)),
            None => StdRng::from_entropy(),
        };

        let profile = self.pick_profile(&profile_selector, &mut rng)?;

        let strategy = RateRegistry::global()
            .create(&self.config.rate_strategy)
            .ok_or_else(|| {
                SessionError::Configuration(format!("unknown rate strategy '{}'", self.config.rate_strategy))
            })?;
        let initial_rate = profile.rate_per_minute.unwrap_or(self.config.initial_rate_per_minute);
        let rate = RateController::new(strategy, self.config.adaptation.clone(), initial_rate);

        let session = Session {
            id: Uuid::new_v4().simple().to_string(),
            target,
            duration: Duration::from_secs(duration_secs),
            profile,
            state: SessionState::Created,
            started_at: Utc::now(),
            pages: Arc::new(pages),
            urls,
            initial_rate: rate.rate(),
            rate,
            history: VisitHistory::new(),
            rng,
            requests_sent: 0,
            successes: 0,
            failures: 0,
            bytes_received: 0,
            page_hits: BTreeMap::new(),
            flavor_fallbacks: 0,
            unreachable_streak: HashSet::new(),
        };

        debug!(
            "Created session {} for {} ({}s, profile {})",
            session.id, session.target, duration_secs, session.profile.name
        );

        Ok(SessionHandle {
            session,
            cancel: CancellationToken::new(),
        })
    }

    /// Pages that resolve to the target's origin.
    fn pages_for(&self, target: &Url) -> Result<(WeightedPages, Vec<Url>), SessionError> {
        let mut pages = Vec::new();
        let mut urls = Vec::new();

        for page in &self.config.pages {
            let url = page
                .resolve(target)
                .map_err(|e| SessionError::Configuration(e.to_string()))?;
            if url.origin() == target.origin() {
                pages.push(page.clone());
                urls.push(url);
            } else {
                debug!("Page {} ({}) is not on {}, skipping", page.name, url, target);
            }
        }

        if pages.is_empty() {
            return Err(SessionError::Configuration(format!(
                "no page targets configured for {}",
                target
            )));
        }

        let weighted = WeightedPages::new(pages, self.config.strict_weights)?;
        Ok((weighted, urls))
    }

    fn pick_profile(&self, selector: &ProfileSelector, rng: &mut StdRng) -> Result<UserProfile, SessionError> {
        let profiles = &self.config.profiles;
        match selector {
            ProfileSelector::Pinned(name) => profiles
                .iter()
                .find(|p| &p.name == name)
                .cloned()
                .ok_or_else(|| SessionError::Configuration(format!("unknown profile '{}'", name))),
            ProfileSelector::Random if profiles.is_empty() => Ok(UserProfile::anonymous()),
            ProfileSelector::Random => {
                let dist = WeightedIndex::new(profiles.iter().map(|p| p.weight))
                    .map_err(|e| SessionError::Configuration(format!("profile weights: {}", e)))?;
                Ok(profiles[dist.sample(rng)].clone())
            }
        }
    }

    /// Drives a session until its duration elapses, it is cancelled, or
    /// the target turns out to be unreachable. Always yields a report.
    pub async fn run_session(&self, handle: SessionHandle) -> SessionReport {
        let SessionHandle { mut session, cancel } = handle;

        session.state = SessionState::Running;
        self.metrics.session_started();

        let start = Instant::now();
        session.started_at = Utc::now();
        let deadline = start
            .checked_add(session.duration)
            .unwrap_or_else(|| start + FAR_FUTURE);
        let pages = session.pages.clone();

        info!(
            "Session {} running against {} as {} at {:.1} req/min",
            session.short_id(),
            session.target,
            session.profile.name,
            session.rate.rate()
        );

        let abort = loop {
            if Instant::now() >= deadline {
                break None;
            }

            let selection = selector::select_next_page(
                &session.profile,
                &session.history,
                &pages,
                self.config.follow_preferred_sequence,
                &mut session.rng,
            );

            let delay = session.rate.base_delay_secs() + self.config.jitter.sample(&mut session.rng);
            let wake = Duration::try_from_secs_f64(delay)
                .ok()
                .and_then(|d| Instant::now().checked_add(d))
                .filter(|wake| *wake <= deadline);

            let Some(wake) = wake else {
                let cancelled = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => true,
                    _ = sleep_until(deadline) => false,
                };
                break cancelled.then_some(AbortReason::Cancelled);
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(AbortReason::Cancelled),
                _ = sleep_until(wake) => {}
            }

            session.history.record(selection);
            let page = pages.get(selection.index);
            let url = &session.urls[selection.index];
            let id = RequestId::new(session.requests_sent);

            // Dropping the visit future aborts the in-flight request
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(AbortReason::Cancelled),
                outcome = self.agent.visit(id, &page.name, url, &mut session.rng) => outcome,
            };

            session.record(selection.index, &outcome);
            self.metrics.record(&outcome);
            self.log_outcome(&mut session, &outcome);

            if session.target_unreachable() {
                warn!("Session {} cannot reach any page on {}, aborting", session.short_id(), session.target);
                break Some(AbortReason::Unreachable);
            }
        };

        let report = session.finish(abort, start.elapsed());
        self.metrics.session_finished(report.is_aborted());

        match report.abort_reason {
            Some(reason) => info!(
                "Session {} aborted ({}): {} requests, {} ok, {} failed",
                session.short_id(),
                reason,
                report.total_requests,
                report.successes,
                report.failures
            ),
            None => info!(
                "Session {} completed: {} requests, {} ok, {} failed, final rate {:.1} req/min",
                session.short_id(),
                report.total_requests,
                report.successes,
                report.failures,
                report.final_rate_per_minute
            ),
        }

        report
    }

    fn log_outcome(&self, session: &mut Session, outcome: &RequestOutcome) {
        let ctx = FlavorContext {
            session_id: &session.id,
            profile: &session.profile,
            page: &outcome.page,
            request_index: outcome.id.get(),
        };
        let flavor = flavor::describe_or_placeholder(self.flavor.as_ref(), &ctx);
        if flavor.fallback {
            session.flavor_fallbacks += 1;
        }

        debug!(
            session = %session.short_id(),
            page = %outcome.page,
            status = %outcome.status_label(),
            elapsed_ms = outcome.elapsed_ms(),
            bytes = outcome.bytes,
            sent = session.requests_sent,
            ok = session.successes,
            failed = session.failures,
            "{}",
            flavor.text
        );

        if let Some(log) = &self.request_log {
            if let Err(e) = log.log(&session.id, outcome, session.rate.rate(), &flavor.text) {
                warn!("Failed to write request log: {}", e);
            }
        }
    }
}
