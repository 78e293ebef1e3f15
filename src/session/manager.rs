use super::Generator;
use crate::agent::PageFetcher;
use crate::metrics::logger::MetricsLogger;
use crate::metrics::report::{RunReport, SessionReport};
use crate::profile::ProfileSelector;
use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs `config.sessions` sessions, at most `max_concurrent_sessions` at a time.
pub struct TrafficRun<F> {
    generator: Arc<Generator<F>>,
    cancel: CancellationToken,
    show_progress: bool,
}

impl<F: PageFetcher> TrafficRun<F> {
    pub fn new(generator: Generator<F>) -> Self {
        Self {
            generator: Arc::new(generator),
            cancel: CancellationToken::new(),
            show_progress: true,
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn generator(&self) -> &Generator<F> {
        &self.generator
    }

    /// Cancelling stops every session of the run, queued ones included.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run(&self, selector: ProfileSelector) -> Result<RunReport> {
        let config = self.generator.config();
        let started_at = Utc::now();

        info!("Starting traffic run against {}", config.target_base_url);
        info!(
            "Sessions: {} ({} concurrent), duration {}s each, strategy {}",
            config.sessions, config.max_concurrent_sessions, config.duration_secs, config.rate_strategy
        );

        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_sessions));
        let mut tasks = JoinSet::new();

        for _ in 0..config.sessions {
            let handle = self
                .generator
                .create_session(&config.target_base_url, config.duration_secs, selector.clone())?
                .bind(&self.cancel);

            let generator = self.generator.clone();
            let semaphore = semaphore.clone();
            let cancel = self.cancel.clone();

            tasks.spawn(async move {
                // A cancelled run still finalizes queued sessions, with zero requests
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => permit.ok(),
                    _ = cancel.cancelled() => None,
                };
                generator.run_session(handle).await
            });
        }

        let waves = (config.sessions as u64).div_ceil(config.max_concurrent_sessions as u64);
        let expected_secs = config.duration_secs * waves;

        let pb = if self.show_progress {
            ProgressBar::new(expected_secs)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.orange/yellow} {pos}/{len}s {msg}")?
                .progress_chars("█▓░"),
        );

        let mut reports: Vec<SessionReport> = Vec::with_capacity(config.sessions as usize);
        let mut tick = interval(Duration::from_secs(1));
        let mut elapsed_secs = 0u64;

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok(report)) => {
                        if let Some(dir) = &config.report_dir {
                            match report.write_json(dir) {
                                Ok(path) => info!("Session report saved to: {}", path.display()),
                                Err(e) => warn!("Failed to save session report: {}", e),
                            }
                        }
                        reports.push(report);
                    }
                    Some(Err(e)) => error!("Session task failed: {}", e),
                    None => break,
                },
                _ = tick.tick() => {
                    self.generator.metrics().save_snapshot();
                    let snapshot = self.generator.metrics().snapshot();
                    pb.set_position(elapsed_secs.min(expected_secs));
                    elapsed_secs += 1;
                    pb.set_message(format!(
                        "Requests: {} | Success: {:.1}% | Active: {}",
                        snapshot.requests_sent,
                        snapshot.success_rate * 100.0,
                        snapshot.active_sessions
                    ));
                }
            }
        }

        pb.finish_with_message("Traffic run complete");
        self.generator.metrics().save_snapshot();

        let run = RunReport {
            started_at,
            finished_at: Utc::now(),
            cancelled: self.cancel.is_cancelled(),
            sessions: reports,
            aggregate: self.generator.metrics().snapshot(),
            page_hits: self.generator.metrics().page_hits(),
        };

        if let Some(dir) = &config.report_dir {
            self.save_results(dir, &run)?;
        }

        Ok(run)
    }

    fn save_results(&self, dir: &std::path::Path, run: &RunReport) -> Result<()> {
        let json_path = run.write_json(dir)?;
        info!("Run report saved to: {}", json_path.display());

        let timestamp = run.finished_at.format("%Y%m%d_%H%M%S");
        let csv_path = dir.join(format!("run_{}_snapshots.csv", timestamp));
        let mut logger = MetricsLogger::new(&csv_path)?;
        logger.log_batch(&self.generator.metrics().get_snapshots())?;
        info!("Snapshots saved to: {}", csv_path.display());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::session::tests::{FakeSite, fixed_config};

    fn run_with(sessions: u32, concurrent: usize, dir: Option<&std::path::Path>) -> TrafficRun<FakeSite> {
        let mut config = fixed_config();
        config.sessions = sessions;
        config.max_concurrent_sessions = concurrent;
        config.duration_secs = 5;
        config.report_dir = dir.map(|d| d.to_path_buf());
        TrafficRun::new(Generator::new(config, FakeSite::default())).with_progress(false)
    }

    #[tokio::test(start_paused = true)]
    async fn runs_every_session_and_saves_reports() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_with(3, 2, Some(dir.path()));
        let report = run.run(ProfileSelector::Random).await.unwrap();

        assert_eq!(report.sessions.len(), 3);
        assert!(!report.cancelled);
        assert!(report.sessions.iter().all(|s| s.status == SessionState::Completed));
        assert_eq!(report.aggregate.requests_sent, report.total_requests());
        assert_eq!(report.successes() + report.failures(), report.total_requests());
        assert_eq!(report.page_hits.values().sum::<u64>(), report.total_requests());

        let files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(files.iter().filter(|f| f.starts_with("session_")).count(), 3);
        assert!(files.iter().any(|f| f.starts_with("run_") && f.ends_with(".json")));
        assert!(files.iter().any(|f| f.ends_with("_snapshots.csv")));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_capped() {
        let run = run_with(4, 2, None);
        run.run(ProfileSelector::Random).await.unwrap();

        let snapshots = run.generator().metrics().get_snapshots();
        assert!(!snapshots.is_empty());
        assert!(snapshots.iter().all(|s| s.active_sessions <= 2));
        assert!(snapshots.iter().any(|s| s.active_sessions == 2));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_run_aborts_queued_sessions() {
        let run = run_with(3, 1, None);
        let cancel = run.cancel_token();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(2_500)).await;
            cancel.cancel();
        };
        let (report, _) = tokio::join!(run.run(ProfileSelector::Random), stop);
        let report = report.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.sessions.len(), 3);
        assert!(report.sessions.iter().all(|s| s.status == SessionState::Aborted));
        assert_eq!(report.total_requests(), 2);
    }

    #[tokio::test]
    async fn bad_profile_fails_before_any_traffic() {
        let run = run_with(2, 2, None);
        let err = run
            .run(ProfileSelector::Pinned("nobody".into()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown profile"));
        assert_eq!(run.generator().metrics().snapshot().requests_sent, 0);
    }
}
