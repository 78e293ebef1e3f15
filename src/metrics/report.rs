use super::MetricsSnapshot;
use crate::error::SessionError;
use crate::session::{AbortReason, SessionState};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub session_id: String,
    pub target: String,
    pub profile: String,
    pub status: SessionState,
    pub abort_reason: Option<AbortReason>,
    pub total_requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_received: u64,
    pub initial_rate_per_minute: f64,
    pub final_rate_per_minute: f64,
    pub rate_strategy: String,
    pub rate_adjustments: u32,
    pub page_hits: BTreeMap<String, u64>,
    pub flavor_fallbacks: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_secs: f64,
}

impl SessionReport {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_requests as f64
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.status == SessionState::Aborted
    }

    pub fn into_result(self) -> Result<SessionReport, SessionError> {
        if self.is_aborted() {
            Err(SessionError::Aborted(Box::new(self)))
        } else {
            Ok(self)
        }
    }

    pub fn write_json(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir.as_ref())?;
        let timestamp = self.finished_at.format("%Y%m%d_%H%M%S");
        let path = dir
            .as_ref()
            .join(format!("session_{}_{}.json", self.session_id, timestamp));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub sessions: Vec<SessionReport>,
    pub aggregate: MetricsSnapshot,
    pub page_hits: BTreeMap<String, u64>,
}

impl RunReport {
    pub fn total_requests(&self) -> u64 {
        self.sessions.iter().map(|s| s.total_requests).sum()
    }

    pub fn successes(&self) -> u64 {
        self.sessions.iter().map(|s| s.successes).sum()
    }

    pub fn failures(&self) -> u64 {
        self.sessions.iter().map(|s| s.failures).sum()
    }

    pub fn write_json(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        std::fs::create_dir_all(dir.as_ref())?;
        let timestamp = self.finished_at.format("%Y%m%d_%H%M%S");
        let path = dir.as_ref().join(format!("run_{}.json", timestamp));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

pub fn summary_table(run: &RunReport) {
    println!("\n╔══════════════════════════════════════════════════════════════════════════════════╗");
    println!("║                                TRAFFIC SUMMARY                                   ║");
    println!("╠════════════╦══════════════════╦═══════════╦══════════╦══════════╦═══════════════╣");
    println!("║ Session    ║ Profile          ║ Status    ║ Requests ║ Success  ║ Final rate    ║");
    println!("║            ║                  ║           ║          ║ (%)      ║ (req/min)     ║");
    println!("╠════════════╬══════════════════╬═══════════╬══════════╬══════════╬═══════════════╣");

    for report in &run.sessions {
        let short_id: String = report.session_id.chars().take(8).collect();
        let profile: String = report.profile.chars().take(16).collect();
        println!(
            "║ {:<10} ║ {:<16} ║ {:<9} ║ {:>8} ║ {:>7.2}% ║ {:>13.2} ║",
            short_id,
            profile,
            report.status.to_string(),
            report.total_requests,
            report.success_rate() * 100.0,
            report.final_rate_per_minute,
        );
    }

    println!("╚════════════╩══════════════════╩═══════════╩══════════╩══════════╩═══════════════╝\n");

    let total = run.total_requests();
    let success_rate = if total > 0 { run.successes() as f64 / total as f64 * 100.0 } else { 0.0 };
    println!("Requests: {} ({} ok, {} failed)", total, run.successes(), run.failures());
    println!("Success rate: {:.2}%", success_rate);

    if run.cancelled {
        println!("Run was interrupted, counters are partial.");
    }

    if !run.page_hits.is_empty() {
        println!("\nPage hit distribution:");
        let hits: u64 = run.page_hits.values().sum();
        for (page, count) in &run.page_hits {
            println!("  - {}: {} ({:.1}%)", page, count, *count as f64 / hits as f64 * 100.0);
        }
    }

    println!();
}
