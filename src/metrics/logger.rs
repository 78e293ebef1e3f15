use super::MetricsSnapshot;
use crate::network::RequestOutcome;
use anyhow::Result;
use chrono::Utc;
use csv::Writer;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub struct MetricsLogger {
    writer: Writer<File>,
}

impl MetricsLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let writer = Writer::from_path(path)?;
        Ok(Self { writer })
    }

    pub fn log_batch(&mut self, snapshots: &[MetricsSnapshot]) -> Result<()> {
        for snapshot in snapshots {
            self.writer.serialize(snapshot)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct RequestEvent<'a> {
    timestamp: String,
    session_id: &'a str,
    request_id: u64,
    page: &'a str,
    url: &'a str,
    status: String,
    success: bool,
    elapsed_ms: f64,
    bytes: u64,
    attempts: u8,
    rate_per_minute: f64,
    flavor: &'a str,
}

/// One CSV line per request, shared by every session of a run.
#[derive(Clone)]
pub struct RequestLogger {
    writer: Arc<Mutex<Writer<File>>>,
}

impl RequestLogger {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let writer = Writer::from_path(path)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(writer)),
        })
    }

    pub fn log(&self, session_id: &str, outcome: &RequestOutcome, rate_per_minute: f64, flavor: &str) -> Result<()> {
        let event = RequestEvent {
            timestamp: Utc::now().to_rfc3339(),
            session_id,
            request_id: outcome.id.get(),
            page: &outcome.page,
            url: &outcome.url,
            status: outcome.status_label(),
            success: outcome.is_success(),
            elapsed_ms: outcome.elapsed_ms(),
            bytes: outcome.bytes,
            attempts: outcome.attempts,
            rate_per_minute,
            flavor,
        };

        let mut writer = self.writer.lock();
        writer.serialize(&event)?;
        writer.flush()?;
        Ok(())
    }
}
