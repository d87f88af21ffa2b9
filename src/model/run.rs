//! Run outcome records and the coordinator's observable status

use crate::ingest::IngestStats;
use crate::model::SourceTag;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Immutable summary of one source's run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub source: SourceTag,
    pub success: bool,
    /// Items observed on the stream, including ones the sink later rejected
    pub found: u64,
    pub inserted: u64,
    pub errored: u64,
    pub duration: Duration,
    pub error_message: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Result of a run whose item stream completed
    pub fn completed(source: SourceTag, stats: IngestStats, duration: Duration) -> Self {
        Self::build(source, stats, duration, None)
    }

    /// Result of a run that failed at setup or mid-stream
    ///
    /// Counts gathered before the failure are kept.
    pub fn failed(
        source: SourceTag,
        stats: IngestStats,
        duration: Duration,
        error: impl ToString,
    ) -> Self {
        Self::build(source, stats, duration, Some(error.to_string()))
    }

    fn build(
        source: SourceTag,
        stats: IngestStats,
        duration: Duration,
        error_message: Option<String>,
    ) -> Self {
        Self {
            source,
            success: error_message.is_none(),
            found: stats.found,
            inserted: stats.inserted,
            errored: stats.errored,
            duration,
            error_message,
            finished_at: Utc::now(),
        }
    }

    /// One-line human-readable summary
    pub fn summary(&self) -> String {
        if self.success {
            format!(
                "[{}] OK: {} found, {} inserted, {} errored in {:.1}s",
                self.source,
                self.found,
                self.inserted,
                self.errored,
                self.duration.as_secs_f64()
            )
        } else {
            format!(
                "[{}] ERROR: {} ({} found, {} inserted before failure)",
                self.source,
                self.error_message.as_deref().unwrap_or("unknown error"),
                self.found,
                self.inserted
            )
        }
    }
}

/// Process-wide run state, mutated only by the coordinator
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub current_source: Option<SourceTag>,
    /// When the most recent run returned to idle
    pub last_run: Option<DateTime<Utc>>,
    /// Results of the most recent `run_one` / `run_all`, in execution order
    pub last_results: Vec<RunResult>,
}
