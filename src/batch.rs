//! Parallel zone computation over many activities using rayon
//!
//! Each activity is fetched, classified, accumulated and written back on its
//! own. Failures are attributed to the activity and collected; they never stop
//! the rest of the batch.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

use crate::error::{ActivityError, StoreError};
use crate::models::{Activity, ActivityId, ZoneTotals};
use crate::series::SampleSeries;
use crate::store::{ActivityMetadataReader, RawDetailReader, TotalsWriter};
use crate::zones::{SportClassifier, UnclassifiedMode, ZoneAccumulator};

/// Retry policy for zone total writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled after each failure
    pub initial_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt number `attempt` (2-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(2).min(16);
        Duration::from_millis(self.initial_backoff_ms.saturating_mul(2_u64.pow(exponent)))
    }
}

/// Configuration for batch zone processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Worker threads, `None` for one per CPU
    pub num_threads: Option<usize>,
    /// Show progress bar while processing
    pub show_progress: bool,
    /// Unit of the unclassified bucket
    pub unclassified_mode: UnclassifiedMode,
    /// Write retry policy
    pub retry: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            show_progress: false,
            unclassified_mode: UnclassifiedMode::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// One unit of work: an activity id and its sport key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRef {
    pub activity_id: ActivityId,
    pub type_key: String,
}

impl From<&Activity> for ActivityRef {
    fn from(activity: &Activity) -> Self {
        Self {
            activity_id: activity.activity_id,
            type_key: activity.type_key().to_string(),
        }
    }
}

/// Result of processing one activity
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityOutcome {
    /// Totals computed and written
    Succeeded { activity_id: ActivityId, totals: ZoneTotals },
    /// No raw detail available
    Skipped { activity_id: ActivityId, reason: ActivityError },
    /// Computation or write failed
    Failed { activity_id: ActivityId, reason: ActivityError },
}

impl ActivityOutcome {
    fn from_result(activity_id: ActivityId, result: Result<ZoneTotals, ActivityError>) -> Self {
        match result {
            Ok(totals) => ActivityOutcome::Succeeded { activity_id, totals },
            Err(reason @ ActivityError::NotFound { .. }) => ActivityOutcome::Skipped { activity_id, reason },
            Err(reason) => ActivityOutcome::Failed { activity_id, reason },
        }
    }
}

/// A skipped or failed activity with its cause
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityFailure {
    pub activity_id: ActivityId,
    pub error: ActivityError,
}

/// Summary of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Skips and failures, in input order
    pub failures: Vec<ActivityFailure>,
    /// Totals of every successful activity, in input order
    pub computed: Vec<(ActivityId, ZoneTotals)>,
    pub duration_ms: u128,
}

impl BatchSummary {
    fn from_outcomes(outcomes: Vec<ActivityOutcome>, duration_ms: u128) -> Self {
        let mut summary = BatchSummary {
            total: outcomes.len(),
            duration_ms,
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome {
                ActivityOutcome::Succeeded { activity_id, totals } => {
                    summary.succeeded += 1;
                    summary.computed.push((activity_id, totals));
                }
                ActivityOutcome::Skipped { activity_id, reason } => {
                    summary.skipped += 1;
                    summary.failures.push(ActivityFailure { activity_id, error: reason });
                }
                ActivityOutcome::Failed { activity_id, reason } => {
                    summary.failed += 1;
                    summary.failures.push(ActivityFailure { activity_id, error: reason });
                }
            }
        }

        summary
    }

    /// Check if every activity succeeded
    pub fn is_fully_successful(&self) -> bool {
        self.skipped == 0 && self.failed == 0
    }

    /// Get human-readable summary
    pub fn to_string_pretty(&self) -> String {
        let mut out = format!(
            "Zone Computation Summary\n  \
             Total Activities: {}\n  \
             Succeeded: {}\n  \
             Skipped: {}\n  \
             Failed: {}\n  \
             Total Time: {:.2}s",
            self.total,
            self.succeeded,
            self.skipped,
            self.failed,
            self.duration_ms as f64 / 1000.0,
        );
        for failure in &self.failures {
            out.push_str(&format!("\n  - [{}] {}", failure.error.kind(), failure.error));
        }
        out
    }
}

/// Computes and persists zone totals for batches of activities
pub struct ZoneProcessor<D, W> {
    reader: D,
    writer: W,
    config: BatchConfig,
}

impl<D, W> ZoneProcessor<D, W>
where
    D: RawDetailReader,
    W: TotalsWriter,
{
    pub fn new(reader: D, writer: W) -> Self {
        Self::with_config(reader, writer, BatchConfig::default())
    }

    pub fn with_config(reader: D, writer: W, config: BatchConfig) -> Self {
        Self { reader, writer, config }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Compute and write zone totals for a single activity
    pub fn process_activity(&self, activity: &ActivityRef) -> Result<ZoneTotals, ActivityError> {
        let detail = self.reader.fetch(activity.activity_id)?;
        let series = SampleSeries::from_detail(activity.activity_id, &detail)?;
        let table = SportClassifier::classify(&activity.type_key);
        let totals = ZoneAccumulator::new(table, self.config.unclassified_mode).accumulate(&series)?;

        self.write_with_retry(activity.activity_id, &totals)?;
        Ok(totals)
    }

    fn write_with_retry(&self, activity_id: ActivityId, totals: &ZoneTotals) -> Result<(), ActivityError> {
        let policy = self.config.retry;
        let mut attempt = 1;

        loop {
            match self.writer.write_zone_totals(activity_id, totals) {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    attempt += 1;
                    let backoff = policy.backoff(attempt);
                    warn!(
                        activity_id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Zone totals write failed, retrying"
                    );
                    std::thread::sleep(backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Process many activities in parallel
    pub fn process(&self, activities: &[ActivityRef]) -> BatchSummary {
        let start_time = Instant::now();
        info!("Starting zone computation for {} activities", activities.len());

        let progress = self.progress_bar(activities.len());

        let run = || -> Vec<ActivityOutcome> {
            activities
                .par_iter()
                .map(|activity| {
                    let span = info_span!("activity", activity_id = activity.activity_id, sport = %activity.type_key);
                    let _guard = span.enter();

                    let outcome = ActivityOutcome::from_result(activity.activity_id, self.process_activity(activity));
                    match &outcome {
                        ActivityOutcome::Succeeded { totals, .. } => debug!(?totals, "Zone totals written"),
                        ActivityOutcome::Skipped { reason, .. } => warn!(error = %reason, "Skipping activity"),
                        ActivityOutcome::Failed { reason, .. } => {
                            error!(kind = reason.kind(), error = %reason, "Activity failed")
                        }
                    }

                    if let Some(pb) = &progress {
                        pb.inc(1);
                    }
                    outcome
                })
                .collect()
        };

        let outcomes = match self.config.num_threads {
            Some(num_threads) => match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
                Ok(pool) => pool.install(run),
                Err(e) => {
                    warn!("Failed to build thread pool ({}), using the global pool", e);
                    run()
                }
            },
            None => run(),
        };

        if let Some(pb) = progress {
            pb.finish_with_message("Complete");
        }

        let summary = BatchSummary::from_outcomes(outcomes, start_time.elapsed().as_millis());
        info!("{}", summary.to_string_pretty());
        summary
    }

    /// Compute zones for every stored activity that has heart rate data
    pub fn process_store<M: ActivityMetadataReader + ?Sized>(&self, metadata: &M) -> Result<BatchSummary, StoreError> {
        let activities: Vec<ActivityRef> = metadata
            .all_activities()?
            .iter()
            .filter(|a| a.has_heart_rate())
            .map(ActivityRef::from)
            .collect();

        Ok(self.process(&activities))
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.config.show_progress {
            return None;
        }

        let pb = ProgressBar::new(len as u64);
        match ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({msg})") {
            Ok(style) => pb.set_style(style.progress_chars("#>-")),
            Err(e) => debug!("Progress template rejected: {}", e),
        }
        Some(pb)
    }
}
