//! Sweep statistics
//!
//! Tracks what a single garbage-collection sweep observed and did.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Statistics from a single policy sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepStats {
    /// Policies returned by the listing
    pub scanned: usize,

    /// Personal policies still attached to at least one endpoint
    pub retained: usize,

    /// Personal policies deleted for having zero attachments
    pub deleted: usize,

    /// Predefined policies, never touched
    pub predefined: usize,

    /// Per-policy lookups or deletions that failed
    pub errors: usize,

    /// Time taken to complete the sweep
    pub duration: Option<Duration>,
}

impl SweepStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Personal policies examined
    pub fn personal(&self) -> usize {
        self.retained + self.deleted + self.errors
    }

    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }

    /// Format a human-readable summary
    pub fn summary(&self) -> String {
        format!(
            "Sweep: {} policies | {} personal | {} retained | {} deleted | {} predefined | {} errors",
            self.scanned,
            self.personal(),
            self.retained,
            self.deleted,
            self.predefined,
            self.errors
        )
    }
}

/// Accumulates stats while a sweep runs
#[derive(Debug, Clone)]
pub struct SweepStatsBuilder {
    stats: SweepStats,
    start_time: Instant,
}

impl SweepStatsBuilder {
    pub fn new() -> Self {
        Self {
            stats: SweepStats::new(),
            start_time: Instant::now(),
        }
    }

    pub fn record_scanned(&mut self, count: usize) {
        self.stats.scanned += count;
    }

    pub fn record_retained(&mut self) {
        self.stats.retained += 1;
    }

    pub fn record_deleted(&mut self) {
        self.stats.deleted += 1;
    }

    pub fn record_predefined(&mut self) {
        self.stats.predefined += 1;
    }

    pub fn record_error(&mut self) {
        self.stats.errors += 1;
    }

    /// Finalize and return the stats
    pub fn finish(mut self) -> SweepStats {
        self.stats.duration = Some(self.start_time.elapsed());
        self.stats
    }
}

impl Default for SweepStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
