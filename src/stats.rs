//! Query counters for the lifetime of the process.

use serde::{Deserialize, Serialize};

/// Accumulates one record per answered-or-abstained query.
#[derive(Debug, Clone, Default)]
pub struct StatsTracker {
    total: u64,
    answered: u64,
    mean_score: f64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub answered: u64,
    pub abstained: u64,
    /// Mean best-match score over all recorded queries; 0 when none.
    pub mean_score: f64,
}

impl StatsSnapshot {
    /// Fraction of queries that were answered, 0 when there were none.
    pub fn answer_rate(&self) -> f64 {
        if self.total_queries == 0 {
            0.0
        } else {
            self.answered as f64 / self.total_queries as f64
        }
    }
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, answered: bool, score: f32) {
        self.total += 1;
        if answered {
            self.answered += 1;
        }
        // incremental mean
        self.mean_score += (f64::from(score) - self.mean_score) / self.total as f64;
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total,
            answered: self.answered,
            abstained: self.total - self.answered,
            mean_score: self.mean_score,
        }
    }
}
