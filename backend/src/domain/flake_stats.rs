//! Per-test flake statistics.
//!
//! Statistics are always recomputed from authoritative counts held by the
//! store; nothing here is incremented.

use super::truncation::{FAILURE_MESSAGE_BUDGET, truncate_optional};

/// Recomputed counters and score for one test case.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlakeStatistics {
    /// Distinct CI runs with any result for the test case.
    pub total_runs_seen: i64,
    /// Distinct CI runs with a flake event for the test case.
    pub mixed_outcome_runs: i64,
    /// `mixed_outcome_runs / total_runs_seen`, 0 when no runs were seen.
    pub flake_score: f64,
}

impl FlakeStatistics {
    /// Compute the score from counts.
    ///
    /// # Examples
    /// ```
    /// use flaketrack::domain::flake_stats::FlakeStatistics;
    ///
    /// assert_eq!(FlakeStatistics::from_counts(4, 1).flake_score, 0.25);
    /// assert_eq!(FlakeStatistics::from_counts(0, 0).flake_score, 0.0);
    /// ```
    #[expect(
        clippy::cast_precision_loss,
        reason = "run counts stay far below 2^52"
    )]
    pub fn from_counts(total_runs_seen: i64, mixed_outcome_runs: i64) -> Self {
        let flake_score = if total_runs_seen <= 0 {
            0.0
        } else {
            mixed_outcome_runs as f64 / total_runs_seen as f64
        };
        Self {
            total_runs_seen,
            mixed_outcome_runs,
            flake_score,
        }
    }

    /// Truncate a failure message to the stored budget.
    pub fn truncate_failure_message(message: Option<&str>) -> Option<String> {
        truncate_optional(message, FAILURE_MESSAGE_BUDGET)
    }
}

#[cfg(test)]
mod tests {
    //! Regression coverage for this module.
    use super::*;
    use crate::domain::truncation::TRUNCATION_MARKER;
    use rstest::rstest;

    #[rstest]
    #[case(1, 1, 1.0)]
    #[case(2, 1, 0.5)]
    #[case(3, 0, 0.0)]
    #[case(0, 0, 0.0)]
    #[case(0, 2, 0.0)]
    fn score_is_ratio_or_zero(#[case] total: i64, #[case] mixed: i64, #[case] expected: f64) {
        let stats = FlakeStatistics::from_counts(total, mixed);
        assert!((stats.flake_score - expected).abs() < f64::EPSILON);
        assert_eq!(stats.total_runs_seen, total);
        assert_eq!(stats.mixed_outcome_runs, mixed);
    }

    #[rstest]
    fn long_message_is_stored_at_exact_budget() {
        let message = "z".repeat(4096);
        let stored = FlakeStatistics::truncate_failure_message(Some(&message)).expect("message");
        assert_eq!(stored.len(), 1024);
        assert!(stored.ends_with(TRUNCATION_MARKER));
    }
}
