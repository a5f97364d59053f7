//! Fail-then-pass detection over the attempts of one CI run.
//!
//! For one test case the attempts are scanned in attempt order. The first
//! failing attempt becomes the candidate; the first passing attempt after it
//! confirms a flake. The reported failure is always the earliest one, so for
//! `fail, fail, pass` the first failure's attempt number and message are
//! carried, not the second's. A pass followed by a failure is a regression,
//! never a flake.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::report_parser::TestStatus;

/// One recorded outcome of a test case within a CI run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// Attempt number within the run.
    pub attempt_number: i32,
    /// Recorded status.
    pub status: TestStatus,
    /// Failure message stored with the result.
    pub failure_message: Option<String>,
}

impl AttemptOutcome {
    /// Create an outcome.
    pub fn new(attempt_number: i32, status: TestStatus, failure_message: Option<String>) -> Self {
        Self {
            attempt_number,
            status,
            failure_message,
        }
    }
}

/// A confirmed fail-then-pass pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlakeDetection {
    /// Attempt of the earliest failure.
    pub failed_attempt: i32,
    /// First passing attempt after that failure.
    pub passed_attempt: i32,
    /// Message of the earliest failure.
    pub failure_message: Option<String>,
}

/// Apply the detection rule to attempts sorted by attempt number.
///
/// Returns `None` for fewer than two attempts, all-pass and all-fail
/// sequences, and sequences where no pass follows the first failure.
///
/// # Examples
/// ```
/// use flaketrack::domain::flake_detection::{detect_flake, AttemptOutcome};
/// use flaketrack::domain::report_parser::TestStatus;
///
/// let attempts = [
///     AttemptOutcome::new(1, TestStatus::Failed, Some("first".into())),
///     AttemptOutcome::new(2, TestStatus::Failed, Some("second".into())),
///     AttemptOutcome::new(3, TestStatus::Passed, None),
/// ];
/// let flake = detect_flake(&attempts).expect("flake");
/// assert_eq!((flake.failed_attempt, flake.passed_attempt), (1, 3));
/// assert_eq!(flake.failure_message.as_deref(), Some("first"));
/// ```
pub fn detect_flake(attempts: &[AttemptOutcome]) -> Option<FlakeDetection> {
    if attempts.len() < 2 {
        return None;
    }

    let candidate_index = attempts.iter().position(|a| a.status.is_failing())?;
    let candidate = attempts.get(candidate_index)?;
    let passed = attempts
        .iter()
        .skip(candidate_index + 1)
        .find(|a| a.status == TestStatus::Passed)?;

    Some(FlakeDetection {
        failed_attempt: candidate.attempt_number,
        passed_attempt: passed.attempt_number,
        failure_message: candidate.failure_message.clone(),
    })
}

/// Group `(test_case_id, outcome)` rows per test case, each group sorted by
/// attempt number. Groups come back ordered by test case id.
pub fn group_attempts<I>(rows: I) -> BTreeMap<Uuid, Vec<AttemptOutcome>>
where
    I: IntoIterator<Item = (Uuid, AttemptOutcome)>,
{
    let mut groups: BTreeMap<Uuid, Vec<AttemptOutcome>> = BTreeMap::new();
    for (test_case_id, outcome) in rows {
        groups.entry(test_case_id).or_default().push(outcome);
    }
    for attempts in groups.values_mut() {
        attempts.sort_by_key(|a| a.attempt_number);
    }
    groups
}
