//! PostgreSQL-backed flake detection.
//!
//! Reads every recorded attempt of a run in one query, applies the detection
//! rule per test case, inserts flake events with `ON CONFLICT DO NOTHING` and
//! recomputes statistics from counts, all inside one transaction.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::OptionalExtension;
use diesel::dsl::count_distinct;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use uuid::Uuid;

use crate::domain::flake_detection::{AttemptOutcome, FlakeDetection, detect_flake, group_attempts};
use crate::domain::flake_stats::FlakeStatistics;
use crate::domain::ports::{
    DetectedFlake, FlakeDetectionReport, FlakeDetectionRepository, FlakeDetectionRepositoryError,
};
use crate::domain::report_parser::TestStatus;

use super::diesel_helpers::{is_connection_loss, map_diesel_error_message, map_pool_error_message};
use super::models::{NewFlakeEventRow, NewFlakeStatsRow, RunAttemptRow};
use super::pool::{DbPool, PoolError};
use super::schema::{
    ci_jobs, ci_run_attempts, ci_runs, flake_events, flake_stats, test_cases, test_results,
};

/// Diesel-backed implementation of [`FlakeDetectionRepository`].
#[derive(Clone)]
pub struct DieselFlakeDetectionRepository {
    pool: DbPool,
}

impl DieselFlakeDetectionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> FlakeDetectionRepositoryError {
    FlakeDetectionRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> FlakeDetectionRepositoryError {
    let message = map_diesel_error_message(&error, "record flakes");
    if is_connection_loss(&error) {
        FlakeDetectionRepositoryError::connection(message)
    } else {
        FlakeDetectionRepositoryError::query(message)
    }
}

/// Identity of a test case as needed for reporting.
struct TestCaseLabel {
    test_identifier: String,
    job_name: String,
    job_variant: String,
}

async fn load_run_attempts(
    conn: &mut AsyncPgConnection,
    ci_run_id: Uuid,
) -> QueryResult<Vec<RunAttemptRow>> {
    test_results::table
        .inner_join(ci_jobs::table.inner_join(ci_run_attempts::table))
        .inner_join(test_cases::table)
        .filter(ci_run_attempts::ci_run_id.eq(ci_run_id))
        .select((
            test_results::test_case_id,
            test_cases::test_identifier,
            test_cases::job_name,
            test_cases::job_variant,
            ci_run_attempts::attempt_number,
            test_results::status,
            test_results::failure_message,
        ))
        .load::<RunAttemptRow>(conn)
        .await
}

fn parse_status(raw: &str) -> QueryResult<TestStatus> {
    raw.parse::<TestStatus>()
        .map_err(|error| diesel::result::Error::DeserializationError(Box::new(error)))
}

/// Insert the event unless the run already has one; `true` when inserted.
async fn insert_event(
    conn: &mut AsyncPgConnection,
    test_case_id: Uuid,
    ci_run_id: Uuid,
    detection: &FlakeDetection,
    detected_at: DateTime<Utc>,
) -> QueryResult<bool> {
    let inserted = diesel::insert_into(flake_events::table)
        .values(&NewFlakeEventRow {
            test_case_id,
            ci_run_id,
            failed_attempt: detection.failed_attempt,
            passed_attempt: detection.passed_attempt,
            failure_message: detection.failure_message.as_deref(),
            detected_at,
        })
        .on_conflict((flake_events::test_case_id, flake_events::ci_run_id))
        .do_nothing()
        .execute(conn)
        .await?;
    Ok(inserted == 1)
}

/// Recompute and upsert statistics for one test case.
async fn refresh_statistics(
    conn: &mut AsyncPgConnection,
    test_case_id: Uuid,
    failure_message: Option<&str>,
    seen_at: DateTime<Utc>,
) -> QueryResult<FlakeStatistics> {
    let total_runs_seen = test_results::table
        .inner_join(ci_jobs::table.inner_join(ci_run_attempts::table))
        .filter(test_results::test_case_id.eq(test_case_id))
        .select(count_distinct(ci_run_attempts::ci_run_id))
        .get_result::<i64>(conn)
        .await?;
    let mixed_outcome_runs = flake_events::table
        .filter(flake_events::test_case_id.eq(test_case_id))
        .select(count_distinct(flake_events::ci_run_id))
        .get_result::<i64>(conn)
        .await?;
    let statistics = FlakeStatistics::from_counts(total_runs_seen, mixed_outcome_runs);

    diesel::insert_into(flake_stats::table)
        .values(&NewFlakeStatsRow {
            test_case_id,
            total_runs_seen: statistics.total_runs_seen,
            mixed_outcome_runs: statistics.mixed_outcome_runs,
            flake_score: statistics.flake_score,
            last_failure_message: FlakeStatistics::truncate_failure_message(failure_message),
            first_seen_at: seen_at,
            last_seen_at: seen_at,
        })
        .on_conflict(flake_stats::test_case_id)
        .do_update()
        .set((
            flake_stats::total_runs_seen.eq(excluded(flake_stats::total_runs_seen)),
            flake_stats::mixed_outcome_runs.eq(excluded(flake_stats::mixed_outcome_runs)),
            flake_stats::flake_score.eq(excluded(flake_stats::flake_score)),
            flake_stats::last_failure_message.eq(excluded(flake_stats::last_failure_message)),
            flake_stats::last_seen_at.eq(excluded(flake_stats::last_seen_at)),
        ))
        .execute(conn)
        .await?;

    Ok(statistics)
}

async fn record_run(
    conn: &mut AsyncPgConnection,
    project_id: Uuid,
    ci_run_id: Uuid,
    detected_at: DateTime<Utc>,
) -> QueryResult<Option<FlakeDetectionReport>> {
    let Some((repository, workflow_name)) = ci_runs::table
        .find(ci_run_id)
        .filter(ci_runs::project_id.eq(project_id))
        .select((ci_runs::repository, ci_runs::workflow_name))
        .first::<(String, String)>(conn)
        .await
        .optional()?
    else {
        return Ok(None);
    };

    let rows = load_run_attempts(conn, ci_run_id).await?;
    let mut labels = HashMap::new();
    let mut outcomes = Vec::with_capacity(rows.len());
    for row in rows {
        let status = parse_status(&row.status)?;
        outcomes.push((
            row.test_case_id,
            AttemptOutcome::new(row.attempt_number, status, row.failure_message),
        ));
        labels.entry(row.test_case_id).or_insert(TestCaseLabel {
            test_identifier: row.test_identifier,
            job_name: row.job_name,
            job_variant: row.job_variant,
        });
    }

    let mut flakes = Vec::new();
    for (test_case_id, attempts) in group_attempts(outcomes) {
        let Some(detection) = detect_flake(&attempts) else {
            continue;
        };
        let Some(label) = labels.remove(&test_case_id) else {
            continue;
        };
        let newly_recorded =
            insert_event(conn, test_case_id, ci_run_id, &detection, detected_at).await?;
        let statistics = refresh_statistics(
            conn,
            test_case_id,
            detection.failure_message.as_deref(),
            detected_at,
        )
        .await?;
        flakes.push(DetectedFlake {
            test_case_id,
            test_identifier: label.test_identifier,
            job_name: label.job_name,
            job_variant: label.job_variant,
            failed_attempt: detection.failed_attempt,
            passed_attempt: detection.passed_attempt,
            failure_message: detection.failure_message,
            newly_recorded,
            statistics,
        });
    }

    Ok(Some(FlakeDetectionReport {
        ci_run_id,
        repository,
        workflow_name,
        flakes,
    }))
}

#[async_trait::async_trait]
impl FlakeDetectionRepository for DieselFlakeDetectionRepository {
    async fn record_flakes(
        &self,
        project_id: Uuid,
        ci_run_id: Uuid,
        detected_at: DateTime<Utc>,
    ) -> Result<FlakeDetectionReport, FlakeDetectionRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let report = conn
            .transaction(|conn| {
                async move { record_run(conn, project_id, ci_run_id, detected_at).await }.scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        report.ok_or_else(|| FlakeDetectionRepositoryError::run_not_found(ci_run_id))
    }
}
