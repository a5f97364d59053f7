//! PostgreSQL-backed ingestion write path.
//!
//! One transaction covers the receipt, the run/attempt/job upserts, the
//! stored files, the test case upserts and the result inserts. Results use
//! `ON CONFLICT DO NOTHING` on `(test_case_id, ci_job_id)`, which makes a
//! re-delivered upload insert nothing.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::debug;
use uuid::Uuid;

use crate::domain::ports::{
    IngestionBatch, IngestionRepository, IngestionRepositoryError, PersistedIngestion,
};
use crate::domain::report_parser::ParsedTestResult;

use super::diesel_helpers::{
    INSERT_CHUNK_ROWS, is_connection_loss, map_diesel_error_message, map_pool_error_message,
    row_count,
};
use super::models::{
    NewCiJobRow, NewCiRunAttemptRow, NewCiRunRow, NewIngestionRow, NewReportFileRow,
    NewTestCaseRow, NewTestResultRow,
};
use super::pool::{DbPool, PoolError};
use super::schema::{
    ci_jobs, ci_run_attempts, ci_runs, ingestions, report_files, test_cases, test_results,
};

/// Diesel-backed implementation of [`IngestionRepository`].
#[derive(Clone)]
pub struct DieselIngestionRepository {
    pool: DbPool,
}

impl DieselIngestionRepository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> IngestionRepositoryError {
    IngestionRepositoryError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: diesel::result::Error) -> IngestionRepositoryError {
    let message = map_diesel_error_message(&error, "persist ingestion");
    if is_connection_loss(&error) {
        IngestionRepositoryError::connection(message)
    } else {
        IngestionRepositoryError::query(message)
    }
}

/// Identifiers produced by the run hierarchy upserts.
struct RunKeys {
    ingestion_id: Uuid,
    ci_run_id: Uuid,
    ci_job_id: Uuid,
}

async fn upsert_run_hierarchy(
    conn: &mut AsyncPgConnection,
    batch: &IngestionBatch,
    metadata_snapshot: &serde_json::Value,
    file_count: i32,
) -> QueryResult<RunKeys> {
    let metadata = &batch.metadata;

    let ingestion_id = diesel::insert_into(ingestions::table)
        .values(&NewIngestionRow {
            project_id: batch.project_id,
            api_key_id: batch.api_key_id,
            metadata: metadata_snapshot,
            file_count,
            received_at: batch.received_at,
        })
        .returning(ingestions::id)
        .get_result::<Uuid>(conn)
        .await?;

    let ci_run_id = diesel::insert_into(ci_runs::table)
        .values(&NewCiRunRow {
            project_id: batch.project_id,
            repository: metadata.repository(),
            external_run_id: metadata.run_id(),
            run_number: metadata.run_number(),
            workflow_name: metadata.workflow_name(),
            workflow_ref: metadata.workflow_ref(),
            run_url: metadata.run_url().as_str(),
            commit_sha: metadata.commit_sha(),
            branch: metadata.branch(),
            event: metadata.event(),
            pr_number: metadata.pr_number(),
            first_seen_at: batch.received_at,
            last_seen_at: batch.received_at,
        })
        .on_conflict((
            ci_runs::project_id,
            ci_runs::repository,
            ci_runs::external_run_id,
        ))
        .do_update()
        .set((
            ci_runs::run_number.eq(excluded(ci_runs::run_number)),
            ci_runs::workflow_name.eq(excluded(ci_runs::workflow_name)),
            ci_runs::workflow_ref.eq(excluded(ci_runs::workflow_ref)),
            ci_runs::run_url.eq(excluded(ci_runs::run_url)),
            ci_runs::commit_sha.eq(excluded(ci_runs::commit_sha)),
            ci_runs::branch.eq(excluded(ci_runs::branch)),
            ci_runs::event.eq(excluded(ci_runs::event)),
            ci_runs::pr_number.eq(excluded(ci_runs::pr_number)),
            ci_runs::last_seen_at.eq(excluded(ci_runs::last_seen_at)),
        ))
        .returning(ci_runs::id)
        .get_result::<Uuid>(conn)
        .await?;

    let ci_run_attempt_id = diesel::insert_into(ci_run_attempts::table)
        .values(&NewCiRunAttemptRow {
            ci_run_id,
            attempt_number: metadata.run_attempt(),
            started_at: metadata.started_at(),
            completed_at: metadata.completed_at(),
        })
        .on_conflict((ci_run_attempts::ci_run_id, ci_run_attempts::attempt_number))
        .do_update()
        .set((
            ci_run_attempts::started_at.eq(excluded(ci_run_attempts::started_at)),
            ci_run_attempts::completed_at.eq(excluded(ci_run_attempts::completed_at)),
        ))
        .returning(ci_run_attempts::id)
        .get_result::<Uuid>(conn)
        .await?;

    // DO NOTHING would return no row for an existing job, so the conflict
    // branch rewrites the key column to itself.
    let ci_job_id = diesel::insert_into(ci_jobs::table)
        .values(&NewCiJobRow {
            ci_run_attempt_id,
            job_name: metadata.job_name(),
            job_variant: metadata.job_variant(),
        })
        .on_conflict((
            ci_jobs::ci_run_attempt_id,
            ci_jobs::job_name,
            ci_jobs::job_variant,
        ))
        .do_update()
        .set(ci_jobs::job_name.eq(excluded(ci_jobs::job_name)))
        .returning(ci_jobs::id)
        .get_result::<Uuid>(conn)
        .await?;

    Ok(RunKeys {
        ingestion_id,
        ci_run_id,
        ci_job_id,
    })
}

async fn store_files(
    conn: &mut AsyncPgConnection,
    batch: &IngestionBatch,
    keys: &RunKeys,
) -> QueryResult<usize> {
    let mut stored = 0;
    for file in &batch.files {
        stored += diesel::insert_into(report_files::table)
            .values(&NewReportFileRow {
                ingestion_id: keys.ingestion_id,
                ci_job_id: keys.ci_job_id,
                filename: &file.filename,
                content_sha256: &file.content_sha256,
                size_bytes: file.size_bytes,
                truncated: file.truncated,
                content: &file.content,
            })
            .execute(conn)
            .await?;
    }
    Ok(stored)
}

/// Results ordered by identifier, so concurrent uploads lock rows in the
/// same order. The sort is stable: the first of any duplicates stays first.
fn lock_order(results: &[ParsedTestResult]) -> Vec<&ParsedTestResult> {
    let mut ordered: Vec<_> = results.iter().collect();
    ordered.sort_by(|left, right| left.test_identifier.cmp(&right.test_identifier));
    ordered
}

/// Upsert the test cases for every result and return their ids by identifier.
async fn upsert_test_cases(
    conn: &mut AsyncPgConnection,
    batch: &IngestionBatch,
    ordered: &[&ParsedTestResult],
) -> QueryResult<HashMap<String, Uuid>> {
    let metadata = &batch.metadata;
    let mut ids = HashMap::with_capacity(ordered.len());
    for chunk in ordered.chunks(INSERT_CHUNK_ROWS) {
        let rows: Vec<_> = chunk
            .iter()
            .map(|result| NewTestCaseRow {
                project_id: batch.project_id,
                repository: metadata.repository(),
                job_name: metadata.job_name(),
                job_variant: metadata.job_variant(),
                test_identifier: &result.test_identifier,
                classname: &result.classname,
                name: &result.name,
                first_seen_at: batch.received_at,
                last_seen_at: batch.received_at,
            })
            .collect();
        let upserted = diesel::insert_into(test_cases::table)
            .values(&rows)
            .on_conflict((
                test_cases::project_id,
                test_cases::repository,
                test_cases::job_name,
                test_cases::job_variant,
                test_cases::test_identifier,
            ))
            .do_update()
            .set(test_cases::last_seen_at.eq(excluded(test_cases::last_seen_at)))
            .returning((test_cases::test_identifier, test_cases::id))
            .get_results::<(String, Uuid)>(conn)
            .await?;
        ids.extend(upserted);
    }
    Ok(ids)
}

async fn insert_results(
    conn: &mut AsyncPgConnection,
    ordered: &[&ParsedTestResult],
    keys: &RunKeys,
    test_case_ids: &HashMap<String, Uuid>,
) -> QueryResult<usize> {
    let mut inserted = 0;
    for chunk in ordered.chunks(INSERT_CHUNK_ROWS) {
        let rows = chunk
            .iter()
            .map(|result| -> QueryResult<NewTestResultRow<'_>> {
                let test_case_id = test_case_ids
                    .get(&result.test_identifier)
                    .copied()
                    .ok_or(diesel::result::Error::NotFound)?;
                Ok(NewTestResultRow {
                    test_case_id,
                    ci_job_id: keys.ci_job_id,
                    ingestion_id: keys.ingestion_id,
                    status: result.status.as_str(),
                    duration_ms: result.duration_ms,
                    failure_message: result.failure_message.as_deref(),
                    failure_output: result.failure_output.as_deref(),
                })
            })
            .collect::<QueryResult<Vec<_>>>()?;
        inserted += diesel::insert_into(test_results::table)
            .values(&rows)
            .on_conflict((test_results::test_case_id, test_results::ci_job_id))
            .do_nothing()
            .execute(conn)
            .await?;
    }
    Ok(inserted)
}

#[async_trait::async_trait]
impl IngestionRepository for DieselIngestionRepository {
    async fn persist_ingestion(
        &self,
        batch: &IngestionBatch,
    ) -> Result<PersistedIngestion, IngestionRepositoryError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let metadata_snapshot = serde_json::to_value(&batch.metadata).map_err(|error| {
            IngestionRepositoryError::query(format!("failed to serialise metadata: {error}"))
        })?;
        let file_count = i32::try_from(batch.files.len()).map_err(|_| {
            IngestionRepositoryError::query("file count exceeds supported range")
        })?;
        let max_results = i32::try_from(batch.results.len()).map_err(|_| {
            IngestionRepositoryError::query("result count exceeds supported range")
        })?;

        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let (keys, files_stored, inserted) = conn
            .transaction(|conn| {
                async move {
                    let keys =
                        upsert_run_hierarchy(conn, batch, &metadata_snapshot, file_count).await?;
                    let files_stored = store_files(conn, batch, &keys).await?;
                    let ordered = lock_order(&batch.results);
                    let test_case_ids = upsert_test_cases(conn, batch, &ordered).await?;
                    let inserted = insert_results(conn, &ordered, &keys, &test_case_ids).await?;

                    diesel::update(ingestions::table.find(keys.ingestion_id))
                        .set(
                            ingestions::test_result_count
                                .eq(i32::try_from(inserted).unwrap_or(max_results)),
                        )
                        .execute(conn)
                        .await?;

                    Ok((keys, files_stored, inserted))
                }
                .scope_boxed()
            })
            .await
            .map_err(map_diesel_error)?;

        debug!(
            ingestion_id = %keys.ingestion_id,
            ci_run_id = %keys.ci_run_id,
            ci_job_id = %keys.ci_job_id,
            files_stored,
            inserted,
            "ingestion transaction committed"
        );

        Ok(PersistedIngestion {
            ingestion_id: keys.ingestion_id,
            ci_run_id: keys.ci_run_id,
            files_stored: row_count(files_stored),
            test_results_inserted: row_count(inserted),
        })
    }
}
