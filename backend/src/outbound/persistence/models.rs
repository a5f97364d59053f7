//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain. Insert rows borrow from the domain batch so
//! a transaction does not copy report contents twice.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::{
    ci_jobs, ci_run_attempts, ci_runs, flake_events, flake_stats, ingestions, projects,
    report_files, test_cases, test_results,
};

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Row struct for reading from the projects table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = projects)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct ProjectRow {
    pub id: Uuid,
    pub slug: String,
    pub notifications_enabled: bool,
    pub notification_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Ingestion write path
// ---------------------------------------------------------------------------

#[derive(Debug, Insertable)]
#[diesel(table_name = ingestions)]
pub(crate) struct NewIngestionRow<'a> {
    pub project_id: Uuid,
    pub api_key_id: Option<Uuid>,
    pub metadata: &'a serde_json::Value,
    pub file_count: i32,
    pub received_at: DateTime<Utc>,
}

/// Insertable run; the same values refresh an existing row on conflict.
#[derive(Debug, Insertable)]
#[diesel(table_name = ci_runs)]
pub(crate) struct NewCiRunRow<'a> {
    pub project_id: Uuid,
    pub repository: &'a str,
    pub external_run_id: i64,
    pub run_number: i64,
    pub workflow_name: &'a str,
    pub workflow_ref: &'a str,
    pub run_url: &'a str,
    pub commit_sha: &'a str,
    pub branch: &'a str,
    pub event: &'a str,
    pub pr_number: Option<i64>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ci_run_attempts)]
pub(crate) struct NewCiRunAttemptRow {
    pub ci_run_id: Uuid,
    pub attempt_number: i32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = ci_jobs)]
pub(crate) struct NewCiJobRow<'a> {
    pub ci_run_attempt_id: Uuid,
    pub job_name: &'a str,
    pub job_variant: &'a str,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = report_files)]
pub(crate) struct NewReportFileRow<'a> {
    pub ingestion_id: Uuid,
    pub ci_job_id: Uuid,
    pub filename: &'a str,
    pub content_sha256: &'a str,
    pub size_bytes: i64,
    pub truncated: bool,
    pub content: &'a [u8],
}

#[derive(Debug, Insertable)]
#[diesel(table_name = test_cases)]
pub(crate) struct NewTestCaseRow<'a> {
    pub project_id: Uuid,
    pub repository: &'a str,
    pub job_name: &'a str,
    pub job_variant: &'a str,
    pub test_identifier: &'a str,
    pub classname: &'a str,
    pub name: &'a str,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = test_results)]
pub(crate) struct NewTestResultRow<'a> {
    pub test_case_id: Uuid,
    pub ci_job_id: Uuid,
    pub ingestion_id: Uuid,
    pub status: &'a str,
    pub duration_ms: i64,
    pub failure_message: Option<&'a str>,
    pub failure_output: Option<&'a str>,
}

// ---------------------------------------------------------------------------
// Detection path
// ---------------------------------------------------------------------------

/// One recorded attempt of a test case within a run.
#[derive(Debug, Clone, Queryable)]
pub(crate) struct RunAttemptRow {
    pub test_case_id: Uuid,
    pub test_identifier: String,
    pub job_name: String,
    pub job_variant: String,
    pub attempt_number: i32,
    pub status: String,
    pub failure_message: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = flake_events)]
pub(crate) struct NewFlakeEventRow<'a> {
    pub test_case_id: Uuid,
    pub ci_run_id: Uuid,
    pub failed_attempt: i32,
    pub passed_attempt: i32,
    pub failure_message: Option<&'a str>,
    pub detected_at: DateTime<Utc>,
}

/// Insertable statistics; `first_seen_at` is only written on insert.
#[derive(Debug, Insertable)]
#[diesel(table_name = flake_stats)]
pub(crate) struct NewFlakeStatsRow {
    pub test_case_id: Uuid,
    pub total_runs_seen: i64,
    pub mixed_outcome_runs: i64,
    pub flake_score: f64,
    pub last_failure_message: Option<String>,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
