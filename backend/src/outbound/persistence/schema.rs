//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Natural keys are
//! unique constraints in the database; the adapters rely on them for
//! `ON CONFLICT` upserts rather than on existence checks.

diesel::table! {
    /// Projects that own uploads, with their notification settings.
    projects (id) {
        id -> Uuid,
        slug -> Text,
        notifications_enabled -> Bool,
        notification_webhook_url -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// API keys, stored as SHA-256 fingerprints of the presented secret.
    api_keys (id) {
        id -> Uuid,
        project_id -> Uuid,
        /// Lowercase hex SHA-256 of the key; unique.
        key_fingerprint -> Text,
        label -> Text,
        created_at -> Timestamptz,
        revoked_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Audit receipt of one upload.
    ingestions (id) {
        id -> Uuid,
        project_id -> Uuid,
        api_key_id -> Nullable<Uuid>,
        /// Snapshot of the validated metadata.
        metadata -> Jsonb,
        file_count -> Int4,
        /// Newly inserted results, written last inside the transaction.
        test_result_count -> Int4,
        received_at -> Timestamptz,
    }
}

diesel::table! {
    /// One logical CI run; unique on (project_id, repository, external_run_id).
    ci_runs (id) {
        id -> Uuid,
        project_id -> Uuid,
        repository -> Text,
        external_run_id -> Int8,
        run_number -> Int8,
        workflow_name -> Text,
        workflow_ref -> Text,
        run_url -> Text,
        commit_sha -> Text,
        branch -> Text,
        event -> Text,
        pr_number -> Nullable<Int8>,
        first_seen_at -> Timestamptz,
        last_seen_at -> Timestamptz,
    }
}

diesel::table! {
    /// Attempts of a run; unique on (ci_run_id, attempt_number).
    ci_run_attempts (id) {
        id -> Uuid,
        ci_run_id -> Uuid,
        attempt_number -> Int4,
        started_at -> Timestamptz,
        completed_at -> Timestamptz,
    }
}

diesel::table! {
    /// Jobs of an attempt; unique on (ci_run_attempt_id, job_name, job_variant).
    ci_jobs (id) {
        id -> Uuid,
        ci_run_attempt_id -> Uuid,
        job_name -> Text,
        job_variant -> Text,
    }
}

diesel::table! {
    /// Raw report files, possibly truncated for storage.
    report_files (id) {
        id -> Uuid,
        ingestion_id -> Uuid,
        ci_job_id -> Uuid,
        filename -> Text,
        content_sha256 -> Text,
        size_bytes -> Int8,
        truncated -> Bool,
        content -> Bytea,
    }
}

diesel::table! {
    /// Stable test identities; unique on
    /// (project_id, repository, job_name, job_variant, test_identifier).
    test_cases (id) {
        id -> Uuid,
        project_id -> Uuid,
        repository -> Text,
        job_name -> Text,
        job_variant -> Text,
        test_identifier -> Text,
        classname -> Text,
        name -> Text,
        first_seen_at -> Timestamptz,
        last_seen_at -> Timestamptz,
    }
}

diesel::table! {
    /// One outcome per (test_case_id, ci_job_id).
    test_results (id) {
        id -> Uuid,
        test_case_id -> Uuid,
        ci_job_id -> Uuid,
        ingestion_id -> Uuid,
        status -> Text,
        duration_ms -> Int8,
        failure_message -> Nullable<Text>,
        failure_output -> Nullable<Text>,
    }
}

diesel::table! {
    /// Detected fail-then-pass patterns; unique on (test_case_id, ci_run_id).
    flake_events (id) {
        id -> Uuid,
        test_case_id -> Uuid,
        ci_run_id -> Uuid,
        failed_attempt -> Int4,
        passed_attempt -> Int4,
        failure_message -> Nullable<Text>,
        detected_at -> Timestamptz,
    }
}

diesel::table! {
    /// Per test case flake statistics, recomputed from counts.
    flake_stats (test_case_id) {
        test_case_id -> Uuid,
        total_runs_seen -> Int8,
        mixed_outcome_runs -> Int8,
        flake_score -> Float8,
        last_failure_message -> Nullable<Text>,
        first_seen_at -> Timestamptz,
        last_seen_at -> Timestamptz,
    }
}

diesel::joinable!(api_keys -> projects (project_id));
diesel::joinable!(ingestions -> projects (project_id));
diesel::joinable!(ci_runs -> projects (project_id));
diesel::joinable!(ci_run_attempts -> ci_runs (ci_run_id));
diesel::joinable!(ci_jobs -> ci_run_attempts (ci_run_attempt_id));
diesel::joinable!(report_files -> ci_jobs (ci_job_id));
diesel::joinable!(test_cases -> projects (project_id));
diesel::joinable!(test_results -> test_cases (test_case_id));
diesel::joinable!(test_results -> ci_jobs (ci_job_id));
diesel::joinable!(flake_events -> test_cases (test_case_id));
diesel::joinable!(flake_events -> ci_runs (ci_run_id));
diesel::joinable!(flake_stats -> test_cases (test_case_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    api_keys,
    ingestions,
    ci_runs,
    ci_run_attempts,
    ci_jobs,
    report_files,
    test_cases,
    test_results,
    flake_events,
    flake_stats,
);
