//! Unit tests for the ingestion orchestration service.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::{Value, json};
use uuid::Uuid;

use super::*;
use crate::domain::ports::{
    MockFlakeDetectionCommand, MockIngestionRepository, MockProjectDirectory, PersistedIngestion,
};
use crate::domain::{ApiKeyCredential, ErrorCode};
use crate::test_support::{MutableClock, fixture_timestamp};

const API_KEY_ID: Uuid = Uuid::from_u128(0xA11CE);
const PROJECT_ID: Uuid = Uuid::from_u128(0xBEEF);
const RUN_ID: Uuid = Uuid::from_u128(0xC1);

const PASSING_REPORT: &str = r#"<testsuite name="unit">
  <testcase classname="calc" name="adds" time="0.010"/>
  <testcase classname="calc" name="divides" time="0.020"/>
</testsuite>"#;

const FAILING_REPORT: &str = r#"<testsuites><testsuite name="unit">
  <testcase classname="calc" name="adds"><failure message="off by one">trace</failure></testcase>
</testsuite></testsuites>"#;

fn project() -> Project {
    Project::new(PROJECT_ID, "payments")
}

fn api_caller() -> IngestionCaller {
    IngestionCaller::ApiKey(ApiKeyCredential {
        api_key_id: API_KEY_ID,
        project: project(),
    })
}

#[fixture]
fn metadata() -> Value {
    json!({
        "project": "payments",
        "repository": "acme/payments",
        "workflow_name": "CI",
        "workflow_ref": "ci.yml@refs/heads/main",
        "run_id": 9001,
        "run_number": 12,
        "run_attempt": 1,
        "run_url": "https://ci.example.com/runs/9001",
        "commit_sha": "0123abcd",
        "branch": "main",
        "event": "push",
        "job_name": "test",
        "started_at": "2026-03-01T10:00:00Z",
        "completed_at": "2026-03-01T10:05:00Z"
    })
}

fn request(caller: IngestionCaller, metadata: &Value, files: Vec<UploadedReport>) -> IngestionRequest {
    IngestionRequest {
        caller,
        metadata_json: serde_json::to_vec(metadata).expect("serialise metadata"),
        files,
    }
}

fn persisted(test_results_inserted: u64) -> PersistedIngestion {
    PersistedIngestion {
        ingestion_id: Uuid::from_u128(0x1D),
        ci_run_id: RUN_ID,
        files_stored: 2,
        test_results_inserted,
    }
}

fn make_service(
    repository: MockIngestionRepository,
    projects: MockProjectDirectory,
    detector: MockFlakeDetectionCommand,
) -> IngestionCommandService<MockIngestionRepository, MockProjectDirectory> {
    IngestionCommandService::new(
        Arc::new(repository),
        Arc::new(projects),
        Arc::new(detector),
        Arc::new(MutableClock::default()),
    )
    .with_limits(UploadLimits::new(3, 4096, 8192))
    .with_max_stored_file_bytes(64)
}

fn untouched_repository() -> MockIngestionRepository {
    let mut repository = MockIngestionRepository::new();
    repository.expect_persist_ingestion().never();
    repository
}

fn untouched_detector() -> MockFlakeDetectionCommand {
    let mut detector = MockFlakeDetectionCommand::new();
    detector.expect_detect_run().never();
    detector
}

#[rstest]
#[tokio::test]
async fn ingests_parses_persists_and_detects(metadata: Value) {
    let mut repository = MockIngestionRepository::new();
    repository
        .expect_persist_ingestion()
        .withf(|batch| {
            let identifiers: Vec<_> = batch
                .results
                .iter()
                .map(|r| r.test_identifier.as_str())
                .collect();
            batch.project_id == PROJECT_ID
                && batch.api_key_id == Some(API_KEY_ID)
                && batch.received_at == fixture_timestamp()
                && batch.files.len() == 2
                && batch.files.iter().all(|f| f.content.len() <= 64)
                && batch.files.iter().any(|f| f.truncated)
                && identifiers == ["calc#adds", "calc#divides"]
        })
        .times(1)
        .return_once(|_| Ok(persisted(2)));
    let mut detector = MockFlakeDetectionCommand::new();
    detector
        .expect_detect_run()
        .withf(|project, run| project.id == PROJECT_ID && *run == RUN_ID)
        .times(1)
        .return_once(|_, _| Ok(1));

    let receipt = make_service(repository, MockProjectDirectory::new(), detector)
        .ingest(request(
            api_caller(),
            &metadata,
            vec![
                UploadedReport::new("a.xml", PASSING_REPORT),
                UploadedReport::new("b.xml", FAILING_REPORT),
            ],
        ))
        .await
        .expect("ingestion succeeds");

    assert_eq!(
        receipt,
        IngestionReceipt {
            ingestion_id: Uuid::from_u128(0x1D),
            files_stored: 2,
            test_results_inserted: 2,
            flake_events_created: 1,
        }
    );
}

#[rstest]
#[tokio::test]
async fn detection_failure_does_not_fail_committed_ingestion(metadata: Value) {
    let mut repository = MockIngestionRepository::new();
    repository
        .expect_persist_ingestion()
        .times(1)
        .return_once(|_| Ok(persisted(2)));
    let mut detector = MockFlakeDetectionCommand::new();
    detector
        .expect_detect_run()
        .times(1)
        .return_once(|_, _| Err(Error::service_unavailable("db down")));

    let receipt = make_service(repository, MockProjectDirectory::new(), detector)
        .ingest(request(
            api_caller(),
            &metadata,
            vec![UploadedReport::new("a.xml", PASSING_REPORT)],
        ))
        .await
        .expect("ingestion still succeeds");

    assert_eq!(receipt.flake_events_created, 0);
    assert_eq!(receipt.test_results_inserted, 2);
}

#[rstest]
#[tokio::test]
async fn persistence_failure_is_retryable_and_skips_detection(metadata: Value) {
    let mut repository = MockIngestionRepository::new();
    repository
        .expect_persist_ingestion()
        .times(1)
        .return_once(|_| Err(IngestionRepositoryError::query("deadlock detected")));

    let error = make_service(repository, MockProjectDirectory::new(), untouched_detector())
        .ingest(request(
            api_caller(),
            &metadata,
            vec![UploadedReport::new("a.xml", PASSING_REPORT)],
        ))
        .await
        .expect_err("persistence fails");

    assert_eq!(error.code(), ErrorCode::ServiceUnavailable);
    assert!(!error.message().contains("deadlock"));
}

#[rstest]
#[tokio::test]
async fn malformed_report_is_rejected_before_any_write(metadata: Value) {
    let error = make_service(
        untouched_repository(),
        MockProjectDirectory::new(),
        untouched_detector(),
    )
    .ingest(request(
        api_caller(),
        &metadata,
        vec![
            UploadedReport::new("good.xml", PASSING_REPORT),
            UploadedReport::new("broken.xml", "<testsuite><testcase name=\"x\">"),
        ],
    ))
    .await
    .expect_err("parse fails");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(
        error.details().and_then(|d| d.get("file")),
        Some(&json!("broken.xml"))
    );
}

#[rstest]
#[case::missing_field("branch", Value::Null, "branch")]
#[case::bad_attempt("run_attempt", json!(0), "run_attempt")]
#[case::bad_timestamp("started_at", json!("not a time"), "started_at")]
#[case::other_project("project", json!("billing"), "project")]
#[tokio::test]
async fn invalid_metadata_names_the_field(
    mut metadata: Value,
    #[case] key: &str,
    #[case] value: Value,
    #[case] field: &str,
) {
    metadata[key] = value;

    let error = make_service(
        untouched_repository(),
        MockProjectDirectory::new(),
        untouched_detector(),
    )
    .ingest(request(
        api_caller(),
        &metadata,
        vec![UploadedReport::new("a.xml", PASSING_REPORT)],
    ))
    .await
    .expect_err("validation fails");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(
        error.details().and_then(|d| d.get("field")),
        Some(&json!(field))
    );
}

#[rstest]
#[tokio::test]
async fn metadata_that_is_not_json_is_rejected() {
    let error = make_service(
        untouched_repository(),
        MockProjectDirectory::new(),
        untouched_detector(),
    )
    .ingest(IngestionRequest {
        caller: api_caller(),
        metadata_json: b"run_id=1".to_vec(),
        files: vec![UploadedReport::new("a.xml", PASSING_REPORT)],
    })
    .await
    .expect_err("decode fails");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(
        error.details().and_then(|d| d.get("field")),
        Some(&json!("metadata"))
    );
}

#[rstest]
#[case::no_files(Vec::new(), ErrorCode::InvalidRequest)]
#[case::too_many(
    vec![
        UploadedReport::new("1.xml", PASSING_REPORT),
        UploadedReport::new("2.xml", PASSING_REPORT),
        UploadedReport::new("3.xml", PASSING_REPORT),
        UploadedReport::new("4.xml", PASSING_REPORT),
    ],
    ErrorCode::PayloadTooLarge
)]
#[case::too_big(vec![UploadedReport::new("big.xml", vec![b' '; 5000])], ErrorCode::PayloadTooLarge)]
#[tokio::test]
async fn upload_limits_are_checked_first(
    #[case] files: Vec<UploadedReport>,
    #[case] expected: ErrorCode,
) {
    // Invalid metadata proves limits are checked before decoding it.
    let error = make_service(
        untouched_repository(),
        MockProjectDirectory::new(),
        untouched_detector(),
    )
    .ingest(request(api_caller(), &json!({}), files))
    .await
    .expect_err("limits fail");

    assert_eq!(error.code(), expected);
}

#[rstest]
#[tokio::test]
async fn operator_uploads_resolve_the_declared_project(metadata: Value) {
    let mut projects = MockProjectDirectory::new();
    projects
        .expect_find_by_identifier()
        .withf(|identifier| identifier == "payments")
        .times(1)
        .return_once(|_| Ok(Some(project())));
    let mut repository = MockIngestionRepository::new();
    repository
        .expect_persist_ingestion()
        .withf(|batch| batch.project_id == PROJECT_ID && batch.api_key_id.is_none())
        .times(1)
        .return_once(|_| Ok(persisted(2)));
    let mut detector = MockFlakeDetectionCommand::new();
    detector.expect_detect_run().return_once(|_, _| Ok(0));

    let receipt = make_service(repository, projects, detector)
        .ingest(request(
            IngestionCaller::Operator,
            &metadata,
            vec![UploadedReport::new("a.xml", PASSING_REPORT)],
        ))
        .await
        .expect("ingestion succeeds");
    assert_eq!(receipt.files_stored, 2);
}

#[rstest]
#[tokio::test]
async fn operator_uploads_for_unknown_projects_are_rejected(metadata: Value) {
    let mut projects = MockProjectDirectory::new();
    projects
        .expect_find_by_identifier()
        .return_once(|_| Ok(None));

    let error = make_service(untouched_repository(), projects, untouched_detector())
        .ingest(request(
            IngestionCaller::Operator,
            &metadata,
            vec![UploadedReport::new("a.xml", PASSING_REPORT)],
        ))
        .await
        .expect_err("unknown project");

    assert_eq!(error.code(), ErrorCode::InvalidRequest);
    assert_eq!(
        error.details().and_then(|d| d.get("field")),
        Some(&json!("project"))
    );
}

#[rstest]
fn duplicate_identifiers_keep_the_first_result() {
    let results = parse_uploads(&[
        UploadedReport::new("a.xml", FAILING_REPORT),
        UploadedReport::new("b.xml", PASSING_REPORT),
    ])
    .expect("parses");

    let summary: Vec<_> = results
        .iter()
        .map(|r| (r.test_identifier.as_str(), r.status))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("calc#adds", crate::domain::report_parser::TestStatus::Failed),
            ("calc#divides", crate::domain::report_parser::TestStatus::Passed),
        ]
    );
}
