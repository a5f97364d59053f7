//! HTTP tests for the upload endpoint.

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::http::header::{AUTHORIZATION, CONTENT_TYPE};
use actix_web::{App, test};
use rstest::rstest;
use serde_json::Value;
use uuid::Uuid;

use super::*;
use crate::Trace;
use crate::domain::ports::{IngestionReceipt, MockCredentialResolver, MockIngestionCommand};
use crate::domain::{ApiKeyCredential, ErrorCode, Project};
use crate::middleware::TRACE_ID_HEADER;

const BOUNDARY: &str = "flaketrack-test-boundary";
const API_KEY: &str = "ft_test_key";
const METADATA: &str = r#"{"project":"payments","run_id":9001}"#;
const REPORT: &str = r#"<testsuite><testcase classname="calc" name="adds"/></testsuite>"#;

fn credential() -> ApiKeyCredential {
    ApiKeyCredential {
        api_key_id: Uuid::from_u128(0xA11CE),
        project: Project::new(Uuid::from_u128(0xBEEF), "payments"),
    }
}

fn receipt() -> IngestionReceipt {
    IngestionReceipt {
        ingestion_id: Uuid::from_u128(0x1D),
        files_stored: 1,
        test_results_inserted: 1,
        flake_events_created: 0,
    }
}

enum Part<'a> {
    Metadata(&'a str),
    File(&'a str, &'a str),
    Other(&'a str),
}

fn body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut out = String::new();
    for part in parts {
        out.push_str(&format!("--{BOUNDARY}\r\n"));
        match part {
            Part::Metadata(json) => out.push_str(&format!(
                "Content-Disposition: form-data; name=\"metadata\"\r\n\
                 Content-Type: application/json\r\n\r\n{json}\r\n"
            )),
            Part::File(filename, content) => out.push_str(&format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/xml\r\n\r\n{content}\r\n"
            )),
            Part::Other(name) => out.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n\r\nvalue\r\n"
            )),
        }
    }
    out.push_str(&format!("--{BOUNDARY}--\r\n"));
    out.into_bytes()
}

fn accepting_resolver() -> MockCredentialResolver {
    let mut resolver = MockCredentialResolver::new();
    resolver
        .expect_resolve()
        .withf(|key| key == API_KEY)
        .return_once(|_| Ok(Some(credential())));
    resolver
}

fn untouched_command() -> MockIngestionCommand {
    let mut command = MockIngestionCommand::new();
    command.expect_ingest().never();
    command
}

async fn post_upload(
    resolver: MockCredentialResolver,
    command: MockIngestionCommand,
    limits: UploadLimits,
    authorization: Option<&str>,
    parts: &[Part<'_>],
) -> actix_web::dev::ServiceResponse {
    let state = HttpState::new(Arc::new(command), Arc::new(resolver)).with_limits(limits);
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(state))
            .wrap(Trace)
            .service(web::scope("/api/v1").service(create_ingestion)),
    )
    .await;
    let mut request = test::TestRequest::post()
        .uri("/api/v1/ingestions")
        .insert_header((
            CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        ))
        .set_payload(body(parts));
    if let Some(value) = authorization {
        request = request.insert_header((AUTHORIZATION, value));
    }
    test::call_service(&app, request.to_request()).await
}

fn bearer() -> Option<&'static str> {
    Some("Bearer ft_test_key")
}

async fn error_body(res: actix_web::dev::ServiceResponse) -> Error {
    test::read_body_json(res).await
}

#[rstest]
#[actix_web::test]
async fn accepted_upload_returns_created_receipt() {
    let mut command = MockIngestionCommand::new();
    command
        .expect_ingest()
        .withf(|request| {
            request.caller == IngestionCaller::ApiKey(credential())
                && request.metadata_json == METADATA.as_bytes()
                && request.files == [UploadedReport::new("junit.xml", REPORT)]
        })
        .times(1)
        .return_once(|_| Ok(receipt()));

    let res = post_upload(
        accepting_resolver(),
        command,
        UploadLimits::default(),
        bearer(),
        &[Part::Metadata(METADATA), Part::File("junit.xml", REPORT)],
    )
    .await;

    assert_eq!(res.status(), StatusCode::CREATED);
    assert!(res.headers().contains_key(TRACE_ID_HEADER));
    let body: Value = test::read_body_json(res).await;
    assert_eq!(body["ingestionId"], receipt().ingestion_id.to_string());
    assert_eq!(body["filesStored"], 1);
    assert_eq!(body["testResultsInserted"], 1);
    assert_eq!(body["flakeEventsCreated"], 0);
}

#[rstest]
#[actix_web::test]
async fn files_keep_upload_order_and_get_fallback_names() {
    let mut command = MockIngestionCommand::new();
    command
        .expect_ingest()
        .withf(|request| {
            let names: Vec<_> = request.files.iter().map(|f| f.filename.as_str()).collect();
            names == ["b.xml", "a.xml", "files[2]"]
        })
        .times(1)
        .return_once(|_| Ok(receipt()));

    let res = post_upload(
        accepting_resolver(),
        command,
        UploadLimits::default(),
        bearer(),
        &[
            Part::File("b.xml", REPORT),
            Part::Metadata(METADATA),
            Part::File("a.xml", REPORT),
            Part::File("", REPORT),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[rstest]
#[case::missing(None)]
#[case::wrong_scheme(Some("Basic Zm9vOmJhcg=="))]
#[actix_web::test]
async fn requests_without_bearer_key_are_unauthorised(#[case] authorization: Option<&str>) {
    let mut resolver = MockCredentialResolver::new();
    resolver.expect_resolve().never();

    let res = post_upload(
        resolver,
        untouched_command(),
        UploadLimits::default(),
        authorization,
        &[Part::Metadata(METADATA), Part::File("junit.xml", REPORT)],
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[rstest]
#[actix_web::test]
async fn unknown_keys_are_unauthorised() {
    let mut resolver = MockCredentialResolver::new();
    resolver.expect_resolve().return_once(|_| Ok(None));

    let res = post_upload(
        resolver,
        untouched_command(),
        UploadLimits::default(),
        bearer(),
        &[Part::Metadata(METADATA), Part::File("junit.xml", REPORT)],
    )
    .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[rstest]
#[case::too_many_files(UploadLimits::new(1, 1024, 4096))]
#[case::file_too_large(UploadLimits::new(5, 16, 4096))]
#[case::total_too_large(UploadLimits::new(5, 1024, 100))]
#[actix_web::test]
async fn oversized_uploads_are_rejected_before_ingestion(#[case] limits: UploadLimits) {
    let res = post_upload(
        accepting_resolver(),
        untouched_command(),
        limits,
        bearer(),
        &[
            Part::Metadata(METADATA),
            Part::File("a.xml", REPORT),
            Part::File("b.xml", REPORT),
        ],
    )
    .await;
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(error_body(res).await.code(), ErrorCode::PayloadTooLarge);
}

#[rstest]
#[case::no_metadata(vec![Part::File("a.xml", REPORT)], "metadata")]
#[case::no_files(vec![Part::Metadata(METADATA)], "files")]
#[case::twice(vec![Part::Metadata(METADATA), Part::Metadata(METADATA)], "metadata")]
#[case::unknown(vec![Part::Metadata(METADATA), Part::Other("notes")], "notes")]
#[actix_web::test]
async fn malformed_uploads_name_the_offending_field(
    #[case] parts: Vec<Part<'static>>,
    #[case] field: &str,
) {
    let res = post_upload(
        accepting_resolver(),
        untouched_command(),
        UploadLimits::default(),
        bearer(),
        &parts,
    )
    .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let error = error_body(res).await;
    assert_eq!(
        error.details().and_then(|d| d.get("field")).and_then(Value::as_str),
        Some(field)
    );
}

#[rstest]
#[actix_web::test]
async fn service_rejections_are_returned_unchanged() {
    let mut command = MockIngestionCommand::new();
    command.expect_ingest().return_once(|_| {
        Err(Error::forbidden("metadata project does not match the API key"))
    });

    let res = post_upload(
        accepting_resolver(),
        command,
        UploadLimits::default(),
        bearer(),
        &[Part::Metadata(METADATA), Part::File("junit.xml", REPORT)],
    )
    .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(res.headers().contains_key(TRACE_ID_HEADER));
}
