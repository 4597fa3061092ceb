//! Integration tests for `SheetWorkItems` against the values API.
//!
//! Uses `wiremock` to stand up a local HTTP server for each test. Covers
//! work-item parsing, results-column auto-creation, and the batched
//! state-transition writes.

use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use smpdb_core::Platform;
use smpdb_sheets::{SheetWorkItems, SheetsClient, SheetsError, SheetsSettings};

fn adapter(base: &str) -> SheetWorkItems {
    let client = SheetsClient::new(SheetsSettings {
        api_base: base.to_owned(),
        token: "test-token".to_owned(),
        request_timeout_secs: 5,
    })
    .expect("failed to build test SheetsClient");
    SheetWorkItems::new(client)
}

fn values_body(values: serde_json::Value) -> serde_json::Value {
    json!({"range": "ignored", "majorDimension": "ROWS", "values": values})
}

/// Mounts the header GET for a sheet with identifier/platform/followers and
/// an existing results column in D.
async fn mount_standard_header(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A1:Z1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["Username", "Platform", "Followers", "Collected"]
        ]))))
        .mount(server)
        .await;
}

#[tokio::test]
async fn list_work_items_parses_rows_and_states() {
    let server = MockServer::start().await;
    mount_standard_header(&server).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A2:Z$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["alice", "instagram", "12,400", ""],
            ["@bob", "tiktok", "", "5"],
            ["carol", "instagram", "", "collecting"],
            ["dave", "tiktok", "", "uncollectable"],
            ["", "instagram", "", ""],
            ["eve", "myspace", "", ""],
        ]))))
        .mount(&server)
        .await;

    let items = adapter(&server.uri())
        .list_work_items("doc1", "Tracked")
        .await
        .unwrap();

    // Rows 6 (no identifier) and 7 (unknown platform) are skipped.
    assert_eq!(items.len(), 4);

    assert_eq!(items[0].row, 2);
    assert_eq!(items[0].identifier, "alice");
    assert_eq!(items[0].platform, Platform::Instagram);
    assert_eq!(items[0].followers, Some(12_400));
    assert!(items[0].is_eligible());

    assert_eq!(items[1].identifier, "bob", "leading @ is stripped");
    assert_eq!(items[1].collected_count, 5);
    assert!(items[1].is_collected());
    assert!(!items[1].is_eligible());

    assert!(items[2].collecting);
    assert!(!items[2].is_eligible());

    assert!(items[3].uncollectable);
    assert!(!items[3].is_eligible());
}

#[tokio::test]
async fn list_work_items_derives_identifier_from_profile_url() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A1:Z1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["Username", "Platform", "Profile URL", "Collected"]
        ]))))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A2:Z$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["", "instagram", "https://www.instagram.com/alice/", ""],
        ]))))
        .mount(&server)
        .await;

    let items = adapter(&server.uri())
        .list_work_items("doc1", "Tracked")
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].identifier, "alice");
    assert_eq!(
        items[0].profile_url.as_deref(),
        Some("https://www.instagram.com/alice/")
    );
}

#[tokio::test]
async fn list_work_items_creates_missing_results_column() {
    let server = MockServer::start().await;

    // Header has no results alias and no blank slot inside it: the column
    // is appended at D, and its label written into row 1.
    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A1:Z1$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["Username", "Platform", "Notes"]
        ]))))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*D1$"))
        .and(body_string_contains("Collected"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values/.*A2:Z$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(values_body(json!([
            ["alice", "instagram", "vip", ""],
        ]))))
        .mount(&server)
        .await;

    let items = adapter(&server.uri())
        .list_work_items("doc1", "Tracked")
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert!(items[0].is_eligible());
}

#[tokio::test]
async fn list_work_items_maps_backend_failure_to_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = adapter(&server.uri())
        .list_work_items("doc1", "Tracked")
        .await
        .unwrap_err();

    assert!(
        matches!(err, SheetsError::Unavailable { status: 503, .. }),
        "expected Unavailable(503), got: {err:?}"
    );
}

#[tokio::test]
async fn mark_collecting_batches_sentinel_writes() {
    let server = MockServer::start().await;
    mount_standard_header(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values:batchUpdate$"))
        .and(body_string_contains("collecting"))
        .and(body_string_contains("D10"))
        .and(body_string_contains("D11"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server.uri())
        .mark_collecting("doc1", "Tracked", &[10, 11])
        .await
        .unwrap();
}

#[tokio::test]
async fn mark_uncollectable_writes_sentinel() {
    let server = MockServer::start().await;
    mount_standard_header(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values:batchUpdate$"))
        .and(body_string_contains("uncollectable"))
        .and(body_string_contains("D7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server.uri())
        .mark_uncollectable("doc1", "Tracked", &[7])
        .await
        .unwrap();
}

#[tokio::test]
async fn record_collected_counts_writes_numbers() {
    let server = MockServer::start().await;
    mount_standard_header(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values:batchUpdate$"))
        .and(body_string_contains("D4"))
        .and(body_string_contains("17"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    adapter(&server.uri())
        .record_collected_counts("doc1", "Tracked", &[(4, 17)])
        .await
        .unwrap();
}

#[tokio::test]
async fn state_writes_with_no_rows_skip_the_request() {
    let server = MockServer::start().await;
    // No mocks mounted: any request would fail the test via 404 + Unavailable.

    adapter(&server.uri())
        .mark_collecting("doc1", "Tracked", &[])
        .await
        .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn write_failure_surfaces_as_unavailable() {
    let server = MockServer::start().await;
    mount_standard_header(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v4/spreadsheets/doc1/values:batchUpdate$"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = adapter(&server.uri())
        .clear_state("doc1", "Tracked", &[3])
        .await
        .unwrap_err();

    assert!(
        matches!(err, SheetsError::Unavailable { status: 500, .. }),
        "expected Unavailable(500), got: {err:?}"
    );
}
