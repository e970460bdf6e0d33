//! Integration tests for the HTTP attachment fetcher against a mock file proxy.

mod support;

use std::sync::Arc;
use std::time::Duration;

use bundler_core::{
    AttachmentDescriptor, AttachmentFetcher, BulkRetrieval, FetchError, HttpFetcher,
    HttpFetcherConfig, PipelineOptions, RunStatus,
};
use support::socket_guard::start_mock_server_or_skip;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fetcher_for(server: &MockServer) -> HttpFetcher {
    let config = HttpFetcherConfig::new(&format!("{}/api/attachments", server.uri())).unwrap();
    HttpFetcher::new(config).unwrap()
}

#[tokio::test]
async fn test_fetch_success_returns_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/attachments/4100000012345"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 bytes".to_vec()))
        .mount(&server)
        .await;

    let bytes = fetcher_for(&server).fetch("4100000012345").await.unwrap();
    assert_eq!(bytes, b"%PDF-1.7 bytes");
}

#[tokio::test]
async fn test_fetch_not_found_maps_to_http_status() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("missing").await.unwrap_err();
    assert!(matches!(err, FetchError::HttpStatus { status: 404, .. }));
}

#[tokio::test]
async fn test_fetch_unauthorized_maps_to_auth_required() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = fetcher_for(&server).fetch("secret").await.unwrap_err();
    assert!(matches!(err, FetchError::AuthRequired { status: 401, .. }));
    assert!(err.to_string().starts_with("[AUTH]"));
}

#[tokio::test]
async fn test_fetch_sends_bearer_token() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/api/attachments/7"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpFetcherConfig::new(&format!("{}/api/attachments", server.uri()))
        .unwrap()
        .with_bearer_token("s3cret");
    let bytes = HttpFetcher::new(config).unwrap().fetch("7").await.unwrap();
    assert_eq!(bytes, b"ok");
}

#[tokio::test]
async fn test_fetch_dot_segment_id_never_hits_collection_route() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"[listing]".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let fetcher = fetcher_for(&server);
    for id in ["..", "."] {
        let err = fetcher.fetch(id).await.unwrap_err();
        assert!(matches!(err, FetchError::UnaddressableId { .. }), "got {err:?}");
    }
}

#[tokio::test]
async fn test_fetch_rejects_oversized_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0_u8; 4096]))
        .mount(&server)
        .await;

    let config = HttpFetcherConfig::new(&format!("{}/api/attachments", server.uri()))
        .unwrap()
        .with_max_attachment_bytes(1024);
    let err = HttpFetcher::new(config).unwrap().fetch("big").await.unwrap_err();
    assert!(matches!(err, FetchError::TooLarge { limit_bytes: 1024, .. }));
}

#[tokio::test]
async fn test_fetch_read_timeout_maps_to_timeout() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"late".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let config = HttpFetcherConfig::new(&format!("{}/api/attachments", server.uri()))
        .unwrap()
        .with_timeouts(Duration::from_secs(1), Duration::from_millis(200));
    let err = HttpFetcher::new(config).unwrap().fetch("slow").await.unwrap_err();
    assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_pipeline_over_http_reports_partial_success() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for id in ["1", "2", "4"] {
        Mock::given(method("GET"))
            .and(path(format!("/api/attachments/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(id.as_bytes().to_vec()))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/attachments/3"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let pipeline =
        BulkRetrieval::new(PipelineOptions::default(), Arc::new(fetcher_for(&server))).unwrap();
    let descriptors = (1..=4)
        .map(|i| AttachmentDescriptor::new(i.to_string(), Some(format!("photo-{i}.jpg")), i - 1))
        .collect();
    let result = pipeline.run(descriptors).await.unwrap();

    assert_eq!(result.status(), RunStatus::PartialSuccess);
    assert_eq!(result.succeeded_count(), 3);
    assert_eq!(result.failed()[0].descriptor().id(), "3");
    assert_eq!(result.archive().unwrap().entry_count(), 3);
}
