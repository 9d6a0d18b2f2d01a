//! End-to-end protocol tests: the reqwest transport against a mock endpoint.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bing_image_creator::{
    CreatorConfig, CreatorError, ImageCreatorClient, ImageGenerator, NoProgress, ProgressContext,
};

const CREATE_PATH: &str = "/images/create";
const RESULTS_PATH: &str = "/images/create/async/results/1-abc";

// ─────────────────────── helpers ───────────────────────

fn config_for(server: &MockServer) -> CreatorConfig {
    CreatorConfig {
        host: Some(server.uri()),
        user_token: Some("token".into()),
        forwarded_for: Some("1.2.3.4".into()),
        ..Default::default()
    }
}

fn fast_client(server: &MockServer) -> ImageCreatorClient {
    ImageCreatorClient::new(&config_for(server))
        .unwrap()
        .with_poll_interval(Duration::from_millis(20))
}

fn submit_page() -> String {
    format!(
        r#"<html><div id="giloader"><div>loading</div></div><div id="gir" data-c="{RESULTS_PATH}?q=a+cat&amp;IG=F00"></div><div id="giric"></div></html>"#
    )
}

fn result_page(server: &MockServer) -> String {
    format!(
        r#"<div class="img_cont"><img class="mimg" src="{0}/th/id/A?w=270&amp;h=270&amp;c=6"/><img class="mimg" src="{0}/th/id/B?w=270&amp;h=270&amp;c=6"/></div>"#,
        server.uri()
    )
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(CREATE_PATH))
        .and(query_param("q", "a cat"))
        .respond_with(ResponseTemplate::new(200).set_body_string(submit_page()))
        .mount(server)
        .await;
}

async fn mount_results(server: &MockServer, pending: u64) {
    if pending > 0 {
        Mock::given(method("GET"))
            .and(path(RESULTS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"errorMessage":"Pending"}"#))
            .up_to_n_times(pending)
            .mount(server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path(RESULTS_PATH))
        .and(query_param("IG", "F00"))
        .respond_with(ResponseTemplate::new(200).set_body_string(result_page(server)))
        .mount(server)
        .await;
}

// ═══════════════════════════════════════════════════════
// SUBMISSION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_submit_sends_profile_and_telemetry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CREATE_PATH))
        .and(query_param("partner", "sydney"))
        .and(query_param("kseed", "7000"))
        .and(query_param("q", "a cat"))
        .and(query_param("iframeid", "req-1"))
        .and(header("cookie", "_U=token"))
        .and(header("x-forwarded-for", "1.2.3.4"))
        .and(header("sec-fetch-dest", "iframe"))
        .respond_with(ResponseTemplate::new(200).set_body_string(submit_page()))
        .expect(1)
        .mount(&server)
        .await;

    let client = fast_client(&server);
    let submission = client.submit("a cat", Some("req-1")).await.unwrap();
    assert_eq!(
        submission.polling_url,
        format!("{}{RESULTS_PATH}?q=a+cat&IG=F00", server.uri())
    );
    assert!(submission.content_url.starts_with(&server.uri()));
    assert_eq!(submission.request_id, "req-1");
}

#[tokio::test]
async fn test_submit_500_makes_one_call() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = fast_client(&server).submit("a cat", None).await.unwrap_err();
    assert!(matches!(err, CreatorError::HttpStatus { status: 500 }));
}

#[tokio::test]
async fn test_submit_remote_error_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(CREATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"<div class="gil_err_img"></div><div class="gil_err_mt">quota exceeded</div>"#,
        ))
        .mount(&server)
        .await;

    match fast_client(&server).submit("a cat", None).await {
        Err(CreatorError::Remote { message }) => assert_eq!(message, "quota exceeded"),
        other => panic!("expected remote error, got {other:?}"),
    }
}

// ═══════════════════════════════════════════════════════
// POLLING
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_poll_until_complete() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_results(&server, 2).await;

    let client = fast_client(&server);
    let submission = client.submit("a cat", None).await.unwrap();

    let mut reports = 0;
    let body = client
        .poll(&submission.polling_url, &mut |_: &ProgressContext| {
            reports += 1;
            false
        })
        .await
        .unwrap();
    assert!(body.contains("img_cont"));
    assert_eq!(reports, 2);
}

#[tokio::test]
async fn test_poll_cancel_stops_requests() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_results(&server, 5).await;

    let client = fast_client(&server);
    let submission = client.submit("a cat", None).await.unwrap();
    let err = client
        .poll(&submission.polling_url, &mut |_: &ProgressContext| true)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());

    let polls = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == RESULTS_PATH)
        .count();
    assert_eq!(polls, 1);
}

#[tokio::test]
async fn test_poll_non_200_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(RESULTS_PATH))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let url = format!("{}{RESULTS_PATH}", server.uri());
    let err = fast_client(&server).poll(&url, &mut NoProgress).await.unwrap_err();
    assert!(matches!(err, CreatorError::HttpStatus { status: 403 }));
}

#[tokio::test]
async fn test_poll_deadline_reports_timeout() {
    let server = MockServer::start().await;
    mount_results(&server, 1_000).await;

    let url = format!("{}{RESULTS_PATH}?IG=F00", server.uri());
    let err = fast_client(&server)
        .poll_with_deadline(&url, &mut NoProgress, Some(Duration::from_millis(150)))
        .await
        .unwrap_err();
    assert!(matches!(err, CreatorError::Timeout { .. }));
}

// ═══════════════════════════════════════════════════════
// GENERATION
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn test_generate_downloads_full_size_images() {
    let server = MockServer::start().await;
    mount_submit(&server).await;
    mount_results(&server, 1).await;
    for (id, bytes) in [("A", b"jpeg-a".to_vec()), ("B", b"jpeg-b".to_vec())] {
        Mock::given(method("GET"))
            .and(path(format!("/th/id/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(bytes))
            .expect(1)
            .mount(&server)
            .await;
    }

    let generator = ImageGenerator::new(Arc::new(fast_client(&server)));
    let images = generator.generate("a cat", &mut NoProgress).await.unwrap();
    assert_eq!(images, vec![b"jpeg-a".to_vec(), b"jpeg-b".to_vec()]);

    let downloads: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().starts_with("/th/id/"))
        .map(|r| r.url.to_string())
        .collect();
    assert!(downloads.iter().all(|u| !u.contains("w=270")));
}
