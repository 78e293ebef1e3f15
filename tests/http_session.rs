use trafficflou::prelude::*;
use trafficflou::metrics::logger::RequestLogger;
use trafficflou::session::AbortReason;

use std::time::Duration;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_config(pages: Vec<PageTarget>) -> TrafficConfig {
    let mut config = TrafficConfig::default()
        .with_pages(pages)
        .with_jitter(0.0, 0.0)
        .with_seed(7);
    config.adaptation.max_rate_per_minute = 6_000.0;
    config.rate_strategy = "fixed".to_string();
    config.initial_rate_per_minute = 600.0;
    config.http.retry_backoff_ms = 0;
    config.report_dir = None;
    config
}

#[tokio::test]
async fn counts_statuses_from_a_live_server() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .and(header_exists("user-agent"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let config = fast_config(vec![
        PageTarget::new("home", "/", 0.5),
        PageTarget::new("broken", "/broken", 0.5),
    ]);
    let generator = Generator::http(config).unwrap();
    let handle = generator
        .create_session(&server.uri(), 1, ProfileSelector::Random)
        .unwrap();
    let report = generator.run_session(handle).await;

    assert_eq!(report.status, SessionState::Completed);
    assert!(report.total_requests > 0);
    assert_eq!(report.successes + report.failures, report.total_requests);

    let home = report.page_hits.get("home").copied().unwrap_or(0);
    let broken = report.page_hits.get("broken").copied().unwrap_or(0);
    assert_eq!(report.successes, home);
    assert_eq!(report.failures, broken);
    assert_eq!(report.bytes_received, home * 5);

    // 5xx is a failure but never retried
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len() as u64, report.total_requests);
}

#[tokio::test]
async fn timeouts_are_retried_once_then_counted() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let mut config = fast_config(vec![PageTarget::new("slow", "/slow", 1.0)]);
    config.http.timeout_secs = 1;
    let generator = Generator::http(config).unwrap();
    let handle = generator
        .create_session(&server.uri(), 1, ProfileSelector::Random)
        .unwrap();
    let report = generator.run_session(handle).await;

    assert_eq!(report.total_requests, 1);
    assert_eq!(report.failures, 1);
    assert_eq!(report.successes, 0);
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn refused_connections_abort_the_session() {
    let config = fast_config(vec![PageTarget::new("home", "/", 1.0)]);
    let generator = Generator::http(config).unwrap();
    let handle = generator
        .create_session("http://127.0.0.1:1", 30, ProfileSelector::Random)
        .unwrap();
    let report = generator.run_session(handle).await;

    assert_eq!(report.status, SessionState::Aborted);
    assert_eq!(report.abort_reason, Some(AbortReason::Unreachable));
    assert_eq!(report.total_requests, 1);
    assert!(report.elapsed_secs < 30.0);
}

#[tokio::test]
async fn request_log_gets_a_line_per_request() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("requests.csv");

    let config = fast_config(vec![PageTarget::new("home", "/", 1.0)]);
    let generator = Generator::http(config)
        .unwrap()
        .with_request_log(RequestLogger::new(&log_path).unwrap());
    let handle = generator
        .create_session(&server.uri(), 1, ProfileSelector::Random)
        .unwrap();
    let report = generator.run_session(handle).await;

    let content = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(content.lines().count() as u64, report.total_requests + 1);
    assert!(content.lines().skip(1).all(|line| line.contains(",204,true,")));
}

#[tokio::test]
async fn large_bodies_are_counted_in_full() {
    let server = MockServer::start().await;
    let body = vec![b'x'; 256 * 1024];

    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(&server)
        .await;

    let config = fast_config(vec![PageTarget::new("big", "/big", 1.0)]);
    let generator = Generator::http(config).unwrap();
    let handle = generator
        .create_session(&server.uri(), 1, ProfileSelector::Random)
        .unwrap();
    let report = generator.run_session(handle).await;

    assert!(report.successes > 0);
    assert_eq!(report.bytes_received, report.successes * 256 * 1024);
}
