use std::time::Duration;

use preview_engine::{FailureKind, FetchSettings, Fetcher, ReqwestFetcher};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn fetcher_returns_body_and_metadata() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doc"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/doc", server.uri());

    let output = fetcher.fetch(&url, TIMEOUT).await.expect("fetch ok");
    assert_eq!(output.metadata.original_url, url);
    assert_eq!(output.metadata.final_url, output.metadata.original_url);
    assert_eq!(output.metadata.redirect_count, 0);
    assert!(output
        .metadata
        .content_type
        .unwrap()
        .starts_with("text/html"));
    assert_eq!(output.metadata.byte_len, 15);
    assert_eq!(output.bytes, b"<html>ok</html>");
}

#[tokio::test]
async fn fetcher_fails_on_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/missing", server.uri());
    let err = fetcher.fetch(&url, TIMEOUT).await.expect_err("404 should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
}

#[tokio::test]
async fn fetcher_times_out_slow_responses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("late")
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let url = format!("{}/slow", server.uri());
    let err = fetcher
        .fetch(&url, Duration::from_millis(100))
        .await
        .expect_err("should time out");
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn fetcher_caps_response_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/big"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(vec![b'a'; 64], "text/html"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings {
        max_bytes: 16,
        ..FetchSettings::default()
    });
    let url = format!("{}/big", server.uri());
    let err = fetcher.fetch(&url, TIMEOUT).await.expect_err("too large");
    assert!(matches!(
        err.kind,
        FailureKind::TooLarge { max_bytes: 16, .. }
    ));
}

#[tokio::test]
async fn fetcher_follows_redirects_and_counts_hops() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<p>moved</p>", "text/html"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let output = fetcher
        .fetch(&format!("{}/old", server.uri()), TIMEOUT)
        .await
        .expect("redirect followed");
    assert_eq!(output.metadata.final_url, format!("{}/new", server.uri()));
    assert_eq!(output.metadata.redirect_count, 1);
}

#[tokio::test]
async fn redirect_loop_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/a"))
        .mount(&server)
        .await;

    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher
        .fetch(&format!("{}/a", server.uri()), TIMEOUT)
        .await
        .expect_err("loop");
    assert_eq!(err.kind, FailureKind::TooManyRedirects);
}

#[tokio::test]
async fn hop_limit_is_enforced() {
    let server = MockServer::start().await;
    for hop in 0..4 {
        Mock::given(method("GET"))
            .and(path(format!("/hop{hop}")))
            .respond_with(
                ResponseTemplate::new(302).insert_header("location", format!("/hop{}", hop + 1)),
            )
            .mount(&server)
            .await;
    }

    let fetcher = ReqwestFetcher::new(FetchSettings {
        redirect_limit: 2,
        ..FetchSettings::default()
    });
    let err = fetcher
        .fetch(&format!("{}/hop0", server.uri()), TIMEOUT)
        .await
        .expect_err("hop limit");
    assert_eq!(err.kind, FailureKind::TooManyRedirects);
}

#[tokio::test]
async fn malformed_url_is_invalid() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher
        .fetch("not a url", TIMEOUT)
        .await
        .expect_err("invalid");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
    let fetcher = ReqwestFetcher::new(FetchSettings::default());
    let err = fetcher
        .fetch("http://127.0.0.1:9/", TIMEOUT)
        .await
        .expect_err("refused");
    assert_eq!(err.kind, FailureKind::Network);
}
