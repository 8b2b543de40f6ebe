//! End-to-end scenarios: a real proxy between a reqwest client and a mock upstream.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::{json, Value};

mod common;

use common::{MockUpstream, Reply, RunningProxy};

const SECVAL: &str = "1000|order123";

fn signed_body() -> Value {
    json!({"amount": 1000, "sec": common::sign(SECVAL), "secval": SECVAL})
}

#[tokio::test]
async fn verified_request_is_forwarded_and_relayed() {
    let upstream = MockUpstream::start(
        Reply::ok(r#"{"status":"ok"}"#)
            .status(StatusCode::CREATED)
            .header("content-type", "application/json")
            .header("x-upstream-trace", "t-1"),
    )
    .await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/request?lang=fa"))
        .header("x-merchant-id", "m-42")
        .header("x-trace", "a")
        .header("x-trace", "b")
        .header("cookie", "session=secret")
        .header("authorization", "Bearer token")
        .json(&signed_body())
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["content-type"], "application/json");
    assert_eq!(res.headers()["x-upstream-trace"], "t-1");
    assert_eq!(res.text().await.unwrap(), r#"{"status":"ok"}"#);

    assert_eq!(upstream.calls(), 1);
    let seen = upstream.last();
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.uri.path(), "/pay/request");
    assert_eq!(seen.uri.query(), Some("lang=fa"));

    let body: Value = serde_json::from_slice(&seen.body).unwrap();
    assert_eq!(body, json!({"amount": 1000}));

    assert_eq!(seen.headers["x-merchant-id"], "m-42");
    let traces: Vec<_> = seen.headers.get_all("x-trace").iter().collect();
    assert_eq!(traces, ["a", "b"]);
    assert!(!seen.headers.contains_key("x-request-id"));
    assert!(!seen.headers.contains_key("cookie"));
    assert!(!seen.headers.contains_key("authorization"));
    assert!(!seen.headers.contains_key("content-type"));
}

#[tokio::test]
async fn client_request_id_is_forwarded() {
    let upstream = MockUpstream::start(Reply::ok("ok")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/request"))
        .header("x-request-id", "client-req-9")
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let seen = upstream.last();
    let ids: Vec<_> = seen.headers.get_all("x-request-id").iter().collect();
    assert_eq!(ids, ["client-req-9"]);
}

#[tokio::test]
async fn dot_segments_reach_upstream_verbatim() {
    use tokio::io::AsyncReadExt;

    let upstream = MockUpstream::start(Reply::ok("ok")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let mut stream = common::raw_signed_post(proxy.addr, "/pay/../admin?x=1", SECVAL).await;
    let mut head = [0u8; 12];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut head))
        .await
        .expect("no response")
        .unwrap();
    assert_eq!(&head, b"HTTP/1.1 200");

    let seen = upstream.last();
    assert_eq!(seen.uri.path(), "/pay/../admin");
    assert_eq!(seen.uri.query(), Some("x=1"));
}

#[tokio::test]
async fn client_disconnect_cancels_upstream_call() {
    let upstream = MockUpstream::start(Reply::ok("late").delay(Duration::from_secs(4))).await;
    let key = common::public_key_file();
    let mut config = common::config(&upstream.origin(), &key);
    config.upstream.timeout_secs = 5;
    let proxy = RunningProxy::start(config).await;

    let stream = common::raw_signed_post(proxy.addr, "/pay/request", SECVAL).await;
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(upstream.calls(), 1);
    assert_eq!(upstream.cancelled(), 0);

    drop(stream);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(upstream.cancelled(), 1);
}

#[tokio::test]
async fn any_method_and_path_is_proxied() {
    let upstream = MockUpstream::start(Reply::ok("done")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .put(proxy.url("/"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let seen = upstream.last();
    assert_eq!(seen.method, "PUT");
    assert_eq!(seen.uri.path(), "/");
    assert_eq!(seen.uri.query(), None);
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let upstream = MockUpstream::start(Reply::ok("never")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let body = json!({"sec": common::sign(SECVAL), "secval": "9999|order123"});
    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(res.text().await.unwrap(), "Signature verification failed");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn signature_that_is_not_base64_is_rejected() {
    let upstream = MockUpstream::start(Reply::ok("never")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let body = json!({"sec": "***", "secval": SECVAL});
    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn empty_credentials_answer_not_found() {
    let upstream = MockUpstream::start(Reply::ok("never")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&json!({"sec": "", "secval": ""}))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.text().await.unwrap(), "");
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn malformed_payloads_are_bad_requests() {
    let upstream = MockUpstream::start(Reply::ok("never")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;
    let client = common::client();

    let cases = [
        (json!({"secval": SECVAL}).to_string(), "sec and secval must be strings"),
        (json!({"sec": 1, "secval": SECVAL}).to_string(), "sec and secval must be strings"),
        ("{not json".to_string(), "Invalid JSON"),
        (String::new(), "Invalid JSON"),
    ];

    for (body, message) in cases {
        let res = client
            .post(proxy.url("/pay/request"))
            .body(body.clone())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(res.text().await.unwrap(), message, "body: {}", body);
    }
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config("http://127.0.0.1:9", &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.text().await.unwrap(), "Failed to reach target server");
}

#[tokio::test]
async fn slow_upstream_is_bad_gateway() {
    let upstream = MockUpstream::start(Reply::ok("late").delay(Duration::from_secs(3))).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn upstream_errors_are_relayed_without_retry() {
    let upstream = MockUpstream::start(
        Reply::ok("upstream exploded").status(StatusCode::INTERNAL_SERVER_ERROR),
    )
    .await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let res = common::client()
        .post(proxy.url("/pay/verify"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "upstream exploded");
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn redirects_are_relayed_not_followed() {
    let upstream = MockUpstream::start(
        Reply::ok("")
            .status(StatusCode::FOUND)
            .header("location", "/elsewhere"),
    )
    .await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;

    let client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap();
    let res = client
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(res.headers()["location"], "/elsewhere");
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn key_file_is_read_for_every_request() {
    let upstream = MockUpstream::start(Reply::ok("ok")).await;
    let key = common::public_key_file();
    let pem = std::fs::read_to_string(key.path()).unwrap();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;
    let client = common::client();

    std::fs::write(key.path(), "not a key").unwrap();
    let res = client
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(res.text().await.unwrap(), "Public key error");
    assert_eq!(upstream.calls(), 0);

    std::fs::write(key.path(), pem).unwrap();
    let res = client
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(upstream.calls(), 1);
}

#[tokio::test]
async fn missing_key_file_is_server_error() {
    let upstream = MockUpstream::start(Reply::ok("never")).await;
    let key = common::public_key_file();
    let mut config = common::config(&upstream.origin(), &key);
    config.key.path = key.path().with_extension("missing");
    let proxy = RunningProxy::start(config).await;

    let res = common::client()
        .post(proxy.url("/pay/request"))
        .json(&signed_body())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = res.text().await.unwrap();
    assert_eq!(body, "Public key error");
    assert!(!body.contains("missing"));
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test]
async fn idle_connections_are_closed() {
    use tokio::io::AsyncReadExt;

    let upstream = MockUpstream::start(Reply::ok("ok")).await;
    let key = common::public_key_file();
    let mut config = common::config(&upstream.origin(), &key);
    config.timeouts.idle_secs = 1;
    let proxy = RunningProxy::start(config).await;

    let mut stream = tokio::net::TcpStream::connect(proxy.addr).await.unwrap();
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("idle connection was not closed");
    assert_eq!(read.unwrap_or(0), 0);
}

#[tokio::test]
async fn shutdown_stops_accepting() {
    let upstream = MockUpstream::start(Reply::ok("ok")).await;
    let key = common::public_key_file();
    let proxy = RunningProxy::start(common::config(&upstream.origin(), &key)).await;
    let addr = proxy.addr;

    proxy.shutdown.trigger();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let res = common::client()
        .post(format!("http://{}/pay/request", addr))
        .json(&signed_body())
        .send()
        .await;
    assert!(res.is_err());
    assert_eq!(upstream.calls(), 0);
}
