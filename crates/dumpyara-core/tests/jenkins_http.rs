//! `JenkinsClient` against a local HTTP stub.
//!
//! The stub answers each connection with the next scripted response and
//! records the request head, so status handling and the wire details of
//! every call can be checked without a Jenkins server.

use std::sync::{Arc, Mutex};

use dumpyara_core::request::{parse_url, DEFAULT_JOB};
use dumpyara_core::{BridgeError, BuildRequest, BuildServer, JenkinsClient, JenkinsConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// `base64("bot:token")`
const BASIC_AUTH: &str = "authorization: basic ym90onrva2vu";

struct Stub {
    base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Stub {
    /// Serve `responses` in order, one per connection.
    async fn start(responses: Vec<(&'static str, &'static str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            for (status, body) in responses {
                let (mut socket, _) = listener.accept().await.unwrap();

                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = socket.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    head.extend_from_slice(&buf[..n]);
                }
                seen.lock()
                    .unwrap()
                    .push(String::from_utf8_lossy(&head).to_lowercase());

                let reply = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                socket.write_all(reply.as_bytes()).await.unwrap();
                socket.shutdown().await.ok();
            }
        });

        Stub { base, requests }
    }

    fn client(&self) -> JenkinsClient {
        let config = JenkinsConfig::new(parse_url(&self.base).unwrap(), "bot", "token");
        JenkinsClient::new(config).unwrap()
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn request() -> BuildRequest {
    BuildRequest::new("http://example.com/a.zip", true, false, false).unwrap()
}

// ── list_builds ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_list_builds_sends_tree_and_credentials() {
    let body = r#"{"allBuilds": [{"number": 3, "result": "SUCCESS", "actions": []}]}"#;
    let stub = Stub::start(vec![("200 OK", body)]).await;

    let builds = stub.client().list_builds(DEFAULT_JOB).await.unwrap();

    assert_eq!(builds.len(), 1);
    assert_eq!(builds[0].number, 3);

    let requests = stub.requests();
    let head = &requests[0];
    assert!(head.starts_with("get /job/dumpyara/api/json?tree=allbuilds%5bnumber%2cresult"));
    assert!(head.contains(BASIC_AUTH));
}

#[tokio::test]
async fn test_list_builds_rejects_non_success() {
    for status in ["404 Not Found", "500 Internal Server Error", "304 Not Modified"] {
        let stub = Stub::start(vec![(status, "")]).await;

        let err = stub.client().list_builds(DEFAULT_JOB).await.unwrap_err();

        assert!(
            matches!(err, BridgeError::UpstreamUnavailable(_)),
            "{}: {:?}",
            status,
            err
        );
    }
}

#[tokio::test]
async fn test_list_builds_rejects_malformed_body() {
    let stub = Stub::start(vec![("200 OK", "<html>login</html>")]).await;

    let err = stub.client().list_builds(DEFAULT_JOB).await.unwrap_err();

    assert!(matches!(err, BridgeError::UpstreamUnavailable(_)));
}

// ── trigger_build ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_trigger_posts_parameters() {
    let stub = Stub::start(vec![("201 Created", "")]).await;

    stub.client()
        .trigger_build(DEFAULT_JOB, &request())
        .await
        .unwrap();

    let requests = stub.requests();
    let head = &requests[0];
    assert!(head.starts_with("post /job/dumpyara/buildwithparameters?"));
    assert!(head.contains("url=http%3a%2f%2fexample.com%2fa.zip"));
    assert!(head.contains("use_alt_dumper=true"));
    assert!(head.contains("add_blacklist=false"));
    assert!(head.contains(BASIC_AUTH));
}

#[tokio::test]
async fn test_trigger_rejects_unfollowed_redirects() {
    for status in ["302 Found", "304 Not Modified"] {
        let stub = Stub::start(vec![(status, "")]).await;

        let result = stub.client().trigger_build(DEFAULT_JOB, &request()).await;

        assert!(
            matches!(result, Err(BridgeError::UpstreamUnavailable(_))),
            "{}: {:?}",
            status,
            result
        );
    }
}

#[tokio::test]
async fn test_trigger_rejects_server_errors() {
    let stub = Stub::start(vec![("403 Forbidden", "")]).await;

    let result = stub.client().trigger_build(DEFAULT_JOB, &request()).await;

    assert!(matches!(result, Err(BridgeError::UpstreamUnavailable(_))));
}

// ── stop_build / cancel_queue_item ────────────────────────────────────────

#[tokio::test]
async fn test_stop_build_returns_raw_status() {
    for (status, code) in [("200 OK", 200), ("404 Not Found", 404), ("500 Server Error", 500)] {
        let stub = Stub::start(vec![(status, "")]).await;

        let answered = stub.client().stop_build(DEFAULT_JOB, 42).await.unwrap();

        assert_eq!(answered, code);
        assert!(stub.requests()[0].starts_with("post /job/dumpyara/42/stop "));
    }
}

#[tokio::test]
async fn test_cancel_queue_item_returns_raw_status() {
    for (status, code) in [("204 No Content", 204), ("404 Not Found", 404)] {
        let stub = Stub::start(vec![(status, "")]).await;

        let answered = stub.client().cancel_queue_item(42).await.unwrap();

        assert_eq!(answered, code);
        let requests = stub.requests();
        assert!(requests[0].starts_with("post /queue/cancelitem?id=42 "));
        assert!(requests[0].contains(BASIC_AUTH));
    }
}

#[tokio::test]
async fn test_unreachable_server_is_upstream_unavailable() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let config = JenkinsConfig::new(parse_url(&base).unwrap(), "bot", "token");
    let client = JenkinsClient::new(config).unwrap();

    let err = client.stop_build(DEFAULT_JOB, 1).await.unwrap_err();
    assert!(matches!(err, BridgeError::UpstreamUnavailable(_)));
}
