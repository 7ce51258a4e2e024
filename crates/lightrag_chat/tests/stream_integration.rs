//! Integration tests for the streamed query: request shape, NDJSON decoding
//! over real HTTP, callback ordering and failure routing.
//! Uses wiremock and raw in-process TCP servers for transport-level chunking.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lightrag_chat::{
    AuthStore, Callbacks, QueryClient, QueryError, QueryObserver, Resolver, ServerInfo,
    StaticContext,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(base: &str) -> QueryClient {
    let resolver = Resolver::new(Arc::new(StaticContext::from_href("http://localhost:3000/")))
        .base_url(Some(base));
    QueryClient::new(resolver, AuthStore::new())
}

fn free_port() -> u16 {
    let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    l.local_addr().unwrap().port()
}

#[derive(Debug, PartialEq)]
enum Event {
    Delta(String),
    Complete,
    Error(Option<u16>),
}

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    error_messages: Vec<String>,
}

impl QueryObserver for Recorder {
    fn on_delta(&mut self, delta: &str) {
        self.events.push(Event::Delta(delta.to_string()));
    }

    fn on_complete(&mut self) {
        self.events.push(Event::Complete);
    }

    fn on_error(&mut self, error: QueryError) {
        self.events.push(Event::Error(error.status()));
        self.error_messages.push(error.to_string());
    }
}

fn delta(s: &str) -> Event {
    Event::Delta(s.to_string())
}

// ---------------------------------------------------------------------------
// Raw chunked HTTP server
// ---------------------------------------------------------------------------

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one request (head plus Content-Length body) and return it as text.
async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    loop {
        let n = sock.read(&mut tmp).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(end) = find(&buf, b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let len = head
                .lines()
                .find_map(|l| {
                    let (k, v) = l.split_once(':')?;
                    if k.eq_ignore_ascii_case("content-length") {
                        v.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn chunk(data: &str) -> Vec<u8> {
    format!("{:x}\r\n{}\r\n", data.len(), data).into_bytes()
}

/// Serve one request with the given body chunks, flushed separately. When
/// `finish` is false the socket is dropped without the terminating chunk.
async fn spawn_chunked_server(
    chunks: Vec<&'static str>,
    finish: bool,
) -> (String, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (mut sock, _) = listener.accept().await.unwrap();
        let request = read_request(&mut sock).await;
        let head = concat!(
            "HTTP/1.1 200 OK\r\n",
            "content-type: application/x-ndjson\r\n",
            "transfer-encoding: chunked\r\n\r\n",
        );
        sock.write_all(head.as_bytes()).await.unwrap();
        for c in chunks {
            sock.write_all(&chunk(c)).await.unwrap();
            sock.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
        if finish {
            sock.write_all(b"0\r\n\r\n").await.unwrap();
            sock.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        request
    });
    (format!("http://{}", addr), handle)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn streams_deltas_in_order_then_completes() {
    let server = MockServer::start().await;
    let body = concat!(
        "{\"references\":[{\"file\":\"a.md\"}]}\n",
        "{\"response\":\"He\"}\n",
        "\n",
        "   \n",
        "heartbeat\n",
        "{\"response\":\"llo\"}\n",
        "{\"response\":\" world\"}\n",
        "{\"response\":\"dangling\"}",
    );
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .and(header("accept", "application/x-ndjson"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({
            "query": "who wrote the genealogy?",
            "mode": "local",
            "stream": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut rec = Recorder::default();
    client.stream_query("who wrote the genealogy?", &mut rec).await;

    assert_eq!(
        rec.events,
        vec![delta("He"), delta("llo"), delta(" world"), Event::Complete]
    );
}

#[tokio::test]
async fn bearer_token_is_read_from_auth_store() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("{\"response\":\"ok\"}\n", "application/x-ndjson"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut rec = Recorder::default();
    client.stream_query("first", &mut rec).await;

    client.auth().login("secret-token", false, ServerInfo::default());
    let mut rec = Recorder::default();
    client.stream_query("second", &mut rec).await;
    assert_eq!(rec.events, vec![delta("ok"), Event::Complete]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].headers.get("authorization").is_none());
    assert_eq!(
        requests[1].headers.get("authorization").unwrap().to_str().unwrap(),
        "Bearer secret-token"
    );
}

#[tokio::test]
async fn status_500_yields_single_error_and_nothing_else() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(500).set_body_string("index not ready"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut rec = Recorder::default();
    client.stream_query("any question", &mut rec).await;

    assert_eq!(rec.events, vec![Event::Error(Some(500))]);
    let msg = &rec.error_messages[0];
    assert!(msg.contains("500"), "{msg}");
    assert!(msg.contains(&format!("{}/query/stream", server.uri())), "{msg}");
    assert!(msg.contains("index not ready"), "{msg}");
}

#[tokio::test]
async fn transport_chunks_splitting_records_are_reassembled() {
    let (base, server) = spawn_chunked_server(
        vec!["{\"response\":\"He\"}\n{\"resp", "onse\":\"llo\"}\n"],
        true,
    )
    .await;

    let client = client_for(&base);
    let mut rec = Recorder::default();
    client.stream_query("split me", &mut rec).await;

    assert_eq!(rec.events, vec![delta("He"), delta("llo"), Event::Complete]);
    let request = server.await.unwrap();
    assert!(request.starts_with("POST /query/stream "), "{request}");
    assert!(request.contains("\"mode\":\"local\""), "{request}");
}

#[tokio::test]
async fn connection_drop_mid_stream_yields_one_error() {
    let (base, _server) =
        spawn_chunked_server(vec!["{\"response\":\"He\"}\n{\"resp"], false).await;

    let client = client_for(&base);
    let mut rec = Recorder::default();
    client.stream_query("drop me", &mut rec).await;

    assert_eq!(rec.events, vec![delta("He"), Event::Error(None)]);
}

#[tokio::test]
async fn refused_connection_names_authority_and_remediation() {
    let port = free_port();
    let base = format!("http://127.0.0.1:{}", port);
    let client = client_for(&base);
    let mut rec = Recorder::default();
    client.stream_query("hello?", &mut rec).await;

    assert_eq!(rec.events, vec![Event::Error(None)]);
    let msg = &rec.error_messages[0];
    assert!(msg.contains(&base), "{msg}");
    assert!(msg.contains(&format!("port {}", port)), "{msg}");
    assert!(msg.contains("firewall"), "{msg}");
}

#[tokio::test]
async fn query_stream_ends_after_first_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let items: Vec<_> = client.query_stream("anything").collect().await;
    assert_eq!(items.len(), 1);
    assert!(matches!(
        &items[0],
        Err(QueryError::Status { status: 503, body, .. }) if body == "busy"
    ));
}

#[tokio::test]
async fn concurrent_queries_do_not_interfere() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .and(body_partial_json(json!({"query": "first question"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"response\":\"one\"}\n{\"response\":\"-1\"}\n",
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .and(body_partial_json(json!({"query": "second question"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "{\"response\":\"two\"}\n{\"response\":\"-2\"}\n",
            "application/x-ndjson",
        ))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut a = Recorder::default();
    let mut b = Recorder::default();
    tokio::join!(
        client.stream_query("first question", &mut a),
        client.stream_query("second question", &mut b),
    );

    assert_eq!(a.events, vec![delta("one"), delta("-1"), Event::Complete]);
    assert_eq!(b.events, vec![delta("two"), delta("-2"), Event::Complete]);
}

#[tokio::test]
async fn callbacks_without_error_handler_do_not_panic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/query/stream"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server.uri());
    let mut deltas = 0;
    let mut completed = false;
    {
        let mut cb = Callbacks::new(|_: &str| deltas += 1).with_complete(|| completed = true);
        client.stream_query("no handler", &mut cb).await;
    }
    assert_eq!(deltas, 0);
    assert!(!completed);
}
