//! Integration tests for the `plotline serve` HTTP API.
//!
//! Each test starts the server as a child process on a unique port, makes
//! HTTP requests, and verifies the responses.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

/// Atomic port counter to avoid port conflicts between parallel tests.
/// Base port is derived from process ID so parallel `cargo test --workspace`
/// runs (separate test binaries) don't collide on the same port range.
static NEXT_PORT: AtomicU16 = AtomicU16::new(0);
static PORT_INIT: std::sync::Once = std::sync::Once::new();

fn next_port() -> u16 {
    PORT_INIT.call_once(|| {
        let base = 21000 + (std::process::id() as u16 % 20000);
        NEXT_PORT.store(base, Ordering::SeqCst);
    });
    NEXT_PORT.fetch_add(1, Ordering::SeqCst)
}

/// A running server child process, killed on drop.
struct Server {
    child: Child,
    port: u16,
    // Keeps the seed file alive for the server's lifetime.
    _seed: Option<tempfile::NamedTempFile>,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Start `plotline serve` with optional seed fixtures and env vars.
fn start_server(seed_json: Option<&str>, env: &[(&str, &str)]) -> Server {
    let port = next_port();
    let seed = seed_json.map(|json| {
        let mut file = tempfile::NamedTempFile::new().expect("create seed file");
        file.write_all(json.as_bytes()).expect("write seed file");
        file
    });

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_plotline"));
    cmd.arg("serve").arg("--port").arg(port.to_string());
    if let Some(seed) = &seed {
        cmd.arg("--seed").arg(seed.path());
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    let child = cmd.spawn().expect("failed to start plotline serve");
    // Wait for the server to be ready by polling the port
    for _ in 0..50 {
        if TcpStream::connect(format!("127.0.0.1:{}", port)).is_ok() {
            return Server {
                child,
                port,
                _seed: seed,
            };
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    Server {
        child,
        port,
        _seed: seed,
    }
}

/// Make an HTTP request and return (status, body).
fn http_request(
    port: u16,
    method: &str,
    path: &str,
    body: Option<&str>,
    headers: &[(&str, &str)],
) -> (u16, String) {
    let mut stream = TcpStream::connect(format!("127.0.0.1:{}", port)).expect("failed to connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();

    let mut header_lines = String::new();
    for (name, value) in headers {
        header_lines.push_str(&format!("{}: {}\r\n", name, value));
    }
    let body = body.unwrap_or("");
    if !body.is_empty() {
        header_lines.push_str("Content-Type: application/json\r\n");
    }
    header_lines.push_str(&format!("Content-Length: {}\r\n", body.len()));

    let request = format!(
        "{} {} HTTP/1.1\r\nHost: localhost:{}\r\n{}Connection: close\r\n\r\n{}",
        method, path, port, header_lines, body
    );
    stream.write_all(request.as_bytes()).expect("failed to write");

    let mut response = String::new();
    let _ = stream.read_to_string(&mut response);
    parse_http_response(&response)
}

fn http_get(port: u16, path: &str) -> (u16, String) {
    http_request(port, "GET", path, None, &[])
}

fn http_post(port: u16, path: &str, body: &str) -> (u16, String) {
    http_request(port, "POST", path, Some(body), &[])
}

/// Parse an HTTP response into (status_code, body).
fn parse_http_response(response: &str) -> (u16, String) {
    let parts: Vec<&str> = response.splitn(2, "\r\n\r\n").collect();
    let headers = parts.first().unwrap_or(&"");
    let body = parts.get(1).unwrap_or(&"").to_string();

    let status = headers
        .lines()
        .next()
        .unwrap_or("")
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    (status, body)
}

fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or(serde_json::Value::Null)
}

const BEATS_SEED: &str = r#"{
  "beats": [
    {"id": "b1", "title": "Dragon attacks", "summary": "fire", "arc_id": "a1"},
    {"id": "b2", "title": "Quiet morning", "summary": "the dragon sleeps", "arc_id": "a1"},
    {"id": "b3", "title": "Journey begins", "summary": "on the road", "arc_id": null},
    {"id": "b4", "title": "Council meets", "summary": "politics", "arc_id": "a2"}
  ]
}"#;

#[test]
fn health_reports_ok() {
    let server = start_server(None, &[]);
    let (status, body) = http_get(server.port, "/health");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["status"], "ok");
}

#[test]
fn missing_and_invalid_bearer_are_a_uniform_401() {
    let server = start_server(None, &[("PLOTLINE_API_KEY", "secret")]);

    // /health stays exempt for load balancer checks.
    let (status, _) = http_get(server.port, "/health");
    assert_eq!(status, 200);

    let (status, body) = http_get(server.port, "/collections/beats/b1");
    assert_eq!(status, 401);
    assert_eq!(json(&body)["error"], "authentication required");

    let (status, _) = http_request(
        server.port,
        "GET",
        "/collections/beats/b1",
        None,
        &[("Authorization", "Bearer wrong")],
    );
    assert_eq!(status, 401);

    let (status, _) = http_request(
        server.port,
        "GET",
        "/collections/beats/b1",
        None,
        &[("Authorization", "Bearer secret")],
    );
    assert_eq!(status, 404); // authenticated; the row just does not exist
}

#[test]
fn crud_round_trip() {
    let server = start_server(None, &[]);

    let (status, body) = http_post(server.port, "/collections/beats", r#"{"title": "X"}"#);
    assert_eq!(status, 201);
    let id = json(&body)["id"].as_str().expect("created id").to_string();

    let (status, body) = http_get(server.port, &format!("/collections/beats/{}", id));
    assert_eq!(status, 200);
    assert_eq!(json(&body)["title"], "X");

    let upsert = format!(r#"{{"values": {{"id": "{}", "title": "Y"}}}}"#, id);
    let (status, body) = http_request(server.port, "PUT", "/collections/beats", Some(&upsert), &[]);
    assert_eq!(status, 200);
    assert_eq!(json(&body)["title"], "Y");

    let (status, body) = http_get(server.port, &format!("/collections/beats/{}", id));
    assert_eq!(status, 200);
    assert_eq!(json(&body)["title"], "Y");

    let (status, _) = http_request(
        server.port,
        "DELETE",
        &format!("/collections/beats/{}", id),
        None,
        &[],
    );
    assert_eq!(status, 200);

    let (status, _) = http_get(server.port, &format!("/collections/beats/{}", id));
    assert_eq!(status, 404);
}

#[test]
fn query_searches_filters_and_paginates() {
    let server = start_server(Some(BEATS_SEED), &[]);

    // OR'd search across title and summary.
    let (status, body) = http_post(
        server.port,
        "/collections/beats/query",
        r#"{"search": "dragon", "search_columns": ["title", "summary"], "order_by": "id"}"#,
    );
    assert_eq!(status, 200);
    let parsed = json(&body);
    assert_eq!(parsed["total"], 2);
    assert_eq!(parsed["rows"][1]["id"], "b2");

    // A null filter value means "is null".
    let (status, body) = http_post(
        server.port,
        "/collections/beats/query",
        r#"{"filters": {"arc_id": null}}"#,
    );
    assert_eq!(status, 200);
    let parsed = json(&body);
    assert_eq!(parsed["total"], 1);
    assert_eq!(parsed["rows"][0]["id"], "b3");

    // A page past the end is empty but keeps the true total.
    let (status, body) = http_post(
        server.port,
        "/collections/beats/query",
        r#"{"page": 9, "page_size": 10}"#,
    );
    assert_eq!(status, 200);
    let parsed = json(&body);
    assert_eq!(parsed["rows"].as_array().map(Vec::len), Some(0));
    assert_eq!(parsed["total"], 4);
}

#[test]
fn workflow_create_validates_and_dispatch_chains() {
    let server = start_server(None, &[]);

    // Missing assistant name is a 400.
    let (status, body) = http_post(
        server.port,
        "/workflows",
        r#"{"narrative_project_id": "p1"}"#,
    );
    assert_eq!(status, 400);
    assert!(json(&body)["error"]
        .as_str()
        .unwrap()
        .contains("wf_assistant_name"));

    let (status, body) = http_post(
        server.port,
        "/workflows",
        r#"{"wf_assistant_name": "outline-bot", "narrative_project_id": "p1"}"#,
    );
    assert_eq!(status, 201);
    let id = json(&body)["id"].as_str().expect("workflow id").to_string();

    // One bounded step per dispatch; elapsed is HH:MM:SS.mmm.
    let (status, body) =
        http_post(server.port, &format!("/workflows/{}/dispatch", id), "");
    assert_eq!(status, 200);
    let outcome = json(&body);
    assert_eq!(outcome["outcome"], "Complete");
    let elapsed = outcome["elapsed"].as_str().unwrap();
    assert_eq!(elapsed.len(), 12);
    assert_eq!(&elapsed[2..3], ":");
    assert_eq!(&elapsed[8..9], ".");

    let (_, body) = http_get(
        server.port,
        &format!("/collections/automation_controls/{}", id),
    );
    assert_eq!(json(&body)["status"], "Prep Prompt");

    // Drive the record to completion, then confirm re-dispatch is a no-op.
    for _ in 0..7 {
        http_post(server.port, &format!("/workflows/{}/dispatch", id), "");
    }
    let (_, body) = http_get(
        server.port,
        &format!("/collections/automation_controls/{}", id),
    );
    assert_eq!(json(&body)["status"], "Complete");

    let (status, body) =
        http_post(server.port, &format!("/workflows/{}/dispatch", id), "");
    assert_eq!(status, 200);
    assert_eq!(json(&body)["message"], "workflow already complete");

    // Unknown record id is a 404.
    let (status, _) = http_post(server.port, "/workflows/nope/dispatch", "");
    assert_eq!(status, 404);
}

#[test]
fn unrecognized_workflow_status_is_a_logged_no_op() {
    let seed = r#"{
      "automation_controls": [
        {"id": "w1", "narrative_project_id": "p1", "wf_assistant_name": "outline-bot", "status": "Bogus"}
      ]
    }"#;
    let server = start_server(Some(seed), &[]);

    let (status, body) = http_post(server.port, "/workflows/w1/dispatch", "");
    assert_eq!(status, 200);
    assert!(json(&body)["message"].as_str().unwrap().contains("Bogus"));

    // The record is untouched and stalls until corrected.
    let (_, body) = http_get(server.port, "/collections/automation_controls/w1");
    assert_eq!(json(&body)["status"], "Bogus");
}
