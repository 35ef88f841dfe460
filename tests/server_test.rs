//! HTTP Server Integration Tests
//!
//! Starts the server on an OS-assigned port and drives it with reqwest.
//!
//! Test Coverage:
//! - Health check and metrics endpoints
//! - Synthetic and file uploads
//! - Parameter validation
//! - Status codes for unknown targets, methods and backend failures

use std::io::Write;
use std::net::SocketAddr;
use upload_bench::config::Config;
use upload_bench::server::Server;

/// Memory target plus a filesystem target whose root is a regular file,
/// so every upload to `broken` fails in the backend
fn test_config(broken_root: &std::path::Path) -> Config {
    let yaml = format!(
        r#"
server:
  address: "127.0.0.1:0"
upload:
  part_size: 1048576
  max_payload_mb: 8
targets:
  - name: memory
    backend:
      kind: memory
      min_part_size: 1048576
  - name: broken
    backend:
      kind: filesystem
      root: "{}"
      min_part_size: 1048576
"#,
        broken_root.display()
    );
    Config::from_yaml(&yaml).expect("test config is valid")
}

/// Start a server in the background and return its address
async fn start_server(config: Config) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let server = Server::new(config).await.expect("Failed to create server");
    let addr = server.local_addr();
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, handle)
}

async fn start_default_server() -> (SocketAddr, tokio::task::JoinHandle<()>, tempfile::NamedTempFile) {
    let broken_root = tempfile::NamedTempFile::new().unwrap();
    let (addr, handle) = start_server(test_config(broken_root.path())).await;
    (addr, handle, broken_root)
}

#[tokio::test]
async fn test_health_check() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
    handle.abort();
}

#[tokio::test]
async fn test_synthetic_upload() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!("http://{}/upload/memory?fileSizeMb=3", addr))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["parts"], 3);
    assert_eq!(body["bytes"], 3 * 1024 * 1024);
    assert!(body["summary"]
        .as_str()
        .unwrap()
        .starts_with("Sent 3 parts in "));
    assert!(body["key"]
        .as_str()
        .unwrap()
        .starts_with("storage-performance-test-file"));
    assert!(body["location"].as_str().unwrap().starts_with("memory://"));
    handle.abort();
}

#[tokio::test]
async fn test_file_upload_with_verify_and_cleanup() {
    let (addr, handle, _root) = start_default_server().await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![42u8; 1024 * 1024 + 512 * 1024]).unwrap();
    let file_name = file.path().to_string_lossy().into_owned();

    let response = reqwest::Client::new()
        .get(format!("http://{}/upload/memory", addr))
        .query(&[
            ("fileName", file_name.as_str()),
            ("verify", "true"),
            ("cleanup", "true"),
        ])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["parts"], 2);
    assert_eq!(body["bytes"], 1024 * 1024 + 512 * 1024);
    handle.abort();
}

#[tokio::test]
async fn test_consecutive_uploads_get_distinct_keys() {
    let (addr, handle, _root) = start_default_server().await;
    let url = format!("http://{}/upload/memory?fileSizeMb=1", addr);

    let first: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    let second: serde_json::Value = reqwest::get(&url).await.unwrap().json().await.unwrap();

    assert_ne!(first["key"], second["key"]);
    handle.abort();
}

#[tokio::test]
async fn test_parameter_errors() {
    let (addr, handle, _root) = start_default_server().await;

    for query in [
        "",
        "?fileName=/tmp/x&fileSizeMb=1",
        "?fileSizeMb=abc",
        "?fileSizeMb=0",
        "?fileSizeMb=9",
        "?fileSizeMb=1&verify=maybe",
    ] {
        let response = reqwest::get(format!("http://{}/upload/memory{}", addr, query))
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query {:?}", query);
    }
    handle.abort();
}

#[tokio::test]
async fn test_file_over_payload_limit_is_rejected() {
    let broken_root = tempfile::NamedTempFile::new().unwrap();
    let mut config = test_config(broken_root.path());
    config.upload.max_payload_mb = 1;
    let (addr, handle) = start_server(config).await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&vec![42u8; 1024 * 1024 + 1]).unwrap();
    let file_name = file.path().to_string_lossy().into_owned();

    let response = reqwest::Client::new()
        .get(format!("http://{}/upload/memory", addr))
        .query(&[("fileName", file_name.as_str())])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "invalid_parameter");
    handle.abort();
}

#[tokio::test]
async fn test_put_without_parameters_is_method_not_allowed() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::Client::new()
        .put(format!("http://{}/upload/memory", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    handle.abort();
}

#[tokio::test]
async fn test_missing_file_is_server_error() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!(
        "http://{}/upload/memory?fileName=/definitely/not/here.bin",
        addr
    ))
    .await
    .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "io");
    handle.abort();
}

#[tokio::test]
async fn test_unknown_target() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!("http://{}/upload/nowhere?fileSizeMb=1", addr))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    handle.abort();
}

#[tokio::test]
async fn test_unknown_path() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!("http://{}/download/memory", addr))
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    handle.abort();
}

#[tokio::test]
async fn test_wrong_method() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/upload/memory?fileSizeMb=1", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    handle.abort();
}

#[tokio::test]
async fn test_backend_failure_is_bad_gateway() {
    let (addr, handle, _root) = start_default_server().await;

    let response = reqwest::get(format!("http://{}/upload/broken?fileSizeMb=1", addr))
        .await
        .unwrap();

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "backend");
    handle.abort();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (addr, handle, _root) = start_default_server().await;

    reqwest::get(format!("http://{}/upload/memory?fileSizeMb=1", addr))
        .await
        .unwrap();
    let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();

    assert_eq!(response.status(), 200);
    let body = response.text().await.unwrap();
    assert!(body.contains("upload_bench_uploads_total"));
    assert!(body.contains("upload_bench_http_requests_total"));
    handle.abort();
}

#[tokio::test]
async fn test_metrics_disabled() {
    let broken_root = tempfile::NamedTempFile::new().unwrap();
    let mut config = test_config(broken_root.path());
    config.metrics.enabled = false;
    let (addr, handle) = start_server(config).await;

    let response = reqwest::get(format!("http://{}/metrics", addr)).await.unwrap();

    assert_eq!(response.status(), 404);
    handle.abort();
}
