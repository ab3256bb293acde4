//! Integration tests for the daemon stack over its socket.
//!
//! Builds the context from a config file with a replayed Wi-Fi source,
//! serves it on a temporary Unix socket and talks to it as a client would.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use geolocd::config::ConfigFile;
use geolocd::context::AppContext;
use geolocd::ipc::IpcServer;
use geolocd::service::LocationService;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Test Helpers
// =============================================================================

const WIFI_TRACE: &str = r#"{"latitude": 37.1, "longitude": -122.1, "horizontal": 25.0}
{"latitude": 37.1018, "longitude": -122.1, "horizontal": 25.0}
"#;

fn write_config(dir: &Path) -> ConfigFile {
    let trace = dir.join("wifi.jsonl");
    std::fs::write(&trace, WIFI_TRACE).unwrap();

    let mut config = ConfigFile::default();
    config.daemon.socket = dir.join("geolocd.sock");
    config.storage.last_position = Some(dir.join("last_position.json"));
    config.logging.file = dir.join("geolocd.log");
    config.plugins.wifi = Some(trace);
    config.plugins.replay_interval_ms = 10;

    // Go through the file so the parser sees what a user would write.
    let path = dir.join("config.ini");
    config.save_to(&path).unwrap();
    ConfigFile::load_from(&path).unwrap()
}

struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    async fn connect(path: &Path) -> Self {
        let stream = UnixStream::connect(path).await.unwrap();
        let (read, write) = stream.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    async fn send(&mut self, request: Value) {
        let mut line = request.to_string();
        line.push('\n');
        self.write.write_all(line.as_bytes()).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("reply timed out")
            .unwrap()
            .expect("connection closed");
        serde_json::from_str(&line).unwrap()
    }

    /// Next reply to request `id`, skipping stream replies to earlier ones.
    async fn recv_id(&mut self, id: u64) -> Value {
        loop {
            let reply = self.recv().await;
            if reply["id"] == id {
                return reply;
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_replayed_source_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());

    let context = Arc::new(AppContext::from_config(&config).unwrap());
    let service = Arc::new(LocationService::new(Arc::clone(&context)));
    let server = IpcServer::new(&config.daemon.socket, service);
    let listener = server.bind().await.unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.serve(listener, shutdown.clone()));

    let mut client = Client::connect(&config.daemon.socket).await;

    client
        .send(serde_json::json!({"id": 1, "method": "getCurrentPosition", "handler": "wifi"}))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["returnValue"], true);
    assert_eq!(reply["handler"], "wifi");
    assert_eq!(reply["latitude"], 37.1);
    assert_eq!(reply["horizAccuracy"], 25.0);

    client
        .send(serde_json::json!({"id": 2, "method": "getLastPosition", "handler": "wifi"}))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["latitude"], 37.1);

    client
        .send(serde_json::json!({"id": 3, "method": "getState", "handler": "wifi"}))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["available"], true);
    assert_eq!(reply["state"], "started");

    // No GPS source is configured.
    client
        .send(serde_json::json!({"id": 4, "method": "getCurrentPosition", "handler": "gps"}))
        .await;
    let reply = client.recv().await;
    assert_eq!(reply["id"], 4);
    assert_eq!(reply["returnValue"], false);
    assert_eq!(
        reply["errorCode"],
        geolocd::error::ErrorCode::NotAvailable.code()
    );

    shutdown.cancel();
    task.await.unwrap().unwrap();
    context.shutdown();
    assert!(!config.daemon.socket.exists());
}

#[tokio::test]
async fn test_criteria_stream_over_socket() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(temp_dir.path());

    let context = Arc::new(AppContext::from_config(&config).unwrap());
    let service = Arc::new(LocationService::new(Arc::clone(&context)));
    let server = IpcServer::new(&config.daemon.socket, service);
    let listener = server.bind().await.unwrap();
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(server.serve(listener, shutdown.clone()));

    let mut client = Client::connect(&config.daemon.socket).await;
    client
        .send(serde_json::json!({
            "id": 5,
            "method": "startTrackingCriteria",
            "accuracy": "fine",
            "power": "high"
        }))
        .await;

    // The trace alternates between two points about 200 m apart, so every
    // fix clears the default 100 m filter.
    let first = client.recv().await;
    let second = client.recv().await;
    assert_eq!(first["id"], 5);
    assert_eq!(first["returnValue"], true);
    assert_ne!(first["latitude"], second["latitude"]);

    client
        .send(serde_json::json!({"id": 6, "method": "stopTracking"}))
        .await;
    let reply = client.recv_id(6).await;
    assert_eq!(reply["returnValue"], true);

    client
        .send(serde_json::json!({"id": 7, "method": "stopTracking"}))
        .await;
    let reply = client.recv_id(7).await;
    assert_eq!(
        reply["errorCode"],
        geolocd::error::ErrorCode::NotStarted.code()
    );

    shutdown.cancel();
    task.await.unwrap().unwrap();
    context.shutdown();
}
