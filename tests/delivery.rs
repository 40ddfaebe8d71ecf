//! Delivery Integration Tests
//!
//! Runs sweeps against a one-shot HTTP collector on localhost and checks
//! which clips survive in the outbox.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use replayd::adapters::{CollectorClient, CollectorConfig};
use replayd::delivery::{ClipQueue, DeliveryQueue, DirectoryQueue, SweepOutcome};
use replayd::domain::ClipRecord;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

const SECRET: &str = "kiosk-secret";

/// Accept `requests` connections, answer each with `status` and `body`,
/// and hand back the raw requests
async fn collector(
    requests: usize,
    status: &'static str,
    body: &'static str,
) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/upload", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut seen = Vec::new();
        for _ in 0..requests {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;

            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            seen.push(request);
        }
        seen
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        let Some(header_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..header_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            });
        let done = match content_length {
            Some(len) => buf.len() >= header_end + 4 + len,
            // Chunked multipart ends with the closing boundary and a zero chunk
            None => text.ends_with("0\r\n\r\n"),
        };
        if done {
            break;
        }
    }

    String::from_utf8_lossy(&buf).to_string()
}

async fn outbox_with(temp: &TempDir, clips: &[(u32, i64)]) -> Arc<DirectoryQueue> {
    let queue = DirectoryQueue::open(temp.path().join("outbox")).await.unwrap();
    for &(channel_id, ms) in clips {
        let created_at = Utc.timestamp_millis_opt(ms).single().unwrap();
        let record = ClipRecord {
            channel_id,
            created_at,
            file_name: format!("replay_cam{}_{}.mp4", channel_id, ms),
        };
        let staged = queue.stage(&record.file_name).await.unwrap();
        tokio::fs::write(&staged, b"\x00\x00\x00\x18ftypmp42").await.unwrap();
        queue.enqueue(&staged, record).await.unwrap();
    }
    Arc::new(queue)
}

fn client(url: String) -> Arc<CollectorClient> {
    Arc::new(
        CollectorClient::new(CollectorConfig {
            url,
            secret: SECRET.to_string(),
            timeout_seconds: Some(5),
        })
        .unwrap(),
    )
}

#[tokio::test]
async fn test_acknowledged_clip_is_removed() {
    let temp = TempDir::new().unwrap();
    let queue = outbox_with(&temp, &[(9, 1_700_000_000_000)]).await;
    let (url, server) = collector(1, "200 OK", r#"{"message":"ok"}"#).await;

    let delivery = DeliveryQueue::new(queue.clone(), client(url));
    let outcome = delivery.sweep().await;

    assert_eq!(outcome, SweepOutcome::Completed { delivered: 1 });
    assert!(!temp
        .path()
        .join("outbox/replay_cam9_1700000000000.mp4")
        .exists());
    assert!(queue.list_pending().await.unwrap().is_empty());

    let requests = server.await.unwrap();
    let request = &requests[0];
    assert!(request.starts_with("POST /upload"));
    assert!(request.contains("name=\"camId\"\r\n\r\n9\r\n"));
    assert!(request.contains(&format!("name=\"secret\"\r\n\r\n{}\r\n", SECRET)));
    assert!(request.contains("filename=\"replay_cam9_1700000000000.mp4\""));
    assert!(request.contains("Content-Type: video/mp4"));
}

#[tokio::test]
async fn test_rejected_upload_keeps_clip() {
    let temp = TempDir::new().unwrap();
    let queue = outbox_with(&temp, &[(13, 1_000), (13, 2_000)]).await;
    let (url, server) = collector(1, "500 Internal Server Error", r#"{"error":"disk full"}"#).await;

    let delivery = DeliveryQueue::new(queue.clone(), client(url));
    let outcome = delivery.sweep().await;

    match outcome {
        SweepOutcome::Aborted {
            delivered,
            failed,
            error,
        } => {
            assert_eq!(delivered, 0);
            assert!(failed.ends_with("replay_cam13_1000.mp4"));
            assert!(error.contains("500"));
        }
        other => panic!("expected abort, got {:?}", other),
    }
    assert_eq!(queue.list_pending().await.unwrap().len(), 2);

    // Only the first clip was tried
    assert_eq!(server.await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unparseable_acknowledgment_keeps_clip() {
    let temp = TempDir::new().unwrap();
    let queue = outbox_with(&temp, &[(9, 1_000)]).await;
    let (url, server) = collector(1, "200 OK", "not json").await;

    let delivery = DeliveryQueue::new(queue.clone(), client(url));

    assert!(matches!(delivery.sweep().await, SweepOutcome::Aborted { .. }));
    assert_eq!(queue.list_pending().await.unwrap().len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn test_unreachable_collector_keeps_clip_until_next_sweep() {
    let temp = TempDir::new().unwrap();
    let queue = outbox_with(&temp, &[(9, 1_000)]).await;

    // Reserve a port, then free it so nothing is listening there
    let closed = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        format!("http://{}/upload", listener.local_addr().unwrap())
    };
    let offline = DeliveryQueue::new(queue.clone(), client(closed));

    assert!(matches!(offline.sweep().await, SweepOutcome::Aborted { .. }));
    assert!(temp.path().join("outbox/replay_cam9_1000.mp4").exists());

    let (url, server) = collector(1, "200 OK", r#"{"message":"stored"}"#).await;
    let online = DeliveryQueue::new(queue.clone(), client(url));

    assert_eq!(online.sweep().await, SweepOutcome::Completed { delivered: 1 });
    assert!(queue.list_pending().await.unwrap().is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn test_sweep_delivers_oldest_first() {
    let temp = TempDir::new().unwrap();
    let queue = outbox_with(&temp, &[(13, 3_000), (9, 1_000), (9, 2_000)]).await;
    let (url, server) = collector(3, "200 OK", r#"{"message":"ok"}"#).await;

    let delivery = DeliveryQueue::new(queue.clone(), client(url));

    assert_eq!(delivery.sweep().await, SweepOutcome::Completed { delivered: 3 });

    let requests = server.await.unwrap();
    let names: Vec<&str> = requests
        .iter()
        .map(|r| {
            let start = r.find("filename=\"").unwrap() + "filename=\"".len();
            let end = r[start..].find('"').unwrap();
            &r[start..start + end]
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "replay_cam9_1000.mp4",
            "replay_cam9_2000.mp4",
            "replay_cam13_3000.mp4"
        ]
    );
}
