//! SSE Streaming Integration Tests
//!
//! Runs producers, broker and HTTP server on a real socket and reads the
//! `/status` stream with an HTTP client.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use pi_monitor::{
    AppState, EventBroker, HttpServer, MetricKind, MetricSource, ProducerConfig, ProducerSet,
    ServerError, SharedBroker, SourceError,
};

/// Canned `vcgencmd` / `free` output.
struct StubSource;

#[async_trait]
impl MetricSource for StubSource {
    async fn read(&self, kind: MetricKind) -> Result<String, SourceError> {
        let raw = match kind {
            MetricKind::Temp => "temp=42.8'C\n",
            MetricKind::Clock => "frequency(45)=1500000000\n",
            MetricKind::Volt => "volt=1.2000V\n",
            MetricKind::Mem => {
                "              total        used        free      shared  buff/cache   available\n\
                 Mem:          976Mi       312Mi       200Mi        12Mi       463Mi       596Mi\n\
                 Swap:          99Mi          0B        99Mi\n"
            }
            MetricKind::Observers => return Err(SourceError::NoCommand(kind)),
        };
        Ok(raw.to_string())
    }
}

struct Running {
    addr: SocketAddr,
    broker: SharedBroker,
    cancel: CancellationToken,
    producers: ProducerSet,
    server: JoinHandle<Result<(), ServerError>>,
}

async fn start() -> Running {
    let broker = Arc::new(EventBroker::with_defaults());
    let cancel = CancellationToken::new();
    let source: Arc<dyn MetricSource> = Arc::new(StubSource);

    let config = ProducerConfig {
        interval: Duration::from_millis(50),
        observers_eager: false,
    };
    let producers = ProducerSet::spawn(&source, &broker, config, &cancel);

    let state = Arc::new(AppState::new(
        "test-0.0.1".to_string(),
        Arc::clone(&broker),
        producers.states(),
        cancel.clone(),
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let static_dir = std::env::temp_dir();
    let server = HttpServer::new(addr.to_string(), static_dir, state, cancel.clone());
    let server = tokio::spawn(server.serve(listener));

    Running {
        addr,
        broker,
        cancel,
        producers,
        server,
    }
}

type Body = BoxStream<'static, reqwest::Result<Vec<u8>>>;

/// Reads whole SSE frames (terminated by a blank line) from a response body.
struct FrameReader {
    body: Body,
    buffer: String,
}

impl FrameReader {
    async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buffer.find("\n\n") {
                let frame = self.buffer[..end + 2].to_string();
                self.buffer.drain(..end + 2);
                return Some(frame);
            }
            let chunk = self.body.next().await?.ok()?;
            self.buffer.push_str(std::str::from_utf8(&chunk).unwrap());
        }
    }
}

async fn connect(addr: SocketAddr) -> FrameReader {
    let response = reqwest::get(format!("http://{addr}/status")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    FrameReader {
        body: response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())).boxed(),
        buffer: String::new(),
    }
}

fn parse(frame: &str) -> (String, String) {
    let mut lines = frame.trim_end_matches('\n').lines();
    let kind = lines.next().unwrap().strip_prefix("event: ").unwrap();
    let data = lines.next().unwrap().strip_prefix("data: ").unwrap();
    (kind.to_string(), data.to_string())
}

async fn wait_for_subscribers(broker: &SharedBroker, expected: usize) {
    timeout(Duration::from_secs(2), async {
        while broker.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn frames_match_wire_format() {
    let running = start().await;
    let mut reader = connect(running.addr).await;

    let frame = timeout(Duration::from_secs(2), async {
        loop {
            let frame = reader.next_frame().await.unwrap();
            if frame.starts_with("event: temp\n") {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(frame, "event: temp\ndata: 42.8 °C\n\n");

    running.cancel.cancel();
    running.producers.join().await;
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn remaining_client_keeps_receiving_after_other_disconnects() {
    let running = start().await;

    let mut leaving = connect(running.addr).await;
    let mut staying = connect(running.addr).await;
    wait_for_subscribers(&running.broker, 2).await;

    let first = timeout(Duration::from_secs(2), leaving.next_frame())
        .await
        .unwrap();
    assert!(first.is_some());
    drop(leaving);
    wait_for_subscribers(&running.broker, 1).await;

    let mut latest: HashMap<String, String> = HashMap::new();
    timeout(Duration::from_secs(3), async {
        while latest.len() < MetricKind::ALL.len() || latest["observers"] != "1 person here" {
            let frame = staying.next_frame().await.unwrap();
            let (kind, data) = parse(&frame);
            latest.insert(kind, data);
        }
    })
    .await
    .unwrap();

    assert_eq!(latest["temp"], "42.8 °C");
    assert_eq!(latest["clock"], "1.50 GHz");
    assert_eq!(latest["volt"], "1.2000 V");
    assert_eq!(latest["mem"], "312Mi / 976Mi");
    assert_eq!(latest["observers"], "1 person here");

    running.cancel.cancel();
    running.producers.join().await;
    running.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let running = start().await;
    let mut reader = connect(running.addr).await;
    wait_for_subscribers(&running.broker, 1).await;

    running.cancel.cancel();

    let ended = timeout(Duration::from_secs(3), async {
        while reader.next_frame().await.is_some() {}
    })
    .await;
    assert!(ended.is_ok());

    timeout(Duration::from_secs(3), running.server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    running.producers.join().await;
    assert_eq!(running.broker.subscriber_count(), 0);
}
