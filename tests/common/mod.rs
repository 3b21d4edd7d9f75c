#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use meshstream::errors::{Result, StreamError};
use meshstream::server::{Listener, ServerConfig};
use meshstream::source::TimestepSource;
use meshstream::types::{FileNaming, TimestepIndex};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// In-memory source that counts fetches per index and can be told to fail.
#[derive(Default)]
pub struct MockSource {
    delay: Duration,
    calls: Mutex<HashMap<TimestepIndex, usize>>,
    total: AtomicUsize,
    fail_always: Mutex<HashSet<TimestepIndex>>,
    fail_once: Mutex<HashSet<TimestepIndex>>,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(ms: u64) -> Self {
        Self { delay: Duration::from_millis(ms), ..Self::default() }
    }

    pub fn fail_always(&self, index: TimestepIndex) {
        self.fail_always.lock().insert(index);
    }

    pub fn fail_once(&self, index: TimestepIndex) {
        self.fail_once.lock().insert(index);
    }

    pub fn fetch_count(&self, index: TimestepIndex) -> usize {
        self.calls.lock().get(&index).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

pub fn payload(index: TimestepIndex) -> Bytes {
    Bytes::from(format!("timestep-{index}"))
}

#[async_trait]
impl TimestepSource for MockSource {
    async fn fetch(&self, index: TimestepIndex) -> Result<Bytes> {
        *self.calls.lock().entry(index).or_insert(0) += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_always.lock().contains(&index) || self.fail_once.lock().remove(&index) {
            return Err(StreamError::Transport(format!("injected failure for {index}")));
        }
        Ok(payload(index))
    }
}

/// Deterministic file contents of `len` bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Writes `count` snapshot files named by the default scheme; file `i` holds
/// `"<VTKFile index=i/>"` padded with its pattern to `len` bytes.
pub fn write_snapshots(dir: &Path, count: usize, len: usize) {
    let naming = FileNaming::default();
    for i in 0..count {
        let mut body = format!("<VTKFile index={i}/>").into_bytes();
        body.extend(pattern(len.saturating_sub(body.len())));
        std::fs::write(dir.join(naming.file_name(i)), body).unwrap();
    }
}

pub fn write_metadata(path: &Path, total: usize) {
    let json = serde_json::json!({
        "totalTimesteps": total,
        "timeStep": 0.5,
        "fields": ["pressure", "velocity"],
        "bounds": [0.0, 1.0, 0.0, 1.0, 0.0, 1.0]
    });
    std::fs::write(path, serde_json::to_vec(&json).unwrap()).unwrap();
}

/// Starts a server on a free port. Dropping the returned sender stops it.
pub async fn spawn_server(config: ServerConfig) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = Listener::bind(&ServerConfig { bind: SocketAddr::from(([127, 0, 0, 1], 0)), ..config })
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    tokio::spawn(listener.run_until(async move {
        let _ = stopped.await;
    }));
    (addr, stop)
}
