//! Tandem Benchmark
//!
//! Measures the hot paths of a room: awareness merges, document updates
//! through a session, and concurrent presence writers sharing one store.
//!
//! Run with: cargo run --example benchmark --release

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tandem_awareness::{Awareness, Origin};
use tandem_core::{Document, DocumentId, Value};
use tandem_protocol::create_update_message;
use tandem_session::{Room, Session};
use tokio::sync::Barrier;

/// Benchmark configuration
struct BenchConfig {
    /// Number of concurrent writers
    clients: usize,
    /// Operations per writer
    ops_per_client: usize,
}

/// Benchmark results
#[derive(Debug)]
struct BenchResults {
    name: String,
    total_ops: u64,
    duration: Duration,
    successful: u64,
    failed: u64,
    ops_per_sec: f64,
    avg_latency_us: f64,
}

impl BenchResults {
    fn new(name: &str, successful: u64, failed: u64, duration: Duration, latency_ns: u64) -> Self {
        let total_ops = successful + failed;
        Self {
            name: name.to_string(),
            total_ops,
            duration,
            successful,
            failed,
            ops_per_sec: total_ops as f64 / duration.as_secs_f64(),
            avg_latency_us: if successful > 0 {
                latency_ns as f64 / successful as f64 / 1000.0
            } else {
                0.0
            },
        }
    }

    fn print(&self) {
        println!("\n╔══════════════════════════════════════════════════════════╗");
        println!("║  {} ", self.name);
        println!("╠══════════════════════════════════════════════════════════╣");
        println!("║  Total operations:    {:>10}                         ║", self.total_ops);
        println!("║  Successful:          {:>10}                         ║", self.successful);
        println!("║  Failed:              {:>10}                         ║", self.failed);
        println!("║  Duration:            {:>10.2?}                       ║", self.duration);
        println!("║  Throughput:          {:>10.0} ops/sec                ║", self.ops_per_sec);
        println!("║  Avg latency:         {:>10.0} µs                     ║", self.avg_latency_us);
        println!("╚══════════════════════════════════════════════════════════╝");
    }
}

/// Benchmark: merging remote awareness updates into one store
fn bench_awareness_merge(config: &BenchConfig) -> Result<BenchResults> {
    let total = (config.clients * config.ops_per_client) as u64;

    // Pre-encode one update per remote write
    let mut remotes: Vec<Awareness> = (0..config.clients as u64)
        .map(|id| Awareness::new(id + 100))
        .collect();
    let mut updates = Vec::with_capacity(total as usize);
    for i in 0..config.ops_per_client {
        for remote in remotes.iter_mut() {
            let state = Value::from_json(&format!(r#"{{"cursor":{}}}"#, i))?;
            remote.set_local_state(Some(state));
            updates.push(remote.encode_awareness_update(&[remote.client_id()])?);
        }
    }

    let mut local = Awareness::new(1);
    let (mut successful, mut failed, mut latency) = (0u64, 0u64, 0u64);
    let start = Instant::now();
    for update in &updates {
        let op = Instant::now();
        match local.apply_awareness_update(update, Origin::peer("bench")) {
            Ok(_) => {
                successful += 1;
                latency += op.elapsed().as_nanos() as u64;
            }
            Err(_) => failed += 1,
        }
    }

    Ok(BenchResults::new(
        "Awareness merge",
        successful,
        failed,
        start.elapsed(),
        latency,
    ))
}

/// Benchmark: document updates processed by a session
async fn bench_session_updates(config: &BenchConfig) -> Result<BenchResults> {
    let id = DocumentId::new("bench:doc")?;
    let source = Document::with_client_id(id.clone(), 1);
    let room = Arc::new(Room::with_document("bench", Document::with_client_id(id, 2)));
    let mut session = Session::new("source", room);

    let messages: Vec<Vec<u8>> = (0..config.ops_per_client)
        .map(|i| source.replace_text(&format!("revision {}", i)))
        .map(|update| update.map(|u| create_update_message(&u)))
        .collect::<std::result::Result<_, _>>()?;

    let (mut successful, mut failed, mut latency) = (0u64, 0u64, 0u64);
    let start = Instant::now();
    for message in &messages {
        let op = Instant::now();
        match session.process(message) {
            Ok(_) => {
                successful += 1;
                latency += op.elapsed().as_nanos() as u64;
            }
            Err(_) => failed += 1,
        }
    }

    Ok(BenchResults::new(
        "Session document updates",
        successful,
        failed,
        start.elapsed(),
        latency,
    ))
}

/// Benchmark: concurrent local writers on a shared store
async fn bench_shared_writers(config: &BenchConfig) -> BenchResults {
    let awareness = Awareness::new(1).into_shared();
    awareness.lock().set_local_state(Some(Value::object()));
    let barrier = Arc::new(Barrier::new(config.clients));
    let successful = Arc::new(AtomicU64::new(0));
    let total_latency_ns = Arc::new(AtomicU64::new(0));

    let mut handles = vec![];
    let start = Instant::now();

    for client in 0..config.clients {
        let ops = config.ops_per_client;
        let awareness = awareness.clone();
        let barrier = barrier.clone();
        let successful = successful.clone();
        let total_latency = total_latency_ns.clone();

        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            for i in 0..ops {
                let op = Instant::now();
                awareness
                    .lock()
                    .set_local_state_field(&format!("writers.w{}", client), Value::from(i as i64))
                    .ok();
                total_latency.fetch_add(op.elapsed().as_nanos() as u64, Ordering::Relaxed);
                successful.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }

    let successful = successful.load(Ordering::Relaxed);
    let expected = (config.clients * config.ops_per_client) as u64;
    BenchResults::new(
        "Shared store writers",
        successful,
        expected.saturating_sub(successful),
        start.elapsed(),
        total_latency_ns.load(Ordering::Relaxed),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let config = BenchConfig {
        clients: 10,
        ops_per_client: 1000,
    };

    println!("Tandem Benchmark");
    println!("Clients: {}, ops per client: {}", config.clients, config.ops_per_client);

    bench_awareness_merge(&config)?.print();
    bench_session_updates(&config).await?.print();
    bench_shared_writers(&config).await.print();

    Ok(())
}
