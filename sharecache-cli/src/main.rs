//! ShareCache CLI.
//!
//! Boots an in-process coordinator and demonstrates the shared cache: one
//! producer memoizes a slow computation while several reader clients block
//! on the same key and all receive the settled value.

use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use sharecache::{
    CacheError, CacheWrite, ClientConfig, Coordinator, CoordinatorConfig, SharedCache,
};

#[derive(Parser)]
#[command(name = "sharecache", about = "Shared cache coordinator demo", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a demonstration workload against an in-process coordinator.
    Demo {
        /// Number of reader clients sharing the memoized computation.
        #[arg(long, default_value_t = 4)]
        readers: usize,

        /// Simulated computation time in milliseconds.
        #[arg(long, default_value_t = 250)]
        compute_ms: u64,

        /// Reader deadline in milliseconds.
        #[arg(long, default_value_t = 3_000)]
        timeout_ms: u64,
    },
}

#[tokio::main]
async fn main() {
    sharecache::telemetry::init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Demo {
            readers,
            compute_ms,
            timeout_ms,
        } => demo(readers, compute_ms, timeout_ms).await,
    };

    if let Err(e) = result {
        eprintln!("demo failed: {e}");
        std::process::exit(1);
    }
}

async fn demo(readers: usize, compute_ms: u64, timeout_ms: u64) -> Result<(), CacheError> {
    let (coordinator, handle) = Coordinator::new(CoordinatorConfig::default());
    let shutdown = CancellationToken::new();
    tokio::spawn(coordinator.run(shutdown.clone()));

    let producer = SharedCache::connect(&handle, "demo").await?;
    info!(compute_ms, "Producer memoizing a slow computation");
    producer
        .set(
            "answer",
            CacheWrite::deferred(async move {
                tokio::time::sleep(Duration::from_millis(compute_ms)).await;
                Ok(json!({"answer": 42, "compute_ms": compute_ms}))
            }),
        )
        .await?;

    let client_config =
        ClientConfig::default().with_get_timeout(Duration::from_millis(timeout_ms));
    let mut reads = Vec::with_capacity(readers);
    for n in 0..readers {
        let reader =
            SharedCache::connect_with(&handle, "demo", client_config.clone()).await?;
        reads.push(tokio::spawn(async move {
            let value = reader.get("answer").await;
            (n, value)
        }));
    }

    for read in reads {
        match read.await {
            Ok((n, Ok(value))) => println!("reader {n}: {value}"),
            Ok((n, Err(e))) => println!("reader {n}: failed: {e}"),
            Err(_) => println!("reader task panicked"),
        }
    }

    println!("coordinator: {}", handle.metrics());

    producer.disconnect();
    shutdown.cancel();
    Ok(())
}
