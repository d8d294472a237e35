//! Runs one cluster node on stdin/stdout.
//!
//! ```bash
//! maelstrom test -w txn-rw-register --bin target/release/node -- --workload txn
//! ```
//!
//! Logs go to stderr; set `RUST_LOG=debug` to see retries and replication.

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};

use dist_primitives::{cli::Cli, handlers::build_router, runtime::serve};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Cli::parse().into_config();
    info!(workload = ?config.workload, backend = ?config.log_backend, "starting node");

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    if let Err(err) = serve(stdin, stdout, |node| build_router(&config, node)).await {
        warn!("node exited with error: {err:?}");
        return Err(err);
    }
    Ok(())
}
