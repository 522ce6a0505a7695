//! Run one consensus simulation and print the outcome.
//!
//! ```text
//! simulate [acceptors] [proposers] [seed]
//! ```
//!
//! Defaults to the reference topology (5 acceptors, 2 proposers, seed from
//! the clock). Set `RUST_LOG=synod=debug` to watch individual rounds.

use std::time::{SystemTime, UNIX_EPOCH};

use synod::{Cluster, ClusterConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = ClusterConfig {
        seed: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        ..ClusterConfig::default()
    };
    if let Some(n) = args.next().and_then(|s| s.parse().ok()) {
        config.acceptors = n;
    }
    if let Some(n) = args.next().and_then(|s| s.parse().ok()) {
        config.proposers = n;
    }
    if let Some(n) = args.next().and_then(|s| s.parse().ok()) {
        config.seed = n;
    }

    let cluster = Cluster::new(config)?;
    let report = cluster.run().await?;

    print!("{report}");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
