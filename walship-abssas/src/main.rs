use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use walship_abssas::ReplicaConfig;
use walship_common::{ListingIterator, ReplicaClient};

const USAGE: &str = "usage: walship-abssas [config.toml] <generations | snapshots <generation> | wal <generation>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config = if args.first().is_some_and(|a| a.ends_with(".toml")) {
        let path = PathBuf::from(args.remove(0));
        ReplicaConfig::load(&path)?
    } else {
        ReplicaConfig::from_env()?
    };
    let client = config.build_client()?;
    info!(
        container = %client.scope().container,
        path = %client.scope().path,
        "walship-abssas starting"
    );

    let ctx = CancellationToken::new();
    let shutdown = ctx.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling");
            shutdown.cancel();
        }
    });

    let command: Vec<&str> = args.iter().map(String::as_str).collect();
    match command.as_slice() {
        ["generations"] => {
            let mut generations = client.generations(&ctx).await?;
            generations.sort();
            for generation in generations {
                println!("{}", serde_json::to_string(&generation)?);
            }
        }
        ["snapshots", generation] => {
            let itr = client.snapshots(&ctx, generation).await?;
            print_all(itr).await?;
        }
        ["wal", generation] => {
            let itr = client.wal_segments(&ctx, generation).await?;
            print_all(itr).await?;
        }
        _ => bail!(USAGE),
    }

    if ctx.is_cancelled() {
        warn!("Listing cancelled before completion");
    }
    Ok(())
}

/// Print each entry as one JSON line as soon as it arrives.
async fn print_all<T: Serialize>(mut itr: ListingIterator<T>) -> anyhow::Result<()> {
    while itr.next().await {
        if let Some(entry) = itr.current() {
            println!("{}", serde_json::to_string(entry)?);
        }
    }
    itr.close().await.context("listing failed")
}
