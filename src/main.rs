// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use ethers::types::Address as EthAddress;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;
use withdrawal_autoclaim::config::{AutoclaimConfig, RunMode};
use withdrawal_autoclaim::node::run_autoclaim_node;
use withdrawal_autoclaim::server::start_metrics_server;

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    /// Rpc url of the chain fullnode, used for queries and claim transactions.
    #[clap(env, long)]
    rpc_url: Url,
    /// Address of the deposit contract exposing claimWithdrawals().
    #[clap(env = "DEPOSIT_CONTRACT_ADDRESS", long)]
    claim_contract_address: EthAddress,
    /// Hex-encoded private key used to sign claim transactions.
    #[clap(env = "PRIVATE_KEY", long)]
    private_key: String,
    #[clap(env, long, value_enum, default_value = "live")]
    mode: RunMode,
    /// Maximum addresses per claim transaction. Defaults to 1000 in live
    /// mode and 100 in backfill mode.
    #[clap(env = "BATCH_SIZE", long)]
    batch_size: Option<usize>,
    /// Starting block height when no checkpoint has been persisted yet.
    #[clap(env, long)]
    genesis_block: Option<u64>,
    #[clap(env, long, default_value = "60")]
    head_interval_secs: u64,
    #[clap(env, long, default_value = "3600")]
    claim_interval_secs: u64,
    /// Backoff cap for a single block fetch before it is parked for retry.
    #[clap(env, long, default_value = "30")]
    fetch_retry_secs: u64,
    #[clap(env, long, default_value = "./checkpoint/last_synced.txt")]
    checkpoint_path: PathBuf,
    #[clap(env, long, default_value = "0.0.0.0:9090")]
    metrics_address: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    let config = AutoclaimConfig {
        rpc_url: args.rpc_url,
        claim_contract_address: args.claim_contract_address,
        private_key: args.private_key,
        mode: args.mode,
        batch_size: args
            .batch_size
            .unwrap_or_else(|| AutoclaimConfig::default_batch_size(args.mode)),
        genesis_block: args.genesis_block,
        head_interval: Duration::from_secs(args.head_interval_secs),
        claim_interval: Duration::from_secs(args.claim_interval_secs),
        fetch_retry: Duration::from_secs(args.fetch_retry_secs),
        checkpoint_path: args.checkpoint_path,
        metrics_address: args.metrics_address,
    };

    let registry = prometheus::Registry::new();
    // runs for the whole process lifetime; torn down with the process
    let _metrics_server = start_metrics_server(config.metrics_address, registry.clone());

    let cancel = CancellationToken::new();
    let mut node = tokio::spawn(run_autoclaim_node(config, registry, cancel.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            cancel.cancel();
            node.await??;
        }
        result = &mut node => {
            result??;
        }
    }
    Ok(())
}
