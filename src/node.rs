// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Node wiring: builds the collaborators, runs the pipeline, and owns the
//! shutdown sequence.

use crate::accumulator::WithdrawalAccumulator;
use crate::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::claim_cycle::ClaimBatcher;
use crate::claimer::EthClaimSubmitter;
use crate::config::{AutoclaimConfig, RunMode};
use crate::eth_client::EthClient;
use crate::metrics::AutoclaimMetrics;
use crate::syncer::Syncer;
use anyhow::anyhow;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run the autoclaim pipeline until `cancel` fires (live mode) or until the
/// one-shot cycle completes (backfill mode).
///
/// Shutdown order: the head tracker and claim timer observe `cancel` and
/// stop starting new work; once they have been joined, the retry dispatcher
/// is cancelled last so heights parked by the final backfill still get a
/// dispatch window.
pub async fn run_autoclaim_node(
    config: AutoclaimConfig,
    registry: prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    config.validate()?;
    let metrics = Arc::new(AutoclaimMetrics::new(&registry));

    let checkpoint_store = Arc::new(FileCheckpointStore::new(&config.checkpoint_path));
    let last_synced = match checkpoint_store.read()? {
        Some(height) => height,
        None => config.genesis_block.ok_or_else(|| {
            anyhow!(
                "no checkpoint at {} and no genesis block configured",
                config.checkpoint_path.display()
            )
        })?,
    };
    info!("resuming from last synced block {}", last_synced);

    let eth_client = Arc::new(EthClient::new(config.rpc_url.as_str())?);
    let chain_id = eth_client.get_chain_id().await?;
    info!("connected to chain id {}", chain_id);
    let submitter = Arc::new(EthClaimSubmitter::new(
        eth_client.provider(),
        config.claim_contract_address,
        &config.private_key,
        chain_id,
    )?);

    let accumulator = Arc::new(WithdrawalAccumulator::new(last_synced));
    let (syncer, retry_rx) = Syncer::new(
        eth_client,
        accumulator.clone(),
        metrics.clone(),
        config.fetch_retry,
    );
    let syncer = Arc::new(syncer);
    let batcher = Arc::new(ClaimBatcher::new(
        submitter,
        checkpoint_store,
        accumulator,
        metrics,
        config.batch_size,
    ));

    // The retry dispatcher gets its own token so it can outlive the
    // foreground loops at shutdown.
    let retry_cancel = CancellationToken::new();
    let retry_handle = syncer.spawn_retry_dispatcher(retry_rx, retry_cancel.clone());

    // Catch up to the current head before any timer starts. A head query
    // failure here is fatal: without a head there is no starting point.
    syncer.sync_to_head().await?;
    info!("initial catch-up complete at block {}", syncer.checkpoint());

    match config.mode {
        RunMode::Backfill => {
            batcher.run_cycle().await?;
        }
        RunMode::Live => {
            let head_handle = syncer.spawn_head_tracker(config.head_interval, cancel.clone());
            let claim_handle = batcher.spawn(config.claim_interval, cancel.clone());
            head_handle
                .await
                .map_err(|e| anyhow!("head tracker task failed: {}", e))?;
            claim_handle
                .await
                .map_err(|e| anyhow!("claim cycle task failed: {}", e))?;
        }
    }

    retry_cancel.cancel();
    retry_handle
        .await
        .map_err(|e| anyhow!("retry dispatcher task failed: {}", e))?;
    info!("autoclaim node stopped");
    Ok(())
}
