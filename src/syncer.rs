// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Withdrawal sync pipeline.
//!
//! Three cooperating pieces, all driven through one `Syncer`:
//! - block workers (`process_block`) fetch a single height, feed the
//!   accumulator, and park the height on the retry queue on failure;
//! - the parallel backfill scheduler (`backfill`) sweeps a height range
//!   with `BACKFILL_SHARDS` concurrent sequential streams;
//! - the head tracker polls the chain head on a timer and backfills from
//!   the current checkpoint.
//!
//! The retry queue is unbounded and untimed: a height that keeps failing is
//! re-dispatched on every dequeue until it succeeds or the process stops.

use crate::accumulator::WithdrawalAccumulator;
use crate::error::AutoclaimResult;
use crate::eth_client::ChainReader;
use crate::metrics::AutoclaimMetrics;
use crate::retry_with_max_elapsed_time;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Number of concurrent shard streams used by a backfill sweep.
pub const BACKFILL_SHARDS: u64 = 3;

pub struct Syncer<C> {
    chain: Arc<C>,
    accumulator: Arc<WithdrawalAccumulator>,
    metrics: Arc<AutoclaimMetrics>,
    retry_tx: mpsc::UnboundedSender<u64>,
    fetch_retry: Duration,
}

impl<C> Syncer<C>
where
    C: ChainReader,
{
    /// Returns the syncer together with the retry queue receiver, which must
    /// be handed to `spawn_retry_dispatcher`.
    pub fn new(
        chain: Arc<C>,
        accumulator: Arc<WithdrawalAccumulator>,
        metrics: Arc<AutoclaimMetrics>,
        fetch_retry: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<u64>) {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        (
            Self {
                chain,
                accumulator,
                metrics,
                retry_tx,
                fetch_retry,
            },
            retry_rx,
        )
    }

    /// Fetch one block and feed its withdrawal beneficiaries to the
    /// accumulator. A fetch that still fails after the capped backoff window
    /// is parked on the retry queue; no shared state is touched for it.
    pub async fn process_block(&self, number: u64) {
        let result = retry_with_max_elapsed_time!(
            self.chain.block_withdrawal_beneficiaries(number),
            self.fetch_retry
        );
        match result {
            Ok(Ok(beneficiaries)) => {
                let observed = beneficiaries.len() as u64;
                self.accumulator.insert_beneficiaries(number, beneficiaries);
                self.metrics.record_observed(observed);
                self.metrics
                    .last_synced_block
                    .set(self.accumulator.checkpoint() as i64);
                debug!("synced block: {}", number);
            }
            _ => {
                warn!("block {} fetch failed, parking for retry", number);
                self.metrics.retry_queue_enqueued.inc();
                if self.retry_tx.send(number).is_err() {
                    error!("retry queue closed, block {} will be re-synced from the checkpoint after restart", number);
                }
            }
        }
    }

    /// Sweep `[start, end]` (inclusive) with `BACKFILL_SHARDS` contiguous,
    /// non-overlapping shard streams and wait for every stream to finish its
    /// sub-range. `end < start` performs no work.
    ///
    /// Completion covers the initial linear sweep only: heights whose fetch
    /// failed are parked on the retry queue and reprocessed asynchronously
    /// by the retry dispatcher after this call has returned. That trades a
    /// strict completion guarantee for liveness under a flaky RPC endpoint.
    pub async fn backfill(self: &Arc<Self>, start: u64, end: u64) {
        if end < start {
            debug!("nothing to backfill: {} < {}", end, start);
            return;
        }
        let total = end - start + 1;
        let shards = BACKFILL_SHARDS.min(total);
        let portion = total / shards;

        let mut handles = Vec::new();
        for j in 0..shards {
            let shard_start = start + j * portion;
            // the last shard absorbs the remainder
            let shard_end = if j == shards - 1 {
                end
            } else {
                shard_start + portion - 1
            };
            let syncer = self.clone();
            handles.push(tokio::spawn(async move {
                info!("syncing blocks {} --> {}", shard_start, shard_end);
                for number in shard_start..=shard_end {
                    syncer.process_block(number).await;
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("backfill shard panicked: {}", e);
            }
        }
    }

    pub fn checkpoint(&self) -> u64 {
        self.accumulator.checkpoint()
    }

    /// Backfill from the checkpoint to the current chain head.
    pub async fn sync_to_head(self: &Arc<Self>) -> AutoclaimResult<()> {
        let checkpoint = self.accumulator.checkpoint();
        let head = self.chain.latest_block_number().await?;
        self.backfill(checkpoint + 1, head).await;
        Ok(())
    }

    /// Re-dispatch every height parked on the retry queue until cancelled.
    ///
    /// This is the last task to stop at shutdown so that heights enqueued by
    /// still-running backfill shards get a final dispatch window.
    pub fn spawn_retry_dispatcher(
        self: &Arc<Self>,
        mut retry_rx: mpsc::UnboundedReceiver<u64>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let syncer = self.clone();
        tokio::spawn(async move {
            info!("starting retry dispatcher");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("retry dispatcher cancelled");
                        break;
                    }
                    maybe_number = retry_rx.recv() => {
                        match maybe_number {
                            Some(number) => {
                                let syncer = syncer.clone();
                                tokio::spawn(async move {
                                    syncer.process_block(number).await;
                                });
                            }
                            None => break,
                        }
                    }
                }
            }
        })
    }

    /// Poll the chain head on a fixed interval and backfill `(checkpoint,
    /// head]` each tick. A failed head query is logged and the tick skipped.
    pub fn spawn_head_tracker(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let syncer = self.clone();
        tokio::spawn(async move {
            info!("starting head tracker");
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the initial catch-up already ran; skip the immediate first tick
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("head tracker cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        info!("lastSynced: {}", syncer.accumulator.checkpoint());
                        if let Err(e) = syncer.sync_to_head().await {
                            warn!("can't get head: {}", e);
                        }
                    }
                }
            }
        })
    }
}
