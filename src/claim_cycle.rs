// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic claim cycle.
//!
//! Each cycle atomically drains the accumulator, partitions the snapshot
//! into bounded batches, and submits one claim transaction per batch. The
//! drained checkpoint is persisted only after every batch of the cycle has
//! been accepted; a submission failure aborts the rest of the cycle and
//! returns the un-submitted addresses (failed batch included) to the
//! accumulator so the next cycle retries them.

use crate::accumulator::WithdrawalAccumulator;
use crate::checkpoint::CheckpointStore;
use crate::claimer::ClaimSubmitter;
use crate::error::AutoclaimResult;
use crate::metrics::AutoclaimMetrics;
use ethers::types::Address as EthAddress;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Split a drained address snapshot into batches of at most `batch_size`.
/// The final batch may be smaller; an empty snapshot yields no batches.
pub fn partition_batches(addresses: &[EthAddress], batch_size: usize) -> Vec<Vec<EthAddress>> {
    addresses
        .chunks(batch_size)
        .map(|chunk| chunk.to_vec())
        .collect()
}

pub struct ClaimBatcher<S, K> {
    submitter: Arc<S>,
    checkpoint_store: Arc<K>,
    accumulator: Arc<WithdrawalAccumulator>,
    metrics: Arc<AutoclaimMetrics>,
    batch_size: usize,
    // Serializes {drain -> submit -> persist}: one cycle is one logical
    // transaction as seen from outside.
    cycle_lock: Mutex<()>,
}

impl<S, K> ClaimBatcher<S, K>
where
    S: ClaimSubmitter,
    K: CheckpointStore,
{
    pub fn new(
        submitter: Arc<S>,
        checkpoint_store: Arc<K>,
        accumulator: Arc<WithdrawalAccumulator>,
        metrics: Arc<AutoclaimMetrics>,
        batch_size: usize,
    ) -> Self {
        Self {
            submitter,
            checkpoint_store,
            accumulator,
            metrics,
            batch_size,
            cycle_lock: Mutex::new(()),
        }
    }

    /// Run one claim cycle. Returns the number of batches submitted.
    ///
    /// A cycle with zero accumulated addresses is a successful no-op and
    /// still persists the checkpoint.
    pub async fn run_cycle(&self) -> AutoclaimResult<usize> {
        let _cycle = self.cycle_lock.lock().await;

        let (addresses, checkpoint) = self.accumulator.drain();
        let batches = partition_batches(&addresses, self.batch_size);
        info!(
            "claim cycle: {} addresses in {} batches",
            addresses.len(),
            batches.len()
        );

        for (i, batch) in batches.iter().enumerate() {
            match self.submitter.submit_claim(batch).await {
                Ok(tx_hash) => {
                    info!(
                        "claim batch {}/{} submitted: {} addresses, tx {:?}",
                        i + 1,
                        batches.len(),
                        batch.len(),
                        tx_hash
                    );
                    self.metrics.record_claimed(batch.len() as u64);
                    self.metrics.claim_batches_submitted.inc();
                }
                Err(e) => {
                    self.metrics.err_claim_submission.inc();
                    // keep the failed batch and everything after it
                    let unclaimed: Vec<EthAddress> =
                        batches[i..].iter().flatten().copied().collect();
                    let retained = unclaimed.len();
                    self.accumulator.restore(unclaimed);
                    error!(
                        "claim batch {}/{} failed: {}; {} addresses retained for the next cycle",
                        i + 1,
                        batches.len(),
                        e,
                        retained
                    );
                    return Err(e);
                }
            }
        }

        // The checkpoint tracks sync progress, not claim success. Persisting
        // the drain-time snapshot keeps the stored value at or behind true
        // progress; a failed write is retried next cycle.
        if let Err(e) = self.checkpoint_store.write(checkpoint) {
            warn!("can't persist checkpoint {}: {}", checkpoint, e);
        }
        self.metrics.commit();
        Ok(batches.len())
    }

    /// Run a claim cycle on a fixed interval until cancelled.
    pub fn spawn(self: Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("starting claim cycle timer");
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval fires immediately; the first claim should wait a full period
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("claim cycle timer cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_cycle().await {
                            error!("can't claim batches: {}", e);
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AutoclaimError;
    use async_trait::async_trait;
    use ethers::types::TxHash;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex as StdMutex;

    fn addr(n: u64) -> EthAddress {
        EthAddress::from_low_u64_be(n)
    }

    // Mock submitter: responses are scripted front-to-back; an empty script
    // means every submission succeeds.
    struct MockSubmitter {
        responses: StdMutex<VecDeque<AutoclaimResult<TxHash>>>,
        submitted: StdMutex<Vec<Vec<EthAddress>>>,
    }

    impl MockSubmitter {
        fn new() -> Self {
            Self {
                responses: StdMutex::new(VecDeque::new()),
                submitted: StdMutex::new(Vec::new()),
            }
        }

        fn script(self, responses: Vec<AutoclaimResult<TxHash>>) -> Self {
            *self.responses.lock().unwrap() = responses.into();
            self
        }

        fn submitted(&self) -> Vec<Vec<EthAddress>> {
            self.submitted.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ClaimSubmitter for MockSubmitter {
        async fn submit_claim(&self, addresses: &[EthAddress]) -> AutoclaimResult<TxHash> {
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(TxHash::zero()));
            if response.is_ok() {
                self.submitted.lock().unwrap().push(addresses.to_vec());
            }
            response
        }
    }

    struct MemoryCheckpointStore {
        value: StdMutex<Option<u64>>,
        fail_writes: bool,
    }

    impl MemoryCheckpointStore {
        fn new() -> Self {
            Self {
                value: StdMutex::new(None),
                fail_writes: false,
            }
        }

        fn failing() -> Self {
            Self {
                value: StdMutex::new(None),
                fail_writes: true,
            }
        }
    }

    impl CheckpointStore for MemoryCheckpointStore {
        fn read(&self) -> AutoclaimResult<Option<u64>> {
            Ok(*self.value.lock().unwrap())
        }

        fn write(&self, height: u64) -> AutoclaimResult<()> {
            if self.fail_writes {
                return Err(AutoclaimError::Checkpoint("disk full".to_string()));
            }
            *self.value.lock().unwrap() = Some(height);
            Ok(())
        }
    }

    fn new_batcher(
        submitter: Arc<MockSubmitter>,
        store: Arc<MemoryCheckpointStore>,
        accumulator: Arc<WithdrawalAccumulator>,
        batch_size: usize,
    ) -> ClaimBatcher<MockSubmitter, MemoryCheckpointStore> {
        let metrics = Arc::new(AutoclaimMetrics::new_for_testing());
        ClaimBatcher::new(submitter, store, accumulator, metrics, batch_size)
    }

    #[test]
    fn test_partition_sizes() {
        let addresses: Vec<EthAddress> = (0..2500).map(addr).collect();
        let batches = partition_batches(&addresses, 1000);
        let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
        assert_eq!(sizes, vec![1000, 1000, 500]);

        assert!(partition_batches(&[], 1000).is_empty());
        assert_eq!(partition_batches(&addresses[..1000], 1000).len(), 1);
    }

    #[test]
    fn test_partition_is_exact_and_disjoint() {
        let addresses: Vec<EthAddress> = (0..2500).map(addr).collect();
        let batches = partition_batches(&addresses, 1000);
        let flattened: Vec<EthAddress> = batches.into_iter().flatten().collect();
        assert_eq!(flattened.len(), 2500);
        let distinct: HashSet<EthAddress> = flattened.into_iter().collect();
        assert_eq!(distinct.len(), 2500);
    }

    #[tokio::test]
    async fn test_full_cycle_submits_persists_and_commits() {
        let submitter = Arc::new(MockSubmitter::new());
        let store = Arc::new(MemoryCheckpointStore::new());
        let accumulator = Arc::new(WithdrawalAccumulator::new(0));
        accumulator.insert_beneficiaries(42, (0..2500).map(addr));
        let batcher = new_batcher(submitter.clone(), store.clone(), accumulator.clone(), 1000);

        let batches = batcher.run_cycle().await.unwrap();
        assert_eq!(batches, 3);
        assert!(accumulator.is_empty());
        assert_eq!(store.read().unwrap(), Some(42));
        assert_eq!(batcher.metrics.withdrawals_claimed.get(), 2500);
        assert_eq!(batcher.metrics.claim_batches_submitted.get(), 3);

        // every drained address was submitted exactly once
        let submitted: Vec<EthAddress> = submitter.submitted().into_iter().flatten().collect();
        assert_eq!(submitted.len(), 2500);
        let distinct: HashSet<EthAddress> = submitted.into_iter().collect();
        assert_eq!(distinct.len(), 2500);
    }

    #[tokio::test]
    async fn test_empty_cycle_is_a_noop_that_persists() {
        let submitter = Arc::new(MockSubmitter::new());
        let store = Arc::new(MemoryCheckpointStore::new());
        let accumulator = Arc::new(WithdrawalAccumulator::new(1234));
        let batcher = new_batcher(submitter.clone(), store.clone(), accumulator, 1000);

        let batches = batcher.run_cycle().await.unwrap();
        assert_eq!(batches, 0);
        assert!(submitter.submitted().is_empty());
        assert_eq!(store.read().unwrap(), Some(1234));
    }

    #[tokio::test]
    async fn test_failed_batch_retains_unclaimed_addresses() {
        let submitter = Arc::new(MockSubmitter::new().script(vec![
            Ok(TxHash::zero()),
            Err(AutoclaimError::ClaimSubmission("nonce too low".to_string())),
        ]));
        let store = Arc::new(MemoryCheckpointStore::new());
        let accumulator = Arc::new(WithdrawalAccumulator::new(0));
        accumulator.insert_beneficiaries(10, (0..2500).map(addr));
        let batcher = new_batcher(submitter.clone(), store.clone(), accumulator.clone(), 1000);

        batcher.run_cycle().await.unwrap_err();

        // first batch went through; the failed batch and the final one are retained
        assert_eq!(accumulator.len(), 1500);
        // a failed cycle must not advance the persisted checkpoint
        assert_eq!(store.read().unwrap(), None);

        // the next cycle claims the remainder
        let batches = batcher.run_cycle().await.unwrap();
        assert_eq!(batches, 2);
        assert!(accumulator.is_empty());
        assert_eq!(store.read().unwrap(), Some(10));

        let submitted: Vec<EthAddress> = submitter.submitted().into_iter().flatten().collect();
        let distinct: HashSet<EthAddress> = submitted.iter().copied().collect();
        assert_eq!(submitted.len(), 2500, "no address claimed twice");
        assert_eq!(distinct.len(), 2500, "no address lost");
    }

    #[tokio::test]
    async fn test_checkpoint_write_failure_is_not_fatal() {
        let submitter = Arc::new(MockSubmitter::new());
        let store = Arc::new(MemoryCheckpointStore::failing());
        let accumulator = Arc::new(WithdrawalAccumulator::new(0));
        accumulator.insert_beneficiaries(5, [addr(1)]);
        let batcher = new_batcher(submitter, store, accumulator, 1000);

        // the cycle still succeeds; the write is retried next cycle
        assert_eq!(batcher.run_cycle().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_addresses_inserted_during_cycle_wait_for_the_next_one() {
        let submitter = Arc::new(MockSubmitter::new());
        let store = Arc::new(MemoryCheckpointStore::new());
        let accumulator = Arc::new(WithdrawalAccumulator::new(0));
        accumulator.insert_beneficiaries(1, [addr(1)]);
        let batcher = new_batcher(submitter.clone(), store, accumulator.clone(), 1000);

        batcher.run_cycle().await.unwrap();
        // observed after the drain
        accumulator.insert_beneficiaries(2, [addr(2)]);
        batcher.run_cycle().await.unwrap();

        let submitted = submitter.submitted();
        assert_eq!(submitted.len(), 2);
        assert_eq!(submitted[0], vec![addr(1)]);
        assert_eq!(submitted[1], vec![addr(2)]);
    }
}
