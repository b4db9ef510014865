// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Shared accumulator for withdrawal beneficiary addresses.
//!
//! All cross-task mutation in the pipeline goes through this type: backfill
//! shards and retried block workers insert addresses and raise the sync
//! checkpoint, the claim cycle drains the set. One mutex covers every
//! operation so that a drain is atomic with respect to concurrent inserts:
//! an address observed "during" a drain lands in the next cycle, never in
//! two cycles and never nowhere.

use ethers::types::Address as EthAddress;
use std::collections::HashSet;
use std::sync::Mutex;

#[derive(Debug)]
struct Inner {
    addresses: HashSet<EthAddress>,
    // Highest block known to be fully processed. Never regresses.
    last_synced: u64,
}

#[derive(Debug)]
pub struct WithdrawalAccumulator {
    inner: Mutex<Inner>,
}

impl WithdrawalAccumulator {
    pub fn new(last_synced: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                addresses: HashSet::new(),
                last_synced,
            }),
        }
    }

    /// Insert every beneficiary of a fully processed block and raise the
    /// checkpoint to that block's height. Returns the number of addresses
    /// that were not already present.
    pub fn insert_beneficiaries(
        &self,
        block_number: u64,
        beneficiaries: impl IntoIterator<Item = EthAddress>,
    ) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let mut inserted = 0;
        for addr in beneficiaries {
            if inner.addresses.insert(addr) {
                inserted += 1;
            }
        }
        if block_number > inner.last_synced {
            inner.last_synced = block_number;
        }
        inserted
    }

    /// Raise the checkpoint without inserting anything. Heights may complete
    /// out of order (retries interleave with live heights), so this is
    /// compare-and-set-to-max, not an overwrite.
    pub fn raise_checkpoint(&self, block_number: u64) {
        let mut inner = self.inner.lock().unwrap();
        if block_number > inner.last_synced {
            inner.last_synced = block_number;
        }
    }

    pub fn checkpoint(&self) -> u64 {
        self.inner.lock().unwrap().last_synced
    }

    /// Atomically swap the accumulated set for a fresh empty one, returning
    /// the snapshot together with the checkpoint as of the swap.
    pub fn drain(&self) -> (Vec<EthAddress>, u64) {
        let mut inner = self.inner.lock().unwrap();
        let addresses = std::mem::take(&mut inner.addresses);
        (addresses.into_iter().collect(), inner.last_synced)
    }

    /// Put addresses back after a failed claim cycle so they are retried on
    /// the next drain. Re-deduplicates against anything inserted since.
    pub fn restore(&self, addresses: impl IntoIterator<Item = EthAddress>) {
        let mut inner = self.inner.lock().unwrap();
        inner.addresses.extend(addresses);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(n: u64) -> EthAddress {
        EthAddress::from_low_u64_be(n)
    }

    #[test]
    fn test_insert_deduplicates() {
        let acc = WithdrawalAccumulator::new(0);
        assert_eq!(acc.insert_beneficiaries(10, [addr(1), addr(2), addr(1)]), 2);
        assert_eq!(acc.insert_beneficiaries(11, [addr(2), addr(3)]), 1);
        assert_eq!(acc.len(), 3);
    }

    #[test]
    fn test_checkpoint_never_regresses() {
        let acc = WithdrawalAccumulator::new(100);
        acc.insert_beneficiaries(50, [addr(1)]);
        assert_eq!(acc.checkpoint(), 100);
        acc.raise_checkpoint(150);
        assert_eq!(acc.checkpoint(), 150);
        // late-arriving retry for a low height
        acc.raise_checkpoint(120);
        assert_eq!(acc.checkpoint(), 150);
    }

    #[test]
    fn test_drain_swaps_atomically() {
        let acc = WithdrawalAccumulator::new(0);
        acc.insert_beneficiaries(1, [addr(1), addr(2)]);
        let (drained, checkpoint) = acc.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(checkpoint, 1);
        assert!(acc.is_empty());
        // inserts after the drain belong to the next cycle only
        acc.insert_beneficiaries(2, [addr(1)]);
        assert_eq!(acc.len(), 1);
    }

    #[test]
    fn test_restore_rededuplicates() {
        let acc = WithdrawalAccumulator::new(0);
        acc.insert_beneficiaries(1, [addr(1), addr(2)]);
        let (drained, _) = acc.drain();
        // a concurrent worker re-observes addr(1) before the restore
        acc.insert_beneficiaries(2, [addr(1)]);
        acc.restore(drained);
        let (next, _) = acc.drain();
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts_and_raises() {
        let acc = Arc::new(WithdrawalAccumulator::new(0));
        let mut handles = Vec::new();
        for t in 0..8u64 {
            let acc = acc.clone();
            handles.push(std::thread::spawn(move || {
                for i in 0..100u64 {
                    // every thread inserts the same 100 addresses
                    acc.insert_beneficiaries(t * 100 + i, [addr(i)]);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(acc.len(), 100);
        // max height inserted by any thread
        assert_eq!(acc.checkpoint(), 7 * 100 + 99);
    }
}
