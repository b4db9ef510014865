// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, IntCounter, IntGauge,
    Registry,
};
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for the autoclaim pipeline.
///
/// The per-cycle counters accumulate between claim cycles and are flushed
/// into the exported prometheus series by `commit()` at the end of each
/// fully successful cycle.
#[derive(Debug)]
pub struct AutoclaimMetrics {
    /// Cumulative number of withdrawal addresses claimed on chain.
    pub(crate) withdrawals_claimed: IntCounter,
    /// Number of unique withdrawal addresses observed during the last claim cycle.
    pub(crate) withdrawal_addresses: IntGauge,
    pub(crate) claim_batches_submitted: IntCounter,
    pub(crate) err_claim_submission: IntCounter,
    pub(crate) last_synced_block: IntGauge,
    pub(crate) retry_queue_enqueued: IntCounter,

    claimed_this_cycle: AtomicU64,
    observed_this_cycle: AtomicU64,
}

impl AutoclaimMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            withdrawals_claimed: register_int_counter_with_registry!(
                "autoclaim_withdrawals_claimed",
                "Total number of withdrawal addresses claimed",
                registry,
            )
            .unwrap(),
            withdrawal_addresses: register_int_gauge_with_registry!(
                "autoclaim_withdrawal_addresses",
                "Number of unique withdrawal addresses processed on the last claim cycle",
                registry,
            )
            .unwrap(),
            claim_batches_submitted: register_int_counter_with_registry!(
                "autoclaim_claim_batches_submitted",
                "Total number of claim transactions submitted",
                registry,
            )
            .unwrap(),
            err_claim_submission: register_int_counter_with_registry!(
                "autoclaim_err_claim_submission",
                "Total number of failed claim transaction submissions",
                registry,
            )
            .unwrap(),
            last_synced_block: register_int_gauge_with_registry!(
                "autoclaim_last_synced_block",
                "Highest block height known to be fully processed",
                registry,
            )
            .unwrap(),
            retry_queue_enqueued: register_int_counter_with_registry!(
                "autoclaim_retry_queue_enqueued",
                "Total number of block heights parked for retry after a failed fetch",
                registry,
            )
            .unwrap(),
            claimed_this_cycle: AtomicU64::new(0),
            observed_this_cycle: AtomicU64::new(0),
        }
    }

    pub fn record_claimed(&self, n: u64) {
        self.claimed_this_cycle.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_observed(&self, n: u64) {
        self.observed_this_cycle.fetch_add(n, Ordering::Relaxed);
    }

    /// Flush the per-cycle counters into the exported series and reset them.
    pub fn commit(&self) {
        let claimed = self.claimed_this_cycle.swap(0, Ordering::Relaxed);
        self.withdrawals_claimed.inc_by(claimed);

        let observed = self.observed_this_cycle.swap(0, Ordering::Relaxed);
        self.withdrawal_addresses.set(observed as i64);
    }

    #[cfg(test)]
    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new())
    }
}
