// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{AutoclaimError, AutoclaimResult};
use clap::ValueEnum;
use ethers::signers::LocalWallet;
use ethers::types::Address as EthAddress;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default claim batch size in live operation.
pub const DEFAULT_LIVE_BATCH_SIZE: usize = 1000;
/// Default claim batch size for a one-shot historical backfill.
pub const DEFAULT_BACKFILL_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Catch up to the head, then keep tracking it and claiming on a timer.
    Live,
    /// Catch up to the head, run a single claim cycle, exit.
    Backfill,
}

/// Validated runtime configuration.
///
/// Every required input is checked here, at startup. A missing or invalid
/// value is a fatal configuration error, never a runtime surprise.
#[derive(Debug, Clone)]
pub struct AutoclaimConfig {
    pub rpc_url: Url,
    pub claim_contract_address: EthAddress,
    pub private_key: String,
    pub mode: RunMode,
    pub batch_size: usize,
    /// Starting height when no checkpoint has ever been persisted.
    pub genesis_block: Option<u64>,
    pub head_interval: Duration,
    pub claim_interval: Duration,
    /// Backoff cap for a single block fetch before the height is parked on
    /// the retry queue.
    pub fetch_retry: Duration,
    pub checkpoint_path: PathBuf,
    pub metrics_address: SocketAddr,
}

impl AutoclaimConfig {
    pub fn validate(&self) -> AutoclaimResult<()> {
        if self.claim_contract_address == EthAddress::zero() {
            return Err(AutoclaimError::Config(
                "no claim contract address provided".to_string(),
            ));
        }
        if self.private_key.is_empty() {
            return Err(AutoclaimError::Config("no private key provided".to_string()));
        }
        self.private_key
            .parse::<LocalWallet>()
            .map_err(|e| AutoclaimError::Config(format!("invalid private key: {}", e)))?;
        if self.batch_size == 0 {
            return Err(AutoclaimError::Config(
                "batch size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The batch size used when the operator did not configure one.
    pub fn default_batch_size(mode: RunMode) -> usize {
        match mode {
            RunMode::Live => DEFAULT_LIVE_BATCH_SIZE,
            RunMode::Backfill => DEFAULT_BACKFILL_BATCH_SIZE,
        }
    }
}
