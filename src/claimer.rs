// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Claim transaction submission.
//!
//! `ClaimSubmitter` is the narrow boundary the claim cycle drives; the
//! production implementation signs `claimWithdrawals(address[])` calls
//! against the deposit contract.

use crate::error::{AutoclaimError, AutoclaimResult};
use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address as EthAddress, TxHash};
use std::sync::Arc;

abigen!(
    DepositContract,
    r#"[
        function claimWithdrawals(address[] addresses) external
    ]"#
);

pub type EthSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

#[async_trait]
pub trait ClaimSubmitter: Send + Sync + 'static {
    /// Submit one claim transaction for a batch of beneficiary addresses.
    /// Returns the transaction hash once the node has accepted it.
    async fn submit_claim(&self, addresses: &[EthAddress]) -> AutoclaimResult<TxHash>;
}

pub struct EthClaimSubmitter {
    contract: DepositContract<EthSigner>,
}

impl EthClaimSubmitter {
    pub fn new(
        provider: Provider<Http>,
        contract_address: EthAddress,
        private_key: &str,
        chain_id: u64,
    ) -> AutoclaimResult<Self> {
        let wallet = private_key
            .parse::<LocalWallet>()
            .map_err(|e| AutoclaimError::Config(format!("invalid private key: {}", e)))?
            .with_chain_id(chain_id);
        let signer = Arc::new(SignerMiddleware::new(provider, wallet));
        Ok(Self {
            contract: DepositContract::new(contract_address, signer),
        })
    }
}

#[async_trait]
impl ClaimSubmitter for EthClaimSubmitter {
    async fn submit_claim(&self, addresses: &[EthAddress]) -> AutoclaimResult<TxHash> {
        let call = self.contract.claim_withdrawals(addresses.to_vec());
        let pending = call
            .send()
            .await
            .map_err(|e| AutoclaimError::ClaimSubmission(format!("claim tx error: {}", e)))?;
        Ok(*pending)
    }
}
