// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Read-side chain client.
//!
//! The sync pipeline only needs two queries: the current head height and the
//! withdrawal beneficiaries of one block. `ChainReader` is that boundary;
//! `EthClient` implements it over any ethers JSON-RPC transport.

use crate::error::{AutoclaimError, AutoclaimResult};
use async_trait::async_trait;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::Address as EthAddress;

#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
    async fn latest_block_number(&self) -> AutoclaimResult<u64>;

    /// Withdrawal beneficiary addresses of the block at `number`.
    ///
    /// A missing block is an error, never an empty success: the caller must
    /// be able to treat a nil response exactly like a failed fetch.
    async fn block_withdrawal_beneficiaries(&self, number: u64) -> AutoclaimResult<Vec<EthAddress>>;
}

pub struct EthClient<P> {
    provider: Provider<P>,
}

impl EthClient<Http> {
    pub fn new(provider_url: &str) -> AutoclaimResult<Self> {
        let provider = Provider::<Http>::try_from(provider_url)
            .map_err(|e| AutoclaimError::Config(format!("invalid rpc url: {}", e)))?;
        Ok(Self { provider })
    }

    pub fn provider(&self) -> Provider<Http> {
        self.provider.clone()
    }
}

impl<P> EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub async fn get_chain_id(&self) -> AutoclaimResult<u64> {
        let chain_id = self
            .provider
            .get_chainid()
            .await
            .map_err(|e| AutoclaimError::Rpc(format!("can't get chain id: {}", e)))?;
        Ok(chain_id.as_u64())
    }
}

#[async_trait]
impl<P> ChainReader for EthClient<P>
where
    P: JsonRpcClient + 'static,
{
    async fn latest_block_number(&self) -> AutoclaimResult<u64> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| AutoclaimError::Rpc(format!("can't get chain head: {}", e)))?;
        Ok(number.as_u64())
    }

    async fn block_withdrawal_beneficiaries(&self, number: u64) -> AutoclaimResult<Vec<EthAddress>> {
        let block = self
            .provider
            .get_block(number)
            .await
            .map_err(|e| AutoclaimError::Rpc(format!("get block by number error: {}", e)))?
            .ok_or(AutoclaimError::BlockNotFound(number))?;
        Ok(block
            .withdrawals
            .unwrap_or_default()
            .into_iter()
            .map(|w| w.address)
            .collect())
    }
}
