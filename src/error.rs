// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AutoclaimError {
    // Missing/invalid required configuration. Fatal before any work begins.
    #[error("invalid configuration: {0}")]
    Config(String),
    // Transient provider failure, recovered by retry
    #[error("rpc error: {0}")]
    Rpc(String),
    // A nil/absent block response. Treated the same as a fetch error by callers.
    #[error("block {0} not found")]
    BlockNotFound(u64),
    #[error("claim submission failed: {0}")]
    ClaimSubmission(String),
    #[error("checkpoint store error: {0}")]
    Checkpoint(String),
}

pub type AutoclaimResult<T> = Result<T, AutoclaimError>;
