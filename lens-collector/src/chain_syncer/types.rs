// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Chain access capability used by the block window scheduler

use ethers::types::{Address, Log, H256};

/// Log and height queries against the chain the Lens contracts live on
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync {
    /// Get the current chain height
    async fn get_block_number(&self) -> SyncResult<u64>;

    /// Get logs emitted by `addresses` with a first topic in `topics`,
    /// in the inclusive range `[from_block, to_block]`
    async fn get_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<Log>>;
}

/// Error type for sync operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Undecodable log: {0}")]
    Decode(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    /// Whether this error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Rpc(_) | SyncError::Timeout(_))
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

/// Inclusive block range processed as one reconciliation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        assert!(SyncError::Rpc("connection reset".into()).is_recoverable());
        assert!(SyncError::Timeout("eth_getLogs".into()).is_recoverable());
        assert!(!SyncError::Decode("bad data".into()).is_recoverable());
        assert!(!SyncError::Other("x".into()).is_recoverable());
    }

    #[test]
    fn test_block_range_display() {
        let range = BlockRange {
            from: 1000,
            to: 1002,
        };
        assert_eq!(range.to_string(), "[1000, 1002]");
    }
}
