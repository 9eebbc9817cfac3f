// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::types::{ChainRpc, SyncError, SyncResult};
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{Address, Filter, Log, H256};
use tap::TapFallible;

/// [`ChainRpc`] over an ethers HTTP provider.
pub struct EthRpc {
    provider: Provider<Http>,
}

impl EthRpc {
    pub fn new(provider_url: &str) -> SyncResult<Self> {
        let provider = Provider::<Http>::try_from(provider_url)
            .map_err(|e| SyncError::Other(format!("Invalid RPC url {}: {}", provider_url, e)))?;
        Ok(Self { provider })
    }
}

#[async_trait::async_trait]
impl ChainRpc for EthRpc {
    async fn get_block_number(&self) -> SyncResult<u64> {
        self.provider
            .get_block_number()
            .await
            .map(|n| n.as_u64())
            .map_err(|e| SyncError::Rpc(e.to_string()))
            .tap_err(|e| tracing::warn!("get_block_number failed: {:?}", e))
    }

    // Note: query may fail if range is too big. Callsite is responsible
    // for chunking the query.
    async fn get_logs(
        &self,
        addresses: &[Address],
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> SyncResult<Vec<Log>> {
        let filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .address(addresses.to_vec())
            .topic0(topics.to_vec());
        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| SyncError::Rpc(e.to_string()))
            .tap_err(|e| {
                tracing::error!(
                    "get_logs failed. Filter: {:?}. Error {:?}",
                    filter,
                    e
                )
            })?;

        // Safeguard check that all logs are emitted from requested contracts
        if let Some(log) = logs.iter().find(|log| !addresses.contains(&log.address)) {
            return Err(SyncError::InvalidResponse(format!(
                "Provider returned a log from unexpected contract {:?}",
                log.address
            )));
        }
        Ok(logs)
    }
}
