// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block window scheduling
//!
//! One tick walks up to `windows_per_tick` consecutive windows starting at
//! the resume block, accumulates their decoded events, reconciles them as a
//! single batch and only then commits `syncedBlock`. Windows are inclusive
//! on both ends and consecutive windows share their boundary block; the
//! overlap is removed by event key before reconciliation.

use super::abi::LensEventDecoder;
use super::events::{ChainEvent, EventKey};
use super::types::{BlockRange, ChainRpc};
use crate::cursor_store::CursorStore;
use crate::error::{CollectorError, CollectorResult};
use crate::metrics::CollectorMetrics;
use crate::reconcile::{ApplyReport, Reconciler};
use crate::retry_with_max_elapsed_time;
use ethers::types::{Address, Log, H256};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tap::TapFallible;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct BlockWindowConfig {
    /// Blocks per window.
    pub block_window: u64,
    pub windows_per_tick: usize,
    /// Height queries per refresh before falling back to the resume block.
    pub height_retry_limit: usize,
    /// Retry budget of one log fetch.
    pub fetch_max_elapsed: Duration,
    /// Lens Hub and Periphery.
    pub contracts: Vec<Address>,
}

impl Default for BlockWindowConfig {
    fn default() -> Self {
        Self {
            block_window: 2000,
            windows_per_tick: 5,
            height_retry_limit: 10,
            fetch_max_elapsed: Duration::from_secs(30),
            contracts: vec![],
        }
    }
}

/// Counts of one tick, across all of its windows.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub windows: usize,
    pub fetched: usize,
    pub decoded: usize,
    /// Events already seen in an earlier window of the tick.
    pub duplicates: usize,
    /// Known topics whose payload failed to decode.
    pub undecodable: usize,
    pub unknown: usize,
    pub report: ApplyReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The chain has no block past the resume point.
    Idle,
    Committed { range: BlockRange, stats: TickStats },
}

pub struct BlockWindowScheduler {
    rpc: Arc<dyn ChainRpc>,
    decoder: LensEventDecoder,
    topics: Vec<H256>,
    cursors: CursorStore,
    reconciler: Reconciler,
    config: BlockWindowConfig,
    // Last observed chain height, 0 until the first refresh
    height: AtomicU64,
    metrics: Option<Arc<CollectorMetrics>>,
}

impl BlockWindowScheduler {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        decoder: LensEventDecoder,
        cursors: CursorStore,
        reconciler: Reconciler,
        config: BlockWindowConfig,
    ) -> Self {
        let topics = decoder.topics();
        Self {
            rpc,
            decoder,
            topics,
            cursors,
            reconciler,
            config,
            height: AtomicU64::new(0),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CollectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn cached_height(&self) -> u64 {
        self.height.load(Ordering::Relaxed)
    }

    /// Next window from `from`, or `None` when the chain has nothing new.
    /// The cached height is only refreshed when the full window would pass it.
    pub async fn next_window(&self, from: u64) -> Option<BlockRange> {
        let wanted = from.saturating_add(self.config.block_window);
        let mut height = self.cached_height();
        if wanted > height {
            height = self.refresh_height(from).await;
        }
        let to = wanted.min(height);
        (to > from).then_some(BlockRange { from, to })
    }

    async fn refresh_height(&self, from: u64) -> u64 {
        let attempts = self.config.height_retry_limit.max(1);
        for attempt in 1..=attempts {
            match self.rpc.get_block_number().await {
                Ok(height) => {
                    self.height.store(height, Ordering::Relaxed);
                    if let Some(metrics) = &self.metrics {
                        metrics.chain_height.set(height as i64);
                    }
                    return height;
                }
                Err(e) => debug!(
                    "[Monitor] Height query {}/{} failed: {}",
                    attempt, attempts, e
                ),
            }
        }
        warn!(
            "[Monitor] Chain height unavailable after {} attempts, treating {} as current",
            attempts, from
        );
        from
    }

    async fn fetch_logs(&self, range: BlockRange) -> CollectorResult<Vec<Log>> {
        match retry_with_max_elapsed_time!(
            self.rpc
                .get_logs(&self.config.contracts, &self.topics, range.from, range.to),
            self.config.fetch_max_elapsed
        ) {
            Ok(Ok(logs)) => Ok(logs),
            Ok(Err(e)) | Err(e) => Err(CollectorError::Sync(e)),
        }
    }

    fn decode_into(
        &self,
        logs: &[Log],
        seen: &mut HashSet<EventKey>,
        events: &mut Vec<ChainEvent>,
        stats: &mut TickStats,
    ) {
        stats.fetched += logs.len();
        for log in logs {
            match self.decoder.decode(log) {
                Ok(Some(event)) => {
                    if seen.insert(event.key.clone()) {
                        stats.decoded += 1;
                        events.push(event);
                    } else {
                        stats.duplicates += 1;
                    }
                }
                Ok(None) => stats.unknown += 1,
                Err(e) => {
                    stats.undecodable += 1;
                    warn!("[Monitor] Skipping log: {}", e);
                }
            }
        }
    }

    /// One scheduler tick. `syncedBlock` is committed only after the
    /// accumulated batch reconciled and no stop was requested.
    pub async fn run_tick(&self, stop: &CancellationToken) -> CollectorResult<TickOutcome> {
        let start = self.cursors.resume_block().await?;
        let mut from = start;
        let mut seen = HashSet::new();
        let mut events = Vec::new();
        let mut stats = TickStats::default();

        for _ in 0..self.config.windows_per_tick.max(1) {
            if stop.is_cancelled() {
                break;
            }
            let Some(range) = self.next_window(from).await else {
                break;
            };
            match self.fetch_logs(range).await {
                Ok(logs) => {
                    self.decode_into(&logs, &mut seen, &mut events, &mut stats);
                    stats.windows += 1;
                    from = range.to;
                }
                Err(e) if stats.windows == 0 => {
                    self.record_failure(&e);
                    error!("[Monitor] Window {} abandoned: {}", range, e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        "[Monitor] Window {} abandoned, committing up to {}: {}",
                        range, from, e
                    );
                    break;
                }
            }
        }

        if stats.windows == 0 {
            if stop.is_cancelled() {
                return Err(CollectorError::Stopped);
            }
            return Ok(TickOutcome::Idle);
        }
        let range = BlockRange { from: start, to: from };

        stats.report = self
            .reconciler
            .apply(events, stop)
            .await
            .tap_err(|e| self.record_failure(e))?;
        if stop.is_cancelled() {
            return Err(CollectorError::Stopped);
        }

        self.cursors.commit_synced_block(range.to).await?;
        self.cursors
            .set_timestamp(chrono::Utc::now().timestamp_millis())
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.synced_block.set(range.to as i64);
        }

        let report = &stats.report;
        info!(
            "[Monitor] Synced {} in {} windows: fetched {}, decoded {}, duplicates {}, skipped {} (undecodable {}, unknown {}), changed {}, unchanged {}, superseded {}, unresolved {}",
            range,
            stats.windows,
            stats.fetched,
            stats.decoded,
            stats.duplicates,
            stats.undecodable + stats.unknown,
            stats.undecodable,
            stats.unknown,
            report.changed,
            report.unchanged,
            report.superseded,
            report.unresolved,
        );
        Ok(TickOutcome::Committed { range, stats })
    }

    fn record_failure(&self, e: &CollectorError) {
        if let Some(metrics) = &self.metrics {
            metrics
                .window_failures_total
                .with_label_values(&[e.error_type()])
                .inc();
        }
    }
}
