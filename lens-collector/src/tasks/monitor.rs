// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::PeriodicTask;
use crate::chain_syncer::window::{BlockWindowScheduler, TickOutcome};
use crate::config::TaskName;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reconciles chain events one tick at a time.
pub struct MonitorTask {
    scheduler: BlockWindowScheduler,
}

impl MonitorTask {
    pub fn new(scheduler: BlockWindowScheduler) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl PeriodicTask for MonitorTask {
    fn name(&self) -> TaskName {
        TaskName::Monitor
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        if let TickOutcome::Idle = self.scheduler.run_tick(stop).await? {
            debug!(
                "[Monitor] Nothing new below height {}",
                self.scheduler.cached_height()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_syncer::{BlockWindowConfig, LensEventDecoder};
    use crate::content::{ContentResolver, ContentResolverConfig};
    use crate::cursor_store::CursorStore;
    use crate::error::CollectorError;
    use crate::reconcile::{DispatchTable, HandlerContext, Reconciler};
    use crate::store::LensStore;
    use crate::test_utils::{
        lens_hub, post_created_log, profile_created_log, MockChainRpc, MockContentFetcher,
    };
    use lens_db::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn monitor(rpc: &MockChainRpc, documents: Arc<MemoryStore>) -> MonitorTask {
        let content = ContentResolver::new(
            Arc::new(MockContentFetcher::default()),
            ContentResolverConfig {
                timeout: Duration::from_secs(1),
                retries: 1,
                retry_delay: Duration::ZERO,
            },
        );
        let ctx = HandlerContext {
            store: LensStore::new(documents.clone()),
            content: Arc::new(content),
        };
        let scheduler = BlockWindowScheduler::new(
            Arc::new(rpc.clone()),
            LensEventDecoder::new().unwrap(),
            CursorStore::new(documents),
            Reconciler::new(ctx, DispatchTable::lens(), 4),
            BlockWindowConfig {
                fetch_max_elapsed: Duration::ZERO,
                contracts: vec![lens_hub()],
                ..Default::default()
            },
        );
        MonitorTask::new(scheduler)
    }

    #[tokio::test]
    async fn test_run_once_commits_and_then_idles() {
        let documents = Arc::new(MemoryStore::new());
        let cursors = CursorStore::new(documents.clone());
        cursors.init_start_block(1000).await.unwrap();
        let rpc = MockChainRpc::default();
        rpc.set_height(1002);
        let decoder = LensEventDecoder::new().unwrap();
        rpc.add_logs(vec![
            profile_created_log(&decoder, 0xa1, 1, 100, 1000, 0),
            post_created_log(&decoder, 0xa1, 0x01, "ar://post", 101, 1001, 0),
        ]);

        let task = monitor(&rpc, documents.clone());
        let stop = CancellationToken::new();
        task.run_once(&stop).await.unwrap();
        assert_eq!(cursors.synced_block().await.unwrap(), Some(1002));

        task.run_once(&stop).await.unwrap();
        assert_eq!(rpc.requested_ranges(), vec![(1000, 1002)]);
    }

    #[tokio::test]
    async fn test_missing_resume_point_fails_the_run() {
        let task = monitor(&MockChainRpc::default(), Arc::new(MemoryStore::new()));
        let err = task.run_once(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CollectorError>(),
            Some(CollectorError::MissingResumePoint)
        ));
    }
}
