// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::publications::PublicationSync;
use super::{sleep_or_stop, PeriodicTask, SyncContext};
use crate::config::TaskName;
use crate::lens_api::LensApiError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Keeps the profiles of whitelisted wallets and their publications fresh.
pub struct WhitelistTask {
    ctx: SyncContext,
    publications: PublicationSync,
}

impl WhitelistTask {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            publications: PublicationSync::new(ctx.clone()),
            ctx,
        }
    }

    /// Resolves the profiles owned by `owners`, page by page. `None` means
    /// the walk was cut short by a rate limit or a stop.
    async fn owned_profiles(
        &self,
        owners: &[String],
        stop: &CancellationToken,
    ) -> anyhow::Result<Option<Vec<String>>> {
        let limit = self.ctx.settings.page_limit;
        let mut cursor: Option<String> = None;
        let mut ids = Vec::new();
        loop {
            if stop.is_cancelled() {
                return Ok(None);
            }
            let page = match self
                .ctx
                .api
                .profiles_by_owners(owners, cursor.as_deref(), limit)
                .await
            {
                Ok(page) => page,
                Err(LensApiError::RateLimited) => {
                    warn!(
                        "[Whitelist] Rate limited, backing off {:?}",
                        self.ctx.settings.rate_limit_backoff
                    );
                    sleep_or_stop(self.ctx.settings.rate_limit_backoff, stop).await;
                    return Ok(None);
                }
                Err(LensApiError::NotFound(what)) => {
                    warn!("[Whitelist] No profiles for owner batch ({})", what);
                    return Ok(Some(ids));
                }
                Err(e) => return Err(e.into()),
            };
            self.ctx.store.upsert_profile_snapshots(&page.items).await?;
            ids.extend(page.items.iter().map(|p| p.id.clone()));
            if (page.items.len() as i64) < limit || page.next.is_none() {
                return Ok(Some(ids));
            }
            cursor = page.next;
        }
    }
}

#[async_trait]
impl PeriodicTask for WhitelistTask {
    fn name(&self) -> TaskName {
        TaskName::Whitelist
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let addresses = self.ctx.store.whitelist_addresses().await?;
        if addresses.is_empty() {
            return Ok(());
        }

        let mut profile_ids = Vec::new();
        for owners in addresses.chunks(self.ctx.settings.page_limit.max(1) as usize) {
            match self.owned_profiles(owners, stop).await? {
                Some(ids) => profile_ids.extend(ids),
                None => return Ok(()),
            }
        }

        let concurrency = (self.ctx.settings.max_task / 2).max(1);
        let summary = self
            .publications
            .walk_all(profile_ids.clone(), concurrency, stop)
            .await?;
        info!(
            "[Whitelist] {} addresses, {} profiles, {} new publications",
            addresses.len(),
            profile_ids.len(),
            summary.inserted
        );
        Ok(())
    }
}
