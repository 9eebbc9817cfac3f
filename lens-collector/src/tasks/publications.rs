// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-profile publication backfill.
//!
//! Pages of one profile are fetched strictly in cursor order; profiles are
//! walked in parallel up to `max_task`. A walk that exhausts its tries still
//! marks the profile complete so a broken profile is not re-polled forever,
//! while a not-found answer leaves it pending for the next run.

use super::{sleep_or_stop, PeriodicTask, SyncContext};
use crate::config::TaskName;
use crate::error::CollectorResult;
use crate::lens_api::LensApiError;
use crate::utils::{jitter, run_bounded};
use async_trait::async_trait;
use lens_schema::{CursorKey, PullStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOutcome {
    Complete { inserted: usize },
    Aborted,
    Stopped,
}

/// Walks the publication pages of single profiles.
#[derive(Clone)]
pub struct PublicationSync {
    ctx: SyncContext,
}

impl PublicationSync {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    pub async fn walk(
        &self,
        profile_id: &str,
        stop: &CancellationToken,
    ) -> CollectorResult<WalkOutcome> {
        let key = CursorKey::Publication(profile_id.to_string());
        let settings = &self.ctx.settings;
        let mut tries = settings.publication_max_tries;
        let mut inserted = 0;

        while tries > 0 {
            if !sleep_or_stop(jitter(&settings.page_jitter), stop).await {
                return Ok(WalkOutcome::Stopped);
            }
            let cursor = self.ctx.cursors.page(&key).await?;
            match self
                .ctx
                .api
                .publications_by_profile(profile_id, cursor.as_deref(), settings.page_limit)
                .await
            {
                Ok(page) => {
                    inserted += self.ctx.store.insert_publications(&page.items).await?;
                    if let Some(next) = &page.next {
                        self.ctx.cursors.set_page(&key, next).await?;
                    }
                    if (page.items.len() as i64) < settings.page_limit {
                        break;
                    }
                }
                Err(LensApiError::NotFound(what)) => {
                    warn!(
                        "[PublicationSync] Profile {} not found ({}), leaving it pending",
                        profile_id, what
                    );
                    return Ok(WalkOutcome::Aborted);
                }
                Err(LensApiError::RateLimited) => {
                    warn!(
                        "[PublicationSync] Rate limited on {}, backing off {:?}",
                        profile_id, settings.rate_limit_backoff
                    );
                    tries -= 1;
                    if !sleep_or_stop(settings.rate_limit_backoff, stop).await {
                        return Ok(WalkOutcome::Stopped);
                    }
                }
                Err(e) => {
                    tries -= 1;
                    warn!(
                        "[PublicationSync] Page {:?} of {} failed ({} tries left): {:?}",
                        cursor, profile_id, tries, e
                    );
                }
            }
        }

        self.ctx
            .store
            .set_pull_status(profile_id, PullStatus::Complete)
            .await?;
        debug!(
            "[PublicationSync] Profile {} complete, {} new publications",
            profile_id, inserted
        );
        Ok(WalkOutcome::Complete { inserted })
    }

    /// Walks `profile_ids` with at most `limit` walks in flight.
    pub async fn walk_all(
        &self,
        profile_ids: Vec<String>,
        limit: usize,
        stop: &CancellationToken,
    ) -> CollectorResult<WalkSummary> {
        let results = run_bounded(profile_ids, limit, |id| async move {
            let outcome = self.walk(&id, stop).await;
            (id, outcome)
        })
        .await;

        let mut summary = WalkSummary::default();
        let mut first_error = None;
        for (id, result) in results {
            match result {
                Ok(WalkOutcome::Complete { inserted }) => {
                    summary.completed += 1;
                    summary.inserted += inserted;
                }
                Ok(WalkOutcome::Aborted) => summary.aborted += 1,
                Ok(WalkOutcome::Stopped) => summary.stopped += 1,
                Err(e) => {
                    warn!("[PublicationSync] Walk of {} failed: {:?}", id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    pub completed: usize,
    pub aborted: usize,
    pub stopped: usize,
    pub inserted: usize,
}

/// Backfills the publications of profiles whose pull is not complete.
pub struct PublicationSyncTask {
    sync: PublicationSync,
}

impl PublicationSyncTask {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            sync: PublicationSync::new(ctx),
        }
    }
}

#[async_trait]
impl PeriodicTask for PublicationSyncTask {
    fn name(&self) -> TaskName {
        TaskName::Publications
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let max_task = self.sync.ctx.settings.max_task;
        let pending = self
            .sync
            .ctx
            .store
            .profiles_pending_pull(max_task as i64)
            .await?;
        if pending.is_empty() {
            return Ok(());
        }
        let total = pending.len();
        let summary = self.sync.walk_all(pending, max_task, stop).await?;
        info!(
            "[PublicationSync] {} profiles: {} complete, {} aborted, {} stopped, {} new publications",
            total, summary.completed, summary.aborted, summary.stopped, summary.inserted
        );
        Ok(())
    }
}
