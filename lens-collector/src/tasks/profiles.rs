// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{sleep_or_stop, PeriodicTask, SyncContext};
use crate::config::TaskName;
use crate::lens_api::LensApiError;
use async_trait::async_trait;
use lens_schema::CursorKey;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backfills every Lens profile, one explore page per run.
pub struct ProfileSyncTask {
    ctx: SyncContext,
}

impl ProfileSyncTask {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl PeriodicTask for ProfileSyncTask {
    fn name(&self) -> TaskName {
        TaskName::Profiles
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let key = CursorKey::Profile;
        let cursors = &self.ctx.cursors;
        if cursors.is_complete(&key).await? {
            debug!("[ProfileSync] Profile backfill complete");
            return Ok(());
        }

        let limit = self.ctx.settings.page_limit;
        let cursor = cursors.page(&key).await?;
        let page = match self.ctx.api.explore_profiles(cursor.as_deref(), limit).await {
            Ok(page) => page,
            Err(LensApiError::RateLimited) => {
                warn!(
                    "[ProfileSync] Rate limited, backing off {:?}",
                    self.ctx.settings.rate_limit_backoff
                );
                sleep_or_stop(self.ctx.settings.rate_limit_backoff, stop).await;
                return Ok(());
            }
            Err(LensApiError::NotFound(what)) => {
                warn!(
                    "[ProfileSync] Page {:?} not found ({}), retrying next run",
                    cursor, what
                );
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let inserted = self.ctx.store.upsert_profile_snapshots(&page.items).await?;
        if let Some(next) = &page.next {
            cursors.set_page(&key, next).await?;
        }
        info!(
            "[ProfileSync] Page {:?}: {} profiles, {} new",
            cursor,
            page.items.len(),
            inserted
        );
        if (page.items.len() as i64) < limit {
            cursors.mark_complete(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_store::CursorStore;
    use crate::store::LensStore;
    use crate::tasks::SyncSettings;
    use crate::test_utils::MockLensApi;
    use lens_db::{MemoryStore, Update};
    use lens_schema::{Profile, PROFILE_COLL};
    use std::sync::Arc;
    use std::time::Duration;

    fn settings() -> SyncSettings {
        SyncSettings {
            page_limit: 2,
            max_task: 4,
            rate_limit_backoff: Duration::from_secs(300),
            page_jitter: Duration::ZERO..=Duration::ZERO,
            publication_max_tries: 3,
        }
    }

    fn setup(profiles: usize) -> (Arc<MockLensApi>, ProfileSyncTask, SyncContext) {
        let api = Arc::new(MockLensApi::default());
        for i in 1..=profiles {
            api.add_profile(Profile {
                id: format!("0x{:02x}", i),
                ..Default::default()
            });
        }
        let documents = Arc::new(MemoryStore::new());
        let ctx = SyncContext {
            api: api.clone(),
            store: LensStore::new(documents.clone()),
            cursors: CursorStore::new(documents),
            settings: settings(),
        };
        (api, ProfileSyncTask::new(ctx.clone()), ctx)
    }

    #[tokio::test]
    async fn test_short_page_completes_the_backfill() {
        let (api, task, ctx) = setup(3);
        let stop = CancellationToken::new();

        task.run_once(&stop).await.unwrap();
        assert_eq!(ctx.cursors.page(&CursorKey::Profile).await.unwrap().as_deref(), Some("2"));
        assert!(!ctx.cursors.is_complete(&CursorKey::Profile).await.unwrap());

        task.run_once(&stop).await.unwrap();
        assert!(ctx.cursors.is_complete(&CursorKey::Profile).await.unwrap());
        assert_eq!(ctx.store.count(PROFILE_COLL).await.unwrap(), 3);

        // Complete cursors are not polled again.
        task.run_once(&stop).await.unwrap();
        assert_eq!(
            api.calls(),
            vec!["explore_profiles:".to_string(), "explore_profiles:2".to_string()]
        );
    }

    #[tokio::test]
    async fn test_refresh_updates_known_profiles_and_keeps_counters() {
        let (api, task, ctx) = setup(0);
        api.add_profile(Profile {
            id: "0x01".into(),
            handle: Some("alice.lens".into()),
            ..Default::default()
        });
        task.run_once(&CancellationToken::new()).await.unwrap();
        ctx.store
            .bump_profile_once(
                "0x01",
                "0xaa:0:follower",
                Update::new().inc("stats.totalFollowers", 2),
            )
            .await
            .unwrap();

        // A later backfill pass sees the renamed profile with lagging stats.
        let renamed = Arc::new(MockLensApi::default());
        renamed.add_profile(Profile {
            id: "0x01".into(),
            handle: Some("alice2.lens".into()),
            ..Default::default()
        });
        ctx.cursors.delete(&CursorKey::Profile).await.unwrap();
        let refresh = ProfileSyncTask::new(SyncContext {
            api: renamed,
            ..ctx.clone()
        });
        refresh.run_once(&CancellationToken::new()).await.unwrap();

        let profile = ctx.store.get_profile("0x01").await.unwrap().unwrap();
        assert_eq!(profile.handle.as_deref(), Some("alice2.lens"));
        assert_eq!(profile.stats.total_followers, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_backs_off_without_moving_the_cursor() {
        let (api, task, ctx) = setup(3);
        api.fail_next(LensApiError::RateLimited);

        let started = tokio::time::Instant::now();
        task.run_once(&CancellationToken::new()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert_eq!(ctx.cursors.page(&CursorKey::Profile).await.unwrap(), None);
        assert_eq!(ctx.store.count(PROFILE_COLL).await.unwrap(), 0);

        task.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.store.count(PROFILE_COLL).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_not_found_keeps_the_cursor_open() {
        let (api, task, ctx) = setup(3);
        task.run_once(&CancellationToken::new()).await.unwrap();
        api.fail_next(LensApiError::NotFound("profiles".into()));

        task.run_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(ctx.cursors.page(&CursorKey::Profile).await.unwrap().as_deref(), Some("2"));
        assert!(!ctx.cursors.is_complete(&CursorKey::Profile).await.unwrap());
    }

    #[tokio::test]
    async fn test_transport_errors_fail_the_run() {
        let (api, task, _ctx) = setup(1);
        api.fail_next(LensApiError::Http { status: 500 });
        let err = task.run_once(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LensApiError>(),
            Some(&LensApiError::Http { status: 500 })
        );
    }
}
