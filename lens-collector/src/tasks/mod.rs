// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Periodic collector tasks and the interval runner that drives them.
//!
//! A task run is never started while the previous run of the same task is
//! still in flight: the interval is idle time between completed runs. Stop is
//! cooperative. Runners and long handlers check the shared token between
//! sub-batches and never abort a run halfway through a store write.

use crate::config::{CollectorConfig, TaskName};
use crate::cursor_store::CursorStore;
use crate::error::CollectorError;
use crate::lens_api::LensApi;
use crate::metrics::CollectorMetrics;
use crate::store::LensStore;
use async_trait::async_trait;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod achievements;
pub mod enrich;
pub mod missed;
pub mod monitor;
pub mod profiles;
pub mod publications;
pub mod whitelist;

pub use achievements::{AchievementTask, RuleTask};
pub use enrich::EnrichTask;
pub use missed::MissedPublications;
pub use monitor::MonitorTask;
pub use profiles::ProfileSyncTask;
pub use publications::{PublicationSync, PublicationSyncTask, WalkOutcome};
pub use whitelist::WhitelistTask;

#[async_trait]
pub trait PeriodicTask: Send + Sync {
    fn name(&self) -> TaskName;

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()>;
}

/// Paging and pacing knobs shared by the Lens API sync tasks.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub page_limit: i64,
    pub max_task: usize,
    pub rate_limit_backoff: Duration,
    pub page_jitter: RangeInclusive<Duration>,
    pub publication_max_tries: usize,
}

impl SyncSettings {
    pub fn from_config(config: &CollectorConfig) -> Self {
        Self {
            page_limit: config.lens_data_limit,
            max_task: config.max_task,
            rate_limit_backoff: config.rate_limit_backoff(),
            page_jitter: config.page_jitter(),
            publication_max_tries: config.publication_max_tries,
        }
    }
}

/// Collaborators of the Lens API sync tasks.
#[derive(Clone)]
pub struct SyncContext {
    pub api: Arc<dyn LensApi>,
    pub store: LensStore,
    pub cursors: CursorStore,
    pub settings: SyncSettings,
}

/// Sleeps for `duration` unless `stop` fires first. Returns `false` when
/// stopped.
pub async fn sleep_or_stop(duration: Duration, stop: &CancellationToken) -> bool {
    tokio::select! {
        _ = stop.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Runs `task` every `interval` until `stop` is cancelled.
pub fn spawn_interval_task(
    task: Arc<dyn PeriodicTask>,
    interval: Duration,
    stop: CancellationToken,
    metrics: Option<Arc<CollectorMetrics>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = task.name();
        info!("[{}] Starting, interval {:?}", name, interval);
        loop {
            if stop.is_cancelled() {
                break;
            }
            let started = Instant::now();
            let result = task.run_once(&stop).await;
            let outcome = match &result {
                Ok(()) => "ok",
                Err(e) if is_stop(e) => {
                    info!("[{}] Run interrupted by stop", name);
                    "stopped"
                }
                Err(e) => {
                    error!("[{}] Run failed: {:?}", name, e);
                    "error"
                }
            };
            if let Some(metrics) = &metrics {
                metrics
                    .task_runs_total
                    .with_label_values(&[name.as_ref(), outcome])
                    .inc();
                metrics
                    .task_duration_seconds
                    .with_label_values(&[name.as_ref()])
                    .observe(started.elapsed().as_secs_f64());
            }
            if !sleep_or_stop(interval, &stop).await {
                break;
            }
        }
        info!("[{}] Stopped", name);
    })
}

fn is_stop(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<CollectorError>(),
        Some(CollectorError::Stopped)
    )
}

/// Cancels `stop` once a persisted stop request shows up in the cursor store.
pub fn spawn_stop_watcher(
    cursors: CursorStore,
    poll_interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while sleep_or_stop(poll_interval, &stop).await {
            match cursors.is_stopped().await {
                Ok(true) => {
                    info!("[StopWatcher] Persisted stop found, draining tasks");
                    stop.cancel();
                }
                Ok(false) => {}
                Err(e) => warn!("[StopWatcher] Failed to read the stop cursor: {:?}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_db::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowTask {
        runs: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        run_time: Duration,
        fail: bool,
    }

    impl SlowTask {
        fn new(run_time: Duration, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                runs: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                run_time,
                fail,
            })
        }
    }

    #[async_trait]
    impl PeriodicTask for SlowTask {
        fn name(&self) -> TaskName {
            TaskName::Profiles
        }

        async fn run_once(&self, _stop: &CancellationToken) -> anyhow::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.run_time).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_never_overlap() {
        let task = SlowTask::new(Duration::from_secs(3), false);
        let stop = CancellationToken::new();
        let handle = spawn_interval_task(task.clone(), Duration::from_secs(1), stop.clone(), None);

        // Runs start at 0s, 4s and 8s.
        tokio::time::sleep(Duration::from_secs(10)).await;
        stop.cancel();
        handle.await.unwrap();

        assert_eq!(task.runs.load(Ordering::SeqCst), 3);
        assert_eq!(task.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_keep_the_schedule() {
        let task = SlowTask::new(Duration::ZERO, true);
        let metrics = Arc::new(CollectorMetrics::new_for_testing());
        let stop = CancellationToken::new();
        let handle = spawn_interval_task(
            task.clone(),
            Duration::from_secs(1),
            stop.clone(),
            Some(metrics.clone()),
        );

        tokio::time::sleep(Duration::from_millis(5500)).await;
        stop.cancel();
        handle.await.unwrap();

        assert_eq!(task.runs.load(Ordering::SeqCst), 6);
        assert_eq!(
            metrics
                .task_runs_total
                .with_label_values(&["profiles", "error"])
                .get(),
            6
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_start_never_runs() {
        let task = SlowTask::new(Duration::ZERO, false);
        let stop = CancellationToken::new();
        stop.cancel();
        spawn_interval_task(task.clone(), Duration::from_secs(1), stop, None)
            .await
            .unwrap();
        assert_eq!(task.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persisted_stop_cancels_token() {
        let cursors = CursorStore::new(Arc::new(MemoryStore::new()));
        let stop = CancellationToken::new();
        let watcher = spawn_stop_watcher(cursors.clone(), Duration::from_secs(1), stop.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!stop.is_cancelled());

        cursors.request_stop().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), stop.cancelled())
            .await
            .unwrap();
        watcher.await.unwrap();
    }

    #[test]
    fn test_stop_error_is_recognised() {
        assert!(is_stop(&anyhow::Error::from(CollectorError::Stopped)));
        assert!(!is_stop(&anyhow::anyhow!("other")));
    }
}
