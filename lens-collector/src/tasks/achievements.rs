// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::PeriodicTask;
use crate::config::TaskName;
use crate::rules::RuleEvaluator;
use crate::store::LensStore;
use async_trait::async_trait;
use lens_schema::rules::{AchievementRecord, AchievementTemplate, TaskRecord, TaskTemplate};
use lens_schema::{ACHIEVEMENT_COLL, ACHV_TMPL_COLL, TASK_COLL, TASK_TMPL_COLL};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Grants achievement records to the profiles meeting each achievement rule.
pub struct AchievementTask {
    store: LensStore,
    evaluator: RuleEvaluator,
}

impl AchievementTask {
    pub fn new(store: LensStore, evaluator: RuleEvaluator) -> Self {
        Self { store, evaluator }
    }
}

#[async_trait]
impl PeriodicTask for AchievementTask {
    fn name(&self) -> TaskName {
        TaskName::Achievements
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let templates: Vec<AchievementTemplate> = self.store.load_all(ACHV_TMPL_COLL).await?;
        for template in templates {
            if stop.is_cancelled() {
                break;
            }
            let profile_ids = match self
                .evaluator
                .eligible_profiles(template.tmpl, &template.args)
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("[Achievements] Rule {} skipped: {:?}", template.id, e);
                    continue;
                }
            };
            let records: Vec<AchievementRecord> = profile_ids
                .iter()
                .map(|id| AchievementRecord::for_profile(&template, id))
                .collect();
            let granted = self.store.insert_all(ACHIEVEMENT_COLL, &records).await?;
            if granted > 0 {
                info!(
                    "[Achievements] {} granted to {} new profiles",
                    template.name, granted
                );
            }
        }
        Ok(())
    }
}

/// Records the profiles that completed each benefit task.
pub struct RuleTask {
    store: LensStore,
    evaluator: RuleEvaluator,
}

impl RuleTask {
    pub fn new(store: LensStore, evaluator: RuleEvaluator) -> Self {
        Self { store, evaluator }
    }
}

#[async_trait]
impl PeriodicTask for RuleTask {
    fn name(&self) -> TaskName {
        TaskName::Tasks
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let templates: Vec<TaskTemplate> = self.store.load_all(TASK_TMPL_COLL).await?;
        for template in templates {
            if stop.is_cancelled() {
                break;
            }
            let profile_ids = match self
                .evaluator
                .eligible_profiles(template.tmpl, &template.args)
                .await
            {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("[Tasks] Task {} skipped: {:?}", template.id, e);
                    continue;
                }
            };
            let records: Vec<TaskRecord> = profile_ids
                .iter()
                .map(|id| TaskRecord::for_profile(&template, id))
                .collect();
            let completed = self.store.insert_all(TASK_COLL, &records).await?;
            if completed > 0 {
                info!("[Tasks] {} completed by {} new profiles", template.name, completed);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{achievements, seed_catalog, tasks};
    use chrono::NaiveDate;
    use lens_db::MemoryStore;
    use lens_schema::rules::AchievementStatus;
    use lens_schema::Profile;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const CONTRACT: &str = "0x9B82DAF85E9dcC4409ed13970035a181fB411542";

    async fn seeded() -> (LensStore, RuleEvaluator) {
        let store = LensStore::new(Arc::new(MemoryStore::new()));
        seed_catalog(&store, CONTRACT).await.unwrap();
        let mut popular = Profile {
            id: "0xa1".to_string(),
            ..Default::default()
        };
        popular.stats.total_followers = 120;
        let quiet = Profile {
            id: "0xb2".to_string(),
            ..Default::default()
        };
        store.insert_profiles(&[popular, quiet]).await.unwrap();
        let evaluator = RuleEvaluator::new(
            store.clone(),
            NaiveDate::from_ymd_opt(2022, 12, 1).unwrap(),
        );
        (store, evaluator)
    }

    #[tokio::test]
    async fn test_achievements_are_granted_once() {
        let (store, evaluator) = seeded().await;
        let task = AchievementTask::new(store.clone(), evaluator);
        let stop = CancellationToken::new();

        task.run_once(&stop).await.unwrap();
        task.run_once(&stop).await.unwrap();

        let records: Vec<AchievementRecord> = store.load_all(ACHIEVEMENT_COLL).await.unwrap();
        assert_eq!(
            records,
            vec![AchievementRecord::for_profile(&achievements(CONTRACT)[0], "0xa1")]
        );
        assert_eq!(records[0].id, "0xa1-0x1");
        assert_eq!(records[0].status, AchievementStatus::Ready);
    }

    #[tokio::test]
    async fn test_tasks_are_recorded() {
        let (store, evaluator) = seeded().await;
        RuleTask::new(store.clone(), evaluator)
            .run_once(&CancellationToken::new())
            .await
            .unwrap();

        let records: Vec<TaskRecord> = store.load_all(TASK_COLL).await.unwrap();
        assert_eq!(records, vec![TaskRecord::for_profile(&tasks()[0], "0xa1")]);
        assert_eq!(records[0].url, "https://nosocial.xyz/");
    }

    #[tokio::test]
    async fn test_stop_skips_remaining_rules() {
        let (store, evaluator) = seeded().await;
        let stop = CancellationToken::new();
        stop.cancel();
        AchievementTask::new(store.clone(), evaluator)
            .run_once(&stop)
            .await
            .unwrap();
        assert_eq!(store.count(ACHIEVEMENT_COLL).await.unwrap(), 0);
    }
}
