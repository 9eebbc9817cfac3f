// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::CollectorResult;
use crate::store::LensStore;
use chrono::NaiveDate;
use lens_db::{ActivityQuery, AppScope, ProfileQuery};
use lens_schema::rules::{RuleArgs, RuleTemplate};

/// Evaluates rule templates against the stored projections.
#[derive(Clone)]
pub struct RuleEvaluator {
    store: LensStore,
    activity_since: NaiveDate,
}

impl RuleEvaluator {
    pub fn new(store: LensStore, activity_since: NaiveDate) -> Self {
        Self {
            store,
            activity_since,
        }
    }

    /// Ids of the profiles satisfying `tmpl` with `args`.
    pub async fn eligible_profiles(
        &self,
        tmpl: RuleTemplate,
        args: &RuleArgs,
    ) -> CollectorResult<Vec<String>> {
        let apps = AppScope::from_app_ids(&args.app_ids)?;
        match tmpl {
            RuleTemplate::NFollowers => {
                self.profiles(ProfileQuery {
                    min_followers: Some(args.num),
                    min_posts: None,
                    apps,
                })
                .await
            }
            RuleTemplate::NPosts => {
                self.profiles(ProfileQuery {
                    min_followers: None,
                    min_posts: Some(args.num),
                    apps,
                })
                .await
            }
            RuleTemplate::NDaysConsecutivePost => self.consecutive_posters(args.num, apps).await,
        }
    }

    async fn profiles(&self, query: ProfileQuery) -> CollectorResult<Vec<String>> {
        Ok(self.store.profile_ids_matching(&query).await?)
    }

    async fn consecutive_posters(&self, num: i64, apps: AppScope) -> CollectorResult<Vec<String>> {
        let query = ActivityQuery {
            since: self.activity_since.format("%Y-%m-%d").to_string(),
            apps,
        };
        Ok(self
            .store
            .post_days(&query)
            .await?
            .into_iter()
            .filter(|group| has_consecutive_days(&group.days, num))
            .map(|group| group.key)
            .collect())
    }
}

/// Whether `days` (`YYYY-MM-DD`, any order) contain a run of at least `num`
/// consecutive calendar days.
pub fn has_consecutive_days(days: &[String], num: i64) -> bool {
    let mut dates: Vec<NaiveDate> = days
        .iter()
        .filter_map(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
        .collect();
    if dates.is_empty() {
        return false;
    }
    if num <= 1 {
        return true;
    }
    dates.sort();
    dates.dedup();

    let mut run = 1;
    for pair in dates.windows(2) {
        if pair[0].succ_opt() == Some(pair[1]) {
            run += 1;
            if run >= num {
                return true;
            }
        } else {
            run = 1;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectorError;
    use lens_db::{MemoryStore, StoreError};
    use lens_schema::{Profile, Publication, PublicationKind};
    use std::sync::Arc;

    fn days(days: &[&str]) -> Vec<String> {
        days.iter().map(|d| d.to_string()).collect()
    }

    fn args(num: i64, app_ids: &[&str]) -> RuleArgs {
        RuleArgs {
            started_at: "2021-10-10T00:00:00.000Z".to_string(),
            num,
            app_ids: app_ids.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_consecutive_days() {
        assert!(has_consecutive_days(
            &days(&["2022-12-03", "2022-12-01", "2022-12-02"]),
            3
        ));
        assert!(!has_consecutive_days(
            &days(&["2022-12-01", "2022-12-02", "2022-12-04", "2022-12-05"]),
            3
        ));
        // Month boundary.
        assert!(has_consecutive_days(
            &days(&["2022-12-30", "2022-12-31", "2023-01-01"]),
            3
        ));
        assert!(!has_consecutive_days(&days(&["2022-12-01", "2022-12-01"]), 2));
        assert!(has_consecutive_days(&days(&["2022-12-01"]), 1));
        assert!(!has_consecutive_days(&[], 1));
    }

    async fn seeded_store() -> LensStore {
        let store = LensStore::new(Arc::new(MemoryStore::new()));
        let mut popular = Profile {
            id: "0xa1".to_string(),
            app_id: Some("lenster".to_string()),
            ..Default::default()
        };
        popular.stats.total_followers = 150;
        popular.stats.total_posts = 5;
        let mut prolific = Profile {
            id: "0xb2".to_string(),
            ..Default::default()
        };
        prolific.stats.total_followers = 3;
        prolific.stats.total_posts = 25;
        store.insert_profiles(&[popular, prolific]).await.unwrap();

        let mut publications = vec![];
        for (profile_id, day, app_id) in [
            ("0xa1", "2022-12-05", "lenster"),
            ("0xa1", "2022-12-06", "lenster"),
            ("0xa1", "2022-12-07", "lenster"),
            ("0xb2", "2022-12-05", "other"),
            ("0xb2", "2022-12-06", "other"),
            ("0xb2", "2022-12-07", "other"),
            // Before the activity window.
            ("0xc3", "2022-11-28", "lenster"),
            ("0xc3", "2022-11-29", "lenster"),
            ("0xc3", "2022-11-30", "lenster"),
        ] {
            let mut publication = Publication::new(
                format!("{}-{}", profile_id, day),
                PublicationKind::Post,
                profile_id.to_string(),
            );
            publication.created_at = Some(format!("{}T10:00:00.000Z", day));
            publication.app_id = Some(app_id.to_string());
            publications.push(publication);
        }
        store.insert_publications(&publications).await.unwrap();
        store
    }

    fn evaluator(store: LensStore) -> RuleEvaluator {
        RuleEvaluator::new(store, NaiveDate::from_ymd_opt(2022, 12, 1).unwrap())
    }

    #[tokio::test]
    async fn test_threshold_templates() {
        let evaluator = evaluator(seeded_store().await);
        assert_eq!(
            evaluator
                .eligible_profiles(RuleTemplate::NFollowers, &args(100, &["all"]))
                .await
                .unwrap(),
            vec!["0xa1"]
        );
        assert_eq!(
            evaluator
                .eligible_profiles(RuleTemplate::NPosts, &args(20, &["all"]))
                .await
                .unwrap(),
            vec!["0xb2"]
        );
        // 0xb2 has no app.
        assert!(evaluator
            .eligible_profiles(RuleTemplate::NPosts, &args(20, &["lenster"]))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_post_template() {
        let evaluator = evaluator(seeded_store().await);
        let mut all = evaluator
            .eligible_profiles(RuleTemplate::NDaysConsecutivePost, &args(3, &["all"]))
            .await
            .unwrap();
        all.sort();
        assert_eq!(all, vec!["0xa1", "0xb2"]);
        assert_eq!(
            evaluator
                .eligible_profiles(RuleTemplate::NDaysConsecutivePost, &args(3, &["lenster"]))
                .await
                .unwrap(),
            vec!["0xa1"]
        );
    }

    #[tokio::test]
    async fn test_empty_app_list_is_rejected() {
        let evaluator = evaluator(seeded_store().await);
        let err = evaluator
            .eligible_profiles(RuleTemplate::NFollowers, &args(1, &[]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CollectorError::Store(StoreError::InvalidQuery(_))
        ));
    }
}
