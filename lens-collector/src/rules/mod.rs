// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Static rule catalog: apps, achievements, benefits and tasks.
//!
//! The catalog is seeded into the store at startup. Seeding is an unordered
//! insert keyed by `_id`, so restarts leave existing documents untouched.

pub mod templates;

pub use templates::{has_consecutive_days, RuleEvaluator};

use crate::store::LensStore;
use lens_db::StoreResult;
use lens_schema::rules::{
    AchievementTemplate, App, Benefit, RuleArgs, RuleTemplate, TaskTemplate,
};
use lens_schema::{ACHV_TMPL_COLL, APP_COLL, BENEFIT_TMPL_COLL, TASK_TMPL_COLL};
use tracing::info;

const RULES_STARTED_AT: &str = "2021-10-10T00:00:00.000Z";
const LENSTER_PICTURE: &str =
    "https://raw.githubusercontent.com/nosocialxyz/apps/main/public/assets/images/3.svg";
const THREE_DAYS_DESCRIPTION: &str =
    "Use the Lenster APP to send post works for three consecutive days to get this reward";

fn args(num: i64, app_id: &str) -> RuleArgs {
    RuleArgs {
        started_at: RULES_STARTED_AT.to_string(),
        num,
        app_ids: vec![app_id.to_string()],
    }
}

pub fn apps() -> Vec<App> {
    vec![
        App {
            id: "0x1".to_string(),
            name: "NoSocial".to_string(),
            description: "The gate to decentralized and more".to_string(),
            picture: "https://raw.githubusercontent.com/nosocialxyz/apps/main/src/assets/images/logo640.png"
                .to_string(),
            achievements: vec!["0x1".to_string()],
            url: "https://nosocial.xyz/".to_string(),
        },
        App {
            id: "0x2".to_string(),
            name: "lenster".to_string(),
            description: "Lenster is a composable, decentralized, and permissionless social media web app built with Lens Protocol."
                .to_string(),
            picture: LENSTER_PICTURE.to_string(),
            achievements: vec!["0x2".to_string(), "0x3".to_string()],
            url: "https://lenster.xyz/".to_string(),
        },
    ]
}

/// Achievements minted by `contract_address`.
pub fn achievements(contract_address: &str) -> Vec<AchievementTemplate> {
    let achievement = |id: &str,
                       name: &str,
                       category: &str,
                       provider: &str,
                       description: &str,
                       args: RuleArgs,
                       tmpl: RuleTemplate| AchievementTemplate {
        id: id.to_string(),
        contract_address: contract_address.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        provider: provider.to_string(),
        description: description.to_string(),
        picture: format!("https://data.nosocial.xyz/achievements/{}.png", id),
        total_amount: -1,
        args,
        tmpl,
    };
    vec![
        achievement(
            "0x1",
            "100 Lens Followers",
            "popularity",
            "NoSocial",
            "Have 100 followers on the lens protocol",
            args(100, "all"),
            RuleTemplate::NFollowers,
        ),
        achievement(
            "0x2",
            "20 Posts",
            "publictions",
            "lenster",
            "Published 20 posts on lenster",
            args(20, "lenster"),
            RuleTemplate::NPosts,
        ),
        achievement(
            "0x3",
            "3 days post",
            "time",
            "lenster",
            THREE_DAYS_DESCRIPTION,
            args(3, "lenster"),
            RuleTemplate::NDaysConsecutivePost,
        ),
    ]
}

pub fn benefits() -> Vec<Benefit> {
    vec![Benefit {
        id: "0x1".to_string(),
        reward_type: "token".to_string(),
        category: "airdrop".to_string(),
        provider: "lenster".to_string(),
        name: "100 Matic Airdrop".to_string(),
        benefit_name: "Lenster active user".to_string(),
        description: "Lenster is a composable, decentralized, and permissionless social media web app built with Lens Protocol. Use Lenster and get the airdrop"
            .to_string(),
        picture: LENSTER_PICTURE.to_string(),
        provider_picture: LENSTER_PICTURE.to_string(),
        tasks: vec!["0x1".to_string(), "0x2".to_string(), "0x3".to_string()],
    }]
}

pub fn tasks() -> Vec<TaskTemplate> {
    let task = |id: &str,
                name: &str,
                category: &str,
                provider: &str,
                description: &str,
                url: &str,
                args: RuleArgs,
                tmpl: RuleTemplate| TaskTemplate {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        provider: provider.to_string(),
        description: description.to_string(),
        url: url.to_string(),
        args,
        tmpl,
    };
    vec![
        task(
            "0x1",
            "100 Lens Followers",
            "popularity",
            "NoSocial",
            "Have 100 followers on the lens protocol",
            "https://nosocial.xyz/",
            args(100, "all"),
            RuleTemplate::NFollowers,
        ),
        task(
            "0x2",
            "20 Posts",
            "publictions",
            "lenster",
            "Published 20 posts on lenster",
            "https://lenster.xyz/",
            args(20, "lenster"),
            RuleTemplate::NPosts,
        ),
        task(
            "0x3",
            "Send posts for three consecutive days",
            "time",
            "lenster",
            THREE_DAYS_DESCRIPTION,
            "https://lenster.xyz/",
            args(3, "lenster"),
            RuleTemplate::NDaysConsecutivePost,
        ),
    ]
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub apps: usize,
    pub achievements: usize,
    pub benefits: usize,
    pub tasks: usize,
}

/// Inserts the catalog documents that are not stored yet.
pub async fn seed_catalog(store: &LensStore, contract_address: &str) -> StoreResult<SeedReport> {
    let report = SeedReport {
        apps: store.insert_all(APP_COLL, &apps()).await?,
        achievements: store
            .insert_all(ACHV_TMPL_COLL, &achievements(contract_address))
            .await?,
        benefits: store.insert_all(BENEFIT_TMPL_COLL, &benefits()).await?,
        tasks: store.insert_all(TASK_TMPL_COLL, &tasks()).await?,
    };
    info!(
        "[Rules] Seeded {} apps, {} achievements, {} benefits, {} tasks",
        report.apps, report.achievements, report.benefits, report.tasks
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lens_db::MemoryStore;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const ACHIEVEMENT_CONTRACT: &str = "0x9B82DAF85E9dcC4409ed13970035a181fB411542";

    fn default_achievements() -> Vec<AchievementTemplate> {
        achievements(ACHIEVEMENT_CONTRACT)
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let store = LensStore::new(Arc::new(MemoryStore::new()));
        let first = seed_catalog(&store, ACHIEVEMENT_CONTRACT).await.unwrap();
        assert_eq!(
            first,
            SeedReport {
                apps: 2,
                achievements: 3,
                benefits: 1,
                tasks: 3
            }
        );
        let second = seed_catalog(&store, ACHIEVEMENT_CONTRACT).await.unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.count(ACHV_TMPL_COLL).await.unwrap(), 3);

        let stored: Vec<AchievementTemplate> = store.load_all(ACHV_TMPL_COLL).await.unwrap();
        assert_eq!(stored, default_achievements());
    }

    #[test]
    fn test_catalog_references() {
        let achievement_ids: Vec<String> =
            default_achievements().into_iter().map(|a| a.id).collect();
        for app in apps() {
            for id in &app.achievements {
                assert!(achievement_ids.contains(id), "{} in app {}", id, app.id);
            }
        }
        let task_ids: Vec<String> = tasks().into_iter().map(|t| t.id).collect();
        assert_eq!(benefits()[0].tasks, task_ids);
        assert_eq!(
            default_achievements()[2].picture,
            "https://data.nosocial.xyz/achievements/0x3.png"
        );
    }
}
