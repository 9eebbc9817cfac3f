// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! One-shot gap filling of publication ids.
//!
//! Profile ids are assigned sequentially on chain, so the scan walks them by
//! index. For every stored profile the local publication ids are compared
//! with `stats.totalPublications` and the gaps are fetched by id.

use super::{sleep_or_stop, SyncContext};
use crate::error::CollectorResult;
use crate::lens_api::LensApiError;
use lens_schema::ids::{hex_id, parse_hex_id, publication_id, split_publication_id};
use lens_schema::{Profile, PROFILE_COLL};
use std::collections::BTreeSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PROFILE_BATCH: u64 = 50;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MissedReport {
    /// Next profile index to scan.
    pub next_index: u64,
    pub missing: usize,
    pub inserted: usize,
}

pub struct MissedPublications {
    ctx: SyncContext,
}

impl MissedPublications {
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Scans profiles from `start_index` up to the stored profile count.
    pub async fn run(
        &self,
        start_index: u64,
        stop: &CancellationToken,
    ) -> CollectorResult<MissedReport> {
        let profile_count = self.ctx.store.count(PROFILE_COLL).await?;
        let mut report = MissedReport {
            next_index: start_index.max(1),
            ..Default::default()
        };
        info!(
            "[MissedPublications] Scanning from index {} over {} profiles",
            report.next_index, profile_count
        );

        while report.next_index <= profile_count {
            if stop.is_cancelled() {
                break;
            }
            let ids: Vec<String> = (report.next_index..report.next_index + PROFILE_BATCH)
                .map(hex_id)
                .collect();
            report.next_index += PROFILE_BATCH;

            let mut missing = Vec::new();
            for profile in self.ctx.store.get_profiles(&ids).await? {
                let local = self.ctx.store.publication_ids_of(&profile.id).await?;
                let gaps = missing_publication_ids(&profile, &local);
                if !gaps.is_empty() {
                    info!(
                        "[MissedPublications] Profile {} misses {} publications",
                        profile.id,
                        gaps.len()
                    );
                }
                missing.extend(gaps);
            }
            report.missing += missing.len();
            report.inserted += self.add_publications(&missing, stop).await?;
            info!(
                "[MissedPublications] Scanned up to index {}, {} missing so far",
                report.next_index - 1,
                report.missing
            );
        }
        Ok(report)
    }

    /// Fetches `ids` by chunks of the page limit and inserts them.
    async fn add_publications(
        &self,
        ids: &[String],
        stop: &CancellationToken,
    ) -> CollectorResult<usize> {
        let settings = &self.ctx.settings;
        let mut inserted = 0;
        for chunk in ids.chunks(settings.page_limit.max(1) as usize) {
            let mut tries = settings.publication_max_tries;
            while tries > 0 {
                match self.ctx.api.publications_by_ids(chunk).await {
                    Ok(publications) => {
                        inserted += self.ctx.store.insert_publications(&publications).await?;
                        break;
                    }
                    Err(LensApiError::NotFound(what)) => {
                        warn!(
                            "[MissedPublications] Publications not found ({}), stopping",
                            what
                        );
                        return Ok(inserted);
                    }
                    Err(LensApiError::RateLimited) => {
                        tries -= 1;
                        if !sleep_or_stop(settings.rate_limit_backoff, stop).await {
                            return Ok(inserted);
                        }
                    }
                    Err(e) => {
                        tries -= 1;
                        warn!(
                            "[MissedPublications] Fetch failed ({} tries left): {:?}",
                            tries, e
                        );
                    }
                }
            }
        }
        Ok(inserted)
    }
}

/// Publication ids of `profile` between 1 and `totalPublications` that are
/// not stored locally.
pub fn missing_publication_ids(profile: &Profile, local_ids: &[String]) -> Vec<String> {
    let present: BTreeSet<u64> = local_ids
        .iter()
        .filter_map(|id| split_publication_id(id))
        .filter_map(|(_, pub_id)| parse_hex_id(pub_id))
        .collect();
    let total = u64::try_from(profile.stats.total_publications).unwrap_or(0);
    (1..=total)
        .filter(|n| !present.contains(n))
        .map(|n| publication_id(&profile.id, &hex_id(n)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor_store::CursorStore;
    use crate::store::LensStore;
    use crate::tasks::SyncSettings;
    use crate::test_utils::MockLensApi;
    use lens_db::MemoryStore;
    use lens_schema::{Publication, PublicationKind, PUBLICATION_COLL};
    use std::sync::Arc;
    use std::time::Duration;

    fn profile(id: &str, total_publications: i64) -> Profile {
        let mut profile = Profile {
            id: id.to_string(),
            ..Default::default()
        };
        profile.stats.total_publications = total_publications;
        profile
    }

    fn publication(id: &str) -> Publication {
        let (profile_id, _) = split_publication_id(id).unwrap();
        Publication::new(id.to_string(), PublicationKind::Post, profile_id.to_string())
    }

    #[test]
    fn test_gaps_are_detected() {
        let local = vec!["0x01-0x01".to_string(), "0x01-0x03".to_string()];
        assert_eq!(
            missing_publication_ids(&profile("0x01", 5), &local),
            vec!["0x01-0x02", "0x01-0x04", "0x01-0x05"]
        );
        assert!(missing_publication_ids(&profile("0x01", 0), &local).is_empty());
        assert_eq!(
            missing_publication_ids(&profile("0x01", 300), &[])[255],
            "0x01-0x0100"
        );
    }

    #[tokio::test]
    async fn test_scan_fetches_missing_publications() {
        let api = Arc::new(MockLensApi::default());
        let documents = Arc::new(MemoryStore::new());
        let ctx = SyncContext {
            api: api.clone(),
            store: LensStore::new(documents.clone()),
            cursors: CursorStore::new(documents),
            settings: SyncSettings {
                page_limit: 2,
                max_task: 4,
                rate_limit_backoff: Duration::from_secs(300),
                page_jitter: Duration::ZERO..=Duration::ZERO,
                publication_max_tries: 3,
            },
        };
        ctx.store
            .insert_profiles(&[profile("0x01", 3), profile("0x02", 1)])
            .await
            .unwrap();
        ctx.store
            .insert_publications(&[publication("0x01-0x02")])
            .await
            .unwrap();
        for id in ["0x01-0x01", "0x01-0x02", "0x01-0x03", "0x02-0x01"] {
            api.add_publication(publication(id));
        }

        let report = MissedPublications::new(ctx.clone())
            .run(1, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            report,
            MissedReport {
                next_index: 51,
                missing: 3,
                inserted: 3
            }
        );
        assert_eq!(ctx.store.count(PUBLICATION_COLL).await.unwrap(), 4);
        assert_eq!(
            api.calls(),
            vec![
                "publications_by_ids:0x01-0x01,0x01-0x03".to_string(),
                "publications_by_ids:0x02-0x01".to_string(),
            ]
        );
    }
}
