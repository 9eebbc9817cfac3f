// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::dispatch::Unresolved;
use crate::lens_api::{LensApi, LensApiError};
use crate::store::LensStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichReport {
    pub profiles: usize,
    pub publications: usize,
}

/// Re-fetches entities that event handlers could not complete, from the
/// Lens API. Failures never propagate.
pub struct Enricher {
    api: Arc<dyn LensApi>,
    store: LensStore,
    chunk_size: usize,
    pacing: Duration,
}

impl Enricher {
    pub fn new(
        api: Arc<dyn LensApi>,
        store: LensStore,
        chunk_size: usize,
        pacing: Duration,
    ) -> Self {
        Self {
            api,
            store,
            chunk_size: chunk_size.max(1),
            pacing,
        }
    }

    pub async fn enrich(&self, unresolved: &[Unresolved]) -> EnrichReport {
        let mut profile_ids = Vec::new();
        let mut publication_ids = Vec::new();
        for entity in unresolved {
            match entity {
                Unresolved::Profile(id) => profile_ids.push(id.clone()),
                Unresolved::Publication(id) => publication_ids.push(id.clone()),
            }
        }

        let mut report = EnrichReport::default();
        let mut first = true;
        for chunk in profile_ids.chunks(self.chunk_size) {
            if !std::mem::take(&mut first) {
                tokio::time::sleep(self.pacing).await;
            }
            match self.api.profiles_by_ids(chunk).await {
                Ok(profiles) => {
                    for profile in &profiles {
                        match self.store.upsert_profile_snapshot(profile).await {
                            Ok(_) => report.profiles += 1,
                            Err(e) => {
                                warn!("[Enricher] Failed to store profile {}: {}", profile.id, e)
                            }
                        }
                    }
                }
                Err(LensApiError::RateLimited) => {
                    warn!("[Enricher] Rate limited, dropping remaining enrichment");
                    return report;
                }
                Err(e) => warn!("[Enricher] Profiles {:?} failed: {}", chunk, e),
            }
        }
        for chunk in publication_ids.chunks(self.chunk_size) {
            if !std::mem::take(&mut first) {
                tokio::time::sleep(self.pacing).await;
            }
            match self.api.publications_by_ids(chunk).await {
                Ok(publications) => {
                    for publication in &publications {
                        match self.store.upsert_publication_snapshot(publication).await {
                            Ok(_) => report.publications += 1,
                            Err(e) => warn!(
                                "[Enricher] Failed to store publication {}: {}",
                                publication.id, e
                            ),
                        }
                    }
                }
                Err(LensApiError::RateLimited) => {
                    warn!("[Enricher] Rate limited, dropping remaining enrichment");
                    return report;
                }
                Err(e) => warn!("[Enricher] Publications {:?} failed: {}", chunk, e),
            }
        }
        if report != EnrichReport::default() {
            info!(
                "[Enricher] Enriched {} profiles and {} publications",
                report.profiles, report.publications
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockLensApi;
    use lens_db::MemoryStore;
    use lens_schema::{Profile, Publication, PublicationKind};

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.to_string(),
            handle: Some(format!("{}.lens", id)),
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_in_chunks() {
        let api = Arc::new(MockLensApi::default());
        for id in ["0x01", "0x02", "0x03"] {
            api.add_profile(profile(id));
        }
        api.add_publication(Publication::new(
            "0x01-0x01".to_string(),
            PublicationKind::Post,
            "0x01".to_string(),
        ));
        let store = LensStore::new(Arc::new(MemoryStore::new()));
        let enricher = Enricher::new(api.clone(), store.clone(), 2, Duration::from_secs(1));

        let report = enricher
            .enrich(&[
                Unresolved::Profile("0x01".into()),
                Unresolved::Profile("0x02".into()),
                Unresolved::Profile("0x03".into()),
                Unresolved::Publication("0x01-0x01".into()),
            ])
            .await;

        assert_eq!(
            report,
            EnrichReport {
                profiles: 3,
                publications: 1
            }
        );
        assert_eq!(api.calls().len(), 3);
        assert_eq!(
            store.get_profile("0x03").await.unwrap().unwrap().handle.as_deref(),
            Some("0x03.lens")
        );
        assert!(store.publication_exists("0x01-0x01").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_stops_enrichment() {
        let api = Arc::new(MockLensApi::default());
        api.fail_next(LensApiError::RateLimited);
        let store = LensStore::new(Arc::new(MemoryStore::new()));
        let enricher = Enricher::new(api.clone(), store, 1, Duration::from_secs(1));

        let report = enricher
            .enrich(&[
                Unresolved::Profile("0x01".into()),
                Unresolved::Publication("0x01-0x01".into()),
            ])
            .await;
        assert_eq!(report, EnrichReport::default());
        assert_eq!(api.calls().len(), 1);
    }
}
