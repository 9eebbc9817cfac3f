// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::PeriodicTask;
use crate::config::TaskName;
use crate::content::ContentResolver;
use crate::cursor_store::CursorStore;
use crate::store::LensStore;
use crate::utils::run_bounded;
use async_trait::async_trait;
use lens_schema::{CursorKey, Publication};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Resolves the content of publications stored without metadata.
///
/// Walks in `_id` order from the `uncompletePubCursor`; the cursor starts over
/// once a short page shows the end was reached, so publications whose content
/// could not be fetched are retried on the next pass.
pub struct EnrichTask {
    store: LensStore,
    cursors: CursorStore,
    content: Arc<ContentResolver>,
    page_limit: i64,
    max_task: usize,
}

impl EnrichTask {
    pub fn new(
        store: LensStore,
        cursors: CursorStore,
        content: Arc<ContentResolver>,
        page_limit: i64,
        max_task: usize,
    ) -> Self {
        Self {
            store,
            cursors,
            content,
            page_limit,
            max_task,
        }
    }

    async fn enrich_one(&self, publication: &Publication) -> anyhow::Result<bool> {
        let Some(uri) = publication.content_uri.as_deref() else {
            return Ok(false);
        };
        match self.content.resolve(uri).await {
            Some(metadata) => Ok(self
                .store
                .set_publication_metadata(&publication.id, metadata)
                .await?),
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PeriodicTask for EnrichTask {
    fn name(&self) -> TaskName {
        TaskName::Enrich
    }

    async fn run_once(&self, stop: &CancellationToken) -> anyhow::Result<()> {
        let key = CursorKey::UncompletePubCursor;
        let after = self.cursors.page(&key).await?;
        let page = self
            .store
            .publications_missing_metadata(after.as_deref(), self.page_limit)
            .await?;
        if stop.is_cancelled() {
            return Ok(());
        }

        let results = run_bounded(page.clone(), self.max_task, |p| async move {
            self.enrich_one(&p).await
        })
        .await;
        let mut resolved = 0;
        for result in results {
            if result? {
                resolved += 1;
            }
        }

        if (page.len() as i64) < self.page_limit {
            self.cursors.delete(&key).await?;
            debug!("[Enrich] Reached the end, starting over");
        } else if let Some(last) = page.last() {
            self.cursors.set_page(&key, &last.id).await?;
        }
        if !page.is_empty() {
            info!(
                "[Enrich] Resolved metadata of {} of {} publications after {:?}",
                resolved,
                page.len(),
                after
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentResolverConfig;
    use crate::test_utils::MockContentFetcher;
    use lens_db::MemoryStore;
    use lens_schema::PublicationKind;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        store: LensStore,
        cursors: CursorStore,
        fetcher: Arc<MockContentFetcher>,
        task: EnrichTask,
    }

    fn fixture(page_limit: i64) -> Fixture {
        let documents = Arc::new(MemoryStore::new());
        let store = LensStore::new(documents.clone());
        let cursors = CursorStore::new(documents);
        let fetcher = Arc::new(MockContentFetcher::default());
        let content = ContentResolver::new(
            fetcher.clone(),
            ContentResolverConfig {
                timeout: Duration::from_secs(1),
                retries: 1,
                retry_delay: Duration::ZERO,
            },
        );
        let task = EnrichTask::new(
            store.clone(),
            cursors.clone(),
            Arc::new(content),
            page_limit,
            2,
        );
        Fixture {
            store,
            cursors,
            fetcher,
            task,
        }
    }

    async fn add_publication(store: &LensStore, id: &str, uri: &str) {
        let mut publication = Publication::new(id.to_string(), PublicationKind::Post, "0xa1".into());
        publication.content_uri = Some(uri.to_string());
        store.insert_publication(&publication).await.unwrap();
    }

    #[tokio::test]
    async fn test_pages_through_and_starts_over() {
        let fixture = fixture(2);
        for (id, uri) in [
            ("0xa1-0x01", "https://arweave.net/one"),
            ("0xa1-0x02", "https://arweave.net/two"),
            ("0xa1-0x03", "https://arweave.net/missing"),
        ] {
            add_publication(&fixture.store, id, uri).await;
        }
        fixture
            .fetcher
            .insert("https://arweave.net/one", json!({"content": "one", "appId": "lenster"}));
        fixture
            .fetcher
            .insert("https://arweave.net/two", json!({"content": "two"}));
        let stop = CancellationToken::new();

        fixture.task.run_once(&stop).await.unwrap();
        assert_eq!(
            fixture
                .cursors
                .page(&CursorKey::UncompletePubCursor)
                .await
                .unwrap()
                .as_deref(),
            Some("0xa1-0x02")
        );
        let one = fixture.store.get_publication("0xa1-0x01").await.unwrap().unwrap();
        assert_eq!(one.metadata, Some(json!({"content": "one", "appId": "lenster"})));
        assert_eq!(one.app_id.as_deref(), Some("lenster"));

        // The unresolvable publication ends the pass and resets the cursor.
        fixture.task.run_once(&stop).await.unwrap();
        assert_eq!(
            fixture.cursors.page(&CursorKey::UncompletePubCursor).await.unwrap(),
            None
        );
        let missing = fixture.store.get_publication("0xa1-0x03").await.unwrap().unwrap();
        assert_eq!(missing.metadata, None);
        assert_eq!(
            fixture
                .store
                .publications_missing_metadata(None, 10)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_disallowed_uri_is_not_fetched() {
        let fixture = fixture(10);
        add_publication(&fixture.store, "0xa1-0x01", "ftp://example.com/post").await;
        fixture.task.run_once(&CancellationToken::new()).await.unwrap();
        assert!(fixture.fetcher.requests().is_empty());
    }
}
