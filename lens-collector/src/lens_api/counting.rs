// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{LensApi, LensApiError, LensApiResult, Page};
use crate::cursor_store::CursorStore;
use crate::metrics::CollectorMetrics;
use async_trait::async_trait;
use lens_schema::{Profile, Publication};
use std::sync::Arc;
use tracing::warn;

/// Counts every issued query in the persisted `lensApiQueryCount` cursor
/// and in the query metrics.
pub struct CountingLensApi {
    inner: Arc<dyn LensApi>,
    cursors: CursorStore,
    metrics: Option<Arc<CollectorMetrics>>,
}

impl CountingLensApi {
    pub fn new(inner: Arc<dyn LensApi>, cursors: CursorStore) -> Self {
        Self {
            inner,
            cursors,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CollectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn count<T>(&self, operation: &str, result: LensApiResult<T>) -> LensApiResult<T> {
        if let Err(e) = self.cursors.increment_query_count().await {
            warn!("[LensApi] Failed to count {} query: {}", operation, e);
        }
        if let Some(metrics) = &self.metrics {
            let outcome = match &result {
                Ok(_) => "ok",
                Err(LensApiError::RateLimited) => "rate_limited",
                Err(LensApiError::NotFound(_)) => "not_found",
                Err(_) => "error",
            };
            metrics
                .lens_api_queries_total
                .with_label_values(&[operation, outcome])
                .inc();
        }
        result
    }
}

#[async_trait]
impl LensApi for CountingLensApi {
    async fn explore_profiles(
        &self,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let result = self.inner.explore_profiles(cursor, limit).await;
        self.count("explore_profiles", result).await
    }

    async fn profiles_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Profile>> {
        let result = self.inner.profiles_by_ids(ids).await;
        self.count("profiles_by_ids", result).await
    }

    async fn profiles_by_owners(
        &self,
        owners: &[String],
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>> {
        let result = self.inner.profiles_by_owners(owners, cursor, limit).await;
        self.count("profiles_by_owners", result).await
    }

    async fn publications_by_profile(
        &self,
        profile_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Publication>> {
        let result = self
            .inner
            .publications_by_profile(profile_id, cursor, limit)
            .await;
        self.count("publications_by_profile", result).await
    }

    async fn publications_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Publication>> {
        let result = self.inner.publications_by_ids(ids).await;
        self.count("publications_by_ids", result).await
    }
}
