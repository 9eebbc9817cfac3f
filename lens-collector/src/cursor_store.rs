// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Cursor Store
//!
//! Persisted resumption points, one document per stream in the `cursor`
//! collection.
//!
//! ## Block Semantics
//! - `syncedBlock` is the last block whose events are fully applied. It is
//!   only written after the reconciliation of a window succeeded.
//! - `startBlock` is recorded once, on first start, and is the resume point
//!   until the first window commits.

use crate::error::{CollectorError, CollectorResult};
use lens_db::{from_document, to_document, DocumentStore, Filter, StoreResult, Update};
use lens_schema::{Cursor, CursorKey, CursorStatus, CursorValue, CURSOR_COLL};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct CursorStore {
    store: Arc<dyn DocumentStore>,
}

impl CursorStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &CursorKey) -> StoreResult<Option<Cursor>> {
        self.store
            .find_one(CURSOR_COLL, &Filter::id(key.as_key()))
            .await?
            .map(from_document)
            .transpose()
    }

    async fn number(&self, key: &CursorKey) -> StoreResult<Option<u64>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|c| c.value)
            .and_then(|v| v.as_number())
            .and_then(|n| u64::try_from(n).ok()))
    }

    async fn set_value(&self, key: &CursorKey, value: CursorValue) -> StoreResult<()> {
        let update = Update::new().set("value", to_document(&value)?);
        self.store
            .update_one(CURSOR_COLL, &Filter::id(key.as_key()), &update, true)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, key: &CursorKey) -> StoreResult<bool> {
        self.store
            .delete_one(CURSOR_COLL, &Filter::id(key.as_key()))
            .await
    }

    pub async fn synced_block(&self) -> StoreResult<Option<u64>> {
        self.number(&CursorKey::SyncedBlock).await
    }

    /// The commit point of a reconciled window.
    pub async fn commit_synced_block(&self, block: u64) -> StoreResult<()> {
        self.set_value(&CursorKey::SyncedBlock, CursorValue::Number(block as i64))
            .await?;
        debug!("[CursorStore] Committed syncedBlock {}", block);
        Ok(())
    }

    pub async fn start_block(&self) -> StoreResult<Option<u64>> {
        self.number(&CursorKey::StartBlock).await
    }

    /// Records `block` as the start block unless one is already stored.
    /// Returns the effective start block.
    pub async fn init_start_block(&self, block: u64) -> StoreResult<u64> {
        if let Some(existing) = self.start_block().await? {
            info!("[CursorStore] Found startBlock {}", existing);
            return Ok(existing);
        }
        self.set_value(&CursorKey::StartBlock, CursorValue::Number(block as i64))
            .await?;
        info!("[CursorStore] Recorded startBlock {}", block);
        Ok(block)
    }

    /// `syncedBlock`, falling back to `startBlock`.
    pub async fn resume_block(&self) -> CollectorResult<u64> {
        if let Some(block) = self.synced_block().await? {
            return Ok(block);
        }
        self.start_block()
            .await?
            .ok_or(CollectorError::MissingResumePoint)
    }

    /// Wall-clock time of the last committed window, in milliseconds.
    pub async fn set_timestamp(&self, millis: i64) -> StoreResult<()> {
        self.set_value(&CursorKey::Timestamp, CursorValue::Number(millis))
            .await
    }

    pub async fn page(&self, key: &CursorKey) -> StoreResult<Option<String>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|c| c.value)
            .and_then(|v| v.as_text().map(str::to_string)))
    }

    pub async fn set_page(&self, key: &CursorKey, token: &str) -> StoreResult<()> {
        self.set_value(key, CursorValue::Text(token.to_string()))
            .await
    }

    pub async fn is_complete(&self, key: &CursorKey) -> StoreResult<bool> {
        Ok(self.get(key).await?.map(|c| c.is_complete()).unwrap_or(false))
    }

    pub async fn mark_complete(&self, key: &CursorKey) -> StoreResult<()> {
        let update = Update::new().set("status", to_document(&CursorStatus::Complete)?);
        self.store
            .update_one(CURSOR_COLL, &Filter::id(key.as_key()), &update, true)
            .await?;
        info!("[CursorStore] Cursor {} complete", key);
        Ok(())
    }

    pub async fn is_stopped(&self) -> StoreResult<bool> {
        Ok(self.get(&CursorKey::Stop).await?.is_some())
    }

    pub async fn request_stop(&self) -> StoreResult<()> {
        self.set_value(&CursorKey::Stop, CursorValue::Number(1)).await
    }

    pub async fn clear_stop(&self) -> StoreResult<bool> {
        self.delete(&CursorKey::Stop).await
    }

    pub async fn increment_query_count(&self) -> StoreResult<()> {
        let update = Update::new().inc("value", 1);
        self.store
            .update_one(
                CURSOR_COLL,
                &Filter::id(CursorKey::LensApiQueryCount.as_key()),
                &update,
                true,
            )
            .await?;
        Ok(())
    }

    pub async fn query_count(&self) -> StoreResult<u64> {
        Ok(self
            .number(&CursorKey::LensApiQueryCount)
            .await?
            .unwrap_or(0))
    }
}
