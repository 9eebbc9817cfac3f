// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Document store capability shared by every collector task.
//!
//! The store is the only shared mutable resource of the collector. All
//! writes are single-document atomic: upserts, conditional updates and
//! unordered bulk inserts whose duplicate-key failures are swallowed.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub mod memory;
pub mod mongo;
pub mod query;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use query::{ActivityQuery, AppScope, Filter, ProfileQuery, Update};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(clap::Args, Debug, Clone)]
pub struct DbArgs {
    #[arg(env, long, default_value = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    #[arg(env, long, default_value = "lens")]
    pub mongo_database: String,

    // Time spent waiting for the initial ping, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub db_connection_timeout_ms: u64,
}

impl DbArgs {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.db_connection_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub limit: Option<i64>,
    /// Ascending `_id` order.
    pub sort_by_id: bool,
}

impl FindOptions {
    pub fn limit(limit: i64) -> Self {
        Self {
            limit: Some(limit),
            sort_by_id: false,
        }
    }

    pub fn sorted(mut self) -> Self {
        self.sort_by_id = true;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

impl UpdateOutcome {
    /// Whether the filter selected a document or the upsert created one.
    pub fn applied(&self) -> bool {
        self.matched > 0 || self.upserted
    }
}

/// Distinct `YYYY-MM-DD` days of `date_field` grouped by `group_by`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGroup {
    pub key: String,
    /// Sorted, unique.
    pub days: Vec<String>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, coll: &str, filter: &Filter, options: FindOptions)
        -> StoreResult<Vec<Value>>;

    async fn find_one(&self, coll: &str, filter: &Filter) -> StoreResult<Option<Value>>;

    /// Returns `false` when a document with the same `_id` already exists.
    async fn insert_one(&self, coll: &str, doc: Value) -> StoreResult<bool>;

    /// Unordered insert; returns how many documents were new.
    async fn insert_many(&self, coll: &str, docs: Vec<Value>) -> StoreResult<usize>;

    /// An upsert that collides with an existing `_id` (the filter rejected
    /// the stored document) reports an outcome that is not applied.
    async fn update_one(
        &self,
        coll: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome>;

    async fn update_many(&self, coll: &str, filter: &Filter, update: &Update) -> StoreResult<u64>;

    async fn delete_one(&self, coll: &str, filter: &Filter) -> StoreResult<bool>;

    async fn count(&self, coll: &str, filter: &Filter) -> StoreResult<u64>;

    async fn group_days(
        &self,
        coll: &str,
        filter: &Filter,
        group_by: &str,
        date_field: &str,
    ) -> StoreResult<Vec<DayGroup>>;
}

pub fn to_document<T: serde::Serialize>(value: &T) -> StoreResult<Value> {
    serde_json::to_value(value).map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

pub fn from_document<T: serde::de::DeserializeOwned>(doc: Value) -> StoreResult<T> {
    serde_json::from_value(doc).map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

/// The `_id` of a stored document, when it is a string.
pub fn document_id(doc: &Value) -> Option<&str> {
    doc.get("_id").and_then(Value::as_str)
}
