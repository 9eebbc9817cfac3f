// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! In-memory document store with the same semantics as the MongoDB backend.
//!
//! Collections are `_id`-ordered maps of JSON documents behind a single
//! `RwLock`, so every operation is atomic with respect to the others.

use crate::query::{Filter, Update};
use crate::{
    document_id, DayGroup, DocumentStore, FindOptions, StoreError, StoreResult, UpdateOutcome,
};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

type Collection = BTreeMap<String, Value>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document of a collection, in `_id` order.
    pub async fn dump(&self, coll: &str) -> Vec<Value> {
        let collections = self.collections.read().await;
        collections
            .get(coll)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        coll: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Value>> {
        let collections = self.collections.read().await;
        let Some(c) = collections.get(coll) else {
            return Ok(vec![]);
        };
        // BTreeMap iteration is already ascending by `_id`.
        let limit = options
            .limit
            .filter(|l| *l > 0)
            .map(|l| l as usize)
            .unwrap_or(usize::MAX);
        Ok(c.values()
            .filter(|doc| matches(doc, filter))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn find_one(&self, coll: &str, filter: &Filter) -> StoreResult<Option<Value>> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(coll)
            .and_then(|c| c.values().find(|doc| matches(doc, filter)).cloned()))
    }

    async fn insert_one(&self, coll: &str, doc: Value) -> StoreResult<bool> {
        let id = require_id(&doc)?;
        let mut collections = self.collections.write().await;
        let c = collections.entry(coll.to_string()).or_default();
        if c.contains_key(&id) {
            return Ok(false);
        }
        c.insert(id, doc);
        Ok(true)
    }

    async fn insert_many(&self, coll: &str, docs: Vec<Value>) -> StoreResult<usize> {
        let mut collections = self.collections.write().await;
        let c = collections.entry(coll.to_string()).or_default();
        let mut inserted = 0;
        for doc in docs {
            let id = require_id(&doc)?;
            if let std::collections::btree_map::Entry::Vacant(e) = c.entry(id) {
                e.insert(doc);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn update_one(
        &self,
        coll: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        let mut collections = self.collections.write().await;
        let c = collections.entry(coll.to_string()).or_default();

        if let Some(doc) = c.values_mut().find(|doc| matches(doc, filter)) {
            let before = doc.clone();
            apply_update(doc, update);
            return Ok(UpdateOutcome {
                matched: 1,
                modified: u64::from(*doc != before),
                upserted: false,
            });
        }
        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let id = match filter.id_value() {
            Some(Value::String(id)) => id.clone(),
            _ => {
                return Err(StoreError::InvalidQuery(
                    "upsert requires an _id equality".to_string(),
                ))
            }
        };
        if c.contains_key(&id) {
            // The stored document exists but the filter rejected it.
            return Ok(UpdateOutcome::default());
        }
        let mut doc = Value::Object(Map::new());
        set_path(&mut doc, "_id", Value::String(id.clone()));
        apply_update(&mut doc, update);
        for (path, value) in &update.set_on_insert {
            set_path(&mut doc, path, value.clone());
        }
        c.insert(id, doc);
        Ok(UpdateOutcome {
            matched: 0,
            modified: 0,
            upserted: true,
        })
    }

    async fn update_many(&self, coll: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let mut collections = self.collections.write().await;
        let Some(c) = collections.get_mut(coll) else {
            return Ok(0);
        };
        let mut modified = 0;
        for doc in c.values_mut().filter(|doc| matches(doc, filter)) {
            let before = doc.clone();
            apply_update(doc, update);
            if *doc != before {
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_one(&self, coll: &str, filter: &Filter) -> StoreResult<bool> {
        let mut collections = self.collections.write().await;
        let Some(c) = collections.get_mut(coll) else {
            return Ok(false);
        };
        let id = c
            .iter()
            .find(|(_, doc)| matches(doc, filter))
            .map(|(id, _)| id.clone());
        Ok(id.map(|id| c.remove(&id).is_some()).unwrap_or(false))
    }

    async fn count(&self, coll: &str, filter: &Filter) -> StoreResult<u64> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(coll)
            .map(|c| c.values().filter(|doc| matches(doc, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn group_days(
        &self,
        coll: &str,
        filter: &Filter,
        group_by: &str,
        date_field: &str,
    ) -> StoreResult<Vec<DayGroup>> {
        let collections = self.collections.read().await;
        let Some(c) = collections.get(coll) else {
            return Ok(vec![]);
        };
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for doc in c.values().filter(|doc| matches(doc, filter)) {
            let key = get_path(doc, group_by).and_then(Value::as_str);
            let date = get_path(doc, date_field).and_then(Value::as_str);
            if let (Some(key), Some(date)) = (key, date) {
                let day: String = date.chars().take(10).collect();
                groups.entry(key.to_string()).or_default().insert(day);
            }
        }
        Ok(groups
            .into_iter()
            .map(|(key, days)| DayGroup {
                key,
                days: days.into_iter().collect(),
            })
            .collect())
    }
}

fn require_id(doc: &Value) -> StoreResult<String> {
    document_id(doc)
        .map(str::to_string)
        .ok_or_else(|| StoreError::InvalidDocument(format!("missing string _id in {}", doc)))
}

fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |cur, key| cur.get(key))
}

fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut cur = doc;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        if !cur.is_object() {
            *cur = Value::Object(Map::new());
        }
        let Value::Object(map) = cur else {
            return;
        };
        if keys.peek().is_none() {
            map.insert(key.to_string(), value);
            return;
        }
        cur = map
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn unset_path(doc: &mut Value, path: &str) {
    let (parent, last) = match path.rsplit_once('.') {
        Some((parent, last)) => (parent, last),
        None => ("", path),
    };
    let target = if parent.is_empty() {
        Some(doc)
    } else {
        parent
            .split('.')
            .try_fold(doc, |cur, key| cur.get_mut(key))
    };
    if let Some(Value::Object(map)) = target {
        map.remove(last);
    }
}

fn apply_update(doc: &mut Value, update: &Update) {
    for (path, value) in &update.set {
        set_path(doc, path, value.clone());
    }
    for path in &update.unset {
        unset_path(doc, path);
    }
    for (path, by) in &update.inc {
        let current = get_path(doc, path).and_then(Value::as_i64).unwrap_or(0);
        set_path(doc, path, Value::from(current + by));
    }
    for (path, value) in &update.max {
        let replace = match get_path(doc, path) {
            None | Some(Value::Null) => true,
            Some(current) => compare(value, current) == Some(Ordering::Greater),
        };
        if replace {
            set_path(doc, path, value.clone());
        }
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(doc: &Value, filter: &Filter) -> bool {
    let cmp = |path: &str, v: &Value, ok: fn(Ordering) -> bool| {
        get_path(doc, path)
            .and_then(|cur| compare(cur, v))
            .map(ok)
            .unwrap_or(false)
    };
    match filter {
        Filter::All => true,
        Filter::Eq(path, v) => get_path(doc, path) == Some(v),
        Filter::Ne(path, v) => get_path(doc, path) != Some(v),
        Filter::In(path, values) => get_path(doc, path)
            .map(|cur| values.contains(cur))
            .unwrap_or(false),
        Filter::Gt(path, v) => cmp(path, v, |o| o == Ordering::Greater),
        Filter::Gte(path, v) => cmp(path, v, |o| o != Ordering::Less),
        Filter::Lt(path, v) => cmp(path, v, |o| o == Ordering::Less),
        Filter::Lte(path, v) => cmp(path, v, |o| o != Ordering::Greater),
        Filter::Exists(path, exists) => get_path(doc, path).is_some() == *exists,
        Filter::IsNull(path) => matches!(get_path(doc, path), None | Some(Value::Null)),
        Filter::And(parts) => parts.iter().all(|f| matches(doc, f)),
        Filter::Or(parts) => parts.iter().any(|f| matches(doc, f)),
    }
}
