// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! MongoDB backend.
//!
//! Documents cross the [`DocumentStore`] boundary as JSON; they are converted
//! to BSON on the way in and to relaxed extended JSON on the way out.

use crate::query::{Filter, Update};
use crate::{DayGroup, DbArgs, DocumentStore, FindOptions, StoreError, StoreResult, UpdateOutcome};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use futures::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::info;

/// Server code for a unique index violation.
const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(args: &DbArgs) -> StoreResult<Self> {
        info!("[MongoStore] Connecting to database '{}'", args.mongo_database);
        let client = Client::with_uri_str(&args.mongo_uri)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect to MongoDB: {}", e)))?;
        let db = client.database(&args.mongo_database);

        tokio::time::timeout(args.connection_timeout(), db.run_command(doc! { "ping": 1 }))
            .await
            .map_err(|_| StoreError::Database("MongoDB ping timed out".to_string()))?
            .map_err(|e| StoreError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("[MongoStore] Connected to database '{}'", args.mongo_database);
        Ok(Self { db })
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn find(
        &self,
        coll: &str,
        filter: &Filter,
        options: FindOptions,
    ) -> StoreResult<Vec<Value>> {
        let collection = self.collection(coll);
        let mut action = collection.find(filter_to_document(filter)?);
        if let Some(limit) = options.limit {
            action = action.limit(limit);
        }
        if options.sort_by_id {
            action = action.sort(doc! { "_id": 1 });
        }
        let cursor = action.await.map_err(db_error("find"))?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(db_error("find"))?;
        Ok(docs.into_iter().map(document_to_json).collect())
    }

    async fn find_one(&self, coll: &str, filter: &Filter) -> StoreResult<Option<Value>> {
        let doc = self
            .collection(coll)
            .find_one(filter_to_document(filter)?)
            .await
            .map_err(db_error("find_one"))?;
        Ok(doc.map(document_to_json))
    }

    async fn insert_one(&self, coll: &str, doc: Value) -> StoreResult<bool> {
        match self.collection(coll).insert_one(json_to_document(&doc)?).await {
            Ok(_) => Ok(true),
            Err(e) if duplicate_count(&e).is_some() => Ok(false),
            Err(e) => Err(db_error("insert_one")(e)),
        }
    }

    async fn insert_many(&self, coll: &str, docs: Vec<Value>) -> StoreResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        let total = docs.len();
        let docs = docs
            .iter()
            .map(json_to_document)
            .collect::<StoreResult<Vec<_>>>()?;
        match self.collection(coll).insert_many(docs).ordered(false).await {
            Ok(result) => Ok(result.inserted_ids.len()),
            Err(e) => match duplicate_count(&e) {
                Some(duplicates) => Ok(total.saturating_sub(duplicates)),
                None => Err(db_error("insert_many")(e)),
            },
        }
    }

    async fn update_one(
        &self,
        coll: &str,
        filter: &Filter,
        update: &Update,
        upsert: bool,
    ) -> StoreResult<UpdateOutcome> {
        let result = self
            .collection(coll)
            .update_one(filter_to_document(filter)?, update_to_document(update)?)
            .upsert(upsert)
            .await;
        match result {
            Ok(r) => Ok(UpdateOutcome {
                matched: r.matched_count,
                modified: r.modified_count,
                upserted: r.upserted_id.is_some(),
            }),
            // A gated upsert whose filter rejected the stored document.
            Err(e) if duplicate_count(&e).is_some() => Ok(UpdateOutcome::default()),
            Err(e) => Err(db_error("update_one")(e)),
        }
    }

    async fn update_many(&self, coll: &str, filter: &Filter, update: &Update) -> StoreResult<u64> {
        let result = self
            .collection(coll)
            .update_many(filter_to_document(filter)?, update_to_document(update)?)
            .await
            .map_err(db_error("update_many"))?;
        Ok(result.modified_count)
    }

    async fn delete_one(&self, coll: &str, filter: &Filter) -> StoreResult<bool> {
        let result = self
            .collection(coll)
            .delete_one(filter_to_document(filter)?)
            .await
            .map_err(db_error("delete_one"))?;
        Ok(result.deleted_count > 0)
    }

    async fn count(&self, coll: &str, filter: &Filter) -> StoreResult<u64> {
        self.collection(coll)
            .count_documents(filter_to_document(filter)?)
            .await
            .map_err(db_error("count"))
    }

    async fn group_days(
        &self,
        coll: &str,
        filter: &Filter,
        group_by: &str,
        date_field: &str,
    ) -> StoreResult<Vec<DayGroup>> {
        let pipeline = vec![
            doc! { "$match": filter_to_document(filter)? },
            doc! {
                "$group": {
                    "_id": format!("${}", group_by),
                    "days": { "$addToSet": { "$substrBytes": [format!("${}", date_field), 0, 10] } },
                }
            },
        ];
        let cursor = self
            .collection(coll)
            .aggregate(pipeline)
            .await
            .map_err(db_error("aggregate"))?;
        let docs: Vec<Document> = cursor.try_collect().await.map_err(db_error("aggregate"))?;

        let mut groups: Vec<DayGroup> = docs
            .into_iter()
            .filter_map(|d| {
                let key = d.get_str("_id").ok()?.to_string();
                let mut days: Vec<String> = d
                    .get_array("days")
                    .ok()?
                    .iter()
                    .filter_map(|b| b.as_str().map(str::to_string))
                    .collect();
                days.sort();
                days.dedup();
                Some(DayGroup { key, days })
            })
            .collect();
        groups.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(groups)
    }
}

fn db_error(op: &'static str) -> impl Fn(mongodb::error::Error) -> StoreError {
    move |e| StoreError::Database(format!("{} failed: {}", op, e))
}

/// Number of duplicate-key write errors when they are the only failures.
fn duplicate_count(err: &mongodb::error::Error) -> Option<usize> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => Some(1),
        ErrorKind::InsertMany(failure) => {
            if failure.write_concern_error.is_some() {
                return None;
            }
            let errors = failure.write_errors.as_ref()?;
            errors
                .iter()
                .all(|e| e.code == DUPLICATE_KEY)
                .then_some(errors.len())
        }
        _ => None,
    }
}

fn json_to_bson(value: &Value) -> StoreResult<Bson> {
    bson::to_bson(value).map_err(|e| StoreError::InvalidDocument(e.to_string()))
}

fn json_to_document(value: &Value) -> StoreResult<Document> {
    match json_to_bson(value)? {
        Bson::Document(d) => Ok(d),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a document, got {}",
            other
        ))),
    }
}

fn document_to_json(doc: Document) -> Value {
    Bson::Document(doc).into_relaxed_extjson()
}

fn single(key: &str, value: Bson) -> Document {
    let mut d = Document::new();
    d.insert(key, value);
    d
}

fn operator(op: &str, path: &str, value: &Value) -> StoreResult<Document> {
    Ok(single(path, Bson::Document(single(op, json_to_bson(value)?))))
}

pub(crate) fn filter_to_document(filter: &Filter) -> StoreResult<Document> {
    Ok(match filter {
        Filter::All => Document::new(),
        Filter::Eq(path, v) => single(path, json_to_bson(v)?),
        Filter::Ne(path, v) => operator("$ne", path, v)?,
        Filter::In(path, values) => {
            let values = values.iter().map(json_to_bson).collect::<StoreResult<Vec<_>>>()?;
            single(path, Bson::Document(single("$in", Bson::Array(values))))
        }
        Filter::Gt(path, v) => operator("$gt", path, v)?,
        Filter::Gte(path, v) => operator("$gte", path, v)?,
        Filter::Lt(path, v) => operator("$lt", path, v)?,
        Filter::Lte(path, v) => operator("$lte", path, v)?,
        Filter::Exists(path, exists) => {
            single(path, Bson::Document(single("$exists", Bson::Boolean(*exists))))
        }
        Filter::IsNull(path) => single(path, Bson::Null),
        Filter::And(parts) => single("$and", combine(parts)?),
        Filter::Or(parts) => single("$or", combine(parts)?),
    })
}

fn combine(parts: &[Filter]) -> StoreResult<Bson> {
    let docs = parts
        .iter()
        .map(|f| filter_to_document(f).map(Bson::Document))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(Bson::Array(docs))
}

pub(crate) fn update_to_document(update: &Update) -> StoreResult<Document> {
    let mut out = Document::new();
    if !update.set.is_empty() {
        let mut set = Document::new();
        for (path, v) in &update.set {
            set.insert(path.as_str(), json_to_bson(v)?);
        }
        out.insert("$set", set);
    }
    if !update.unset.is_empty() {
        let unset: Document = update
            .unset
            .iter()
            .map(|p| (p.clone(), Bson::String(String::new())))
            .collect();
        out.insert("$unset", unset);
    }
    if !update.inc.is_empty() {
        let inc: Document = update
            .inc
            .iter()
            .map(|(p, by)| (p.clone(), Bson::Int64(*by)))
            .collect();
        out.insert("$inc", inc);
    }
    if !update.max.is_empty() {
        let mut max = Document::new();
        for (path, v) in &update.max {
            max.insert(path.as_str(), json_to_bson(v)?);
        }
        out.insert("$max", max);
    }
    if !update.set_on_insert.is_empty() {
        let mut on_insert = Document::new();
        for (path, v) in &update.set_on_insert {
            on_insert.insert(path.as_str(), json_to_bson(v)?);
        }
        out.insert("$setOnInsert", on_insert);
    }
    if out.is_empty() {
        return Err(StoreError::InvalidQuery("empty update".to_string()));
    }
    Ok(out)
}
