// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structured predicates and updates understood by every [`DocumentStore`].
//!
//! Paths use dotted notation (`stats.totalFollowers`). [`Filter`] and
//! [`Update`] are deliberately small: they cover the conditional upserts,
//! counter increments and rule queries the collector needs, and each store
//! backend translates them into its own representation.
//!
//! [`DocumentStore`]: crate::DocumentStore

use crate::{StoreError, StoreResult};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    Eq(String, Value),
    /// Matches documents where the path is missing or differs.
    Ne(String, Value),
    In(String, Vec<Value>),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Exists(String, bool),
    /// Matches a missing path or an explicit null.
    IsNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn id(id: impl Into<String>) -> Self {
        Filter::Eq("_id".to_string(), Value::String(id.into()))
    }

    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::In(
            "_id".to_string(),
            ids.into_iter().map(|s| Value::String(s.into())).collect(),
        )
    }

    pub fn eq(path: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(path.to_string(), value.into())
    }

    pub fn ne(path: &str, value: impl Into<Value>) -> Self {
        Filter::Ne(path.to_string(), value.into())
    }

    pub fn gt(path: &str, value: impl Into<Value>) -> Self {
        Filter::Gt(path.to_string(), value.into())
    }

    pub fn gte(path: &str, value: impl Into<Value>) -> Self {
        Filter::Gte(path.to_string(), value.into())
    }

    pub fn lt(path: &str, value: impl Into<Value>) -> Self {
        Filter::Lt(path.to_string(), value.into())
    }

    pub fn is_null(path: &str) -> Self {
        Filter::IsNull(path.to_string())
    }

    /// Conjunction that flattens nested `And`s and drops `All`.
    pub fn and(self, other: Filter) -> Self {
        let mut parts = Vec::new();
        for f in [self, other] {
            match f {
                Filter::All => {}
                Filter::And(inner) => parts.extend(inner),
                f => parts.push(f),
            }
        }
        match parts.len() {
            0 => Filter::All,
            1 => parts.remove(0),
            _ => Filter::And(parts),
        }
    }

    /// Gate used by monotonic updates: the path is unset or strictly older
    /// than `timestamp`.
    pub fn older_than(path: &str, timestamp: i64) -> Self {
        Filter::Or(vec![
            Filter::Exists(path.to_string(), false),
            Filter::lt(path, timestamp),
        ])
    }

    /// Top-level equality on `_id`, used to seed upserted documents.
    pub fn id_value(&self) -> Option<&Value> {
        match self {
            Filter::Eq(path, v) if path == "_id" => Some(v),
            Filter::And(parts) => parts.iter().find_map(|f| f.id_value()),
            _ => None,
        }
    }
}

/// Field-level modifications applied atomically to one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    pub set: Vec<(String, Value)>,
    pub unset: Vec<String>,
    pub inc: Vec<(String, i64)>,
    pub max: Vec<(String, Value)>,
    /// Only written when the update creates the document.
    pub set_on_insert: Vec<(String, Value)>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set.push((path.to_string(), value.into()));
        self
    }

    pub fn unset(mut self, path: &str) -> Self {
        self.unset.push(path.to_string());
        self
    }

    pub fn inc(mut self, path: &str, by: i64) -> Self {
        self.inc.push((path.to_string(), by));
        self
    }

    pub fn max(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.max.push((path.to_string(), value.into()));
        self
    }

    pub fn set_on_insert(mut self, path: &str, value: impl Into<Value>) -> Self {
        self.set_on_insert.push((path.to_string(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.unset.is_empty()
            && self.inc.is_empty()
            && self.max.is_empty()
            && self.set_on_insert.is_empty()
    }
}

/// App restriction of a rule: either every app or an explicit id list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppScope {
    All,
    Only(Vec<String>),
}

impl AppScope {
    /// `["all", ..]` selects every app; an empty list is a rule
    /// configuration error.
    pub fn from_app_ids(app_ids: &[String]) -> StoreResult<Self> {
        match app_ids.first() {
            None => Err(StoreError::InvalidQuery(
                "Apps name not be indicated".to_string(),
            )),
            Some(first) if first == "all" => Ok(AppScope::All),
            Some(_) => Ok(AppScope::Only(app_ids.to_vec())),
        }
    }

    fn filter(&self) -> Filter {
        match self {
            AppScope::All => Filter::All,
            AppScope::Only(ids) => Filter::In(
                "appId".to_string(),
                ids.iter().cloned().map(Value::String).collect(),
            ),
        }
    }
}

/// Threshold query over profile stats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileQuery {
    pub min_followers: Option<i64>,
    pub min_posts: Option<i64>,
    pub apps: AppScope,
}

impl ProfileQuery {
    pub fn to_filter(&self) -> Filter {
        let mut filter = self.apps.filter();
        if let Some(n) = self.min_followers {
            filter = filter.and(Filter::gte("stats.totalFollowers", n));
        }
        if let Some(n) = self.min_posts {
            filter = filter.and(Filter::gte("stats.totalPosts", n));
        }
        filter
    }
}

/// Publications created on or after `since` (a `YYYY-MM-DD` day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    pub since: String,
    pub apps: AppScope,
}

impl ActivityQuery {
    pub fn to_filter(&self) -> Filter {
        self.apps
            .filter()
            .and(Filter::gte("createdAt", self.since.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_app_scope_from_ids() {
        assert_eq!(
            AppScope::from_app_ids(&["all".to_string()]).unwrap(),
            AppScope::All
        );
        assert_eq!(
            AppScope::from_app_ids(&["lenster".to_string()]).unwrap(),
            AppScope::Only(vec!["lenster".to_string()])
        );
        assert!(matches!(
            AppScope::from_app_ids(&[]),
            Err(StoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_profile_query_all_apps() {
        let q = ProfileQuery {
            min_followers: Some(100),
            min_posts: None,
            apps: AppScope::All,
        };
        assert_eq!(q.to_filter(), Filter::gte("stats.totalFollowers", 100));
    }

    #[test]
    fn test_profile_query_specific_apps() {
        let q = ProfileQuery {
            min_followers: None,
            min_posts: Some(20),
            apps: AppScope::Only(vec!["lenster".to_string()]),
        };
        assert_eq!(
            q.to_filter(),
            Filter::And(vec![
                Filter::In("appId".to_string(), vec![json!("lenster")]),
                Filter::gte("stats.totalPosts", 20),
            ])
        );
    }

    #[test]
    fn test_and_flattens() {
        let f = Filter::All
            .and(Filter::id("0x01"))
            .and(Filter::eq("a", 1).and(Filter::eq("b", 2)));
        assert_eq!(
            f,
            Filter::And(vec![
                Filter::id("0x01"),
                Filter::eq("a", 1),
                Filter::eq("b", 2)
            ])
        );
        assert_eq!(f.id_value(), Some(&json!("0x01")));
    }
}
