// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Named resumption points, one document per stream.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stream keys of the cursor collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CursorKey {
    /// Last block whose events are fully applied.
    SyncedBlock,
    /// Chain height recorded on first start; fallback resume point.
    StartBlock,
    /// Page token of the profile exploration walk.
    Profile,
    /// Page token of one profile's publication backfill.
    Publication(String),
    Timestamp,
    /// Present while a shutdown has been requested.
    Stop,
    LensApiQueryCount,
    /// Last publication id visited by metadata enrichment.
    UncompletePubCursor,
}

impl CursorKey {
    pub fn as_key(&self) -> String {
        match self {
            CursorKey::SyncedBlock => "syncedBlock".to_string(),
            CursorKey::StartBlock => "startBlock".to_string(),
            CursorKey::Profile => "profile".to_string(),
            CursorKey::Publication(profile_id) => format!("publication:{}", profile_id),
            CursorKey::Timestamp => "timestamp".to_string(),
            CursorKey::Stop => "stop".to_string(),
            CursorKey::LensApiQueryCount => "lensApiQueryCount".to_string(),
            CursorKey::UncompletePubCursor => "uncompletePubCursor".to_string(),
        }
    }
}

impl fmt::Display for CursorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_key())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CursorValue {
    Number(i64),
    Text(String),
}

impl CursorValue {
    pub fn as_number(&self) -> Option<i64> {
        match self {
            CursorValue::Number(n) => Some(*n),
            CursorValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CursorValue::Text(s) => Some(s),
            CursorValue::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorStatus {
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<CursorValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CursorStatus>,
}

impl Cursor {
    pub fn is_complete(&self) -> bool {
        self.status == Some(CursorStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_keys() {
        assert_eq!(CursorKey::SyncedBlock.as_key(), "syncedBlock");
        assert_eq!(CursorKey::StartBlock.as_key(), "startBlock");
        assert_eq!(CursorKey::Profile.as_key(), "profile");
        assert_eq!(
            CursorKey::Publication("0x01".to_string()).as_key(),
            "publication:0x01"
        );
        assert_eq!(CursorKey::Stop.as_key(), "stop");
        assert_eq!(CursorKey::LensApiQueryCount.as_key(), "lensApiQueryCount");
        assert_eq!(
            CursorKey::UncompletePubCursor.as_key(),
            "uncompletePubCursor"
        );
    }

    #[test]
    fn test_cursor_document_shape() {
        let cursor = Cursor {
            id: "profile".to_string(),
            value: Some(CursorValue::Text("{\"offset\":50}".to_string())),
            status: Some(CursorStatus::Complete),
        };
        let json = serde_json::to_value(&cursor).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"_id": "profile", "value": "{\"offset\":50}", "status": "complete"})
        );

        let block: Cursor =
            serde_json::from_value(serde_json::json!({"_id": "syncedBlock", "value": 1002}))
                .unwrap();
        assert_eq!(block.value.as_ref().and_then(|v| v.as_number()), Some(1002));
        assert!(!block.is_complete());
    }
}
