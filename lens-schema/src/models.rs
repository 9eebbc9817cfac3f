// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum_macros::{AsRefStr, Display};

/// Backfill progress of a profile's publication history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum PullStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    #[serde(default)]
    pub total_followers: i64,
    #[serde(default)]
    pub total_following: i64,
    #[serde(default)]
    pub total_posts: i64,
    #[serde(default)]
    pub total_comments: i64,
    #[serde(default)]
    pub total_mirrors: i64,
    #[serde(default)]
    pub total_publications: i64,
    #[serde(default)]
    pub total_collects: i64,
    /// Timestamp of the newest follow applied to the counters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lu_followed: Option<i64>,
    #[serde(
        default,
        rename = "luFNT",
        skip_serializing_if = "Option::is_none"
    )]
    pub lu_fnt: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owned_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_picture: Option<String>,
    /// Off-chain metadata URI set by `ProfileMetadataSet`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_nft_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatcher: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default)]
    pub stats: ProfileStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_status: Option<PullStatus>,
    /// Event timestamp of the newest applied update, per event kind.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub last_updates: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum PublicationKind {
    Post,
    Comment,
    Mirror,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationRef {
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicationStats {
    #[serde(default)]
    pub total_amount_of_collects: i64,
    #[serde(default)]
    pub total_amount_of_mirrors: i64,
    #[serde(default)]
    pub total_amount_of_comments: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lu_collected: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Publication {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "__typename")]
    pub kind: PublicationKind,
    pub profile_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_uri: Option<String>,
    /// Resolved off-chain content; null until the resolver succeeds.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collect_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_module: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_on: Option<PublicationRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mirror_of: Option<PublicationRef>,
    #[serde(default)]
    pub stats: PublicationStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// Key of the chain event that inserted the publication; unset when it
    /// came from the Lens API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl Publication {
    pub fn new(id: String, kind: PublicationKind, profile_id: String) -> Self {
        Self {
            id,
            kind,
            profile_id,
            content_uri: None,
            metadata: None,
            app_id: None,
            collect_module: None,
            reference_module: None,
            comment_on: None,
            mirror_of: None,
            stats: PublicationStats::default(),
            created_at: None,
            created_by: None,
        }
    }
}

/// ISO-8601 with millisecond precision, e.g. `2022-12-01T00:00:00.000Z`.
/// Out-of-range timestamps yield `None`.
pub fn iso_timestamp(unix_seconds: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(unix_seconds, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_iso_timestamp() {
        assert_eq!(
            iso_timestamp(1_669_852_800).as_deref(),
            Some("2022-12-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_profile_document_shape() {
        let mut profile = Profile {
            id: "0xa1".to_string(),
            owned_by: Some("0x00000000000000000000000000000000000000A1".to_string()),
            handle: Some("alice.lens".to_string()),
            ..Default::default()
        };
        profile.stats.lu_fnt = Some(10);
        profile
            .last_updates
            .insert("DispatcherSet".to_string(), 42);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["_id"], "0xa1");
        assert_eq!(json["ownedBy"], "0x00000000000000000000000000000000000000A1");
        assert_eq!(json["isDefault"], false);
        assert_eq!(json["stats"]["totalFollowers"], 0);
        assert_eq!(json["stats"]["luFNT"], 10);
        assert_eq!(json["lastUpdates"]["DispatcherSet"], 42);
        assert!(json.get("pullStatus").is_none());

        let back: Profile = serde_json::from_value(json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_partial_profile_document_deserializes() {
        let profile: Profile = serde_json::from_value(serde_json::json!({
            "_id": "0x05",
            "stats": {"totalFollowers": 3},
            "pullStatus": "complete"
        }))
        .unwrap();
        assert_eq!(profile.stats.total_followers, 3);
        assert_eq!(profile.pull_status, Some(PullStatus::Complete));
        assert!(!profile.is_default);
    }

    #[test]
    fn test_publication_document_shape() {
        let mut publication = Publication::new(
            "0xa1-0x02".to_string(),
            PublicationKind::Comment,
            "0xa1".to_string(),
        );
        publication.comment_on = Some(PublicationRef {
            id: "0xb2-0x01".to_string(),
        });
        let json = serde_json::to_value(&publication).unwrap();
        assert_eq!(json["__typename"], "Comment");
        assert_eq!(json["profileId"], "0xa1");
        assert_eq!(json["commentOn"]["id"], "0xb2-0x01");
        assert!(json["metadata"].is_null());
    }
}
