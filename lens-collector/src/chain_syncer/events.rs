// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoded Lens events
//!
//! These events are pure data: the scheduler produces them from raw logs and
//! the reconciliation pipeline consumes them without knowing about the ABI.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, Display};

/// Stable identity of an on-chain event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub tx_hash: String,
    pub log_index: u64,
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.log_index)
    }
}

/// Every event kind of the Lens Hub / Periphery ABI the collector knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum EventKind {
    ProfileCreated,
    DefaultProfileSet,
    DispatcherSet,
    ProfileImageURISet,
    FollowNFTURISet,
    FollowModuleSet,
    ProfileMetadataSet,
    PostCreated,
    CommentCreated,
    MirrorCreated,
    Collected,
    Followed,
    FollowNFTTransferred,
    FollowNFTDeployed,
    CollectNFTDeployed,
}

/// Dispatch phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Creation,
    ProfileUpdate,
    PublicationCreation,
    Other,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        EventKind::ProfileCreated,
        EventKind::DefaultProfileSet,
        EventKind::DispatcherSet,
        EventKind::ProfileImageURISet,
        EventKind::FollowNFTURISet,
        EventKind::FollowModuleSet,
        EventKind::ProfileMetadataSet,
        EventKind::PostCreated,
        EventKind::CommentCreated,
        EventKind::MirrorCreated,
        EventKind::Collected,
        EventKind::Followed,
        EventKind::FollowNFTTransferred,
        EventKind::FollowNFTDeployed,
        EventKind::CollectNFTDeployed,
    ];

    pub fn from_name(name: &str) -> Option<EventKind> {
        Self::ALL.into_iter().find(|k| k.as_ref() == name)
    }

    pub fn category(&self) -> EventCategory {
        match self {
            EventKind::ProfileCreated => EventCategory::Creation,
            EventKind::DefaultProfileSet
            | EventKind::DispatcherSet
            | EventKind::ProfileImageURISet
            | EventKind::FollowNFTURISet
            | EventKind::FollowModuleSet
            | EventKind::ProfileMetadataSet => EventCategory::ProfileUpdate,
            EventKind::PostCreated | EventKind::CommentCreated | EventKind::MirrorCreated => {
                EventCategory::PublicationCreation
            }
            EventKind::Collected
            | EventKind::Followed
            | EventKind::FollowNFTTransferred
            | EventKind::FollowNFTDeployed
            | EventKind::CollectNFTDeployed => EventCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationCreated {
    pub profile_id: String,
    pub pub_id: String,
    /// Absent for mirrors.
    pub content_uri: Option<String>,
    pub collect_module: Option<String>,
    pub reference_module: Option<String>,
    /// `(profileIdPointed, pubIdPointed)` for comments and mirrors.
    pub pointed: Option<(String, String)>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LensEvent {
    ProfileCreated {
        profile_id: String,
        creator: String,
        to: String,
        handle: String,
        image_uri: String,
        /// `None` for the zero address.
        follow_module: Option<String>,
        follow_nft_uri: String,
        timestamp: i64,
    },
    DefaultProfileSet {
        wallet: String,
        profile_id: String,
        timestamp: i64,
    },
    DispatcherSet {
        profile_id: String,
        /// `None` when the dispatcher is removed.
        dispatcher: Option<String>,
        timestamp: i64,
    },
    ProfileImageUriSet {
        profile_id: String,
        image_uri: String,
        timestamp: i64,
    },
    FollowNftUriSet {
        profile_id: String,
        follow_nft_uri: String,
        timestamp: i64,
    },
    FollowModuleSet {
        profile_id: String,
        follow_module: Option<String>,
        timestamp: i64,
    },
    ProfileMetadataSet {
        profile_id: String,
        metadata: String,
        timestamp: i64,
    },
    PostCreated(PublicationCreated),
    CommentCreated(PublicationCreated),
    MirrorCreated(PublicationCreated),
    Collected {
        collector: String,
        profile_id: String,
        pub_id: String,
        root_profile_id: String,
        root_pub_id: String,
        timestamp: i64,
    },
    Followed {
        follower: String,
        profile_ids: Vec<String>,
        timestamp: i64,
    },
    FollowNftTransferred {
        profile_id: String,
        follow_nft_id: String,
        /// `None` for the zero address.
        from: Option<String>,
        to: Option<String>,
        timestamp: i64,
    },
    /// Recognised by the ABI but not projected.
    Unhandled { kind: EventKind },
}

impl LensEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            LensEvent::ProfileCreated { .. } => EventKind::ProfileCreated,
            LensEvent::DefaultProfileSet { .. } => EventKind::DefaultProfileSet,
            LensEvent::DispatcherSet { .. } => EventKind::DispatcherSet,
            LensEvent::ProfileImageUriSet { .. } => EventKind::ProfileImageURISet,
            LensEvent::FollowNftUriSet { .. } => EventKind::FollowNFTURISet,
            LensEvent::FollowModuleSet { .. } => EventKind::FollowModuleSet,
            LensEvent::ProfileMetadataSet { .. } => EventKind::ProfileMetadataSet,
            LensEvent::PostCreated(_) => EventKind::PostCreated,
            LensEvent::CommentCreated(_) => EventKind::CommentCreated,
            LensEvent::MirrorCreated(_) => EventKind::MirrorCreated,
            LensEvent::Collected { .. } => EventKind::Collected,
            LensEvent::Followed { .. } => EventKind::Followed,
            LensEvent::FollowNftTransferred { .. } => EventKind::FollowNFTTransferred,
            LensEvent::Unhandled { kind } => *kind,
        }
    }

    /// Event timestamp in unix seconds, as emitted by the contract.
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            LensEvent::ProfileCreated { timestamp, .. }
            | LensEvent::DefaultProfileSet { timestamp, .. }
            | LensEvent::DispatcherSet { timestamp, .. }
            | LensEvent::ProfileImageUriSet { timestamp, .. }
            | LensEvent::FollowNftUriSet { timestamp, .. }
            | LensEvent::FollowModuleSet { timestamp, .. }
            | LensEvent::ProfileMetadataSet { timestamp, .. }
            | LensEvent::Collected { timestamp, .. }
            | LensEvent::Followed { timestamp, .. }
            | LensEvent::FollowNftTransferred { timestamp, .. } => Some(*timestamp),
            LensEvent::PostCreated(p) | LensEvent::CommentCreated(p) | LensEvent::MirrorCreated(p) => {
                Some(p.timestamp)
            }
            LensEvent::Unhandled { .. } => None,
        }
    }

    /// Bucket key of a per-entity update. Default-profile changes are
    /// serialized per wallet since they touch every profile of the owner.
    pub fn update_entity(&self) -> Option<String> {
        match self {
            LensEvent::DefaultProfileSet { wallet, .. } => Some(format!("wallet:{}", wallet)),
            LensEvent::DispatcherSet { profile_id, .. }
            | LensEvent::ProfileImageUriSet { profile_id, .. }
            | LensEvent::FollowNftUriSet { profile_id, .. }
            | LensEvent::FollowModuleSet { profile_id, .. }
            | LensEvent::ProfileMetadataSet { profile_id, .. } => Some(profile_id.clone()),
            _ => None,
        }
    }
}

/// A decoded event with its position on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub key: EventKey,
    pub block_number: u64,
    pub event: LensEvent,
}

impl ChainEvent {
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Chain order: block, then log index.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.key.log_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_names_match_abi() {
        assert_eq!(EventKind::ProfileImageURISet.to_string(), "ProfileImageURISet");
        assert_eq!(EventKind::FollowNFTTransferred.as_ref(), "FollowNFTTransferred");
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_ref()), Some(kind));
        }
        assert_eq!(EventKind::from_name("Transfer"), None);
    }

    #[test]
    fn test_event_categories() {
        assert_eq!(EventKind::ProfileCreated.category(), EventCategory::Creation);
        assert_eq!(EventKind::DefaultProfileSet.category(), EventCategory::ProfileUpdate);
        assert_eq!(EventKind::ProfileMetadataSet.category(), EventCategory::ProfileUpdate);
        assert_eq!(EventKind::MirrorCreated.category(), EventCategory::PublicationCreation);
        assert_eq!(EventKind::Followed.category(), EventCategory::Other);
        assert_eq!(EventKind::CollectNFTDeployed.category(), EventCategory::Other);
    }

    #[test]
    fn test_update_entity() {
        let set_default = LensEvent::DefaultProfileSet {
            wallet: "0xAb".to_string(),
            profile_id: "0x01".to_string(),
            timestamp: 1,
        };
        assert_eq!(set_default.update_entity().as_deref(), Some("wallet:0xAb"));
        let image = LensEvent::ProfileImageUriSet {
            profile_id: "0x01".to_string(),
            image_uri: "ipfs://x".to_string(),
            timestamp: 1,
        };
        assert_eq!(image.update_entity().as_deref(), Some("0x01"));
        let unhandled = LensEvent::Unhandled {
            kind: EventKind::FollowNFTDeployed,
        };
        assert_eq!(unhandled.update_entity(), None);
        assert_eq!(unhandled.timestamp(), None);
    }

    #[test]
    fn test_event_key_display() {
        let key = EventKey {
            tx_hash: "0xabc".to_string(),
            log_index: 7,
        };
        assert_eq!(key.to_string(), "0xabc:7");
    }
}
