// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persisted document models for the Lens collector.
//!
//! Every model serializes to the camelCase document shape kept in the
//! store, with the entity id under `_id`.

pub mod cursor;
pub mod ids;
pub mod models;
pub mod rules;

pub use cursor::{Cursor, CursorKey, CursorStatus, CursorValue};
pub use ids::{hex_id, parse_hex_id, publication_id, split_publication_id};
pub use models::{
    iso_timestamp, Profile, ProfileStats, Publication, PublicationKind, PublicationRef,
    PublicationStats, PullStatus,
};

pub const PROFILE_COLL: &str = "profile";
pub const PUBLICATION_COLL: &str = "publication";
pub const CURSOR_COLL: &str = "cursor";
pub const WHITELIST_COLL: &str = "whitelist";
pub const ACHIEVEMENT_COLL: &str = "achievement";
pub const TASK_COLL: &str = "task";
pub const ACHV_TMPL_COLL: &str = "achievement-tmpl";
pub const BENEFIT_TMPL_COLL: &str = "benefit-tmpl";
pub const TASK_TMPL_COLL: &str = "task-tmpl";
pub const APP_COLL: &str = "app";
