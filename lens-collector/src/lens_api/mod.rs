// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lens API capability
//!
//! The collector only needs five paginated or by-id queries. Results are
//! already normalized into the stored document models.

use async_trait::async_trait;
use lens_schema::{Profile, Publication};

pub mod counting;
pub mod graphql;

pub use counting::CountingLensApi;
pub use graphql::{GraphQlLensApi, DEFAULT_LENS_API_URL};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LensApiError {
    // HTTP 429
    #[error("rate limited")]
    RateLimited,

    // HTTP 404 or an empty/null result
    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP status {status}")]
    Http { status: u16 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

pub type LensApiResult<T> = Result<T, LensApiError>;

/// One page of results and the token of the next page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

#[async_trait]
pub trait LensApi: Send + Sync {
    /// Every profile, oldest first.
    async fn explore_profiles(&self, cursor: Option<&str>, limit: i64)
        -> LensApiResult<Page<Profile>>;

    async fn profiles_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Profile>>;

    async fn profiles_by_owners(
        &self,
        owners: &[String],
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Profile>>;

    /// Posts, comments and mirrors of one profile.
    async fn publications_by_profile(
        &self,
        profile_id: &str,
        cursor: Option<&str>,
        limit: i64,
    ) -> LensApiResult<Page<Publication>>;

    async fn publications_by_ids(&self, ids: &[String]) -> LensApiResult<Vec<Publication>>;
}
