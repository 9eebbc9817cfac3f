// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_syncer::SyncError;
use crate::lens_api::LensApiError;
use lens_db::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    LensApi(#[from] LensApiError),

    // Failures of one dispatch phase; the window is not committed
    #[error("{phase} phase failed for {failed} of {total} events: {first}")]
    Phase {
        phase: &'static str,
        failed: usize,
        total: usize,
        first: String,
    },

    // Stop was requested before the commit point
    #[error("stop requested")]
    Stopped,

    // Neither syncedBlock nor startBlock is recorded
    #[error("no resume block recorded")]
    MissingResumePoint,

    #[error("invalid config: {0}")]
    Config(String),
}

impl CollectorError {
    /// Short stable label for metrics.
    pub fn error_type(&self) -> &'static str {
        match self {
            CollectorError::Store(_) => "store",
            CollectorError::Sync(SyncError::Decode(_)) => "decode",
            CollectorError::Sync(_) => "rpc",
            CollectorError::LensApi(LensApiError::RateLimited) => "rate_limited",
            CollectorError::LensApi(LensApiError::NotFound(_)) => "not_found",
            CollectorError::LensApi(_) => "lens_api",
            CollectorError::Phase { .. } => "phase",
            CollectorError::Stopped => "stopped",
            CollectorError::MissingResumePoint => "missing_resume_point",
            CollectorError::Config(_) => "config",
        }
    }
}

pub type CollectorResult<T> = Result<T, CollectorError>;
