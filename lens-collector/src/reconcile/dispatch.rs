// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::projector::{
    CollectedHandler, FollowNftTransferredHandler, FollowedHandler, ProfileCreatedHandler,
    ProfileUpdateHandler, PublicationHandler,
};
use crate::chain_syncer::{ChainEvent, EventKind};
use crate::content::ContentResolver;
use crate::error::CollectorResult;
use crate::store::LensStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// An entity whose off-chain data could not be completed while applying
/// an event.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Unresolved {
    Profile(String),
    Publication(String),
}

/// What one handler did with one event.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Applied {
    /// Whether the store changed. Replays and stale events report `false`.
    pub changed: bool,
    pub unresolved: Vec<Unresolved>,
}

impl Applied {
    pub fn changed() -> Self {
        Self {
            changed: true,
            unresolved: vec![],
        }
    }

    pub fn unchanged() -> Self {
        Self::default()
    }

    pub fn from_changed(changed: bool) -> Self {
        Self {
            changed,
            unresolved: vec![],
        }
    }

    pub fn with_unresolved(mut self, unresolved: Unresolved) -> Self {
        self.unresolved.push(unresolved);
        self
    }
}

/// Shared collaborators of every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub store: LensStore,
    pub content: Arc<ContentResolver>,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied>;
}

/// Event kind to handler registry.
pub struct DispatchTable {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl DispatchTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Every projected Lens event. Deploy events stay unregistered.
    pub fn lens() -> Self {
        let updates: Arc<dyn EventHandler> = Arc::new(ProfileUpdateHandler);
        let publications: Arc<dyn EventHandler> = Arc::new(PublicationHandler);
        let mut table = Self::empty();
        table.register(EventKind::ProfileCreated, Arc::new(ProfileCreatedHandler));
        for kind in [
            EventKind::DefaultProfileSet,
            EventKind::DispatcherSet,
            EventKind::ProfileImageURISet,
            EventKind::FollowNFTURISet,
            EventKind::FollowModuleSet,
            EventKind::ProfileMetadataSet,
        ] {
            table.register(kind, updates.clone());
        }
        for kind in [
            EventKind::PostCreated,
            EventKind::CommentCreated,
            EventKind::MirrorCreated,
        ] {
            table.register(kind, publications.clone());
        }
        table.register(EventKind::Collected, Arc::new(CollectedHandler));
        table.register(EventKind::Followed, Arc::new(FollowedHandler));
        table.register(
            EventKind::FollowNFTTransferred,
            Arc::new(FollowNftTransferredHandler),
        );
        table
    }

    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        self.handlers.insert(kind, handler);
    }

    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Unregistered kinds are skipped.
    pub async fn dispatch(
        &self,
        ctx: &HandlerContext,
        event: &ChainEvent,
    ) -> CollectorResult<Applied> {
        match self.handlers.get(&event.kind()) {
            Some(handler) => handler.apply(ctx, event).await,
            None => {
                debug!("[Dispatch] No handler for {} at {}", event.kind(), event.key);
                Ok(Applied::unchanged())
            }
        }
    }
}
