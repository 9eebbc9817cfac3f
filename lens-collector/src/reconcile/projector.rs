// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic projection of Lens events onto the stored profiles and
//! publications.
//!
//! Two rules keep every mutation safe under replay and reordering:
//! - Fields that hold the latest value of something are written through a
//!   per-kind clock (`lastUpdates.<Kind>`). The write applies only while the
//!   stored clock is unset or older than the event, and stamps the clock in
//!   the same operation.
//! - Counters are incremented at most once per event and target. Every
//!   `$inc` is written together with an applied-event marker on the same
//!   document, under a filter requiring the marker to be absent. A batch that
//!   fails halfway is replayed from the last committed block and completes
//!   exactly the effects that were not written yet.

use super::dispatch::{Applied, EventHandler, HandlerContext, Unresolved};
use crate::chain_syncer::{ChainEvent, LensEvent, PublicationCreated};
use crate::content::{real_image_uri, real_image_uri_value};
use crate::error::CollectorResult;
use crate::store::CounterOutcome;
use async_trait::async_trait;
use lens_db::Update;
use lens_schema::{iso_timestamp, publication_id, Publication, PublicationKind, PublicationRef};
use serde_json::Value;
use tracing::{debug, warn};

/// Profile id that clears the default profile of a wallet.
const NO_PROFILE: &str = "0x00";

/// Marker of one counter effect of `event`. An event can bump several
/// documents, or one document twice, so every effect has its own slot.
fn counter_marker(event: &ChainEvent, slot: &str) -> String {
    format!("{}:{}", event.key, slot)
}

/// Folds one guarded counter update into `result`. A missing document is
/// reported as `missing` for enrichment.
fn record(result: &mut Applied, outcome: CounterOutcome, missing: Option<Unresolved>) {
    match outcome {
        CounterOutcome::Applied => result.changed = true,
        CounterOutcome::AlreadyApplied => {}
        CounterOutcome::Missing => {
            if let Some(missing) = missing {
                result.unresolved.push(missing);
            }
        }
    }
}

pub struct ProfileCreatedHandler;

#[async_trait]
impl EventHandler for ProfileCreatedHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let LensEvent::ProfileCreated {
            profile_id,
            to,
            handle,
            image_uri,
            follow_module,
            follow_nft_uri,
            timestamp,
            ..
        } = &event.event
        else {
            return Ok(Applied::unchanged());
        };

        let mut update = Update::new()
            .set("ownedBy", to.as_str())
            .set("handle", handle.as_str())
            .set("followNftUri", follow_nft_uri.as_str());
        if !image_uri.is_empty() {
            update = update.set("picture", real_image_uri(image_uri));
        }
        if let Some(module) = follow_module {
            update = update.set("followModule", module.as_str());
        }
        if let Some(created_at) = iso_timestamp(*timestamp) {
            update = update.set("createdAt", created_at);
        }
        let changed = ctx
            .store
            .update_profile_gated(profile_id, event.kind().as_ref(), *timestamp, update)
            .await?;
        Ok(Applied::from_changed(changed))
    }
}

/// Latest-value updates of one profile, and the per-wallet default
/// profile switch.
pub struct ProfileUpdateHandler;

impl ProfileUpdateHandler {
    async fn set_default(
        &self,
        ctx: &HandlerContext,
        wallet: &str,
        profile_id: &str,
        timestamp: i64,
    ) -> CollectorResult<Applied> {
        let store = &ctx.store;
        if store.has_newer_default_change(wallet, timestamp).await? {
            return Ok(Applied::unchanged());
        }
        if profile_id == NO_PROFILE {
            let demoted = store.demote_defaults(wallet, None, timestamp).await?;
            return Ok(Applied::from_changed(demoted > 0));
        }

        let update = Update::new()
            .set("isDefault", true)
            .set("ownedBy", wallet);
        let applied = store
            .update_profile_gated(profile_id, "DefaultProfileSet", timestamp, update)
            .await?;
        if !applied {
            return Ok(Applied::unchanged());
        }
        let demoted = store
            .demote_defaults(wallet, Some(profile_id), timestamp)
            .await?;
        debug!(
            "[Projector] {} is the default profile of {}, {} demoted",
            profile_id, wallet, demoted
        );
        Ok(Applied::changed())
    }

    async fn set_metadata(
        &self,
        ctx: &HandlerContext,
        profile_id: &str,
        metadata: &str,
        timestamp: i64,
    ) -> CollectorResult<Applied> {
        const KIND: &str = "ProfileMetadataSet";
        let applied = ctx
            .store
            .update_profile_gated(
                profile_id,
                KIND,
                timestamp,
                Update::new().set("metadata", metadata),
            )
            .await?;
        if !applied {
            return Ok(Applied::unchanged());
        }

        let Some(content) = ctx.content.resolve(metadata).await else {
            return Ok(
                Applied::changed().with_unresolved(Unresolved::Profile(profile_id.to_string()))
            );
        };
        // A newer metadata event may have landed while the content was
        // fetched; its own resolution wins then.
        ctx.store
            .update_profile_if_current(profile_id, KIND, timestamp, profile_content(&content))
            .await?;
        Ok(Applied::changed())
    }
}

/// Profile fields taken from resolved profile metadata.
fn profile_content(content: &Value) -> Update {
    let mut update = Update::new();
    for field in ["name", "bio"] {
        if let Some(value) = content.get(field).and_then(Value::as_str) {
            update = update.set(field, value);
        }
    }
    if let Some(cover) = content.get("coverPicture").and_then(real_image_uri_value) {
        update = update.set("coverPicture", cover);
    }
    if let Some(attributes) = content.get("attributes").filter(|a| a.is_array()) {
        update = update.set("attributes", attributes.clone());
    }
    update
}

#[async_trait]
impl EventHandler for ProfileUpdateHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let kind = event.kind();
        let (profile_id, timestamp, update) = match &event.event {
            LensEvent::DefaultProfileSet {
                wallet,
                profile_id,
                timestamp,
            } => return self.set_default(ctx, wallet, profile_id, *timestamp).await,
            LensEvent::ProfileMetadataSet {
                profile_id,
                metadata,
                timestamp,
            } => return self.set_metadata(ctx, profile_id, metadata, *timestamp).await,
            LensEvent::DispatcherSet {
                profile_id,
                dispatcher,
                timestamp,
            } => (
                profile_id,
                *timestamp,
                set_or_unset("dispatcher", dispatcher.as_deref()),
            ),
            LensEvent::FollowModuleSet {
                profile_id,
                follow_module,
                timestamp,
            } => (
                profile_id,
                *timestamp,
                set_or_unset("followModule", follow_module.as_deref()),
            ),
            LensEvent::ProfileImageUriSet {
                profile_id,
                image_uri,
                timestamp,
            } => {
                let picture = (!image_uri.is_empty()).then(|| real_image_uri(image_uri));
                (
                    profile_id,
                    *timestamp,
                    set_or_unset("picture", picture.as_deref()),
                )
            }
            LensEvent::FollowNftUriSet {
                profile_id,
                follow_nft_uri,
                timestamp,
            } => (
                profile_id,
                *timestamp,
                Update::new().set("followNftUri", follow_nft_uri.as_str()),
            ),
            _ => return Ok(Applied::unchanged()),
        };
        let changed = ctx
            .store
            .update_profile_gated(profile_id, kind.as_ref(), timestamp, update)
            .await?;
        Ok(Applied::from_changed(changed))
    }
}

fn set_or_unset(path: &str, value: Option<&str>) -> Update {
    match value {
        Some(value) => Update::new().set(path, value),
        None => Update::new().unset(path),
    }
}

/// Post, comment and mirror creation.
pub struct PublicationHandler;

#[async_trait]
impl EventHandler for PublicationHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let (kind, created) = match &event.event {
            LensEvent::PostCreated(p) => (PublicationKind::Post, p),
            LensEvent::CommentCreated(p) => (PublicationKind::Comment, p),
            LensEvent::MirrorCreated(p) => (PublicationKind::Mirror, p),
            _ => return Ok(Applied::unchanged()),
        };
        let id = publication_id(&created.profile_id, &created.pub_id);
        let event_key = event.key.to_string();

        let mut result = Applied::unchanged();
        match ctx.store.get_publication(&id).await? {
            // Inserted by the Lens API sync, which already counted it.
            Some(stored) if stored.created_by.as_deref() != Some(event_key.as_str()) => {
                return Ok(Applied::unchanged())
            }
            // Inserted by an earlier attempt of this event; finish its counters.
            Some(_) => {}
            None => {
                let mut publication = new_publication(id.clone(), kind, created);
                publication.created_by = Some(event_key);
                if let Some(uri) = &created.content_uri {
                    match ctx.content.resolve(uri).await {
                        Some(metadata) => {
                            publication.app_id = metadata
                                .get("appId")
                                .and_then(Value::as_str)
                                .map(str::to_string);
                            publication.metadata = Some(metadata);
                        }
                        None => result.unresolved.push(Unresolved::Publication(id.clone())),
                    }
                }
                if !ctx.store.insert_publication(&publication).await? {
                    return Ok(Applied::unchanged());
                }
                result.changed = true;
            }
        }

        let counter = match kind {
            PublicationKind::Post => "stats.totalPosts",
            PublicationKind::Comment => "stats.totalComments",
            PublicationKind::Mirror => "stats.totalMirrors",
        };
        let author = Update::new()
            .inc(counter, 1)
            .inc("stats.totalPublications", 1);
        let outcome = ctx
            .store
            .bump_profile_once(&created.profile_id, &counter_marker(event, "author"), author)
            .await?;
        record(
            &mut result,
            outcome,
            Some(Unresolved::Profile(created.profile_id.clone())),
        );

        let target = created.pointed.as_ref().and_then(|(profile_id, pub_id)| {
            let counter = match kind {
                PublicationKind::Comment => "stats.totalAmountOfComments",
                PublicationKind::Mirror => "stats.totalAmountOfMirrors",
                PublicationKind::Post => return None,
            };
            Some((publication_id(profile_id, pub_id), counter))
        });
        if let Some((target, counter)) = target {
            let outcome = ctx
                .store
                .bump_publication_once(
                    &target,
                    &counter_marker(event, "target"),
                    Update::new().inc(counter, 1),
                )
                .await?;
            if outcome == CounterOutcome::Missing {
                debug!("[Projector] {} references unknown {}", id, target);
            }
            record(&mut result, outcome, Some(Unresolved::Publication(target)));
        }
        Ok(result)
    }
}

fn new_publication(
    id: String,
    kind: PublicationKind,
    created: &PublicationCreated,
) -> Publication {
    let mut publication = Publication::new(id, kind, created.profile_id.clone());
    publication.content_uri = created.content_uri.clone();
    publication.collect_module = created.collect_module.clone();
    publication.reference_module = created.reference_module.clone();
    publication.created_at = iso_timestamp(created.timestamp);
    if let Some((profile_id, pub_id)) = &created.pointed {
        let pointed = PublicationRef {
            id: publication_id(profile_id, pub_id),
        };
        match kind {
            PublicationKind::Comment => publication.comment_on = Some(pointed),
            PublicationKind::Mirror => publication.mirror_of = Some(pointed),
            PublicationKind::Post => {}
        }
    }
    publication
}

pub struct CollectedHandler;

#[async_trait]
impl EventHandler for CollectedHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let LensEvent::Collected {
            profile_id,
            pub_id,
            timestamp,
            ..
        } = &event.event
        else {
            return Ok(Applied::unchanged());
        };

        let mut result = Applied::unchanged();
        let id = publication_id(profile_id, pub_id);
        let update = Update::new()
            .inc("stats.totalAmountOfCollects", 1)
            .max("stats.luCollected", *timestamp);
        let outcome = ctx
            .store
            .bump_publication_once(&id, &counter_marker(event, "publication"), update)
            .await?;
        record(&mut result, outcome, Some(Unresolved::Publication(id)));

        let owner = Update::new().inc("stats.totalCollects", 1);
        let outcome = ctx
            .store
            .bump_profile_once(profile_id, &counter_marker(event, "owner"), owner)
            .await?;
        record(
            &mut result,
            outcome,
            Some(Unresolved::Profile(profile_id.clone())),
        );
        Ok(result)
    }
}

pub struct FollowedHandler;

#[async_trait]
impl EventHandler for FollowedHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let LensEvent::Followed {
            follower,
            profile_ids,
            timestamp,
        } = &event.event
        else {
            return Ok(Applied::unchanged());
        };

        let mut result = Applied::unchanged();
        for profile_id in profile_ids {
            let update = Update::new()
                .inc("stats.totalFollowers", 1)
                .max("stats.luFollowed", *timestamp);
            let marker = counter_marker(event, &format!("follower:{}", profile_id));
            let outcome = ctx
                .store
                .bump_profile_once(profile_id, &marker, update)
                .await?;
            record(
                &mut result,
                outcome,
                Some(Unresolved::Profile(profile_id.clone())),
            );
        }
        match ctx.store.default_profile_of(follower).await? {
            Some(profile) => {
                let update = Update::new()
                    .inc("stats.totalFollowing", profile_ids.len() as i64)
                    .max("stats.luFollowed", *timestamp);
                let outcome = ctx
                    .store
                    .bump_profile_once(&profile.id, &counter_marker(event, "following"), update)
                    .await?;
                record(&mut result, outcome, None);
            }
            None => debug!("[Projector] Follower {} has no default profile", follower),
        }
        Ok(result)
    }
}

pub struct FollowNftTransferredHandler;

#[async_trait]
impl EventHandler for FollowNftTransferredHandler {
    async fn apply(&self, ctx: &HandlerContext, event: &ChainEvent) -> CollectorResult<Applied> {
        let LensEvent::FollowNftTransferred {
            from,
            to,
            timestamp,
            ..
        } = &event.event
        else {
            return Ok(Applied::unchanged());
        };
        // Mints are counted by `Followed`.
        let Some(from) = from else {
            return Ok(Applied::unchanged());
        };

        let mut result = Applied::unchanged();
        for (slot, wallet, delta) in [("from", Some(from), -1), ("to", to.as_ref(), 1)] {
            let Some(wallet) = wallet else { continue };
            match ctx.store.default_profile_of(wallet).await? {
                Some(profile) => {
                    let update = Update::new()
                        .inc("stats.totalFollowing", delta)
                        .max("stats.luFNT", *timestamp);
                    let outcome = ctx
                        .store
                        .bump_profile_once(&profile.id, &counter_marker(event, slot), update)
                        .await?;
                    record(&mut result, outcome, None);
                }
                None => warn!(
                    "[Projector] {} of {} skipped: {} has no default profile",
                    event.kind(),
                    event.key,
                    wallet
                ),
            }
        }
        Ok(result)
    }
}
