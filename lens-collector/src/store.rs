// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Typed access to the Lens projections on top of a [`DocumentStore`].
//!
//! Every mutation here is a single-document atomic operation (or an
//! unordered bulk insert). Monotonic updates carry their timestamp gate in
//! the filter, so the check and the write cannot interleave with another
//! writer. Counter updates carry their at-most-once marker the same way: the
//! filter requires the marker to be absent and the update writes it next to
//! the `$inc`.
//!
//! Lens API snapshots only overwrite descriptive fields. Counters, clocks and
//! event-owned fields are seeded when a snapshot creates the document and are
//! never touched afterwards.

use lens_db::{
    document_id, from_document, to_document, ActivityQuery, DayGroup, DocumentStore, Filter,
    FindOptions, ProfileQuery, StoreError, StoreResult, Update,
};
use lens_schema::{Profile, Publication, PullStatus, PROFILE_COLL, PUBLICATION_COLL, WHITELIST_COLL};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Profile fields a Lens API snapshot may overwrite.
const PROFILE_SNAPSHOT_FIELDS: &[&str] = &["handle", "name", "bio", "coverPicture", "attributes"];

/// Publication fields a Lens API snapshot may overwrite.
const PUBLICATION_SNAPSHOT_FIELDS: &[&str] = &["metadata", "appId"];

/// Outcome of a counter update guarded by an applied-event marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterOutcome {
    Applied,
    /// The marker was already present: the event was counted before.
    AlreadyApplied,
    /// No such document.
    Missing,
}

#[derive(Clone)]
pub struct LensStore {
    store: Arc<dyn DocumentStore>,
}

fn last_update_path(kind: &str) -> String {
    format!("lastUpdates.{}", kind)
}

fn applied_marker_path(marker: &str) -> String {
    format!("appliedEvents.{}", marker.replace('.', "_"))
}

/// Splits a serialized snapshot into `$set` for `live` fields and
/// `$setOnInsert` for everything else.
fn snapshot_update(doc: Value, live: &[&str]) -> StoreResult<Update> {
    let Value::Object(map) = doc else {
        return Err(StoreError::InvalidDocument(format!(
            "expected an object snapshot, got {}",
            doc
        )));
    };
    let mut update = Update::new();
    for (field, value) in map {
        if field == "_id" || value.is_null() {
            continue;
        }
        update = if live.contains(&field.as_str()) {
            update.set(&field, value)
        } else {
            update.set_on_insert(&field, value)
        };
    }
    Ok(update)
}

impl LensStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub fn documents(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    // ==================================================================
    // Profiles
    // ==================================================================

    pub async fn get_profile(&self, id: &str) -> StoreResult<Option<Profile>> {
        self.store
            .find_one(PROFILE_COLL, &Filter::id(id))
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn get_profiles(&self, ids: &[String]) -> StoreResult<Vec<Profile>> {
        self.store
            .find(PROFILE_COLL, &Filter::ids(ids.iter().cloned()), FindOptions::default())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Unordered insert; existing profiles are left untouched.
    pub async fn insert_profiles(&self, profiles: &[Profile]) -> StoreResult<usize> {
        if profiles.is_empty() {
            return Ok(0);
        }
        let docs = profiles
            .iter()
            .map(to_document)
            .collect::<StoreResult<Vec<_>>>()?;
        self.store.insert_many(PROFILE_COLL, docs).await
    }

    /// Refreshes the descriptive fields of a profile from a Lens API
    /// snapshot, creating the profile when it is unknown. Returns whether
    /// the profile was created.
    ///
    /// Stats, ownership and the event-gated fields only seed a new profile.
    /// A new profile is only seeded as default while its owner has none.
    pub async fn upsert_profile_snapshot(&self, profile: &Profile) -> StoreResult<bool> {
        let mut doc = to_document(profile)?;
        if let Value::Object(map) = &mut doc {
            map.remove("lastUpdates");
            map.remove("pullStatus");
            let owner_has_default = match profile.owned_by.as_deref() {
                Some(owner) if profile.is_default => self
                    .default_profile_of(owner)
                    .await?
                    .is_some_and(|p| p.id != profile.id),
                _ => false,
            };
            if owner_has_default {
                map.insert("isDefault".to_string(), Value::Bool(false));
            }
        }
        let update = snapshot_update(doc, PROFILE_SNAPSHOT_FIELDS)?;
        Ok(self
            .store
            .update_one(PROFILE_COLL, &Filter::id(&profile.id), &update, true)
            .await?
            .upserted)
    }

    /// [`Self::upsert_profile_snapshot`] over a page; returns how many
    /// profiles were new.
    pub async fn upsert_profile_snapshots(&self, profiles: &[Profile]) -> StoreResult<usize> {
        let mut created = 0;
        for profile in profiles {
            if self.upsert_profile_snapshot(profile).await? {
                created += 1;
            }
        }
        Ok(created)
    }

    /// Applies `update` iff the profile's clock for `kind` is unset or older
    /// than `timestamp`, stamping the clock in the same write. Creates the
    /// profile when it does not exist yet.
    pub async fn update_profile_gated(
        &self,
        id: &str,
        kind: &str,
        timestamp: i64,
        update: Update,
    ) -> StoreResult<bool> {
        let path = last_update_path(kind);
        let filter = Filter::id(id).and(Filter::older_than(&path, timestamp));
        let update = update.set(&path, timestamp);
        Ok(self
            .store
            .update_one(PROFILE_COLL, &filter, &update, true)
            .await?
            .applied())
    }

    /// Applies `update` only while `timestamp` is still the profile's clock
    /// for `kind`.
    pub async fn update_profile_if_current(
        &self,
        id: &str,
        kind: &str,
        timestamp: i64,
        update: Update,
    ) -> StoreResult<bool> {
        let filter = Filter::id(id).and(Filter::eq(&last_update_path(kind), timestamp));
        Ok(self
            .store
            .update_one(PROFILE_COLL, &filter, &update, false)
            .await?
            .applied())
    }

    /// Counter change on an existing profile, applied at most once per
    /// `marker`.
    pub async fn bump_profile_once(
        &self,
        id: &str,
        marker: &str,
        update: Update,
    ) -> StoreResult<CounterOutcome> {
        self.bump_once(PROFILE_COLL, id, marker, update).await
    }

    pub async fn default_profile_of(&self, owner: &str) -> StoreResult<Option<Profile>> {
        let filter = Filter::eq("ownedBy", owner).and(Filter::eq("isDefault", true));
        self.store
            .find_one(PROFILE_COLL, &filter)
            .await?
            .map(from_document)
            .transpose()
    }

    /// Whether a default-profile change at or after `timestamp` is already
    /// recorded for `owner`.
    pub async fn has_newer_default_change(&self, owner: &str, timestamp: i64) -> StoreResult<bool> {
        let filter = Filter::eq("ownedBy", owner)
            .and(Filter::gte(&last_update_path("DefaultProfileSet"), timestamp));
        Ok(self.store.count(PROFILE_COLL, &filter).await? > 0)
    }

    /// Clears `isDefault` on every profile of `owner` except `keep`, and
    /// advances their default-change clock to `timestamp`.
    pub async fn demote_defaults(
        &self,
        owner: &str,
        keep: Option<&str>,
        timestamp: i64,
    ) -> StoreResult<u64> {
        let mut filter = Filter::eq("ownedBy", owner);
        if let Some(keep) = keep {
            filter = filter.and(Filter::ne("_id", keep));
        }
        let update = Update::new()
            .set("isDefault", false)
            .max(&last_update_path("DefaultProfileSet"), timestamp);
        self.store.update_many(PROFILE_COLL, &filter, &update).await
    }

    /// Profiles whose publication backfill has not completed.
    pub async fn profiles_pending_pull(&self, limit: i64) -> StoreResult<Vec<String>> {
        let filter = Filter::ne("pullStatus", PullStatus::Complete.as_ref());
        Ok(self
            .store
            .find(PROFILE_COLL, &filter, FindOptions::limit(limit).sorted())
            .await?
            .iter()
            .filter_map(|doc| document_id(doc).map(str::to_string))
            .collect())
    }

    pub async fn set_pull_status(&self, id: &str, status: PullStatus) -> StoreResult<()> {
        let update = Update::new().set("pullStatus", status.as_ref());
        self.store
            .update_one(PROFILE_COLL, &Filter::id(id), &update, false)
            .await?;
        Ok(())
    }

    pub async fn profile_ids_matching(&self, query: &ProfileQuery) -> StoreResult<Vec<String>> {
        Ok(self
            .store
            .find(PROFILE_COLL, &query.to_filter(), FindOptions::default())
            .await?
            .iter()
            .filter_map(|doc| document_id(doc).map(str::to_string))
            .collect())
    }

    // ==================================================================
    // Publications
    // ==================================================================

    pub async fn publication_exists(&self, id: &str) -> StoreResult<bool> {
        Ok(self.store.count(PUBLICATION_COLL, &Filter::id(id)).await? > 0)
    }

    pub async fn get_publication(&self, id: &str) -> StoreResult<Option<Publication>> {
        self.store
            .find_one(PUBLICATION_COLL, &Filter::id(id))
            .await?
            .map(from_document)
            .transpose()
    }

    /// Returns `false` when the publication already exists.
    pub async fn insert_publication(&self, publication: &Publication) -> StoreResult<bool> {
        self.store
            .insert_one(PUBLICATION_COLL, to_document(publication)?)
            .await
    }

    pub async fn insert_publications(&self, publications: &[Publication]) -> StoreResult<usize> {
        if publications.is_empty() {
            return Ok(0);
        }
        let docs = publications
            .iter()
            .map(to_document)
            .collect::<StoreResult<Vec<_>>>()?;
        self.store.insert_many(PUBLICATION_COLL, docs).await
    }

    /// Refreshes the resolved content of a publication from a Lens API
    /// snapshot; everything else only seeds a new publication. Returns
    /// whether the publication was created.
    pub async fn upsert_publication_snapshot(
        &self,
        publication: &Publication,
    ) -> StoreResult<bool> {
        let mut doc = to_document(publication)?;
        if let Value::Object(map) = &mut doc {
            map.remove("createdBy");
        }
        let update = snapshot_update(doc, PUBLICATION_SNAPSHOT_FIELDS)?;
        Ok(self
            .store
            .update_one(
                PUBLICATION_COLL,
                &Filter::id(&publication.id),
                &update,
                true,
            )
            .await?
            .upserted)
    }

    /// Counter change on an existing publication, applied at most once per
    /// `marker`.
    pub async fn bump_publication_once(
        &self,
        id: &str,
        marker: &str,
        update: Update,
    ) -> StoreResult<CounterOutcome> {
        self.bump_once(PUBLICATION_COLL, id, marker, update).await
    }

    async fn bump_once(
        &self,
        coll: &str,
        id: &str,
        marker: &str,
        update: Update,
    ) -> StoreResult<CounterOutcome> {
        let path = applied_marker_path(marker);
        let filter = Filter::id(id).and(Filter::Exists(path.clone(), false));
        let update = update.set(&path, true);
        if self
            .store
            .update_one(coll, &filter, &update, false)
            .await?
            .applied()
        {
            return Ok(CounterOutcome::Applied);
        }
        if self.store.count(coll, &Filter::id(id)).await? > 0 {
            Ok(CounterOutcome::AlreadyApplied)
        } else {
            Ok(CounterOutcome::Missing)
        }
    }

    /// Publications without resolved metadata, in `_id` order after `after`.
    pub async fn publications_missing_metadata(
        &self,
        after: Option<&str>,
        limit: i64,
    ) -> StoreResult<Vec<Publication>> {
        let mut filter = Filter::is_null("metadata");
        if let Some(after) = after {
            filter = filter.and(Filter::gt("_id", after));
        }
        self.store
            .find(PUBLICATION_COLL, &filter, FindOptions::limit(limit).sorted())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    /// Sets metadata unless another writer resolved it first.
    pub async fn set_publication_metadata(&self, id: &str, metadata: Value) -> StoreResult<bool> {
        let mut update = Update::new();
        if let Some(app_id) = metadata.get("appId").and_then(Value::as_str) {
            update = update.set("appId", app_id);
        }
        let update = update.set("metadata", metadata);
        let filter = Filter::id(id).and(Filter::is_null("metadata"));
        Ok(self
            .store
            .update_one(PUBLICATION_COLL, &filter, &update, false)
            .await?
            .applied())
    }

    pub async fn publication_ids_of(&self, profile_id: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .store
            .find(
                PUBLICATION_COLL,
                &Filter::eq("profileId", profile_id),
                FindOptions::default(),
            )
            .await?
            .iter()
            .filter_map(|doc| document_id(doc).map(str::to_string))
            .collect())
    }

    /// Distinct publication days per profile.
    pub async fn post_days(&self, query: &ActivityQuery) -> StoreResult<Vec<DayGroup>> {
        self.store
            .group_days(PUBLICATION_COLL, &query.to_filter(), "profileId", "createdAt")
            .await
    }

    // ==================================================================
    // Whitelist, rules and catalog
    // ==================================================================

    /// Whitelisted wallet addresses, sorted. Whitelist documents are keyed by
    /// the address.
    pub async fn whitelist_addresses(&self) -> StoreResult<Vec<String>> {
        let docs = self
            .store
            .find(WHITELIST_COLL, &Filter::All, FindOptions::default())
            .await?;
        let addresses: BTreeSet<String> = docs
            .iter()
            .filter_map(document_id)
            .map(str::to_string)
            .collect();
        Ok(addresses.into_iter().collect())
    }

    pub async fn insert_all<T: Serialize>(&self, coll: &str, items: &[T]) -> StoreResult<usize> {
        if items.is_empty() {
            return Ok(0);
        }
        let docs = items
            .iter()
            .map(to_document)
            .collect::<StoreResult<Vec<_>>>()?;
        self.store.insert_many(coll, docs).await
    }

    pub async fn load_all<T: DeserializeOwned>(&self, coll: &str) -> StoreResult<Vec<T>> {
        self.store
            .find(coll, &Filter::All, FindOptions::default().sorted())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn count(&self, coll: &str) -> StoreResult<u64> {
        self.store.count(coll, &Filter::All).await
    }
}
