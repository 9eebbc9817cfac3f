// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_syncer::{ChainEvent, EventCategory};
use std::collections::HashMap;

/// One batch of decoded events split into the four dispatch phases.
#[derive(Debug, Default)]
pub struct ClassifiedBatch {
    pub creations: Vec<ChainEvent>,
    /// One bucket per entity in order of first appearance. A bucket keeps
    /// the latest event of each kind, in chain order.
    pub updates: Vec<Vec<ChainEvent>>,
    pub publications: Vec<ChainEvent>,
    pub others: Vec<ChainEvent>,
    /// Update events dropped in favor of a newer one of the same kind for
    /// the same entity.
    pub superseded: usize,
}

impl ClassifiedBatch {
    pub fn len(&self) -> usize {
        self.creations.len()
            + self.updates.iter().map(Vec::len).sum::<usize>()
            + self.publications.len()
            + self.others.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn classify(mut events: Vec<ChainEvent>) -> ClassifiedBatch {
    events.sort_by_key(ChainEvent::position);

    let mut batch = ClassifiedBatch::default();
    let mut entities: Vec<String> = Vec::new();
    let mut buckets: HashMap<String, Vec<ChainEvent>> = HashMap::new();

    for event in events {
        match event.kind().category() {
            EventCategory::Creation => batch.creations.push(event),
            EventCategory::PublicationCreation => batch.publications.push(event),
            EventCategory::Other => batch.others.push(event),
            EventCategory::ProfileUpdate => {
                let Some(entity) = event.event.update_entity() else {
                    batch.others.push(event);
                    continue;
                };
                let bucket = buckets.entry(entity.clone()).or_insert_with(|| {
                    entities.push(entity);
                    Vec::new()
                });
                match bucket.iter().position(|e| e.kind() == event.kind()) {
                    None => bucket.push(event),
                    Some(pos) => {
                        batch.superseded += 1;
                        // Chain order wins unless the kept event carries a
                        // later timestamp.
                        if event.event.timestamp() >= bucket[pos].event.timestamp() {
                            bucket.remove(pos);
                            bucket.push(event);
                        }
                    }
                }
            }
        }
    }

    batch.updates = entities
        .into_iter()
        .filter_map(|entity| buckets.remove(&entity))
        .collect();
    batch
}
