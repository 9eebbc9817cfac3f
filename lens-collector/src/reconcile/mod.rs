// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Reconciliation
//!
//! Applies one batch of decoded chain events to the stored projections.
//!
//! ## Phases
//!
//! The batch is classified and dispatched in four phases, each one running
//! its items with bounded concurrency and finishing before the next starts:
//!
//! 1. profile creations
//! 2. profile updates, serialized per entity and parallel across entities
//! 3. publication creations
//! 4. everything else (follows, collects, follow NFT transfers)
//!
//! A phase with any failed item fails the batch. Since every projector
//! mutation is idempotent, the caller simply replays the batch later.

mod classifier;
mod dispatch;
mod enrich;
mod projector;


pub use classifier::{classify, ClassifiedBatch};
pub use dispatch::{Applied, DispatchTable, EventHandler, HandlerContext, Unresolved};
pub use enrich::{EnrichReport, Enricher};

use crate::chain_syncer::ChainEvent;
use crate::error::{CollectorError, CollectorResult};
use crate::metrics::CollectorMetrics;
use crate::utils::run_bounded;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub total: usize,
    pub changed: usize,
    /// Replays, stale updates and unregistered kinds.
    pub unchanged: usize,
    pub superseded: usize,
    /// Distinct entities handed to enrichment.
    pub unresolved: usize,
    pub enriched: EnrichReport,
}

pub struct Reconciler {
    ctx: HandlerContext,
    dispatch: DispatchTable,
    max_task: usize,
    enricher: Option<Enricher>,
    metrics: Option<Arc<CollectorMetrics>>,
}

impl Reconciler {
    pub fn new(ctx: HandlerContext, dispatch: DispatchTable, max_task: usize) -> Self {
        Self {
            ctx,
            dispatch,
            max_task: max_task.max(1),
            enricher: None,
            metrics: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CollectorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Applies `events` phase by phase. Stop is only honored between phases.
    pub async fn apply(
        &self,
        events: Vec<ChainEvent>,
        stop: &CancellationToken,
    ) -> CollectorResult<ApplyReport> {
        let batch = classify(events);
        let mut report = ApplyReport {
            total: batch.len(),
            superseded: batch.superseded,
            ..Default::default()
        };
        let mut unresolved = BTreeSet::new();

        let ClassifiedBatch {
            creations,
            updates,
            publications,
            others,
            ..
        } = batch;

        let phases: [(&'static str, Vec<Vec<ChainEvent>>); 4] = [
            ("creation", creations.into_iter().map(|e| vec![e]).collect()),
            ("update", updates),
            ("publication", publications.into_iter().map(|e| vec![e]).collect()),
            ("other", others.into_iter().map(|e| vec![e]).collect()),
        ];
        for (phase, groups) in phases {
            if stop.is_cancelled() {
                return Err(CollectorError::Stopped);
            }
            if groups.is_empty() {
                continue;
            }
            self.run_phase(phase, groups, &mut report, &mut unresolved)
                .await?;
        }

        report.unresolved = unresolved.len();
        if let Some(enricher) = &self.enricher {
            if !unresolved.is_empty() && !stop.is_cancelled() {
                let unresolved: Vec<Unresolved> = unresolved.into_iter().collect();
                report.enriched = enricher.enrich(&unresolved).await;
            }
        }
        Ok(report)
    }

    /// Runs every group of a phase; the events of one group run in order
    /// and the group stops at its first failure.
    async fn run_phase(
        &self,
        phase: &'static str,
        groups: Vec<Vec<ChainEvent>>,
        report: &mut ApplyReport,
        unresolved: &mut BTreeSet<Unresolved>,
    ) -> CollectorResult<()> {
        let total: usize = groups.iter().map(Vec::len).sum();
        let results = run_bounded(groups, self.max_task, |group| async move {
            let mut outcomes = Vec::with_capacity(group.len());
            for event in &group {
                let outcome = self.dispatch.dispatch(&self.ctx, event).await;
                self.record(event, &outcome);
                let failed = outcome.is_err();
                outcomes.push(outcome);
                if failed {
                    break;
                }
            }
            outcomes
        })
        .await;

        let mut failed = 0;
        let mut first = None;
        for outcome in results.into_iter().flatten() {
            match outcome {
                Ok(applied) => {
                    if applied.changed {
                        report.changed += 1;
                    } else {
                        report.unchanged += 1;
                    }
                    unresolved.extend(applied.unresolved);
                }
                Err(e) => {
                    failed += 1;
                    first.get_or_insert_with(|| e.to_string());
                }
            }
        }
        match first {
            None => Ok(()),
            Some(first) => {
                warn!(
                    "[Reconciler] {} phase: {} of {} events failed, first error: {}",
                    phase, failed, total, first
                );
                Err(CollectorError::Phase {
                    phase,
                    failed,
                    total,
                    first,
                })
            }
        }
    }

    fn record(&self, event: &ChainEvent, outcome: &CollectorResult<Applied>) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        let label = match outcome {
            Ok(applied) if applied.changed => "applied",
            Ok(_) => "unchanged",
            Err(_) => "failed",
        };
        metrics
            .events_total
            .with_label_values(&[event.kind().as_ref(), label])
            .inc();
    }
}
