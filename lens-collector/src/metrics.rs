// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const TASK_LATENCY_SEC_BUCKETS: &[f64] = &[
    0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10., 30., 60., 120., 300., 600.,
];

#[derive(Clone, Debug)]
pub struct CollectorMetrics {
    pub(crate) events_total: IntCounterVec,
    pub(crate) synced_block: IntGauge,
    pub(crate) chain_height: IntGauge,
    pub(crate) window_failures_total: IntCounterVec,
    pub(crate) lens_api_queries_total: IntCounterVec,
    pub(crate) task_runs_total: IntCounterVec,
    pub(crate) task_duration_seconds: HistogramVec,
    pub(crate) content_fetch_total: IntCounterVec,
}

impl CollectorMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        Ok(Self {
            events_total: register_int_counter_vec_with_registry!(
                "lens_collector_events_total",
                "Chain events seen by the reconciler, by event kind and outcome",
                &["kind", "outcome"],
                registry,
            )?,
            synced_block: register_int_gauge_with_registry!(
                "lens_collector_synced_block",
                "Last committed synced block",
                registry,
            )?,
            chain_height: register_int_gauge_with_registry!(
                "lens_collector_chain_height",
                "Last observed chain height",
                registry,
            )?,
            window_failures_total: register_int_counter_vec_with_registry!(
                "lens_collector_window_failures_total",
                "Abandoned block windows, by error type",
                &["error_type"],
                registry,
            )?,
            lens_api_queries_total: register_int_counter_vec_with_registry!(
                "lens_collector_lens_api_queries_total",
                "Queries issued to the Lens API, by operation and outcome",
                &["operation", "outcome"],
                registry,
            )?,
            task_runs_total: register_int_counter_vec_with_registry!(
                "lens_collector_task_runs_total",
                "Periodic task runs, by task and outcome",
                &["task", "outcome"],
                registry,
            )?,
            task_duration_seconds: register_histogram_vec_with_registry!(
                "lens_collector_task_duration_seconds",
                "Duration of one periodic task run",
                &["task"],
                TASK_LATENCY_SEC_BUCKETS.to_vec(),
                registry,
            )?,
            content_fetch_total: register_int_counter_vec_with_registry!(
                "lens_collector_content_fetch_total",
                "Content resolutions, by outcome",
                &["outcome"],
                registry,
            )?,
        })
    }

    #[cfg(test)]
    pub fn new_for_testing() -> Self {
        Self::new(&Registry::new()).unwrap()
    }
}

/// Serves a registry in the Prometheus text format on `/metrics`.
pub struct MetricsService {
    address: SocketAddr,
    registry: Registry,
    cancel: CancellationToken,
}

impl MetricsService {
    pub fn new(address: SocketAddr, registry: Registry, cancel: CancellationToken) -> Self {
        Self {
            address,
            registry,
            cancel,
        }
    }

    pub async fn run(self) -> anyhow::Result<JoinHandle<()>> {
        let listener = tokio::net::TcpListener::bind(self.address).await?;
        tracing::info!("Metrics server listening on {}", self.address);
        let app = Router::new()
            .route("/metrics", get(metrics))
            .with_state(self.registry);
        let cancel = self.cancel;
        Ok(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { cancel.cancelled().await })
                .await
            {
                tracing::error!("Metrics server error: {:?}", e);
            }
        }))
    }
}

async fn metrics(State(registry): State<Registry>) -> (StatusCode, String) {
    let mut buffer = Vec::new();
    match TextEncoder::new().encode(&registry.gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            String::from_utf8_lossy(&buffer).into_owned(),
        ),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
