// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Lens Collector
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────────────────┐
//! │  Polygon RPC │   │   Lens API   │   │      Content (IPFS)      │
//! └──────┬───────┘   └──────┬───────┘   └────────────┬─────────────┘
//!        │                  │                        │
//!        ▼                  ▼                        ▼
//!    Monitor task     Profile / Publication /    Enrich task
//!  (block windows)    Whitelist sync tasks
//!        │                  │                        │
//!        └──────────────────┼────────────────────────┘
//!                           ▼
//!                 MongoDB (profiles, publications, cursors)
//!                           │
//!                           ▼
//!                Achievement / Task evaluators
//! ```
//!
//! Every task runs on its own interval and shares one stop token. A
//! persisted `stop` cursor (written by `lens-collector stop`) drains every
//! collector connected to the same database.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lens_collector::chain_syncer::{BlockWindowScheduler, ChainRpc, EthRpc, LensEventDecoder};
use lens_collector::config::CollectorConfig;
use lens_collector::content::{ContentResolver, HttpContentFetcher};
use lens_collector::cursor_store::CursorStore;
use lens_collector::lens_api::{CountingLensApi, GraphQlLensApi, LensApi, DEFAULT_LENS_API_URL};
use lens_collector::metrics::{CollectorMetrics, MetricsService};
use lens_collector::reconcile::{DispatchTable, Enricher, HandlerContext, Reconciler};
use lens_collector::rules::{seed_catalog, RuleEvaluator};
use lens_collector::store::LensStore;
use lens_collector::tasks::{
    spawn_interval_task, spawn_stop_watcher, AchievementTask, EnrichTask, MissedPublications,
    MonitorTask, PeriodicTask, ProfileSyncTask, PublicationSyncTask, RuleTask, SyncContext,
    SyncSettings, WhitelistTask,
};
use lens_db::{DbArgs, DocumentStore, MemoryStore, MongoStore};
use lens_schema::{CursorKey, PROFILE_COLL, PUBLICATION_COLL};
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const STOP_POLL_INTERVAL: Duration = Duration::from_secs(1);
const ENRICH_PACING: Duration = Duration::from_secs(1);

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[clap(rename_all = "kebab-case", author, version)]
struct Args {
    #[command(flatten)]
    db_args: DbArgs,
    /// YAML collector config; defaults apply when absent.
    #[clap(env = "LENS_COLLECTOR_CONFIG", long)]
    config: Option<PathBuf>,
    #[clap(env, long)]
    rpc_url: Option<String>,
    #[clap(env, long)]
    lens_api_url: Option<String>,
    #[clap(env, long)]
    lens_access_token: Option<String>,
    #[clap(env, long, default_value = "0.0.0.0:9184")]
    metrics_address: SocketAddr,
    /// Use a throwaway in-memory store instead of MongoDB.
    #[clap(long)]
    in_memory: bool,
    #[clap(long)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Command {
    /// Run the enabled periodic tasks until Ctrl-C or a persisted stop.
    Run,
    /// Ask every running collector sharing the database to stop.
    Stop,
    /// Print document counts and cursors.
    Status,
    /// Fetch publication ids missing between 1 and each profile's total.
    MissedPublications {
        #[clap(long, default_value_t = 1)]
        start_index: u64,
    },
}

// ============================================================================
// Initialization Helpers
// ============================================================================

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> anyhow::Result<CollectorConfig> {
    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_file(path)?,
        None => CollectorConfig::default(),
    };
    if let Some(url) = &args.rpc_url {
        config.rpc_url = Some(url.clone());
    }
    if let Some(url) = &args.lens_api_url {
        config.lens_api_url = Some(url.clone());
    }
    if let Some(token) = &args.lens_access_token {
        config.lens_access_token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(args: &Args) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if args.in_memory {
        tracing::warn!("[Main] Using the in-memory store, nothing will be persisted");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = MongoStore::connect(&args.db_args)
        .await
        .context("Failed to connect to MongoDB")?;
    tracing::info!("[Main] Connected to database {}", args.db_args.mongo_database);
    Ok(Arc::new(store))
}

fn init_metrics(
    metrics_address: SocketAddr,
    cancel: CancellationToken,
) -> anyhow::Result<(MetricsService, Arc<CollectorMetrics>)> {
    let registry =
        Registry::new_custom(None, None).context("Failed to create Prometheus registry")?;
    let metrics = Arc::new(CollectorMetrics::new(&registry)?);
    let service = MetricsService::new(metrics_address, registry, cancel);
    Ok((service, metrics))
}

fn build_lens_api(
    config: &CollectorConfig,
    cursors: CursorStore,
    metrics: Option<Arc<CollectorMetrics>>,
) -> anyhow::Result<Arc<dyn LensApi>> {
    let url = config
        .lens_api_url
        .clone()
        .unwrap_or_else(|| DEFAULT_LENS_API_URL.to_string());
    let graphql = GraphQlLensApi::new(&url, config.lens_access_token.clone())?;
    let mut api = CountingLensApi::new(Arc::new(graphql), cursors);
    if let Some(metrics) = metrics {
        api = api.with_metrics(metrics);
    }
    tracing::info!("[Main] Lens API at {}", url);
    Ok(Arc::new(api))
}

/// Records the start block on first start: the configured one, or the
/// current chain height.
async fn bootstrap_start_block(
    config: &CollectorConfig,
    cursors: &CursorStore,
    rpc: &dyn ChainRpc,
) -> anyhow::Result<u64> {
    if let Some(block) = cursors.start_block().await? {
        return Ok(block);
    }
    let block = match config.start_block {
        Some(block) => block,
        None => rpc
            .get_block_number()
            .await
            .context("Failed to read the chain height for the start block")?,
    };
    Ok(cursors.init_start_block(block).await?)
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => tracing::info!("[Main] Ctrl-C received, stopping"),
                    Err(e) => tracing::error!("[Main] Failed to listen for Ctrl-C: {:?}", e),
                }
                cancel.cancel();
            }
        }
    })
}

// ============================================================================
// Commands
// ============================================================================

async fn run(args: &Args, config: CollectorConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let (metrics_service, metrics) = init_metrics(args.metrics_address, cancel.child_token())?;

    let documents = open_store(args).await?;
    let store = LensStore::new(documents.clone());
    let cursors = CursorStore::new(documents);
    if cursors.clear_stop().await? {
        tracing::info!("[Main] Cleared a previous stop request");
    }
    seed_catalog(&store, &config.achievement_contract).await?;

    let rpc_url = config
        .rpc_url
        .clone()
        .context("--rpc-url (or rpc_url in the config file) is required")?;
    let rpc: Arc<dyn ChainRpc> = Arc::new(EthRpc::new(&rpc_url)?);
    let start_block = bootstrap_start_block(&config, &cursors, rpc.as_ref()).await?;
    tracing::info!("[Main] Start block {}", start_block);

    let api = build_lens_api(&config, cursors.clone(), Some(metrics.clone()))?;
    let content = Arc::new(
        ContentResolver::new(
            Arc::new(HttpContentFetcher::new()?),
            config.content_resolver_config(),
        )
        .with_metrics(metrics.clone()),
    );
    let reconciler = Reconciler::new(
        HandlerContext {
            store: store.clone(),
            content: content.clone(),
        },
        DispatchTable::lens(),
        config.max_task,
    )
    .with_enricher(Enricher::new(
        api.clone(),
        store.clone(),
        config.lens_data_limit as usize,
        ENRICH_PACING,
    ))
    .with_metrics(metrics.clone());
    let scheduler = BlockWindowScheduler::new(
        rpc,
        LensEventDecoder::new()?,
        cursors.clone(),
        reconciler,
        config.block_window_config()?,
    )
    .with_metrics(metrics.clone());

    let sync = SyncContext {
        api,
        store: store.clone(),
        cursors: cursors.clone(),
        settings: SyncSettings::from_config(&config),
    };
    let evaluator = RuleEvaluator::new(store.clone(), config.activity_since_date()?);
    let tasks: Vec<Arc<dyn PeriodicTask>> = vec![
        Arc::new(MonitorTask::new(scheduler)),
        Arc::new(ProfileSyncTask::new(sync.clone())),
        Arc::new(PublicationSyncTask::new(sync.clone())),
        Arc::new(WhitelistTask::new(sync)),
        Arc::new(AchievementTask::new(store.clone(), evaluator.clone())),
        Arc::new(RuleTask::new(store.clone(), evaluator)),
        Arc::new(EnrichTask::new(
            store,
            cursors.clone(),
            content,
            config.lens_data_limit,
            config.max_task,
        )),
    ];

    let mut handles = vec![
        metrics_service.run().await?,
        spawn_stop_watcher(cursors, STOP_POLL_INTERVAL, cancel.clone()),
        spawn_ctrl_c_handler(cancel.clone()),
    ];
    for task in tasks {
        let name = task.name();
        if !config.tasks.is_enabled(name) {
            tracing::info!("[Main] Task {} disabled", name);
            continue;
        }
        handles.push(spawn_interval_task(
            task,
            config.tasks.interval(name),
            cancel.clone(),
            Some(metrics.clone()),
        ));
    }

    tracing::info!("[Main] Waiting for {} tasks to complete", handles.len());
    let _ = futures::future::join_all(handles).await;
    tracing::warn!("[Main] All tasks stopped");
    Ok(())
}

async fn stop(args: &Args) -> anyhow::Result<()> {
    let cursors = CursorStore::new(open_store(args).await?);
    cursors.request_stop().await?;
    tracing::info!("[Main] Stop requested, running collectors drain within a second");
    Ok(())
}

async fn status(args: &Args) -> anyhow::Result<()> {
    let documents = open_store(args).await?;
    let store = LensStore::new(documents.clone());
    let cursors = CursorStore::new(documents);

    println!("profiles:          {}", store.count(PROFILE_COLL).await?);
    println!("publications:      {}", store.count(PUBLICATION_COLL).await?);
    println!("startBlock:        {:?}", cursors.start_block().await?);
    println!("syncedBlock:       {:?}", cursors.synced_block().await?);
    println!(
        "profile backfill:  {}",
        if cursors.is_complete(&CursorKey::Profile).await? {
            "complete"
        } else {
            "in progress"
        }
    );
    println!("lens api queries:  {}", cursors.query_count().await?);
    println!("stop requested:    {}", cursors.is_stopped().await?);
    Ok(())
}

async fn missed_publications(
    args: &Args,
    config: CollectorConfig,
    start_index: u64,
) -> anyhow::Result<()> {
    let documents = open_store(args).await?;
    let cursors = CursorStore::new(documents.clone());
    let ctx = SyncContext {
        api: build_lens_api(&config, cursors.clone(), None)?,
        store: LensStore::new(documents),
        cursors,
        settings: SyncSettings::from_config(&config),
    };
    let cancel = CancellationToken::new();
    let ctrl_c = spawn_ctrl_c_handler(cancel.clone());

    let report = MissedPublications::new(ctx).run(start_index, &cancel).await?;
    tracing::info!(
        "[Main] Missed publications: {} missing, {} added, resume with --start-index {}",
        report.missing,
        report.inserted,
        report.next_index
    );
    cancel.cancel();
    let _ = ctrl_c.await;
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_json);
    let config = load_config(&args)?;

    match &args.command {
        Command::Run => run(&args, config).await,
        Command::Stop => stop(&args).await,
        Command::Status => status(&args).await,
        Command::MissedPublications { start_index } => {
            missed_publications(&args, config, *start_index).await
        }
    }
}
