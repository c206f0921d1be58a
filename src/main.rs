//! auction-enricher server entry point.
//!
//! Wires the event store, cache, resolvers, job queue, worker pool and
//! notification relay, then serves REST and WebSocket endpoints until
//! interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use auction_enricher::api;
use auction_enricher::app_state::AppState;
use auction_enricher::cache::{CacheCoordinator, CacheStore, InMemoryCacheStore, RedisCacheStore};
use auction_enricher::config::{EnricherConfig, LogFormat, ResolverMode, StoreBackend};
use auction_enricher::domain::{ChangeBus, Clock, SystemClock};
use auction_enricher::pagination::PaginationService;
use auction_enricher::persistence::{EventStore, InMemoryEventStore, PostgresEventStore};
use auction_enricher::queue::{EnrichmentWorker, InMemoryJobQueue, JobQueue};
use auction_enricher::relay::{NotificationRelay, SubscriberSet};
use auction_enricher::resolver::{
    HttpNameResolver, HttpPriceResolver, NameResolver, PriceResolver, StaticNameResolver,
    StaticPriceResolver,
};

const CACHE_PURGE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = EnricherConfig::from_env().context("loading configuration")?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, "starting auction-enricher");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Event store
    let store: Arc<dyn EventStore> = match config.store_backend {
        StoreBackend::Postgres => {
            let store = PostgresEventStore::connect(
                &config.database_url,
                config.database_max_connections,
            )
            .await
            .context("connecting to postgres")?;
            store.migrate().await.context("applying migrations")?;
            Arc::new(store)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory event store; events are lost on restart");
            Arc::new(InMemoryEventStore::new(ChangeBus::new(
                config.change_bus_capacity,
            )))
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Cache
    let cache_store: Arc<dyn CacheStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisCacheStore::connect(url)
                .await
                .context("connecting to redis")?,
        ),
        None => {
            tracing::warn!("REDIS_URL unset; cache and locks are process-local");
            let memory = Arc::new(InMemoryCacheStore::new(Arc::clone(&clock)));
            tokio::spawn(purge_expired(Arc::clone(&memory), shutdown_rx.clone()));
            memory
        }
    };

    let (names, prices): (Arc<dyn NameResolver>, Arc<dyn PriceResolver>) =
        match config.resolver_mode {
            ResolverMode::Http => {
                let name_url = config
                    .name_resolver_url
                    .clone()
                    .context("NAME_RESOLVER_URL is required")?;
                let price_url = config
                    .price_resolver_url
                    .clone()
                    .context("PRICE_RESOLVER_URL is required")?;
                (
                    Arc::new(HttpNameResolver::new(name_url, config.resolver_timeout)?),
                    Arc::new(HttpPriceResolver::new(price_url, config.resolver_timeout)?),
                )
            }
            ResolverMode::Static => {
                tracing::info!(eth_usd = config.static_eth_usd, "using static resolvers");
                (
                    Arc::new(StaticNameResolver::new()),
                    Arc::new(StaticPriceResolver::new(config.static_eth_usd)),
                )
            }
        };

    let coordinator =
        CacheCoordinator::new(cache_store, names, prices, Arc::clone(&clock), config.lock);

    // Queue and workers
    let queue: Arc<dyn JobQueue> = Arc::new(
        InMemoryJobQueue::new(Arc::clone(&clock), config.retry)
            .with_retention(config.job_retention),
    );
    let worker = Arc::new(EnrichmentWorker::new(
        Arc::clone(&queue),
        Arc::clone(&store),
        coordinator,
        Arc::clone(&clock),
        config.worker,
    ));
    let worker_task = tokio::spawn(worker.run(shutdown_rx.clone()));

    // Live fan-out
    let relay = NotificationRelay::new(
        Arc::clone(&store),
        Arc::new(SubscriberSet::new(config.subscriber_buffer)),
    );
    let changes = store
        .subscribe_changes()
        .await
        .context("subscribing to change notifications")?;
    let relay_task = tokio::spawn(relay.clone().run(changes, shutdown_rx.clone()));

    let app_state = AppState {
        pagination: Arc::new(PaginationService::new(Arc::clone(&store))),
        queue,
        relay,
        ws_ping_interval: config.ws_ping_interval,
    };
    let app = api::build_app(app_state, config.request_timeout);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("shutting down background tasks");
    shutdown_tx.send_replace(true);
    for (name, task) in [("worker", worker_task), ("relay", relay_task)] {
        if let Err(err) = task.await {
            tracing::error!(task = name, error = %err, "background task panicked");
        }
    }

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn purge_expired(store: Arc<InMemoryCacheStore>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(CACHE_PURGE_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => store.purge_expired(),
            _ = shutdown.changed() => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
