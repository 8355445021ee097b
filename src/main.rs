use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info, warn};

use slotbook::cache::SystemClock;
use slotbook::compactor::run_compactor;
use slotbook::config::Config;
use slotbook::engine::Engine;
use slotbook::notify::NotifyHub;
use slotbook::service::SlotService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    slotbook::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let catalog = config.catalog()?;
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.wal_path(), catalog, notify)?);
    let service = Arc::new(SlotService::new(
        engine.clone(),
        config.cache_ttl,
        Arc::new(SystemClock),
        config.retry_policy(),
    ));

    let start = config
        .horizon_start
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let created = service.seed_horizon(start, config.horizon_days).await?;

    info!("slotbook ready");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  slots per day: {}", engine.catalog().len());
    info!("  dates: {} ({created} new)", engine.date_count());
    info!("  cache ttl: {:?}", config.cache_ttl);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let end = u64::from(config.horizon_days)
        .checked_sub(1)
        .and_then(|span| start.checked_add_days(chrono::Days::new(span)));
    if let Some(end) = end {
        match service.list_availability(start, end).await {
            Ok(dates) => info!("availability: {}", serde_json::to_string(&dates)?),
            Err(e) => warn!("availability summary skipped: {e}"),
        }
    }

    if config.demo_clients > 0 {
        run_demo(&service, start, config.demo_clients).await;
    }

    let compactor = tokio::spawn(run_compactor(engine.clone(), config.compact_threshold));

    // Graceful shutdown on SIGTERM/ctrl-c
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }

    info!("shutdown signal received");
    compactor.abort();
    if let Err(e) = engine.compact_wal().await {
        warn!("final compaction failed: {e}");
    }
    info!("slotbook stopped");
    Ok(())
}

/// `clients` owners race for the first slot of `date`; one should win.
async fn run_demo(service: &SlotService, date: slotbook::model::DateId, clients: usize) {
    let Some(&slot) = service.engine().catalog().list_time_slots().first() else {
        return;
    };
    let owners: Vec<String> = (0..clients).map(|i| format!("demo-{i}")).collect();
    let attempts = owners.iter().map(|owner| service.book(date, slot, owner));
    let results = join_all(attempts).await;

    let mut winners = 0;
    for (owner, result) in owners.iter().zip(&results) {
        match result {
            Ok(id) => {
                winners += 1;
                info!("demo: {owner} won {date} {slot} as {id}");
            }
            Err(e) => info!("demo: {owner} lost: {e}"),
        }
    }
    if winners > 1 {
        error!("demo: {winners} owners hold {date} {slot}");
    }

    for (owner, result) in owners.iter().zip(results) {
        if let Ok(id) = result
            && let Err(e) = service.cancel(id, owner).await
        {
            warn!("demo: releasing {id} failed: {e}");
        }
    }
}
