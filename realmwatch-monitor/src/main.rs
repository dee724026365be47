use anyhow::{Context, anyhow};
use realmwatch_db::CharacterStore;
use realmwatch_monitor::client_info::ClientInfoClient;
use realmwatch_monitor::config::Config;
use realmwatch_monitor::{
    ControlQueue, SchedulerBridge, StatusAggregator, StatusBoard, StatusCache, create_app,
    run_control_loop,
};
use std::sync::Arc;
use std::thread;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting realmwatch monitor...");

    let config = Config::from_env();
    tracing::info!(
        "Configuration: auth={}, world={}, db_path={}, table={}, realm={}, port={}",
        config.auth_address,
        config.world_address,
        config.database_path,
        config.character_table,
        config.realm_name,
        config.port
    );
    tracing::info!(
        "Timing: probe={}ms, query={}ms, cycle_deadline={}ms, status_ttl={}s, population_ttl={}s, poll={}s",
        config.probe_timeout.as_millis(),
        config.query_timeout.as_millis(),
        config.cycle_deadline.as_millis(),
        config.status_ttl.as_secs(),
        config.population_ttl.as_secs(),
        config.poll_interval.as_secs()
    );

    if let Some(url) = &config.client_info_url {
        let client = ClientInfoClient::new(url.as_str(), config.request_timeout)?;
        // Launcher metadata is informational; a failure here does not stop the monitor.
        if let Ok(info) = client.fetch().await {
            tracing::info!(%info, "Client info loaded");
        }
    }

    let store = CharacterStore::new(
        &config.database_path,
        &config.character_table,
        config.query_timeout,
    )
    .context("configuring character database")?;
    // An unavailable database only zeroes the population; it is retried every cycle.
    if let Err(e) = store.connect().await {
        tracing::warn!("Character database not available yet: {}", e);
    }

    let aggregator = StatusAggregator::from_config(&config, store);
    let bridge = SchedulerBridge::spawn(aggregator, StatusCache::new(config.status_ttl))
        .context("starting monitor worker")?;

    let board = Arc::new(StatusBoard::new());
    let queue = ControlQueue::new();
    let stopper = queue.sender();
    let control = {
        let board = Arc::clone(&board);
        let interval = config.poll_interval;
        thread::Builder::new()
            .name("realmwatch-control".to_string())
            .spawn(move || {
                run_control_loop(&bridge, board, interval, &queue);
                // Dropping the bridge here joins the worker.
            })
            .context("starting control thread")?
    };

    let app = create_app(board, config.request_timeout);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("Status server listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutdown requested");
        })
        .await;

    stopper.stop();
    tokio::task::spawn_blocking(move || control.join())
        .await?
        .map_err(|_| anyhow!("control thread panicked"))?;

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
