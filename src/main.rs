use anyhow::{Context, Result};
use axum::Router;
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info, Level};

use swarmd::core::config::Config;
use swarmd::core::state::AppState;
use swarmd::core::{routes, tracing_init};
use swarmd::tracker::{batch, reaper};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    let config_path = if args.len() > 1 {
        PathBuf::from(&args[1])
    } else {
        PathBuf::from("config.toml")
    };

    let config = Config::from_file(&config_path).with_context(|| {
        format!(
            "Failed to load configuration from '{}'. \
            If this is your first run, copy config.example.toml to config.toml and adjust the values.",
            config_path.display()
        )
    })?;

    tracing_init::init_tracing(&config.logging);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.tracker.num_threads)
        .enable_all()
        .build()
        .context("Failed to build Tokio runtime")?;

    runtime.block_on(async_main(config, config_path))
}

async fn async_main(config: Config, config_path: PathBuf) -> Result<()> {
    info!(
        config_path = %config_path.display(),
        listen = %config.tracker.listen,
        store_driver = %config.store.driver,
        public = config.tracker.public,
        "swarmd starting"
    );

    let state = Arc::new(AppState::new(config.clone())?);

    // Whitelist must be in memory before the first announce; a private
    // tracker with no whitelist rejects every client, which is still safe
    if let Err(e) = state.tracker.hydrate().await {
        error!(error = %e, "Failed to hydrate from store, continuing with empty whitelist");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper_handle = tokio::spawn(reaper::run(
        Arc::clone(&state.tracker),
        shutdown_rx.clone(),
    ));
    let batch_handle = tokio::spawn(batch::run(
        Arc::clone(&state.tracker),
        shutdown_rx.clone(),
    ));

    info!(
        reaper_interval = config.tracker.reaper_interval,
        batch_update_interval = config.tracker.batch_update_interval,
        "Periodic tasks started"
    );

    let app = routes::build_router(Arc::clone(&state)).layer(
        ServiceBuilder::new().layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        ),
    );

    // Forward the OS signal into the watch channel every task selects on
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut servers = Vec::new();

    if !config.tracker.ipv6_only {
        servers.push(tokio::spawn(serve(
            config.tracker.listen.clone(),
            app.clone(),
            shutdown_rx.clone(),
        )));
    }

    if config.tracker.ipv6 || config.tracker.ipv6_only {
        servers.push(tokio::spawn(serve(
            config.tracker.listen_ipv6.clone(),
            app.clone(),
            shutdown_rx.clone(),
        )));
    }

    for server in servers {
        if let Err(e) = server.await.context("Server task panicked")? {
            error!(error = %e, "Server task failed");
        }
    }

    // Let the periodic tasks finish their in-flight work and drain the
    // final batch
    let _ = reaper_handle.await;
    let _ = batch_handle.await;

    info!("swarmd shut down");
    Ok(())
}

async fn serve(addr: String, app: Router, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind listener to {}", addr))?;

    info!(address = %addr, "Listener bound");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown.changed().await;
    })
    .await
    .context("Server error")
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C signal"),
        _ = terminate => info!("Received SIGTERM signal"),
    }
}
