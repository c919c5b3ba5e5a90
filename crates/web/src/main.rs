mod handlers;

use std::{
    fs::File,
    io::BufReader,
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{Router, http::StatusCode};
use ci_triage_core::config::Config;
use ci_triage_github::GitHub;
use ci_triage_worker::{JsonFileStore, Worker};
use tokio::{net::TcpListener, signal, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    normalize_path::NormalizePathLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::LevelFilter};

use crate::handlers::build_router;

const CONFIG_PATH: &str = "config.yml";

#[tokio::main]
async fn main() {
    let env_filter = EnvFilter::builder()
        // Default to info level
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    if let Err(e) = run().await {
        tracing::error!("{:?}", e);
        std::process::exit(1);
    }
    tracing::info!("Shut down gracefully");
}

async fn run() -> Result<()> {
    let config: Config = {
        let file = File::open(CONFIG_PATH)
            .with_context(|| format!("Failed to open config file {CONFIG_PATH}"))?;
        serde_yaml::from_reader(BufReader::new(file)).context("Failed to parse config file")?
    };
    let github = GitHub::new(&config.github).await.context("Failed to create GitHub client")?;
    let store = JsonFileStore::new(&config.worker.state_file);
    let worker = Worker::new(github, store, &config)?;

    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.server.port));
    let listener =
        TcpListener::bind(addr).await.with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Web server: Listening on {}", addr);

    // Flips to true once a shutdown signal arrives
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_shutdown = shutdown_rx.clone();
    let signals = async {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
        Ok::<_, anyhow::Error>(())
    };
    let web_server = async {
        let result = axum::serve(listener, app())
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
            .context("Web server error");
        tracing::info!("Web server stopped");
        result
    };
    let poll_worker = async {
        let result = worker.run(shutdown_rx).await.context("Worker error");
        tracing::info!("Worker stopped");
        result
    };

    // Wait for all to complete gracefully (early return on error)
    tokio::try_join!(signals, web_server, poll_worker)?;
    Ok(())
}

fn app() -> Router {
    let middleware = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(NormalizePathLayer::trim_trailing_slash());
    build_router().layer(middleware)
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {:?}", e);
                let _ = signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
    }
}
