mod operations;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tether_db::SqliteSessionStore;
use tether_rest::{operations, Dispatcher, DispatcherConfig, LogReporter};

use crate::operations::{health_read, session_read};

#[derive(Parser)]
#[command(name = "tether-server")]
#[command(about = "Envelope protocol reference service", long_about = None)]
struct Config {
    /// Name recorded in error provenance and crash reports
    #[arg(long, env = "TETHER_SERVICE", default_value = "tether")]
    service: String,

    #[arg(long, env = "TETHER_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Origins matching this pattern are echoed back
    #[arg(long, env = "TETHER_CORS")]
    cors: Option<String>,

    #[arg(long, env = "DATABASE_URL", default_value = "tether.db")]
    db: String,

    /// Session lifetime in seconds
    #[arg(long, env = "TETHER_SESSION_TTL", default_value_t = 3600)]
    session_ttl: u64,

    /// Log every request and response payload
    #[arg(long, env = "TETHER_VERBOSE")]
    verbose: bool,

    /// Forward crash reports to the error log
    #[arg(long, env = "TETHER_REPORT_ERRORS")]
    report_errors: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).ok();

    let sessions = SqliteSessionStore::new(&config.db)?
        .with_ttl(Duration::from_secs(config.session_ttl));

    let mut dispatcher_config = DispatcherConfig::new(&config.service).with_verbose(config.verbose);
    if let Some(pattern) = &config.cors {
        dispatcher_config = dispatcher_config.with_cors(pattern);
    }

    let dispatcher = operations!(
        Dispatcher::new(dispatcher_config, Arc::new(sessions))
            .with_reporter(Arc::new(LogReporter::new(config.report_errors)));
        health_read,
        session_read,
    )?;
    for (method, path) in dispatcher.routes() {
        tracing::info!(%method, %path, "bound");
    }

    let app = dispatcher
        .into_router()?
        .route("/metrics", get(move || {
            let rendered = handle.render();
            async move { rendered }
        }))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!(service = %config.service, "listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
