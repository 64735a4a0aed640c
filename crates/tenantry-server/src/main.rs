//! Tenantry Server Binary
//!
//! Loads options, validates the operator trust configuration and serves the
//! admin API. SIGHUP reloads the configuration file.

use std::env;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use tenantry_server::{
    create_router, FileOptionsSource, OptionsSource, Server, ServerError, ServerOptions,
};

#[tokio::main]
async fn main() {
    let log_level = env::var("TENANTRY_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set tracing subscriber: {}", e);
    }

    if let Err(e) = run().await {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let (options, source) = match env::var("TENANTRY_CONFIG") {
        Ok(path) => {
            let source = Arc::new(FileOptionsSource::new(path));
            (source.load().await?, Some(source))
        }
        Err(_) => {
            warn!("TENANTRY_CONFIG not set, starting without operator mode");
            (ServerOptions::default(), None)
        }
    };
    let admin_listen = options.admin_listen.clone();

    let mut builder = Server::builder(options);
    if let Some(source) = source {
        builder = builder.options_source(source);
    }
    let server = Arc::new(builder.build()?);
    server.start().await?;

    spawn_reload_on_hangup(server.clone());

    match admin_listen {
        Some(addr) => {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!(addr = %addr, "Admin API listening");
            axum::serve(listener, create_router(server.clone()))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        None => shutdown_signal().await,
    }

    server.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Could not listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(unix)]
fn spawn_reload_on_hangup(server: Arc<Server>) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "SIGHUP reload unavailable");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            info!("SIGHUP received, reloading");
            match server.reload().await {
                Ok(report) => info!(
                    evicted = report.evicted.len(),
                    disconnected = report.disconnected,
                    "Reload applied"
                ),
                Err(ServerError::Config(e)) => error!(error = %e, "Reload rejected"),
                Err(e) => error!(error = %e, "Reload failed"),
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_server: Arc<Server>) {}
