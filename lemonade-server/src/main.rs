//! Lemonade Server - local OpenAI-compatible inference gateway.
//!
//! Owns the lifecycle of backend inference subprocesses and exposes an
//! OpenAI-compatible HTTP+WebSocket surface in front of them (§1, §2).

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use lemonade_server::{logging, router, AppState, Cli, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            return ExitCode::from(1);
        }
    };

    logging::init(&config.logging.level);

    let config = Arc::new(config);
    let state = AppState::new(config.clone());

    let http_addr = format!("{}:{}", config.server.host, config.server.port);
    let ws_addr = format!("{}:{}", config.server.host, config.server.ws_port());

    let http_listener = match TcpListener::bind(&http_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %http_addr, %err, "failed to bind HTTP listener");
            return ExitCode::from(1);
        }
    };
    let ws_listener = match TcpListener::bind(&ws_addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(addr = %ws_addr, %err, "failed to bind WebSocket listener");
            return ExitCode::from(1);
        }
    };

    tracing::info!(http = %http_addr, ws = %ws_addr, "lemonade-server listening");

    let http_app = router::http_router(state.clone());
    let ws_app = router::realtime_router(state.clone());

    let sigint_received = Arc::new(AtomicBool::new(false));

    let http_server =
        axum::serve(http_listener, http_app).with_graceful_shutdown(shutdown_signal(sigint_received.clone()));
    let ws_server =
        axum::serve(ws_listener, ws_app).with_graceful_shutdown(shutdown_signal(sigint_received.clone()));

    let result = tokio::try_join!(
        async { http_server.await.map_err(|e| e.to_string()) },
        async { ws_server.await.map_err(|e| e.to_string()) },
    );

    if let Err(err) = result {
        tracing::error!(%err, "server task failed");
        return ExitCode::from(1);
    }

    tracing::info!("lemonade-server shut down cleanly");
    if sigint_received.load(Ordering::SeqCst) {
        ExitCode::from(130)
    } else {
        ExitCode::SUCCESS
    }
}

/// Resolves once on Ctrl-C (or, on unix, SIGTERM), so both listeners wind
/// down together instead of one outliving the other. Records whether it
/// was specifically SIGINT so `main` can report exit code 130 for that
/// case and 0 for any other clean shutdown (§6 exit codes).
async fn shutdown_signal(sigint_received: Arc<AtomicBool>) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            sigint_received.store(true, Ordering::SeqCst);
        },
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining connections");
}
