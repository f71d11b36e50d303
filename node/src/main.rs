// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use plumise_agent_node::config::AgentConfig;
use plumise_agent_node::runtime::AgentRuntime;
use plumise_agent_node::server::build_router;
use plumise_agent_node::telemetry::init_telemetry;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    init_telemetry();

    let cfg = match AgentConfig::from_env_and_file(".env") {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Initializing Plumise agent with config: {:?}", cfg);

    let runtime = match AgentRuntime::new(cfg.clone()) {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            tracing::error!(error = %e, "failed to start agent");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = runtime.preflight().await {
        tracing::error!(error = %e, "preflight failed");
        return ExitCode::FAILURE;
    }

    runtime.start();

    let app = build_router(runtime.clone(), cfg.auth_token.clone());
    let listener = match TcpListener::bind(cfg.bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %cfg.bind_addr, error = %e, "cannot bind status API");
            runtime.shutdown(cfg.lifecycle.shutdown_grace).await;
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Listening on {}", cfg.bind_addr);

    let stop = CancellationToken::new();
    let server_stop = stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_stop.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown requested");

    runtime.shutdown(cfg.lifecycle.shutdown_grace).await;
    stop.cancel();
    match server.await {
        Ok(Err(e)) => tracing::warn!(error = %e, "status API exited with error"),
        Err(e) => tracing::warn!(error = %e, "status API task failed"),
        Ok(Ok(())) => {}
    }

    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
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
}
