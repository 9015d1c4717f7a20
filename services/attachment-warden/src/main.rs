use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use attachment_warden::{
    create_router, ApiState, ChatPlatform, GatewayClient, WardenConfig, WardenDatabase,
};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = WardenConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config);

    info!(
        listen = %config.listen_addr(),
        data_dir = %config.data_dir.display(),
        reset_interval_secs = config.reset_interval_secs,
        tracked_extensions = ?config.tracked_extensions,
        "starting attachment-warden"
    );

    let database = Arc::new(
        WardenDatabase::new(config.data_dir.clone()).context("failed to open warden database")?,
    );
    if let Some(dir) = database.data_dir() {
        info!(path = %dir.display(), "warden database opened");
    }

    let platform: Option<Arc<dyn ChatPlatform>> = match &config.platform_gateway_url {
        Some(url) => {
            let client = GatewayClient::new(
                url.clone(),
                config.platform_gateway_token.clone(),
                config.platform_timeout(),
            )
            .context("failed to build platform gateway client")?;
            info!(gateway = %client.base_url(), "platform gateway configured");
            let client: Arc<dyn ChatPlatform> = Arc::new(client);
            Some(client)
        }
        None => {
            warn!("no platform gateway configured; directives are only returned to callers");
            None
        }
    };

    let state = Arc::new(ApiState::from_config(&config, Arc::clone(&database), platform)?);

    // Repair resets missed while the process was down before taking events.
    match state.scheduler.sweep().await {
        Ok(report) => info!(
            examined = report.examined,
            reset = report.reset,
            failed = report.failed,
            "startup reset sweep finished"
        ),
        Err(err) => warn!(error = %err, "startup reset sweep failed"),
    }
    let _reset_task = state.scheduler.clone().start();

    let router = create_router(Arc::clone(&state));
    let addr: SocketAddr = config
        .listen_addr()
        .parse()
        .context("invalid server bind address")?;
    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "attachment-warden listening");

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server encountered an unrecoverable error")?;

    info!("attachment-warden shutdown complete");
    Ok(())
}

fn init_tracing(config: &WardenConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
