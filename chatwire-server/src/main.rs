//! `chatwire-server [CONFIG]`
//!
//! The config path comes from the first argument, else `CHATWIRE_CONFIG`.
//! Without either, defaults plus `CHATWIRE__SECTION__KEY` overrides apply.

use std::path::PathBuf;

use chatwire_core::config::GeneralConfig;
use chatwire_core::{ChatwireConfig, CounterStore};
use chatwire_server::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("CHATWIRE_CONFIG").map(PathBuf::from));
    let config = ChatwireConfig::load(config_path.as_deref())?;

    init_tracing(&config.general)?;
    tracing::info!(
        config_path = ?config_path,
        "starting chatwire-server"
    );

    prune_counters(&config);

    let state = AppState::from_config(&config);
    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;

    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    chatwire_server::serve(listener, state, shutdown).await?;

    tracing::info!("chatwire-server stopped");
    Ok(())
}

/// `RUST_LOG` wins over `general.log_level`.
fn init_tracing(general: &GeneralConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&general.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let installed = if general.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install tracing subscriber: {e}"))
}

/// Drop usage counters past the retention window. Failure only warns.
fn prune_counters(config: &ChatwireConfig) {
    let retention = config.persistence.counter_retention_days;
    let pruned = CounterStore::open(&config.persistence.path, &config.persistence)
        .and_then(|store| store.cleanup_old_counters(retention));
    match pruned {
        Ok(removed) => tracing::info!(removed, retention, "Pruned old usage counters"),
        Err(e) => tracing::warn!(error = %e, path = %config.persistence.path, "Counter store unavailable"),
    }
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "cannot listen for Ctrl+C");
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
                tracing::error!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
