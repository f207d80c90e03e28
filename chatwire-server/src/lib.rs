//! # chatwire-server
//!
//! Two routes on top of the chatwire client:
//!
//! - `GET /` answers `ok` for liveness probes.
//! - `GET /diagnostics/completion` runs one real completion against the
//!   configured provider and reports the outcome as JSON.
//!
//! The server starts even when the client cannot be configured, so liveness
//! keeps working; the diagnostic route then reports the configuration error.

#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chatwire_core::ChatwireConfig;
use chatwire_llm::{ChatClient, ClientArgs, ClientConfig, Message, Overrides};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    client: Result<Arc<ChatClient>, Arc<str>>,
    diagnostic_timeout: Duration,
}

impl AppState {
    /// State around an already built client, or the reason there is none.
    pub fn new(client: Result<ChatClient, String>, diagnostic_timeout: Duration) -> Self {
        Self {
            client: client.map(Arc::new).map_err(Arc::from),
            diagnostic_timeout,
        }
    }

    /// Build the client from `config.llm` plus the `CHATWIRE_*` environment.
    ///
    /// A client that cannot be built is logged and remembered, not fatal.
    pub fn from_config(config: &ChatwireConfig) -> Self {
        let client = ClientConfig::from_env(ClientArgs::from(&config.llm))
            .and_then(ChatClient::new)
            .map_err(|e| e.to_string());

        match &client {
            Ok(client) => info!(url = %client.endpoint().url, "Completion client configured"),
            Err(reason) => warn!(%reason, "Completion client unavailable; diagnostics will fail"),
        }

        Self::new(
            client,
            Duration::from_millis(config.server.diagnostic_timeout_ms),
        )
    }
}

/// Routes. Unknown paths fall through to axum's 404.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/diagnostics/completion", get(completion_diagnostics))
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn completion_diagnostics(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let client = match &state.client {
        Ok(client) => client,
        Err(reason) => return failure(reason),
    };

    let overrides = Overrides::default().with_timeout(state.diagnostic_timeout);
    match client.complete(vec![Message::user("ping")], &overrides).await {
        Ok(result) => {
            info!(chars = result.first_text().len(), "Diagnostic completion succeeded");
            (
                StatusCode::OK,
                Json(json!({ "ok": true, "sample": result.first_text() })),
            )
        }
        Err(e) => failure(&e.to_string()),
    }
}

fn failure(message: &str) -> (StatusCode, Json<Value>) {
    warn!(error = %message, "Diagnostic completion failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": message })),
    )
}
