//! B2 First · Reading Part 5 task generator backend
//!
//! - Axum HTTP + WebSocket API
//! - Local Ollama integration for generation
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   OLLAMA_HOST         : default "http://localhost:11434"
//!   OLLAMA_MODEL        : default "llama3.1:8b"
//!   OLLAMA_TEMPERATURE  : clamped to [0.1, 1.0] (default 0.7)
//!   OLLAMA_MAX_TOKENS   : clamped to [1000, 4000] (default 2000)
//!   OLLAMA_TIMEOUT_SECS : read timeout per LLM call (default 120)
//!   TASKS_DIR           : output directory (default "generated_tasks")
//!   B2_CONFIG_PATH      : path to TOML config (LLM, storage, prompts, catalogue)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use b2first_backend::routes::build_router;
use b2first_backend::state::AppState;
use b2first_backend::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, Ollama client, generator, task store).
  let state = Arc::new(AppState::from_env()?);
  state.log_llm_status().await;

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "b2first_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "b2first_backend", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!(target: "b2first_backend", "Shutdown signal received");
  }
}
