//! Application state: configuration, the LLM client, the generator, the task
//! store and the handle of the batch currently running (if any).
//!
//! Only one batch runs at a time; its cancel flag lives here so any
//! connection can stop it.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::error::LlmError;
use crate::generator::TaskGenerator;
use crate::llm::{LlmClient, OllamaClient};
use crate::storage::TaskStore;

/// Cancel flag of the running batch.
#[derive(Clone, Debug)]
pub struct RunningBatch {
    pub cancel: Arc<AtomicBool>,
    pub total: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm: Arc<dyn LlmClient>,
    pub generator: TaskGenerator,
    pub store: TaskStore,
    pub batch: Arc<RwLock<Option<RunningBatch>>>,
}

impl AppState {
    /// Build state from env: load config, construct the Ollama client.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, LlmError> {
        let config = AppConfig::from_env();
        let llm = OllamaClient::new(&config.llm)?;
        info!(
            target: "b2first_backend",
            host = %config.llm.host,
            model = %config.llm.model,
            temperature = config.llm.temperature,
            max_tokens = config.llm.max_tokens,
            output_dir = %config.storage.output_dir.display(),
            "Configuration loaded"
        );
        Ok(Self::with_parts(config, Arc::new(llm)))
    }

    /// Assemble state from explicit parts (used by tests with a scripted client).
    pub fn with_parts(config: AppConfig, llm: Arc<dyn LlmClient>) -> Self {
        let config = Arc::new(config);
        let store = TaskStore::new(config.storage.output_dir.clone());
        let generator = TaskGenerator::new(llm.clone(), config.clone());
        Self {
            config,
            llm,
            generator,
            store,
            batch: Arc::new(RwLock::new(None)),
        }
    }

    /// Log reachability once at startup; the server runs either way.
    pub async fn log_llm_status(&self) {
        let status = self.llm.check_connection().await;
        if !status.connected {
            warn!(target: "b2first_backend", host = %status.host, error = ?status.error, "LLM endpoint unreachable; generation will fail until it is up");
        } else if !status.model_available {
            warn!(target: "b2first_backend", model = %status.model, available = ?status.models, "Configured model is not installed");
        } else {
            info!(target: "b2first_backend", model = %status.model, "LLM endpoint ready");
        }
    }

    /// Claim the batch slot. `None` when another batch is still running.
    pub async fn begin_batch(&self, total: usize) -> Option<Arc<AtomicBool>> {
        let mut slot = self.batch.write().await;
        if slot.is_some() {
            return None;
        }
        let cancel = Arc::new(AtomicBool::new(false));
        *slot = Some(RunningBatch { cancel: cancel.clone(), total });
        Some(cancel)
    }

    pub async fn end_batch(&self) {
        *self.batch.write().await = None;
    }
}
