use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, WardenError};

const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Persisted supervisor configuration.
///
/// Loaded from a JSON file on startup. The only field ever written back is
/// `instance_id`, generated on first run and stable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// 80-character composite API key: chars 0..40 are the key id,
    /// chars 40..80 the signing secret.
    pub api_key: String,
    /// Settings API base, e.g. `https://api.example.com`.
    pub host: String,
    /// Settings API path, e.g. `/v1/settings`.
    pub api_endpoint: String,
    /// Stable identifier for this installation, generated once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Configuration for the managed worker package and process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Package name as it appears in the package manager's dependency tree.
    pub package: String,
    /// Git repository the worker is installed from, at tag `v<version>`.
    pub repo: String,
    /// Entry script of the installed worker, relative to `install_dir`.
    pub script: String,
    /// Interpreter used to run the worker script.
    pub runtime: String,
    /// Package manager executable used for probe and install.
    pub package_manager: String,
    /// Working directory for probe, install, and worker launch.
    pub install_dir: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            package: "imgworker".to_string(),
            repo: "https://github.com/imgworker/imgworker.git".to_string(),
            script: "node_modules/imgworker/worker.js".to_string(),
            runtime: "node".to_string(),
            package_manager: "npm".to_string(),
            install_dir: PathBuf::from("."),
        }
    }
}

/// Retry policy for failed fetch/update phases.
///
/// The worker respawn itself is never delayed or capped; this policy only
/// governs cycles that fail before the worker is launched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Initial backoff delay, doubled after each consecutive failure.
    pub base_delay_ms: u64,
    /// Upper bound on the backoff delay.
    pub max_delay_ms: u64,
    /// Consecutive failures after which the supervisor gives up and exits
    /// with the last error. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            max_attempts: None,
        }
    }
}

impl Config {
    /// Load and validate the configuration file.
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            WardenError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            WardenError::Config(format!("invalid config file {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("api_key", &self.api_key),
            ("host", &self.host),
            ("api_endpoint", &self.api_endpoint),
        ] {
            if value.is_empty() {
                return Err(WardenError::Config(format!(
                    "missing required config field: {field}"
                )));
            }
        }
        Ok(())
    }

    /// Return the instance id, generating and persisting it on first run.
    ///
    /// The id is a time-ordered UUID (v7); once written it is never
    /// regenerated.
    pub async fn ensure_instance_id(&mut self, path: &Path) -> Result<String> {
        if let Some(id) = &self.instance_id {
            return Ok(id.clone());
        }
        let id = Uuid::now_v7().to_string();
        tracing::info!(instance_id = %id, "Generated instance id");
        self.instance_id = Some(id.clone());
        self.save(path).await?;
        Ok(id)
    }

    /// Write the configuration back to disk.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, text).await.map_err(|e| {
            WardenError::Config(format!("cannot write config file {}: {e}", path.display()))
        })?;
        Ok(())
    }
}
