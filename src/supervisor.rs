use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::auth;
use crate::config::Config;
use crate::error::Result;
use crate::settings::{Settings, SettingsClient};
use crate::worker::{launcher, PackageManager};

enum CycleOutcome {
    WorkerExited,
    ShutdownRequested,
}

/// Supervisor for the worker lifecycle.
///
/// Drives the cycle state machine: fetch settings, reconcile the worker
/// version, launch the worker, wait for it to exit, repeat. Exactly one
/// cycle is in flight at any time.
pub struct Supervisor {
    config: Config,
    instance_id: String,
    settings_client: SettingsClient,
    packages: PackageManager,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(config: Config, instance_id: String, shutdown: CancellationToken) -> Result<Self> {
        Ok(Self {
            settings_client: SettingsClient::new()?,
            packages: PackageManager::new(config.worker.clone()),
            config,
            instance_id,
            shutdown,
        })
    }

    /// Run supervision cycles until shutdown is requested.
    ///
    /// A worker exit restarts the cycle immediately, with no backoff and no
    /// exit-code inspection. A failure before the worker is launched delays
    /// the next attempt by an exponential backoff; with
    /// `retry.max_attempts` configured, that many consecutive failures abort
    /// with the last error, otherwise the supervisor retries forever.
    pub async fn run(&self) -> Result<()> {
        let retry = &self.config.retry;
        let base_delay = Duration::from_millis(retry.base_delay_ms);
        let max_delay = Duration::from_millis(retry.max_delay_ms);
        let mut delay = base_delay;
        let mut failures: u32 = 0;

        loop {
            if self.shutdown.is_cancelled() {
                return Ok(());
            }

            match self.run_cycle().await {
                Ok(CycleOutcome::WorkerExited) => {
                    failures = 0;
                    delay = base_delay;
                }
                Ok(CycleOutcome::ShutdownRequested) => return Ok(()),
                Err(e) => {
                    failures += 1;
                    tracing::error!(error = %e, attempt = failures, "Supervision cycle failed");
                    if let Some(max) = retry.max_attempts {
                        if failures >= max {
                            return Err(e);
                        }
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.cancelled() => return Ok(()),
                    }
                    delay = (delay * 2).min(max_delay);
                }
            }
        }
    }

    /// One full cycle: sign, fetch, reconcile version, run the worker.
    ///
    /// Cancellation interrupts in-flight fetch/update work instead of
    /// letting it run to completion unobserved.
    async fn run_cycle(&self) -> Result<CycleOutcome> {
        let settings = tokio::select! {
            settings = self.prepare() => settings?,
            _ = self.shutdown.cancelled() => return Ok(CycleOutcome::ShutdownRequested),
        };

        let mut worker =
            launcher::launch(&self.config.worker, &self.instance_id, &settings).await?;

        tokio::select! {
            status = worker.wait() => {
                let status = status?;
                tracing::info!(exit_code = ?status.code(), "Worker exited");
                Ok(CycleOutcome::WorkerExited)
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("Shutdown requested, stopping worker");
                worker.kill().await?;
                Ok(CycleOutcome::ShutdownRequested)
            }
        }
    }

    /// The pre-launch phases: token signing, settings fetch, version
    /// reconciliation.
    async fn prepare(&self) -> Result<Settings> {
        let token = auth::sign_token(&self.config.api_key)?;
        let settings = self.settings_client.fetch(&self.config, &token).await?;

        let required = settings.worker_version().unwrap_or_default().to_string();
        self.packages.ensure_version(&required).await?;

        Ok(settings)
    }
}
