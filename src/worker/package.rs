//! Worker package probe, install, and version reconciliation.

use std::collections::HashMap;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;

use crate::config::WorkerConfig;
use crate::error::{Result, WardenError};

/// Dependency listing as printed by `npm list --json --depth=0`.
#[derive(Debug, Deserialize)]
struct PackageListing {
    #[serde(default)]
    dependencies: HashMap<String, PackageEntry>,
}

#[derive(Debug, Deserialize)]
struct PackageEntry {
    version: Option<String>,
}

struct CapturedOutput {
    stdout: String,
    status: std::process::ExitStatus,
}

/// Probes and installs the worker package via the package manager.
#[derive(Debug, Clone)]
pub struct PackageManager {
    config: WorkerConfig,
}

impl PackageManager {
    pub fn new(config: WorkerConfig) -> Self {
        Self { config }
    }

    /// Ensure the installed worker matches `required`, installing if not.
    ///
    /// Idempotent: once the required version is installed, subsequent calls
    /// perform no installer invocation.
    pub async fn ensure_version(&self, required: &str) -> Result<()> {
        if required.is_empty() {
            return Err(WardenError::Config(
                "required worker version missing".to_string(),
            ));
        }

        let installed = self.installed_version().await?;
        match installed.as_deref() {
            Some(version) if version == required => {
                tracing::debug!(version, "Worker already at required version");
                return Ok(());
            }
            Some(version) => {
                tracing::info!(installed = version, required, "Worker version mismatch, updating");
            }
            None => {
                tracing::info!(required, "Worker not installed, installing");
            }
        }

        self.install(required).await?;
        tracing::info!(version = required, "Worker installed");
        Ok(())
    }

    /// Report the installed worker version, or `None` when the package is
    /// absent from the dependency tree.
    pub async fn installed_version(&self) -> Result<Option<String>> {
        // npm exits non-zero for unmet peer dependencies while still printing
        // a usable listing, so only the stdout JSON is authoritative here.
        let output = self.run(&["list", "--json", "--depth=0"]).await?;
        let listing: PackageListing = serde_json::from_str(&output.stdout)?;
        Ok(listing
            .dependencies
            .get(&self.config.package)
            .and_then(|entry| entry.version.clone()))
    }

    /// Install the worker from its source repository at tag `v<version>`.
    ///
    /// Single attempt; returns the captured stdout on success.
    pub async fn install(&self, version: &str) -> Result<String> {
        let url = format!("{}#v{version}", self.config.repo);
        let output = self.run(&["install", &url]).await?;
        if !output.status.success() {
            return Err(WardenError::Subprocess(format!(
                "install of {url} failed with exit code {:?}",
                output.status.code()
            )));
        }
        Ok(output.stdout)
    }

    async fn run(&self, args: &[&str]) -> Result<CapturedOutput> {
        let output = Command::new(&self.config.package_manager)
            .args(args)
            .current_dir(&self.config.install_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                WardenError::Subprocess(format!(
                    "failed to run {} {}: {e}",
                    self.config.package_manager,
                    args.join(" ")
                ))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        // Soft-warning policy: package managers write advisory text to
        // stderr, so its presence alone is never a failure.
        if !stderr.trim().is_empty() {
            tracing::warn!(
                command = %self.config.package_manager,
                stderr = %stderr.trim(),
                "Package manager wrote to stderr"
            );
        }

        Ok(CapturedOutput {
            stdout,
            status: output.status,
        })
    }
}
