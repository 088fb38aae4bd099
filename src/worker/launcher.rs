//! Worker process launch and startup message delivery.

use std::process::Stdio;

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use crate::config::WorkerConfig;
use crate::error::{Result, WardenError};
use crate::settings::Settings;

/// Control message sent to the worker over its stdin channel, one JSON
/// document per line.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
enum ControlMessage<'a> {
    Identity(&'a str),
    Settings(&'a Value),
}

/// Handle to the running worker child process.
///
/// The child is spawned with `kill_on_drop`, so no exit path of the
/// supervisor leaks a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    child: Child,
}

impl WorkerHandle {
    /// Wait for the worker to exit.
    pub async fn wait(&mut self) -> Result<std::process::ExitStatus> {
        Ok(self.child.wait().await?)
    }

    /// Kill the worker and reap it.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await?;
        Ok(())
    }
}

/// Spawn the worker and deliver its two startup messages.
///
/// The identity message is written strictly before the settings message; the
/// worker may assume it knows its identity by the time settings arrive. A
/// worker that exits before the messages land is not an error — the exit is
/// observed by [`WorkerHandle::wait`] and handled by the respawn loop.
pub async fn launch(
    config: &WorkerConfig,
    instance_id: &str,
    settings: &Settings,
) -> Result<WorkerHandle> {
    tracing::info!(script = %config.script, "Forking image processing worker");

    let mut child = Command::new(&config.runtime)
        .arg(&config.script)
        .current_dir(&config.install_dir)
        .stdin(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            WardenError::Subprocess(format!(
                "failed to spawn {} {}: {e}",
                config.runtime, config.script
            ))
        })?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| WardenError::Subprocess("worker stdin not captured".to_string()))?;

    for message in [
        ControlMessage::Identity(instance_id),
        ControlMessage::Settings(settings.as_json()),
    ] {
        if let Err(e) = send(&mut stdin, &message).await {
            tracing::warn!(error = %e, "Failed to deliver startup message to worker");
            break;
        }
    }

    // Hand the write half back so the channel stays open for the worker's
    // lifetime; closing it here would signal EOF to the child.
    child.stdin = Some(stdin);

    Ok(WorkerHandle { child })
}

async fn send(stdin: &mut ChildStdin, message: &ControlMessage<'_>) -> Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    stdin.write_all(&line).await?;
    stdin.flush().await?;
    Ok(())
}
