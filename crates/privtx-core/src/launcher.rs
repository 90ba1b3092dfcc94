//! Starting the node binary.
//!
//! The node is started as `<command> <settings-file>`, its stderr copied to
//! ours, and given a short moment to bind its socket before the client
//! probes it.

use crate::config::NodeConfig;
use crate::{PtmError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// A node process started by [`launch_node`].
///
/// The child is killed when this handle is dropped.
#[derive(Debug)]
pub struct NodeProcess {
    command: String,
    child: Child,
}

impl NodeProcess {
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the process has not exited yet.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the process and wait for it to exit.
    pub async fn stop(mut self) -> Result<()> {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop node {}: {}", self.command, e);
            return Err(e.into());
        }
        Ok(())
    }
}

/// Spawn the node with the default startup delay.
pub async fn launch_node(command: &str, settings_path: &Path) -> Result<NodeProcess> {
    launch_node_with_delay(command, settings_path, NodeConfig::STARTUP_DELAY).await
}

pub async fn launch_node_with_delay(
    command: &str,
    settings_path: &Path,
    startup_delay: Duration,
) -> Result<NodeProcess> {
    info!("Launching node: {} {}", command, settings_path.display());

    let mut child = Command::new(command)
        .arg(settings_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PtmError::LaunchFailed {
            command: command.to_string(),
            message: e.to_string(),
        })?;

    if let Some(mut stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut out = tokio::io::stderr();
            if let Err(e) = tokio::io::copy(&mut stderr, &mut out).await {
                debug!("Node stderr forwarding ended: {}", e);
            }
        });
    }

    tokio::time::sleep(startup_delay).await;

    if let Ok(Some(status)) = child.try_wait() {
        return Err(PtmError::LaunchFailed {
            command: command.to_string(),
            message: format!("exited during startup with {}", status),
        });
    }

    Ok(NodeProcess {
        command: command.to_string(),
        child,
    })
}
