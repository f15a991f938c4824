//! Keystroke injection through an external typing tool.
//!
//! The daemon front-end does not synthesize input events itself; it shells
//! out to `xdotool type` and falls back to `ydotool` when the primary tool is
//! not installed (Wayland sessions). Tools are run with a strict timeout and
//! `kill_on_drop` so a hung helper can never wedge the daemon loop.

use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::InjectionConfig;
use crate::error::InjectError;

/// Types recognized text into the currently focused window.
pub struct Injector {
    tool: String,
    fallback_tool: String,
    append_space: bool,
    timeout_ms: u64,
}

impl Injector {
    pub fn new(config: &InjectionConfig) -> Self {
        Self {
            tool: config.tool.clone(),
            fallback_tool: config.fallback_tool.clone(),
            append_space: config.append_space,
            timeout_ms: config.timeout_ms,
        }
    }

    /// Injects `text` into the active window.
    ///
    /// Tries the primary tool first; if its binary is missing, retries with
    /// the fallback. Any other failure is returned as-is so the caller can
    /// log it without retrying.
    pub async fn type_text(&self, text: &str) -> Result<(), InjectError> {
        let payload = if self.append_space {
            format!("{text} ")
        } else {
            text.to_string()
        };

        match run_tool(&self.tool, &["type", "--", &payload], self.timeout_ms).await {
            Err(InjectError::Launch(tool, reason)) => {
                warn!("{tool} unavailable ({reason}), trying {}", self.fallback_tool);
                match run_tool(&self.fallback_tool, &["type", &payload], self.timeout_ms).await {
                    Err(InjectError::Launch(..)) => Err(InjectError::MissingTools(
                        self.tool.clone(),
                        self.fallback_tool.clone(),
                    )),
                    other => other,
                }
            }
            other => other,
        }
    }
}

/// Runs a tool to completion with a strict timeout.
///
/// The child is spawned with `kill_on_drop(true)` so a timeout cannot leave
/// an orphan typing into the user's windows.
async fn run_tool(cmd: &str, args: &[&str], ms: u64) -> Result<(), InjectError> {
    debug!("Running {cmd} {args:?}");
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| InjectError::Launch(cmd.to_string(), e.to_string()))?;

    match tokio::time::timeout(Duration::from_millis(ms), child.wait()).await {
        Ok(Ok(status)) => {
            if status.success() {
                Ok(())
            } else {
                Err(InjectError::Failed(cmd.to_string(), status.to_string()))
            }
        }
        Ok(Err(e)) => Err(InjectError::Launch(cmd.to_string(), e.to_string())),
        Err(_) => Err(InjectError::Timeout),
    }
}
