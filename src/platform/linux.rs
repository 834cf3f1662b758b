use anyhow::{Context, Result};
use std::process::Command;

use tracing::debug;

use super::common::{SingleInstance, command_exists, try_command};

static BLOCKING_DIALOG: SingleInstance = SingleInstance::new();

/// Process name of the focused window, `None` when nothing has focus
pub fn foreground_app() -> Result<Option<String>> {
    let output = Command::new("xdotool")
        .args(["getactivewindow", "getwindowpid"])
        .output()
        .context("Failed to run xdotool")?;

    // xdotool exits non-zero when no window is active
    if !output.status.success() {
        return Ok(None);
    }

    let pid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if pid.is_empty() {
        return Ok(None);
    }
    let pid: u32 = pid
        .parse()
        .with_context(|| format!("Unexpected xdotool output: {}", pid))?;

    let comm = std::fs::read_to_string(format!("/proc/{}/comm", pid))
        .with_context(|| format!("Failed to read process name for pid {}", pid))?;

    Ok(Some(comm.trim().to_string()))
}

/// Foreground probing needs xdotool
pub fn has_usage_access() -> bool {
    command_exists("xdotool")
}

pub fn send_notification(title: &str, message: &str) -> Result<()> {
    try_command(
        "notify-send",
        &[title, message, "--urgency=critical", "--icon=dialog-warning"],
    )?;
    Ok(())
}

/// Open a zenity dialog; a dialog still on screen is left as it is
pub fn show_blocking_dialog(title: &str, message: &str) -> Result<()> {
    let started = BLOCKING_DIALOG.spawn(
        "zenity",
        &["--error", "--title", title, "--text", message, "--width=400"],
    )?;
    if !started {
        debug!("Blocking dialog is still open");
    }
    Ok(())
}
