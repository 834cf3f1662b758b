use anyhow::Result;
use tracing::debug;

use super::common::{SingleInstance, try_command};

static BLOCKING_DIALOG: SingleInstance = SingleInstance::new();

/// Bundle identifier of the frontmost application
pub fn foreground_app() -> Result<Option<String>> {
    let bundle = try_command(
        "osascript",
        &[
            "-e",
            "tell application \"System Events\" to get bundle identifier of first application process whose frontmost is true",
        ],
    )?;

    if bundle.is_empty() || bundle == "missing value" {
        return Ok(None);
    }
    Ok(Some(bundle))
}

/// osascript ships with the OS; System Events access is checked on first use
pub fn has_usage_access() -> bool {
    true
}

pub fn send_notification(title: &str, message: &str) -> Result<()> {
    let script = format!(
        "display notification \"{}\" with title \"{}\" sound name \"Glass\"",
        escape(message),
        escape(title)
    );
    try_command("osascript", &["-e", &script])?;
    Ok(())
}

pub fn show_blocking_dialog(title: &str, message: &str) -> Result<()> {
    let script = format!(
        "display dialog \"{}\" with title \"{}\" buttons {{\"OK\"}} default button 1 with icon stop",
        escape(message),
        escape(title)
    );
    if !BLOCKING_DIALOG.spawn("osascript", &["-e", &script])? {
        debug!("Blocking dialog is still open");
    }
    Ok(())
}

/// Quote text for an AppleScript string literal
fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
