use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::process::{Child, Command};
use std::sync::Mutex;

/// Atomically write content to a file
///
/// This function writes to a temporary file in the same directory,
/// syncs to disk, then renames to the target path. Readers never see a
/// partially written config or state file.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent)?;
    }

    let temp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&temp_path).with_context(|| {
            format!("Failed to create temporary file: {}", temp_path.display())
        })?;

        file.write_all(content)
            .context("Failed to write to temporary file")?;

        file.sync_all().context("Failed to sync file to disk")?;
    }

    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;

    Ok(())
}

/// Ensure a directory exists, creating it and all parents if needed
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    }

    Ok(())
}

/// Run a command to completion, failing on a non-zero exit status
pub fn try_command(cmd: &str, args: &[&str]) -> Result<String> {
    let output = Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {}", cmd))?;

    if !output.status.success() {
        anyhow::bail!(
            "Command failed: {} {:?}: {}",
            cmd,
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// A background command of which at most one copy runs at a time
#[derive(Debug, Default)]
pub struct SingleInstance {
    child: Mutex<Option<Child>>,
}

impl SingleInstance {
    pub const fn new() -> Self {
        Self {
            child: Mutex::new(None),
        }
    }

    /// Start `cmd` without waiting for it, unless the previous one still runs.
    ///
    /// Returns whether a new process was started.
    pub fn spawn(&self, cmd: &str, args: &[&str]) -> Result<bool> {
        let mut slot = self
            .child
            .lock()
            .map_err(|_| anyhow::anyhow!("Process slot for {} is poisoned", cmd))?;

        if let Some(child) = slot.as_mut() {
            // try_wait also reaps a child that has exited
            let status = child
                .try_wait()
                .with_context(|| format!("Failed to poll {}", cmd))?;
            if status.is_none() {
                return Ok(false);
            }
        }

        let child = Command::new(cmd)
            .args(args)
            .spawn()
            .with_context(|| format!("Failed to start {}", cmd))?;
        *slot = Some(child);
        Ok(true)
    }
}

/// Whether `cmd` can be started at all
pub fn command_exists(cmd: &str) -> bool {
    Command::new(cmd)
        .arg("--version")
        .output()
        .is_ok()
}
