//! Usage: Hand a URL to the desktop's default browser.

use crate::shared::error::AppResult;
use std::process::{Command, ExitStatus};
use std::thread::JoinHandle;

pub(crate) fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        // `explorer <url>` may open File Explorer for some URL shapes.
        let mut command = Command::new("rundll32.exe");
        command.arg("url.dll,FileProtocolHandler").arg(url);
        spawn_reaped(command)?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        let mut command = Command::new("open");
        command.arg(url);
        spawn_reaped(command)?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        spawn_reaped(command)?;
        return Ok(());
    }

    #[allow(unreachable_code)]
    Err("SYSTEM_ERROR: browser open is unsupported on this platform"
        .to_string()
        .into())
}

/// Spawn the launcher and wait on it from a detached thread so it never lingers as a zombie.
fn spawn_reaped(mut command: Command) -> AppResult<JoinHandle<Option<ExitStatus>>> {
    let mut child = command
        .spawn()
        .map_err(|e| format!("SYSTEM_ERROR: failed to open browser: {e}"))?;
    Ok(std::thread::spawn(move || match child.wait() {
        Ok(status) => {
            if !status.success() {
                tracing::debug!(%status, "browser launcher exited unsuccessfully");
            }
            Some(status)
        }
        Err(err) => {
            tracing::debug!("browser launcher wait failed: {err}");
            None
        }
    }))
}
