//! Coordinator process management for the viewer.
//!
//! Checks whether `flowrecd` is running and starts it when needed.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use flowrec_core::config::default_state_dir;
use tracing::{debug, info};

/// File name of the coordinator's PID file inside the state directory.
pub const PID_FILE_NAME: &str = "flowrecd.pid";

/// Returns the path to the coordinator PID file.
pub fn pid_file_path() -> PathBuf {
    default_state_dir().join(PID_FILE_NAME)
}

/// Reads the PID from `path`, if it exists and parses.
pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Checks if a process with the given PID is running.
pub fn is_process_running(pid: u32) -> bool {
    PathBuf::from(format!("/proc/{pid}")).exists()
}

/// Checks if the coordinator is currently running.
pub fn is_daemon_running() -> bool {
    read_pid(&pid_file_path()).is_some_and(is_process_running)
}

/// Spawns `flowrecd start -d` as a detached process.
fn spawn_daemon() -> std::io::Result<()> {
    // Prefer the flowrecd next to this binary.
    let daemon_path = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("flowrecd")))
        .filter(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("flowrecd"));

    debug!(path = %daemon_path.display(), "Starting coordinator");

    Command::new(&daemon_path)
        .args(["start", "-d"])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    Ok(())
}

/// Ensures the coordinator is running, starting it if necessary.
///
/// Waits up to 3 seconds for the PID file to appear.
pub fn ensure_daemon_running() -> Result<(), String> {
    if is_daemon_running() {
        debug!("Coordinator already running");
        return Ok(());
    }

    info!("Coordinator not running, starting it...");

    if let Err(e) = spawn_daemon() {
        return Err(format!("Failed to start flowrecd: {e}"));
    }

    for i in 0..30 {
        thread::sleep(Duration::from_millis(100));

        if is_daemon_running() {
            info!(attempts = i + 1, "Coordinator started successfully");
            return Ok(());
        }
    }

    Err("flowrecd failed to start within 3 seconds".to_string())
}
