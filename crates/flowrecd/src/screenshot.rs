//! Screenshot acquisition.
//!
//! The daemon has no browser of its own, so the "visible surface" is
//! whatever an external command prints as PNG on stdout (`grim -`,
//! `import -window root png:-`, ...). Without a configured command every
//! request fails with a reason and the action is recorded without an image.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use flowrec_core::{DaemonSettings, Screenshot, ScreenshotOutcome};

/// Upper bound on a single capture command.
pub const CAPTURE_TIMEOUT: Duration = Duration::from_secs(20);

/// PNG signature.
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";

/// Source of screenshots of the visible surface.
#[async_trait]
pub trait ScreenshotSource: Send + Sync {
    /// Never fails: failure is reported inside the outcome.
    async fn capture(&self) -> ScreenshotOutcome;
}

/// Runs a command and takes its stdout as a PNG.
#[derive(Debug, Clone)]
pub struct CommandScreenshotSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandScreenshotSource {
    /// Returns `None` for an empty command line.
    pub fn new(command: &[String]) -> Option<Self> {
        let (program, args) = command.split_first()?;
        if program.trim().is_empty() {
            return None;
        }
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: CAPTURE_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self) -> Result<Vec<u8>, String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| format!("{} timed out after {:?}", self.program, self.timeout))?
            .map_err(|e| format!("failed to run {}: {e}", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            ));
        }
        if !output.stdout.starts_with(PNG_MAGIC) {
            return Err(format!("{} did not produce a PNG image", self.program));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl ScreenshotSource for CommandScreenshotSource {
    async fn capture(&self) -> ScreenshotOutcome {
        match self.run().await {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), "Screenshot captured");
                ScreenshotOutcome::captured(Screenshot::from_png(&bytes))
            }
            Err(reason) => {
                warn!(reason = %reason, "Screenshot capture failed");
                ScreenshotOutcome::failed(reason)
            }
        }
    }
}

/// Used when no capture command is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableScreenshots;

#[async_trait]
impl ScreenshotSource for UnavailableScreenshots {
    async fn capture(&self) -> ScreenshotOutcome {
        ScreenshotOutcome::failed("no screenshot command configured")
    }
}

/// Picks the source described by the daemon settings.
pub fn from_settings(settings: &DaemonSettings) -> Box<dyn ScreenshotSource> {
    match settings
        .screenshot_command
        .as_deref()
        .and_then(CommandScreenshotSource::new)
    {
        Some(source) => Box::new(source),
        None => Box::new(UnavailableScreenshots),
    }
}
