//! User configuration shared by the daemon, the viewer and the page bridge.
//!
//! Loaded from `$XDG_CONFIG_HOME/flowrec/config.toml` (or `FLOWREC_CONFIG`).
//! Every field has a default, so a missing file or a partial file is fine.
//!
//! ```toml
//! [daemon]
//! socket_path = "/tmp/flowrec.sock"
//! screenshot_command = ["grim", "-"]
//!
//! [capture]
//! input_idle_ms = 1000
//!
//! [viewer]
//! export_dir = "~/Documents"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DomainError, DomainResult};
use crate::log::DEFAULT_LOG_CAPACITY;
use crate::target::RECORDER_PANEL_ID;

/// Default coordinator socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/flowrec.sock";

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "FLOWREC_SOCKET";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FLOWREC_CONFIG";

/// Directory name used under the XDG config and state dirs.
const APP_DIR: &str = "flowrec";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowrecConfig {
    pub daemon: DaemonSettings,
    pub capture: CaptureSettings,
    pub viewer: ViewerSettings,
}

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    pub socket_path: PathBuf,
    pub state_dir: PathBuf,
    pub log_capacity: usize,
    /// Persist the session log to the state dir.
    pub persist: bool,
    /// Command whose stdout is a PNG of the visible screen.
    pub screenshot_command: Option<Vec<String>>,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            state_dir: default_state_dir(),
            log_capacity: DEFAULT_LOG_CAPACITY,
            persist: true,
            screenshot_command: None,
        }
    }
}

/// Page-context capture tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub input_idle_ms: u64,
    pub scroll_idle_ms: u64,
    pub navigation_settle_ms: u64,
    pub scroll_threshold_px: u64,
    pub retry_delay_ms: u64,
    pub panel_id: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            input_idle_ms: 1000,
            scroll_idle_ms: 500,
            navigation_settle_ms: 100,
            scroll_threshold_px: 100,
            retry_delay_ms: 100,
            panel_id: RECORDER_PANEL_ID.to_string(),
        }
    }
}

impl CaptureSettings {
    pub fn input_idle(&self) -> Duration {
        Duration::from_millis(self.input_idle_ms)
    }

    pub fn scroll_idle(&self) -> Duration {
        Duration::from_millis(self.scroll_idle_ms)
    }

    pub fn navigation_settle(&self) -> Duration {
        Duration::from_millis(self.navigation_settle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Viewer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub poll_interval_ms: u64,
    pub export_dir: PathBuf,
    pub notification_secs: u64,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            export_dir: PathBuf::from("."),
            notification_secs: 4,
        }
    }
}

impl ViewerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_secs)
    }

    /// Export directory with a leading `~` expanded to the home directory.
    pub fn resolved_export_dir(&self) -> PathBuf {
        match (self.export_dir.strip_prefix("~"), dirs::home_dir()) {
            (Ok(rest), Some(home)) => home.join(rest),
            _ => self.export_dir.clone(),
        }
    }
}

impl FlowrecConfig {
    /// Loads the config from `FLOWREC_CONFIG` or the default path, then
    /// applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Config` if the file exists but cannot be read
    /// or parsed. A missing file yields the defaults.
    pub fn load() -> DomainResult<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Loads the config from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Config` on read or parse failure.
    pub fn load_from(path: &Path) -> DomainResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|e| DomainError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&contents).map_err(|reason| DomainError::Config {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Parses TOML text.
    pub fn parse(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Applies `FLOWREC_SOCKET`.
    pub fn apply_env(&mut self) {
        if let Some(socket) = std::env::var_os(SOCKET_ENV) {
            if !socket.is_empty() {
                self.daemon.socket_path = PathBuf::from(socket);
            }
        }
    }
}

/// `$XDG_CONFIG_HOME/flowrec/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
}

/// `$XDG_STATE_HOME/flowrec`, falling back to `/tmp/flowrec`.
pub fn default_state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(APP_DIR)
}
