//! flowrecd - recording coordinator
//!
//! Owns the recording flag and the bounded session log, accepts actions
//! from page contexts and broadcasts start/stop to them.
//!
//! # Usage
//!
//! ```bash
//! # Start the coordinator (foreground)
//! flowrecd start
//!
//! # Start the coordinator (background/daemonized)
//! flowrecd start -d
//!
//! # Stop the coordinator
//! flowrecd stop
//!
//! # Check coordinator status
//! flowrecd status
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use flowrec_core::config::default_state_dir;
use flowrec_core::FlowrecConfig;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use flowrec_viewer::daemon::{is_process_running, pid_file_path, read_pid};
use flowrecd::coordinator::spawn_coordinator;
use flowrecd::screenshot::{self, ScreenshotSource};
use flowrecd::server::DaemonServer;
use flowrecd::store::{load_log, spawn_persister, JsonFileStore, KeyValueStore, MemoryStore};

/// flowrec coordinator - session log owner and recording broadcast server
#[derive(Parser, Debug)]
#[command(name = "flowrecd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the coordinator
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running coordinator
    Stop,
    /// Show coordinator status
    Status,
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

/// PID of the running coordinator; a stale PID file is removed.
fn running_pid() -> Option<u32> {
    if let Some(pid) = read_pid(&pid_file_path()) {
        if is_process_running(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn stop_daemon(pid: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let Ok(raw_pid) = i32::try_from(pid) else {
            bail!("PID {pid} is out of range");
        };
        // SAFETY: kill(2) has no memory-safety preconditions.
        let result = unsafe { libc::kill(raw_pid, libc::SIGTERM) };
        if result != 0 {
            bail!("Failed to send SIGTERM to process {pid}");
        }
    }
    #[cfg(not(unix))]
    {
        bail!("Stop command is only supported on Unix systems");
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = FlowrecConfig::load().context("Failed to load configuration")?;

    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = running_pid() {
                eprintln!("flowrecd is already running (PID {pid})");
                eprintln!("Use 'flowrecd stop' to stop it first.");
                process::exit(1);
            }

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = running_pid() {
                println!("Stopping flowrecd (PID {pid})...");
                stop_daemon(pid)?;

                for _ in 0..50 {
                    if !is_process_running(pid) {
                        println!("flowrecd stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("flowrecd did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("flowrecd is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = running_pid() {
                println!("flowrecd is running (PID {pid})");
                if config.daemon.socket_path.exists() {
                    println!("Socket: {}", config.daemon.socket_path.display());
                }
                Ok(())
            } else {
                println!("flowrecd is not running.");
                process::exit(1);
            }
        }
    }
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = default_state_dir().join("flowrecd.log");

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

#[tokio::main]
async fn run_daemon(config: FlowrecConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("flowrecd=info,flowrec_core=info,flowrec_protocol=info")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "flowrecd starting"
    );

    let settings = config.daemon;
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let store: Arc<dyn KeyValueStore> = if settings.persist {
        Arc::new(JsonFileStore::new(settings.state_dir.clone()))
    } else {
        Arc::new(MemoryStore::new())
    };

    // A corrupt store must not keep the coordinator from starting.
    let restored = match load_log(store.as_ref()).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Discarding unreadable persisted log");
            Vec::new()
        }
    };
    if !restored.is_empty() {
        info!(entries = restored.len(), "Restored session log");
    }

    let coordinator = spawn_coordinator(settings.log_capacity, restored);
    let _persister = spawn_persister(coordinator.clone(), store, cancel_token.clone());
    info!(capacity = settings.log_capacity, "Coordinator started");

    let screenshots: Arc<dyn ScreenshotSource> = Arc::from(screenshot::from_settings(&settings));

    let server = DaemonServer::new(
        settings.socket_path.clone(),
        coordinator,
        screenshots,
        cancel_token,
    );

    info!(socket = %settings.socket_path.display(), "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("flowrecd stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
