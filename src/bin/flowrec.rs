//! flowrec - terminal viewer for recorded web workflows
//!
//! Shows the current session as numbered steps while recording, lets the
//! user delete steps, and exports the result as CSV or a structured
//! document.
//!
//! # Usage
//!
//! ```text
//! flowrec                         # Interactive viewer
//! flowrec export                  # Write CSV and document for the current log
//! flowrec export --format csv     # CSV only
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use crossterm::{
    event::{self, Event as CrosstermEvent},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use flowrec_core::config::default_state_dir;
use flowrec_core::FlowrecConfig;
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use flowrec_viewer::app::{App, NotificationLevel};
use flowrec_viewer::client::{ClientConfig, ViewerClient, ViewerConnection};
use flowrec_viewer::daemon;
use flowrec_viewer::error::{Result as ViewerResult, ViewerError};
use flowrec_viewer::export::{DecodingEmbedder, JsonDocumentSerializer};
use flowrec_viewer::input::{handle_key_event, Action, ClientCommand, Event};
use flowrec_viewer::save::DirectorySaver;
use flowrec_viewer::ui;

// ============================================================================
// CLI Arguments
// ============================================================================

/// flowrec - record web interactions as numbered, captioned steps
#[derive(Parser, Debug)]
#[command(name = "flowrec")]
#[command(about = "Record web workflows and export them as step-by-step guides")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Coordinator socket (overrides config and FLOWREC_SOCKET)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Do not start flowrecd automatically
    #[arg(long, global = true)]
    no_spawn: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export the coordinator's current log without opening the viewer
    Export {
        #[arg(long, value_enum, default_value = "all")]
        format: ExportFormat,

        /// Output directory (defaults to viewer.export_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Csv,
    Document,
    All,
}

// ============================================================================
// Terminal Setup / Cleanup
// ============================================================================

/// Puts the terminal in raw mode on the alternate screen.
fn setup_terminal() -> ViewerResult<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().map_err(|e| ViewerError::TerminalInit(e.to_string()))?;

    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)
        .map_err(|e| ViewerError::TerminalInit(e.to_string()))?;

    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(|e| ViewerError::TerminalInit(e.to_string()))
}

/// Restores the terminal. Always called before exiting, even on error.
fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> ViewerResult<()> {
    disable_raw_mode().map_err(|e| ViewerError::TerminalCleanup(e.to_string()))?;

    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .map_err(|e| ViewerError::TerminalCleanup(e.to_string()))?;

    terminal
        .show_cursor()
        .map_err(|e| ViewerError::TerminalCleanup(e.to_string()))?;

    Ok(())
}

// ============================================================================
// Keyboard Input Task
// ============================================================================

/// Polls crossterm for input on the blocking pool and forwards key and
/// resize events until cancelled.
fn spawn_keyboard_task(
    event_tx: mpsc::UnboundedSender<Event>,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if cancel_token.is_cancelled() {
                debug!("Keyboard task shutting down");
                break;
            }

            let poll_result = tokio::task::spawn_blocking(|| {
                // Short timeout so cancellation is noticed promptly
                if event::poll(Duration::from_millis(50)).unwrap_or(false) {
                    event::read().ok()
                } else {
                    None
                }
            })
            .await;

            match poll_result {
                Ok(Some(CrosstermEvent::Key(key))) => {
                    if event_tx.send(Event::Key(key)).is_err() {
                        debug!("Event channel closed, keyboard task exiting");
                        break;
                    }
                }
                Ok(Some(CrosstermEvent::Resize(width, height))) => {
                    if event_tx.send(Event::Resize(width, height)).is_err() {
                        break;
                    }
                }
                Ok(Some(_)) | Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Keyboard polling task panicked");
                    break;
                }
            }
        }
    })
}

// ============================================================================
// Main Event Loop
// ============================================================================

/// Renders, waits up to one tick for an event, applies it. Repeats until
/// quit is requested.
async fn run_event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    app: &mut App,
    event_rx: &mut mpsc::UnboundedReceiver<Event>,
    command_tx: &mpsc::UnboundedSender<ClientCommand>,
    saver: &DirectorySaver,
    cancel_token: &CancellationToken,
) -> Result<()> {
    let tick_rate = Duration::from_millis(100);

    loop {
        app.tick();

        terminal.draw(|frame| ui::render(frame, app))?;

        match tokio::time::timeout(tick_rate, event_rx.recv()).await {
            Ok(Some(received_event)) => match received_event {
                Event::Key(key) => match handle_key_event(key, app) {
                    Action::Quit => {
                        info!("User requested quit");
                        cancel_token.cancel();
                        break;
                    }
                    Action::Send(command) => {
                        debug!(?command, "Forwarding command");
                        if command_tx.send(command).is_err() {
                            warn!(?command, "Failed to send command - client may be gone");
                        }
                    }
                    Action::ExportTabular => {
                        // Outcome is reported through the notification line.
                        let _ = app.export_tabular(saver, Utc::now());
                    }
                    Action::ExportDocument => {
                        let _ = app.export_document(
                            saver,
                            &JsonDocumentSerializer,
                            &DecodingEmbedder,
                            Utc::now(),
                        );
                    }
                    Action::None => {}
                },
                Event::Resize(_width, _height) => {
                    // ratatui picks up the new size on the next draw
                    debug!("Terminal resized");
                }
                Event::Connected { active, started_at } => {
                    info!(active, "Connected to coordinator");
                    app.mark_connected();
                    app.apply_status(active, started_at);
                }
                Event::Status { active, started_at } => {
                    app.apply_status(active, started_at);
                }
                Event::Log(entries) => {
                    let added = app.apply_log(&entries);
                    if added > 0 {
                        debug!(added, "New steps");
                    }
                }
                Event::LogCleared => {
                    app.notify(NotificationLevel::Info, "Session log cleared");
                }
                Event::CommandFailed(message) => {
                    warn!(%message, "Command failed");
                    app.notify(NotificationLevel::Error, message);
                }
                Event::DaemonDisconnected => {
                    warn!("Coordinator disconnected");
                    app.mark_disconnected();
                }
            },
            Ok(None) => {
                warn!("Event channel closed");
                break;
            }
            // Tick
            Err(_) => {}
        }

        if app.should_quit || cancel_token.is_cancelled() {
            cancel_token.cancel();
            break;
        }
    }

    Ok(())
}

// ============================================================================
// Headless Export
// ============================================================================

/// Reconciles the coordinator's current log into steps and writes the
/// requested exports.
async fn run_export(
    client_config: &ClientConfig,
    format: ExportFormat,
    saver: &DirectorySaver,
) -> Result<()> {
    let connection = ViewerConnection::connect(&client_config.socket_path)
        .await
        .with_context(|| {
            format!(
                "Cannot reach flowrecd at {}",
                client_config.socket_path.display()
            )
        })?;

    let state = connection.status().await?;
    let mut app = App::new();
    app.apply_status(true, state.started_at);
    let added = app.reconciler.poll(&connection, &mut app.steps).await?;
    if !state.active {
        app.apply_status(false, None);
    }
    connection.disconnect().await;

    if added == 0 {
        bail!("The session log is empty; nothing to export");
    }
    info!(steps = app.steps.len(), "Reconciled session log");

    let now = Utc::now();
    if matches!(format, ExportFormat::Csv | ExportFormat::All) {
        let path = app.export_tabular(saver, now)?;
        println!("{}", path.display());
    }
    if matches!(format, ExportFormat::Document | ExportFormat::All) {
        let path = app.export_document(saver, &JsonDocumentSerializer, &DecodingEmbedder, now)?;
        println!("{}", path.display());
    }
    Ok(())
}

// ============================================================================
// Logging Setup
// ============================================================================

/// Opens `$XDG_STATE_HOME/flowrec/viewer.log` in append mode.
///
/// Returns `None` if any step fails; logging is then disabled. Warnings go
/// to stderr before the viewer takes over the terminal.
fn create_log_file() -> Option<fs::File> {
    let log_dir = default_state_dir();

    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create log directory {log_dir:?}: {e}");
        return None;
    }

    let log_path = log_dir.join("viewer.log");

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!("Warning: Failed to open log file {log_path:?}: {e}");
            None
        }
    }
}

/// Logs to the state-dir file; stderr would corrupt the alternate screen.
fn init_logging() {
    match create_log_file() {
        Some(file) => {
            let filter = EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("flowrec=info,flowrec_viewer=info"));

            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("off"))
                .init();
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging();

    let mut config = FlowrecConfig::load().context("Failed to load configuration")?;
    if let Some(socket) = args.socket {
        config.daemon.socket_path = socket;
    }
    let client_config = ClientConfig::from_settings(config.daemon.socket_path.clone(), &config.viewer);

    if !args.no_spawn {
        if let Err(e) = daemon::ensure_daemon_running() {
            bail!("Failed to ensure flowrecd is running: {e}");
        }
    }

    if let Some(Command::Export { format, dir }) = args.command {
        let saver = DirectorySaver::new(dir.unwrap_or_else(|| config.viewer.resolved_export_dir()));
        return run_export(&client_config, format, &saver).await;
    }

    info!(socket = %client_config.socket_path.display(), "flowrec viewer starting...");

    let saver = DirectorySaver::new(config.viewer.resolved_export_dir());

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<ClientCommand>();
    let cancel_token = CancellationToken::new();

    let mut terminal = match setup_terminal() {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, "Failed to initialize terminal");
            return Err(e.into());
        }
    };

    let mut app = App::new().with_notification_ttl(config.viewer.notification_ttl());

    let client = ViewerClient::new(client_config, event_tx.clone(), command_rx, cancel_token.clone());
    let client_handle = tokio::spawn(async move {
        client.run().await;
    });

    let keyboard_handle = spawn_keyboard_task(event_tx, cancel_token.clone());

    let result = run_event_loop(
        &mut terminal,
        &mut app,
        &mut event_rx,
        &command_tx,
        &saver,
        &cancel_token,
    )
    .await;

    cancel_token.cancel();

    let _ = tokio::time::timeout(Duration::from_millis(100), client_handle).await;
    let _ = tokio::time::timeout(Duration::from_millis(100), keyboard_handle).await;

    if let Err(e) = cleanup_terminal(&mut terminal) {
        error!(error = %e, "Failed to cleanup terminal");
    }

    info!("flowrec viewer stopped");

    result
}
