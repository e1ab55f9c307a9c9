//! flowrec-page - page context host
//!
//! Runs one page context against the coordinator. Raw page events are
//! read from stdin, one JSON object per line, as produced by a browser
//! shim or a scripted harness:
//!
//! ```bash
//! echo '{"event":"click","target":{"tagName":"BUTTON","text":"Submit"}}' \
//!     | flowrec-page --url https://app.example/ --title App
//! ```
//!
//! The context follows the coordinator's recording flag, so events sent
//! while no session is active are ignored.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use flowrec_capture::{CaptureTransport, PageContext, SocketLink};
use flowrec_core::{ContextId, FlowrecConfig, PageIdentity};
use flowrec_protocol::{RawPageEvent, RetryPolicy};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Buffered raw events between stdin and the page context.
const EVENT_BUFFER: usize = 256;

/// flowrec page context - feeds page events to the coordinator
#[derive(Parser, Debug)]
#[command(name = "flowrec-page", version, about)]
struct Args {
    /// URL of the page this context records
    #[arg(long)]
    url: String,

    /// Page title
    #[arg(long, default_value = "")]
    title: String,

    /// Context identifier (defaults to a random one)
    #[arg(long)]
    context_id: Option<String>,

    /// Coordinator socket (overrides configuration)
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout is left to the host; logs go to stderr.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("flowrec_capture=info,flowrec_page=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = FlowrecConfig::load().context("Failed to load configuration")?;
    let socket_path = args.socket.unwrap_or(config.daemon.socket_path);

    let context_id = ContextId::new(
        args.context_id
            .unwrap_or_else(|| format!("page-{}", Uuid::new_v4())),
    );
    let page = PageIdentity::new(args.url, args.title);

    let (link, control_rx) = SocketLink::connect(&socket_path, context_id.clone(), page.clone())
        .await
        .with_context(|| format!("Failed to reach coordinator at {}", socket_path.display()))?;

    let policy = RetryPolicy::with_delay(config.capture.retry_delay());
    let transport = Arc::new(CaptureTransport::new(Arc::clone(&link), policy));
    let context = PageContext::new(page, config.capture, transport);

    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let cancel = CancellationToken::new();

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            interrupt.cancel();
        }
    });

    let reader = tokio::spawn(read_events(event_tx, cancel.clone()));

    info!(context = %context_id, socket = %socket_path.display(), "Page context connected");
    context.run(event_rx, control_rx, cancel).await;

    reader.abort();
    link.disconnect().await;
    Ok(())
}

/// Forwards stdin lines as raw events until EOF. Malformed lines are
/// logged and skipped.
async fn read_events(event_tx: mpsc::Sender<RawPageEvent>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("stdin closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<RawPageEvent>(trimmed) {
            Ok(event) => {
                debug!(event = event.name(), "Page event");
                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Skipping malformed page event"),
        }
    }
}
