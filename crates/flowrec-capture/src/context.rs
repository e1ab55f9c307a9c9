//! The page-context runner.
//!
//! [`PageContext::run`] is the event loop of one page: raw events and
//! debounce fires go through the [`Classifier`], coordinator control
//! signals flip its recording state, and emissions queue up for a single
//! delivery worker. The worker sends them in the order the input events
//! occurred; a slow screenshot holds back the queue behind it.

use std::sync::Arc;

use flowrec_core::{CaptureSettings, PageIdentity, ScreenshotOutcome};
use flowrec_protocol::RawPageEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, DebounceKey, Emission};
use crate::debounce::Fire;
use crate::transport::{CaptureTransport, ControlSignal, CoordinatorLink};

pub struct PageContext<L: CoordinatorLink + ?Sized + 'static> {
    classifier: Classifier,
    fires: mpsc::UnboundedReceiver<Fire<DebounceKey>>,
    transport: Arc<CaptureTransport<L>>,
}

/// One item on the delivery queue.
#[derive(Debug)]
enum Outgoing {
    Navigated(PageIdentity),
    Action(Emission),
}

impl<L> PageContext<L>
where
    L: CoordinatorLink + ?Sized + 'static,
{
    pub fn new(
        page: PageIdentity,
        settings: CaptureSettings,
        transport: Arc<CaptureTransport<L>>,
    ) -> Self {
        let (classifier, fires) = Classifier::new(page, settings);
        Self {
            classifier,
            fires,
            transport,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Adopts the coordinator's recording flag, for contexts that join an
    /// active session.
    pub async fn sync_status(&mut self) {
        match self.transport.recording_status().await {
            Ok(true) => self.classifier.start(),
            Ok(false) => {}
            Err(e) => warn!(error = %e, "Could not read recording status"),
        }
    }

    /// Runs until cancelled, or until the event stream ends and every
    /// pending debounce timer has fired. Queued deliveries are drained
    /// before returning.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<RawPageEvent>,
        mut control: mpsc::UnboundedReceiver<ControlSignal>,
        cancel: CancellationToken,
    ) {
        self.sync_status().await;
        info!(url = %self.classifier.page().url, "Page context running");

        let (outbox, queue) = mpsc::unbounded_channel();
        let worker = tokio::spawn(delivery_worker(Arc::clone(&self.transport), queue));

        let mut events_open = true;
        let mut control_open = true;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Page context cancelled");
                    break;
                }

                signal = control.recv(), if control_open => match signal {
                    Some(ControlSignal::Start) => self.classifier.start(),
                    Some(ControlSignal::Stop) => self.classifier.stop(),
                    None => control_open = false,
                },

                event = events.recv(), if events_open => match event {
                    Some(event) => self.on_event(event, &outbox),
                    None => {
                        debug!("Page event stream ended");
                        events_open = false;
                    }
                },

                Some(fire) = self.fires.recv() => {
                    if let Some(emission) = self.classifier.on_fire(fire) {
                        enqueue(&outbox, Outgoing::Action(emission));
                    }
                }
            }

            if !events_open && self.classifier.pending() == 0 {
                break;
            }
        }

        drop(outbox);
        if let Err(e) = worker.await {
            warn!(error = %e, "Delivery worker failed");
        }
        info!("Page context finished");
    }

    fn on_event(&mut self, event: RawPageEvent, outbox: &mpsc::UnboundedSender<Outgoing>) {
        let before = self.classifier.page().clone();
        let emission = self.classifier.handle(event);

        let after = self.classifier.page();
        if *after != before {
            enqueue(outbox, Outgoing::Navigated(after.clone()));
        }

        if let Some(emission) = emission {
            enqueue(outbox, Outgoing::Action(emission));
        }
    }
}

fn enqueue(outbox: &mpsc::UnboundedSender<Outgoing>, item: Outgoing) {
    if outbox.send(item).is_err() {
        warn!("Delivery worker is gone; dropping emission");
    }
}

/// Delivers queued items one at a time until the queue closes.
async fn delivery_worker<L>(
    transport: Arc<CaptureTransport<L>>,
    mut queue: mpsc::UnboundedReceiver<Outgoing>,
) where
    L: CoordinatorLink + ?Sized,
{
    while let Some(item) = queue.recv().await {
        match item {
            Outgoing::Navigated(page) => transport.page_updated(page).await,
            Outgoing::Action(emission) => deliver(&transport, emission).await,
        }
    }
}

/// Attaches a screenshot when wanted, then sends the record. A failed
/// screenshot still sends the record without one.
async fn deliver<L>(transport: &CaptureTransport<L>, emission: Emission)
where
    L: CoordinatorLink + ?Sized,
{
    let Emission {
        mut record,
        wants_screenshot,
    } = emission;

    if wants_screenshot {
        match transport.request_screenshot().await {
            ScreenshotOutcome::Captured { screenshot } => {
                record = record.with_screenshot(screenshot);
            }
            ScreenshotOutcome::Failed { reason } => {
                debug!(reason = %reason, "Recording action without screenshot");
            }
        }
    }

    let kind = record.kind();
    match transport.send(record).await {
        Ok(status) => debug!(kind = %kind, ?status, "Action delivered"),
        Err(e) => warn!(kind = %kind, error = %e, "Dropped action record"),
    }
}
