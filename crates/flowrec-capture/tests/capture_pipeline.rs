//! End-to-end tests of a page context against an in-memory coordinator.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flowrec_capture::{CaptureTransport, ControlSignal, CoordinatorLink, PageContext};
use flowrec_core::{
    ActionKind, ActionRecord, CaptureSettings, PageIdentity, Screenshot, ScreenshotOutcome,
};
use flowrec_protocol::{
    AckStatus, ClientMessage, CoordinatorMessage, DeliveryError, MessageType, RawNode,
    RawPageEvent, RetryPolicy,
};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fake coordinator
// ============================================================================

#[derive(Default)]
struct FakeCoordinator {
    active: AtomicBool,
    screenshot: Option<Screenshot>,
    /// How long a screenshot takes to come back.
    screenshot_delay: Duration,
    drop_next_sends: AtomicUsize,
    reinjections: AtomicUsize,
    recorded: Mutex<Vec<ActionRecord>>,
    pages: Mutex<Vec<PageIdentity>>,
}

impl FakeCoordinator {
    fn recorded(&self) -> Vec<ActionRecord> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoordinatorLink for FakeCoordinator {
    async fn request(&self, message: ClientMessage) -> Result<CoordinatorMessage, DeliveryError> {
        match message.message {
            MessageType::GetRecordingStatus => Ok(CoordinatorMessage::recording_status(
                self.active.load(Ordering::SeqCst),
                None,
            )),
            MessageType::CaptureScreenshot { action: None } => {
                if !self.screenshot_delay.is_zero() {
                    tokio::time::sleep(self.screenshot_delay).await;
                }
                let outcome = match &self.screenshot {
                    Some(shot) => ScreenshotOutcome::captured(shot.clone()),
                    None => ScreenshotOutcome::failed("no display"),
                };
                Ok(CoordinatorMessage::screenshot_result(outcome))
            }
            MessageType::UserAction { action } => {
                let dropped = self
                    .drop_next_sends
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok();
                if dropped {
                    return Err(DeliveryError::NoReceiver);
                }
                self.recorded.lock().unwrap().push(action);
                Ok(CoordinatorMessage::ack(AckStatus::Accepted))
            }
            MessageType::PageUpdated { page } => {
                self.pages.lock().unwrap().push(page);
                Ok(CoordinatorMessage::ack(AckStatus::Accepted))
            }
            other => Ok(CoordinatorMessage::error(&format!("unexpected {other:?}"))),
        }
    }

    async fn reinject(&self) -> Result<(), DeliveryError> {
        self.reinjections.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    coordinator: Arc<FakeCoordinator>,
    events: mpsc::Sender<RawPageEvent>,
    control: mpsc::UnboundedSender<ControlSignal>,
    task: JoinHandle<()>,
}

impl Harness {
    fn spawn(coordinator: FakeCoordinator) -> Self {
        let coordinator = Arc::new(coordinator);
        let transport = Arc::new(CaptureTransport::new(
            Arc::clone(&coordinator),
            RetryPolicy::default(),
        ));
        let context = PageContext::new(
            PageIdentity::new("https://shop.example/cart", "Cart"),
            CaptureSettings::default(),
            transport,
        );
        let (events, events_rx) = mpsc::channel(64);
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(context.run(events_rx, control_rx, CancellationToken::new()));
        Self {
            coordinator,
            events,
            control,
            task,
        }
    }

    async fn send(&self, event: RawPageEvent) {
        self.events.send(event).await.unwrap();
        settle().await;
    }

    async fn signal(&self, signal: ControlSignal) {
        self.control.send(signal).unwrap();
        settle().await;
    }

    /// Closes the event stream and waits for the context to finish.
    async fn finish(self) -> Arc<FakeCoordinator> {
        drop(self.events);
        self.task.await.unwrap();
        self.coordinator
    }
}

/// Lets the context task process what was just sent.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}

fn active() -> FakeCoordinator {
    let coordinator = FakeCoordinator::default();
    coordinator.active.store(true, Ordering::SeqCst);
    coordinator
}

fn node(tag: &str) -> RawNode {
    RawNode {
        tag_name: tag.to_string(),
        ..RawNode::default()
    }
}

fn submit_button() -> RawNode {
    RawNode {
        text: "Submit".into(),
        ..node("BUTTON")
    }
}

fn search_field() -> RawNode {
    let mut field = node("INPUT");
    field.attributes.insert("name".into(), "search".into());
    field
}

fn click(target: RawNode) -> RawPageEvent {
    RawPageEvent::Click {
        target,
        x: 120.0,
        y: 80.0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_click_is_recorded_with_screenshot() {
    let shot = Screenshot::from_png(&[0x89, b'P', b'N', b'G']);
    let harness = Harness::spawn(FakeCoordinator {
        screenshot: Some(shot.clone()),
        ..active()
    });

    harness.send(click(submit_button())).await;
    let coordinator = harness.finish().await;

    let recorded = coordinator.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind(), ActionKind::Click);
    assert_eq!(recorded[0].caption(), "Click \"Submit\"");
    assert_eq!(recorded[0].screenshot(), Some(&shot));
}

#[tokio::test(start_paused = true)]
async fn test_failed_screenshot_still_records_action() {
    let harness = Harness::spawn(active());
    harness.send(click(submit_button())).await;
    let coordinator = harness.finish().await;

    let recorded = coordinator.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].screenshot().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_idle_context_records_nothing_until_started() {
    let harness = Harness::spawn(FakeCoordinator::default());

    harness.send(click(submit_button())).await;
    harness.signal(ControlSignal::Start).await;
    harness
        .send(RawPageEvent::Submit {
            target: node("FORM"),
        })
        .await;
    let coordinator = harness.finish().await;

    let kinds: Vec<ActionKind> = coordinator.recorded().iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![ActionKind::FormSubmit]);
}

#[tokio::test(start_paused = true)]
async fn test_typing_burst_is_delivered_once_with_final_value() {
    let harness = Harness::spawn(active());

    let mut value = String::new();
    for c in "rust book".chars() {
        value.push(c);
        harness
            .send(RawPageEvent::Input {
                target: search_field(),
                value: value.clone(),
            })
            .await;
    }
    // Closing the stream still lets the pending timer fire.
    let coordinator = harness.finish().await;

    let recorded = coordinator.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].kind(), ActionKind::TextInput);
    assert_eq!(recorded[0].value(), Some("rust book"));
    assert_eq!(recorded[0].caption(), "Enter \"rust book\" in search");
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_input() {
    let harness = Harness::spawn(active());
    harness
        .send(RawPageEvent::Input {
            target: search_field(),
            value: "abc".into(),
        })
        .await;
    harness.signal(ControlSignal::Stop).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let coordinator = harness.finish().await;
    assert!(coordinator.recorded().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_no_receiver_is_retried_once() {
    let coordinator = active();
    coordinator.drop_next_sends.store(1, Ordering::SeqCst);
    let harness = Harness::spawn(coordinator);

    harness
        .send(RawPageEvent::Submit {
            target: node("FORM"),
        })
        .await;
    let coordinator = harness.finish().await;

    assert_eq!(coordinator.reinjections.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.recorded().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_failure_drops_record() {
    let coordinator = active();
    coordinator.drop_next_sends.store(2, Ordering::SeqCst);
    let harness = Harness::spawn(coordinator);

    harness
        .send(RawPageEvent::Submit {
            target: node("FORM"),
        })
        .await;
    // Past the retry delay, so the second record starts clean.
    tokio::time::sleep(Duration::from_millis(500)).await;
    harness
        .send(RawPageEvent::Submit {
            target: node("FORM"),
        })
        .await;
    let coordinator = harness.finish().await;

    // First record dropped after one retry; the second goes through.
    assert_eq!(coordinator.recorded().len(), 1);
    assert_eq!(coordinator.reinjections.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_navigation_updates_coordinator_and_records_step() {
    let harness = Harness::spawn(active());
    harness
        .send(RawPageEvent::UrlChanged {
            url: "https://shop.example/checkout".into(),
            title: "Checkout".into(),
        })
        .await;
    let coordinator = harness.finish().await;

    let pages = coordinator.pages.lock().unwrap().clone();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].url, "https://shop.example/checkout");

    let recorded = coordinator.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].caption(), "Navigate to \"Checkout\"");
}

#[tokio::test(start_paused = true)]
async fn test_slow_screenshot_keeps_emission_order() {
    let harness = Harness::spawn(FakeCoordinator {
        screenshot: Some(Screenshot::from_png(&[0x89, b'P'])),
        screenshot_delay: Duration::from_secs(2),
        ..active()
    });

    harness.send(click(submit_button())).await;
    harness
        .send(RawPageEvent::Keydown {
            key: "s".into(),
            ctrl: true,
            alt: false,
            shift: false,
            meta: false,
            target: None,
        })
        .await;

    // The key press waits behind the click's screenshot.
    assert!(harness.coordinator.recorded().is_empty());

    let coordinator = harness.finish().await;
    let kinds: Vec<ActionKind> = coordinator.recorded().iter().map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![ActionKind::Click, ActionKind::KeyCombo]);
    assert!(coordinator.recorded()[0].screenshot().is_some());
}
