//! Per-context event classification.
//!
//! The [`Classifier`] turns raw page events into [`ActionRecord`]s. It holds
//! the context's copy of the recording flag, the debounce timers for text
//! input, scrolling and navigation, and the scroll anchor.
//!
//! Every path checks the recording flag and the own-UI filter first; a
//! failed check is a silent no-op.

use std::collections::HashMap;

use flowrec_core::target::{ellipsize, is_interactive};
use flowrec_core::{
    identify, is_own_ui, ActionKind, ActionRecord, CaptureSettings, DomNode, MonotonicClock,
    PageIdentity, Point, TargetSnapshot,
};
use flowrec_protocol::{to_point, RawPageEvent};
use tokio::sync::mpsc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::debounce::{Debouncer, Fire};
use crate::keys::KeyPress;
use crate::scroll::{scroll_destination, scroll_target, ScrollTracker};

/// Display limit for typed values in captions.
const MAX_VALUE_CHARS: usize = 50;

// ============================================================================
// State
// ============================================================================

/// The context's copy of the coordinator's recording flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// What a debounce timer belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DebounceKey {
    /// One text field, by name/id or a random key for anonymous fields.
    Input(String),
    Scroll,
    Navigation,
}

/// A record ready to leave the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub record: ActionRecord,
    /// Request a screenshot before sending.
    pub wants_screenshot: bool,
}

impl Emission {
    fn new(record: ActionRecord) -> Self {
        let wants_screenshot = record.kind().wants_screenshot();
        Self {
            record,
            wants_screenshot,
        }
    }
}

struct PendingInput {
    target: DomNode,
    value: String,
}

// ============================================================================
// Classifier
// ============================================================================

pub struct Classifier {
    state: RecordingState,
    settings: CaptureSettings,
    page: PageIdentity,
    clock: MonotonicClock,
    debouncer: Debouncer<DebounceKey>,
    inputs: HashMap<String, PendingInput>,
    scroll: ScrollTracker,
    scroll_position: Point,
    scroll_center: Option<DomNode>,
}

impl Classifier {
    /// Creates an idle classifier and the receiver its debounce timers fire
    /// on. Feed every received fire back through [`on_fire`](Self::on_fire).
    pub fn new(
        page: PageIdentity,
        settings: CaptureSettings,
    ) -> (Self, mpsc::UnboundedReceiver<Fire<DebounceKey>>) {
        let (debouncer, fires) = Debouncer::new();
        let scroll = ScrollTracker::new(settings.scroll_threshold_px);
        let classifier = Self {
            state: RecordingState::Idle,
            settings,
            page,
            clock: MonotonicClock::new(),
            debouncer,
            inputs: HashMap::new(),
            scroll,
            scroll_position: Point::default(),
            scroll_center: None,
        };
        (classifier, fires)
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn page(&self) -> &PageIdentity {
        &self.page
    }

    /// Number of debounce timers still running.
    pub fn pending(&self) -> usize {
        self.debouncer.pending()
    }

    /// Idle to Recording. The current scroll offset becomes the anchor.
    /// A repeated start signal is ignored.
    pub fn start(&mut self) {
        if self.is_recording() {
            return;
        }
        self.state = RecordingState::Recording;
        self.scroll.reset(self.scroll_position);
        debug!(url = %self.page.url, "Recording started in page context");
    }

    /// Recording to Idle. Cancels every pending timer, including fires that
    /// already elapsed but were not consumed.
    pub fn stop(&mut self) {
        self.state = RecordingState::Idle;
        self.debouncer.cancel_all();
        self.inputs.clear();
        debug!(url = %self.page.url, "Recording stopped in page context");
    }

    /// Classifies one raw event.
    pub fn handle(&mut self, event: RawPageEvent) -> Option<Emission> {
        trace!(event = event.name(), "Raw page event");
        match event {
            RawPageEvent::Click { target, x, y } => {
                let node = self.accept_target(target.into())?;
                let point = to_point(x, y);
                Some(self.element_action(ActionKind::Click, "Click", &node, Some(point)))
            }
            RawPageEvent::ContextMenu { target, x, y } => {
                let node = self.accept_target(target.into())?;
                let point = to_point(x, y);
                Some(self.element_action(ActionKind::ContextClick, "Right-click", &node, Some(point)))
            }
            RawPageEvent::Hover { target } => {
                let node = self.accept_target(target.into())?;
                if !is_interactive(&node) {
                    return None;
                }
                Some(self.element_action(ActionKind::Hover, "Hover over", &node, None))
            }
            RawPageEvent::DragStart { target } => {
                let node = self.accept_target(target.into())?;
                Some(self.element_action(ActionKind::DragStart, "Drag", &node, None))
            }
            RawPageEvent::Drop { target } => {
                let node = self.accept_target(target.into())?;
                Some(self.element_action(ActionKind::Drop, "Drop on", &node, None))
            }
            RawPageEvent::Submit { target } => {
                let node = self.accept_target(target.into())?;
                Some(self.element_action(ActionKind::FormSubmit, "Submit form", &node, None))
            }
            RawPageEvent::Keydown {
                key,
                ctrl,
                alt,
                shift,
                meta,
                target,
            } => {
                let press = KeyPress {
                    key,
                    ctrl,
                    alt,
                    shift,
                    meta,
                };
                let node: Option<DomNode> = target.map(Into::into);
                self.key_action(&press, node)
            }
            RawPageEvent::Input { target, value } => {
                let node = self.accept_target(target.into())?;
                self.queue_input(node, value);
                None
            }
            RawPageEvent::Scroll { x, y, center } => {
                self.scroll_position = to_point(x, y);
                self.scroll_center = center.map(Into::into);
                if self.is_recording() {
                    self.debouncer
                        .schedule(DebounceKey::Scroll, self.settings.scroll_idle());
                }
                None
            }
            RawPageEvent::UrlChanged { url, title } => {
                if url == self.page.url {
                    return None;
                }
                self.navigate(PageIdentity::new(url, title));
                None
            }
            RawPageEvent::HistoryPop { url, title } => {
                self.navigate(PageIdentity::new(url, title));
                None
            }
        }
    }

    /// Turns a confirmed debounce fire into a record.
    pub fn on_fire(&mut self, fire: Fire<DebounceKey>) -> Option<Emission> {
        if !self.debouncer.accept(&fire) {
            trace!(key = ?fire.key, "Stale debounce fire");
            return None;
        }
        if !self.is_recording() {
            return None;
        }
        match fire.key {
            DebounceKey::Input(key) => {
                let pending = self.inputs.remove(&key)?;
                Some(self.input_action(pending))
            }
            DebounceKey::Scroll => self.scroll_action(),
            DebounceKey::Navigation => Some(self.navigation_action()),
        }
    }

    // ------------------------------------------------------------------------
    // Policies
    // ------------------------------------------------------------------------

    /// Recording-flag and own-UI filter for element events.
    fn accept_target(&self, node: DomNode) -> Option<DomNode> {
        if !self.is_recording() || is_own_ui(&node, &self.settings.panel_id) {
            return None;
        }
        Some(node)
    }

    fn element_action(
        &self,
        kind: ActionKind,
        verb: &str,
        node: &DomNode,
        point: Option<Point>,
    ) -> Emission {
        let identity = identify(node);
        let caption = format!("{verb} \"{}\"", identity.short_name);

        let mut lines = vec![format!("Element: {}", identity.selector)];
        let text = node.visible_text();
        if !text.is_empty() {
            lines.push(format!("Text: {}", ellipsize(&text, MAX_VALUE_CHARS)));
        }
        if let Some(point) = point {
            lines.push(format!("Position: {point}"));
        }

        let mut record = self
            .record(kind, caption, lines)
            .with_target(TargetSnapshot::of(node));
        if let Some(point) = point {
            record = record.with_coordinates(point);
        }
        Emission::new(record)
    }

    fn key_action(&self, press: &KeyPress, target: Option<DomNode>) -> Option<Emission> {
        if !self.is_recording() {
            return None;
        }
        if target
            .as_ref()
            .is_some_and(|n| is_own_ui(n, &self.settings.panel_id))
        {
            return None;
        }
        if !press.should_capture(target.as_ref()) {
            return None;
        }

        let combo = press.combo();
        let mut lines = vec![format!("Keys: {combo}")];
        if let Some(node) = &target {
            lines.push(format!("Element: {}", identify(node).selector));
        }
        let mut record = self
            .record(ActionKind::KeyCombo, press.caption(), lines)
            .with_value(combo);
        if let Some(node) = &target {
            record = record.with_target(TargetSnapshot::of(node));
        }
        Some(Emission::new(record))
    }

    fn queue_input(&mut self, target: DomNode, value: String) {
        // Anonymous fields get a fresh key per event and never merge.
        let key = target
            .field_key()
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.inputs
            .insert(key.clone(), PendingInput { target, value });
        self.debouncer
            .schedule(DebounceKey::Input(key), self.settings.input_idle());
    }

    fn input_action(&self, pending: PendingInput) -> Emission {
        let PendingInput { target, value } = pending;
        let field = field_label(&target);
        let caption = if value.is_empty() {
            format!("Clear field {field}")
        } else {
            format!("Enter \"{}\" in {field}", ellipsize(&value, MAX_VALUE_CHARS))
        };
        let lines = vec![
            format!("Field: {}", identify(&target).selector),
            format!("Value: {value}"),
        ];
        let record = self
            .record(ActionKind::TextInput, caption, lines)
            .with_target(TargetSnapshot::of(&target))
            .with_value(value);
        Emission::new(record)
    }

    fn scroll_action(&mut self) -> Option<Emission> {
        let movement = self.scroll.observe(self.scroll_position)?;
        let destination = scroll_target(self.scroll_center.as_ref());
        let direction = movement.direction.as_str();

        let lines = vec![
            format!("Direction: {direction}"),
            format!("Distance: {}px", movement.distance),
            format!("Position: {}", movement.position),
        ];
        let mut record = self
            .record(
                ActionKind::Scroll,
                format!("Scroll {direction} to \"{destination}\""),
                lines,
            )
            .with_coordinates(movement.position);
        if let Some(center) = &self.scroll_center {
            record = record.with_target(TargetSnapshot::of(scroll_destination(center)));
        }
        Some(Emission::new(record))
    }

    /// The page identity changes immediately; the record waits for the new
    /// DOM to settle.
    fn navigate(&mut self, page: PageIdentity) {
        self.page = page;
        if self.is_recording() {
            self.debouncer
                .schedule(DebounceKey::Navigation, self.settings.navigation_settle());
        }
    }

    fn navigation_action(&self) -> Emission {
        let caption = format!("Navigate to \"{}\"", self.page.display_name());
        let mut lines = Vec::new();
        if !self.page.title.is_empty() {
            lines.push(format!("Title: {}", self.page.title));
        }
        Emission::new(self.record(ActionKind::Navigation, caption, lines))
    }

    /// Stamps a record and appends the `URL:` line to its detail.
    fn record(&self, kind: ActionKind, caption: String, mut lines: Vec<String>) -> ActionRecord {
        lines.push(format!("URL: {}", self.page.url));
        ActionRecord::new(
            kind,
            caption,
            lines.join("\n"),
            self.clock.stamp(),
            &self.page,
        )
    }
}

/// Name shown for a form field: `name`, `id`, `placeholder`, `aria-label`,
/// else `field`.
fn field_label(node: &DomNode) -> String {
    node.attr("name")
        .or_else(|| node.element_id())
        .or_else(|| node.attr("placeholder"))
        .or_else(|| node.attr("aria-label"))
        .unwrap_or("field")
        .to_string()
}
