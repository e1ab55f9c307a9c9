//! The viewer's working set of numbered steps.
//!
//! Steps are materialized from session log entries plus two synthetic
//! bookkeeping steps the viewer adds itself when a session starts and
//! stops. Numbering is always `index + 1`; deleting a step renumbers the
//! rest without touching the coordinator's log.

use flowrec_core::{ActionKind, ActionRecord, CaptureStamp, PageIdentity};
use thiserror::Error;

pub const START_CAPTION: &str = "Start Recording";
pub const START_DETAIL: &str = "Recording session initiated";
pub const STOP_CAPTION: &str = "Stop Recording";
pub const STOP_DETAIL: &str = "Recording session completed";

/// One numbered entry in the working set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    number: usize,
    action: ActionRecord,
}

impl Step {
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn action(&self) -> &ActionRecord {
        &self.action
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn caption(&self) -> &str {
        self.action.caption()
    }

    pub fn detail(&self) -> &str {
        self.action.detail()
    }

    pub fn icon(&self) -> &str {
        self.action.icon()
    }

    pub fn timestamp(&self) -> CaptureStamp {
        self.action.captured_at()
    }

    /// True for the viewer's own start/stop steps.
    pub fn is_synthetic(&self) -> bool {
        self.action.kind().is_bookkeeping()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error("no step number {0}")]
    NotFound(usize),

    #[error("step {0} marks the start or end of the recording and cannot be deleted")]
    Bookkeeping(usize),
}

/// Ordered, renumbered working set.
#[derive(Debug, Clone, Default)]
pub struct StepList {
    steps: Vec<Step>,
}

impl StepList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the synthetic start step.
    pub fn push_start(&mut self, at: CaptureStamp) {
        self.push(bookkeeping(ActionKind::RecordingStarted, START_CAPTION, START_DETAIL, at));
    }

    /// Appends the synthetic stop step.
    pub fn push_stop(&mut self, at: CaptureStamp) {
        self.push(bookkeeping(ActionKind::RecordingStopped, STOP_CAPTION, STOP_DETAIL, at));
    }

    /// Appends a step and returns its number.
    pub fn push(&mut self, action: ActionRecord) -> usize {
        let number = self.steps.len().saturating_add(1);
        self.steps.push(Step { number, action });
        number
    }

    /// Removes step `number` and renumbers the remainder in order.
    ///
    /// # Errors
    ///
    /// - `StepError::NotFound` if no step has that number
    /// - `StepError::Bookkeeping` for the synthetic start/stop steps
    pub fn delete(&mut self, number: usize) -> Result<Step, StepError> {
        let index = number
            .checked_sub(1)
            .filter(|i| *i < self.steps.len())
            .ok_or(StepError::NotFound(number))?;
        if self.steps.get(index).is_some_and(Step::is_synthetic) {
            return Err(StepError::Bookkeeping(number));
        }

        let removed = self.steps.remove(index);
        self.renumber();
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn as_slice(&self) -> &[Step] {
        &self.steps
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Step> {
        self.steps.iter()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    fn renumber(&mut self) {
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.number = index.saturating_add(1);
        }
    }
}

fn bookkeeping(kind: ActionKind, caption: &str, detail: &str, at: CaptureStamp) -> ActionRecord {
    ActionRecord::new(kind, caption, detail, at, &PageIdentity::new("", ""))
}
