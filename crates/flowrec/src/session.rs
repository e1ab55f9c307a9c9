//! Summary of a recorded session, shown after stop and written into the
//! document export's metadata block.

use flowrec_core::{ActionKind, CaptureStamp};

use crate::steps::{Step, StepList};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub started_at: Option<CaptureStamp>,
    pub stopped_at: Option<CaptureStamp>,
    pub duration_secs: i64,
    pub step_count: usize,
    /// First page URL any captured step came from.
    pub source_url: Option<String>,
}

impl SessionSummary {
    /// Summarizes the working set.
    ///
    /// The synthetic start and stop steps bound the session; without them
    /// the first and last steps do.
    pub fn of(steps: &StepList) -> Self {
        let started_at = steps
            .iter()
            .find(|s| s.kind() == ActionKind::RecordingStarted)
            .or_else(|| steps.get(0))
            .map(Step::timestamp);
        let stopped_at = steps
            .iter()
            .rev()
            .find(|s| s.kind() == ActionKind::RecordingStopped)
            .or_else(|| steps.as_slice().last())
            .map(Step::timestamp);

        let duration_secs = match (started_at, stopped_at) {
            (Some(start), Some(stop)) => stop.seconds_since(start),
            _ => 0,
        };

        let source_url = steps
            .iter()
            .map(|s| s.action().source_url())
            .find(|url| !url.is_empty())
            .map(str::to_string);

        Self {
            started_at,
            stopped_at,
            duration_secs,
            step_count: steps.len(),
            source_url,
        }
    }

    /// One-line form for the status bar, e.g. `7 steps | 42s duration`.
    pub fn display(&self) -> String {
        format!(
            "{} step{} | {}s duration",
            self.step_count,
            if self.step_count == 1 { "" } else { "s" },
            self.duration_secs
        )
    }
}
