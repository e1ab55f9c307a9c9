//! Poll-and-watermark reconciliation of the coordinator's log into steps.
//!
//! The viewer never holds a lock on the log. Each poll reads the whole log
//! and materializes only entries whose server timestamp is above the
//! watermark, so polling twice without new entries adds nothing.

use async_trait::async_trait;
use flowrec_core::{CaptureStamp, LogEntry};
use tracing::debug;

use crate::error::Result;
use crate::steps::StepList;

/// Anything that can hand over the current session log.
#[async_trait]
pub trait LogSource: Send + Sync {
    async fn fetch_log(&self) -> Result<Vec<LogEntry>>;
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    watermark: Option<CaptureStamp>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Server timestamp of the newest entry already turned into a step.
    pub fn watermark(&self) -> Option<CaptureStamp> {
        self.watermark
    }

    /// Forgets the watermark; the next apply materializes the whole log.
    pub fn reset(&mut self) {
        self.watermark = None;
    }

    /// Appends a step for every entry above the watermark, in server
    /// timestamp order, and advances the watermark. Returns how many steps
    /// were added.
    pub fn apply(&mut self, entries: &[LogEntry], steps: &mut StepList) -> usize {
        let mut fresh: Vec<&LogEntry> = entries
            .iter()
            .filter(|e| self.watermark.map_or(true, |w| e.server_timestamp > w))
            .collect();
        fresh.sort_by_key(|e| e.server_timestamp);

        for entry in &fresh {
            steps.push(entry.action.clone());
        }
        if let Some(newest) = fresh.last() {
            self.watermark = Some(newest.server_timestamp);
        }

        if !fresh.is_empty() {
            debug!(added = fresh.len(), watermark = ?self.watermark, "Materialized steps");
        }
        fresh.len()
    }

    /// Fetches the log from `source` and applies it.
    ///
    /// # Errors
    ///
    /// Propagates the source's error; the watermark is unchanged.
    pub async fn poll<S: LogSource + ?Sized>(
        &mut self,
        source: &S,
        steps: &mut StepList,
    ) -> Result<usize> {
        let entries = source.fetch_log().await?;
        Ok(self.apply(&entries, steps))
    }
}
