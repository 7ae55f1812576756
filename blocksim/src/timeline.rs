//! Shared, append-only run timeline.

use std::{cell::RefCell, rc::Rc};

use crate::model::{TimelineEntry, TimelineEventType};

/// Handle to the timeline shared by every process of a run.
///
/// Entries are appended in resumption order, and processes only resume in
/// non-decreasing time order, so timestamps never decrease.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Rc<RefCell<Vec<TimelineEntry>>>,
}

impl Timeline {
    /// Creates an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(
        &self,
        timestamp_ms: f64,
        block_id: &str,
        event_type: TimelineEventType,
        detail: String,
    ) {
        self.entries.borrow_mut().push(TimelineEntry {
            timestamp_ms,
            block_id: block_id.to_string(),
            event_type,
            detail,
        });
    }

    /// Number of entries so far.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Takes all entries, leaving the timeline empty.
    pub fn take(&self) -> Vec<TimelineEntry> {
        std::mem::take(&mut *self.entries.borrow_mut())
    }
}
