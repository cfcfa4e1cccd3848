use crate::models::UsageRecord;
use crate::window::Window;

/// Which slot of the current window is shown in the detail line.
///
/// The index is only meaningful against the window it was taken from. Call
/// [`SelectionTracker::reset`] before computing the window for a new period
/// or page, then [`SelectionTracker::sync`] once the window is known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SelectionTracker {
    selected_index: Option<usize>,
    explicit: bool,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected_index
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn reset(&mut self) {
        self.selected_index = None;
        self.explicit = false;
    }

    /// Follows the newest real record unless the user picked one.
    pub fn sync(&mut self, window: &Window) {
        if self.explicit {
            if window.is_empty() {
                self.reset();
            } else if let Some(index) = self.selected_index {
                self.selected_index = Some(index.min(window.len() - 1));
            }
            return;
        }
        self.selected_index = window.last_reported_index();
    }

    /// Explicit selection. Out-of-range indices are clamped to the last slot;
    /// clicks on an empty window are ignored.
    pub fn select(&mut self, index: usize, window: &Window) {
        if window.is_empty() {
            return;
        }
        self.selected_index = Some(index.min(window.len() - 1));
        self.explicit = true;
    }

    pub fn current<'w>(&self, window: &'w Window) -> Option<&'w UsageRecord> {
        self.selected_index.and_then(|index| window.records.get(index))
    }
}
