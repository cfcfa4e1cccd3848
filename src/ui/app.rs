use crate::config::AppConfig;
use crate::models::{Period, RecordOrigin, UsageHistory};
use crate::selection::SelectionTracker;
use crate::window::{
    compute_window, latest_day, newer_anchor, older_anchor, Window, WindowOutcome, WindowRequest,
};
use chrono::{NaiveDate, NaiveDateTime};

type SlotKey = (Option<NaiveDateTime>, RecordOrigin);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    ConfirmQuit,
    ErrorDialog,
}

/// Dashboard view state. Every transition that changes which window is shown
/// resets the selection before the new window is computed, then re-syncs it.
#[derive(Debug, Clone)]
pub struct AppState {
    pub running: bool,
    pub screen: Screen,
    pub period: Period,
    pub page_index: usize,
    pub anchor_date: Option<NaiveDate>,
    pub page_size: usize,
    pub monthly_min_slots: usize,
    pub selection: SelectionTracker,
    pub history: UsageHistory,
    pub status: String,
    pub last_refresh: String,
    pub compact_mode: bool,
    pub confirm_selected: usize,
    pub error_message: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            running: true,
            screen: Screen::Dashboard,
            period: Period::Daily,
            page_index: 0,
            anchor_date: None,
            page_size: crate::window::DEFAULT_PAGE_SIZE,
            monthly_min_slots: crate::window::MONTHLY_MIN_SLOTS,
            selection: SelectionTracker::new(),
            history: UsageHistory::default(),
            status: "ready".into(),
            last_refresh: "never".into(),
            compact_mode: false,
            confirm_selected: 0,
            error_message: String::new(),
        }
    }
}

impl AppState {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            page_size: cfg.page_size.max(1),
            monthly_min_slots: cfg.monthly_min_slots,
            ..Self::default()
        }
    }

    pub fn request(&self, today: NaiveDate) -> WindowRequest {
        WindowRequest::new(self.period, today)
            .page(self.page_index)
            .page_size(self.page_size)
            .anchor(self.anchor_date)
            .monthly_min_slots(self.monthly_min_slots)
    }

    pub fn current_window(&self, today: NaiveDate) -> WindowOutcome {
        compute_window(self.history.records(self.period), &self.request(today))
    }

    fn ready_window(&self, today: NaiveDate) -> Option<Window> {
        self.current_window(today).ready()
    }

    fn sync_selection(&mut self, today: NaiveDate) {
        match self.ready_window(today) {
            Some(window) => self.selection.sync(&window),
            None => self.selection.reset(),
        }
    }

    fn ensure_anchor(&mut self) {
        let hourly = &self.history.hourly;
        let anchor_has_data = self
            .anchor_date
            .is_some_and(|anchor| hourly.iter().any(|r| r.day() == Some(anchor)));
        if !anchor_has_data {
            self.anchor_date = latest_day(hourly);
        }
    }

    pub fn set_period(&mut self, period: Period, today: NaiveDate) {
        if period == self.period {
            return;
        }
        self.selection.reset();
        self.period = period;
        self.page_index = 0;
        if period == Period::Hourly {
            self.ensure_anchor();
        }
        self.sync_selection(today);
        self.status = format!("{} view", period.as_label());
    }

    /// Moves one page (or one day in hourly mode) back in time.
    pub fn older(&mut self, today: NaiveDate) -> bool {
        let Some(window) = self.ready_window(today) else {
            return false;
        };
        if !window.has_previous {
            self.status = "no older data".into();
            return false;
        }
        self.selection.reset();
        match self.period {
            Period::Hourly => {
                self.anchor_date = self
                    .anchor_date
                    .and_then(|anchor| older_anchor(&self.history.hourly, anchor));
            }
            Period::Daily | Period::Monthly => self.page_index += 1,
        }
        self.sync_selection(today);
        true
    }

    /// Moves one page (or one day in hourly mode) forward in time.
    pub fn newer(&mut self, today: NaiveDate) -> bool {
        let Some(window) = self.ready_window(today) else {
            return false;
        };
        if !window.has_next {
            self.status = "already showing the newest data".into();
            return false;
        }
        self.selection.reset();
        match self.period {
            Period::Hourly => {
                self.anchor_date = self
                    .anchor_date
                    .and_then(|anchor| newer_anchor(&self.history.hourly, anchor, today));
            }
            Period::Daily | Period::Monthly => {
                self.page_index = self.page_index.saturating_sub(1)
            }
        }
        self.sync_selection(today);
        true
    }

    /// Explicitly selects the next or previous slot, skipping padding.
    pub fn move_selection(&mut self, forward: bool, today: NaiveDate) {
        let Some(window) = self.ready_window(today) else {
            return;
        };
        if window.is_empty() {
            return;
        }
        let start = self
            .selection
            .selected_index()
            .or_else(|| window.last_reported_index())
            .unwrap_or(0);

        let candidates: Box<dyn Iterator<Item = usize>> = if forward {
            Box::new(start + 1..window.len())
        } else {
            Box::new((0..start).rev())
        };
        let mut target = start;
        for index in candidates {
            if window.records[index].origin != RecordOrigin::Padding {
                target = index;
                break;
            }
        }
        self.selection.select(target, &window);
    }

    /// Index and identity of an explicitly picked slot.
    fn pinned_slot(&self, today: NaiveDate) -> Option<(usize, SlotKey)> {
        if !self.selection.is_explicit() {
            return None;
        }
        let window = self.ready_window(today)?;
        let index = self.selection.selected_index()?;
        let record = self.selection.current(&window)?;
        Some((index, (record.timestamp, record.origin)))
    }

    /// Swaps in freshly loaded history, keeping period and page. An explicit
    /// selection is kept only while its slot still holds the same record.
    pub fn replace_history(&mut self, history: UsageHistory, today: NaiveDate) {
        let pinned = self.pinned_slot(today);
        self.history = history;
        if self.period == Period::Hourly {
            self.ensure_anchor();
        }
        if let Some((index, key)) = pinned {
            let same_record = self
                .ready_window(today)
                .and_then(|window| window.records.get(index).map(|r| (r.timestamp, r.origin)))
                == Some(key);
            if !same_record {
                self.selection.reset();
            }
        }
        self.sync_selection(today);
    }
}
