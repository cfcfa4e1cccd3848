//! Paging of a period's usage history into fixed-size display windows.
//!
//! Page 0 is always the newest data. Daily and monthly history is paged by
//! record count; hourly history is paged by calendar day and always yields
//! 24 slots.

use crate::models::{Period, UsageRecord};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: usize = 12;
pub const MONTHLY_MIN_SLOTS: usize = 6;
pub const HOURS_PER_DAY: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    pub period: Period,
    pub page_index: usize,
    pub page_size: usize,
    /// Day shown in hourly mode. Ignored for daily and monthly.
    pub anchor_date: Option<NaiveDate>,
    /// Upper bound for hourly forward navigation.
    pub today: NaiveDate,
    pub monthly_min_slots: usize,
}

impl WindowRequest {
    pub fn new(period: Period, today: NaiveDate) -> Self {
        Self {
            period,
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
            anchor_date: None,
            today,
            monthly_min_slots: MONTHLY_MIN_SLOTS,
        }
    }

    pub fn page(mut self, page_index: usize) -> Self {
        self.page_index = page_index;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn anchor(mut self, anchor_date: Option<NaiveDate>) -> Self {
        self.anchor_date = anchor_date;
        self
    }

    pub fn monthly_min_slots(mut self, slots: usize) -> Self {
        self.monthly_min_slots = slots;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub period: Period,
    pub page_index: usize,
    /// Oldest to newest.
    pub records: Vec<UsageRecord>,
    /// Bounds of the slice within the newest-first sorted history.
    pub start_index: usize,
    pub end_index: usize,
    pub anchor_date: Option<NaiveDate>,
    pub has_previous: bool,
    pub has_next: bool,
}

impl Window {
    fn empty(request: &WindowRequest) -> Self {
        Self {
            period: request.period,
            page_index: request.page_index,
            records: Vec::new(),
            start_index: 0,
            end_index: 0,
            anchor_date: request.anchor_date,
            has_previous: false,
            has_next: false,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Index of the newest record that is real data.
    pub fn last_reported_index(&self) -> Option<usize> {
        self.records.iter().rposition(|r| !r.is_placeholder())
    }

    pub fn has_reported(&self) -> bool {
        self.last_reported_index().is_some()
    }

    pub fn window_start(&self) -> Option<NaiveDateTime> {
        self.records.iter().find_map(|r| r.timestamp)
    }

    pub fn window_end(&self) -> Option<NaiveDateTime> {
        self.records.iter().rev().find_map(|r| r.timestamp)
    }

    pub fn total_consumption(&self) -> f64 {
        self.records.iter().map(|r| r.consumption).sum()
    }

    pub fn total_cost(&self) -> f64 {
        self.records.iter().map(|r| r.cost).sum()
    }
}

/// Result of a window computation. `NotReady` is returned for hourly
/// requests that have no anchor date yet, which is expected while the
/// first hourly snapshot is still loading.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowOutcome {
    Ready(Window),
    NotReady,
}

impl WindowOutcome {
    pub fn ready(self) -> Option<Window> {
        match self {
            WindowOutcome::Ready(window) => Some(window),
            WindowOutcome::NotReady => None,
        }
    }
}

pub fn compute_window(records: &[UsageRecord], request: &WindowRequest) -> WindowOutcome {
    if records.is_empty() {
        return WindowOutcome::Ready(Window::empty(request));
    }

    match request.period {
        Period::Hourly => match request.anchor_date {
            Some(anchor) => WindowOutcome::Ready(hourly_window(records, anchor, request)),
            None => WindowOutcome::NotReady,
        },
        Period::Daily | Period::Monthly => WindowOutcome::Ready(paged_window(records, request)),
    }
}

/// Reported records deduplicated by timestamp, newest first. When the same
/// timestamp appears more than once the later entry in `records` wins.
fn newest_first(records: &[UsageRecord]) -> Vec<UsageRecord> {
    let mut by_ts: BTreeMap<NaiveDateTime, &UsageRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.is_placeholder()) {
        if let Some(ts) = record.timestamp {
            by_ts.insert(ts, record);
        }
    }
    by_ts.into_values().rev().cloned().collect()
}

/// `[start, end)` into the newest-first history for a page.
///
/// Page 1 is re-anchored to end at the oldest record when the history beyond
/// page 0 is shorter than a full page, so that page shows `page_size` items
/// and overlaps page 0.
pub fn page_bounds(len: usize, page_index: usize, page_size: usize) -> (usize, usize) {
    let page_size = page_size.max(1);
    let remaining = len.saturating_sub(page_size);
    if page_index == 1 && remaining > 0 && remaining < page_size {
        return (remaining, len);
    }

    let start = page_index.saturating_mul(page_size).min(len);
    let end = start.saturating_add(page_size).min(len);
    (start, end)
}

fn paged_window(records: &[UsageRecord], request: &WindowRequest) -> Window {
    let sorted = newest_first(records);
    let page_size = request.page_size.max(1);
    let (start, end) = page_bounds(sorted.len(), request.page_index, page_size);

    let mut slice: Vec<UsageRecord> = sorted[start..end].iter().rev().cloned().collect();

    if request.period == Period::Monthly && !slice.is_empty() {
        while slice.len() < request.monthly_min_slots {
            slice.push(UsageRecord::padding());
        }
    }

    let older_exists =
        sorted.len() > request.page_index.saturating_add(1).saturating_mul(page_size);

    Window {
        period: request.period,
        page_index: request.page_index,
        records: slice,
        start_index: start,
        end_index: end,
        anchor_date: None,
        has_previous: older_exists,
        has_next: request.page_index > 0,
    }
}

fn hourly_window(records: &[UsageRecord], anchor: NaiveDate, request: &WindowRequest) -> Window {
    let mut by_hour: BTreeMap<u32, &UsageRecord> = BTreeMap::new();
    for record in records.iter().filter(|r| !r.is_placeholder()) {
        if record.day() == Some(anchor) {
            if let Some(hour) = record.hour() {
                by_hour.insert(hour, record);
            }
        }
    }

    let slots = (0..HOURS_PER_DAY)
        .map(|hour| match by_hour.get(&hour) {
            Some(record) => (*record).clone(),
            None => UsageRecord::empty_hour(anchor, hour),
        })
        .collect();

    Window {
        period: Period::Hourly,
        page_index: request.page_index,
        records: slots,
        start_index: 0,
        end_index: HOURS_PER_DAY as usize,
        anchor_date: Some(anchor),
        has_previous: older_anchor(records, anchor).is_some(),
        has_next: newer_anchor(records, anchor, request.today).is_some(),
    }
}

fn has_day(records: &[UsageRecord], day: NaiveDate) -> bool {
    records
        .iter()
        .any(|r| !r.is_placeholder() && r.day() == Some(day))
}

/// Day of the newest reported record; the default hourly anchor.
pub fn latest_day(records: &[UsageRecord]) -> Option<NaiveDate> {
    records
        .iter()
        .filter(|r| !r.is_placeholder())
        .filter_map(UsageRecord::day)
        .max()
}

/// The day after `anchor`, if it is not in the future and has data.
pub fn newer_anchor(
    records: &[UsageRecord],
    anchor: NaiveDate,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let next = anchor.succ_opt()?;
    (next <= today && has_day(records, next)).then_some(next)
}

/// The day before `anchor`, if it has data.
pub fn older_anchor(records: &[UsageRecord], anchor: NaiveDate) -> Option<NaiveDate> {
    let prev = anchor.pred_opt()?;
    has_day(records, prev).then_some(prev)
}
