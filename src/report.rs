use crate::labels::{format_consumption, format_cost, hour_label, LabelFormatter};
use crate::models::{BillingSummary, Period};
use crate::selection::SelectionTracker;
use crate::window::Window;
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(input: &str) -> Option<Self> {
        if input.eq_ignore_ascii_case("text") {
            Some(Self::Text)
        } else if input.eq_ignore_ascii_case("json") {
            Some(Self::Json)
        } else {
            None
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlotReport {
    pub index: usize,
    pub label: String,
    pub timestamp: Option<NaiveDateTime>,
    pub consumption: f64,
    pub cost: f64,
    pub temperature: Option<f64>,
    pub placeholder: bool,
}

#[derive(Debug, Serialize)]
pub struct SelectedReport {
    pub index: usize,
    pub detail: String,
    pub headline: String,
    pub consumption: String,
    pub cost: String,
}

#[derive(Debug, Serialize)]
pub struct BillingReport {
    pub cycle: String,
    #[serde(flatten)]
    pub summary: BillingSummary,
}

/// Printable view of one computed window and its selection.
#[derive(Debug, Serialize)]
pub struct WindowReport {
    pub ready: bool,
    pub period: Period,
    pub page_index: usize,
    pub anchor_date: Option<NaiveDate>,
    pub has_previous: bool,
    pub has_next: bool,
    pub start_index: usize,
    pub end_index: usize,
    pub range: String,
    pub total_consumption: f64,
    pub total_cost: f64,
    pub slots: Vec<SlotReport>,
    pub selected: Option<SelectedReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing: Option<BillingReport>,
}

impl WindowReport {
    pub fn build(
        window: &Window,
        selection: &SelectionTracker,
        formatter: &LabelFormatter,
    ) -> Self {
        let slots = window
            .records
            .iter()
            .enumerate()
            .map(|(index, record)| SlotReport {
                index,
                label: formatter.format_axis_label(record, window.period),
                timestamp: record.timestamp,
                consumption: record.consumption,
                cost: record.cost,
                temperature: record.temperature,
                placeholder: record.is_placeholder(),
            })
            .collect();

        let selected = selection
            .selected_index()
            .zip(selection.current(window))
            .map(|(index, record)| SelectedReport {
                index,
                detail: formatter.format_selected_detail(record, window.period),
                headline: formatter.format_headline(record, window.period),
                consumption: format_consumption(record.consumption),
                cost: format_cost(record.cost),
            });

        Self {
            ready: true,
            period: window.period,
            page_index: window.page_index,
            anchor_date: window.anchor_date,
            has_previous: window.has_previous,
            has_next: window.has_next,
            start_index: window.start_index,
            end_index: window.end_index,
            range: formatter.format_window_range(window),
            total_consumption: window.total_consumption(),
            total_cost: window.total_cost(),
            slots,
            selected,
            billing: None,
        }
    }

    /// Attaches the cycle in progress. Only monthly reports carry it.
    pub fn with_billing(
        mut self,
        summary: Option<&BillingSummary>,
        formatter: &LabelFormatter,
    ) -> Self {
        if self.period == Period::Monthly {
            self.billing = summary.map(|summary| BillingReport {
                cycle: formatter.format_billing_cycle(summary),
                summary: summary.clone(),
            });
        }
        self
    }

    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} usage, page {}: {}",
            self.period.as_label(),
            self.page_index,
            if self.range.is_empty() { "no data" } else { &self.range }
        );
        let _ = writeln!(
            out,
            "older: {}  newer: {}  slots: {}",
            yes_no(self.has_previous),
            yes_no(self.has_next),
            self.slots.len()
        );

        let selected_index = self.selected.as_ref().map(|s| s.index);
        for slot in &self.slots {
            let marker = if Some(slot.index) == selected_index { '>' } else { ' ' };
            let label = match (self.period, slot.timestamp) {
                (Period::Hourly, Some(ts)) => hour_label(ts.hour()),
                (_, Some(ts)) => ts.format("%Y-%m-%d").to_string(),
                (_, None) => "-".to_string(),
            };
            let _ = writeln!(
                out,
                "{marker} {:>2}  {:<10}  {:>12}  {:>9}",
                slot.index,
                label,
                format_consumption(slot.consumption),
                format_cost(slot.cost)
            );
        }

        let _ = writeln!(
            out,
            "total: {}  {}",
            format_consumption(self.total_consumption),
            format_cost(self.total_cost)
        );
        if let Some(selected) = &self.selected {
            let _ = writeln!(out, "{}", selected.headline);
            let _ = writeln!(
                out,
                "{}: {}  {}",
                selected.detail, selected.consumption, selected.cost
            );
        }
        if let Some(billing) = &self.billing {
            render_billing(&mut out, billing);
        }
        out
    }
}

fn render_billing(out: &mut String, billing: &BillingReport) {
    let summary = &billing.summary;
    if !billing.cycle.is_empty() {
        let _ = writeln!(out, "billing cycle: {}", billing.cycle);
    }
    if summary.usage_consumption.is_some() || summary.usage_cost.is_some() {
        let _ = writeln!(
            out,
            "so far: {}  {}",
            format_consumption(summary.usage_consumption.unwrap_or(0.0)),
            format_cost(summary.usage_cost.unwrap_or(0.0))
        );
    }
    if let Some(note) = &summary.projected_bill_note {
        let _ = writeln!(out, "{note}");
    }
    for line in &summary.statement_details {
        let _ = writeln!(out, "  {:<20} {:>9}", line.item, format_cost(line.amount));
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageRecord;
    use crate::window::{compute_window, WindowRequest};
    use chrono::Duration;

    fn window(days: i64) -> Window {
        let today = NaiveDate::from_ymd_opt(2025, 1, 20).expect("valid date");
        let records: Vec<UsageRecord> = (0..days)
            .rev()
            .map(|i| UsageRecord::on_day(today - Duration::days(i), 10.0, 2.5))
            .collect();
        compute_window(&records, &WindowRequest::new(Period::Daily, today))
            .ready()
            .expect("daily window")
    }

    #[test]
    fn build_reports_auto_selected_last_slot() {
        let window = window(3);
        let mut selection = SelectionTracker::new();
        selection.sync(&window);

        let report = WindowReport::build(&window, &selection, &LabelFormatter::new("en-NZ"));
        assert_eq!(report.slots.len(), 3);
        let selected = report.selected.expect("selected slot");
        assert_eq!(selected.index, 2);
        assert_eq!(selected.detail, "Your usage on Monday, 20 January 2025");
        assert_eq!(selected.cost, "$2.50");
    }

    #[test]
    fn render_text_marks_selection_and_nav() {
        let window = window(20);
        let mut selection = SelectionTracker::new();
        selection.sync(&window);
        selection.select(0, &window);

        let text = WindowReport::build(&window, &selection, &LabelFormatter::new("en-NZ"))
            .render_text();
        assert!(text.contains("older: yes  newer: no"));
        assert!(text.contains(">  0  2025-01-09"));
        assert!(text.contains("total: 120.00 kWh  $30.00"));
    }

    #[test]
    fn billing_is_attached_to_monthly_reports_only() {
        let summary = BillingSummary {
            usage_cost: Some(84.12),
            usage_consumption: Some(301.5),
            days_remaining: Some(11),
            projected_bill_note: Some("Projected bill is about $130".into()),
            ..BillingSummary::default()
        };
        let formatter = LabelFormatter::new("en-NZ");
        let selection = SelectionTracker::new();

        let daily = WindowReport::build(&window(3), &selection, &formatter)
            .with_billing(Some(&summary), &formatter);
        assert!(daily.billing.is_none());

        let today = NaiveDate::from_ymd_opt(2025, 1, 20).expect("valid date");
        let bills = [UsageRecord::on_day(today, 320.0, 95.0)];
        let monthly_window = compute_window(&bills, &WindowRequest::new(Period::Monthly, today))
            .ready()
            .expect("monthly window");
        let monthly = WindowReport::build(&monthly_window, &selection, &formatter)
            .with_billing(Some(&summary), &formatter);
        let billing = monthly.billing.as_ref().expect("billing attached");
        assert_eq!(billing.cycle, "11 days left");

        let text = monthly.render_text();
        assert!(text.contains("billing cycle: 11 days left"));
        assert!(text.contains("so far: 301.50 kWh  $84.12"));
        assert!(text.contains("Projected bill is about $130"));
    }

    #[test]
    fn output_format_parse_is_case_insensitive() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("text"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::parse("csv"), None);
    }
}
