use crate::models::{BillingSummary, Period, UsageRecord};
use crate::window::Window;
use chrono::{NaiveDateTime, NaiveTime};

/// Whether a locale writes the day before the month ("6 Jan") or after it ("Jan 6").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

impl DateOrder {
    const MONTH_FIRST_REGIONS: [&'static str; 4] = ["US", "PH", "CA", "FM"];

    pub fn for_locale(locale: &str) -> Self {
        let region = locale
            .split(['-', '_', '.'])
            .nth(1)
            .map(str::to_ascii_uppercase)
            .unwrap_or_default();
        if Self::MONTH_FIRST_REGIONS.contains(&region.as_str()) {
            DateOrder::MonthFirst
        } else {
            DateOrder::DayFirst
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelFormatter {
    order: DateOrder,
}

impl LabelFormatter {
    pub fn new(locale: &str) -> Self {
        Self {
            order: DateOrder::for_locale(locale),
        }
    }

    pub fn format_axis_label(&self, record: &UsageRecord, period: Period) -> String {
        let Some(ts) = record.timestamp else {
            return String::new();
        };
        match period {
            Period::Daily => ts.format("%a").to_string(),
            Period::Monthly => self.day_month(&ts),
            Period::Hourly => {
                let hour = record.hour().unwrap_or_default();
                if hour % 6 == 0 {
                    hour_label(hour)
                } else {
                    String::new()
                }
            }
        }
    }

    pub fn format_selected_detail(&self, record: &UsageRecord, period: Period) -> String {
        match (period, record.timestamp) {
            (Period::Monthly, _) => "Your usage this billing period".into(),
            (_, None) => String::new(),
            (Period::Daily, Some(ts)) => format!("Your usage on {}", self.long_date(&ts, true)),
            (Period::Hourly, Some(ts)) => format!(
                "Your usage at {} on {}",
                hour_label(record.hour().unwrap_or_default()),
                self.long_date(&ts, false)
            ),
        }
    }

    /// Navigation headline for the selected record: the billing range for
    /// monthly data, or the month and year when no range was reported.
    pub fn format_headline(&self, record: &UsageRecord, period: Period) -> String {
        match period {
            Period::Monthly => {
                if let Some(bp) = record.billing_period {
                    let from = bp.from.and_time(NaiveTime::MIN);
                    let to = bp.to.and_time(NaiveTime::MIN);
                    return format!(
                        "{} - {}",
                        self.day_month_year(&from),
                        self.day_month_year(&to)
                    );
                }
                record
                    .timestamp
                    .map(|ts| ts.format("%B %Y").to_string())
                    .unwrap_or_default()
            }
            Period::Daily | Period::Hourly => record
                .timestamp
                .map(|ts| self.long_date(&ts, period == Period::Daily))
                .unwrap_or_default(),
        }
    }

    /// First to last dated slot of a window, e.g. "9 Jan - 20 Jan".
    pub fn format_window_range(&self, window: &Window) -> String {
        let (Some(start), Some(end)) = (window.window_start(), window.window_end()) else {
            return String::new();
        };
        if window.period == Period::Hourly {
            return self.long_date(&start, false);
        }
        format!("{} - {}", self.day_month(&start), self.day_month(&end))
    }

    /// One line for the cycle in progress, e.g.
    /// "7 Jan - 6 Feb 2025, day 20 of 31, 64% through".
    pub fn format_billing_cycle(&self, summary: &BillingSummary) -> String {
        let mut parts = Vec::new();
        if let (Some(start), Some(end)) = (summary.start_date, summary.end_date) {
            parts.push(format!(
                "{} - {}",
                self.day_month(&start.and_time(NaiveTime::MIN)),
                self.day_month_year(&end.and_time(NaiveTime::MIN))
            ));
        }
        match (summary.cycle_days(), summary.days_remaining) {
            (Some(total), Some(left)) => {
                let elapsed = (total - i64::from(left)).clamp(0, total);
                parts.push(format!("day {elapsed} of {total}"));
            }
            (None, Some(1)) => parts.push("1 day left".into()),
            (None, Some(left)) => parts.push(format!("{left} days left")),
            _ => {}
        }
        if let Some(progress) = summary.progress_percent {
            parts.push(format!("{progress:.0}% through"));
        }
        parts.join(", ")
    }

    fn day_month(&self, ts: &NaiveDateTime) -> String {
        let pattern = match self.order {
            DateOrder::DayFirst => "%-d %b",
            DateOrder::MonthFirst => "%b %-d",
        };
        ts.format(pattern).to_string()
    }

    fn day_month_year(&self, ts: &NaiveDateTime) -> String {
        match self.order {
            DateOrder::DayFirst => ts.format("%-d %b %Y").to_string(),
            DateOrder::MonthFirst => ts.format("%b %-d, %Y").to_string(),
        }
    }

    fn long_date(&self, ts: &NaiveDateTime, with_year: bool) -> String {
        let pattern = match (self.order, with_year) {
            (DateOrder::DayFirst, true) => "%A, %-d %B %Y",
            (DateOrder::DayFirst, false) => "%A, %-d %B",
            (DateOrder::MonthFirst, true) => "%A, %B %-d, %Y",
            (DateOrder::MonthFirst, false) => "%A, %B %-d",
        };
        ts.format(pattern).to_string()
    }
}

/// 12-hour clock label without leading zero: 0 -> "12am", 13 -> "1pm".
pub fn hour_label(hour: u32) -> String {
    let hour = hour % 24;
    let suffix = if hour < 12 { "am" } else { "pm" };
    let display = match hour % 12 {
        0 => 12,
        h => h,
    };
    format!("{display}{suffix}")
}

pub fn format_cost(cost: f64) -> String {
    format!("${:.2}", finite_or_zero(cost))
}

pub fn format_consumption(kwh: f64) -> String {
    format!("{:.2} kWh", finite_or_zero(kwh))
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BillingPeriod;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn billing_cycle_line_combines_available_fields() {
        let summary = BillingSummary {
            start_date: NaiveDate::from_ymd_opt(2025, 1, 7),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 6),
            days_remaining: Some(11),
            progress_percent: Some(64.0),
            ..BillingSummary::default()
        };
        assert_eq!(
            LabelFormatter::new("en-NZ").format_billing_cycle(&summary),
            "7 Jan - 6 Feb 2025, day 20 of 31, 64% through"
        );
        assert_eq!(
            LabelFormatter::new("en-US").format_billing_cycle(&summary),
            "Jan 7 - Feb 6, 2025, day 20 of 31, 64% through"
        );

        let partial = BillingSummary {
            days_remaining: Some(1),
            ..BillingSummary::default()
        };
        assert_eq!(
            LabelFormatter::new("en-NZ").format_billing_cycle(&partial),
            "1 day left"
        );
        assert_eq!(
            LabelFormatter::new("en-NZ").format_billing_cycle(&BillingSummary::default()),
            ""
        );
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 6).expect("valid date")
    }

    fn at_hour(hour: i64) -> UsageRecord {
        UsageRecord::reported(
            monday().and_time(NaiveTime::MIN) + Duration::hours(hour),
            0.4,
            0.12,
        )
    }

    #[test]
    fn hour_labels_use_twelve_hour_clock() {
        assert_eq!(hour_label(0), "12am");
        assert_eq!(hour_label(6), "6am");
        assert_eq!(hour_label(12), "12pm");
        assert_eq!(hour_label(18), "6pm");
        assert_eq!(hour_label(23), "11pm");
    }

    #[test]
    fn hourly_axis_labels_every_six_hours() {
        let fmt = LabelFormatter::new("en-NZ");
        let labels: Vec<String> = (0..24)
            .map(|h| fmt.format_axis_label(&at_hour(h), Period::Hourly))
            .collect();
        assert_eq!(labels.iter().filter(|l| !l.is_empty()).count(), 4);
        assert_eq!(labels[0], "12am");
        assert_eq!(labels[6], "6am");
        assert_eq!(labels[12], "12pm");
        assert_eq!(labels[18], "6pm");
        assert_eq!(labels[7], "");
    }

    #[test]
    fn daily_and_monthly_axis_labels() {
        let nz = LabelFormatter::new("en-NZ");
        let us = LabelFormatter::new("en_US");
        let record = UsageRecord::on_day(monday(), 12.0, 3.0);
        assert_eq!(nz.format_axis_label(&record, Period::Daily), "Mon");
        assert_eq!(nz.format_axis_label(&record, Period::Monthly), "6 Jan");
        assert_eq!(us.format_axis_label(&record, Period::Monthly), "Jan 6");
        assert_eq!(
            nz.format_axis_label(&UsageRecord::padding(), Period::Monthly),
            ""
        );
    }

    #[test]
    fn selected_detail_per_period() {
        let fmt = LabelFormatter::new("en-NZ");
        assert_eq!(
            fmt.format_selected_detail(&UsageRecord::on_day(monday(), 1.0, 1.0), Period::Daily),
            "Your usage on Monday, 6 January 2025"
        );
        assert_eq!(
            fmt.format_selected_detail(&at_hour(15), Period::Hourly),
            "Your usage at 3pm on Monday, 6 January"
        );
        assert_eq!(
            fmt.format_selected_detail(&at_hour(0), Period::Hourly),
            "Your usage at 12am on Monday, 6 January"
        );
        assert_eq!(
            fmt.format_selected_detail(&UsageRecord::padding(), Period::Monthly),
            "Your usage this billing period"
        );
        assert_eq!(
            fmt.format_selected_detail(&UsageRecord::padding(), Period::Daily),
            ""
        );
    }

    #[test]
    fn month_first_locale_reorders_long_dates() {
        let fmt = LabelFormatter::new("en-US");
        assert_eq!(
            fmt.format_selected_detail(&UsageRecord::on_day(monday(), 1.0, 1.0), Period::Daily),
            "Your usage on Monday, January 6, 2025"
        );
    }

    #[test]
    fn monthly_headline_prefers_billing_range() {
        let fmt = LabelFormatter::new("en-NZ");
        let mut record = UsageRecord::on_day(monday(), 420.0, 130.0);
        assert_eq!(fmt.format_headline(&record, Period::Monthly), "January 2025");

        record.billing_period = Some(BillingPeriod {
            from: NaiveDate::from_ymd_opt(2024, 12, 7).expect("valid date"),
            to: monday(),
        });
        assert_eq!(
            fmt.format_headline(&record, Period::Monthly),
            "7 Dec 2024 - 6 Jan 2025"
        );
    }

    #[test]
    fn numbers_use_two_decimals() {
        assert_eq!(format_cost(3.456), "$3.46");
        assert_eq!(format_consumption(12.0), "12.00 kWh");
        assert_eq!(format_cost(f64::NAN), "$0.00");
    }
}
