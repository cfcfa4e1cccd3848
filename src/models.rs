use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Where a record in a window came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Reported by the utility.
    Reported,
    /// Synthesized zero slot for an hour with no reading.
    HourFill,
    /// Synthesized zero slot used to pad a short monthly window.
    Padding,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BillingPeriod {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: Option<NaiveDateTime>,
    pub consumption: f64,
    pub cost: f64,
    pub temperature: Option<f64>,
    pub billing_period: Option<BillingPeriod>,
    pub free_power: bool,
    pub origin: RecordOrigin,
}

impl UsageRecord {
    pub fn reported(timestamp: NaiveDateTime, consumption: f64, cost: f64) -> Self {
        Self {
            timestamp: Some(timestamp),
            consumption,
            cost,
            temperature: None,
            billing_period: None,
            free_power: false,
            origin: RecordOrigin::Reported,
        }
    }

    pub fn on_day(day: NaiveDate, consumption: f64, cost: f64) -> Self {
        Self::reported(day.and_time(NaiveTime::MIN), consumption, cost)
    }

    pub fn empty_hour(day: NaiveDate, hour: u32) -> Self {
        Self {
            origin: RecordOrigin::HourFill,
            ..Self::reported(
                day.and_time(NaiveTime::MIN) + Duration::hours(i64::from(hour)),
                0.0,
                0.0,
            )
        }
    }

    pub fn padding() -> Self {
        Self {
            timestamp: None,
            consumption: 0.0,
            cost: 0.0,
            temperature: None,
            billing_period: None,
            free_power: false,
            origin: RecordOrigin::Padding,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.origin != RecordOrigin::Reported
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.timestamp.map(|ts| ts.date())
    }

    pub fn hour(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.hour())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Hourly,
    Daily,
    Monthly,
}

impl Period {
    pub const ALL: [Period; 3] = [Period::Hourly, Period::Daily, Period::Monthly];

    pub fn as_label(self) -> &'static str {
        match self {
            Period::Hourly => "hourly",
            Period::Daily => "daily",
            Period::Monthly => "monthly",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "hourly" | "hour" | "h" => Some(Period::Hourly),
            "daily" | "day" | "d" => Some(Period::Daily),
            "monthly" | "month" | "m" => Some(Period::Monthly),
            _ => None,
        }
    }
}

/// One charge line from the latest bill statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    pub item: String,
    pub amount: f64,
}

/// The billing cycle in progress, as the utility summarises it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingSummary {
    pub usage_cost: Option<f64>,
    pub usage_consumption: Option<f64>,
    pub days_remaining: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub progress_percent: Option<f64>,
    pub projected_bill_note: Option<String>,
    #[serde(default)]
    pub statement_details: Vec<StatementLine>,
}

impl BillingSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Length of the cycle in days, counting both ends.
    pub fn cycle_days(&self) -> Option<i64> {
        let (start, end) = (self.start_date?, self.end_date?);
        (end >= start).then(|| (end - start).num_days() + 1)
    }
}

/// Per-period history as exposed by the host, each list in source order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageHistory {
    pub daily: Vec<UsageRecord>,
    pub hourly: Vec<UsageRecord>,
    pub monthly: Vec<UsageRecord>,
    /// Latest billing-cycle summary, if the snapshot carried one.
    #[serde(default)]
    pub billing: Option<BillingSummary>,
}

impl UsageHistory {
    pub fn records(&self, period: Period) -> &[UsageRecord] {
        match period {
            Period::Hourly => &self.hourly,
            Period::Daily => &self.daily,
            Period::Monthly => &self.monthly,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.daily.is_empty() && self.hourly.is_empty() && self.monthly.is_empty()
    }

    pub fn len(&self) -> usize {
        self.daily.len() + self.hourly.len() + self.monthly.len()
    }
}
