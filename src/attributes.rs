//! Parsing of the usage sensor's attribute blob into typed history.
//!
//! The blob is produced by the utility integration and is not under our
//! control, so every field is optional. Records without a usable timestamp are
//! dropped; unusable numbers become zero.

use crate::models::{BillingPeriod, BillingSummary, StatementLine, UsageHistory, UsageRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

const DAILY_KEYS: [&str; 3] = [
    "extended_daily_usage_history",
    "daily_usage_history",
    "dailyHistory",
];
const HOURLY_KEYS: [&str; 3] = [
    "extended_hourly_usage_history",
    "hourly_usage_history",
    "hourlyHistory",
];
const MONTHLY_KEYS: [&str; 2] = ["monthly_usage_history", "monthlyHistory"];
const TEMPERATURE_KEYS: [&str; 2] = ["extended_temperature_history", "temperature_history"];
const STATEMENT_ITEM_KEYS: [&str; 4] = ["lineItem", "line_item", "description", "name"];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_attributes(attrs: &Value) -> UsageHistory {
    let temperatures = temperature_by_day(history_array(attrs, &TEMPERATURE_KEYS));

    let mut daily = parse_records(history_array(attrs, &DAILY_KEYS), "daily", record_from_item);
    for record in &mut daily {
        if let Some(day) = record.day() {
            record.temperature = temperatures.get(&day).copied();
        }
    }

    let hourly = parse_records(history_array(attrs, &HOURLY_KEYS), "hourly", record_from_item);
    let monthly = parse_records(
        history_array(attrs, &MONTHLY_KEYS),
        "monthly",
        monthly_record_from_item,
    );

    debug!(
        daily = daily.len(),
        hourly = hourly.len(),
        monthly = monthly.len(),
        temperatures = temperatures.len(),
        "parsed usage attributes"
    );

    UsageHistory {
        daily,
        hourly,
        monthly,
        billing: parse_billing_summary(attrs),
    }
}

/// Reads the `monthly_*` cycle fields and `bill_statement_details`.
/// Returns `None` when the snapshot carries none of them.
pub fn parse_billing_summary(attrs: &Value) -> Option<BillingSummary> {
    let date = |key: &str| {
        attrs
            .get(key)
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .map(|ts| ts.date())
    };

    let statement_details = attrs
        .get("bill_statement_details")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(statement_line).collect())
        .unwrap_or_default();

    let summary = BillingSummary {
        usage_cost: number(attrs.get("monthly_usage_cost")).map(|v| v.max(0.0)),
        usage_consumption: number(attrs.get("monthly_usage_consumption")).map(|v| v.max(0.0)),
        days_remaining: number(attrs.get("monthly_days_remaining"))
            .map(|v| v.max(0.0).round() as u32),
        start_date: date("monthly_billing_start_date"),
        end_date: date("monthly_billing_end_date"),
        progress_percent: number(attrs.get("monthly_billing_progress_percent"))
            .map(|v| v.clamp(0.0, 100.0)),
        projected_bill_note: attrs
            .get("monthly_projected_bill_note")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|note| !note.is_empty())
            .map(str::to_string),
        statement_details,
    };

    (!summary.is_empty()).then_some(summary)
}

fn statement_line(item: &Value) -> Option<StatementLine> {
    let name = STATEMENT_ITEM_KEYS
        .iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))?
        .trim();
    if name.is_empty() {
        return None;
    }
    Some(StatementLine {
        item: name.to_string(),
        amount: number(item.get("amount")).unwrap_or(0.0),
    })
}

fn history_array<'a>(attrs: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| attrs.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn parse_records(
    items: &[Value],
    kind: &str,
    parse: fn(&Value) -> Option<UsageRecord>,
) -> Vec<UsageRecord> {
    let mut out = Vec::with_capacity(items.len());
    let mut skipped = 0usize;
    for item in items {
        match parse(item) {
            Some(record) => out.push(record),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(kind, skipped, "skipped usage records without a readable date");
    }
    out
}

fn record_from_item(item: &Value) -> Option<UsageRecord> {
    let timestamp = item_timestamp(item, &["date", "datetime"])?;
    let mut record = UsageRecord::reported(
        timestamp,
        non_negative(item.get("consumption")),
        non_negative(item.get("cost")),
    );
    record.free_power = item
        .get("free_power")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Some(record)
}

fn monthly_record_from_item(item: &Value) -> Option<UsageRecord> {
    let timestamp = item_timestamp(item, &["date", "datetime", "invoiceTo"])?;
    let mut record = UsageRecord::reported(
        timestamp,
        non_negative(item.get("consumption")),
        non_negative(item.get("cost")),
    );

    let from = item.get("invoiceFrom").and_then(Value::as_str).and_then(parse_timestamp);
    let to = item.get("invoiceTo").and_then(Value::as_str).and_then(parse_timestamp);
    if let (Some(from), Some(to)) = (from, to) {
        record.billing_period = Some(BillingPeriod {
            from: from.date(),
            to: to.date(),
        });
    }
    Some(record)
}

fn temperature_by_day(items: &[Value]) -> HashMap<NaiveDate, f64> {
    items
        .iter()
        .filter_map(|item| {
            let day = item_timestamp(item, &["date", "datetime"])?.date();
            let temp = number(item.get("temp")).or_else(|| number(item.get("temperature")))?;
            Some((day, temp))
        })
        .collect()
}

fn item_timestamp(item: &Value, keys: &[&str]) -> Option<NaiveDateTime> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(Value::as_str))
        .and_then(parse_timestamp)
}

/// Reads an ISO-8601 date or date-time. Offsets are dropped and the wall-clock
/// time at the reported offset is kept, so a day stays the utility's day.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(parsed);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|day| day.and_time(NaiveTime::MIN))
}

fn number(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

fn non_negative(value: Option<&Value>) -> f64 {
    number(value).map(|v| v.max(0.0)).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Period;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parse_timestamp_accepts_common_shapes() {
        let midnight = day(2025, 1, 6).and_time(NaiveTime::MIN);
        assert_eq!(parse_timestamp("2025-01-06"), Some(midnight));
        assert_eq!(parse_timestamp("2025-01-06T00:00:00"), Some(midnight));
        assert_eq!(parse_timestamp("2025-01-06T00:00:00+13:00"), Some(midnight));
        assert_eq!(parse_timestamp("2025-01-06T00:00:00.000Z"), Some(midnight));
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn daily_records_join_temperature_and_skip_bad_dates() {
        let attrs = json!({
            "daily_usage_history": [
                {"date": "2025-01-05T00:00:00+13:00", "consumption": 11.5, "cost": 3.2},
                {"date": "garbage", "consumption": 9.0},
                {"date": "2025-01-06T00:00:00+13:00", "consumption": "12.25", "free_power": true}
            ],
            "temperature_history": [
                {"date": "2025-01-06T00:00:00+13:00", "temp": 18}
            ]
        });

        let history = parse_attributes(&attrs);
        assert_eq!(history.daily.len(), 2);
        assert_eq!(history.daily[0].temperature, None);
        assert_eq!(history.daily[1].temperature, Some(18.0));
        assert_eq!(history.daily[1].consumption, 12.25);
        assert_eq!(history.daily[1].cost, 0.0);
        assert!(history.daily[1].free_power);
    }

    #[test]
    fn extended_history_is_preferred() {
        let attrs = json!({
            "daily_usage_history": [{"date": "2025-01-06", "consumption": 1.0}],
            "extended_daily_usage_history": [
                {"date": "2025-01-05", "consumption": 1.0},
                {"date": "2025-01-06", "consumption": 1.0}
            ]
        });
        assert_eq!(parse_attributes(&attrs).daily.len(), 2);
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let attrs = json!({
            "hourlyHistory": [{"datetime": "2025-01-06T13:00:00", "consumption": 0.4, "cost": 0.1}]
        });
        let history = parse_attributes(&attrs);
        assert_eq!(history.records(Period::Hourly).len(), 1);
        assert_eq!(history.hourly[0].hour(), Some(13));
    }

    #[test]
    fn monthly_records_carry_billing_period() {
        let attrs = json!({
            "monthly_usage_history": [
                {
                    "invoiceFrom": "2024-12-07T00:00:00+13:00",
                    "invoiceTo": "2025-01-06T00:00:00+13:00",
                    "consumption": 402.7,
                    "cost": -5.0
                },
                {"invoiceFrom": "2025-01-07", "consumption": 10.0}
            ]
        });
        let history = parse_attributes(&attrs);
        assert_eq!(history.monthly.len(), 1);
        let record = &history.monthly[0];
        assert_eq!(record.day(), Some(day(2025, 1, 6)));
        assert_eq!(record.cost, 0.0);
        assert_eq!(
            record.billing_period,
            Some(BillingPeriod {
                from: day(2024, 12, 7),
                to: day(2025, 1, 6),
            })
        );
    }

    #[test]
    fn missing_keys_give_empty_history() {
        assert!(parse_attributes(&json!({"friendly_name": "Usage"})).is_empty());
        assert!(parse_attributes(&json!(null)).is_empty());
        assert_eq!(parse_attributes(&json!({"friendly_name": "Usage"})).billing, None);
    }

    #[test]
    fn non_numeric_values_are_zero_filled() {
        let attrs = json!({
            "daily_usage_history": [
                {"date": "2025-01-06", "consumption": "abc", "cost": {"amount": 1}},
                {"date": "2025-01-07", "consumption": null, "cost": "2.10"}
            ]
        });
        let history = parse_attributes(&attrs);
        assert_eq!(history.daily.len(), 2);
        assert_eq!(history.daily[0].day(), Some(day(2025, 1, 6)));
        assert_eq!(history.daily[0].consumption, 0.0);
        assert_eq!(history.daily[0].cost, 0.0);
        assert_eq!(history.daily[1].consumption, 0.0);
        assert_eq!(history.daily[1].cost, 2.1);
    }

    #[test]
    fn billing_summary_reads_cycle_fields_and_statement() {
        let attrs = json!({
            "monthly_usage_cost": "84.12",
            "monthly_usage_consumption": 301.5,
            "monthly_days_remaining": 11,
            "monthly_billing_start_date": "2025-01-07T00:00:00+13:00",
            "monthly_billing_end_date": "2025-02-06",
            "monthly_billing_progress_percent": 64.5,
            "monthly_projected_bill_note": "  Projected bill is about $130  ",
            "bill_statement_details": [
                {"lineItem": "Electricity", "amount": 120.5},
                {"lineItem": "Broadband", "amount": "89.00"},
                {"amount": 3.0}
            ]
        });

        let summary = parse_attributes(&attrs).billing.expect("billing summary");
        assert_eq!(summary.usage_cost, Some(84.12));
        assert_eq!(summary.usage_consumption, Some(301.5));
        assert_eq!(summary.days_remaining, Some(11));
        assert_eq!(summary.start_date, Some(day(2025, 1, 7)));
        assert_eq!(summary.end_date, Some(day(2025, 2, 6)));
        assert_eq!(summary.cycle_days(), Some(31));
        assert_eq!(summary.progress_percent, Some(64.5));
        assert_eq!(
            summary.projected_bill_note.as_deref(),
            Some("Projected bill is about $130")
        );
        assert_eq!(
            summary.statement_details,
            vec![
                StatementLine {
                    item: "Electricity".into(),
                    amount: 120.5,
                },
                StatementLine {
                    item: "Broadband".into(),
                    amount: 89.0,
                },
            ]
        );
    }

    #[test]
    fn billing_summary_clamps_out_of_range_values() {
        let attrs = json!({
            "monthly_days_remaining": -3,
            "monthly_billing_progress_percent": 140,
            "monthly_projected_bill_note": ""
        });
        let summary = parse_billing_summary(&attrs).expect("billing summary");
        assert_eq!(summary.days_remaining, Some(0));
        assert_eq!(summary.progress_percent, Some(100.0));
        assert_eq!(summary.projected_bill_note, None);
    }
}
