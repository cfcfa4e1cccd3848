use crate::error::AppError;
use crate::models::{BillingPeriod, BillingSummary, UsageHistory, UsageRecord};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// Cumulative usage history. The utility only reports a short trailing window,
/// so every refresh is merged in here and the full history is paged from it.
pub struct Storage {
    conn: Connection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistorySummary {
    pub total_days: u64,
    pub total_consumption: f64,
    pub total_cost: f64,
    pub first_day: Option<NaiveDate>,
    pub last_day: Option<NaiveDate>,
}

impl HistorySummary {
    pub fn average_daily_consumption(&self) -> f64 {
        if self.total_days == 0 {
            0.0
        } else {
            self.total_consumption / self.total_days as f64
        }
    }

    pub fn average_daily_cost(&self) -> f64 {
        if self.total_days == 0 {
            0.0
        } else {
            self.total_cost / self.total_days as f64
        }
    }

    pub fn cost_per_kwh(&self) -> f64 {
        if self.total_consumption > 0.0 {
            self.total_cost / self.total_consumption
        } else {
            0.0
        }
    }
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        let this = Self { conn };
        this.init()?;
        Ok(this)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, AppError> {
        let this = Self {
            conn: Connection::open_in_memory()?,
        };
        this.init()?;
        Ok(this)
    }

    fn init(&self) -> Result<(), AppError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS daily_usage (
                day TEXT PRIMARY KEY,
                consumption REAL NOT NULL,
                cost REAL NOT NULL,
                free_power INTEGER NOT NULL DEFAULT 0,
                temperature REAL
            );

            CREATE TABLE IF NOT EXISTS hourly_usage (
                hour_ts TEXT PRIMARY KEY,
                consumption REAL NOT NULL,
                cost REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS monthly_usage (
                period_end TEXT PRIMARY KEY,
                consumption REAL NOT NULL,
                cost REAL NOT NULL,
                invoice_from TEXT,
                invoice_to TEXT
            );

            CREATE TABLE IF NOT EXISTS billing_summary (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Upserts every reported record. A later value for the same day, hour or
    /// billing period replaces the stored one; a missing temperature keeps the
    /// stored reading. A billing summary replaces the stored one wholesale.
    pub fn merge_history(&mut self, history: &UsageHistory) -> Result<(), AppError> {
        let tx = self.conn.transaction()?;

        let mut upsert_daily = tx.prepare(
            "INSERT INTO daily_usage (day, consumption, cost, free_power, temperature)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(day) DO UPDATE SET
                consumption = excluded.consumption,
                cost = excluded.cost,
                free_power = excluded.free_power,
                temperature = COALESCE(excluded.temperature, daily_usage.temperature)",
        )?;
        for r in history.daily.iter().filter(|r| !r.is_placeholder()) {
            let Some(day) = r.day() else { continue };
            upsert_daily.execute(params![
                day.format(DAY_FORMAT).to_string(),
                r.consumption,
                r.cost,
                r.free_power,
                r.temperature,
            ])?;
        }

        let mut upsert_hourly = tx.prepare(
            "INSERT INTO hourly_usage (hour_ts, consumption, cost)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(hour_ts) DO UPDATE SET
                consumption = excluded.consumption,
                cost = excluded.cost",
        )?;
        for r in history.hourly.iter().filter(|r| !r.is_placeholder()) {
            let Some(ts) = r.timestamp else { continue };
            upsert_hourly.execute(params![
                ts.format(TS_FORMAT).to_string(),
                r.consumption,
                r.cost,
            ])?;
        }

        let mut upsert_monthly = tx.prepare(
            "INSERT INTO monthly_usage (period_end, consumption, cost, invoice_from, invoice_to)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(period_end) DO UPDATE SET
                consumption = excluded.consumption,
                cost = excluded.cost,
                invoice_from = excluded.invoice_from,
                invoice_to = excluded.invoice_to",
        )?;
        for r in history.monthly.iter().filter(|r| !r.is_placeholder()) {
            let Some(ts) = r.timestamp else { continue };
            upsert_monthly.execute(params![
                ts.format(TS_FORMAT).to_string(),
                r.consumption,
                r.cost,
                r.billing_period.map(|bp| bp.from.format(DAY_FORMAT).to_string()),
                r.billing_period.map(|bp| bp.to.format(DAY_FORMAT).to_string()),
            ])?;
        }

        drop(upsert_daily);
        drop(upsert_hourly);
        drop(upsert_monthly);

        if let Some(billing) = &history.billing {
            tx.execute(
                "INSERT INTO billing_summary (id, payload, updated_at)
                 VALUES (1, ?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET
                    payload = excluded.payload,
                    updated_at = excluded.updated_at",
                params![
                    serde_json::to_string(billing)?,
                    chrono::Utc::now().to_rfc3339()
                ],
            )?;
        }
        tx.commit()?;
        debug!(records = history.len(), "merged usage history");
        Ok(())
    }

    /// Keeps the newest `retention_days` days and `retention_days * 24` hours.
    pub fn trim(&mut self, retention_days: u32) -> Result<usize, AppError> {
        let tx = self.conn.transaction()?;
        let days = tx.execute(
            "DELETE FROM daily_usage WHERE day NOT IN
                (SELECT day FROM daily_usage ORDER BY day DESC LIMIT ?1)",
            [i64::from(retention_days)],
        )?;
        let hours = tx.execute(
            "DELETE FROM hourly_usage WHERE hour_ts NOT IN
                (SELECT hour_ts FROM hourly_usage ORDER BY hour_ts DESC LIMIT ?1)",
            [i64::from(retention_days) * 24],
        )?;
        tx.commit()?;
        if days + hours > 0 {
            info!(days, hours, retention_days, "trimmed usage history");
        }
        Ok(days + hours)
    }

    pub fn load_history(&self) -> Result<UsageHistory, AppError> {
        let mut daily_stmt = self.conn.prepare(
            "SELECT day, consumption, cost, free_power, temperature
             FROM daily_usage ORDER BY day ASC",
        )?;
        let daily = daily_stmt
            .query_map([], |row| {
                let day = parse_day(row, 0)?;
                let mut record = UsageRecord::on_day(day, row.get(1)?, row.get(2)?);
                record.free_power = row.get(3)?;
                record.temperature = row.get(4)?;
                Ok(record)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut hourly_stmt = self
            .conn
            .prepare("SELECT hour_ts, consumption, cost FROM hourly_usage ORDER BY hour_ts ASC")?;
        let hourly = hourly_stmt
            .query_map([], |row| {
                Ok(UsageRecord::reported(parse_ts(row, 0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut monthly_stmt = self.conn.prepare(
            "SELECT period_end, consumption, cost, invoice_from, invoice_to
             FROM monthly_usage ORDER BY period_end ASC",
        )?;
        let monthly = monthly_stmt
            .query_map([], |row| {
                let mut record =
                    UsageRecord::reported(parse_ts(row, 0)?, row.get(1)?, row.get(2)?);
                let from: Option<String> = row.get(3)?;
                let to: Option<String> = row.get(4)?;
                if let (Some(from), Some(to)) = (from, to) {
                    record.billing_period = Some(BillingPeriod {
                        from: parse_day_str(&from, 3)?,
                        to: parse_day_str(&to, 4)?,
                    });
                }
                Ok(record)
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(UsageHistory {
            daily,
            hourly,
            monthly,
            billing: self.load_billing()?,
        })
    }

    fn load_billing(&self) -> Result<Option<BillingSummary>, AppError> {
        let payload: Option<String> = self
            .conn
            .query_row("SELECT payload FROM billing_summary WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match payload {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn summary(&self) -> Result<HistorySummary, AppError> {
        let (total_days, total_consumption, total_cost): (i64, f64, f64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(consumption), 0.0), COALESCE(SUM(cost), 0.0)
             FROM daily_usage",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let bounds: Option<(Option<String>, Option<String>)> = self
            .conn
            .query_row("SELECT MIN(day), MAX(day) FROM daily_usage", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .optional()?;
        let (first, last) = bounds.unwrap_or((None, None));

        Ok(HistorySummary {
            total_days: total_days.max(0) as u64,
            total_consumption,
            total_cost,
            first_day: first.and_then(|d| NaiveDate::parse_from_str(&d, DAY_FORMAT).ok()),
            last_day: last.and_then(|d| NaiveDate::parse_from_str(&d, DAY_FORMAT).ok()),
        })
    }
}

fn parse_day(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    parse_day_str(&row.get::<_, String>(idx)?, idx)
}

fn parse_day_str(raw: &str, idx: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DAY_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TS_FORMAT)
        .or_else(|_| parse_day_str(&raw, idx).map(|d| d.and_time(NaiveTime::MIN)))
        .map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Text,
                format!("invalid timestamp '{raw}'").into(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn day(offset: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 2, 1).expect("valid date") + Duration::days(offset)
    }

    fn daily(days: std::ops::Range<i64>, consumption: f64) -> UsageHistory {
        UsageHistory {
            daily: days
                .map(|d| UsageRecord::on_day(day(d), consumption, consumption / 4.0))
                .collect(),
            ..UsageHistory::default()
        }
    }

    #[test]
    fn merge_history_overwrites_same_day_and_extends_range() {
        let tmp = TempDir::new().expect("tempdir");
        let mut storage = Storage::open(&tmp.path().join("history.sqlite")).expect("open storage");

        storage.merge_history(&daily(0..14, 10.0)).expect("first merge");
        storage.merge_history(&daily(7..21, 20.0)).expect("second merge");

        let history = storage.load_history().expect("load history");
        assert_eq!(history.daily.len(), 21);
        assert_eq!(history.daily[0].day(), Some(day(0)));
        assert_eq!(history.daily[6].consumption, 10.0);
        assert_eq!(history.daily[7].consumption, 20.0);
        assert_eq!(history.daily[20].day(), Some(day(20)));
    }

    #[test]
    fn merge_history_keeps_temperature_when_missing() {
        let mut storage = Storage::open_in_memory().expect("open storage");
        let mut first = daily(0..1, 5.0);
        first.daily[0].temperature = Some(14.5);
        storage.merge_history(&first).expect("first merge");
        storage.merge_history(&daily(0..1, 6.0)).expect("second merge");

        let history = storage.load_history().expect("load history");
        assert_eq!(history.daily[0].consumption, 6.0);
        assert_eq!(history.daily[0].temperature, Some(14.5));
    }

    #[test]
    fn trim_keeps_newest_days() {
        let mut storage = Storage::open_in_memory().expect("open storage");
        storage.merge_history(&daily(0..200, 1.0)).expect("merge");

        let removed = storage.trim(180).expect("trim");
        assert_eq!(removed, 20);

        let history = storage.load_history().expect("load history");
        assert_eq!(history.daily.len(), 180);
        assert_eq!(history.daily[0].day(), Some(day(20)));
    }

    #[test]
    fn hourly_and_monthly_round_trip() {
        let mut storage = Storage::open_in_memory().expect("open storage");
        let mut bill = UsageRecord::on_day(day(30), 410.0, 123.4);
        bill.billing_period = Some(BillingPeriod {
            from: day(0),
            to: day(30),
        });
        let history = UsageHistory {
            hourly: vec![UsageRecord::reported(
                day(3).and_time(NaiveTime::MIN) + Duration::hours(17),
                0.8,
                0.2,
            )],
            monthly: vec![bill.clone()],
            ..UsageHistory::default()
        };
        storage.merge_history(&history).expect("merge");

        let loaded = storage.load_history().expect("load history");
        assert_eq!(loaded.hourly, history.hourly);
        assert_eq!(loaded.monthly, vec![bill]);
    }

    #[test]
    fn billing_summary_is_replaced_not_cleared() {
        let mut storage = Storage::open_in_memory().expect("open storage");
        assert_eq!(storage.load_history().expect("load").billing, None);

        let first = BillingSummary {
            usage_cost: Some(40.0),
            days_remaining: Some(20),
            ..BillingSummary::default()
        };
        let mut history = daily(0..1, 1.0);
        history.billing = Some(first);
        storage.merge_history(&history).expect("first merge");

        let second = BillingSummary {
            usage_cost: Some(55.5),
            days_remaining: Some(12),
            start_date: Some(day(0)),
            end_date: Some(day(30)),
            ..BillingSummary::default()
        };
        history.billing = Some(second.clone());
        storage.merge_history(&history).expect("second merge");
        storage.merge_history(&daily(1..2, 1.0)).expect("merge without summary");

        let loaded = storage.load_history().expect("load history");
        assert_eq!(loaded.billing, Some(second));
        assert_eq!(loaded.daily.len(), 2);
    }

    #[test]
    fn summary_reports_totals_and_range() {
        let mut storage = Storage::open_in_memory().expect("open storage");
        assert_eq!(storage.summary().expect("empty summary"), HistorySummary::default());

        storage.merge_history(&daily(0..4, 10.0)).expect("merge");
        let summary = storage.summary().expect("summary");
        assert_eq!(summary.total_days, 4);
        assert!((summary.total_consumption - 40.0).abs() < 1e-9);
        assert!((summary.total_cost - 10.0).abs() < 1e-9);
        assert!((summary.cost_per_kwh() - 0.25).abs() < 1e-9);
        assert!((summary.average_daily_consumption() - 10.0).abs() < 1e-9);
        assert_eq!(summary.first_day, Some(day(0)));
        assert_eq!(summary.last_day, Some(day(3)));
    }
}
