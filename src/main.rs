mod attributes;
mod config;
mod error;
mod labels;
mod models;
mod report;
mod selection;
mod service;
mod source;
mod storage;
mod ui;
mod window;

use attributes::parse_attributes;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use config::{
    config_path, db_path, delete_token, ensure_initialized, has_token, load_config, log_path,
    set_token,
};
use error::AppError;
use labels::{format_consumption, format_cost, LabelFormatter};
use models::{Period, UsageHistory};
use report::{OutputFormat, WindowReport};
use selection::SelectionTracker;
use service::MeterService;
use source::file::FileSource;
use source::{configured_source, SnapshotSource};
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use storage::Storage;
use tracing_subscriber::EnvFilter;
use ui::run::run_tui;
use window::{compute_window, latest_day, WindowOutcome, WindowRequest};

const DEFAULT_LOG_FILTER: &str = "energy_meter=warn";

#[derive(Debug, Parser)]
#[command(name = "energy-meter")]
#[command(about = "Household electricity usage viewer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    SetToken {
        #[arg(long)]
        token: String,
    },
    ClearToken,
    Status,
    Check,
    Fetch {
        #[arg(long)]
        input: Option<String>,
    },
    Show {
        #[arg(long, default_value = "daily")]
        period: String,
        #[arg(long, default_value_t = 0)]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long)]
        anchor: Option<String>,
        #[arg(long)]
        today: Option<String>,
        #[arg(long)]
        select: Option<usize>,
        #[arg(long)]
        input: Option<String>,
        #[arg(long, default_value = "text")]
        format: String,
    },
    Tui,
}

fn validate_period(input: &str) -> Result<Period, AppError> {
    Period::parse(input).ok_or_else(|| {
        AppError::Config("Unsupported period. Use hourly, daily, or monthly.".into())
    })
}

fn validate_format(input: &str) -> Result<OutputFormat, AppError> {
    OutputFormat::parse(input)
        .ok_or_else(|| AppError::Config("Unsupported format. Use text or json.".into()))
}

fn parse_date(input: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Config(format!("Invalid date '{input}'. Use YYYY-MM-DD.")))
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The dashboard owns the terminal, so its logs go to a file.
fn init_file_logging() -> Result<(), AppError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path()?)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("energy_meter=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init();
    Ok(())
}

fn load_history(input: Option<&str>) -> Result<UsageHistory, AppError> {
    match input {
        Some(path) => {
            let attrs = FileSource::new(Path::new(path)).read()?;
            Ok(parse_attributes(&attrs))
        }
        None => {
            ensure_initialized()?;
            Storage::open(&db_path()?)?.load_history()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Tui) {
        ensure_initialized()?;
        init_file_logging()?;
    } else {
        init_logging();
    }

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized energy-meter config and data directories.");
        }
        Commands::SetToken { token } => {
            ensure_initialized()?;
            if token.trim().is_empty() {
                return Err(AppError::Config("Token must not be empty.".into()));
            }
            set_token(&token)?;
            println!("Home Assistant token stored.");
        }
        Commands::ClearToken => {
            delete_token()?;
            println!("Home Assistant token removed.");
        }
        Commands::Status => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let storage = Storage::open(&db_path()?)?;
            let summary = storage.summary()?;
            let history = storage.load_history()?;

            println!("config:        {}", config_path()?.display());
            println!(
                "source:        {} ({})",
                cfg.source.base_url.as_deref().unwrap_or("not configured"),
                cfg.source.entity_id
            );
            println!(
                "token:         {}",
                if has_token().unwrap_or(false) { "stored" } else { "missing" }
            );
            println!("locale:        {}", cfg.locale);
            match (summary.first_day, summary.last_day) {
                (Some(first), Some(last)) => {
                    println!("history:       {} days ({first} to {last})", summary.total_days)
                }
                _ => println!("history:       empty"),
            }
            println!(
                "total:         {}  {}",
                format_consumption(summary.total_consumption),
                format_cost(summary.total_cost)
            );
            println!(
                "daily average: {}  {}",
                format_consumption(summary.average_daily_consumption()),
                format_cost(summary.average_daily_cost())
            );
            println!("cost per kWh:  {}", format_cost(summary.cost_per_kwh()));
            for period in Period::ALL {
                println!(
                    "{:<14} {} records",
                    format!("{}:", period.as_label()),
                    history.records(period).len()
                );
            }
        }
        Commands::Check => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let source = configured_source(&cfg.source)?;
            let svc = MeterService::new()?;
            let report = svc.test_source_connection(source.as_ref()).await?;
            match report.status_code {
                Some(code) => println!(
                    "{} reachable: HTTP {code} in {} ms",
                    source.name(),
                    report.duration_ms
                ),
                None => println!("{} reachable in {} ms", source.name(), report.duration_ms),
            }
        }
        Commands::Fetch { input } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let mut storage = Storage::open(&db_path()?)?;
            let svc = MeterService::new()?;
            let source = match input {
                Some(path) => Box::new(FileSource::new(path)) as Box<dyn SnapshotSource>,
                None => configured_source(&cfg.source)?,
            };
            let report = svc.refresh(&cfg, source.as_ref(), &mut storage).await?;
            println!(
                "Fetched {} daily, {} hourly and {} monthly records from {}; {} stored, {} trimmed at {}",
                report.fetched.daily.len(),
                report.fetched.hourly.len(),
                report.fetched.monthly.len(),
                source.name(),
                report.history.len(),
                report.trimmed,
                report.fetched_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
        Commands::Show {
            period,
            page,
            page_size,
            anchor,
            today,
            select,
            input,
            format,
        } => {
            let period = validate_period(&period)?;
            let format = validate_format(&format)?;
            let today = match today.as_deref() {
                Some(raw) => parse_date(raw)?,
                None => Local::now().date_naive(),
            };
            let anchor = anchor.as_deref().map(parse_date).transpose()?;
            let cfg = load_config()?;
            let history = load_history(input.as_deref())?;

            let anchor = match (period, anchor) {
                (Period::Hourly, None) => latest_day(&history.hourly),
                (_, anchor) => anchor,
            };
            let request = WindowRequest::new(period, today)
                .page(page)
                .page_size(page_size.unwrap_or(cfg.page_size))
                .anchor(anchor)
                .monthly_min_slots(cfg.monthly_min_slots);

            let window = match compute_window(history.records(period), &request) {
                WindowOutcome::Ready(window) => window,
                WindowOutcome::NotReady => {
                    match format {
                        OutputFormat::Json => println!(
                            "{}",
                            serde_json::json!({"ready": false, "period": period})
                        ),
                        OutputFormat::Text => {
                            println!("No {} data is available yet.", period.as_label())
                        }
                    }
                    return Ok(());
                }
            };

            let mut selection = SelectionTracker::new();
            selection.sync(&window);
            if let Some(index) = select {
                selection.select(index, &window);
            }

            let formatter = LabelFormatter::new(&cfg.locale);
            let report = WindowReport::build(&window, &selection, &formatter)
                .with_billing(history.billing.as_ref(), &formatter);
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => print!("{}", report.render_text()),
            }
        }
        Commands::Tui => {
            run_tui().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_period_accepts_names_and_aliases() {
        assert_eq!(validate_period("daily").expect("daily"), Period::Daily);
        assert_eq!(validate_period("H").expect("hourly"), Period::Hourly);
        assert_eq!(validate_period("month").expect("monthly"), Period::Monthly);
    }

    #[test]
    fn validate_period_rejects_unknown_values() {
        let err = validate_period("weekly").expect_err("expected validation error");
        assert!(err.to_string().contains("Unsupported period"));
    }

    #[test]
    fn validate_format_rejects_csv() {
        let err = validate_format("csv").expect_err("expected validation error");
        assert!(err.to_string().contains("Unsupported format"));
    }

    #[test]
    fn parse_date_requires_iso_dates() {
        assert_eq!(
            parse_date("2025-01-06").expect("valid date"),
            NaiveDate::from_ymd_opt(2025, 1, 6).expect("valid date")
        );
        assert!(parse_date("06/01/2025").is_err());
    }
}
