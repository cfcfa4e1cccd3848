use crate::config::{db_path, load_config, AppConfig};
use crate::error::AppError;
use crate::labels::{format_consumption, format_cost, LabelFormatter};
use crate::models::{BillingSummary, Period};
use crate::service::MeterService;
use crate::source::configured_source;
use crate::storage::Storage;
use crate::ui::app::{AppState, Screen};
use crate::window::{Window, WindowOutcome};
use chrono::{Local, NaiveDate};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Bar, BarChart, BarGroup, Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Terminal;
use serde_json::Value;
use std::io;
use std::time::{Duration as StdDuration, Instant};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_INFO: Color = Color::Green;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;
const MIN_REFRESH_SECONDS: u64 = 30;

struct RefreshJob {
    started_at: Instant,
    handle: JoinHandle<Result<Value, AppError>>,
}

pub async fn run_tui() -> Result<(), AppError> {
    let cfg = load_config()?;
    let db = db_path()?;
    let mut storage = Storage::open(&db)?;
    let service = MeterService::new()?;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let loop_result = run_loop(&mut terminal, &cfg, &mut storage, &service).await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    cfg: &AppConfig,
    storage: &mut Storage,
    service: &MeterService,
) -> Result<(), AppError> {
    let formatter = LabelFormatter::new(&cfg.locale);
    let mut state = AppState::from_config(cfg);
    let mut refresh_job: Option<RefreshJob> = None;
    let mut last_tick = Instant::now();
    let tick_rate = StdDuration::from_secs(cfg.refresh_seconds.max(MIN_REFRESH_SECONDS));

    match storage.load_history() {
        Ok(history) => state.replace_history(history, today()),
        Err(e) => show_error(&mut state, format!("Failed to load stored history: {e}")),
    }
    queue_refresh(&mut state, cfg, service, &mut refresh_job);

    while state.running {
        if refresh_job
            .as_ref()
            .is_some_and(|job| job.handle.is_finished())
        {
            process_refresh_job(&mut state, cfg, storage, service, &mut refresh_job).await;
        }

        terminal.draw(|f| render(f, &formatter, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| StdDuration::from_millis(0))
            .min(StdDuration::from_millis(250));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_key(
                    key.code,
                    key.modifiers,
                    &mut state,
                    cfg,
                    service,
                    &mut refresh_job,
                );
            }
        }

        if state.screen == Screen::Dashboard && last_tick.elapsed() >= tick_rate {
            queue_refresh(&mut state, cfg, service, &mut refresh_job);
            last_tick = Instant::now();
        }
    }

    Ok(())
}

fn handle_key(
    code: KeyCode,
    modifiers: KeyModifiers,
    state: &mut AppState,
    cfg: &AppConfig,
    service: &MeterService,
    refresh_job: &mut Option<RefreshJob>,
) {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        state.screen = Screen::ConfirmQuit;
        state.confirm_selected = 0;
        return;
    }

    match state.screen {
        Screen::Dashboard => match code {
            KeyCode::Char('q') => {
                state.screen = Screen::ConfirmQuit;
                state.confirm_selected = 0;
            }
            KeyCode::Char('h') => state.set_period(Period::Hourly, today()),
            KeyCode::Char('d') => state.set_period(Period::Daily, today()),
            KeyCode::Char('m') => state.set_period(Period::Monthly, today()),
            KeyCode::Left => {
                state.older(today());
            }
            KeyCode::Right => {
                state.newer(today());
            }
            KeyCode::Tab => state.move_selection(true, today()),
            KeyCode::BackTab => state.move_selection(false, today()),
            KeyCode::Char('r') => queue_refresh(state, cfg, service, refresh_job),
            KeyCode::Char('z') => {
                state.compact_mode = !state.compact_mode;
                state.status = if state.compact_mode {
                    "compact mode enabled".into()
                } else {
                    "compact mode disabled".into()
                };
            }
            _ => {}
        },
        Screen::ConfirmQuit => match code {
            KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                state.confirm_selected = 1 - state.confirm_selected.min(1);
            }
            KeyCode::Char('y') => state.running = false,
            KeyCode::Enter => {
                if state.confirm_selected == 1 {
                    state.running = false;
                } else {
                    state.screen = Screen::Dashboard;
                }
            }
            KeyCode::Esc | KeyCode::Char('n') => state.screen = Screen::Dashboard,
            _ => {}
        },
        Screen::ErrorDialog => {
            if matches!(code, KeyCode::Esc | KeyCode::Enter) {
                state.screen = Screen::Dashboard;
            }
        }
    }
}

fn queue_refresh(
    state: &mut AppState,
    cfg: &AppConfig,
    service: &MeterService,
    refresh_job: &mut Option<RefreshJob>,
) {
    if refresh_job.is_some() {
        state.status = "refresh already running".into();
        return;
    }
    let source = match configured_source(&cfg.source) {
        Ok(source) => source,
        Err(e) => {
            state.status = format!("showing stored history ({e})");
            return;
        }
    };
    state.status = format!("refreshing from {}...", source.name());
    let svc = service.clone();
    let handle = tokio::spawn(async move { svc.fetch_attributes(source.as_ref()).await });
    *refresh_job = Some(RefreshJob {
        started_at: Instant::now(),
        handle,
    });
}

async fn process_refresh_job(
    state: &mut AppState,
    cfg: &AppConfig,
    storage: &mut Storage,
    service: &MeterService,
    refresh_job: &mut Option<RefreshJob>,
) {
    let Some(job) = refresh_job.take() else {
        return;
    };
    let elapsed = job.started_at.elapsed();
    let outcome = match job.handle.await {
        Ok(Ok(attrs)) => service.ingest(cfg, &attrs, storage),
        Ok(Err(e)) => Err(e),
        Err(join_err) => Err(AppError::Source(format!("refresh task failed: {join_err}"))),
    };

    match outcome {
        Ok(report) => {
            info!(elapsed_ms = elapsed.as_millis() as u64, "dashboard refreshed");
            state.last_refresh = report.fetched_at.format("%H:%M:%S").to_string();
            state.status = format!(
                "refreshed: {} new records, {} stored",
                report.fetched.len(),
                report.history.len()
            );
            state.replace_history(report.history, today());
        }
        Err(e) => {
            warn!(error = %e, "dashboard refresh failed");
            show_error(state, format!("Refresh failed: {e}"));
        }
    }
}

fn show_error(state: &mut AppState, message: String) {
    state.error_message = message;
    state.screen = Screen::ErrorDialog;
    state.status = "error".into();
}

fn render(f: &mut ratatui::Frame, formatter: &LabelFormatter, state: &AppState) {
    let size = f.area();
    let compact = state.compact_mode || size.width < 100;

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(detail_height(formatter, state, compact)),
            Constraint::Length(2),
        ])
        .split(size);

    let outcome = state.current_window(today());

    let range = match &outcome {
        WindowOutcome::Ready(window) => formatter.format_window_range(window),
        WindowOutcome::NotReady => "waiting for hourly data".into(),
    };
    let header = Paragraph::new(format!(
        " energy-meter  ·  {}  ·  {}  ·  {}  ·  {} ",
        state.period.as_label(),
        range,
        state.status,
        state.last_refresh
    ))
    .block(Block::default().borders(Borders::ALL).title(" Usage "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(header, root[0]);

    match &outcome {
        WindowOutcome::Ready(window) if window.has_reported() => {
            render_chart(f, root[1], formatter, state, window);
            render_detail(f, root[2], formatter, state, window, compact);
        }
        WindowOutcome::Ready(_) => render_placeholder(f, root[1], "No usage data for this period."),
        WindowOutcome::NotReady => render_placeholder(f, root[1], "Hourly data is still loading."),
    }

    let footer = Paragraph::new(footer_line(&outcome, compact))
        .style(Style::default().fg(COLOR_MUTED))
        .alignment(Alignment::Center);
    f.render_widget(footer, root[3]);

    match state.screen {
        Screen::ConfirmQuit => render_confirm(f, state),
        Screen::ErrorDialog => render_error(f, state),
        Screen::Dashboard => {}
    }
}

fn render_chart(
    f: &mut ratatui::Frame,
    area: Rect,
    formatter: &LabelFormatter,
    state: &AppState,
    window: &Window,
) {
    let selected = state.selection.selected_index();
    let bars: Vec<Bar> = window
        .records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let color = if Some(index) == selected {
                COLOR_ACCENT
            } else if record.is_placeholder() {
                COLOR_MUTED
            } else {
                COLOR_INFO
            };
            Bar::default()
                .value((record.consumption.max(0.0) * 100.0).round() as u64)
                .text_value(String::new())
                .label(Line::from(formatter.format_axis_label(record, window.period)))
                .style(Style::default().fg(color))
        })
        .collect();

    let slots = window.len().max(1) as u16;
    let inner = area.width.saturating_sub(2);
    let bar_width = (inner / slots).saturating_sub(1).max(1);

    let chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} kWh ", capitalized(window.period.as_label()))),
        )
        .data(BarGroup::default().bars(&bars))
        .bar_width(bar_width)
        .bar_gap(1);
    f.render_widget(chart, area);
}

fn render_detail(
    f: &mut ratatui::Frame,
    area: Rect,
    formatter: &LabelFormatter,
    state: &AppState,
    window: &Window,
    compact: bool,
) {
    let mut lines = Vec::new();
    match state.selection.current(window) {
        Some(record) => {
            lines.push(Line::from(Span::styled(
                formatter.format_headline(record, window.period),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )));
            lines.push(Line::from(formatter.format_selected_detail(record, window.period)));
            let mut values = format!(
                "{}  ·  {}",
                format_consumption(record.consumption),
                format_cost(record.cost)
            );
            if window.period == Period::Daily {
                if let Some(temp) = record.temperature {
                    values.push_str(&format!("  ·  {temp:.1}°C"));
                }
            }
            if record.free_power {
                values.push_str("  ·  free power");
            }
            lines.push(Line::from(Span::styled(
                values,
                Style::default().fg(COLOR_INFO).add_modifier(Modifier::BOLD),
            )));
        }
        None => lines.push(Line::from("Nothing selected.")),
    }

    if !compact {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!(
                "Window total: {}  ·  {}",
                format_consumption(window.total_consumption()),
                format_cost(window.total_cost())
            ),
            Style::default().fg(COLOR_MUTED),
        )));
    }
    if window.period == Period::Monthly {
        if let Some(summary) = &state.history.billing {
            lines.extend(
                billing_lines(formatter, summary)
                    .into_iter()
                    .map(|line| Line::from(Span::styled(line, Style::default().fg(COLOR_INFO)))),
            );
        }
    }

    let detail = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Selected "))
        .wrap(Wrap { trim: true });
    f.render_widget(detail, area);
}

/// Current billing cycle lines for the monthly detail panel.
fn billing_lines(formatter: &LabelFormatter, summary: &BillingSummary) -> Vec<String> {
    let mut lines = Vec::new();
    let cycle = formatter.format_billing_cycle(summary);
    if !cycle.is_empty() {
        lines.push(format!("Current cycle: {cycle}"));
    }
    if summary.usage_consumption.is_some() || summary.usage_cost.is_some() {
        lines.push(format!(
            "So far: {}  ·  {}",
            format_consumption(summary.usage_consumption.unwrap_or(0.0)),
            format_cost(summary.usage_cost.unwrap_or(0.0))
        ));
    }
    if let Some(note) = &summary.projected_bill_note {
        lines.push(note.clone());
    }
    lines
}

fn detail_height(formatter: &LabelFormatter, state: &AppState, compact: bool) -> u16 {
    let base: u16 = if compact { 5 } else { 7 };
    let billing = match (&state.history.billing, state.period) {
        (Some(summary), Period::Monthly) => billing_lines(formatter, summary).len() as u16,
        _ => 0,
    };
    base + billing
}

fn render_placeholder(f: &mut ratatui::Frame, area: Rect, message: &str) {
    let body = Paragraph::new(message.to_string())
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(COLOR_MUTED))
        .alignment(Alignment::Center);
    f.render_widget(body, area);
}

fn footer_line(outcome: &WindowOutcome, compact: bool) -> String {
    let (older, newer) = match outcome {
        WindowOutcome::Ready(window) => (window.has_previous, window.has_next),
        WindowOutcome::NotReady => (false, false),
    };
    let arrow = |enabled: bool, label: &str| {
        if enabled {
            label.to_string()
        } else {
            "-".repeat(label.chars().count())
        }
    };
    if compact {
        format!(
            "{} {} | h/d/m | Tab | r | q",
            arrow(older, "←"),
            arrow(newer, "→")
        )
    } else {
        format!(
            "{} older  {} newer  |  h/d/m period  |  Tab/Shift-Tab select  |  r refresh  |  z compact  |  q quit",
            arrow(older, "←"),
            arrow(newer, "→")
        )
    }
}

fn capitalized(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn render_confirm(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let option = |label: &str, index: usize| {
        if state.confirm_selected == index {
            Span::styled(
                format!("[ {label} ]"),
                Style::default()
                    .fg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Span::raw(format!("  {label}  "))
        }
    };
    let body = Paragraph::new(vec![
        Line::from("Quit energy-meter?"),
        Line::from(""),
        Line::from(vec![option("Cancel", 0), Span::raw("   "), option("Quit", 1)]),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title(" Confirm "));
    f.render_widget(body, area);
}

fn render_error(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let body = Paragraph::new(state.error_message.clone())
        .wrap(Wrap { trim: true })
        .style(Style::default().fg(Color::Red))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Error (Esc to close) "),
        );
    f.render_widget(body, area);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_greys_out_unavailable_directions() {
        assert!(footer_line(&WindowOutcome::NotReady, true).starts_with("- -"));
    }

    #[test]
    fn capitalized_uppercases_first_letter() {
        assert_eq!(capitalized("daily"), "Daily");
        assert_eq!(capitalized(""), "");
    }

    #[test]
    fn confirm_quit_toggles_and_exits() {
        let mut state = AppState::default();
        let cfg = AppConfig::default();
        let service = MeterService::new().expect("service");
        let mut job = None;
        let mut press = |code, state: &mut AppState| {
            handle_key(code, KeyModifiers::NONE, state, &cfg, &service, &mut job)
        };

        press(KeyCode::Char('q'), &mut state);
        assert_eq!(state.screen, Screen::ConfirmQuit);
        press(KeyCode::Right, &mut state);
        assert_eq!(state.confirm_selected, 1);
        press(KeyCode::Enter, &mut state);
        assert!(!state.running);
    }

    #[test]
    fn refresh_without_source_keeps_stored_history() {
        let mut state = AppState::default();
        let cfg = AppConfig::default();
        let service = MeterService::new().expect("service");
        let mut job = None;

        handle_key(
            KeyCode::Char('r'),
            KeyModifiers::NONE,
            &mut state,
            &cfg,
            &service,
            &mut job,
        );
        assert!(job.is_none());
        assert!(state.status.starts_with("showing stored history"));
    }

    #[test]
    fn billing_lines_show_cycle_spend_and_note() {
        let summary = BillingSummary {
            usage_cost: Some(84.12),
            usage_consumption: Some(301.5),
            days_remaining: Some(17),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 7),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 6),
            projected_bill_note: Some("On track for about $180".into()),
            ..BillingSummary::default()
        };
        let formatter = LabelFormatter::new("en-NZ");
        let lines = billing_lines(&formatter, &summary);
        assert_eq!(
            lines,
            vec![
                "Current cycle: 7 Jan - 6 Feb 2025, day 14 of 31".to_string(),
                "So far: 301.50 kWh  ·  $84.12".to_string(),
                "On track for about $180".to_string(),
            ]
        );
        assert!(billing_lines(&formatter, &BillingSummary::default()).is_empty());
    }
}
