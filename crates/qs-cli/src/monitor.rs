use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use qs_core::ScriptLangError;
use qs_host::{RuntimeNotification, ScriptRuntime};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::Line;
use ratatui::widgets::{Block, Cell, List, ListItem, Paragraph, Row, Table};
use ratatui::{Frame, Terminal};

use crate::map_tui_io;

const RECENT_LIMIT: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StatRow {
    pub(crate) script_id: String,
    pub(crate) executions: u64,
    pub(crate) average_ms: f64,
    pub(crate) max_ms: f64,
    pub(crate) last_ms: f64,
    pub(crate) errors: u64,
    pub(crate) warnings: u64,
    pub(crate) throttled: bool,
}

#[derive(Debug, Default)]
pub(crate) struct MonitorState {
    pub(crate) rows: Vec<StatRow>,
    pub(crate) recent: VecDeque<String>,
    pub(crate) status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MonitorAction {
    Quit,
    ResetStatistics,
    UnthrottleAll,
    ClearLog,
}

impl MonitorState {
    /// Rebuilds the table: every loaded script, plus any script that still
    /// has statistics after being unloaded.
    pub(crate) fn refresh(&mut self, runtime: &ScriptRuntime) {
        let throttled = runtime.throttled_scripts();
        let mut ids = runtime.scripts().ids();
        for (script_id, _) in runtime.all_statistics() {
            if !ids.contains(&script_id) {
                ids.push(script_id);
            }
        }
        ids.sort();
        self.rows = ids
            .into_iter()
            .map(|script_id| {
                let stats = runtime.statistics(&script_id).unwrap_or_default();
                StatRow {
                    executions: stats.executions,
                    average_ms: millis(stats.average()),
                    max_ms: millis(stats.max),
                    last_ms: millis(stats.last),
                    errors: stats.errors,
                    warnings: stats.warnings,
                    throttled: throttled.contains(&script_id),
                    script_id,
                }
            })
            .collect();
    }

    pub(crate) fn push_notifications(&mut self, notifications: Vec<RuntimeNotification>) {
        for notification in notifications {
            self.recent.push_front(notification.to_string());
        }
        self.recent.truncate(RECENT_LIMIT);
    }

    pub(crate) fn apply(&mut self, action: MonitorAction, runtime: &ScriptRuntime) {
        match action {
            MonitorAction::Quit => {}
            MonitorAction::ResetStatistics => {
                runtime.reset_statistics(None);
                self.status = "statistics reset".to_string();
            }
            MonitorAction::UnthrottleAll => {
                let throttled = runtime.throttled_scripts();
                for script_id in &throttled {
                    runtime.unthrottle(script_id);
                }
                self.status = format!("unthrottled {} scripts", throttled.len());
            }
            MonitorAction::ClearLog => {
                self.recent.clear();
                self.status = "log cleared".to_string();
            }
        }
    }
}

pub(crate) fn action_for_key(code: KeyCode) -> Option<MonitorAction> {
    match code {
        KeyCode::Char('q') | KeyCode::Esc => Some(MonitorAction::Quit),
        KeyCode::Char('r') => Some(MonitorAction::ResetStatistics),
        KeyCode::Char('u') => Some(MonitorAction::UnthrottleAll),
        KeyCode::Char('c') => Some(MonitorAction::ClearLog),
        _ => None,
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

struct MonitorTerminal {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl MonitorTerminal {
    fn new() -> Result<Self, ScriptLangError> {
        enable_raw_mode().map_err(map_tui_io)?;
        io::stdout()
            .execute(EnterAlternateScreen)
            .map_err(map_tui_io)?;
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend).map_err(map_tui_io)?;
        Ok(Self { terminal })
    }
}

impl Drop for MonitorTerminal {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = io::stdout().execute(LeaveAlternateScreen);
    }
}

/// Ticks the runtime and redraws until `q`.
pub(crate) fn run_monitor(runtime: &mut ScriptRuntime, tick: Duration) -> Result<i32, ScriptLangError> {
    let mut terminal = MonitorTerminal::new()?;
    let mut state = MonitorState {
        status: format!("watching {}", runtime.root().display()),
        ..MonitorState::default()
    };
    state.push_notifications(runtime.drain_notifications());

    loop {
        runtime.tick();
        state.push_notifications(runtime.drain_notifications());
        state.refresh(runtime);
        terminal
            .terminal
            .draw(|frame| render(frame, &state))
            .map_err(map_tui_io)?;

        if !event::poll(tick).map_err(map_tui_io)? {
            continue;
        }
        if let Event::Key(key) = event::read().map_err(map_tui_io)? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match action_for_key(key.code) {
                Some(MonitorAction::Quit) => break,
                Some(action) => state.apply(action, runtime),
                None => {}
            }
        }
    }
    Ok(0)
}

fn render(frame: &mut Frame<'_>, state: &MonitorState) {
    let [table_area, log_area, status_area] = Layout::vertical([
        Constraint::Min(6),
        Constraint::Length(10),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    let header = Row::new(["script", "runs", "avg ms", "max ms", "last ms", "errors", "slow"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows = state.rows.iter().map(|row| {
        let style = if row.throttled {
            Style::default().fg(Color::Red)
        } else if row.errors > 0 {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(row.script_id.clone()),
            Cell::from(row.executions.to_string()),
            Cell::from(format!("{:.2}", row.average_ms)),
            Cell::from(format!("{:.2}", row.max_ms)),
            Cell::from(format!("{:.2}", row.last_ms)),
            Cell::from(row.errors.to_string()),
            Cell::from(row.warnings.to_string()),
        ])
        .style(style)
    });
    let table = Table::new(
        rows,
        [
            Constraint::Fill(1),
            Constraint::Length(8),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(9),
            Constraint::Length(8),
            Constraint::Length(6),
        ],
    )
    .header(header)
    .block(Block::bordered().title("scripts"));
    frame.render_widget(table, table_area);

    let items = state
        .recent
        .iter()
        .map(|line| ListItem::new(line.as_str()))
        .collect::<Vec<_>>();
    frame.render_widget(
        List::new(items).block(Block::bordered().title("recent")),
        log_area,
    );

    let status = Line::from(format!(
        "{}  |  q quit  r reset stats  u unthrottle  c clear",
        state.status
    ));
    frame.render_widget(Paragraph::new(status), status_area);
}

#[cfg(test)]
mod monitor_tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use qs_core::ScriptEvent;
    use qs_host::RuntimeConfig;
    use qs_runtime::BuiltinTable;

    #[test]
    fn keys_map_to_actions() {
        assert_eq!(action_for_key(KeyCode::Char('q')), Some(MonitorAction::Quit));
        assert_eq!(action_for_key(KeyCode::Esc), Some(MonitorAction::Quit));
        assert_eq!(
            action_for_key(KeyCode::Char('r')),
            Some(MonitorAction::ResetStatistics)
        );
        assert_eq!(action_for_key(KeyCode::Char('x')), None);
    }

    #[test]
    fn refresh_lists_loaded_scripts_with_their_statistics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RuntimeConfig::default().with_scripts_dir(dir.path());
        let mut runtime = ScriptRuntime::new(config, BuiltinTable::new()).expect("runtime");
        runtime
            .load_source("idle", dir.path().join("idle.qs"), "on never { }")
            .expect("idle loads");
        runtime
            .load_source("busy", dir.path().join("busy.qs"), "on ping { missing(); }")
            .expect("busy loads");
        runtime.fire_event(ScriptEvent::new("ping"));

        let mut state = MonitorState::default();
        state.refresh(&runtime);
        let ids = state
            .rows
            .iter()
            .map(|row| row.script_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["busy", "idle"]);
        assert_eq!(state.rows[0].errors, 1);
        assert_eq!(state.rows[1].executions, 0);

        state.push_notifications(runtime.drain_notifications());
        assert_eq!(state.recent.len(), 3);
        assert!(state.recent[0].contains("ping"));

        state.apply(MonitorAction::ResetStatistics, &runtime);
        state.refresh(&runtime);
        assert_eq!(state.rows[0].errors, 0);
        state.apply(MonitorAction::ClearLog, &runtime);
        assert!(state.recent.is_empty());
    }
}
