use std::io::{stdout, Stdout};
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame, Terminal,
};

use application::snapshot::{OutputData, QueueSnapshot};
use domain::sla::SlaStatus;
use infrastructure::stdout::JobActivityKind;

/// Terminal dashboard over the supervisor's snapshot stream.
///
/// Renders the latest [`OutputData`] only; stale frames are dropped on every
/// poll so the view never lags the supervisor. Press `q` or Ctrl-C to leave
/// the dashboard; the supervisor itself keeps running headless.
pub struct Dashboard {
    snapshots: flume::Receiver<OutputData>,
    latest: Option<OutputData>,
}

impl Dashboard {
    pub fn new(snapshots: flume::Receiver<OutputData>) -> Self {
        Self {
            snapshots,
            latest: None,
        }
    }

    /// Take over the terminal until the user quits or the supervisor side of
    /// the snapshot channel closes.
    pub fn run(mut self) -> Result<()> {
        enable_raw_mode()?;
        let mut out = stdout();
        execute!(out, EnterAlternateScreen)?;
        let mut terminal = Terminal::new(CrosstermBackend::new(out))?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            let mut disconnected = false;
            loop {
                match self.snapshots.try_recv() {
                    Ok(snapshot) => self.latest = Some(snapshot),
                    Err(flume::TryRecvError::Empty) => break,
                    Err(flume::TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
            if disconnected {
                tracing::info!("snapshot stream closed; leaving dashboard");
                return Ok(());
            }

            terminal.draw(|frame| self.draw(frame))?;

            if event::poll(Duration::from_millis(250))? {
                if let Event::Key(key) = event::read()? {
                    let ctrl_c = key.code == KeyCode::Char('c')
                        && key.modifiers.contains(KeyModifiers::CONTROL);
                    if key.code == KeyCode::Char('q') || ctrl_c {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn draw(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(6),
                Constraint::Length(8),
                Constraint::Length(6),
            ])
            .split(frame.size());

        self.draw_header(frame, chunks[0]);
        self.draw_queues(frame, chunks[1]);
        self.draw_activity(frame, chunks[2]);
        self.draw_scaling_log(frame, chunks[3]);
    }

    fn draw_header(&self, frame: &mut Frame, area: Rect) {
        let line = match &self.latest {
            Some(data) => Line::from(vec![
                Span::styled("surge", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(format!(
                    "  queues: {}  workers: {}  breached: {}  as of {}",
                    data.queues.len(),
                    data.total_active_workers(),
                    data.breached_queues(),
                    data.at.format("%H:%M:%S"),
                )),
            ]),
            None => Line::from("surge: waiting for the first tick..."),
        };
        let header = Paragraph::new(line).block(Block::default().borders(Borders::ALL));
        frame.render_widget(header, area);
    }

    fn draw_queues(&self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = match &self.latest {
            Some(data) => data.queues.iter().map(queue_row).collect(),
            None => Vec::new(),
        };
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title(" queues "));
        frame.render_widget(list, area);
    }

    fn draw_activity(&self, frame: &mut Frame, area: Rect) {
        let rows = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem> = match &self.latest {
            Some(data) => data
                .activity
                .iter()
                .rev()
                .take(rows)
                .rev()
                .map(|activity| {
                    let color = match activity.kind {
                        JobActivityKind::Processing => Color::Yellow,
                        JobActivityKind::Processed => Color::Green,
                        JobActivityKind::Failed => Color::Red,
                        JobActivityKind::Output => Color::DarkGray,
                    };
                    ListItem::new(Line::from(vec![
                        Span::styled(
                            format!("{} ", activity.at.format("%H:%M:%S")),
                            Style::default().fg(Color::DarkGray),
                        ),
                        Span::raw(format!("[{}] ", activity.pid)),
                        Span::styled(activity.line.clone(), Style::default().fg(color)),
                    ]))
                })
                .collect(),
            None => Vec::new(),
        };
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title(" activity "));
        frame.render_widget(list, area);
    }

    fn draw_scaling_log(&self, frame: &mut Frame, area: Rect) {
        let rows = area.height.saturating_sub(2) as usize;
        let items: Vec<ListItem> = match &self.latest {
            Some(data) => data
                .scaling_log
                .iter()
                .rev()
                .take(rows)
                .rev()
                .map(|entry| ListItem::new(entry.clone()))
                .collect(),
            None => Vec::new(),
        };
        let list =
            List::new(items).block(Block::default().borders(Borders::ALL).title(" scaling "));
        frame.render_widget(list, area);
    }
}

fn queue_row(queue: &QueueSnapshot) -> ListItem<'static> {
    let status_style = match queue.sla_status {
        SlaStatus::Ok => Style::default().fg(Color::Green),
        SlaStatus::Warning => Style::default().fg(Color::Yellow),
        SlaStatus::Breached => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    };
    ListItem::new(Line::from(vec![
        Span::styled(
            format!("{:<24}", queue.key.to_string()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::styled(format!("{:<9}", queue.sla_status.to_string()), status_style),
        Span::raw(format!(
            "workers {:>2}/{:<2}  pending {:>5}  oldest {:>5.0}s  {:>6.1}/min  {}",
            queue.active_workers,
            queue.target_workers,
            queue.pending,
            queue.oldest_job_age_seconds,
            queue.throughput_per_minute,
            queue.strategy,
        )),
    ]))
}
