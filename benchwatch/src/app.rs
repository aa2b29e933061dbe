//! App state and main loop: input handling, stream control, draining frames and drawing.

use std::{collections::HashMap, io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::aggregator::{RollingAggregator, SubscriptionHandle};
use crate::metric::Metric;
use crate::sources::SourceConfig;
use crate::ui::{cards::draw_cards, chart::draw_chart, header::draw_header};

const TICK: Duration = Duration::from_millis(100);

pub struct App {
    sources: Vec<SourceConfig>,
    aggregator: RollingAggregator,
    handles: HashMap<String, SubscriptionHandle>,
    metric: Metric,
    streaming: bool,
    should_quit: bool,
}

impl App {
    pub fn new(sources: Vec<SourceConfig>, metric: Metric) -> Self {
        let mut aggregator = RollingAggregator::new();
        for s in &sources {
            aggregator.register(&s.id);
        }
        Self {
            sources,
            aggregator,
            handles: HashMap::new(),
            metric,
            streaming: false,
            should_quit: false,
        }
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn aggregator(&self) -> &RollingAggregator {
        &self.aggregator
    }

    pub fn aggregator_mut(&mut self) -> &mut RollingAggregator {
        &mut self.aggregator
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Subscribe every enabled source. Must be called within a tokio runtime.
    pub fn start_streaming(&mut self) {
        self.streaming = true;
        let ids: Vec<usize> = (0..self.sources.len())
            .filter(|i| self.sources[*i].enabled)
            .collect();
        for i in ids {
            self.open(i);
        }
        info!(sources = self.handles.len(), "streaming started");
    }

    /// Close every stream; accumulated history stays.
    pub fn stop_streaming(&mut self) {
        self.streaming = false;
        for (_, h) in self.handles.drain() {
            self.aggregator.unsubscribe(&h);
        }
        info!("streaming stopped");
    }

    pub fn toggle_streaming(&mut self) {
        if self.streaming {
            self.stop_streaming();
        } else {
            self.start_streaming();
        }
    }

    /// Flip a source on or off by index; while streaming its connection
    /// follows.
    pub fn toggle_source(&mut self, idx: usize) {
        let Some(src) = self.sources.get_mut(idx) else {
            return;
        };
        src.enabled = !src.enabled;
        let (id, enabled) = (src.id.clone(), src.enabled);
        if !self.streaming {
            return;
        }
        if enabled {
            self.open(idx);
        } else if let Some(h) = self.handles.remove(&id) {
            self.aggregator.unsubscribe(&h);
        }
    }

    pub fn reset_history(&mut self) {
        self.aggregator.reset_all();
    }

    pub fn handle_key(&mut self, k: KeyEvent) {
        if k.kind == KeyEventKind::Release {
            return;
        }
        match k.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('s') | KeyCode::Char(' ') => self.toggle_streaming(),
            KeyCode::Char('r') => self.reset_history(),
            KeyCode::Right | KeyCode::Tab => self.metric = self.metric.next(),
            KeyCode::Left | KeyCode::BackTab => self.metric = self.metric.prev(),
            KeyCode::Char(c @ '1'..='9') => {
                let idx = c as usize - '1' as usize;
                self.toggle_source(idx);
            }
            _ => {}
        }
    }

    /// Ingest every frame the streams have delivered so far.
    pub fn pump(&mut self) -> usize {
        self.aggregator.pump()
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self.event_loop(&mut terminal).await;

        // Teardown
        self.stop_streaming();
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    self.handle_key(k);
                }
            }
            if self.should_quit {
                break;
            }

            self.pump();
            terminal.draw(|f| self.draw(f))?;
            sleep(TICK).await;
        }
        Ok(())
    }

    pub fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2), // header
                Constraint::Length(3), // cards
                Constraint::Min(8),    // chart
            ])
            .split(f.area());

        let series = self.aggregator.select(self.metric);
        let newest = series
            .values()
            .filter_map(|p| p.last())
            .map(|p| p.timestamp)
            .max();

        draw_header(f, rows[0], self.streaming, self.metric, newest);
        draw_cards(f, rows[1], &self.sources, &self.aggregator, self.metric);
        draw_chart(f, rows[2], &self.sources, &series, self.metric);
    }

    fn open(&mut self, idx: usize) {
        let src = &self.sources[idx];
        match self.aggregator.subscribe(&src.id, &src.endpoint_url) {
            Ok(h) => {
                self.handles.insert(src.id.clone(), h);
            }
            Err(e) => warn!(source = %src.id, "cannot subscribe: {e}"),
        }
    }
}
