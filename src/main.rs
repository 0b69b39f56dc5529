use std::{
    env,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
    },
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::Style,
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Clear, List, ListItem, ListState, Paragraph, Scrollbar,
        ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use tdoc::{Document, markdown, parse};
use tracing::{debug, info, warn};
use unicode_width::UnicodeWidthStr;

use proofmark::{
    analyzer::{AnalysisWorker, HttpAnalyzer},
    annotate::{AnnotationId, AnnotationSession, Completion},
    config::Config,
    document::{HostDocument, LeafGeometry, ScreenRect, TreeDocument},
    popup::PopupState,
    render::{RenderOptions, RenderResult, ScreenLayout, render_document},
    theme::Theme,
};

const STATUS_TIMEOUT: Duration = Duration::from_secs(4);
const LOG_DIR_ENV: &str = "PROOFMARK_LOG_DIR";
/// Without input for this long the editor counts as idle.
const IDLE_AFTER: Duration = Duration::from_millis(300);
const SIDEBAR_WIDTH: u16 = 32;
const POPUP_MAX_WIDTH: u16 = 48;

fn main() -> Result<()> {
    run()
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    // The terminal belongs to the UI, so logs only go to a file.
    let Some(log_dir) = env::var(LOG_DIR_ENV).ok().map(PathBuf::from) else {
        return;
    };
    if fs::create_dir_all(&log_dir).is_err() {
        return;
    }
    let log_path = log_dir.join(format!("proofmark.{}.log", std::process::id()));
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_path) else {
        return;
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("proofmark=debug,info"));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_target(true);
    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();
    info!(path = ?log_path, "tracing initialized");
}

struct Args {
    config: Option<PathBuf>,
    file: Option<PathBuf>,
}

fn parse_args() -> Result<Args> {
    let mut args = env::args().skip(1);
    let mut parsed = Args {
        config: None,
        file: None,
    };
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    bail!("--config needs a path");
                };
                parsed.config = Some(PathBuf::from(path));
            }
            "-h" | "--help" => {
                eprintln!("Usage: proofmark [--config <config.toml>] [file.ftml|file.md|file.txt]");
                std::process::exit(0);
            }
            _ if parsed.file.is_none() => parsed.file = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument {arg}"),
        }
    }
    Ok(parsed)
}

fn run() -> Result<()> {
    setup_tracing();
    let args = parse_args()?;

    let mut config = Config::load(args.config.as_deref()).context("failed to load configuration")?;
    config.apply_env_overrides(|key| env::var(key).ok());

    let (tree, initial_status) = match &args.file {
        Some(path) => load_document(path)?,
        None => (TreeDocument::new(Document::new()), None),
    };
    let analyzer = HttpAnalyzer::new(&config.analyzer).context("failed to create analyzer client")?;
    info!(endpoint = analyzer.endpoint(), "using analyzer");
    let worker = AnalysisWorker::new(Arc::new(analyzer));
    let mut app = App::new(&config, tree, worker, args.file, initial_status);

    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)
        .context("failed to initialize terminal")?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().ok();

    let res = run_app(&mut terminal, &mut app).context("application error");

    disable_raw_mode().ok();
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )
    .ok();
    terminal.show_cursor().ok();

    res
}

fn load_document(path: &Path) -> Result<(TreeDocument, Option<String>)> {
    if !path.exists() {
        return Ok((TreeDocument::new(Document::new()), Some("New document".to_string())));
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    let parsed = match extension.as_deref() {
        Some("ftml") | Some("html") => parse(io::Cursor::new(content))
            .map_err(|err| -> Box<dyn std::error::Error + Send + Sync> { Box::new(err) }),
        Some("md") | Some("markdown") => markdown::parse(io::Cursor::new(content)),
        _ => return Ok((TreeDocument::from_plain_text(&content), None)),
    };
    match parsed {
        Ok(doc) => Ok((TreeDocument::new(doc), None)),
        Err(err) => {
            let message = format!("Parse error: {err}. Starting with empty document.");
            Ok((TreeDocument::new(Document::new()), Some(message)))
        }
    }
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();

    while !app.should_quit() {
        terminal
            .draw(|frame| app.draw(frame))
            .context("failed to draw frame")?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout).context("event poll failed")? {
            let evt = event::read().context("failed to read event")?;
            app.handle_event(evt);
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick(Instant::now());
            last_tick = Instant::now();
        }
    }

    Ok(())
}

/// Rows of the drawn popup that choose a replacement.
#[derive(Default)]
struct PopupHitbox {
    rect: Option<Rect>,
    choices: Vec<(u16, usize)>,
}

struct App {
    tree: TreeDocument,
    session: AnnotationSession,
    worker: AnalysisWorker,
    popup: PopupState,
    popup_hitbox: PopupHitbox,
    theme: Theme,
    file_path: Option<PathBuf>,
    /// Plain-text char offset.
    caret: usize,
    follow_caret: bool,
    scroll_top: usize,
    last_view_height: usize,
    layout: ScreenLayout,
    hovered: Option<AnnotationId>,
    pointer_in_popup: bool,
    last_input: Instant,
    status_message: Option<(String, Instant)>,
    should_quit: bool,
}

impl App {
    fn new(
        config: &Config,
        tree: TreeDocument,
        worker: AnalysisWorker,
        file_path: Option<PathBuf>,
        status: Option<String>,
    ) -> Self {
        let now = Instant::now();
        let mut session = AnnotationSession::new(config);
        session.request_now(&tree, now);
        Self {
            tree,
            session,
            worker,
            popup: PopupState::new(&config.popup),
            popup_hitbox: PopupHitbox::default(),
            theme: Theme::default(),
            file_path,
            caret: 0,
            follow_caret: true,
            scroll_top: 0,
            last_view_height: 1,
            layout: ScreenLayout::default(),
            hovered: None,
            pointer_in_popup: false,
            last_input: now,
            status_message: status.map(|message| (message, now)),
            should_quit: false,
        }
    }

    fn should_quit(&self) -> bool {
        self.should_quit
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some((message.into(), Instant::now()));
    }

    fn prune_status_message(&mut self) {
        if let Some((_, instant)) = &self.status_message {
            if instant.elapsed() > STATUS_TIMEOUT {
                self.status_message = None;
            }
        }
    }

    fn text_len(&self) -> usize {
        self.tree.plain_text().chars().count()
    }

    fn on_tick(&mut self, now: Instant) {
        let idle = now.duration_since(self.last_input) >= IDLE_AFTER;
        if let Some(request) = self.session.poll(&mut self.tree, now, idle) {
            debug!(
                generation = %request.generation,
                language = %request.language,
                "dispatching analysis"
            );
            self.worker.submit(request);
        }
        for outcome in self.worker.drain() {
            match self.session.complete(&mut self.tree, outcome) {
                Completion::Applied(report) => {
                    debug!(?report, "decorated document");
                }
                Completion::Failed => self.set_status("Analyzer unavailable"),
                Completion::Superseded | Completion::Outdated => {}
            }
        }
        let session = &self.session;
        self.popup.retain(|id| session.annotation(id).is_some());
        if self.hovered.is_some_and(|id| session.annotation(id).is_none()) {
            self.hovered = None;
        }
        self.popup.tick(now);
        self.prune_status_message();
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(KeyEvent {
                code,
                modifiers,
                kind: KeyEventKind::Press,
                ..
            }) => {
                self.last_input = Instant::now();
                self.handle_key(code, modifiers);
            }
            Event::Mouse(mouse) => self.handle_mouse(mouse),
            _ => {}
        }
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        let now = Instant::now();
        if self.popup.is_pinned() {
            if let KeyCode::Char(ch @ '1'..='9') = code {
                let index = ch as usize - '1' as usize;
                self.choose_replacement(index);
                return;
            }
        }
        match (code, modifiers) {
            (KeyCode::Char('q'), m) | (KeyCode::Char('c'), m)
                if m.contains(KeyModifiers::CONTROL) =>
            {
                self.should_quit = true;
            }
            (KeyCode::Char('r'), m) if m.contains(KeyModifiers::CONTROL) => {
                self.session.request_now(&self.tree, now);
                self.set_status("Checking");
            }
            (KeyCode::Esc, _) => self.popup.dismiss(),
            (KeyCode::Tab, _) => self.pin_next_annotation(),
            (KeyCode::Left, _) => self.move_caret(self.caret.saturating_sub(1)),
            (KeyCode::Right, _) => self.move_caret(self.caret + 1),
            (KeyCode::Home, _) => self.move_caret(0),
            (KeyCode::End, _) => self.move_caret(self.text_len()),
            (KeyCode::Up, _) => {
                self.follow_caret = false;
                self.scroll_top = self.scroll_top.saturating_sub(1);
            }
            (KeyCode::Down, _) => {
                self.follow_caret = false;
                self.scroll_top += 1;
            }
            (KeyCode::PageUp, _) => {
                self.follow_caret = false;
                self.scroll_top = self.scroll_top.saturating_sub(self.last_view_height.max(1));
            }
            (KeyCode::PageDown, _) => {
                self.follow_caret = false;
                self.scroll_top += self.last_view_height.max(1);
            }
            (KeyCode::Backspace, _) => {
                if self.caret > 0 && self.edit(|tree, caret| tree.remove_char(caret - 1)) {
                    self.caret -= 1;
                }
            }
            (KeyCode::Delete, _) => {
                self.edit(|tree, caret| tree.remove_char(caret));
            }
            (KeyCode::Enter, _) => self.insert_char('\n'),
            (KeyCode::Char(ch), m)
                if !m.contains(KeyModifiers::CONTROL) && !m.contains(KeyModifiers::ALT) =>
            {
                self.insert_char(ch);
            }
            _ => {}
        }
    }

    fn insert_char(&mut self, ch: char) {
        if self.edit(|tree, caret| tree.insert_char(caret, ch)) {
            self.caret += 1;
        }
    }

    /// Run a text edit at the caret and restart the analysis debounce.
    fn edit<F>(&mut self, apply: F) -> bool
    where
        F: FnOnce(&mut TreeDocument, usize) -> Result<(), proofmark::document::HostError>,
    {
        match apply(&mut self.tree, self.caret) {
            Ok(()) => {
                self.follow_caret = true;
                self.session.note_edit(&self.tree, Instant::now());
                true
            }
            Err(err) => {
                debug!(%err, caret = self.caret, "edit rejected");
                false
            }
        }
    }

    fn move_caret(&mut self, caret: usize) {
        self.caret = caret.min(self.text_len());
        self.follow_caret = true;
    }

    fn pin_next_annotation(&mut self) {
        let annotations = self.session.annotations();
        if annotations.is_empty() {
            self.set_status("No findings");
            return;
        }
        let next = match self.popup.active() {
            Some(active) => annotations
                .iter()
                .position(|annotation| annotation.id == active)
                .map_or(0, |index| (index + 1) % annotations.len()),
            None => annotations
                .iter()
                .position(|annotation| annotation.span.offset >= self.caret)
                .unwrap_or(0),
        };
        let annotation = &annotations[next];
        let id = annotation.id;
        let offset = annotation.span.offset;
        let anchor = annotation
            .carrying_leaf_ids
            .first()
            .and_then(|leaf| self.layout.screen_rect_for_leaf(*leaf))
            .unwrap_or_default();
        self.popup.click(Some((id, anchor)));
        self.move_caret(offset);
    }

    fn choose_replacement(&mut self, index: usize) {
        let Some(id) = self.popup.active() else {
            return;
        };
        let Some(replacement) = self
            .session
            .annotation(id)
            .and_then(|annotation| annotation.replacements.get(index))
            .cloned()
        else {
            return;
        };
        self.popup.dismiss();
        self.hovered = None;
        match self
            .session
            .apply_suggestion(&mut self.tree, id, &replacement, Instant::now())
        {
            Ok(_) => {
                self.caret = self.caret.min(self.text_len());
                self.set_status(format!("Replaced with \"{replacement}\""));
            }
            Err(err) => {
                warn!(%err, "suggestion not applied");
                self.set_status(err.to_string());
            }
        }
    }

    fn annotation_under(&self, column: u16, row: u16) -> Option<(AnnotationId, ScreenRect)> {
        let leaf = self.layout.leaf_at(column, row)?;
        let annotation = self.session.lookup(leaf)?;
        let rect = self.layout.screen_rect_for_leaf(leaf)?;
        Some((annotation.id, rect))
    }

    fn in_popup(&self, column: u16, row: u16) -> bool {
        self.popup_hitbox
            .rect
            .is_some_and(|rect| rect.contains(Position::new(column, row)))
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let now = Instant::now();
        let (column, row) = (mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Moved => {
                if self.in_popup(column, row) {
                    if !self.pointer_in_popup {
                        self.pointer_in_popup = true;
                        self.popup.popup_enter();
                    }
                    return;
                }
                if self.pointer_in_popup {
                    self.pointer_in_popup = false;
                    self.popup.popup_leave(now);
                }
                match self.annotation_under(column, row) {
                    Some((id, rect)) => {
                        if self.hovered != Some(id) {
                            self.hovered = Some(id);
                            self.popup.pointer_enter(id, rect);
                        }
                    }
                    None => {
                        if self.hovered.take().is_some() {
                            self.popup.pointer_leave(now);
                        }
                    }
                }
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if self.in_popup(column, row) {
                    let choice = self
                        .popup_hitbox
                        .choices
                        .iter()
                        .find(|(choice_row, _)| *choice_row == row)
                        .map(|(_, index)| *index);
                    if let Some(index) = choice {
                        self.choose_replacement(index);
                    }
                    return;
                }
                self.popup.click(self.annotation_under(column, row));
            }
            MouseEventKind::ScrollUp => {
                self.follow_caret = false;
                self.scroll_top = self.scroll_top.saturating_sub(3);
            }
            MouseEventKind::ScrollDown => {
                self.follow_caret = false;
                self.scroll_top += 3;
            }
            _ => {}
        }
    }

    fn adjust_scroll(&mut self, render: &RenderResult, viewport_height: usize) {
        let viewport = viewport_height.max(1);
        let max_scroll = render.total_lines.saturating_sub(viewport);
        if self.follow_caret {
            if let Some(caret) = &render.caret {
                if caret.line < self.scroll_top {
                    self.scroll_top = caret.line;
                } else if caret.line >= self.scroll_top + viewport {
                    self.scroll_top = caret.line + 1 - viewport;
                }
            }
        }
        self.scroll_top = self.scroll_top.min(max_scroll);
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.area();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(2)])
            .split(area);
        let horizontal = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20), Constraint::Length(SIDEBAR_WIDTH)])
            .split(vertical[0]);
        let text_area = horizontal[0];

        self.draw_document(frame, text_area);
        self.draw_sidebar(frame, horizontal[1]);
        self.draw_status(frame, vertical[1]);
        self.draw_popup(frame, text_area);
    }

    fn active_leaves(&self) -> Vec<proofmark::document::LeafId> {
        self.popup
            .active()
            .and_then(|id| self.session.annotation(id))
            .map(|annotation| annotation.carrying_leaf_ids.clone())
            .unwrap_or_default()
    }

    fn draw_document(&mut self, frame: &mut Frame, area: Rect) {
        // Leave the last column to the scrollbar.
        let wrap_width = area.width.saturating_sub(1).max(1) as usize;
        let active_leaves = self.active_leaves();
        let options = RenderOptions {
            theme: &self.theme,
            caret: Some(self.caret),
            active_leaves: &active_leaves,
        };
        let render = render_document(&self.tree, wrap_width, &options);
        let viewport = area.height as usize;
        self.last_view_height = viewport;
        self.adjust_scroll(&render, viewport);
        self.layout = ScreenLayout::new(to_screen_rect(area), self.scroll_top, &render);

        if let Some(caret) = render.caret {
            let visible = caret.line >= self.scroll_top && caret.line < self.scroll_top + viewport;
            if visible && self.popup.active().is_none() {
                frame.set_cursor_position(Position::new(
                    area.x + caret.column,
                    area.y + (caret.line - self.scroll_top) as u16,
                ));
            }
        }

        let total_lines = render.total_lines;
        let paragraph = Paragraph::new(Text::from(render.lines))
            .style(Style::default().bg(self.theme.background))
            .scroll((self.scroll_top as u16, 0));
        frame.render_widget(paragraph, area);

        if total_lines > viewport {
            let mut state = ScrollbarState::new(total_lines.saturating_sub(viewport))
                .position(self.scroll_top);
            frame.render_stateful_widget(
                Scrollbar::new(ScrollbarOrientation::VerticalRight),
                area,
                &mut state,
            );
        }
    }

    fn draw_sidebar(&self, frame: &mut Frame, area: Rect) {
        let annotations = self.session.annotations();
        let block = Block::default()
            .borders(Borders::LEFT)
            .title(format!(" Findings ({}) ", annotations.len()))
            .style(self.theme.sidebar_style());
        if annotations.is_empty() {
            let empty = Paragraph::new(Line::from(Span::styled(
                "Nothing to report",
                self.theme.muted_style(),
            )))
            .block(block);
            frame.render_widget(empty, area);
            return;
        }

        let items: Vec<ListItem> = annotations
            .iter()
            .map(|annotation| {
                ListItem::new(vec![
                    Line::from(Span::styled(
                        annotation.original_text.clone(),
                        self.theme.marker_style(false),
                    )),
                    Line::from(annotation.message.clone()),
                ])
            })
            .collect();
        let mut state = ListState::default();
        state.select(self.popup.active().and_then(|active| {
            annotations
                .iter()
                .position(|annotation| annotation.id == active)
        }));
        let list = List::new(items)
            .block(block)
            .highlight_style(self.theme.sidebar_active_style());
        frame.render_stateful_widget(list, area, &mut state);
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let name = self
            .file_path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "[scratch]".to_string());
        let scheduler = self.session.scheduler();
        let activity = if scheduler.in_flight_count() > 0 {
            "checking"
        } else if scheduler.is_pending() {
            "pending"
        } else {
            "idle"
        };
        let mut spans = vec![
            Span::styled(name, self.theme.filename_style()),
            Span::raw(format!("  {activity}")),
        ];
        if let Some((message, _)) = &self.status_message {
            spans.push(Span::raw(format!("  {message}")));
        }
        spans.push(Span::raw("  ^R check  Tab next  ^Q quit"));
        let status = Paragraph::new(Line::from(spans))
            .block(Block::default().borders(Borders::TOP))
            .style(self.theme.status_bar_style());
        frame.render_widget(status, area);
    }

    fn draw_popup(&mut self, frame: &mut Frame, bounds: Rect) {
        self.popup_hitbox = PopupHitbox::default();
        let Some(annotation) = self
            .popup
            .active()
            .and_then(|id| self.session.annotation(id))
        else {
            return;
        };
        if let Some(anchor) = annotation
            .carrying_leaf_ids
            .first()
            .and_then(|leaf| self.layout.screen_rect_for_leaf(*leaf))
        {
            self.popup.reanchor(anchor);
        }

        let inner_width = POPUP_MAX_WIDTH.saturating_sub(2).max(1);
        let message_width = UnicodeWidthStr::width(annotation.message.as_str()) as u16;
        let message_lines = message_width.div_ceil(inner_width).max(1);
        let widest_choice = annotation
            .replacements
            .iter()
            .map(|replacement| UnicodeWidthStr::width(replacement.as_str()) as u16 + 4)
            .max()
            .unwrap_or(0);
        let width = message_width.max(widest_choice).min(inner_width) + 2;
        let choice_lines = annotation.replacements.len() as u16;
        let separator = u16::from(choice_lines > 0);
        let height = message_lines + separator + choice_lines + 2;

        let Some(rect) = self.popup.position(width, height, to_screen_rect(bounds)) else {
            return;
        };
        let rect = Rect::new(rect.x, rect.y, rect.width, rect.height);

        let mut lines = vec![Line::from(annotation.message.clone())];
        if choice_lines > 0 {
            lines.push(Line::from(""));
        }
        let first_choice_row = rect.y + 1 + message_lines + separator;
        let mut choices = Vec::new();
        for (index, replacement) in annotation.replacements.iter().enumerate() {
            lines.push(Line::from(vec![
                Span::styled(format!("{} ", index + 1), self.theme.popup_key_style()),
                Span::raw(replacement.clone()),
            ]));
            choices.push((first_choice_row + index as u16, index));
        }
        let title = if self.popup.is_pinned() {
            " 1-9 apply, Esc close "
        } else {
            ""
        };
        let popup = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(title))
            .style(self.theme.popup_style())
            .wrap(Wrap { trim: false });
        frame.render_widget(Clear, rect);
        frame.render_widget(popup, rect);
        self.popup_hitbox = PopupHitbox {
            rect: Some(rect),
            choices,
        };
    }
}

fn to_screen_rect(rect: Rect) -> ScreenRect {
    ScreenRect::new(rect.x, rect.y, rect.width, rect.height)
}
