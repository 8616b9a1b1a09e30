mod editor;
mod theme;

use crate::cli::Cli;
use crate::console::OutputConsole;
use crate::model::{PlaygroundConfig, PlaygroundEvent, PreviewResult};
use crate::session::{self, debounce::Debouncer, UiCommand};
use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use editor::EditorBuffer;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Terminal,
};
use std::{io, time::Duration, time::Instant};
use theme::Theme;
use tokio::sync::mpsc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// One-character diagnostic marker, zero-based coordinates.
struct Marker {
    line: usize,
    column: usize,
    message: String,
}

struct UiState {
    editor: EditorBuffer,
    console: OutputConsole,
    ast_view: String,
    ast_scroll: u16,
    /// 0 = output console, 1 = AST viewer.
    right_tab: usize,
    running: bool,
    ops: Option<u64>,
    marker: Option<Marker>,
    info: String,
    theme_index: usize,
    example_index: usize,
    preview_seq: u64,
}

impl UiState {
    fn new(config: &PlaygroundConfig, initial_script: String) -> Self {
        Self {
            editor: EditorBuffer::from_text(&initial_script),
            console: OutputConsole::new(config.max_output_chars),
            ast_view: String::new(),
            ast_scroll: 0,
            right_tab: 0,
            running: false,
            ops: None,
            marker: None,
            info: "Ctrl-R run · Ctrl-X stop · Ctrl-Q quit".into(),
            theme_index: theme::find_index(&config.theme).unwrap_or(0),
            example_index: 0,
            preview_seq: 0,
        }
    }

    fn theme(&self) -> &'static Theme {
        &theme::THEMES[self.theme_index]
    }

    fn cycle_theme(&mut self) {
        self.theme_index = (self.theme_index + 1) % theme::THEMES.len();
        self.info = format!("Theme: {}", self.theme().name);
    }

    fn cycle_example(&mut self) -> String {
        self.example_index = (self.example_index + 1) % crate::example_scripts::EXAMPLES.len();
        let example = &crate::example_scripts::EXAMPLES[self.example_index];
        self.editor.set_text(example.source);
        self.marker = None;
        self.info = format!("Example: {}", example.name);
        self.editor.text()
    }
}

pub async fn run(args: Cli) -> Result<()> {
    // Resolve the initial buffer before the terminal goes raw; the embed
    // handshake reads stdin line-wise and must happen first.
    let initial_script = crate::cli::resolve_script(&args)?;
    let config = crate::cli::build_config(&args);

    // Unbounded channels avoid backpressure and task switching in the hot path.
    let (event_tx, event_rx) = mpsc::unbounded_channel::<PlaygroundEvent>();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<UiCommand>();

    // TUI runs in a dedicated thread to keep all blocking I/O out of the
    // Tokio runtime.
    let ui_config = config.clone();
    let ui_handle =
        std::thread::spawn(move || run_threaded(ui_config, initial_script, event_rx, cmd_tx));

    let res = session::run_controller(&config, event_tx, cmd_rx).await;

    let join_res = tokio::task::spawn_blocking(move || ui_handle.join()).await;
    if let Ok(joined) = join_res {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(anyhow::anyhow!("TUI thread panicked")),
        }
    }

    res
}

/// Run the TUI loop on a dedicated thread.
fn run_threaded(
    config: PlaygroundConfig,
    initial_script: String,
    mut event_rx: UnboundedReceiver<PlaygroundEvent>,
    cmd_tx: UnboundedSender<UiCommand>,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).ok();

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;
    terminal.clear().ok();

    // UiState is owned by the UI thread only; no cross-thread mutation.
    let mut state = UiState::new(&config, initial_script);
    let mut debouncer: Debouncer<String> = Debouncer::new(config.debounce_delay);
    if config.compile_on_open {
        debouncer.trigger(state.editor.text(), Instant::now());
    }

    // One draw per frame at most; appends between frames are coalesced.
    let tick_rate = Duration::from_millis(16);
    let mut last_tick = Instant::now();
    let mut needs_redraw = true;

    let res = loop {
        // Drain events without blocking to keep the UI responsive.
        while let Ok(ev) = event_rx.try_recv() {
            apply_event(&mut state, ev);
            needs_redraw = true;
        }

        if let Some(script) = debouncer.fire(Instant::now()) {
            state.preview_seq += 1;
            let _ = cmd_tx.send(UiCommand::Preview {
                seq: state.preview_seq,
                script,
            });
        }

        if needs_redraw && last_tick.elapsed() >= tick_rate {
            let _ = state.console.take_dirty();
            terminal.draw(|f| draw(f.area(), f, &mut state)).ok();
            last_tick = Instant::now();
            needs_redraw = false;
        }

        // Poll input with a short timeout to avoid blocking the render loop.
        if event::poll(Duration::from_millis(10)).unwrap_or(false) {
            if let Ok(Event::Key(k)) = event::read() {
                if k.kind != KeyEventKind::Press {
                    continue;
                }
                needs_redraw = true;
                match (k.modifiers, k.code) {
                    (KeyModifiers::CONTROL, KeyCode::Char('q')) => {
                        let _ = cmd_tx.send(UiCommand::Quit);
                        break Ok(());
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('r')) => {
                        let _ = cmd_tx.send(UiCommand::Run {
                            script: state.editor.text(),
                        });
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('x')) => {
                        if state.running {
                            state.info = "Stopping…".into();
                            let _ = cmd_tx.send(UiCommand::Cancel);
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('e')) => {
                        // Switching examples supersedes any pending preview.
                        debouncer.cancel();
                        let script = state.cycle_example();
                        debouncer.trigger(script, Instant::now());
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('t')) => state.cycle_theme(),
                    (KeyModifiers::CONTROL, KeyCode::Char('o')) => {
                        state.right_tab = (state.right_tab + 1) % 2;
                    }
                    (KeyModifiers::CONTROL, KeyCode::Char('y')) => {
                        match copy_to_clipboard(state.console.text()) {
                            Ok(()) => state.info = "Output copied to clipboard".into(),
                            Err(e) => state.info = format!("Clipboard copy failed: {e:#}"),
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::Up) => {
                        if state.right_tab == 0 {
                            state.console.scroll_up(1);
                        } else {
                            state.ast_scroll = state.ast_scroll.saturating_sub(1);
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::Down) => {
                        if state.right_tab == 0 {
                            state.console.scroll_down(1);
                        } else {
                            state.ast_scroll = state.ast_scroll.saturating_add(1);
                        }
                    }
                    (KeyModifiers::CONTROL, KeyCode::End) => {
                        if state.right_tab == 0 {
                            state.console.scroll_to_bottom();
                        }
                    }
                    (mods, code) => {
                        if state.editor.handle_key(mods, code) {
                            debouncer.trigger(state.editor.text(), Instant::now());
                        }
                    }
                }
            }
        }
    };

    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();

    res
}

fn apply_event(state: &mut UiState, ev: PlaygroundEvent) {
    match ev {
        PlaygroundEvent::RunStarted => {
            state.running = true;
            state.ops = None;
            state.console.clear();
            state.info = "Running…".into();
        }
        PlaygroundEvent::RunRejected { reason } => {
            state.info = format!("Run blocked: {reason}");
        }
        PlaygroundEvent::Output { line } => {
            state.console.append(&line);
        }
        PlaygroundEvent::OpsUpdate { ops } => {
            state.ops = Some(ops);
        }
        PlaygroundEvent::RunFinished { outcome } => {
            state.running = false;
            state.info = outcome.to_message();
        }
        PlaygroundEvent::Preview { seq, result } => {
            if seq != state.preview_seq {
                tracing::debug!(seq, latest = state.preview_seq, "dropping superseded preview");
                return;
            }
            match result {
                PreviewResult::Clean { ast } => {
                    state.marker = None;
                    state.ast_view = ast;
                    if !state.running {
                        state.info = "Compiles cleanly".into();
                    }
                }
                PreviewResult::Diagnostic(diag) => match diag.marker_span() {
                    Some(((line, column), _)) => {
                        state.info = format!(
                            "Parse error at line {}, column {}",
                            line + 1,
                            column + 1
                        );
                        state.marker = Some(Marker {
                            line: line as usize,
                            column: column as usize,
                            message: diag.message,
                        });
                    }
                    None => {
                        // No position to mark: swallowed, log only.
                        tracing::debug!("compile error without position: {}", diag.message);
                        state.marker = None;
                    }
                },
            }
        }
    }
}

fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("open clipboard")?;
    clipboard
        .set_text(text.to_string())
        .context("write clipboard")?;
    Ok(())
}

fn draw(area: Rect, f: &mut ratatui::Frame, state: &mut UiState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);
    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(rows[0]);

    draw_editor(panes[0], f, state);
    draw_right_pane(panes[1], f, state);
    draw_status(rows[1], f, state);
}

fn draw_editor(area: Rect, f: &mut ratatui::Frame, state: &mut UiState) {
    let theme = state.theme();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.dim))
        .title(Span::styled(" Script ", Style::default().fg(theme.accent)));
    let inner = block.inner(area);
    f.render_widget(block, area);

    state.editor.set_viewport_rows(inner.height as usize);
    let scroll_top = state.editor.scroll_top();
    let gutter_width = state.editor.lines().len().to_string().len().max(2);

    let mut rendered: Vec<Line> = Vec::with_capacity(inner.height as usize);
    let visible = state
        .editor
        .lines()
        .iter()
        .enumerate()
        .skip(scroll_top)
        .take(inner.height as usize);
    for (idx, line) in visible {
        let number = Span::styled(
            format!("{:>gutter_width$} ", idx + 1),
            Style::default().fg(theme.gutter),
        );
        let mut spans = vec![number];
        match &state.marker {
            Some(marker) if marker.line == idx => {
                spans.extend(marked_line_spans(line, marker.column, theme));
            }
            _ => spans.push(Span::raw(line.clone())),
        }
        rendered.push(Line::from(spans));
    }
    f.render_widget(Paragraph::new(rendered), inner);

    let (cursor_line, cursor_col) = state.editor.cursor();
    if cursor_line >= scroll_top && cursor_line < scroll_top + inner.height as usize {
        let x = inner.x + (gutter_width + 1 + cursor_col).min(inner.width.saturating_sub(1) as usize) as u16;
        let y = inner.y + (cursor_line - scroll_top) as u16;
        f.set_cursor_position(Position::new(x, y));
    }
}

/// Split a line into plain/marked/plain spans, highlighting exactly one
/// character at the diagnostic column (or a trailing space when the column
/// sits at the end of the line).
fn marked_line_spans(line: &str, column: usize, theme: &Theme) -> Vec<Span<'static>> {
    let chars: Vec<char> = line.chars().collect();
    if column >= chars.len() {
        return vec![
            Span::raw(line.to_string()),
            Span::styled(" ", theme.marker_style()),
        ];
    }
    let before: String = chars[..column].iter().collect();
    let marked: String = chars[column..=column].iter().collect();
    let after: String = chars[column + 1..].iter().collect();
    vec![
        Span::raw(before),
        Span::styled(marked, theme.marker_style()),
        Span::raw(after),
    ]
}

fn draw_right_pane(area: Rect, f: &mut ratatui::Frame, state: &mut UiState) {
    let theme = state.theme();
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(1), Constraint::Min(1)])
        .split(area);

    let tabs = Tabs::new(vec!["Output", "AST"])
        .select(state.right_tab)
        .style(Style::default().fg(theme.dim))
        .highlight_style(
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        );
    f.render_widget(tabs, sections[0]);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.dim));
    let inner = block.inner(sections[1]);

    if state.right_tab == 0 {
        let title = match state.ops {
            Some(ops) => format!(" Output · ops: {ops} "),
            None => " Output ".to_string(),
        };
        let block = block.title(Span::styled(title, Style::default().fg(theme.accent)));
        f.render_widget(block, sections[1]);
        state.console.set_viewport_rows(inner.height as usize);
        let paragraph = Paragraph::new(state.console.text().to_string())
            .scroll((state.console.scroll_top() as u16, 0));
        f.render_widget(paragraph, inner);
    } else {
        let block = block.title(Span::styled(" AST ", Style::default().fg(theme.accent)));
        f.render_widget(block, sections[1]);
        let paragraph = Paragraph::new(state.ast_view.clone()).scroll((state.ast_scroll, 0));
        f.render_widget(paragraph, inner);
    }
}

fn draw_status(area: Rect, f: &mut ratatui::Frame, state: &UiState) {
    let theme = state.theme();
    let mut spans = Vec::new();
    if state.running {
        spans.push(Span::styled(
            " RUNNING ",
            Style::default()
                .fg(theme.running)
                .add_modifier(Modifier::BOLD),
        ));
        if let Some(ops) = state.ops {
            spans.push(Span::styled(
                format!("{ops} ops "),
                Style::default().fg(theme.dim),
            ));
        }
    }
    // Marker tooltip wins over transient info text.
    let status = match &state.marker {
        Some(marker) => marker.message.clone(),
        None => state.info.clone(),
    };
    spans.push(Span::raw(status));
    spans.push(Span::styled(
        format!("  [{}]", theme.name),
        Style::default().fg(theme.dim),
    ));
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}
