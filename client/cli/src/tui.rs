use crate::api::Backend;
use crate::auth::CredentialProvider;
use crate::events::RefreshHub;
use crate::gallery::{render_lines, spawn_load, GallerySync, GalleryState, GalleryView};
use crate::upload::{UploadCandidate, UploadState, UploadWidget};
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
        KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::Paragraph,
    Frame, Terminal,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

/// Result of one upload attempt as seen by the shell: whether the picker was
/// cleared, or why the file could not even be read.
type PendingUpload = JoinHandle<Result<bool, String>>;

struct App {
    input: String,
    widget: Arc<Mutex<UploadWidget>>,
    upload_state: watch::Receiver<UploadState>,
    gallery: watch::Receiver<GalleryState>,
    sync: GallerySync,
    pending: Option<PendingUpload>,
    drag_over: bool,
    scroll: u16,
    error_message: Option<String>,
    quit: bool,
}

impl App {
    fn new(widget: UploadWidget, sync: GallerySync) -> Self {
        let upload_state = widget.watch();
        let gallery = sync.view().watch();
        Self {
            input: String::new(),
            widget: Arc::new(Mutex::new(widget)),
            upload_state,
            gallery,
            sync,
            pending: None,
            drag_over: false,
            scroll: 0,
            error_message: None,
            quit: false,
        }
    }

    fn is_uploading(&self) -> bool {
        self.pending.is_some()
    }

    fn start_upload(&mut self, paths: Vec<PathBuf>, dropped: bool) {
        if self.is_uploading() {
            return;
        }
        let Some(path) = paths.into_iter().next() else {
            return;
        };
        self.error_message = None;
        self.drag_over = dropped;

        let widget = Arc::clone(&self.widget);
        self.pending = Some(tokio::spawn(async move {
            let mut widget = widget.lock().await;
            if dropped {
                widget.drag_enter();
            } else {
                widget.set_picker(path.to_string_lossy());
            }
            let candidate = match UploadCandidate::from_path(&path).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    widget.drag_leave();
                    widget.reset();
                    return Err(format!("could not read {}: {}", path.display(), e));
                }
            };
            if dropped {
                widget.drop_files(vec![candidate]).await;
            } else {
                widget.select(candidate).await;
            }
            Ok(widget.picker_value().is_none())
        }));
    }

    async fn finish_upload(&mut self) {
        match self.pending.take() {
            Some(handle) if handle.is_finished() => {
                self.drag_over = false;
                match handle.await {
                    Ok(Ok(true)) => self.input.clear(),
                    Ok(Ok(false)) => {}
                    Ok(Err(msg)) => self.error_message = Some(msg),
                    Err(e) => self.error_message = Some(e.to_string()),
                }
            }
            other => self.pending = other,
        }
    }

    fn reload(&self) {
        spawn_load(self.sync.view());
    }
}

pub async fn run_gallery(
    backend: Arc<dyn Backend>,
    credentials: Arc<dyn CredentialProvider>,
) -> anyhow::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let term_backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(term_backend)?;

    let hub = RefreshHub::default();
    let gallery = Arc::new(GalleryView::new(
        Arc::clone(&backend),
        Arc::clone(&credentials),
    ));
    let sync = gallery.spawn_sync(&hub);
    let widget = UploadWidget::new(backend, credentials, hub);

    let mut app = App::new(widget, sync);
    let result = run_app(&mut terminal, &mut app).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> anyhow::Result<()> {
    loop {
        if app.quit {
            return Ok(());
        }
        app.finish_upload().await;

        let upload_state = app.upload_state.borrow().clone();
        let gallery_state = app.gallery.borrow().clone();
        terminal.draw(|f| ui(f, app, &upload_state, &gallery_state))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(app, key),
                // Terminals paste the path of a file dropped onto them.
                Event::Paste(text) => {
                    let paths = parse_dropped_paths(&text);
                    app.start_upload(paths, true);
                }
                _ => {}
            }
        }
    }
}

fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Esc {
        app.quit = true;
        return;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        match key.code {
            KeyCode::Char('r') => app.reload(),
            KeyCode::Char('c') => app.quit = true,
            _ => {}
        }
        return;
    }

    match key.code {
        KeyCode::Up => app.scroll = app.scroll.saturating_sub(1),
        KeyCode::Down => app.scroll = app.scroll.saturating_add(1),
        // the picker is disabled while an upload is running
        _ if app.is_uploading() => {}
        KeyCode::Char(c) => {
            app.error_message = None;
            app.input.push(c);
        }
        KeyCode::Backspace => {
            app.input.pop();
        }
        KeyCode::Enter => {
            if app.input.trim().is_empty() {
                app.error_message = Some("image path required".to_string());
            } else {
                let path = expand_home(app.input.trim());
                app.start_upload(vec![path], false);
            }
        }
        _ => {}
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Split pasted text into paths. Handles one path per line, quoted paths,
/// backslash-escaped spaces and `file://` URIs.
fn parse_dropped_paths(text: &str) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for line in text.lines() {
        let mut current = String::new();
        let mut quote: Option<char> = None;
        let mut chars = line.trim().chars();
        while let Some(c) = chars.next() {
            match (c, quote) {
                ('\\', None) => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ('\'' | '"', None) => quote = Some(c),
                (c, Some(q)) if c == q => quote = None,
                (c, None) if c.is_whitespace() => {
                    push_path(&mut paths, &mut current);
                }
                (c, _) => current.push(c),
            }
        }
        push_path(&mut paths, &mut current);
    }
    paths
}

fn push_path(paths: &mut Vec<PathBuf>, current: &mut String) {
    if current.is_empty() {
        return;
    }
    let raw = std::mem::take(current);
    let raw = raw.strip_prefix("file://").unwrap_or(&raw);
    paths.push(expand_home(&raw.replace("%20", " ")));
}

fn ui(f: &mut Frame, app: &App, upload: &UploadState, gallery: &GalleryState) {
    let area = f.area();

    let layout = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([
            Constraint::Length(8),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(area);

    let heading = Style::default().add_modifier(Modifier::BOLD);

    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled("Upload Image", heading)),
        Line::from(""),
    ];
    if app.is_uploading() || upload.is_submitting() {
        lines.push(Line::from("  Uploading..."));
    } else {
        lines.push(Line::from(format!("> image: {}_", app.input)));
    }
    if app.drag_over {
        lines.push(Line::from("  dropped file received"));
    } else {
        lines.push(Line::from(
            "  Drag and drop an image here, or type a path and press enter",
        ));
    }
    lines.push(Line::from("  Supported formats: JPG, PNG, GIF | Maximum size: 5MB"));
    lines.push(Line::from(""));
    if let Some(err) = &app.error_message {
        lines.push(Line::from(format!("! {}", err)));
    } else if let Some(message) = upload.message() {
        let marker = if upload.is_error() { "!" } else { "*" };
        lines.push(Line::from(format!("{} {}", marker, message)));
    }
    f.render_widget(Paragraph::new(lines), layout[0]);

    let mut gallery_lines: Vec<Line> = render_lines(gallery)
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            if i == 0 {
                Line::from(Span::styled(text, heading))
            } else {
                Line::from(text)
            }
        })
        .collect();
    if matches!(gallery, GalleryState::LoadError(_)) {
        gallery_lines.push(Line::from(""));
        gallery_lines.push(Line::from("[ctrl+r] try again"));
    }
    f.render_widget(
        Paragraph::new(gallery_lines).scroll((app.scroll, 0)),
        layout[1],
    );

    f.render_widget(
        Paragraph::new("[enter] upload  [ctrl+r] reload  [up/down] scroll  [esc] quit"),
        layout[2],
    );
}
