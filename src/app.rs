use crate::input::{Edit, TextInput};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use logsift::constants::CONTEXT_LINES;
use logsift::feed::FeedEvent;
use logsift::lines::{IndexedLine, LineData};
use logsift::protocol::{Command, Event, Phase, Response};
use logsift::search::Direction;
use logsift::view::selection::{copy_to_clipboard, extract};
use logsift::view::{FetchRequest, Highlighter, Selection, SelectionLayer, Viewport};
use logsift::{Config, EngineHandle, FilterRule};
use ratatui::layout::Rect;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    IncludeEdit,
    ExcludeEdit,
    SearchEdit,
    ExportEdit,
}

pub enum DocumentSource {
    File(PathBuf),
    Stream,
}

/// What a request id is waiting for.
enum Pending {
    Window(FetchRequest),
    Context { original: usize },
    Copy(Selection),
    Export(PathBuf),
    Find,
    Bookmark,
}

pub struct ContextPopup {
    /// 0-based original line the popup is centered on.
    pub original: usize,
    pub lines: Vec<LineData>,
}

pub struct App {
    engine: EngineHandle,
    responses: Receiver<Response>,
    feed: Option<Receiver<FeedEvent>>,
    pending: HashMap<u64, Pending>,
    pub viewport: Viewport,
    pub selection: SelectionLayer,
    pub highlighter: Highlighter,
    pub include: TextInput,
    pub exclude: TextInput,
    pub search: TextInput,
    pub export_path: TextInput,
    pub input_mode: InputMode,
    pub case_sensitive: bool,
    /// Last rule sent to the engine. It is sent even without terms so the
    /// engine's search follows the case toggle.
    rule: FilterRule,
    pub bookmarks: Vec<usize>,
    pub total_lines: usize,
    pub progress: Option<(Phase, u8)>,
    pub status_message: Option<String>,
    pub context: Option<ContextPopup>,
    pub show_time: bool,
    /// Width of the painted text column, set on every draw.
    pub text_width: usize,
    pub is_stream: bool,
    pub source_label: String,
    pub feed_closed: bool,
}

impl App {
    pub fn new(
        config: &Config,
        source: DocumentSource,
        feed: Option<Receiver<FeedEvent>>,
        include: &str,
        exclude: &str,
        case_sensitive: bool,
    ) -> Result<Self> {
        let (engine, responses) = EngineHandle::spawn(config.engine.clone())?;
        let is_stream = matches!(source, DocumentSource::Stream);
        let source_label = match &source {
            DocumentSource::File(path) => path.display().to_string(),
            DocumentSource::Stream => "stream".to_string(),
        };
        let mut app = Self {
            engine,
            responses,
            feed,
            pending: HashMap::new(),
            viewport: Viewport::new(config.view.clone()),
            selection: SelectionLayer::new(Duration::from_millis(config.view.overlay_debounce_ms)),
            highlighter: Highlighter::default(),
            include: TextInput::new(include),
            exclude: TextInput::new(exclude),
            search: TextInput::default(),
            export_path: TextInput::new("logsift-export.log"),
            input_mode: InputMode::Normal,
            case_sensitive,
            rule: FilterRule::default(),
            bookmarks: Vec::new(),
            total_lines: 0,
            progress: None,
            status_message: None,
            context: None,
            show_time: is_stream,
            text_width: 0,
            is_stream,
            source_label,
            feed_closed: false,
        };
        app.viewport.set_follow_tail(is_stream);
        match source {
            DocumentSource::File(path) => app.engine.notify(Command::OpenFile(path)),
            DocumentSource::Stream => app.engine.notify(Command::OpenStream),
        }
        if !app.include.is_empty() || !app.exclude.is_empty() {
            app.apply_filter();
        }
        Ok(app)
    }

    /// Drains engine responses and feed chunks, then asks for whatever rows
    /// the viewport is missing.
    pub fn tick(&mut self) {
        while let Ok(response) = self.responses.try_recv() {
            self.handle_response(response);
        }
        self.poll_feed();
        for request in self.viewport.plan_fetches() {
            let id = self.engine.request(Command::GetLines {
                start: request.start,
                count: request.count,
            });
            self.pending.insert(id, Pending::Window(request));
        }
    }

    fn poll_feed(&mut self) {
        let Some(feed) = &self.feed else {
            return;
        };
        let mut finished = false;
        while let Ok(event) = feed.try_recv() {
            match event {
                FeedEvent::Chunk(chunk) => self.engine.notify(Command::AppendChunk(chunk)),
                FeedEvent::Error(e) => self.status_message = Some(format!("Source error: {}", e)),
                FeedEvent::Connected(peer) => {
                    self.status_message = Some(format!("Connected: {}", peer))
                }
                FeedEvent::Disconnected(peer) => {
                    self.status_message = Some(format!("Disconnected: {}", peer))
                }
                FeedEvent::Closed => finished = true,
            }
        }
        if finished {
            self.engine.notify(Command::FinishStream);
            self.feed = None;
            self.feed_closed = true;
        }
    }

    fn handle_response(&mut self, Response { id, event }: Response) {
        let pending = id.and_then(|id| self.pending.remove(&id));
        match event {
            Event::Status { phase, percent } => self.progress = Some((phase, percent)),
            Event::IndexComplete { total_lines } => {
                self.total_lines = total_lines;
                self.progress = None;
            }
            Event::FilterComplete {
                match_count,
                total_lines,
                bookmarks,
            } => {
                self.total_lines = total_lines;
                self.bookmarks = bookmarks;
                self.progress = None;
                self.selection.clear();
                self.viewport.reset(match_count);
            }
            Event::StreamAppended {
                match_count,
                total_lines,
            } => {
                self.total_lines = total_lines;
                self.viewport.grow(match_count);
            }
            Event::Lines(lines) => match pending {
                Some(Pending::Window(request)) => {
                    if !self.viewport.on_lines(request, lines) {
                        debug!(start = request.start, "dropped stale window");
                    }
                }
                Some(Pending::Context { original }) => {
                    self.context = Some(ContextPopup { original, lines })
                }
                _ => {}
            },
            Event::IndexedLines(lines) => {
                if let Some(Pending::Copy(selection)) = pending {
                    self.copy_lines(&selection, lines);
                }
            }
            Event::FindResult(found) => match found {
                Some(hit) => self.viewport.jump_to(hit.visual_index),
                None => self.status_message = Some("Not found".to_string()),
            },
            Event::BookmarksUpdated(bookmarks) => {
                if matches!(pending, Some(Pending::Bookmark)) {
                    self.status_message = Some(format!("{} bookmark(s)", bookmarks.len()));
                }
                self.bookmarks = bookmarks;
            }
            Event::FullText(buffer) => {
                if let Some(Pending::Export(path)) = pending {
                    self.status_message = Some(match std::fs::write(&path, &buffer) {
                        Ok(()) => format!("Exported {} bytes to {}", buffer.len(), path.display()),
                        Err(e) => format!("Export failed: {}", e),
                    });
                }
            }
            Event::Error(message) => {
                if let Some(Pending::Window(request)) = pending {
                    self.viewport.on_failure(request);
                }
                warn!(%message, "engine error");
                self.progress = None;
                self.status_message = Some(format!("Error: {}", message));
            }
        }
    }

    fn copy_lines(&mut self, selection: &Selection, lines: Vec<IndexedLine>) {
        let rows: Vec<(usize, String)> = lines
            .into_iter()
            .map(|l| {
                let text = logsift::view::cache::decode_for_display(&l.line.content);
                (l.visual_index, text)
            })
            .collect();
        let text = extract(selection, &rows);
        self.status_message = Some(match copy_to_clipboard(&text) {
            Ok(()) => format!("Copied {} line(s)", rows.len()),
            Err(e) => format!("Copy failed: {}", e),
        });
    }

    pub fn apply_filter(&mut self) {
        if let Err(e) = FilterRule::parse(&self.include.text, "") {
            self.include.error = Some(e.to_string());
            return;
        }
        let rule = match FilterRule::parse(&self.include.text, &self.exclude.text) {
            Ok(rule) => rule.with_case_sensitive(self.case_sensitive),
            Err(e) => {
                self.exclude.error = Some(e.to_string());
                return;
            }
        };
        self.highlighter = Highlighter::from_rule(Some(&rule));
        self.refresh_search_highlight();
        self.rule = rule.clone();
        self.engine.notify(Command::ApplyFilter(Some(rule)));
    }

    fn refresh_search_highlight(&mut self) {
        let keyword = (!self.search.is_empty()).then_some(self.search.text.as_str());
        self.highlighter.set_search(keyword, self.case_sensitive);
    }

    fn find(&mut self, start: Option<usize>, direction: Direction) {
        if self.search.is_empty() {
            return;
        }
        let id = self.engine.request(Command::Find {
            keyword: self.search.text.clone(),
            start,
            direction,
        });
        self.pending.insert(id, Pending::Find);
    }

    fn toggle_bookmark(&mut self) {
        if self.viewport.total() == 0 {
            return;
        }
        let id = self
            .engine
            .request(Command::ToggleBookmark(self.viewport.cursor()));
        self.pending.insert(id, Pending::Bookmark);
    }

    fn jump_bookmark(&mut self, direction: Direction) {
        let cursor = self.viewport.cursor();
        let target = match direction {
            Direction::Forward => self.bookmarks.iter().find(|&&v| v > cursor),
            Direction::Backward => self.bookmarks.iter().rev().find(|&&v| v < cursor),
        };
        match target {
            Some(&visual) => self.viewport.jump_to(visual),
            None => self.status_message = Some("No more bookmarks".to_string()),
        }
    }

    fn open_context(&mut self) {
        let Some(line) = self.viewport.line(self.viewport.cursor()) else {
            return;
        };
        let original = line.line_num - 1;
        let start = original.saturating_sub(CONTEXT_LINES);
        let id = self.engine.request(Command::GetRawLines {
            start,
            count: original - start + CONTEXT_LINES + 1,
        });
        self.pending.insert(id, Pending::Context { original });
    }

    fn copy_selection(&mut self) {
        let Some(selection) = self.selection.selection() else {
            return;
        };
        let id = self
            .engine
            .request(Command::GetLinesByIndices(selection.rows().collect()));
        self.pending.insert(id, Pending::Copy(selection));
    }

    fn export(&mut self) {
        let path = PathBuf::from(self.export_path.text.trim());
        let id = self.engine.request(Command::GetFullText);
        self.pending.insert(id, Pending::Export(path));
    }

    /// Returns `false` when the app should quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return false;
        }
        if self.input_mode != InputMode::Normal {
            self.handle_edit_key(key);
            return true;
        }
        self.status_message = None;
        if self.context.is_some() {
            if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') | KeyCode::Char('c')) {
                self.context = None;
            }
            return true;
        }

        match key.code {
            KeyCode::Char('q') => return false,
            KeyCode::Char('f') => self.input_mode = InputMode::IncludeEdit,
            KeyCode::Char('x') => self.input_mode = InputMode::ExcludeEdit,
            KeyCode::Char('/') => self.input_mode = InputMode::SearchEdit,
            KeyCode::Char('s') => self.input_mode = InputMode::ExportEdit,
            KeyCode::Char('i') => {
                self.case_sensitive = !self.case_sensitive;
                self.apply_filter();
            }
            KeyCode::Char('n') => self.find(Some(self.viewport.cursor()), Direction::Forward),
            KeyCode::Char('N') => self.find(Some(self.viewport.cursor()), Direction::Backward),
            KeyCode::Char('m') | KeyCode::Char(' ') => self.toggle_bookmark(),
            KeyCode::Char(']') => self.jump_bookmark(Direction::Forward),
            KeyCode::Char('[') => self.jump_bookmark(Direction::Backward),
            KeyCode::Char('c') => self.open_context(),
            KeyCode::Char('y') => self.copy_selection(),
            KeyCode::Char('t') => self.show_time = !self.show_time,
            KeyCode::Char('F') => {
                let follow = !self.viewport.follow_tail();
                self.viewport.set_follow_tail(follow);
            }
            KeyCode::Esc => self.selection.clear(),
            KeyCode::Up | KeyCode::Char('k') => self.viewport.move_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.viewport.move_cursor(1),
            KeyCode::PageUp => self.viewport.page(-1),
            KeyCode::PageDown => self.viewport.page(1),
            KeyCode::Home | KeyCode::Char('g') => self.viewport.to_start(),
            KeyCode::End | KeyCode::Char('G') => self.viewport.set_follow_tail(true),
            KeyCode::Left | KeyCode::Char('h') => self.viewport.scroll_horizontal(-8, self.text_width),
            KeyCode::Right | KeyCode::Char('l') => self.viewport.scroll_horizontal(8, self.text_width),
            _ => {}
        }
        true
    }

    fn handle_edit_key(&mut self, key: KeyEvent) {
        let field = match self.input_mode {
            InputMode::IncludeEdit => &mut self.include,
            InputMode::ExcludeEdit => &mut self.exclude,
            InputMode::SearchEdit => &mut self.search,
            InputMode::ExportEdit => &mut self.export_path,
            InputMode::Normal => return,
        };
        match field.handle_key(key) {
            Edit::Submit => self.submit_edit(),
            Edit::Cancel => self.input_mode = InputMode::Normal,
            Edit::Changed | Edit::Ignored => {}
        }
    }

    fn submit_edit(&mut self) {
        match self.input_mode {
            InputMode::IncludeEdit | InputMode::ExcludeEdit => {
                self.apply_filter();
                if self.include.has_error() || self.exclude.has_error() {
                    return;
                }
            }
            InputMode::SearchEdit => {
                self.refresh_search_highlight();
                self.find(self.viewport.cursor().checked_sub(1), Direction::Forward);
            }
            InputMode::ExportEdit => {
                if self.export_path.is_empty() {
                    return;
                }
                self.export();
            }
            InputMode::Normal => {}
        }
        self.input_mode = InputMode::Normal;
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.selection.press(mouse.column, mouse.row);
                if let Some(point) = self.selection.hit(mouse.column, mouse.row) {
                    self.viewport.set_cursor(point.visual);
                }
            }
            MouseEventKind::Drag(MouseButton::Left) => self.selection.drag(mouse.column, mouse.row),
            MouseEventKind::Up(MouseButton::Left) => {
                self.selection.release();
                if self.selection.selection().is_some_and(|s| s.anchor != s.head) {
                    self.copy_selection();
                }
            }
            MouseEventKind::ScrollUp => self.viewport.move_cursor(-3),
            MouseEventKind::ScrollDown => self.viewport.move_cursor(3),
            _ => {}
        }
    }

    /// Keeps the selection layer in step with what was painted in `text_area`.
    pub fn sync_selection(&mut self, text_area: Rect) {
        self.text_width = text_area.width as usize;
        self.selection.sync(text_area, &self.viewport, Instant::now());
    }

    /// The active rule, if it filters anything.
    pub fn rule(&self) -> Option<&FilterRule> {
        Some(&self.rule).filter(|rule| !rule.is_unfiltered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logsift::ViewConfig;
    use pretty_assertions::assert_eq;

    fn app() -> App {
        let config = Config {
            view: ViewConfig {
                prefetch_above: 0,
                prefetch_below: 10,
                fetch_batch: 10,
                ..ViewConfig::default()
            },
            ..Config::default()
        };
        let mut app = App::new(&config, DocumentSource::Stream, None, "", "", false).unwrap();
        app.viewport.set_follow_tail(false);
        app.viewport.set_height(10);
        app.handle_response(filtered(30));
        app
    }

    fn filtered(match_count: usize) -> Response {
        Response {
            id: None,
            event: Event::FilterComplete {
                match_count,
                total_lines: match_count,
                bookmarks: Vec::new(),
            },
        }
    }

    fn lines(request: FetchRequest) -> Vec<LineData> {
        (request.start..request.start + request.count)
            .map(|i| LineData {
                line_num: i + 1,
                content: format!("line {}", i + 1),
                received_at: None,
            })
            .collect()
    }

    /// Plans the viewport's fetches and registers them under ids from 100 up.
    fn plan(app: &mut App) -> Vec<(u64, FetchRequest)> {
        let planned: Vec<(u64, FetchRequest)> = app
            .viewport
            .plan_fetches()
            .into_iter()
            .zip(100..)
            .map(|(request, id)| (id, request))
            .collect();
        for (id, request) in &planned {
            app.pending.insert(*id, Pending::Window(*request));
        }
        planned
    }

    #[test]
    fn windows_arriving_out_of_order_are_both_stored() {
        let mut app = app();
        let planned = plan(&mut app);
        assert_eq!(planned.len(), 2);
        for (id, request) in planned.iter().rev() {
            app.handle_response(Response {
                id: Some(*id),
                event: Event::Lines(lines(*request)),
            });
        }
        assert_eq!(app.viewport.line(0).unwrap().content, "line 1");
        assert_eq!(app.viewport.line(15).unwrap().content, "line 16");
        assert!(app.pending.is_empty());
        assert!(app.viewport.plan_fetches().is_empty());
    }

    #[test]
    fn windows_for_a_replaced_projection_are_dropped() {
        let mut app = app();
        let (id, request) = plan(&mut app)[0];
        app.handle_response(filtered(30));
        app.handle_response(Response {
            id: Some(id),
            event: Event::Lines(lines(request)),
        });
        assert!(app.viewport.line(0).is_none());
        assert!(!app.pending.contains_key(&id));
        assert_eq!(app.viewport.plan_fetches()[0].generation, request.generation + 1);
    }

    #[test]
    fn failed_window_is_planned_again() {
        let mut app = app();
        let (id, request) = plan(&mut app)[0];
        assert!(app.viewport.plan_fetches().is_empty());
        app.handle_response(Response {
            id: Some(id),
            event: Event::Error("read failed".to_string()),
        });
        assert_eq!(app.status_message.as_deref(), Some("Error: read failed"));
        assert!(app.viewport.plan_fetches().contains(&request));
    }

    #[test]
    fn context_lines_open_the_popup_instead_of_the_cache() {
        let mut app = app();
        app.pending.insert(7, Pending::Context { original: 4 });
        let request = FetchRequest {
            generation: 0,
            start: 2,
            count: 5,
        };
        app.handle_response(Response {
            id: Some(7),
            event: Event::Lines(lines(request)),
        });
        let popup = app.context.as_ref().unwrap();
        assert_eq!(popup.original, 4);
        assert_eq!(popup.lines.len(), 5);
        assert!(app.viewport.line(2).is_none());
    }

    #[test]
    fn case_toggle_reaches_the_engine_without_filter_terms() {
        let mut app = app();
        assert!(app.handle_key(KeyEvent::new(KeyCode::Char('i'), KeyModifiers::NONE)));
        assert!(app.case_sensitive);
        assert!(app.rule.highlight_case_sensitive);
        assert!(app.rule().is_none());
    }
}
