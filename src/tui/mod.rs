use crate::app::{App, ContextPopup, InputMode};
use crate::input::TextInput;
use chrono::Local;
use logsift::constants::{
    CONTEXT_POPUP_HEIGHT, HELP_POPUP_HEIGHT, HELP_POPUP_WIDTH, INPUT_FIELD_HEIGHT,
    STATUS_BAR_HEIGHT,
};
use logsift::protocol::Phase;
use logsift::view::{paint, PaintContext};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

pub fn draw(frame: &mut Frame, app: &mut App) {
    let prompt = matches!(app.input_mode, InputMode::SearchEdit | InputMode::ExportEdit);
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(INPUT_FIELD_HEIGHT),
            Constraint::Length(INPUT_FIELD_HEIGHT),
            Constraint::Min(1),
            Constraint::Length(if prompt { INPUT_FIELD_HEIGHT } else { 0 }),
            Constraint::Length(STATUS_BAR_HEIGHT),
        ])
        .split(frame.area());

    draw_text_input(
        frame,
        &app.include,
        chunks[0],
        " Include (f) ",
        app.input_mode == InputMode::IncludeEdit,
    );
    draw_text_input(
        frame,
        &app.exclude,
        chunks[1],
        " Exclude (x) ",
        app.input_mode == InputMode::ExcludeEdit,
    );
    draw_log_view(frame, app, chunks[2]);
    match app.input_mode {
        InputMode::SearchEdit => draw_text_input(frame, &app.search, chunks[3], " Find ", true),
        InputMode::ExportEdit => {
            draw_text_input(frame, &app.export_path, chunks[3], " Export to ", true)
        }
        _ => {}
    }
    draw_status_bar(frame, app, chunks[4]);

    if matches!(app.input_mode, InputMode::IncludeEdit | InputMode::ExcludeEdit) {
        draw_help_popup(frame);
    }
    if let Some(context) = &app.context {
        draw_context_popup(frame, context);
    }
}

fn draw_text_input(frame: &mut Frame, input: &TextInput, area: Rect, label: &str, is_active: bool) {
    let style = if is_active {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };

    let title = match &input.error {
        Some(err) => format!(" {} (Error: {}) ", label.trim(), err),
        None => label.to_string(),
    };
    let border_style = if input.has_error() {
        Style::default().fg(Color::Red)
    } else {
        style
    };

    let widget = Paragraph::new(input.text.as_str())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title)
                .border_style(border_style),
        )
        .style(style);
    frame.render_widget(widget, area);

    if is_active {
        frame.set_cursor_position((area.x + input.cursor as u16 + 1, area.y + 1));
    }
}

fn draw_log_view(frame: &mut Frame, app: &mut App, area: Rect) {
    let title = format!(
        " {} [{}/{}] {}{}{} ",
        app.source_label,
        app.viewport.total(),
        app.total_lines,
        if app.viewport.follow_tail() { "[FOLLOW]" } else { "" },
        if app.case_sensitive { "[Aa]" } else { "" },
        if app.rule().is_some() { "[FILTERED]" } else { "" },
    );
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    app.viewport.set_height(inner.height as usize);
    let text_area = {
        let ctx = PaintContext {
            viewport: &app.viewport,
            highlighter: &app.highlighter,
            bookmarks: &app.bookmarks,
            selection: app.selection.selection(),
            show_time: app.show_time,
            now: Local::now(),
        };
        paint(frame.buffer_mut(), inner, &ctx)
    };
    app.sync_selection(text_area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = if let Some((phase, percent)) = app.progress {
        let phase = match phase {
            Phase::Indexing => "Indexing",
            Phase::Filtering => "Filtering",
        };
        format!("{}... {}%", phase, percent)
    } else if let Some(msg) = &app.status_message {
        msg.clone()
    } else {
        format!(
            "q:Quit f:Include x:Exclude /:Find n/N:Next/Prev m:Mark ]/[:Jump c:Context y:Copy s:Export i:Case({}) t:Time({}){}",
            if app.case_sensitive { "ON" } else { "OFF" },
            if app.show_time { "ON" } else { "OFF" },
            if app.feed_closed { " | stream ended" } else { "" },
        )
    };

    let paragraph =
        Paragraph::new(status).style(Style::default().fg(Color::White).bg(Color::Blue));
    frame.render_widget(paragraph, area);
}

fn draw_help_popup(frame: &mut Frame) {
    let area = frame.area();
    let popup_area = Rect {
        x: area.width.saturating_sub(HELP_POPUP_WIDTH).max(area.x),
        y: area.y,
        width: HELP_POPUP_WIDTH.min(area.width),
        height: HELP_POPUP_HEIGHT.min(area.height),
    };

    let help_text = vec![
        Line::from("Enter: Apply | Esc: Cancel | ^W: Del word"),
        Line::from("Include: a && b || c"),
        Line::from("Exclude: x || y"),
        Line::from("Quote special chars: \"a||b\""),
    ];

    let help = Paragraph::new(help_text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .border_style(Style::default().fg(Color::Green)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Clear, popup_area);
    frame.render_widget(help, popup_area);
}

fn draw_context_popup(frame: &mut Frame, context: &ContextPopup) {
    let area = frame.area();
    let width = (area.width as u32 * 4 / 5) as u16;
    let height = CONTEXT_POPUP_HEIGHT.min(area.height);
    let popup_area = Rect {
        x: area.x + area.width.saturating_sub(width) / 2,
        y: area.y + area.height.saturating_sub(height) / 2,
        width,
        height,
    };

    let lines: Vec<Line> = context
        .lines
        .iter()
        .map(|line| {
            let center = line.line_num == context.original + 1;
            let text_style = if center {
                Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED)
            } else {
                Style::default()
            };
            Line::from(vec![
                Span::styled(
                    format!("{:>8} │ ", line.line_num),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(line.content.clone(), text_style),
            ])
        })
        .collect();

    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" Context of line {} (Esc) ", context.original + 1))
                .border_style(Style::default().fg(Color::Magenta)),
        )
        .style(Style::default().bg(Color::Black));

    frame.render_widget(Clear, popup_area);
    frame.render_widget(popup, popup_area);
}
