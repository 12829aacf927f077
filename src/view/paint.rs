//! Row painting straight into the frame buffer.
//!
//! Only rows inside the viewport are touched. The background pass tints whole
//! rows (cursor, bookmarks, selection) and the text pass writes glyphs over it
//! without resetting those tints, except where a highlight span brings its own
//! background.

use super::cache::{cell_columns, cell_width, CachedLine};
use super::highlight::{apply_highlights, base_style, Highlighter};
use super::selection::Selection;
use super::viewport::Viewport;
use crate::constants::{BOOKMARK_MARK_WIDTH, LINE_NUMBER_WIDTH, TIMESTAMP_WIDTH};
use chrono::{DateTime, Local};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};

const CURSOR_BG: Color = Color::Rgb(48, 48, 48);
const BOOKMARK_BG: Color = Color::Rgb(40, 32, 72);
const SELECTION_BG: Color = Color::Rgb(38, 79, 120);
const GUTTER_FG: Color = Color::DarkGray;
const HEAT_MARK: Color = Color::Magenta;
const HEAT_THUMB: Color = Color::Rgb(70, 70, 70);

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum TimeAge {
    VeryRecent,
    Recent,
    Minutes,
    Hours,
    Days,
}

pub fn format_relative_time(timestamp: DateTime<Local>, now: DateTime<Local>) -> String {
    let total_secs = now.signed_duration_since(timestamp).num_seconds();
    if total_secs < 0 {
        return "+0s".to_string();
    }

    if total_secs < 60 {
        format!("-{}s", total_secs)
    } else if total_secs < 3600 {
        format!("-{}m", total_secs / 60)
    } else if total_secs < 86400 {
        format!("-{}h", total_secs / 3600)
    } else {
        format!("-{}d", total_secs / 86400)
    }
}

pub fn time_age(timestamp: DateTime<Local>, now: DateTime<Local>) -> TimeAge {
    let total_secs = now.signed_duration_since(timestamp).num_seconds();
    if total_secs < 15 {
        TimeAge::VeryRecent
    } else if total_secs < 60 {
        TimeAge::Recent
    } else if total_secs < 3600 {
        TimeAge::Minutes
    } else if total_secs < 86400 {
        TimeAge::Hours
    } else {
        TimeAge::Days
    }
}

fn time_style(age: TimeAge) -> Style {
    let style = match age {
        TimeAge::VeryRecent => Style::default().fg(Color::LightGreen),
        TimeAge::Recent => Style::default().fg(Color::Green),
        TimeAge::Minutes => Style::default().fg(Color::Rgb(136, 136, 136)),
        TimeAge::Hours => Style::default().fg(Color::Rgb(102, 102, 102)),
        TimeAge::Days => Style::default().fg(Color::Rgb(85, 85, 85)),
    };
    if age == TimeAge::VeryRecent {
        style.add_modifier(Modifier::BOLD)
    } else {
        style
    }
}

pub struct PaintContext<'a> {
    pub viewport: &'a Viewport,
    pub highlighter: &'a Highlighter,
    /// Visual indices of bookmarked rows, sorted.
    pub bookmarks: &'a [usize],
    pub selection: Option<Selection>,
    pub show_time: bool,
    pub now: DateTime<Local>,
}

impl PaintContext<'_> {
    fn is_bookmarked(&self, visual: usize) -> bool {
        self.bookmarks.binary_search(&visual).is_ok()
    }
}

pub fn gutter_width(show_time: bool) -> u16 {
    let time = if show_time { TIMESTAMP_WIDTH + 1 } else { 0 };
    (time + LINE_NUMBER_WIDTH + BOOKMARK_MARK_WIDTH) as u16
}

/// Splits the list area into gutter, text and heat strip columns.
pub fn split_area(area: Rect, show_time: bool) -> (Rect, Rect, Rect) {
    let gutter = gutter_width(show_time).min(area.width);
    let strip = u16::from(area.width > gutter);
    let gutter_area = Rect { width: gutter, ..area };
    let text_area = Rect {
        x: area.x + gutter,
        width: area.width - gutter - strip,
        ..area
    };
    let strip_area = Rect {
        x: area.x + area.width - strip,
        width: strip,
        ..area
    };
    (gutter_area, text_area, strip_area)
}

/// Paints the visible rows and returns the text area, which the selection
/// layer maps against.
pub fn paint(buf: &mut Buffer, area: Rect, ctx: &PaintContext) -> Rect {
    let (gutter_area, text_area, strip_area) = split_area(area, ctx.show_time);
    paint_backgrounds(buf, gutter_area, text_area, ctx);
    paint_text(buf, gutter_area, text_area, ctx);
    paint_heat_strip(buf, strip_area, ctx);
    text_area
}

fn rows<'a>(area: Rect, ctx: &'a PaintContext) -> impl Iterator<Item = (u16, usize)> + 'a {
    let window = ctx.viewport.window();
    (0..area.height)
        .map(move |row| (area.y + row, window.start + row as usize))
        .take_while(move |(_, visual)| *visual < window.end)
}

fn fill(buf: &mut Buffer, x: u16, width: u16, y: u16, bg: Color) {
    for cx in x..x + width {
        if let Some(cell) = buf.cell_mut((cx, y)) {
            cell.set_bg(bg);
        }
    }
}

fn paint_backgrounds(buf: &mut Buffer, gutter: Rect, text: Rect, ctx: &PaintContext) {
    let horizontal = ctx.viewport.horizontal();
    for (y, visual) in rows(text, ctx) {
        let tint = if visual == ctx.viewport.cursor() {
            Some(CURSOR_BG)
        } else if ctx.is_bookmarked(visual) {
            Some(BOOKMARK_BG)
        } else {
            None
        };
        if let Some(bg) = tint {
            fill(buf, gutter.x, gutter.width + text.width, y, bg);
        }

        let Some(columns) = ctx.selection.and_then(|s| s.columns_on(visual)) else {
            continue;
        };
        let from = columns.start.max(horizontal) - horizontal;
        let to = columns.end.saturating_sub(horizontal).min(text.width as usize);
        if from < to {
            fill(buf, text.x + from as u16, (to - from) as u16, y, SELECTION_BG);
        }
    }
}

fn paint_text(buf: &mut Buffer, gutter: Rect, text: Rect, ctx: &PaintContext) {
    for (y, visual) in rows(text, ctx) {
        match ctx.viewport.line(visual) {
            Some(line) => {
                paint_gutter(buf, gutter, y, line, ctx.is_bookmarked(visual), ctx);
                paint_line(buf, text, y, line, ctx);
            }
            None => {
                let style = Style::default().fg(GUTTER_FG);
                buf.set_stringn(text.x, y, "…", text.width as usize, style);
            }
        }
    }
}

fn paint_gutter(
    buf: &mut Buffer,
    gutter: Rect,
    y: u16,
    line: &CachedLine,
    bookmarked: bool,
    ctx: &PaintContext,
) {
    let mut x = gutter.x;
    let limit = gutter.x + gutter.width;
    if ctx.show_time {
        if let Some(at) = line.received_at {
            let stamp = format!("{:>width$}", format_relative_time(at, ctx.now), width = TIMESTAMP_WIDTH);
            let style = time_style(time_age(at, ctx.now));
            x = buf.set_stringn(x, y, stamp, limit.saturating_sub(x) as usize, style).0;
        } else {
            x += TIMESTAMP_WIDTH as u16;
        }
        x += 1;
    }
    let number = format!("{:>width$}", line.line_num, width = LINE_NUMBER_WIDTH);
    x = buf
        .set_stringn(x, y, number, limit.saturating_sub(x) as usize, Style::default().fg(GUTTER_FG))
        .0;
    let mark = if bookmarked { " ●" } else { " │" };
    let mark_style = if bookmarked {
        Style::default().fg(HEAT_MARK)
    } else {
        Style::default().fg(GUTTER_FG)
    };
    buf.set_stringn(x, y, mark, limit.saturating_sub(x) as usize, mark_style);
}

fn paint_line(buf: &mut Buffer, text: Rect, y: u16, line: &CachedLine, ctx: &PaintContext) {
    let content = line.decoded_content.as_str();
    let spans = ctx.highlighter.spans(content);
    let runs = apply_highlights(content, &spans, base_style(line.level_color));
    let horizontal = ctx.viewport.horizontal();
    let width = text.width as usize;
    let mut run = 0;
    let mut offset = 0;
    for (start, grapheme) in cell_columns(content) {
        let byte = offset;
        offset += grapheme.len();
        let cells = cell_width(grapheme);
        if start + cells <= horizontal {
            continue;
        }
        if start >= horizontal + width {
            break;
        }
        while run + 1 < runs.len() && runs[run].0.end <= byte {
            run += 1;
        }
        let style = runs.get(run).map(|(_, style)| *style);
        // A wide glyph cut by either edge leaves blank cells instead.
        let clipped = start < horizontal || start + cells > horizontal + width;
        let first = start.max(horizontal) - horizontal;
        let last = (start + cells).min(horizontal + width) - horizontal;
        for column in first..last {
            let Some(cell) = buf.cell_mut((text.x + column as u16, y)) else {
                continue;
            };
            if clipped {
                cell.set_symbol(" ");
            } else if column == first {
                cell.set_symbol(grapheme);
            } else {
                // Covered by the wide glyph to the left; the terminal diff
                // skips it.
                cell.set_symbol("");
            }
            if let Some(style) = style {
                cell.set_style(style);
            }
        }
    }
}

/// One column summarizing the whole projection: where the window sits and
/// which stretches hold bookmarks.
fn paint_heat_strip(buf: &mut Buffer, strip: Rect, ctx: &PaintContext) {
    let total = ctx.viewport.total();
    if strip.width == 0 || strip.height == 0 || total == 0 {
        return;
    }
    let height = strip.height as usize;
    let window = ctx.viewport.window();
    for row in 0..height {
        let from = row * total / height;
        let to = ((row + 1) * total / height).max(from + 1);
        let Some(cell) = buf.cell_mut((strip.x, strip.y + row as u16)) else {
            continue;
        };
        if from < window.end && window.start < to {
            cell.set_bg(HEAT_THUMB);
        }
        let first = ctx.bookmarks.partition_point(|&v| v < from);
        if ctx.bookmarks.get(first).is_some_and(|&v| v < to) {
            cell.set_symbol("▐").set_fg(HEAT_MARK);
        }
    }
}
