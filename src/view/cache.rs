use super::highlight::level_color;
use crate::constants::TAB_WIDTH;
use crate::lines::LineData;
use chrono::{DateTime, Local};
use ratatui::style::Color;
use std::collections::{HashMap, VecDeque};
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

#[derive(Debug, Clone)]
pub struct CachedLine {
    pub line_num: usize,
    pub content: String,
    /// What gets painted: tabs expanded, control characters replaced.
    pub decoded_content: String,
    pub level_color: Option<Color>,
    pub received_at: Option<DateTime<Local>>,
}

impl From<LineData> for CachedLine {
    fn from(line: LineData) -> Self {
        let decoded_content = decode_for_display(&line.content);
        let level_color = level_color(&line.content);
        Self {
            line_num: line.line_num,
            content: line.content,
            decoded_content,
            level_color,
            received_at: line.received_at,
        }
    }
}

impl CachedLine {
    /// Width in terminal cells; the same metric the painter and the
    /// selection layer use.
    pub fn width(&self) -> usize {
        self.decoded_content.graphemes(true).map(cell_width).sum()
    }
}

/// Terminal cells taken by one grapheme of decoded text. Decoding leaves no
/// zero-width graphemes, so this is 1 or 2.
pub fn cell_width(grapheme: &str) -> usize {
    grapheme.width().max(1)
}

/// Graphemes of `text` paired with the cell column each one starts at.
pub fn cell_columns(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.graphemes(true).scan(0, |column, grapheme| {
        let start = *column;
        *column += cell_width(grapheme);
        Some((start, grapheme))
    })
}

/// Expands tabs to cell-based tab stops and replaces control and zero-width
/// graphemes, so every grapheme left occupies at least one cell.
pub fn decode_for_display(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut column = 0;
    for grapheme in content.graphemes(true) {
        if grapheme == "\t" {
            let pad = TAB_WIDTH - column % TAB_WIDTH;
            out.extend(std::iter::repeat(' ').take(pad));
            column += pad;
            continue;
        }
        if grapheme.chars().all(char::is_control) || grapheme.width() == 0 {
            out.push(char::REPLACEMENT_CHARACTER);
            column += 1;
        } else {
            out.push_str(grapheme);
            column += grapheme.width();
        }
    }
    out
}

/// Rows keyed by visual index. Past the soft cap the oldest insertions are
/// dropped until `prune_to` remain.
pub struct LineCache {
    entries: HashMap<usize, CachedLine>,
    order: VecDeque<usize>,
    soft_cap: usize,
    prune_to: usize,
}

impl LineCache {
    pub fn new(soft_cap: usize, prune_to: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            soft_cap,
            prune_to: prune_to.min(soft_cap),
        }
    }

    pub fn insert(&mut self, visual: usize, line: CachedLine) {
        if self.entries.insert(visual, line).is_none() {
            self.order.push_back(visual);
        }
        if self.entries.len() > self.soft_cap {
            self.prune();
        }
    }

    fn prune(&mut self) {
        while self.entries.len() > self.prune_to {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    pub fn get(&self, visual: usize) -> Option<&CachedLine> {
        self.entries.get(&visual)
    }

    pub fn contains(&self, visual: usize) -> bool {
        self.entries.contains_key(&visual)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Up to `n` of the most recently inserted rows, newest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &CachedLine> {
        self.order
            .iter()
            .rev()
            .take(n)
            .filter_map(|visual| self.entries.get(visual))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(n: usize, content: &str) -> CachedLine {
        CachedLine::from(LineData {
            line_num: n,
            content: content.to_string(),
            received_at: None,
        })
    }

    #[test]
    fn prunes_oldest_first() {
        let mut cache = LineCache::new(10, 6);
        for i in 0..10 {
            cache.insert(i, line(i + 1, "x"));
        }
        assert_eq!(cache.len(), 10);
        cache.insert(10, line(11, "x"));
        assert_eq!(cache.len(), 6);
        assert!(!cache.contains(4));
        assert!(cache.contains(5));
        assert!(cache.contains(10));
    }

    #[test]
    fn reinserting_keeps_one_entry() {
        let mut cache = LineCache::new(4, 2);
        cache.insert(1, line(1, "a"));
        cache.insert(1, line(1, "b"));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(1).unwrap().content, "b");
        assert_eq!(cache.recent(10).count(), 1);
    }

    #[test]
    fn tabs_and_controls_are_decoded() {
        assert_eq!(decode_for_display("a\tb"), "a   b");
        assert_eq!(decode_for_display("\tx"), "    x");
        assert_eq!(decode_for_display("a\u{7}b"), "a\u{fffd}b");
        assert_eq!(decode_for_display("a\u{200b}b"), "a\u{fffd}b");
    }

    #[test]
    fn wide_glyphs_count_two_cells() {
        assert_eq!(line(1, "日本語ok").width(), 8);
        assert_eq!(decode_for_display("日\tx"), "日  x");
        let columns: Vec<(usize, &str)> = cell_columns("a日b").collect();
        assert_eq!(columns, vec![(0, "a"), (1, "日"), (3, "b")]);
    }

    #[test]
    fn level_color_is_derived_on_insert() {
        assert_eq!(line(1, "E/net: failed").level_color, Some(Color::Red));
        assert_eq!(line(1, "plain text").level_color, None);
    }
}
