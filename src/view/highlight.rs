use crate::filter::FilterRule;
use ratatui::style::{Color, Modifier, Style};
use regex::{Regex, RegexBuilder};
use std::ops::Range;
use std::sync::LazyLock;
use tracing::warn;

struct LevelRule {
    regex: Regex,
    color: Color,
}

static LEVEL_RULES: LazyLock<Vec<LevelRule>> = LazyLock::new(|| {
    vec![
        LevelRule {
            regex: Regex::new(r"^\s*[EF]/|\s[EF]\s|(?i)\b(error|err|fatal|fail(ed)?|panic)\b")
                .unwrap(),
            color: Color::Red,
        },
        LevelRule {
            regex: Regex::new(r"^\s*W/|\sW\s|(?i)\b(warn(ing)?)\b").unwrap(),
            color: Color::Yellow,
        },
        LevelRule {
            regex: Regex::new(r"^\s*I/|\sI\s|(?i)\b(info)\b").unwrap(),
            color: Color::Green,
        },
        LevelRule {
            regex: Regex::new(r"^\s*[DV]/|\s[DV]\s|(?i)\b(debug|trace|verbose)\b").unwrap(),
            color: Color::Cyan,
        },
    ]
});

/// Foreground for text outside any highlight span, picked from the
/// severity the line appears to carry.
pub fn level_color(text: &str) -> Option<Color> {
    LEVEL_RULES
        .iter()
        .find(|rule| rule.regex.is_match(text))
        .map(|rule| rule.color)
}

const PALETTE: [Color; 6] = [
    Color::Yellow,
    Color::LightCyan,
    Color::LightMagenta,
    Color::LightGreen,
    Color::LightBlue,
    Color::LightRed,
];

const KEYWORD_PRIORITY: u8 = 10;
const SEARCH_PRIORITY: u8 = 100;

#[derive(Clone)]
struct HighlightRule {
    regex: Regex,
    style: Style,
    priority: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub style: Style,
    pub priority: u8,
}

/// Compiled keyword highlighting. Keywords are always literal.
#[derive(Clone, Default)]
pub struct Highlighter {
    rules: Vec<HighlightRule>,
    search: Option<HighlightRule>,
}

fn compile(keyword: &str, case_sensitive: bool) -> Option<Regex> {
    match RegexBuilder::new(&regex::escape(keyword))
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!(keyword, error = %e, "skipping highlight keyword");
            None
        }
    }
}

fn marked(bg: Color) -> Style {
    Style::default()
        .bg(bg)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

impl Highlighter {
    pub fn new<'a>(keywords: impl IntoIterator<Item = &'a str>, case_sensitive: bool) -> Self {
        let mut seen = Vec::new();
        for keyword in keywords {
            if !keyword.is_empty() && !seen.contains(&keyword) {
                seen.push(keyword);
            }
        }
        let rules = seen
            .into_iter()
            .filter_map(|keyword| compile(keyword, case_sensitive))
            .enumerate()
            .map(|(i, regex)| HighlightRule {
                regex,
                style: marked(PALETTE[i % PALETTE.len()]),
                priority: KEYWORD_PRIORITY,
            })
            .collect();
        Self {
            rules,
            search: None,
        }
    }

    /// Highlights every include term of `rule`.
    pub fn from_rule(rule: Option<&FilterRule>) -> Self {
        let Some(rule) = rule else {
            return Self::default();
        };
        let terms = rule.include_groups.iter().flatten().map(String::as_str);
        Self::new(terms, rule.highlight_case_sensitive)
    }

    pub fn set_search(&mut self, keyword: Option<&str>, case_sensitive: bool) {
        self.search = keyword
            .filter(|k| !k.is_empty())
            .and_then(|k| compile(k, case_sensitive))
            .map(|regex| HighlightRule {
                regex,
                style: Style::default()
                    .bg(Color::White)
                    .fg(Color::Black)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                priority: SEARCH_PRIORITY,
            });
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.search.is_none()
    }

    /// Byte spans of every keyword hit, sorted by start.
    pub fn spans(&self, text: &str) -> Vec<Span> {
        let mut spans = Vec::new();
        for rule in self.rules.iter().chain(self.search.iter()) {
            for m in rule.regex.find_iter(text) {
                if m.is_empty() {
                    continue;
                }
                spans.push(Span {
                    start: m.start(),
                    end: m.end(),
                    style: rule.style,
                    priority: rule.priority,
                });
            }
        }
        spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.priority.cmp(&a.priority)));
        spans
    }
}

/// Splits `text` into styled byte runs covering all of it. Where spans
/// overlap the higher priority wins; ties go to the later span.
pub fn apply_highlights(text: &str, spans: &[Span], base: Style) -> Vec<(Range<usize>, Style)> {
    if text.is_empty() {
        return Vec::new();
    }
    if spans.is_empty() {
        return vec![(0..text.len(), base)];
    }

    let mut style_at: Vec<(Style, u8)> = vec![(base, 0); text.len()];
    for span in spans {
        let end = span.end.min(text.len());
        for slot in &mut style_at[span.start.min(end)..end] {
            if span.priority >= slot.1 {
                *slot = (span.style, span.priority);
            }
        }
    }

    let mut result = Vec::new();
    let mut pos = 0;
    while pos < text.len() {
        let current = style_at[pos].0;
        let mut end = pos + 1;
        while end < text.len() && style_at[end].0 == current {
            end += 1;
        }
        result.push((pos..end, current));
        pos = end;
    }
    result
}

/// Base style for unhighlighted text of a line.
pub fn base_style(level: Option<Color>) -> Style {
    match level {
        Some(color) => Style::default().fg(color),
        None => Style::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_literally() {
        let highlighter = Highlighter::new(["a.b"], false);
        assert!(highlighter.spans("axb").is_empty());
        let spans = highlighter.spans("see a.b here");
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].start, spans[0].end), (4, 7));
    }

    #[test]
    fn case_awareness_follows_the_flag() {
        assert_eq!(Highlighter::new(["Error"], false).spans("error ERROR").len(), 2);
        assert_eq!(Highlighter::new(["Error"], true).spans("error ERROR").len(), 0);
    }

    #[test]
    fn spans_are_sorted_by_start() {
        let highlighter = Highlighter::new(["beta", "alpha"], false);
        let starts: Vec<usize> = highlighter
            .spans("alpha beta alpha")
            .iter()
            .map(|s| s.start)
            .collect();
        assert_eq!(starts, vec![0, 6, 11]);
    }

    #[test]
    fn rule_terms_become_keywords() {
        let rule = FilterRule::parse("net && timeout || disk", "").unwrap();
        let highlighter = Highlighter::from_rule(Some(&rule));
        assert_eq!(highlighter.spans("disk net timeout").len(), 3);
        assert!(Highlighter::from_rule(None).is_empty());
    }

    #[test]
    fn search_wins_over_keywords() {
        let mut highlighter = Highlighter::new(["abc"], false);
        highlighter.set_search(Some("b"), false);
        let text = "abc";
        let runs = apply_highlights(text, &highlighter.spans(text), Style::default());
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1].0, 1..2);
        assert_eq!(runs[1].1.bg, Some(Color::White));
        assert_eq!(runs[0].1.bg, Some(PALETTE[0]));
    }

    #[test]
    fn unhighlighted_text_keeps_the_level_color() {
        let text = "W/x: slow";
        let base = base_style(level_color(text));
        assert_eq!(apply_highlights(text, &[], base), vec![(0..text.len(), base)]);
        assert_eq!(base.fg, Some(Color::Yellow));
    }

    #[test]
    fn level_detection() {
        assert_eq!(level_color("12:00:01  1234 E net: down"), Some(Color::Red));
        assert_eq!(level_color("E/net: down"), Some(Color::Red));
        assert_eq!(level_color("[warn] disk"), Some(Color::Yellow));
        assert_eq!(level_color("I/app: started"), Some(Color::Green));
        assert_eq!(level_color("hello"), None);
    }
}
