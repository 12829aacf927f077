use crate::error::Result;
use crate::matcher::{matches, CompiledRule};
use crate::source::{LineSlice, LineSource};
use std::ops::Range;
use tracing::debug;

/// Original line numbers of the visible lines, strictly increasing.
///
/// This is the coordinate system the viewer scrolls in: `get(visual)` gives
/// the original line, `visual_of(original)` goes back by binary search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilteredProjection {
    lines: Vec<usize>,
}

impl FilteredProjection {
    pub fn identity(total_lines: usize) -> Self {
        Self {
            lines: (0..total_lines).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, visual: usize) -> Option<usize> {
        self.lines.get(visual).copied()
    }

    pub fn visual_of(&self, original: usize) -> Option<usize> {
        self.lines.binary_search(&original).ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.lines
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn push(&mut self, original: usize) {
        debug_assert!(self.lines.last().map_or(true, |&last| last < original));
        self.lines.push(original);
    }
}

#[cfg(test)]
impl From<Vec<usize>> for FilteredProjection {
    fn from(lines: Vec<usize>) -> Self {
        Self { lines }
    }
}

/// Evaluates `rule` over every line of `source`.
///
/// A rule with no effective terms skips the scan and yields the identity
/// projection, which is exactly what the full scan would produce.
pub fn rebuild(
    source: &mut dyn LineSource,
    rule: Option<&CompiledRule>,
    progress_every: usize,
    on_progress: &mut dyn FnMut(u8),
) -> Result<FilteredProjection> {
    let total = source.total_lines();
    if rule.map_or(true, CompiledRule::is_passthrough) {
        on_progress(100);
        return Ok(FilteredProjection::identity(total));
    }

    let mode = source.mode();
    let mut projection = FilteredProjection::default();
    source.scan(
        progress_every,
        &mut |original, text| {
            if matches(text, rule, mode) {
                projection.push(original);
            }
        },
        on_progress,
    )?;
    debug!(total, visible = projection.len(), "projection rebuilt");
    Ok(projection)
}

/// Evaluates newly stored stream lines and appends the matches.
pub fn append(
    projection: &mut FilteredProjection,
    source: &dyn LineSource,
    rule: Option<&CompiledRule>,
    new_lines: Range<usize>,
) -> usize {
    let mode = source.mode();
    let before = projection.len();
    for original in new_lines {
        if let Some(LineSlice::Cached(text)) = source.locate(original) {
            if matches(text, rule, mode) {
                projection.push(original);
            }
        }
    }
    projection.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterRule;
    use crate::source::StreamBackedSource;
    use pretty_assertions::assert_eq;

    fn stream(lines: &[&str]) -> StreamBackedSource {
        let mut source = StreamBackedSource::new();
        for line in lines {
            source.push_chunk(&format!("{line}\n"));
        }
        source
    }

    fn compiled(include: &str, exclude: &str) -> CompiledRule {
        let mut rule = FilterRule::parse(include, exclude).unwrap();
        rule.show_raw_lines = false;
        CompiledRule::new(&rule)
    }

    #[test]
    fn translation_both_ways() {
        let projection = FilteredProjection::from(vec![2, 5, 9, 20]);
        assert_eq!(projection.get(2), Some(9));
        assert_eq!(projection.get(4), None);
        assert_eq!(projection.visual_of(9), Some(2));
        assert_eq!(projection.visual_of(7), None);
    }

    #[test]
    fn passthrough_equals_full_scan() {
        let mut source = stream(&["I/a: 1", "I/b: 2", "I/c: 3"]);
        let shortcut = rebuild(&mut source, None, 1, &mut |_| {}).unwrap();
        let blank = compiled("", "");
        let scanned = rebuild(&mut source, Some(&blank), 1, &mut |_| {}).unwrap();
        assert_eq!(shortcut, FilteredProjection::identity(3));
        assert_eq!(scanned, shortcut);
    }

    #[test]
    fn rebuild_is_monotonic_and_idempotent() {
        let mut source = stream(&[
            "I/net: up",
            "E/db: fail",
            "I/db: ok",
            "W/net: slow",
            "E/net: down",
        ]);
        let rule = compiled("db || net && E/", "ok");
        let first = rebuild(&mut source, Some(&rule), 2, &mut |_| {}).unwrap();
        let second = rebuild(&mut source, Some(&rule), 2, &mut |_| {}).unwrap();
        assert_eq!(first.as_slice(), &[1, 4]);
        assert_eq!(first, second);
        assert!(first.as_slice().windows(2).all(|w| w[0] < w[1]));
        assert!(first.as_slice().iter().all(|&i| i < source.total_lines()));
    }

    #[test]
    fn append_only_evaluates_new_lines() {
        let mut source = StreamBackedSource::new();
        let rule = compiled("keep", "");
        let mut projection = FilteredProjection::default();

        let added = source.push_chunk("keep 1\ndrop\nke");
        assert_eq!(append(&mut projection, &source, Some(&rule), added), 1);
        let added = source.push_chunk("ep 2\n");
        assert_eq!(append(&mut projection, &source, Some(&rule), added), 1);
        assert_eq!(projection.as_slice(), &[0, 2]);
    }
}
