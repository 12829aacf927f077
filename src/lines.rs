use crate::projection::FilteredProjection;
use crate::source::LineSource;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineData {
    /// 1-based original line number.
    pub line_num: usize,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedLine {
    pub visual_index: usize,
    #[serde(flatten)]
    pub line: LineData,
}

/// Reads `original`, substituting `error_marker` when the read fails.
/// `None` when the line doesn't exist (anymore).
fn fetch(source: &mut dyn LineSource, original: usize, error_marker: &str) -> Option<LineData> {
    let content = match source.read_line(original)? {
        Ok(content) => content,
        Err(e) => {
            warn!(line = original, error = %e, "line read failed");
            format!("{error_marker} ({e})")
        }
    };
    Some(LineData {
        line_num: original + 1,
        content,
        received_at: source.received_at(original),
    })
}

/// Lines `start..start + count` of the visible space. Indices past the
/// projection, or projected lines the source no longer has, are skipped.
pub fn get_lines(
    source: &mut dyn LineSource,
    projection: &FilteredProjection,
    start: usize,
    count: usize,
    error_marker: &str,
) -> Vec<LineData> {
    let end = start.saturating_add(count).min(projection.len());
    (start..end)
        .filter_map(|visual| projection.get(visual))
        .filter_map(|original| fetch(source, original, error_marker))
        .collect()
}

/// Lines in original space, ignoring the filter.
pub fn get_raw_lines(
    source: &mut dyn LineSource,
    start: usize,
    count: usize,
    error_marker: &str,
) -> Vec<LineData> {
    let end = start.saturating_add(count).min(source.total_lines());
    (start..end)
        .filter_map(|original| fetch(source, original, error_marker))
        .collect()
}

/// Resolves an unordered set of visual indices. Reads happen in ascending
/// order and each result carries the visual index it was requested under.
pub fn get_lines_by_indices(
    source: &mut dyn LineSource,
    projection: &FilteredProjection,
    indices: &[usize],
    error_marker: &str,
) -> Vec<IndexedLine> {
    let mut sorted = indices.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
        .into_iter()
        .filter_map(|visual| {
            let original = projection.get(visual)?;
            let line = fetch(source, original, error_marker)?;
            Some(IndexedLine {
                visual_index: visual,
                line,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileBackedSource;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> (NamedTempFile, FileBackedSource) {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        let source = FileBackedSource::open(file.path(), 8, &mut |_| {}).unwrap();
        (file, source)
    }

    fn line(line_num: usize, content: &str) -> LineData {
        LineData {
            line_num,
            content: content.to_string(),
            received_at: None,
        }
    }

    #[test]
    fn window_reports_original_line_numbers() {
        let (_file, mut source) = fixture(b"A\nB\nC\nD\nE\n");
        let projection = FilteredProjection::from(vec![1, 3]);
        let lines = get_lines(&mut source, &projection, 0, 2, "?");
        assert_eq!(lines, vec![line(2, "B"), line(4, "D")]);
    }

    #[test]
    fn out_of_range_is_short_or_empty() {
        let (_file, mut source) = fixture(b"A\nB\nC\n");
        let projection = FilteredProjection::from(vec![0, 2, 7]);
        let lines = get_lines(&mut source, &projection, 1, 10, "?");
        assert_eq!(lines, vec![line(3, "C")]);
        assert!(get_lines(&mut source, &projection, 50, 5, "?").is_empty());
        assert!(get_lines(&mut source, &projection, usize::MAX, usize::MAX, "?").is_empty());
    }

    #[test]
    fn raw_window_ignores_projection() {
        let (_file, mut source) = fixture(b"A\nB\nC");
        let lines = get_raw_lines(&mut source, 1, 5, "?");
        assert_eq!(lines, vec![line(2, "B"), line(3, "C")]);
    }

    #[test]
    fn unordered_indices_come_back_tagged() {
        let (_file, mut source) = fixture(b"a\nb\nc\nd\ne\nf\n");
        let projection = FilteredProjection::from(vec![0, 2, 4, 5]);
        let lines = get_lines_by_indices(&mut source, &projection, &[3, 0, 9, 3, 1], "?");
        let got: Vec<(usize, usize, &str)> = lines
            .iter()
            .map(|l| (l.visual_index, l.line.line_num, l.line.content.as_str()))
            .collect();
        assert_eq!(got, vec![(0, 1, "a"), (1, 3, "c"), (3, 6, "f")]);
    }

    #[test]
    fn failed_reads_become_markers() {
        let (file, mut source) = fixture(b"aaaa\nbbbb\ncccc\n");
        file.as_file().set_len(5).unwrap();
        let projection = FilteredProjection::identity(3);
        let lines = get_lines(&mut source, &projection, 0, 3, "<gone>");
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].content, "aaaa");
        assert!(lines[1].content.starts_with("<gone>"));
        assert!(lines[2].content.starts_with("<gone>"));
    }
}
