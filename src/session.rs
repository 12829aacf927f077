use crate::bookmarks::BookmarkSet;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::export::{export_file, export_stream};
use crate::filter::FilterRule;
use crate::lines::{self, IndexedLine, LineData};
use crate::matcher::CompiledRule;
use crate::projection::{self, FilteredProjection};
use crate::search::{self, Direction, FindResult};
use crate::source::{Document, FileBackedSource, LineSource, StreamBackedSource};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSummary {
    pub match_count: usize,
    pub total_lines: usize,
    pub bookmarks: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamAppend {
    pub match_count: usize,
    pub total_lines: usize,
    pub appended: usize,
}

/// All engine state for one loaded document.
pub struct Session {
    config: EngineConfig,
    document: Option<Document>,
    rule: Option<FilterRule>,
    compiled: Option<CompiledRule>,
    projection: FilteredProjection,
    bookmarks: BookmarkSet,
}

impl Session {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            document: None,
            rule: None,
            compiled: None,
            projection: FilteredProjection::default(),
            bookmarks: BookmarkSet::default(),
        }
    }

    /// Indexes `path` and replaces the current document. On failure the
    /// session is left empty; the previous document is not kept.
    pub fn open_file(&mut self, path: &Path, on_progress: &mut dyn FnMut(u8)) -> Result<usize> {
        self.reset();
        let started = Instant::now();
        let source = FileBackedSource::open(path, self.config.chunk_size, on_progress)?;
        let total = source.total_lines();
        info!(
            path = %path.display(),
            lines = total,
            bytes = source.index().file_size(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "file indexed"
        );
        self.document = Some(Document::File(source));
        Ok(total)
    }

    pub fn open_stream(&mut self) {
        self.reset();
        self.document = Some(Document::Stream(StreamBackedSource::new()));
    }

    fn reset(&mut self) {
        self.document = None;
        self.projection.clear();
        self.bookmarks.clear();
    }

    /// Replaces the rule and rebuilds the projection over the whole document.
    pub fn apply_filter(
        &mut self,
        rule: Option<FilterRule>,
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<FilterSummary> {
        self.compiled = rule.as_ref().map(CompiledRule::new);
        self.rule = rule;
        self.refilter(on_progress)
    }

    /// Rebuilds the projection with the current rule.
    pub fn refilter(&mut self, on_progress: &mut dyn FnMut(u8)) -> Result<FilterSummary> {
        let document = self.document.as_mut().ok_or(EngineError::NoDocument)?;
        let started = Instant::now();
        self.projection = projection::rebuild(
            document,
            self.compiled.as_ref(),
            self.config.progress_every_lines,
            on_progress,
        )?;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "filter applied"
        );
        Ok(self.summary())
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary {
            match_count: self.projection.len(),
            total_lines: self.total_lines(),
            bookmarks: self.bookmarks.visual(&self.projection),
        }
    }

    pub fn append_chunk(&mut self, chunk: &str) -> Result<StreamAppend> {
        let Some(Document::Stream(source)) = self.document.as_mut() else {
            return Err(EngineError::NotStream);
        };
        let added = source.push_chunk(chunk);
        self.append_lines(added)
    }

    pub fn finish_stream(&mut self) -> Result<StreamAppend> {
        let Some(Document::Stream(source)) = self.document.as_mut() else {
            return Err(EngineError::NotStream);
        };
        let added = source.finish();
        self.append_lines(added)
    }

    fn append_lines(&mut self, added: std::ops::Range<usize>) -> Result<StreamAppend> {
        let document = self.document.as_ref().ok_or(EngineError::NoDocument)?;
        let appended =
            projection::append(&mut self.projection, document, self.compiled.as_ref(), added);
        Ok(StreamAppend {
            match_count: self.projection.len(),
            total_lines: document.total_lines(),
            appended,
        })
    }

    pub fn total_lines(&self) -> usize {
        self.document.as_ref().map_or(0, |d| d.total_lines())
    }

    pub fn projection(&self) -> &FilteredProjection {
        &self.projection
    }

    pub fn rule(&self) -> Option<&FilterRule> {
        self.rule.as_ref()
    }

    pub fn get_lines(&mut self, start: usize, count: usize) -> Vec<LineData> {
        let Some(document) = self.document.as_mut() else {
            return Vec::new();
        };
        lines::get_lines(
            document,
            &self.projection,
            start,
            count,
            &self.config.read_error_marker,
        )
    }

    pub fn get_raw_lines(&mut self, start: usize, count: usize) -> Vec<LineData> {
        let Some(document) = self.document.as_mut() else {
            return Vec::new();
        };
        lines::get_raw_lines(document, start, count, &self.config.read_error_marker)
    }

    pub fn get_lines_by_indices(&mut self, indices: &[usize]) -> Vec<IndexedLine> {
        let Some(document) = self.document.as_mut() else {
            return Vec::new();
        };
        lines::get_lines_by_indices(
            document,
            &self.projection,
            indices,
            &self.config.read_error_marker,
        )
    }

    pub fn find(
        &mut self,
        keyword: &str,
        start: Option<usize>,
        direction: Direction,
    ) -> Option<FindResult> {
        let case_sensitive = self.rule.as_ref().is_some_and(|r| r.highlight_case_sensitive);
        let document = self.document.as_mut()?;
        search::find(
            document,
            &self.projection,
            keyword,
            start,
            direction,
            case_sensitive,
        )
    }

    pub fn toggle_bookmark(&mut self, visual: usize) -> Vec<usize> {
        self.bookmarks.toggle(visual, &self.projection)
    }

    pub fn visual_bookmarks(&self) -> Vec<usize> {
        self.bookmarks.visual(&self.projection)
    }

    pub fn export_visible(&mut self) -> Result<Vec<u8>> {
        match self.document.as_mut().ok_or(EngineError::NoDocument)? {
            Document::File(source) => Ok(export_file(
                source,
                &self.projection,
                self.config.merge_gap,
                &self.config.read_error_marker,
            )),
            Document::Stream(source) => Ok(export_stream(source, &self.projection)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn include(groups: &[&[&str]]) -> FilterRule {
        FilterRule {
            include_groups: groups
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
            ..FilterRule::default()
        }
    }

    fn opened(content: &[u8]) -> (NamedTempFile, Session) {
        let file = fixture(content);
        let mut session = Session::new(EngineConfig::default());
        session.open_file(file.path(), &mut |_| {}).unwrap();
        (file, session)
    }

    #[test]
    fn end_to_end_scenario() {
        let (_file, mut session) = opened(b"A\nB\nC\nD\nE\n");
        let summary = session
            .apply_filter(Some(include(&[&["B"], &["D"]])), &mut |_| {})
            .unwrap();
        assert_eq!(summary.match_count, 2);
        assert_eq!(session.projection().as_slice(), &[1, 3]);

        let lines: Vec<(usize, String)> = session
            .get_lines(0, 2)
            .into_iter()
            .map(|l| (l.line_num, l.content))
            .collect();
        assert_eq!(lines, vec![(2, "B".to_string()), (4, "D".to_string())]);
        assert_eq!(session.export_visible().unwrap(), b"B\nD");
    }

    #[test]
    fn unterminated_last_line_is_filtered_too() {
        let (_file, mut session) = opened(b"a\nkeep b\nc\nkeep d");
        let summary = session
            .apply_filter(Some(include(&[&["keep"]])), &mut |_| {})
            .unwrap();
        assert_eq!(summary.total_lines, 4);
        assert_eq!(session.projection().as_slice(), &[1, 3]);
        assert_eq!(session.get_lines(1, 1)[0].content, "keep d");
        assert_eq!(session.export_visible().unwrap(), b"keep b\nkeep d");
    }

    #[test]
    fn search_case_follows_a_rule_without_terms() {
        let (_file, mut session) = opened(b"Error\nerror\n");
        let rule = FilterRule::parse("", "").unwrap().with_case_sensitive(true);
        let summary = session.apply_filter(Some(rule), &mut |_| {}).unwrap();
        assert_eq!(summary.match_count, 3);
        let hit = session.find("error", None, Direction::Forward).unwrap();
        assert_eq!(hit.visual_index, 1);
    }

    #[test]
    fn lines_round_trip_against_export() {
        let content: String = (0..120)
            .map(|i| format!("{} event {i}\n", if i % 3 == 0 { "warn" } else { "info" }))
            .collect();
        let (_file, mut session) = opened(content.as_bytes());
        session
            .apply_filter(Some(include(&[&["warn"]])), &mut |_| {})
            .unwrap();

        let raw: Vec<&str> = content.split('\n').collect();
        let visible = session.projection().len();
        for v in 0..visible {
            let original = session.projection().get(v).unwrap();
            let line = session.get_lines(v, 1).remove(0);
            assert_eq!(line.content, raw[original]);
        }

        let joined: Vec<String> = session
            .get_lines(0, visible)
            .into_iter()
            .map(|l| l.content)
            .collect();
        let export = String::from_utf8(session.export_visible().unwrap()).unwrap();
        assert_eq!(export.split('\n').collect::<Vec<_>>(), joined);
    }

    #[test]
    fn bookmark_survives_refilter() {
        let (_file, mut session) = opened(b"alpha\nbeta\ngamma\ndelta\n");
        session.apply_filter(None, &mut |_| {}).unwrap();
        assert_eq!(session.toggle_bookmark(2), vec![2]);

        let summary = session
            .apply_filter(Some(include(&[&["alpha"], &["delta"]])), &mut |_| {})
            .unwrap();
        assert!(summary.bookmarks.is_empty());

        session
            .apply_filter(Some(include(&[&["a"]])), &mut |_| {})
            .unwrap();
        assert_eq!(session.projection().as_slice(), &[0, 1, 2, 3]);
        assert_eq!(session.visual_bookmarks(), vec![2]);

        session
            .apply_filter(Some(include(&[&["gamma"], &["beta"]])), &mut |_| {})
            .unwrap();
        assert_eq!(session.visual_bookmarks(), vec![1]);
    }

    #[test]
    fn failed_open_leaves_no_document() {
        let (_file, mut session) = opened(b"x\ny\n");
        let dir = tempfile::tempdir().unwrap();
        assert!(session
            .open_file(&dir.path().join("missing.log"), &mut |_| {})
            .is_err());
        assert_eq!(session.total_lines(), 0);
        assert!(session.get_lines(0, 10).is_empty());
        assert!(matches!(
            session.refilter(&mut |_| {}),
            Err(EngineError::NoDocument)
        ));
    }

    #[test]
    fn stream_appends_and_refilters() {
        let mut session = Session::new(EngineConfig::default());
        session.open_stream();
        let mut rule = include(&[&["keep"]]);
        rule.show_raw_lines = false;
        session.apply_filter(Some(rule), &mut |_| {}).unwrap();

        session.append_chunk("I/a: keep 1\nI/a: drop\nI/a: ke").unwrap();
        let appended = session.append_chunk("ep 2\n").unwrap();
        assert_eq!(appended.match_count, 2);
        assert_eq!(appended.total_lines, 3);

        let summary = session
            .apply_filter(Some(include(&[&["drop"]])), &mut |_| {})
            .unwrap();
        assert_eq!(summary.match_count, 1);
        assert_eq!(session.export_visible().unwrap(), b"I/a: drop");
    }

    #[test]
    fn appending_to_a_file_is_rejected() {
        let (_file, mut session) = opened(b"x\n");
        assert!(matches!(
            session.append_chunk("y\n"),
            Err(EngineError::NotStream)
        ));
    }

    #[test]
    fn search_uses_highlight_case_flag() {
        let (_file, mut session) = opened(b"Error\nerror\n");
        let mut rule = FilterRule::default();
        rule.highlight_case_sensitive = true;
        session.apply_filter(Some(rule), &mut |_| {}).unwrap();
        let hit = session.find("error", None, Direction::Forward).unwrap();
        assert_eq!(hit.visual_index, 1);
    }
}
