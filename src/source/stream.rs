use super::{LineSlice, LineSource};
use crate::error::Result;
use crate::matcher::SourceMode;
use chrono::{DateTime, Local};
use regex::Regex;
use std::borrow::Cow;
use std::io;
use std::ops::Range;
use std::sync::LazyLock;

// CSI sequences (colors, cursor moves) and OSC sequences (titles, links).
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]").unwrap()
});

pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    if !text.contains('\x1b') {
        return Cow::Borrowed(text);
    }
    ANSI_ESCAPE.replace_all(text, "")
}

pub struct StreamLine {
    pub text: String,
    pub received_at: DateTime<Local>,
}

/// Lines of a live stream held in memory. Chunks arrive with no alignment to
/// line boundaries; the unterminated tail waits in `pending`.
#[derive(Default)]
pub struct StreamBackedSource {
    lines: Vec<StreamLine>,
    pending: String,
}

impl StreamBackedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every line completed by `chunk` and returns their original
    /// indices.
    pub fn push_chunk(&mut self, chunk: &str) -> Range<usize> {
        let first = self.lines.len();
        let now = Local::now();
        let mut rest = chunk;
        while let Some(pos) = rest.find('\n') {
            self.pending.push_str(&rest[..pos]);
            let raw = std::mem::take(&mut self.pending);
            self.push_line(&raw, now);
            rest = &rest[pos + 1..];
        }
        self.pending.push_str(rest);
        first..self.lines.len()
    }

    /// Emits the unterminated tail as a final line, if there is one.
    pub fn finish(&mut self) -> Range<usize> {
        let first = self.lines.len();
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            self.push_line(&raw, Local::now());
        }
        first..self.lines.len()
    }

    /// Text received after the last newline.
    #[cfg(test)]
    pub fn pending(&self) -> &str {
        &self.pending
    }

    pub fn line(&self, original: usize) -> Option<&str> {
        self.lines.get(original).map(|l| l.text.as_str())
    }

    fn push_line(&mut self, raw: &str, received_at: DateTime<Local>) {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        self.lines.push(StreamLine {
            text: strip_ansi(raw).into_owned(),
            received_at,
        });
    }
}

impl LineSource for StreamBackedSource {
    fn mode(&self) -> SourceMode {
        SourceMode::Stream
    }

    fn total_lines(&self) -> usize {
        self.lines.len()
    }

    fn locate(&self, original: usize) -> Option<LineSlice<'_>> {
        self.line(original).map(LineSlice::Cached)
    }

    fn read_bytes(&mut self, _range: Range<u64>) -> io::Result<Vec<u8>> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream lines have no backing file",
        ))
    }

    fn scan(
        &mut self,
        progress_every: usize,
        visit: &mut dyn FnMut(usize, &str),
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<()> {
        let total = self.lines.len();
        let progress_every = progress_every.max(1);
        for (i, line) in self.lines.iter().enumerate() {
            visit(i, &line.text);
            if (i + 1) % progress_every == 0 {
                on_progress(((i + 1) * 100 / total) as u8);
            }
        }
        on_progress(100);
        Ok(())
    }

    fn received_at(&self, original: usize) -> Option<DateTime<Local>> {
        self.lines.get(original).map(|l| l.received_at)
    }
}
