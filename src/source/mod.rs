mod file;
mod stream;

pub use file::FileBackedSource;
pub use stream::{strip_ansi, StreamBackedSource};

use crate::error::Result;
use crate::matcher::SourceMode;
use chrono::{DateTime, Local};
use std::io;
use std::ops::Range;

/// Where the text of one original line lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineSlice<'a> {
    /// Byte range in the backing file, terminator included.
    Bytes(Range<u64>),
    /// Already decoded line held in memory.
    Cached(&'a str),
}

/// Random access to the lines of a document, independent of whether they
/// come from a file on disk or a live stream.
pub trait LineSource {
    fn mode(&self) -> SourceMode;

    fn total_lines(&self) -> usize;

    fn locate(&self, original: usize) -> Option<LineSlice<'_>>;

    fn read_bytes(&mut self, range: Range<u64>) -> io::Result<Vec<u8>>;

    /// Visits every line in original order. `on_progress` receives a
    /// percentage roughly every `progress_every` lines.
    fn scan(
        &mut self,
        progress_every: usize,
        visit: &mut dyn FnMut(usize, &str),
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<()>;

    fn received_at(&self, _original: usize) -> Option<DateTime<Local>> {
        None
    }

    /// `None` when `original` is past the end.
    fn read_line(&mut self, original: usize) -> Option<io::Result<String>> {
        let range = match self.locate(original)? {
            LineSlice::Cached(text) => return Some(Ok(text.to_owned())),
            LineSlice::Bytes(range) => range,
        };
        Some(self.read_bytes(range).map(|bytes| decode_line(&bytes)))
    }
}

/// Strips one trailing `\n` or `\r\n` and decodes lossily.
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(trim_terminator(bytes)).into_owned()
}

pub(crate) fn trim_terminator(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

/// The loaded document of a session.
pub enum Document {
    File(FileBackedSource),
    Stream(StreamBackedSource),
}

impl Document {
    fn inner(&self) -> &dyn LineSource {
        match self {
            Document::File(source) => source,
            Document::Stream(source) => source,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn LineSource {
        match self {
            Document::File(source) => source,
            Document::Stream(source) => source,
        }
    }
}

impl LineSource for Document {
    fn mode(&self) -> SourceMode {
        self.inner().mode()
    }

    fn total_lines(&self) -> usize {
        self.inner().total_lines()
    }

    fn locate(&self, original: usize) -> Option<LineSlice<'_>> {
        self.inner().locate(original)
    }

    fn read_bytes(&mut self, range: Range<u64>) -> io::Result<Vec<u8>> {
        self.inner_mut().read_bytes(range)
    }

    fn scan(
        &mut self,
        progress_every: usize,
        visit: &mut dyn FnMut(usize, &str),
        on_progress: &mut dyn FnMut(u8),
    ) -> Result<()> {
        self.inner_mut().scan(progress_every, visit, on_progress)
    }

    fn received_at(&self, original: usize) -> Option<DateTime<Local>> {
        self.inner().received_at(original)
    }
}
