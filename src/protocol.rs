//! Messages exchanged with the engine worker.
//!
//! Requests may carry an id; the responses they cause echo it. Status and
//! progress broadcasts carry no id.

use crate::filter::FilterRule;
use crate::lines::{IndexedLine, LineData};
use crate::search::{Direction, FindResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Option<u64>,
    pub command: Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Command {
    OpenFile(PathBuf),
    OpenStream,
    AppendChunk(String),
    FinishStream,
    ApplyFilter(Option<FilterRule>),
    GetLines { start: usize, count: usize },
    GetRawLines { start: usize, count: usize },
    GetLinesByIndices(Vec<usize>),
    Find {
        keyword: String,
        start: Option<usize>,
        direction: Direction,
    },
    ToggleBookmark(usize),
    GetFullText,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Indexing,
    Filtering,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<u64>,
    pub event: Event,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Event {
    Status {
        phase: Phase,
        percent: u8,
    },
    IndexComplete {
        total_lines: usize,
    },
    FilterComplete {
        match_count: usize,
        total_lines: usize,
        bookmarks: Vec<usize>,
    },
    StreamAppended {
        match_count: usize,
        total_lines: usize,
    },
    Lines(Vec<LineData>),
    IndexedLines(Vec<IndexedLine>),
    FindResult(Option<FindResult>),
    BookmarksUpdated(Vec<usize>),
    /// The export buffer, moved to the receiver.
    FullText(Vec<u8>),
    Error(String),
}
