pub const INDEX_CHUNK_SIZE: usize = 4 * 1024 * 1024;
pub const PROGRESS_EVERY_LINES: usize = 10_000;
pub const EXPORT_MERGE_GAP: u64 = 64 * 1024;
pub const READ_ERROR_MARKER: &str = "<line unavailable>";

pub const CACHE_SOFT_CAP: usize = 150_000;
pub const CACHE_PRUNE_TO: usize = 120_000;
pub const PREFETCH_ABOVE: usize = 100;
pub const PREFETCH_BELOW: usize = 400;
pub const FETCH_BATCH: usize = 200;
pub const OVERLAY_DEBOUNCE_MS: u64 = 16;
pub const WIDTH_SAMPLE: usize = 500;
pub const TAB_WIDTH: usize = 4;

pub const TIMESTAMP_WIDTH: usize = 6;
pub const LINE_NUMBER_WIDTH: usize = 9;
pub const BOOKMARK_MARK_WIDTH: usize = 2;

pub const POLL_INTERVAL_MS: u64 = 50;
pub const FEED_READ_SIZE: usize = 64 * 1024;

pub const INPUT_FIELD_HEIGHT: u16 = 3;
pub const STATUS_BAR_HEIGHT: u16 = 1;

pub const HELP_POPUP_WIDTH: u16 = 46;
pub const HELP_POPUP_HEIGHT: u16 = 6;

pub const CONTEXT_LINES: usize = 5;
pub const CONTEXT_POPUP_HEIGHT: u16 = 13;
