use super::cache::{CachedLine, LineCache};
use crate::config::ViewConfig;
use crate::lines::LineData;
use std::collections::HashSet;
use std::ops::Range;
use tracing::debug;

/// One outstanding line-window request. The generation ties it to the
/// projection it was asked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    pub generation: u64,
    pub start: usize,
    pub count: usize,
}

/// Scroll state and line window over the visible projection.
pub struct Viewport {
    config: ViewConfig,
    total: usize,
    top: usize,
    height: usize,
    cursor: usize,
    follow_tail: bool,
    horizontal: usize,
    generation: u64,
    pending: HashSet<usize>,
    cache: LineCache,
    max_width: Option<usize>,
}

impl Viewport {
    pub fn new(config: ViewConfig) -> Self {
        let cache = LineCache::new(config.cache_soft_cap, config.cache_prune_to);
        Self {
            config,
            total: 0,
            top: 0,
            height: 0,
            cursor: 0,
            follow_tail: false,
            horizontal: 0,
            generation: 0,
            pending: HashSet::new(),
            cache,
            max_width: None,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn top(&self) -> usize {
        self.top
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn horizontal(&self) -> usize {
        self.horizontal
    }

    pub fn follow_tail(&self) -> bool {
        self.follow_tail
    }

    pub fn set_follow_tail(&mut self, follow: bool) {
        self.follow_tail = follow;
        if follow {
            self.to_end();
        }
    }

    /// A new projection replaced the old one; everything cached is stale.
    pub fn reset(&mut self, total: usize) {
        self.generation += 1;
        self.cache.clear();
        self.pending.clear();
        self.max_width = None;
        self.total = total;
        if self.follow_tail {
            self.to_end();
        } else {
            self.cursor = self.cursor.min(total.saturating_sub(1));
            self.clamp_top();
        }
        debug!(generation = self.generation, total, "viewport reset");
    }

    /// The projection grew at the end; rows already cached stay valid.
    pub fn grow(&mut self, total: usize) {
        self.total = total;
        if self.follow_tail {
            self.to_end();
        }
    }

    pub fn set_height(&mut self, height: usize) {
        self.height = height;
        if self.follow_tail {
            self.to_end();
        } else {
            self.clamp_top();
        }
    }

    fn max_top(&self) -> usize {
        self.total.saturating_sub(self.height.max(1))
    }

    fn clamp_top(&mut self) {
        self.top = self.top.min(self.max_top());
    }

    fn reveal_cursor(&mut self) {
        if self.cursor < self.top {
            self.top = self.cursor;
        } else if self.height > 0 && self.cursor >= self.top + self.height {
            self.top = self.cursor + 1 - self.height;
        }
        self.clamp_top();
    }

    /// Rows currently on screen.
    pub fn window(&self) -> Range<usize> {
        self.top..(self.top + self.height).min(self.total)
    }

    /// Rows worth having: the window plus the prefetch margins.
    pub fn fetch_range(&self) -> Range<usize> {
        let start = self.top.saturating_sub(self.config.prefetch_above);
        let end = (self.top + self.height + self.config.prefetch_below).min(self.total);
        start..end.max(start)
    }

    /// Batch-aligned requests for rows in the fetch range that are neither
    /// cached nor already requested. Requested rows are marked pending.
    pub fn plan_fetches(&mut self) -> Vec<FetchRequest> {
        let batch = self.config.fetch_batch.max(1);
        let range = self.fetch_range();
        let mut requests = Vec::new();
        if range.is_empty() {
            return requests;
        }

        let mut block = range.start / batch * batch;
        while block < range.end {
            let rows = block..(block + batch).min(self.total);
            let missing = rows
                .clone()
                .any(|v| !self.cache.contains(v) && !self.pending.contains(&v));
            if missing {
                self.pending.extend(rows.clone());
                requests.push(FetchRequest {
                    generation: self.generation,
                    start: rows.start,
                    count: rows.len(),
                });
            }
            block += batch;
        }
        requests
    }

    /// Stores a fetched window. Returns `false` for a stale generation.
    pub fn on_lines(&mut self, request: FetchRequest, lines: Vec<LineData>) -> bool {
        if request.generation != self.generation {
            return false;
        }
        for v in request.start..request.start + request.count {
            self.pending.remove(&v);
        }
        for (i, line) in lines.into_iter().enumerate() {
            self.cache.insert(request.start + i, CachedLine::from(line));
        }
        self.max_width = None;
        true
    }

    /// The batch failed; its rows become eligible for the next paint.
    pub fn on_failure(&mut self, request: FetchRequest) {
        if request.generation != self.generation {
            return;
        }
        for v in request.start..request.start + request.count {
            self.pending.remove(&v);
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, visual: usize) -> bool {
        self.pending.contains(&visual)
    }

    pub fn line(&self, visual: usize) -> Option<&CachedLine> {
        self.cache.get(visual)
    }

    #[cfg(test)]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Widest of the recently loaded rows, recomputed only after new rows
    /// arrive.
    pub fn max_width(&mut self) -> usize {
        if let Some(width) = self.max_width {
            return width;
        }
        let width = self
            .cache
            .recent(self.config.width_sample)
            .map(CachedLine::width)
            .max()
            .unwrap_or(0);
        self.max_width = Some(width);
        width
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.total == 0 {
            return;
        }
        let last = self.total - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
        self.follow_tail = false;
        self.reveal_cursor();
    }

    pub fn set_cursor(&mut self, visual: usize) {
        if visual < self.total {
            self.cursor = visual;
            self.follow_tail = false;
            self.reveal_cursor();
        }
    }

    pub fn page(&mut self, pages: isize) {
        self.move_cursor(pages * self.height.max(1) as isize);
    }

    /// Puts `visual` on screen with a few rows of context above it.
    pub fn jump_to(&mut self, visual: usize) {
        if self.total == 0 {
            return;
        }
        self.cursor = visual.min(self.total - 1);
        self.follow_tail = false;
        self.top = self.cursor.saturating_sub(self.height / 3);
        self.clamp_top();
    }

    pub fn to_start(&mut self) {
        self.cursor = 0;
        self.top = 0;
        self.follow_tail = false;
    }

    pub fn to_end(&mut self) {
        self.cursor = self.total.saturating_sub(1);
        self.top = self.max_top();
    }

    /// Scrolls horizontally, never past the widest sampled row.
    pub fn scroll_horizontal(&mut self, delta: isize, content_width: usize) {
        let limit = self.max_width().saturating_sub(content_width);
        self.horizontal = self.horizontal.saturating_add_signed(delta).min(limit);
    }

    /// Visual index of the screen row `row` inside the list area.
    pub fn visual_at_row(&self, row: usize) -> Option<usize> {
        let visual = self.top + row;
        (row < self.height && visual < self.total).then_some(visual)
    }
}
