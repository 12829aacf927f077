use super::cache::{cell_columns, cell_width};
use super::viewport::Viewport;
use anyhow::{bail, Context, Result};
use ratatui::layout::Rect;
use std::io::Write;
use std::ops::Range;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TextPoint {
    pub visual: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub anchor: TextPoint,
    pub head: TextPoint,
}

impl Selection {
    pub fn ordered(&self) -> (TextPoint, TextPoint) {
        if self.anchor <= self.head {
            (self.anchor, self.head)
        } else {
            (self.head, self.anchor)
        }
    }

    pub fn rows(&self) -> Range<usize> {
        let (start, end) = self.ordered();
        start.visual..end.visual + 1
    }

    /// Selected columns of row `visual`, end exclusive. `None` when the row
    /// is outside the selection.
    pub fn columns_on(&self, visual: usize) -> Option<Range<usize>> {
        let (start, end) = self.ordered();
        if visual < start.visual || visual > end.visual {
            return None;
        }
        let from = if visual == start.visual { start.column } else { 0 };
        let to = if visual == end.visual {
            end.column + 1
        } else {
            usize::MAX
        };
        Some(from..to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Layout {
    area: Rect,
    top: usize,
    total: usize,
    horizontal: usize,
}

/// Screen-row to visual-index mapping used for mouse hit testing. It follows
/// the painted rows with a short debounce, so during fast scrolling it may lag
/// a frame behind.
pub struct SelectionLayer {
    debounce: Duration,
    applied: Option<Layout>,
    waiting: Option<(Layout, Instant)>,
    selection: Option<Selection>,
    dragging: bool,
}

impl SelectionLayer {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            applied: None,
            waiting: None,
            selection: None,
            dragging: false,
        }
    }

    /// Called every frame with the text area the painter used. Returns
    /// `true` when the mapping was updated.
    pub fn sync(&mut self, area: Rect, viewport: &Viewport, now: Instant) -> bool {
        let layout = Layout {
            area,
            top: viewport.top(),
            total: viewport.total(),
            horizontal: viewport.horizontal(),
        };
        if self.applied == Some(layout) {
            self.waiting = None;
            return false;
        }
        let since = match self.waiting {
            Some((waiting, since)) if waiting == layout => since,
            _ => {
                self.waiting = Some((layout, now));
                now
            }
        };
        if self.applied.is_none() || now.duration_since(since) >= self.debounce {
            self.applied = Some(layout);
            self.waiting = None;
            return true;
        }
        false
    }

    /// Maps a terminal cell to a row and cell column of the row's text.
    pub fn hit(&self, x: u16, y: u16) -> Option<TextPoint> {
        let layout = self.applied?;
        let area = layout.area;
        if x < area.x || y < area.y || x >= area.x + area.width || y >= area.y + area.height {
            return None;
        }
        let visual = layout.top + (y - area.y) as usize;
        if visual >= layout.total {
            return None;
        }
        Some(TextPoint {
            visual,
            column: layout.horizontal + (x - area.x) as usize,
        })
    }

    pub fn press(&mut self, x: u16, y: u16) {
        self.selection = self.hit(x, y).map(|point| Selection {
            anchor: point,
            head: point,
        });
        self.dragging = self.selection.is_some();
    }

    pub fn drag(&mut self, x: u16, y: u16) {
        if !self.dragging {
            return;
        }
        let hit = self.hit(x, y);
        if let (Some(selection), Some(point)) = (self.selection.as_mut(), hit) {
            selection.head = point;
        }
    }

    pub fn release(&mut self) {
        self.dragging = false;
    }

    pub fn selection(&self) -> Option<Selection> {
        self.selection
    }

    pub fn clear(&mut self) {
        self.selection = None;
        self.dragging = false;
    }
}

/// Text covered by `selection`, given the display text of each selected row
/// in visual order. A wide glyph is taken when any of its cells is selected.
pub fn extract(selection: &Selection, rows: &[(usize, String)]) -> String {
    rows.iter()
        .filter_map(|(visual, text)| {
            let columns = selection.columns_on(*visual)?;
            let slice: String = cell_columns(text)
                .filter(|&(start, grapheme)| {
                    start < columns.end && start + cell_width(grapheme) > columns.start
                })
                .map(|(_, grapheme)| grapheme)
                .collect();
            Some(slice)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pipe_to(program: &str, args: &[&str], text: &str) -> Result<()> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("starting {}", program))?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(text.as_bytes())?;
    }
    let status = child.wait()?;
    if !status.success() {
        bail!("{} exited with {}", program, status);
    }
    Ok(())
}

#[cfg(target_os = "macos")]
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    pipe_to("pbcopy", &[], text)
}

#[cfg(not(target_os = "macos"))]
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    pipe_to("wl-copy", &[], text).or_else(|_| pipe_to("xclip", &["-selection", "clipboard"], text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use pretty_assertions::assert_eq;

    fn viewport() -> Viewport {
        let mut viewport = Viewport::new(ViewConfig::default());
        viewport.reset(100);
        viewport.set_height(10);
        viewport
    }

    const AREA: Rect = Rect {
        x: 12,
        y: 1,
        width: 40,
        height: 10,
    };

    #[test]
    fn mapping_follows_scrolling_after_the_debounce() {
        let mut layer = SelectionLayer::new(Duration::from_millis(16));
        let mut vp = viewport();
        let t0 = Instant::now();
        assert!(layer.sync(AREA, &vp, t0));
        assert_eq!(layer.hit(12, 1), Some(TextPoint { visual: 0, column: 0 }));

        vp.jump_to(50);
        assert!(!layer.sync(AREA, &vp, t0 + Duration::from_millis(5)));
        assert_eq!(layer.hit(12, 1).unwrap().visual, 0);
        assert!(layer.sync(AREA, &vp, t0 + Duration::from_millis(25)));
        assert_eq!(layer.hit(12, 1).unwrap().visual, vp.top());
    }

    #[test]
    fn hits_outside_the_text_area_miss() {
        let mut layer = SelectionLayer::new(Duration::ZERO);
        layer.sync(AREA, &viewport(), Instant::now());
        assert_eq!(layer.hit(11, 1), None);
        assert_eq!(layer.hit(12, 11), None);
        assert_eq!(layer.hit(15, 3), Some(TextPoint { visual: 2, column: 3 }));
    }

    #[test]
    fn drag_builds_a_selection_in_either_direction() {
        let mut layer = SelectionLayer::new(Duration::ZERO);
        layer.sync(AREA, &viewport(), Instant::now());
        layer.press(16, 4);
        layer.drag(13, 2);
        layer.release();
        layer.drag(30, 8);
        let selection = layer.selection().unwrap();
        assert_eq!(selection.rows(), 1..4);
        assert_eq!(selection.columns_on(1), Some(1..usize::MAX));
        assert_eq!(selection.columns_on(3), Some(0..5));
        assert_eq!(selection.columns_on(4), None);
    }

    #[test]
    fn extracts_partial_first_and_last_rows() {
        let selection = Selection {
            anchor: TextPoint { visual: 3, column: 2 },
            head: TextPoint { visual: 5, column: 1 },
        };
        let rows = vec![
            (3, "abcdef".to_string()),
            (4, "middle".to_string()),
            (5, "xyz".to_string()),
        ];
        assert_eq!(extract(&selection, &rows), "cdef\nmiddle\nxy");
    }

    #[test]
    fn wide_glyphs_map_by_cell() {
        let mut layer = SelectionLayer::new(Duration::ZERO);
        layer.sync(AREA, &viewport(), Instant::now());
        // Cells 2..4 of "日本語ok" both belong to 本.
        layer.press(AREA.x + 3, 1);
        layer.drag(AREA.x + 6, 1);
        let selection = layer.selection().unwrap();
        assert_eq!(selection.columns_on(0), Some(3..7));
        let rows = vec![(0, "日本語ok".to_string())];
        assert_eq!(extract(&selection, &rows), "本語o");
    }
}
