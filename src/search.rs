use crate::projection::FilteredProjection;
use crate::source::LineSource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindResult {
    pub visual_index: usize,
    /// 1-based original line number.
    pub line_num: usize,
}

/// Walks the visible lines one by one starting next to `start`, reading each
/// candidate on demand. `start == None` begins before the first line going
/// forward, or after the last line going backward.
pub fn find(
    source: &mut dyn LineSource,
    projection: &FilteredProjection,
    keyword: &str,
    start: Option<usize>,
    direction: Direction,
    case_sensitive: bool,
) -> Option<FindResult> {
    if keyword.is_empty() || projection.is_empty() {
        return None;
    }
    let needle = if case_sensitive {
        keyword.to_string()
    } else {
        keyword.to_lowercase()
    };

    let len = projection.len();
    let candidates: Box<dyn Iterator<Item = usize>> = match (direction, start) {
        (Direction::Forward, None) => Box::new(0..len),
        (Direction::Forward, Some(s)) => Box::new(s.saturating_add(1)..len),
        (Direction::Backward, None) => Box::new((0..len).rev()),
        (Direction::Backward, Some(s)) => Box::new((0..s.min(len)).rev()),
    };

    for visual in candidates {
        let Some(original) = projection.get(visual) else {
            continue;
        };
        let Some(Ok(text)) = source.read_line(original) else {
            continue;
        };
        let hit = if case_sensitive {
            text.contains(&needle)
        } else {
            text.to_lowercase().contains(&needle)
        };
        if hit {
            return Some(FindResult {
                visual_index: visual,
                line_num: original + 1,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StreamBackedSource;
    use pretty_assertions::assert_eq;

    fn source() -> StreamBackedSource {
        let mut source = StreamBackedSource::new();
        source.push_chunk("boot\nError one\nidle\nerror two\nidle\n");
        source
    }

    #[test]
    fn forward_and_backward() {
        let mut source = source();
        let projection = FilteredProjection::identity(5);
        let hit = find(&mut source, &projection, "error", Some(1), Direction::Forward, false);
        assert_eq!(hit, Some(FindResult { visual_index: 3, line_num: 4 }));
        let hit = find(&mut source, &projection, "error", Some(3), Direction::Backward, false);
        assert_eq!(hit, Some(FindResult { visual_index: 1, line_num: 2 }));
    }

    #[test]
    fn open_start_covers_the_edges() {
        let mut source = source();
        let projection = FilteredProjection::identity(5);
        let first = find(&mut source, &projection, "boot", None, Direction::Forward, false);
        assert_eq!(first.map(|r| r.visual_index), Some(0));
        let last = find(&mut source, &projection, "idle", None, Direction::Backward, false);
        assert_eq!(last.map(|r| r.visual_index), Some(4));
    }

    #[test]
    fn case_sensitivity_and_exhaustion() {
        let mut source = source();
        let projection = FilteredProjection::identity(5);
        let hit = find(&mut source, &projection, "error", None, Direction::Forward, true);
        assert_eq!(hit.map(|r| r.line_num), Some(4));
        assert_eq!(
            find(&mut source, &projection, "error", Some(3), Direction::Forward, true),
            None
        );
        assert_eq!(
            find(&mut source, &projection, "boot", Some(0), Direction::Backward, false),
            None
        );
    }

    #[test]
    fn searches_visible_space_only() {
        let mut source = source();
        let projection = FilteredProjection::from(vec![0, 2, 3]);
        let hit = find(&mut source, &projection, "error", None, Direction::Forward, false);
        assert_eq!(hit, Some(FindResult { visual_index: 2, line_num: 4 }));
    }
}
