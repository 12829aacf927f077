use crate::projection::FilteredProjection;
use std::collections::BTreeSet;

/// Bookmarked lines, stored as original line numbers so they survive
/// refiltering.
#[derive(Debug, Clone, Default)]
pub struct BookmarkSet {
    originals: BTreeSet<usize>,
}

impl BookmarkSet {
    /// Flips the bookmark on the line shown at `visual` and returns the
    /// visual bookmark list. An index outside the projection changes nothing.
    pub fn toggle(&mut self, visual: usize, projection: &FilteredProjection) -> Vec<usize> {
        if let Some(original) = projection.get(visual) {
            if !self.originals.remove(&original) {
                self.originals.insert(original);
            }
        }
        self.visual(projection)
    }

    /// Visual indices of the bookmarks that are currently visible, ascending.
    /// One binary search per bookmark rather than a pass over the projection.
    pub fn visual(&self, projection: &FilteredProjection) -> Vec<usize> {
        self.originals
            .iter()
            .filter_map(|&original| projection.visual_of(original))
            .collect()
    }

    pub fn contains_original(&self, original: usize) -> bool {
        self.originals.contains(&original)
    }

    pub fn len(&self) -> usize {
        self.originals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    pub fn clear(&mut self) {
        self.originals.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn binary_search_translation() {
        let projection = FilteredProjection::from(vec![2, 5, 9, 20]);
        let mut bookmarks = BookmarkSet::default();
        assert_eq!(bookmarks.toggle(2, &projection), vec![2]);
        assert!(bookmarks.contains_original(9));

        let mut hidden = BookmarkSet::default();
        hidden.originals.insert(7);
        assert!(hidden.visual(&projection).is_empty());
    }

    #[test]
    fn toggling_twice_removes() {
        let projection = FilteredProjection::identity(10);
        let mut bookmarks = BookmarkSet::default();
        assert_eq!(bookmarks.toggle(4, &projection), vec![4]);
        assert_eq!(bookmarks.toggle(1, &projection), vec![1, 4]);
        assert_eq!(bookmarks.toggle(4, &projection), vec![1]);
        assert_eq!(bookmarks.toggle(99, &projection), vec![1]);
    }

    #[test]
    fn bookmarks_survive_refiltering() {
        let all = FilteredProjection::identity(6);
        let mut bookmarks = BookmarkSet::default();
        bookmarks.toggle(3, &all);

        let narrowed = FilteredProjection::from(vec![0, 1, 5]);
        assert!(bookmarks.visual(&narrowed).is_empty());

        let shifted = FilteredProjection::from(vec![1, 3, 4]);
        assert_eq!(bookmarks.visual(&shifted), vec![1]);
        assert_eq!(bookmarks.len(), 1);
    }
}
