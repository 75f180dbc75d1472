//! Spatial Index - immutable R-tree over projected point positions
//!
//! The index stores positions plus the arena index of the record they came from; it never
//! owns feature data. It is bulk-loaded once per rebuild and never updated incrementally.

use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

/// A projected position tagged with its record index
type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Bulk-built spatial index supporting axis-aligned range queries
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl SpatialIndex {
    /// Bulk-load the index; `positions[i]` is tagged with record index `i`
    pub fn build(positions: impl IntoIterator<Item = [f64; 2]>) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::build");

        let entries: Vec<IndexedPoint> = positions
            .into_iter()
            .enumerate()
            .map(|(index, position)| GeomWithData::new(position, index))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Record indices of all points inside the closed box `[min, max]`
    pub fn range(&self, min: [f64; 2], max: [f64; 2]) -> impl Iterator<Item = usize> + '_ {
        let envelope = AABB::from_corners(min, max);
        self.tree
            .locate_in_envelope(&envelope)
            .map(|entry| entry.data)
    }

    /// Number of indexed points
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_query() {
        let index = SpatialIndex::build([[0.0, 0.0], [10.0, 10.0], [100.0, 100.0]]);
        assert_eq!(index.len(), 3);

        let mut hits: Vec<usize> = index.range([-1.0, -1.0], [11.0, 11.0]).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);

        assert_eq!(index.range([200.0, 200.0], [300.0, 300.0]).count(), 0);
    }

    #[test]
    fn test_range_is_inclusive() {
        let index = SpatialIndex::build([[5.0, 5.0]]);
        assert_eq!(index.range([5.0, 5.0], [5.0, 5.0]).collect::<Vec<_>>(), vec![0]);
        assert_eq!(index.range([0.0, 0.0], [5.0, 5.0]).count(), 1);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.range([-1e9, -1e9], [1e9, 1e9]).count(), 0);
    }

    #[test]
    fn test_duplicate_positions_keep_both_records() {
        let index = SpatialIndex::build([[1.0, 1.0], [1.0, 1.0]]);
        let mut hits: Vec<usize> = index.range([0.0, 0.0], [2.0, 2.0]).collect();
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 1]);
    }
}
