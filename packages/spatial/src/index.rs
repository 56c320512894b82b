//! In-memory R-tree over layer features.
//!
//! Candidates come from bounding-box overlap only; callers run the exact
//! predicate (`Intersects`, intersection area) on what the tree returns.

use geo::{BoundingRect, Rect};
use rstar::{AABB, RTree, RTreeObject};

/// A feature stored in the R-tree with its identifier.
#[derive(Debug, Clone)]
pub struct IndexedFeature<T> {
    /// Feature identifier (`ogc_fid`).
    pub fid: i64,
    /// The indexed geometry.
    pub geometry: T,
    envelope: AABB<[f64; 2]>,
}

impl<T> RTreeObject for IndexedFeature<T> {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bulk-loaded R-tree of features keyed by `ogc_fid`.
pub struct FeatureIndex<T> {
    tree: RTree<IndexedFeature<T>>,
}

impl<T> FeatureIndex<T>
where
    T: BoundingRect<f64>,
    T::Output: Into<Option<Rect<f64>>>,
{
    /// Builds the index. Features with an empty geometry have no envelope
    /// and are left out.
    #[must_use]
    pub fn new(features: impl IntoIterator<Item = (i64, T)>) -> Self {
        let entries = features
            .into_iter()
            .filter_map(|(fid, geometry)| {
                let rect: Option<Rect<f64>> = geometry.bounding_rect().into();
                rect.map(|rect| IndexedFeature {
                    fid,
                    geometry,
                    envelope: rect_envelope(rect),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// Features whose bounding box intersects `rect`, in no particular
    /// order.
    pub fn candidates(&self, rect: Rect<f64>) -> impl Iterator<Item = &IndexedFeature<T>> {
        self.tree
            .locate_in_envelope_intersecting(&rect_envelope(rect))
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

fn rect_envelope(rect: Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

#[cfg(test)]
mod tests {
    use geo::{Geometry, Point, coord, polygon};

    use super::*;

    #[test]
    fn candidates_by_envelope() {
        let index = FeatureIndex::new(vec![
            (1, Point::new(0.5, 0.5)),
            (2, Point::new(5.0, 5.0)),
            (3, Point::new(1.0, 1.0)),
        ]);
        assert_eq!(index.len(), 3);

        let query = Rect::new(coord! { x: 0.0, y: 0.0 }, coord! { x: 1.0, y: 1.0 });
        let mut fids: Vec<i64> = index.candidates(query).map(|f| f.fid).collect();
        fids.sort_unstable();
        assert_eq!(fids, vec![1, 3]);
    }

    #[test]
    fn empty_geometries_are_skipped() {
        let index = FeatureIndex::new(vec![
            (
                1,
                Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0)]),
            ),
            (2, Geometry::MultiPolygon(geo::MultiPolygon::new(vec![]))),
        ]);
        assert_eq!(index.len(), 1);
        assert!(!index.is_empty());
    }
}
