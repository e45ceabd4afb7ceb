//! Grid spatial index over element centers.
//!
//! Elements are bucketed by the cell their center falls in. Point queries
//! inflate the probe by the largest half-diagonal seen at build time, so the
//! candidate set always covers every element whose box could contain the
//! probe regardless of which cell its center landed in.

use std::collections::HashMap;

use kurbo::{Point, Rect};

use crate::element::ElementId;

/// Side length of one index cell in world units.
pub const CELL_SIZE: f64 = 250.0;
/// Element count above which the index is worth building; below it, linear
/// scans win.
pub const INDEX_BUILD_THRESHOLD: usize = 80;

/// Grid bucketing of non-connector elements by center point.
#[derive(Debug, Default)]
pub struct SpatialIndex {
    cells: HashMap<(i64, i64), Vec<ElementId>>,
    /// Largest half-diagonal of any indexed element.
    reach: f64,
}

impl SpatialIndex {
    /// Cell coordinates containing a world point.
    pub fn cell_of(point: Point) -> (i64, i64) {
        (
            (point.x / CELL_SIZE).floor() as i64,
            (point.y / CELL_SIZE).floor() as i64,
        )
    }

    /// Build from `(id, bounds)` pairs. Callers filter to non-connectors.
    pub fn build(items: impl IntoIterator<Item = (ElementId, Rect)>) -> Self {
        let mut index = Self::default();
        for (id, bounds) in items {
            let cell = Self::cell_of(bounds.center());
            index.cells.entry(cell).or_default().push(id);
            let half_diag = (bounds.width().hypot(bounds.height())) / 2.0;
            index.reach = index.reach.max(half_diag);
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Ids whose center cell overlaps `rect`.
    pub fn query_rect(&self, rect: Rect) -> Vec<ElementId> {
        let (cx0, cy0) = Self::cell_of(Point::new(rect.x0, rect.y0));
        let (cx1, cy1) = Self::cell_of(Point::new(rect.x1, rect.y1));
        let span = ((cx1 - cx0 + 1) as i128) * ((cy1 - cy0 + 1) as i128);
        let mut out = Vec::new();
        if span > self.cells.len() as i128 {
            // Huge query region; walking the occupied cells is cheaper than
            // walking the cell range.
            for (&(cx, cy), ids) in &self.cells {
                if cx >= cx0 && cx <= cx1 && cy >= cy0 && cy <= cy1 {
                    out.extend_from_slice(ids);
                }
            }
        } else {
            for cx in cx0..=cx1 {
                for cy in cy0..=cy1 {
                    if let Some(ids) = self.cells.get(&(cx, cy)) {
                        out.extend_from_slice(ids);
                    }
                }
            }
        }
        out
    }

    /// Candidate ids for a point probe, inflated by the build-time reach.
    pub fn query_point(&self, point: Point) -> Vec<ElementId> {
        let r = self.reach.max(1.0);
        self.query_rect(Rect::new(
            point.x - r,
            point.y - r,
            point.x + r,
            point.y + r,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn rect_at(x: f64, y: f64, w: f64, h: f64) -> Rect {
        Rect::new(x, y, x + w, y + h)
    }

    #[test]
    fn test_cell_of_floors_negative_coordinates() {
        assert_eq!(SpatialIndex::cell_of(Point::new(0.0, 0.0)), (0, 0));
        assert_eq!(SpatialIndex::cell_of(Point::new(249.9, 249.9)), (0, 0));
        assert_eq!(SpatialIndex::cell_of(Point::new(250.0, 0.0)), (1, 0));
        assert_eq!(SpatialIndex::cell_of(Point::new(-0.1, -250.1)), (-1, -2));
    }

    #[test]
    fn test_query_rect_returns_centers_in_region() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let far = Uuid::new_v4();
        let index = SpatialIndex::build(vec![
            (a, rect_at(10.0, 10.0, 50.0, 50.0)),
            (b, rect_at(300.0, 10.0, 50.0, 50.0)),
            (far, rect_at(2000.0, 2000.0, 50.0, 50.0)),
        ]);
        let hits = index.query_rect(Rect::new(0.0, 0.0, 400.0, 100.0));
        assert!(hits.contains(&a));
        assert!(hits.contains(&b));
        assert!(!hits.contains(&far));
    }

    #[test]
    fn test_query_point_reaches_into_neighbor_cells() {
        // Center lands in cell (1, 0) but the element spills across x=250.
        let wide = Uuid::new_v4();
        let index = SpatialIndex::build(vec![(wide, rect_at(200.0, 0.0, 300.0, 40.0))]);
        let hits = index.query_point(Point::new(210.0, 10.0));
        assert!(hits.contains(&wide));
    }

    #[test]
    fn test_query_point_superset_of_true_overlaps() {
        let mut items = Vec::new();
        for i in 0..30 {
            for j in 0..30 {
                items.push((
                    Uuid::new_v4(),
                    rect_at(i as f64 * 97.0, j as f64 * 61.0, 120.0, 80.0),
                ));
            }
        }
        let index = SpatialIndex::build(items.clone());
        let probe = Point::new(500.0, 300.0);
        let candidates = index.query_point(probe);
        for (id, bounds) in &items {
            if bounds.contains(probe) {
                assert!(candidates.contains(id), "missing true overlap {id}");
            }
        }
    }

    #[test]
    fn test_huge_query_walks_occupied_cells() {
        let a = Uuid::new_v4();
        let index = SpatialIndex::build(vec![(a, rect_at(0.0, 0.0, 10.0, 10.0))]);
        let hits = index.query_rect(Rect::new(-1e9, -1e9, 1e9, 1e9));
        assert_eq!(hits, vec![a]);
    }
}
