//! Authoritative in-memory element collection for one open board.

use std::collections::{HashMap, HashSet};

use kurbo::{Point, Rect};

use crate::element::{BoardId, Element, ElementId, ElementPatch};
use crate::spatial::{INDEX_BUILD_THRESHOLD, SpatialIndex};

/// Live elements of one board: an id-keyed map plus a render-order list
/// kept sorted by `(z_index, created_at)`, with a lazily built spatial
/// index over non-connector centers.
#[derive(Debug)]
pub struct BoardStore {
    board_id: BoardId,
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
    index: Option<SpatialIndex>,
    revision: u64,
    indexed_revision: u64,
}

impl BoardStore {
    pub fn new(board_id: BoardId) -> Self {
        Self {
            board_id,
            elements: HashMap::new(),
            order: Vec::new(),
            index: None,
            revision: 0,
            indexed_revision: 0,
        }
    }

    pub fn board_id(&self) -> BoardId {
        self.board_id
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    /// Mutable access; counts as a geometry change for index freshness.
    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.revision += 1;
        self.elements.get_mut(&id)
    }

    /// Replace the whole collection from freshly listed elements.
    pub fn load(&mut self, elements: Vec<Element>) {
        self.elements.clear();
        self.order.clear();
        for element in elements {
            self.order.push(element.id);
            self.elements.insert(element.id, element);
        }
        self.resort();
        self.revision += 1;
        log::info!(
            "board {} loaded with {} elements",
            self.board_id,
            self.elements.len()
        );
    }

    /// Insert a new element. Returns false (and leaves the store untouched)
    /// when the id is already present, which makes duplicate `element_added`
    /// deliveries no-ops.
    pub fn insert(&mut self, element: Element) -> bool {
        if self.elements.contains_key(&element.id) {
            return false;
        }
        self.order.push(element.id);
        self.elements.insert(element.id, element);
        self.resort();
        self.revision += 1;
        true
    }

    /// Merge a sparse patch into an existing element. No-op for unknown ids.
    pub fn merge_patch(&mut self, id: ElementId, patch: &ElementPatch) -> bool {
        let Some(element) = self.elements.get_mut(&id) else {
            return false;
        };
        patch.apply_to(element);
        if patch.z_index.is_some() {
            self.resort();
        }
        self.revision += 1;
        true
    }

    /// Overwrite an existing element with a full remote row. No-op for
    /// unknown ids, which covers updates that raced a delete.
    pub fn replace_element(&mut self, element: Element) -> bool {
        let Some(slot) = self.elements.get_mut(&element.id) else {
            return false;
        };
        let resort = slot.z_index != element.z_index || slot.created_at != element.created_at;
        *slot = element;
        if resort {
            self.resort();
        }
        self.revision += 1;
        true
    }

    /// Remove by id. Idempotent: a second delete returns `None`.
    pub fn remove(&mut self, id: ElementId) -> Option<Element> {
        let element = self.elements.remove(&id)?;
        self.order.retain(|&e| e != id);
        self.revision += 1;
        Some(element)
    }

    /// Swap a temporary element for its server-confirmed row, keeping the
    /// render-order position. If the server id already arrived through a
    /// remote channel, the temporary copy is simply dropped so exactly one
    /// element remains.
    pub fn replace_id(&mut self, temp_id: ElementId, confirmed: Element) -> bool {
        let Some(pos) = self.order.iter().position(|&e| e == temp_id) else {
            return false;
        };
        if self.elements.contains_key(&confirmed.id) {
            self.order.remove(pos);
            self.elements.remove(&temp_id);
        } else {
            self.elements.remove(&temp_id);
            self.order[pos] = confirmed.id;
            self.elements.insert(confirmed.id, confirmed);
        }
        self.revision += 1;
        true
    }

    /// Ids of connectors referencing `id` as either endpoint.
    pub fn connectors_referencing(&self, id: ElementId) -> Vec<ElementId> {
        self.order
            .iter()
            .filter_map(|&cid| {
                let (from, to) = self.elements.get(&cid)?.connector_endpoints()?;
                (from == id || to == id).then_some(cid)
            })
            .collect()
    }

    /// Ids of elements carrying this frame's membership.
    pub fn frame_members(&self, frame_id: ElementId) -> Vec<ElementId> {
        self.order
            .iter()
            .filter(|&&id| {
                self.elements
                    .get(&id)
                    .is_some_and(|e| e.frame_id == Some(frame_id))
            })
            .copied()
            .collect()
    }

    /// Elements in ascending render order.
    pub fn ordered(&self) -> impl Iterator<Item = &Element> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Elements in descending render order (topmost first).
    pub fn ordered_rev(&self) -> impl Iterator<Item = &Element> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.elements.get(id))
    }

    /// z_index that stacks above everything.
    pub fn z_front(&self) -> i64 {
        self.elements
            .values()
            .map(|e| e.z_index)
            .max()
            .map_or(0, |z| z + 1)
    }

    /// z_index that stacks below everything.
    pub fn z_back(&self) -> i64 {
        self.elements
            .values()
            .map(|e| e.z_index)
            .min()
            .map_or(0, |z| z - 1)
    }

    /// Union of non-connector bounds, for fit-to-content.
    pub fn content_bounds(&self) -> Option<Rect> {
        let mut all: Option<Rect> = None;
        for element in self.elements.values() {
            if element.is_connector() {
                continue;
            }
            let b = element.bounds();
            all = Some(match all {
                Some(acc) => acc.union(b),
                None => b,
            });
        }
        all
    }

    /// Rebuild or drop the spatial index according to the element count.
    /// Cheap when nothing changed since the last build.
    pub fn refresh_index(&mut self) {
        if self.elements.len() <= INDEX_BUILD_THRESHOLD {
            self.index = None;
            return;
        }
        if self.index.is_some() && self.indexed_revision == self.revision {
            return;
        }
        self.index = Some(SpatialIndex::build(
            self.elements
                .values()
                .filter(|e| !e.is_connector())
                .map(|e| (e.id, e.bounds())),
        ));
        self.indexed_revision = self.revision;
    }

    fn index_if_fresh(&self) -> Option<&SpatialIndex> {
        match &self.index {
            Some(index) if self.indexed_revision == self.revision => Some(index),
            _ => None,
        }
    }

    /// Whether queries currently go through the index (for diagnostics).
    pub fn index_active(&self) -> bool {
        self.index_if_fresh().is_some()
    }

    /// Non-connector candidates that may contain `point`, as a set; callers
    /// re-walk render order for priority. Falls back to a full scan when no
    /// fresh index exists.
    pub fn candidates_at_point(&self, point: Point) -> HashSet<ElementId> {
        match self.index_if_fresh() {
            Some(index) => index.query_point(point).into_iter().collect(),
            None => self
                .elements
                .values()
                .filter(|e| !e.is_connector())
                .map(|e| e.id)
                .collect(),
        }
    }

    /// Non-connector candidates whose center cell overlaps `rect`.
    pub fn candidates_in_rect(&self, rect: Rect) -> HashSet<ElementId> {
        match self.index_if_fresh() {
            Some(index) => index.query_rect(rect).into_iter().collect(),
            None => self
                .elements
                .values()
                .filter(|e| !e.is_connector())
                .map(|e| e.id)
                .collect(),
        }
    }

    fn resort(&mut self) {
        let elements = &self.elements;
        self.order.sort_by_key(|id| {
            elements
                .get(id)
                .map(|e| (e.z_index, e.created_at, e.id.as_u128()))
                .unwrap_or((i64::MAX, u64::MAX, 0))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementType;
    use uuid::Uuid;

    fn store_with(n: usize) -> (BoardStore, Vec<ElementId>) {
        let board = Uuid::new_v4();
        let user = Uuid::new_v4();
        let mut store = BoardStore::new(board);
        let mut ids = Vec::new();
        for i in 0..n {
            let mut e = Element::new(
                ElementType::Rectangle,
                board,
                (i as f64) * 20.0,
                0.0,
                10.0,
                10.0,
                user,
            );
            e.created_at = i as u64;
            e.updated_at = i as u64;
            ids.push(e.id);
            store.insert(e);
        }
        (store, ids)
    }

    #[test]
    fn test_insert_is_deduped_by_id() {
        let (mut store, ids) = store_with(1);
        let copy = store.get(ids[0]).unwrap().clone();
        assert!(!store.insert(copy));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_order_follows_z_then_created_at() {
        let (mut store, ids) = store_with(3);
        let ordered: Vec<_> = store.ordered().map(|e| e.id).collect();
        assert_eq!(ordered, ids);

        let z = store.z_front();
        store.merge_patch(
            ids[0],
            &ElementPatch {
                z_index: Some(z),
                ..ElementPatch::default()
            },
        );
        let ordered: Vec<_> = store.ordered().map(|e| e.id).collect();
        assert_eq!(ordered, vec![ids[1], ids[2], ids[0]]);
        assert_eq!(store.ordered_rev().next().map(|e| e.id), Some(ids[0]));
    }

    #[test]
    fn test_replace_element_resorts_on_z_change() {
        let (mut store, ids) = store_with(3);
        let mut remote = store.get(ids[0]).unwrap().clone();
        remote.z_index = store.z_front();
        assert!(store.replace_element(remote));
        let ordered: Vec<_> = store.ordered().map(|e| e.id).collect();
        assert_eq!(ordered, vec![ids[1], ids[2], ids[0]]);

        let mut unknown = store.get(ids[1]).unwrap().clone();
        unknown.id = Uuid::new_v4();
        assert!(!store.replace_element(unknown));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_merge_patch_unknown_id_is_noop() {
        let (mut store, _) = store_with(2);
        assert!(!store.merge_patch(Uuid::new_v4(), &ElementPatch::move_to(1.0, 1.0)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let (mut store, ids) = store_with(2);
        assert!(store.remove(ids[0]).is_some());
        assert!(store.remove(ids[0]).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_replace_id_keeps_order_position() {
        let (mut store, ids) = store_with(3);
        let mut confirmed = store.get(ids[1]).unwrap().clone();
        confirmed.id = Uuid::new_v4();
        assert!(store.replace_id(ids[1], confirmed.clone()));
        let ordered: Vec<_> = store.ordered().map(|e| e.id).collect();
        assert_eq!(ordered, vec![ids[0], confirmed.id, ids[2]]);
        assert!(!store.contains(ids[1]));
    }

    #[test]
    fn test_replace_id_drops_temp_when_echo_arrived_first() {
        let (mut store, ids) = store_with(1);
        let mut echo = store.get(ids[0]).unwrap().clone();
        echo.id = Uuid::new_v4();
        assert!(store.insert(echo.clone()));
        assert!(store.replace_id(ids[0], echo.clone()));
        assert_eq!(store.len(), 1);
        assert!(store.contains(echo.id));
    }

    #[test]
    fn test_connectors_referencing_finds_both_ends() {
        let (mut store, ids) = store_with(2);
        let c = Element::new_connector(store.board_id(), ids[0], ids[1], Uuid::new_v4());
        let cid = c.id;
        store.insert(c);
        assert_eq!(store.connectors_referencing(ids[0]), vec![cid]);
        assert_eq!(store.connectors_referencing(ids[1]), vec![cid]);
        assert!(store.connectors_referencing(Uuid::new_v4()).is_empty());
    }

    #[test]
    fn test_index_builds_only_above_threshold() {
        let (mut store, _) = store_with(INDEX_BUILD_THRESHOLD);
        store.refresh_index();
        assert!(!store.index_active());

        let (mut big, _) = store_with(INDEX_BUILD_THRESHOLD + 1);
        big.refresh_index();
        assert!(big.index_active());
    }

    #[test]
    fn test_index_goes_stale_on_mutation_and_rebuilds() {
        let (mut store, ids) = store_with(INDEX_BUILD_THRESHOLD + 5);
        store.refresh_index();
        assert!(store.index_active());
        store.get_mut(ids[0]).map(|e| e.x += 1.0).expect("exists");
        assert!(!store.index_active());
        store.refresh_index();
        assert!(store.index_active());
    }

    #[test]
    fn test_candidates_identical_with_and_without_index() {
        let (mut store, _) = store_with(INDEX_BUILD_THRESHOLD + 20);
        let probe = Point::new(45.0, 5.0);
        let unindexed = store.candidates_at_point(probe);
        store.refresh_index();
        let indexed = store.candidates_at_point(probe);
        // The indexed set may be smaller but must keep every true overlap.
        for element in store.ordered() {
            if element.bounds().contains(probe) {
                assert!(indexed.contains(&element.id));
                assert!(unindexed.contains(&element.id));
            }
        }
        assert!(indexed.iter().all(|id| unindexed.contains(id)));
    }

    #[test]
    fn test_content_bounds_ignores_connectors() {
        let (mut store, ids) = store_with(2);
        let c = Element::new_connector(store.board_id(), ids[0], ids[1], Uuid::new_v4());
        store.insert(c);
        let bounds = store.content_bounds().unwrap();
        assert_eq!((bounds.x0, bounds.y0), (0.0, 0.0));
        assert_eq!((bounds.x1, bounds.y1), (30.0, 10.0));
    }
}
