//! In-memory repository backing tests and the headless demo.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use super::{BoxFuture, ElementRepo, StoreError, StoreResult};
use crate::element::{BoardId, ElementId, ElementPatch, ElementRow};

/// Row store held in a map, with injectable failures so rollback and
/// reload paths can be exercised.
#[derive(Default)]
pub struct MemoryRepo {
    rows: RwLock<HashMap<ElementId, ElementRow>>,
    fail_next_insert: AtomicBool,
    fail_mutations: AtomicBool,
}

impl MemoryRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next insert fail with a backend error.
    pub fn fail_next_insert(&self) {
        self.fail_next_insert.store(true, Ordering::SeqCst);
    }

    /// Toggle failure of every update/delete.
    pub fn set_fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn row_count(&self) -> usize {
        self.rows.read().map(|rows| rows.len()).unwrap_or(0)
    }

    fn rows_mut(
        &self,
    ) -> StoreResult<std::sync::RwLockWriteGuard<'_, HashMap<ElementId, ElementRow>>> {
        self.rows
            .write()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))
    }

    fn rows_ref(
        &self,
    ) -> StoreResult<std::sync::RwLockReadGuard<'_, HashMap<ElementId, ElementRow>>> {
        self.rows
            .read()
            .map_err(|e| StoreError::Backend(format!("lock error: {e}")))
    }
}

impl ElementRepo for MemoryRepo {
    fn list_by_board(&self, board_id: BoardId) -> BoxFuture<'_, StoreResult<Vec<ElementRow>>> {
        Box::pin(async move {
            let rows = self.rows_ref()?;
            let mut listed: Vec<ElementRow> = rows
                .values()
                .filter(|row| row.board_id == board_id)
                .cloned()
                .collect();
            listed.sort_by_key(|row| (row.created_at, row.id.as_u128()));
            Ok(listed)
        })
    }

    fn insert(&self, row: ElementRow) -> BoxFuture<'_, StoreResult<ElementRow>> {
        Box::pin(async move {
            if self.fail_next_insert.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Backend("injected insert failure".into()));
            }
            let mut confirmed = row;
            confirmed.id = Uuid::new_v4();
            self.rows_mut()?.insert(confirmed.id, confirmed.clone());
            Ok(confirmed)
        })
    }

    fn update(&self, id: ElementId, patch: ElementPatch) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("injected mutation failure".into()));
            }
            let mut rows = self.rows_mut()?;
            let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
            let mut element = row.clone().into_element();
            patch.apply_to(&mut element);
            *row = ElementRow::from_element(&element);
            Ok(())
        })
    }

    fn delete(&self, id: ElementId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("injected mutation failure".into()));
            }
            self.rows_mut()?.remove(&id);
            Ok(())
        })
    }

    fn delete_all_by_board(&self, board_id: BoardId) -> BoxFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            if self.fail_mutations.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("injected mutation failure".into()));
            }
            self.rows_mut()?.retain(|_, row| row.board_id != board_id);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, ElementType};
    use pollster::block_on;

    fn row(board: BoardId, created_at: u64) -> ElementRow {
        let mut element = Element::new(
            ElementType::Sticky,
            board,
            0.0,
            0.0,
            160.0,
            120.0,
            Uuid::new_v4(),
        );
        element.created_at = created_at;
        ElementRow::from_element(&element)
    }

    #[test]
    fn test_insert_assigns_server_id() {
        let repo = MemoryRepo::new();
        let board = Uuid::new_v4();
        let temp = row(board, 1);
        let temp_id = temp.id;
        let confirmed = block_on(repo.insert(temp)).unwrap();
        assert_ne!(confirmed.id, temp_id);
        assert_eq!(repo.row_count(), 1);
    }

    #[test]
    fn test_list_orders_by_creation() {
        let repo = MemoryRepo::new();
        let board = Uuid::new_v4();
        block_on(repo.insert(row(board, 30))).unwrap();
        block_on(repo.insert(row(board, 10))).unwrap();
        block_on(repo.insert(row(board, 20))).unwrap();
        block_on(repo.insert(row(Uuid::new_v4(), 5))).unwrap();
        let listed = block_on(repo.list_by_board(board)).unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn test_update_merges_patch_into_row() {
        let repo = MemoryRepo::new();
        let board = Uuid::new_v4();
        let confirmed = block_on(repo.insert(row(board, 1))).unwrap();
        block_on(repo.update(confirmed.id, ElementPatch::move_to(7.0, 9.0))).unwrap();
        let listed = block_on(repo.list_by_board(board)).unwrap();
        assert_eq!((listed[0].x, listed[0].y), (7.0, 9.0));
        assert_eq!(listed[0].width, 160.0);
    }

    #[test]
    fn test_update_unknown_id_is_not_found() {
        let repo = MemoryRepo::new();
        let result = block_on(repo.update(Uuid::new_v4(), ElementPatch::default()));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_injected_insert_failure_fires_once() {
        let repo = MemoryRepo::new();
        let board = Uuid::new_v4();
        repo.fail_next_insert();
        assert!(block_on(repo.insert(row(board, 1))).is_err());
        assert!(block_on(repo.insert(row(board, 2))).is_ok());
    }

    #[test]
    fn test_delete_all_by_board_scopes_to_board() {
        let repo = MemoryRepo::new();
        let board = Uuid::new_v4();
        let other = Uuid::new_v4();
        block_on(repo.insert(row(board, 1))).unwrap();
        block_on(repo.insert(row(other, 2))).unwrap();
        block_on(repo.delete_all_by_board(board)).unwrap();
        assert!(block_on(repo.list_by_board(board)).unwrap().is_empty());
        assert_eq!(block_on(repo.list_by_board(other)).unwrap().len(), 1);
    }
}
