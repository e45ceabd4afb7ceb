//! Persistence boundary: the row store the board is loaded from and
//! persisted to.

mod memory;

pub use memory::MemoryRepo;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::element::{BoardId, ElementId, ElementPatch, ElementRow};

/// Errors crossing the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("element not found: {0}")]
    NotFound(ElementId),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed future used by repository methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Row-oriented element store reached through simple CRUD calls.
///
/// `insert` returns the authoritative row: the server assigns the real id
/// and the caller swaps it for the temporary one.
pub trait ElementRepo: Send + Sync {
    /// All rows of one board, ordered by creation time.
    fn list_by_board(&self, board_id: BoardId) -> BoxFuture<'_, StoreResult<Vec<ElementRow>>>;

    /// Persist a new row; the returned row carries the server-assigned id.
    fn insert(&self, row: ElementRow) -> BoxFuture<'_, StoreResult<ElementRow>>;

    /// Merge a sparse patch into an existing row.
    fn update(&self, id: ElementId, patch: ElementPatch) -> BoxFuture<'_, StoreResult<()>>;

    /// Delete one row by id.
    fn delete(&self, id: ElementId) -> BoxFuture<'_, StoreResult<()>>;

    /// Delete every row of a board.
    fn delete_all_by_board(&self, board_id: BoardId) -> BoxFuture<'_, StoreResult<()>>;
}
