//! Murale Core Library
//!
//! Platform-agnostic board model, interaction, and sync engine for the
//! Murale collaborative whiteboard.

pub mod camera;
pub mod color;
pub mod connector;
pub mod element;
pub mod engine;
pub mod frames;
pub mod geometry;
pub mod gesture;
pub mod handles;
pub mod hittest;
pub mod presence;
pub mod repo;
pub mod spatial;
pub mod store;
pub mod sync;

pub use camera::{Camera, Viewport};
pub use color::ElementColor;
pub use element::{
    BoardId, Element, ElementId, ElementKind, ElementPatch, ElementRow, ElementType, UserId,
};
pub use engine::{BoardEngine, EngineEvent, MutationError};
pub use gesture::{Gesture, GestureAction, GestureController, Modifiers, Selection, Tool};
pub use handles::{Handle, HandleKind};
pub use hittest::EdgeAnchor;
pub use presence::PeerCursor;
pub use repo::{ElementRepo, MemoryRepo, StoreError, StoreResult};
pub use store::BoardStore;
pub use sync::{BoardMessage, CommandOutcome, Envelope, RowChange, StoreCommand, SyncReconciler};
