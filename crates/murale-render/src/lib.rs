//! Murale Render Library
//!
//! Turns a board snapshot into a backend-neutral display list. The
//! pipeline culls against the viewport, drops to flat level-of-detail
//! boxes at low zoom, caches text wrapping, and layers connectors,
//! interaction affordances, and peer cursors over the elements. Hosts
//! hand the finished [`Scene`](scene::Scene) to a
//! [`RenderBackend`](context::RenderBackend) and pace frames with the
//! [`RenderDriver`](driver::RenderDriver).

pub mod context;
pub mod driver;
pub mod grid;
pub mod pipeline;
pub mod scene;
pub mod text;

pub use context::{RenderBackend, RenderContext, RenderError};
pub use driver::RenderDriver;
pub use pipeline::{LOD_ZOOM_THRESHOLD, RenderPipeline};
pub use scene::{DrawItem, FrameStats, Scene};
pub use text::TextLayoutCache;
