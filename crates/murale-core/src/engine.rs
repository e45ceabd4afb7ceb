//! The board engine: one object a host event loop drives.
//!
//! Owns the element store, camera, gesture controller, sync reconciler,
//! and peer presence for a single board session. Everything is sans-IO:
//! pointer and keyboard events come in through methods, persistence
//! commands and peer broadcasts accumulate in queues the host drains,
//! and completions are fed back through [`apply_outcome`],
//! [`ingest_row_change`], and [`ingest_broadcast`].
//!
//! [`apply_outcome`]: BoardEngine::apply_outcome
//! [`ingest_row_change`]: BoardEngine::ingest_row_change
//! [`ingest_broadcast`]: BoardEngine::ingest_broadcast

use kurbo::{Point, Size, Vec2};
use log::{debug, info};
use thiserror::Error;
use uuid::Uuid;

use crate::camera::{Camera, Viewport};
use crate::color::ElementColor;
use crate::element::{
    now_ms, BoardId, Element, ElementId, ElementPatch, ElementRow, ElementType, TimestampMs,
    UserId,
};
use crate::frames::{reconcile_element_moved, reconcile_frame_moved, MembershipChange};
use crate::gesture::{Gesture, GestureAction, GestureController, Modifiers, Selection, Tool};
use crate::presence::{PeerCursor, PresenceTracker};
use crate::store::BoardStore;
use crate::sync::{
    BroadcastIntake, CommandOutcome, Envelope, RowChange, StoreCommand, SyncEffect, SyncReconciler,
};

/// World-unit offset applied to duplicated and pasted elements.
pub const DUPLICATE_OFFSET: f64 = 24.0;
/// Wheel-zoom sensitivity: scroll delta per doubling-ish of zoom.
const WHEEL_ZOOM_DIVISOR: f64 = 500.0;

/// Validation failures rejected before any mutation is attempted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MutationError {
    #[error("element not found: {0}")]
    UnknownElement(ElementId),
    #[error("a connector needs two distinct endpoints")]
    SelfConnection,
    #[error("element {0} cannot anchor a connector")]
    InvalidEndpoint(ElementId),
    #[error("only the creator may delete element {0}")]
    NotOwner(ElementId),
    #[error("a freehand stroke needs at least two points")]
    TooFewPoints,
}

/// Notifications the host drains once per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Selection membership or primary changed.
    SelectionChanged {
        primary: Option<ElementId>,
        selected: Vec<ElementId>,
    },
    /// A create persisted; the temporary id was swapped for the server id.
    ElementConfirmed { temp_id: ElementId, id: ElementId },
    /// The host should open its inline text editor on this element.
    TextEditRequested(ElementId),
    /// A failed update or delete left local state untrustworthy; the host
    /// should fetch fresh rows and call [`BoardEngine::load_rows`].
    ReloadRequired,
    /// A peer appeared or went silent.
    PeersChanged,
    /// Frames per second, sampled once per second.
    FpsReport(f64),
}

/// Collaborative canvas engine for one board and one local user.
pub struct BoardEngine {
    store: BoardStore,
    camera: Camera,
    gesture: GestureController,
    sync: SyncReconciler,
    presence: PresenceTracker,
    clipboard: Vec<Element>,
    events: Vec<EngineEvent>,
    /// Latest local cursor in world space, waiting on the send throttle.
    cursor_pending: Option<Point>,
    frames_since_report: u32,
    fps_window_start_ms: Option<TimestampMs>,
}

impl BoardEngine {
    pub fn new(board_id: BoardId, user_id: UserId) -> Self {
        Self {
            store: BoardStore::new(board_id),
            camera: Camera::new(),
            gesture: GestureController::new(user_id),
            sync: SyncReconciler::new(user_id),
            presence: PresenceTracker::new(),
            clipboard: Vec::new(),
            events: Vec::new(),
            cursor_pending: None,
            frames_since_report: 0,
            fps_window_start_ms: None,
        }
    }

    pub fn board_id(&self) -> BoardId {
        self.store.board_id()
    }

    pub fn user_id(&self) -> UserId {
        self.sync.user_id()
    }

    pub fn store(&self) -> &BoardStore {
        &self.store
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn selection(&self) -> &Selection {
        self.gesture.selection()
    }

    pub fn gesture(&self) -> &Gesture {
        self.gesture.gesture()
    }

    pub fn hover(&self) -> Option<ElementId> {
        self.gesture.hover()
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerCursor> {
        self.presence.peers()
    }

    // ---- board data ----

    /// Replace the whole board from authoritative rows, clearing any
    /// reload latch and dropping selection entries that no longer exist.
    pub fn load_rows(&mut self, rows: Vec<ElementRow>) {
        let elements: Vec<Element> = rows.into_iter().map(ElementRow::into_element).collect();
        info!(
            "loading {} elements for board {}",
            elements.len(),
            self.store.board_id()
        );
        self.store.load(elements);
        self.sync.acknowledge_reload();
        if self.gesture.prune_missing(&self.store) {
            self.emit_selection_changed();
        }
    }

    // ---- viewport and tool ----

    pub fn viewport(&self) -> Viewport {
        self.camera.viewport()
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.camera.set_viewport(viewport);
    }

    /// Center the board's content in a viewport of `size` pixels.
    pub fn fit_to_content(&mut self, size: Size, padding: f64) {
        if let Some(bounds) = self.store.content_bounds() {
            self.camera.fit_to_bounds(bounds, size, padding);
        }
    }

    pub fn tool(&self) -> Tool {
        self.gesture.tool()
    }

    pub fn set_tool(&mut self, tool: Tool) {
        self.gesture.set_tool(&mut self.store, tool);
    }

    // ---- pointer and keyboard ----

    pub fn pointer_down(&mut self, screen: Point, mods: Modifiers) {
        let actions = self
            .gesture
            .pointer_down(&mut self.store, &self.camera, screen, mods);
        self.route_actions(actions);
    }

    pub fn pointer_moved(&mut self, screen: Point, mods: Modifiers) {
        let actions = self
            .gesture
            .pointer_moved(&mut self.store, &mut self.camera, screen, mods);
        self.cursor_pending = Some(self.camera.screen_to_world(screen));
        self.route_actions(actions);
    }

    pub fn pointer_up(&mut self, screen: Point, mods: Modifiers) {
        let actions = self
            .gesture
            .pointer_up(&mut self.store, &self.camera, screen, mods);
        self.route_actions(actions);
    }

    pub fn double_click(&mut self, screen: Point) {
        let actions = self.gesture.double_click(&mut self.store, &self.camera, screen);
        self.route_actions(actions);
    }

    /// Report the local cursor in world coordinates, for hosts that track
    /// it outside the pointer events. Broadcast on the next tick, subject
    /// to the send throttle.
    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        self.cursor_pending = Some(Point::new(x, y));
    }

    /// Wheel input: plain scroll pans, ctrl/meta-scroll zooms about the
    /// pointer.
    pub fn wheel(&mut self, screen: Point, delta: Vec2, mods: Modifiers) {
        if mods.ctrl || mods.meta {
            let factor = (-delta.y / WHEEL_ZOOM_DIVISOR).exp();
            self.camera.zoom_at(screen, factor);
        } else {
            self.camera.pan(Vec2::new(-delta.x, -delta.y));
        }
    }

    /// Escape: abandon the gesture in flight, or deselect when idle.
    pub fn escape(&mut self) {
        if matches!(self.gesture.gesture(), Gesture::Idle) {
            if self.gesture.clear_selection() {
                self.emit_selection_changed();
            }
        } else {
            self.gesture.cancel(&mut self.store);
        }
    }

    /// Delete every selected element. Refused unless the local user
    /// created all selected non-connectors.
    pub fn delete_selection(&mut self) -> Result<(), MutationError> {
        let ids: Vec<ElementId> = self.gesture.selection().ids().to_vec();
        for &id in &ids {
            let Some(element) = self.store.get(id) else {
                continue;
            };
            if !element.is_connector() && element.created_by != self.user_id() {
                return Err(MutationError::NotOwner(id));
            }
        }
        for id in ids {
            match self.delete(id) {
                // Cascaded connector deletes may empty an id first.
                Ok(()) | Err(MutationError::UnknownElement(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // ---- text editing ----

    /// Open the inline editor on `id`. Also the entry point for another
    /// subsystem that created a text element and wants focus on it.
    pub fn open_text_editor(&mut self, id: ElementId) {
        let already = matches!(
            self.gesture.gesture(),
            Gesture::EditingText { id: active, .. } if *active == id
        );
        if already {
            return;
        }
        let actions = self.gesture.begin_text_edit(&mut self.store, id);
        for action in actions {
            match action {
                // The host asked; no need to echo the request back.
                GestureAction::TextEditRequested(_) => {}
                other => self.route_action(other),
            }
        }
    }

    pub fn preview_text(&mut self, text: &str) {
        self.gesture.preview_text(&mut self.store, text);
    }

    pub fn commit_text(&mut self, text: &str) {
        let actions = self.gesture.commit_text(&mut self.store, text);
        self.route_actions(actions);
    }

    pub fn cancel_text_edit(&mut self) {
        self.gesture.cancel_text_edit(&mut self.store);
    }

    // ---- host-driven mutations ----

    /// Create an element at a world position, using per-type default
    /// dimensions when none are given. Returns the temporary id; watch
    /// for [`EngineEvent::ElementConfirmed`] to learn the server id.
    pub fn create(
        &mut self,
        ty: ElementType,
        x: f64,
        y: f64,
        width: Option<f64>,
        height: Option<f64>,
    ) -> ElementId {
        let (dw, dh) = ty.default_size();
        let element = Element::new(
            ty,
            self.store.board_id(),
            x,
            y,
            width.unwrap_or(dw),
            height.unwrap_or(dh),
            self.user_id(),
        );
        let id = element.id;
        self.insert_new(element);
        if self.gesture.select_only(id) {
            self.emit_selection_changed();
        }
        id
    }

    /// Create a connector between two existing, connectable elements.
    pub fn create_connector(
        &mut self,
        from: ElementId,
        to: ElementId,
    ) -> Result<ElementId, MutationError> {
        if from == to {
            return Err(MutationError::SelfConnection);
        }
        for id in [from, to] {
            let element = self
                .store
                .get(id)
                .ok_or(MutationError::UnknownElement(id))?;
            if !element.is_connectable() {
                return Err(MutationError::InvalidEndpoint(id));
            }
        }
        let connector = Element::new_connector(self.store.board_id(), from, to, self.user_id());
        let id = connector.id;
        self.insert_new(connector);
        Ok(id)
    }

    /// Create a freehand stroke from world-space points.
    pub fn create_freehand(
        &mut self,
        points: &[Point],
        color: Option<ElementColor>,
    ) -> Result<ElementId, MutationError> {
        if points.len() < 2 {
            return Err(MutationError::TooFewPoints);
        }
        let element = Element::new_freehand(
            self.store.board_id(),
            points,
            color.unwrap_or_else(|| ElementType::Freehand.default_color()),
            self.user_id(),
        );
        let id = element.id;
        self.insert_new(element);
        Ok(id)
    }

    /// Apply a sparse field update and queue its persist call.
    pub fn update(&mut self, id: ElementId, patch: ElementPatch) -> bool {
        let geometric = patch.x.is_some()
            || patch.y.is_some()
            || patch.width.is_some()
            || patch.height.is_some();
        let applied = self.sync.updated_local(&mut self.store, id, patch);
        if applied && geometric {
            self.settle_membership(id);
        }
        applied
    }

    /// Delete an element, cascading to connectors that reference it.
    /// Non-connectors may only be deleted by their creator.
    pub fn delete(&mut self, id: ElementId) -> Result<(), MutationError> {
        let element = self
            .store
            .get(id)
            .ok_or(MutationError::UnknownElement(id))?;
        if !element.is_connector() && element.created_by != self.user_id() {
            return Err(MutationError::NotOwner(id));
        }
        for connector in self.store.connectors_referencing(id) {
            self.sync.deleted_local(&mut self.store, connector);
        }
        self.sync.deleted_local(&mut self.store, id);
        if self.gesture.prune_missing(&self.store) {
            self.emit_selection_changed();
        }
        Ok(())
    }

    /// Re-create `id` offset by a fixed delta, owned by the local user.
    pub fn duplicate(&mut self, id: ElementId) -> Result<ElementId, MutationError> {
        let source = self
            .store
            .get(id)
            .ok_or(MutationError::UnknownElement(id))?
            .clone();
        let copy = self.recreate(&source);
        if self.gesture.select_only(copy) {
            self.emit_selection_changed();
        }
        Ok(copy)
    }

    pub fn bring_to_front(&mut self, id: ElementId) -> bool {
        let z = self.store.z_front();
        self.update(
            id,
            ElementPatch {
                z_index: Some(z),
                ..ElementPatch::default()
            },
        )
    }

    pub fn send_to_back(&mut self, id: ElementId) -> bool {
        let z = self.store.z_back();
        self.update(
            id,
            ElementPatch {
                z_index: Some(z),
                ..ElementPatch::default()
            },
        )
    }

    /// Snapshot the selection into the local clipboard. Not persisted.
    pub fn copy_selection(&mut self) -> usize {
        self.clipboard = self
            .gesture
            .selection()
            .ids()
            .iter()
            .filter_map(|&id| self.store.get(id).cloned())
            .collect();
        self.clipboard.len()
    }

    /// Re-create the clipboard contents, offset, under the local user.
    /// Connectors are skipped: their endpoints would alias the originals.
    pub fn paste(&mut self) -> Vec<ElementId> {
        let snapshot = self.clipboard.clone();
        let mut created = Vec::new();
        for source in &snapshot {
            if source.is_connector() {
                continue;
            }
            created.push(self.recreate(source));
        }
        if !created.is_empty() && self.gesture.select_exactly(created.clone()) {
            self.emit_selection_changed();
        }
        created
    }

    // ---- sync plumbing ----

    /// Fold a persistence completion back in.
    pub fn apply_outcome(&mut self, outcome: CommandOutcome) {
        match self.sync.apply_outcome(&mut self.store, outcome) {
            SyncEffect::None => {}
            SyncEffect::CreateConfirmed { temp_id, id } => {
                self.gesture.remap_id(temp_id, id);
                self.events.push(EngineEvent::ElementConfirmed { temp_id, id });
            }
            SyncEffect::CreateRolledBack { temp_id } => {
                debug!("create of {temp_id} rolled back");
                if self.gesture.prune_missing(&self.store) {
                    self.emit_selection_changed();
                }
            }
            SyncEffect::ReloadRequired => self.events.push(EngineEvent::ReloadRequired),
        }
    }

    /// One event from the authoritative row-change feed.
    pub fn ingest_row_change(&mut self, change: RowChange) {
        if self.sync.ingest_row_change(&mut self.store, change)
            && self.gesture.prune_missing(&self.store)
        {
            self.emit_selection_changed();
        }
    }

    /// One envelope from the peer broadcast channel.
    pub fn ingest_broadcast(&mut self, envelope: Envelope, now_ms: TimestampMs) {
        match self.sync.ingest_broadcast(&mut self.store, envelope) {
            BroadcastIntake::Applied { changed } => {
                if changed && self.gesture.prune_missing(&self.store) {
                    self.emit_selection_changed();
                }
            }
            BroadcastIntake::Cursor {
                user,
                x,
                y,
                sent_at_ms,
            } => {
                let known = self.presence.get(user).is_some();
                self.presence.observe(user, x, y, sent_at_ms, now_ms);
                if !known {
                    self.events.push(EngineEvent::PeersChanged);
                }
            }
            BroadcastIntake::OwnEcho => {}
        }
    }

    /// Pending persistence commands, in order. The host executes each and
    /// reports a [`CommandOutcome`].
    pub fn take_commands(&mut self) -> Vec<StoreCommand> {
        self.sync.take_commands()
    }

    /// Pending peer broadcasts for the host to put on the wire.
    pub fn take_broadcasts(&mut self) -> Vec<Envelope> {
        self.sync.take_broadcasts()
    }

    /// Drain queued notifications.
    pub fn take_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.events)
    }

    // ---- frame tick ----

    /// Once-per-frame housekeeping: advance the rotation fling, expire
    /// silent peers, flush the throttled cursor broadcast, refresh the
    /// spatial index, and sample FPS.
    pub fn tick(&mut self, now_ms: TimestampMs, dt: f64) {
        let actions = self.gesture.tick(&mut self.store, dt);
        self.route_actions(actions);

        if !self.presence.expire(now_ms).is_empty() {
            self.events.push(EngineEvent::PeersChanged);
        }

        if let Some(world) = self.cursor_pending {
            if self.presence.allow_cursor_send(now_ms) {
                self.sync.cursor_moved(world.x, world.y);
                self.cursor_pending = None;
            }
        }

        self.store.refresh_index();
        self.sample_fps(now_ms);
    }

    fn sample_fps(&mut self, now_ms: TimestampMs) {
        self.frames_since_report += 1;
        match self.fps_window_start_ms {
            None => self.fps_window_start_ms = Some(now_ms),
            Some(start) if now_ms.saturating_sub(start) >= 1_000 => {
                let elapsed = now_ms - start;
                let fps = f64::from(self.frames_since_report) * 1000.0 / elapsed as f64;
                self.events.push(EngineEvent::FpsReport(fps));
                self.frames_since_report = 0;
                self.fps_window_start_ms = Some(now_ms);
            }
            Some(_) => {}
        }
    }

    // ---- internals ----

    fn route_actions(&mut self, actions: Vec<GestureAction>) {
        for action in actions {
            self.route_action(action);
        }
    }

    fn route_action(&mut self, action: GestureAction) {
        match action {
            GestureAction::Create(element) => self.insert_new(element),
            GestureAction::Commit { id, patch } => {
                self.sync.updated_local(&mut self.store, id, patch);
            }
            GestureAction::Delete(id) => {
                if let Err(err) = self.delete(id) {
                    debug!("gesture delete of {id} rejected: {err}");
                }
            }
            GestureAction::SelectionChanged => self.emit_selection_changed(),
            GestureAction::TextEditRequested(id) => {
                self.events.push(EngineEvent::TextEditRequested(id));
            }
        }
    }

    /// Stack a new element on top, apply it optimistically, queue its
    /// insert, and settle frame membership for its landing spot.
    fn insert_new(&mut self, mut element: Element) {
        element.z_index = self.store.z_front();
        let id = element.id;
        self.sync.created_local(&mut self.store, element);
        self.settle_membership(id);
    }

    /// Recompute frame containment around `id` after its geometry
    /// changed, persisting any membership moves.
    fn settle_membership(&mut self, id: ElementId) {
        let Some(element) = self.store.get(id) else {
            return;
        };
        let changes: Vec<MembershipChange> = if element.is_frame() {
            reconcile_frame_moved(&self.store, id)
        } else {
            reconcile_element_moved(&self.store, id).into_iter().collect()
        };
        for (member, frame_id) in changes {
            let patch = ElementPatch {
                frame_id: Some(frame_id),
                ..ElementPatch::default()
            };
            self.sync.updated_local(&mut self.store, member, patch);
        }
    }

    fn recreate(&mut self, source: &Element) -> ElementId {
        let now = now_ms();
        let mut element = source.clone();
        element.id = Uuid::new_v4();
        element.x += DUPLICATE_OFFSET;
        element.y += DUPLICATE_OFFSET;
        element.created_by = self.user_id();
        element.created_at = now;
        element.updated_at = now;
        let id = element.id;
        self.insert_new(element);
        id
    }

    fn emit_selection_changed(&mut self) {
        let selection = self.gesture.selection();
        self.events.push(EngineEvent::SelectionChanged {
            primary: selection.primary(),
            selected: selection.ids().to_vec(),
        });
    }
}
