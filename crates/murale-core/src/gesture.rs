//! Pointer-driven manipulation state machine.
//!
//! One controller owns the active tool, the selection, and the current
//! gesture. Pointer events mutate the store live (drag positions, resize
//! boxes, rotation previews) so the next frame reflects them, and each
//! finished gesture is reported as [`GestureAction`]s for the engine to
//! persist and broadcast.

use std::mem;

use kurbo::{Point, Rect};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::element::{Element, ElementId, ElementKind, ElementPatch, ElementType, UserId};
use crate::frames::{reconcile_element_moved, reconcile_frame_moved};
use crate::geometry::{normalize_deg, rect_contains_rect};
use crate::handles::{
    apply_resize, handle_at, rotation_from_pointer, snap_rotation, HandleKind,
    HANDLE_HIT_TOLERANCE_PX,
};
use crate::hittest::{anchor_at_world, edge_anchors, hit_test_screen, EdgeAnchor, ANCHOR_RADIUS_PX};
use crate::store::BoardStore;

/// Dragged-out shapes below this size (world units) are discarded as
/// accidental clicks.
pub const MIN_DRAWN_SIZE: f64 = 4.0;
/// Squared world distance a freehand stroke must travel before another
/// point is recorded.
pub const FREEHAND_MIN_DIST_SQ: f64 = 4.0;
/// Release velocity (degrees per second) above which a rotation keeps
/// spinning after the pointer lifts.
pub const FLING_START_DEG_PER_SEC: f64 = 45.0;
/// Per-frame decay factor of a fling at 60Hz.
pub const FLING_DECAY: f64 = 0.92;
/// A fling below this speed (degrees per second) stops and commits.
pub const FLING_STOP_DEG_PER_SEC: f64 = 2.0;

/// Active tool. Gates which gesture a pointer-down may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Select,
    Sticky,
    Rectangle,
    Circle,
    Line,
    Text,
    Frame,
    Connector,
    Pen,
    Eraser,
}

impl Tool {
    /// Element type this tool places or drags out, if any.
    fn element_type(self) -> Option<ElementType> {
        match self {
            Tool::Sticky => Some(ElementType::Sticky),
            Tool::Rectangle => Some(ElementType::Rectangle),
            Tool::Circle => Some(ElementType::Circle),
            Tool::Line => Some(ElementType::Line),
            Tool::Text => Some(ElementType::Text),
            Tool::Frame => Some(ElementType::Frame),
            _ => None,
        }
    }
}

/// Keyboard modifier state attached to pointer events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// Ordered multi-selection. The last id is the primary.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    ids: Vec<ElementId>,
}

impl Selection {
    pub fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    pub fn primary(&self) -> Option<ElementId> {
        self.ids.last().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, id: ElementId) -> bool {
        self.ids.contains(&id)
    }

    /// Returns true when the selection changed.
    pub fn clear(&mut self) -> bool {
        if self.ids.is_empty() {
            return false;
        }
        self.ids.clear();
        true
    }

    /// Make `id` the only selected element. Returns true on change.
    pub fn replace(&mut self, id: ElementId) -> bool {
        if self.ids.as_slice() == [id] {
            return false;
        }
        self.ids = vec![id];
        true
    }

    /// Replace the whole selection. Returns true on change.
    pub fn replace_all(&mut self, ids: Vec<ElementId>) -> bool {
        if self.ids == ids {
            return false;
        }
        self.ids = ids;
        true
    }

    /// Add or remove one id, keeping insertion order. Always a change.
    pub fn toggle(&mut self, id: ElementId) {
        if let Some(pos) = self.ids.iter().position(|&i| i == id) {
            self.ids.remove(pos);
        } else {
            self.ids.push(id);
        }
    }

    pub fn remove(&mut self, id: ElementId) -> bool {
        let Some(pos) = self.ids.iter().position(|&i| i == id) else {
            return false;
        };
        self.ids.remove(pos);
        true
    }

    fn remap(&mut self, from: ElementId, to: ElementId) {
        for id in &mut self.ids {
            if *id == from {
                *id = to;
            }
        }
    }

    /// Drop ids no longer present in the store. Returns true on change.
    pub fn retain_existing(&mut self, store: &BoardStore) -> bool {
        let before = self.ids.len();
        self.ids.retain(|&id| store.contains(id));
        self.ids.len() != before
    }
}

/// Current gesture. Preview geometry (marquee box, connector ghost,
/// freehand polyline) is read straight from these variants by the
/// renderer.
#[derive(Debug, Clone, Default)]
pub enum Gesture {
    #[default]
    Idle,
    Panning {
        last_screen: Point,
        moved: bool,
    },
    Dragging {
        start_world: Point,
        /// Grab-time origin per dragged element, selection order first,
        /// then members of dragged frames.
        start_positions: Vec<(ElementId, Point)>,
        moved: bool,
    },
    Resizing {
        id: ElementId,
        handle: HandleKind,
        start: Box<Element>,
    },
    Rotating {
        id: ElementId,
        center: Point,
        grab: Point,
        start_rotation: f64,
        /// Unsnapped angle from the previous move, for velocity sampling.
        last_angle: f64,
        /// Smoothed per-move angular delta in degrees.
        velocity: f64,
    },
    DrawingShape {
        ty: ElementType,
        start: Point,
        current: Point,
    },
    DrawingFreehand {
        points: Vec<Point>,
    },
    Connecting {
        from: EdgeAnchor,
        current: Point,
        target: Option<EdgeAnchor>,
    },
    MarqueeSelecting {
        start: Point,
        current: Point,
    },
    EditingText {
        id: ElementId,
        original: String,
    },
    Erasing,
}

/// What a gesture asks the engine to do once it completes.
#[derive(Debug, Clone, PartialEq)]
pub enum GestureAction {
    /// Persist a new element. Its id is still the local temporary one.
    Create(Element),
    /// Persist fields that finished changing.
    Commit { id: ElementId, patch: ElementPatch },
    /// Delete, subject to the engine's ownership rules.
    Delete(ElementId),
    /// Selection membership or primary changed.
    SelectionChanged,
    /// The host should open its inline text editor for this element.
    TextEditRequested(ElementId),
}

/// Rotation still spinning after pointer release. Stepped by `tick`.
#[derive(Debug, Clone, Copy)]
struct Fling {
    id: ElementId,
    /// Signed degrees per second.
    velocity: f64,
}

/// Owns tool, selection, and gesture state for one local user.
#[derive(Debug)]
pub struct GestureController {
    user_id: UserId,
    tool: Tool,
    gesture: Gesture,
    selection: Selection,
    hover: Option<ElementId>,
    fling: Option<Fling>,
}

impl GestureController {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            tool: Tool::Select,
            gesture: Gesture::Idle,
            selection: Selection::default(),
            hover: None,
            fling: None,
        }
    }

    pub fn tool(&self) -> Tool {
        self.tool
    }

    pub fn gesture(&self) -> &Gesture {
        &self.gesture
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn hover(&self) -> Option<ElementId> {
        self.hover
    }

    /// Make `id` the only selected element. Returns true on change.
    pub fn select_only(&mut self, id: ElementId) -> bool {
        self.selection.replace(id)
    }

    /// Replace the selection outright. Returns true on change.
    pub fn select_exactly(&mut self, ids: Vec<ElementId>) -> bool {
        self.selection.replace_all(ids)
    }

    pub fn clear_selection(&mut self) -> bool {
        self.selection.clear()
    }

    /// Switch tools, cancelling any gesture in flight.
    pub fn set_tool(&mut self, store: &mut BoardStore, tool: Tool) {
        if self.tool != tool {
            self.cancel(store);
            self.tool = tool;
        }
    }

    pub fn pointer_down(
        &mut self,
        store: &mut BoardStore,
        camera: &Camera,
        screen: Point,
        mods: Modifiers,
    ) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        // A click outside the editor commits the text session first.
        if matches!(self.gesture, Gesture::EditingText { .. }) {
            actions.extend(self.commit_text_session(store));
        }
        let world = camera.screen_to_world(screen);

        match self.tool {
            Tool::Select => self.select_down(store, camera, screen, world, mods, &mut actions),
            Tool::Sticky | Tool::Text => {
                self.place_at(store, world, &mut actions);
            }
            Tool::Rectangle | Tool::Circle | Tool::Line | Tool::Frame => {
                if let Some(ty) = self.tool.element_type() {
                    self.gesture = Gesture::DrawingShape {
                        ty,
                        start: world,
                        current: world,
                    };
                }
            }
            Tool::Pen => {
                self.gesture = Gesture::DrawingFreehand {
                    points: vec![world],
                };
            }
            Tool::Connector => self.connector_down(store, camera, screen, world),
            Tool::Eraser => {
                if let Some(id) = hit_test_screen(store, camera, screen) {
                    actions.push(GestureAction::Delete(id));
                }
                self.gesture = Gesture::Erasing;
            }
        }
        actions
    }

    pub fn pointer_moved(
        &mut self,
        store: &mut BoardStore,
        camera: &mut Camera,
        screen: Point,
        mods: Modifiers,
    ) -> Vec<GestureAction> {
        let world = camera.screen_to_world(screen);
        let mut actions = Vec::new();

        match &mut self.gesture {
            Gesture::Idle => {
                self.hover = match self.tool {
                    Tool::Select | Tool::Eraser => hit_test_screen(store, camera, screen),
                    _ => None,
                };
            }
            Gesture::Panning { last_screen, moved } => {
                camera.pan(screen - *last_screen);
                *last_screen = screen;
                *moved = true;
            }
            Gesture::Dragging {
                start_world,
                start_positions,
                moved,
            } => {
                let delta = world - *start_world;
                if delta.x != 0.0 || delta.y != 0.0 {
                    *moved = true;
                }
                for (id, origin) in start_positions.iter() {
                    if let Some(element) = store.get_mut(*id) {
                        element.x = origin.x + delta.x;
                        element.y = origin.y + delta.y;
                    }
                }
            }
            Gesture::Resizing { id, handle, start } => {
                if let Some(resized) = apply_resize(start, *handle, world) {
                    if let Some(element) = store.get_mut(*id) {
                        element.x = resized.x;
                        element.y = resized.y;
                        element.width = resized.width;
                        element.height = resized.height;
                        if matches!(resized.kind, ElementKind::Freehand { .. }) {
                            element.kind = resized.kind;
                        }
                    }
                }
            }
            Gesture::Rotating {
                id,
                center,
                grab,
                start_rotation,
                last_angle,
                velocity,
            } => {
                let raw = rotation_from_pointer(*center, *grab, world, *start_rotation);
                let mut delta = raw - *last_angle;
                while delta > 180.0 {
                    delta -= 360.0;
                }
                while delta < -180.0 {
                    delta += 360.0;
                }
                *velocity = *velocity * 0.7 + delta * 0.3;
                *last_angle = raw;
                if let Some(element) = store.get_mut(*id) {
                    element.set_rotation(snap_rotation(raw, mods.shift));
                }
            }
            Gesture::DrawingShape { current, .. } => *current = world,
            Gesture::DrawingFreehand { points } => {
                let far_enough = points
                    .last()
                    .is_none_or(|last| (world - *last).hypot2() > FREEHAND_MIN_DIST_SQ);
                if far_enough {
                    points.push(world);
                }
            }
            Gesture::Connecting { from, current, target } => {
                *current = world;
                let radius = camera.screen_len_to_world(ANCHOR_RADIUS_PX);
                *target = anchor_at_world(store, world, radius)
                    .filter(|anchor| anchor.element_id != from.element_id);
            }
            Gesture::MarqueeSelecting { current, .. } => *current = world,
            Gesture::Erasing => {
                if let Some(id) = hit_test_screen(store, camera, screen) {
                    actions.push(GestureAction::Delete(id));
                }
            }
            Gesture::EditingText { .. } => {}
        }
        actions
    }

    pub fn pointer_up(
        &mut self,
        store: &mut BoardStore,
        camera: &Camera,
        screen: Point,
        _mods: Modifiers,
    ) -> Vec<GestureAction> {
        let world = camera.screen_to_world(screen);
        let mut actions = Vec::new();

        match mem::take(&mut self.gesture) {
            Gesture::Idle | Gesture::Erasing => {}
            Gesture::Panning { moved, .. } => {
                // A clean click on empty space deselects.
                if !moved && self.selection.clear() {
                    actions.push(GestureAction::SelectionChanged);
                }
            }
            Gesture::Dragging {
                start_positions,
                moved,
                ..
            } => {
                if moved {
                    self.commit_moved(store, &start_positions, &mut actions);
                }
            }
            Gesture::Resizing { id, .. } => {
                self.commit_resized(store, id, &mut actions);
            }
            Gesture::Rotating { id, velocity, .. } => {
                let deg_per_sec = velocity * 60.0;
                if deg_per_sec.abs() >= FLING_START_DEG_PER_SEC {
                    self.fling = Some(Fling {
                        id,
                        velocity: deg_per_sec,
                    });
                } else if let Some(element) = store.get(id) {
                    actions.push(GestureAction::Commit {
                        id,
                        patch: ElementPatch {
                            rotation: Some(element.rotation()),
                            ..ElementPatch::default()
                        },
                    });
                }
            }
            Gesture::DrawingShape { ty, start, .. } => {
                self.finish_drawn_shape(store, ty, start, world, &mut actions);
            }
            Gesture::DrawingFreehand { points } => {
                if points.len() >= 2 {
                    let element = Element::new_freehand(
                        store.board_id(),
                        &points,
                        ElementType::Freehand.default_color(),
                        self.user_id,
                    );
                    actions.push(GestureAction::Create(element));
                }
                // Pen stays armed for the next stroke.
            }
            Gesture::Connecting { from, target, .. } => {
                if let Some(target) = target {
                    let connector = Element::new_connector(
                        store.board_id(),
                        from.element_id,
                        target.element_id,
                        self.user_id,
                    );
                    let id = connector.id;
                    actions.push(GestureAction::Create(connector));
                    if self.selection.replace(id) {
                        actions.push(GestureAction::SelectionChanged);
                    }
                    if self.tool == Tool::Connector {
                        self.tool = Tool::Select;
                    }
                }
            }
            Gesture::MarqueeSelecting { start, current } => {
                self.finish_marquee(store, start, current, &mut actions);
            }
            editing @ Gesture::EditingText { .. } => {
                // Editing outlives pointer events; put it back.
                self.gesture = editing;
            }
        }
        actions
    }

    /// Double-click with the select tool opens the text editor on
    /// editable kinds.
    pub fn double_click(
        &mut self,
        store: &mut BoardStore,
        camera: &Camera,
        screen: Point,
    ) -> Vec<GestureAction> {
        if self.tool != Tool::Select {
            return Vec::new();
        }
        let Some(id) = hit_test_screen(store, camera, screen) else {
            return Vec::new();
        };
        self.begin_text_edit(store, id)
    }

    /// Start an inline text session on `id`, remembering the pre-edit
    /// text so escape can restore it.
    pub fn begin_text_edit(&mut self, store: &mut BoardStore, id: ElementId) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        let Some(element) = store.get(id) else {
            return actions;
        };
        if !element.is_text_bearing() {
            return actions;
        }
        let original = element.text.clone();
        if matches!(self.gesture, Gesture::EditingText { .. }) {
            actions.extend(self.commit_text_session(store));
        }
        self.gesture = Gesture::EditingText { id, original };
        if self.selection.replace(id) {
            actions.push(GestureAction::SelectionChanged);
        }
        actions.push(GestureAction::TextEditRequested(id));
        actions
    }

    /// Live text while typing, so frames render the draft.
    pub fn preview_text(&mut self, store: &mut BoardStore, text: &str) {
        if let Gesture::EditingText { id, .. } = &self.gesture {
            if let Some(element) = store.get_mut(*id) {
                element.text = text.to_string();
            }
        }
    }

    /// Commit the text session with `text` as the final value.
    pub fn commit_text(&mut self, store: &mut BoardStore, text: &str) -> Vec<GestureAction> {
        if let Gesture::EditingText { id, .. } = &self.gesture {
            let id = *id;
            if let Some(element) = store.get_mut(id) {
                element.text = text.to_string();
            }
        }
        self.commit_text_session(store)
    }

    /// Drop the text session, restoring the pre-edit value.
    pub fn cancel_text_edit(&mut self, store: &mut BoardStore) {
        if let Gesture::EditingText { id, original } = mem::take(&mut self.gesture) {
            if let Some(element) = store.get_mut(id) {
                element.text = original;
            }
        }
    }

    /// Escape: abandon the gesture and restore any live-mutated state.
    pub fn cancel(&mut self, store: &mut BoardStore) {
        match mem::take(&mut self.gesture) {
            Gesture::Dragging {
                start_positions, ..
            } => {
                for (id, origin) in start_positions {
                    if let Some(element) = store.get_mut(id) {
                        element.x = origin.x;
                        element.y = origin.y;
                    }
                }
            }
            Gesture::Resizing { id, start, .. } => {
                if let Some(element) = store.get_mut(id) {
                    element.x = start.x;
                    element.y = start.y;
                    element.width = start.width;
                    element.height = start.height;
                    element.kind = start.kind;
                }
            }
            Gesture::Rotating {
                id, start_rotation, ..
            } => {
                if let Some(element) = store.get_mut(id) {
                    element.set_rotation(start_rotation);
                }
            }
            Gesture::EditingText { id, original } => {
                if let Some(element) = store.get_mut(id) {
                    element.text = original;
                }
            }
            _ => {}
        }
    }

    /// Advance the rotation fling, if any. `dt` is seconds since the
    /// previous frame.
    pub fn tick(&mut self, store: &mut BoardStore, dt: f64) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        let Some(fling) = &mut self.fling else {
            return actions;
        };
        let Some(element) = store.get_mut(fling.id) else {
            self.fling = None;
            return actions;
        };
        let next = normalize_deg(element.rotation() + fling.velocity * dt);
        fling.velocity *= FLING_DECAY.powf(dt * 60.0);
        if fling.velocity.abs() < FLING_STOP_DEG_PER_SEC {
            let settled = snap_rotation(next, false);
            element.set_rotation(settled);
            actions.push(GestureAction::Commit {
                id: fling.id,
                patch: ElementPatch {
                    rotation: Some(settled),
                    ..ElementPatch::default()
                },
            });
            self.fling = None;
        } else {
            element.set_rotation(next);
        }
        actions
    }

    /// Point the controller at an element's confirmed id after the
    /// temporary one is replaced.
    pub fn remap_id(&mut self, from: ElementId, to: ElementId) {
        self.selection.remap(from, to);
        if self.hover == Some(from) {
            self.hover = Some(to);
        }
        if let Some(fling) = &mut self.fling {
            if fling.id == from {
                fling.id = to;
            }
        }
        match &mut self.gesture {
            Gesture::Dragging {
                start_positions, ..
            } => {
                for (id, _) in start_positions.iter_mut() {
                    if *id == from {
                        *id = to;
                    }
                }
            }
            Gesture::Resizing { id, .. }
            | Gesture::Rotating { id, .. }
            | Gesture::EditingText { id, .. } => {
                if *id == from {
                    *id = to;
                }
            }
            _ => {}
        }
    }

    /// Forget state that points at elements no longer in the store.
    /// Returns true when the selection changed.
    pub fn prune_missing(&mut self, store: &BoardStore) -> bool {
        let changed = self.selection.retain_existing(store);
        if self.hover.is_some_and(|id| !store.contains(id)) {
            self.hover = None;
        }
        if self.fling.is_some_and(|f| !store.contains(f.id)) {
            self.fling = None;
        }
        if let Gesture::EditingText { id, .. } = &self.gesture {
            if !store.contains(*id) {
                self.gesture = Gesture::Idle;
            }
        }
        changed
    }

    fn select_down(
        &mut self,
        store: &mut BoardStore,
        camera: &Camera,
        screen: Point,
        world: Point,
        mods: Modifiers,
        actions: &mut Vec<GestureAction>,
    ) {
        // Handles of the primary selection win over everything under them.
        if let Some(primary) = self.selection.primary() {
            if let Some(element) = store.get(primary) {
                let tolerance = camera.screen_len_to_world(HANDLE_HIT_TOLERANCE_PX);
                match handle_at(element, world, tolerance) {
                    Some(HandleKind::Rotate) => {
                        let center = element.center();
                        self.gesture = Gesture::Rotating {
                            id: primary,
                            center,
                            grab: world,
                            start_rotation: element.rotation(),
                            last_angle: element.rotation(),
                            velocity: 0.0,
                        };
                        return;
                    }
                    Some(handle) => {
                        self.gesture = Gesture::Resizing {
                            id: primary,
                            handle,
                            start: Box::new(element.clone()),
                        };
                        return;
                    }
                    None => {}
                }
            }
        }

        // Edge anchors start a connection even with the select tool.
        let radius = camera.screen_len_to_world(ANCHOR_RADIUS_PX);
        if let Some(anchor) = anchor_at_world(store, world, radius) {
            self.gesture = Gesture::Connecting {
                from: anchor,
                current: world,
                target: None,
            };
            return;
        }

        match hit_test_screen(store, camera, screen) {
            Some(id) => {
                if mods.shift {
                    self.selection.toggle(id);
                    actions.push(GestureAction::SelectionChanged);
                    if !self.selection.contains(id) {
                        // Shift-click removal does not start a drag.
                        return;
                    }
                } else if !self.selection.contains(id) && self.selection.replace(id) {
                    actions.push(GestureAction::SelectionChanged);
                }
                self.gesture = Gesture::Dragging {
                    start_world: world,
                    start_positions: self.drag_set(store),
                    moved: false,
                };
            }
            None => {
                if mods.shift {
                    self.gesture = Gesture::MarqueeSelecting {
                        start: world,
                        current: world,
                    };
                } else {
                    self.gesture = Gesture::Panning {
                        last_screen: screen,
                        moved: false,
                    };
                }
            }
        }
    }

    /// Selected elements plus the members of any selected frame, with
    /// their grab-time origins.
    fn drag_set(&self, store: &BoardStore) -> Vec<(ElementId, Point)> {
        let mut set: Vec<(ElementId, Point)> = Vec::new();
        let mut push = |set: &mut Vec<(ElementId, Point)>, id: ElementId| {
            if set.iter().any(|(existing, _)| *existing == id) {
                return;
            }
            if let Some(element) = store.get(id) {
                set.push((id, Point::new(element.x, element.y)));
            }
        };
        for &id in self.selection.ids() {
            push(&mut set, id);
            if store.get(id).is_some_and(Element::is_frame) {
                for member in store.frame_members(id) {
                    push(&mut set, member);
                }
            }
        }
        set
    }

    fn connector_down(
        &mut self,
        store: &BoardStore,
        camera: &Camera,
        screen: Point,
        world: Point,
    ) {
        let Some(id) = hit_test_screen(store, camera, screen) else {
            return;
        };
        let Some(element) = store.get(id) else {
            return;
        };
        if !element.is_connectable() {
            return;
        }
        // Grab the nearest of the four anchors, not only one in radius.
        let nearest = edge_anchors(element)
            .into_iter()
            .min_by(|a, b| (a.1 - world).hypot().total_cmp(&(b.1 - world).hypot()));
        if let Some((side, position)) = nearest {
            self.gesture = Gesture::Connecting {
                from: EdgeAnchor {
                    element_id: id,
                    side,
                    position,
                },
                current: world,
                target: None,
            };
        }
    }

    /// Click-to-place tools: sticky and text drop a default-sized element
    /// centered on the pointer.
    fn place_at(&mut self, store: &BoardStore, world: Point, actions: &mut Vec<GestureAction>) {
        let Some(ty) = self.tool.element_type() else {
            return;
        };
        let (w, h) = ty.default_size();
        let element = Element::new(
            ty,
            store.board_id(),
            world.x - w / 2.0,
            world.y - h / 2.0,
            w,
            h,
            self.user_id,
        );
        let id = element.id;
        actions.push(GestureAction::Create(element));
        if self.selection.replace(id) {
            actions.push(GestureAction::SelectionChanged);
        }
        if ty == ElementType::Text {
            actions.push(GestureAction::TextEditRequested(id));
        }
        self.tool = Tool::Select;
    }

    fn finish_drawn_shape(
        &mut self,
        store: &BoardStore,
        ty: ElementType,
        start: Point,
        end: Point,
        actions: &mut Vec<GestureAction>,
    ) {
        let element = if ty == ElementType::Line {
            // Lines keep the drawn direction as signed extents.
            if (end - start).hypot() < MIN_DRAWN_SIZE {
                debug!("discarding {:?} drag below minimum size", ty);
                return;
            }
            Element::new(
                ty,
                store.board_id(),
                start.x,
                start.y,
                end.x - start.x,
                end.y - start.y,
                self.user_id,
            )
        } else {
            let rect = Rect::from_points(start, end);
            if rect.width().max(rect.height()) < MIN_DRAWN_SIZE {
                debug!("discarding {:?} drag below minimum size", ty);
                return;
            }
            Element::new(
                ty,
                store.board_id(),
                rect.x0,
                rect.y0,
                rect.width(),
                rect.height(),
                self.user_id,
            )
        };
        let id = element.id;
        actions.push(GestureAction::Create(element));
        if self.selection.replace(id) {
            actions.push(GestureAction::SelectionChanged);
        }
        self.tool = Tool::Select;
    }

    fn finish_marquee(
        &mut self,
        store: &BoardStore,
        start: Point,
        end: Point,
        actions: &mut Vec<GestureAction>,
    ) {
        let rect = Rect::from_points(start, end);
        let candidates = store.candidates_in_rect(rect);
        // Z order, so the topmost contained element becomes primary.
        let picked: Vec<ElementId> = store
            .ordered()
            .filter(|e| {
                candidates.contains(&e.id)
                    && !e.is_connector()
                    && !matches!(e.kind, ElementKind::Freehand { .. })
                    && rect_contains_rect(rect, e.bounds())
            })
            .map(|e| e.id)
            .collect();
        if self.selection.replace_all(picked) {
            actions.push(GestureAction::SelectionChanged);
        }
    }

    /// Commits for a finished drag: every dragged element's final origin,
    /// folded together with any frame membership changes.
    fn commit_moved(
        &self,
        store: &BoardStore,
        dragged: &[(ElementId, Point)],
        actions: &mut Vec<GestureAction>,
    ) {
        let mut commits: Vec<(ElementId, ElementPatch)> = Vec::new();
        for (id, _) in dragged {
            if let Some(element) = store.get(*id) {
                commits.push((*id, ElementPatch::move_to(element.x, element.y)));
            }
        }
        self.merge_membership(store, dragged.iter().map(|(id, _)| *id), &mut commits);
        actions.extend(
            commits
                .into_iter()
                .map(|(id, patch)| GestureAction::Commit { id, patch }),
        );
    }

    fn commit_resized(
        &self,
        store: &BoardStore,
        id: ElementId,
        actions: &mut Vec<GestureAction>,
    ) {
        let Some(element) = store.get(id) else {
            return;
        };
        let mut patch = ElementPatch::place(element.x, element.y, element.width, element.height);
        if let ElementKind::Freehand { points, .. } = &element.kind {
            patch.points = Some(points.iter().map(|p| (p.x, p.y)).collect());
        }
        let mut commits = vec![(id, patch)];
        self.merge_membership(store, std::iter::once(id), &mut commits);
        actions.extend(
            commits
                .into_iter()
                .map(|(id, patch)| GestureAction::Commit { id, patch }),
        );
    }

    /// Run containment reconciliation for the moved ids and fold the
    /// resulting `frame_id` changes into `commits`, one patch per element.
    fn merge_membership<I: Iterator<Item = ElementId>>(
        &self,
        store: &BoardStore,
        moved: I,
        commits: &mut Vec<(ElementId, ElementPatch)>,
    ) {
        let mut changes = Vec::new();
        for id in moved {
            let Some(element) = store.get(id) else {
                continue;
            };
            if element.is_frame() {
                changes.extend(reconcile_frame_moved(store, id));
            } else if let Some(change) = reconcile_element_moved(store, id) {
                changes.push(change);
            }
        }
        for (id, frame_id) in changes {
            match commits.iter_mut().find(|(existing, _)| *existing == id) {
                Some((_, patch)) => patch.frame_id = Some(frame_id),
                None => commits.push((
                    id,
                    ElementPatch {
                        frame_id: Some(frame_id),
                        ..ElementPatch::default()
                    },
                )),
            }
        }
    }

    fn commit_text_session(&mut self, store: &mut BoardStore) -> Vec<GestureAction> {
        let mut actions = Vec::new();
        let Gesture::EditingText { id, original } = mem::take(&mut self.gesture) else {
            return actions;
        };
        let Some(element) = store.get(id) else {
            return actions;
        };
        if element.text != original {
            actions.push(GestureAction::Commit {
                id,
                patch: ElementPatch {
                    text: Some(element.text.clone()),
                    ..ElementPatch::default()
                },
            });
        }
        actions
    }
}
