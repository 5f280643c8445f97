//! Pointer gesture state machine: tells clicks from drags, and runs drags and
//! resizes against the node records and their rendered form.
//!
//! A press on a node's drag surface is only a *potential* drag until the
//! pointer leaves a small square around the press point. A release counts as a
//! click when the pointer never left that square and the press was short; a
//! slow press-and-release in place is neither a click nor a drag.

use std::time::{Duration, Instant};

use egui::{Pos2, Vec2, vec2};

use super::connections::ConnectionManager;
use super::node_store::{NodeId, NodeStore};
use super::surface::{Layer, RenderSurface};
use super::view_state::{self, MIN_EXPANDED_SIZE, MINIMUM_Y};

/// Per-axis travel (px) beyond which a press becomes a drag.
pub const DRAG_THRESHOLD: f32 = 5.0;
/// Longest press that can still count as a click.
pub const CLICK_TIME_THRESHOLD: Duration = Duration::from_millis(200);
/// Distance from a viewport edge at which dragging scrolls the view.
pub const EDGE_SCROLL_ZONE: f32 = 50.0;
pub const EDGE_SCROLL_STEP: f32 = 10.0;

/// Part of a node the pointer went down on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum HitRegion {
    DragHandle,
    Icon,
    TitleInput,
    MessageInput,
    Button,
    CategorySelector,
    ResizeHandle,
    MessageList,
}

impl HitRegion {
    /// Regions with their own behaviour; a press there never starts a drag.
    pub fn is_interactive(self) -> bool {
        matches!(
            self,
            HitRegion::TitleInput
                | HitRegion::MessageInput
                | HitRegion::Button
                | HitRegion::CategorySelector
                | HitRegion::ResizeHandle
                | HitRegion::MessageList
        )
    }
}

/// A pointer sample in viewport coordinates.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PointerEvent {
    pub pos: Pos2,
    pub at: Instant,
}

impl PointerEvent {
    pub fn new(pos: Pos2, at: Instant) -> Self { Self { pos, at } }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GestureState {
    Idle,
    PotentialDrag { node: NodeId, start: Pos2, started_at: Instant, offset: Vec2 },
    Dragging { node: NodeId, start: Pos2, started_at: Instant, offset: Vec2, restore_layer: Layer },
    Resizing { node: NodeId, start: Pos2, start_size: Vec2 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GestureOutcome {
    Ignored,
    Pressed(NodeId),
    ResizeStarted(NodeId),
    DragStarted(NodeId),
    Moved(NodeId),
    Resized(NodeId),
    /// Quick click: the caller selects (and, for boxes, expands) the node.
    Click(NodeId),
    DragEnded(NodeId),
    /// Press released in place but too slowly to be a click.
    Held(NodeId),
    ResizeEnded(NodeId),
}

/// Mutable canvas parts a gesture acts on.
pub struct GestureTarget<'a> {
    pub store: &'a mut NodeStore,
    pub surface: &'a mut RenderSurface,
    pub connections: &'a mut ConnectionManager,
}

#[derive(Debug)]
pub struct InteractionController {
    state: GestureState,
}

impl Default for InteractionController {
    fn default() -> Self { Self::new() }
}

impl InteractionController {
    pub fn new() -> Self { Self { state: GestureState::Idle } }

    pub fn state(&self) -> &GestureState { &self.state }

    pub fn is_idle(&self) -> bool { self.state == GestureState::Idle }

    /// Node currently owned by a gesture, if any.
    pub fn active_node(&self) -> Option<NodeId> {
        match self.state {
            GestureState::Idle => None,
            GestureState::PotentialDrag { node, .. }
            | GestureState::Dragging { node, .. }
            | GestureState::Resizing { node, .. } => Some(node),
        }
    }

    /// Drop any gesture in progress without side effects on the nodes.
    pub fn cancel(&mut self) {
        self.state = GestureState::Idle;
    }

    pub fn pointer_down(&mut self, id: NodeId, region: HitRegion, ev: PointerEvent, t: GestureTarget<'_>) -> GestureOutcome {
        let Some(node) = t.store.get(id) else { return GestureOutcome::Ignored };
        if !self.is_idle() {
            log::debug!("pointer down on {} while {:?}; restarting gesture", id, self.state);
        }

        if region == HitRegion::ResizeHandle {
            self.state = GestureState::Resizing { node: id, start: ev.pos, start_size: node.size() };
            if let Some(r) = t.surface.node_mut(id) {
                r.resizing = true;
            }
            log::debug!("resize started on {}", id);
            return GestureOutcome::ResizeStarted(id);
        }
        if region.is_interactive() {
            return GestureOutcome::Ignored;
        }

        let offset = t.surface.viewport.to_world(ev.pos) - node.pos();
        if let Some(gesture) = t.surface.node_mut(id).and_then(|r| r.icon_gesture.as_mut()) {
            gesture.press(ev.pos, ev.at);
        }
        self.state = GestureState::PotentialDrag { node: id, start: ev.pos, started_at: ev.at, offset };
        GestureOutcome::Pressed(id)
    }

    pub fn pointer_move(&mut self, ev: PointerEvent, t: GestureTarget<'_>) -> GestureOutcome {
        match self.state {
            GestureState::Idle => GestureOutcome::Ignored,
            GestureState::PotentialDrag { node, start, started_at, offset } => {
                let d = ev.pos - start;
                if d.x.abs() <= DRAG_THRESHOLD && d.y.abs() <= DRAG_THRESHOLD {
                    return GestureOutcome::Ignored;
                }
                let mut restore_layer = Layer::Expanded;
                if let Some(r) = t.surface.node_mut(node) {
                    restore_layer = r.layer;
                    r.dragging = true;
                    r.layer = Layer::Dragging;
                }
                log::debug!("drag started on {} (dx={}, dy={})", node, d.x, d.y);
                self.state = GestureState::Dragging { node, start, started_at, offset, restore_layer };
                self.drag_to(node, offset, ev, t);
                GestureOutcome::DragStarted(node)
            }
            GestureState::Dragging { node, offset, .. } => {
                if self.drag_to(node, offset, ev, t) { GestureOutcome::Moved(node) } else { GestureOutcome::Ignored }
            }
            GestureState::Resizing { node, start, start_size } => {
                let d = ev.pos - start;
                let size = vec2(
                    (start_size.x + d.x).max(MIN_EXPANDED_SIZE.x),
                    (start_size.y + d.y).max(MIN_EXPANDED_SIZE.y),
                );
                let Some(record) = t.store.get_mut(node) else {
                    self.state = GestureState::Idle;
                    return GestureOutcome::Ignored;
                };
                // resizing a box brings it back out as a panel
                view_state::set_view_state(record, t.surface.node_mut(node), false);
                view_state::set_custom_size(record, t.surface.node_mut(node), size);
                if t.surface.node(node).is_some_and(|r| r.is_icon()) {
                    t.surface.show_panel(record);
                }
                t.connections.update_node_connections(node, t.store, t.surface);
                t.surface.viewport.fit_canvas(t.store.nodes());
                GestureOutcome::Resized(node)
            }
        }
    }

    pub fn pointer_up(&mut self, ev: PointerEvent, t: GestureTarget<'_>) -> GestureOutcome {
        let state = std::mem::replace(&mut self.state, GestureState::Idle);
        match state {
            GestureState::Idle => GestureOutcome::Ignored,
            GestureState::PotentialDrag { node, start, started_at, .. } => {
                release(node, start, started_at, None, ev, t)
            }
            GestureState::Dragging { node, start, started_at, restore_layer, .. } => {
                release(node, start, started_at, Some(restore_layer), ev, t)
            }
            GestureState::Resizing { node, .. } => {
                if let Some(r) = t.surface.node_mut(node) {
                    r.resizing = false;
                }
                t.connections.update_node_connections(node, t.store, t.surface);
                t.surface.viewport.fit_canvas(t.store.nodes());
                GestureOutcome::ResizeEnded(node)
            }
        }
    }

    fn drag_to(&mut self, id: NodeId, offset: Vec2, ev: PointerEvent, t: GestureTarget<'_>) -> bool {
        let world = t.surface.viewport.to_world(ev.pos);
        let Some(node) = t.store.get_mut(id) else {
            self.state = GestureState::Idle;
            return false;
        };
        node.x = (world.x - offset.x).max(0.0);
        node.y = (world.y - offset.y).max(MINIMUM_Y);
        let pos = node.pos();
        if let Some(r) = t.surface.node_mut(id) {
            r.pos = pos;
        }

        edge_scroll(ev.pos, t.surface);
        t.connections.update_node_connections(id, t.store, t.surface);
        t.surface.viewport.fit_canvas(t.store.nodes());
        true
    }
}

fn release(
    node: NodeId,
    start: Pos2,
    started_at: Instant,
    restore_layer: Option<Layer>,
    ev: PointerEvent,
    t: GestureTarget<'_>,
) -> GestureOutcome {
    let held = ev.at.saturating_duration_since(started_at);
    let d = ev.pos - start;
    let was_dragging = restore_layer.is_some();

    let mut icon_click = true;
    if let Some(r) = t.surface.node_mut(node) {
        r.dragging = false;
        if let Some(layer) = restore_layer {
            r.layer = layer;
        }
        if let Some(gesture) = r.icon_gesture.as_mut() {
            icon_click = gesture.release(ev.pos, ev.at);
        }
    }

    let quick_click = !was_dragging
        && held < CLICK_TIME_THRESHOLD
        && d.x.abs() <= DRAG_THRESHOLD
        && d.y.abs() <= DRAG_THRESHOLD;
    log::debug!(
        "release on {}: dragging={} held={}ms dx={} dy={} click={}",
        node,
        was_dragging,
        held.as_millis(),
        d.x.abs(),
        d.y.abs(),
        quick_click && icon_click
    );

    if quick_click && icon_click {
        GestureOutcome::Click(node)
    } else if was_dragging {
        t.connections.update_node_connections(node, t.store, t.surface);
        t.surface.viewport.fit_canvas(t.store.nodes());
        GestureOutcome::DragEnded(node)
    } else {
        GestureOutcome::Held(node)
    }
}

/// Scroll the viewport one step toward any edge the pointer is near.
fn edge_scroll(pointer: Pos2, surface: &mut RenderSurface) {
    let vp = &mut surface.viewport;
    if pointer.x < EDGE_SCROLL_ZONE {
        vp.scroll.x = (vp.scroll.x - EDGE_SCROLL_STEP).max(0.0);
    } else if pointer.x > vp.size.x - EDGE_SCROLL_ZONE {
        vp.scroll.x += EDGE_SCROLL_STEP;
    }
    if pointer.y < EDGE_SCROLL_ZONE {
        vp.scroll.y = (vp.scroll.y - EDGE_SCROLL_STEP).max(0.0);
    } else if pointer.y > vp.size.y - EDGE_SCROLL_ZONE {
        vp.scroll.y += EDGE_SCROLL_STEP;
    }
}
