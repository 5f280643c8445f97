use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use egui::{Pos2, Vec2, pos2, vec2};

use super::node_store::{Node, NodeId, NodeStore};
use super::surface::{ConnectionVisual, RenderSurface, RenderedNode};

/// Size assumed for an endpoint when neither its rendered form nor its record
/// reports a usable dimension.
pub const DEFAULT_ANCHOR_SIZE: f32 = 60.0;

/// Structural identity of an edge: one per (parent, child) pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionKey {
    pub parent: NodeId,
    pub child: NodeId,
}

impl ConnectionKey {
    pub fn new(parent: NodeId, child: NodeId) -> Self { Self { parent, child } }

    pub fn touches(&self, id: NodeId) -> bool { self.parent == id || self.child == id }
}

/// Straight segment between two anchors.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Segment {
    pub start: Pos2,
    pub end: Pos2,
    pub length: f32,
    /// Rotation from the +x axis, degrees.
    pub angle_deg: f32,
}

impl Segment {
    pub fn between(start: Pos2, end: Pos2) -> Self {
        let d = end - start;
        Self {
            start,
            end,
            length: d.length(),
            angle_deg: d.y.atan2(d.x).to_degrees(),
        }
    }

    pub fn scaled(&self, scale: f32) -> Self {
        Self::between(
            pos2(self.start.x * scale, self.start.y * scale),
            pos2(self.end.x * scale, self.end.y * scale),
        )
    }
}

/// Source is the right-center of the parent, target the left-center of the child.
pub fn anchor_points(parent_pos: Pos2, parent_size: Vec2, child_pos: Pos2, child_size: Vec2) -> (Pos2, Pos2) {
    (
        pos2(parent_pos.x + parent_size.x, parent_pos.y + parent_size.y / 2.0),
        pos2(child_pos.x, child_pos.y + child_size.y / 2.0),
    )
}

// rendered size, then stored size, then the default; per axis
fn endpoint_size(node: &Node, rendered: Option<&RenderedNode>) -> Vec2 {
    let stored = |v: f32| if v.is_finite() && v > 0.0 { Some(v) } else { None };
    let (rw, rh) = rendered.map(|r| r.measured_size()).unwrap_or((None, None));
    vec2(
        rw.or(stored(node.width)).unwrap_or(DEFAULT_ANCHOR_SIZE),
        rh.or(stored(node.height)).unwrap_or(DEFAULT_ANCHOR_SIZE),
    )
}

pub fn connection_segment(parent: &Node, child: &Node, surface: &RenderSurface) -> Segment {
    let (a, b) = anchor_points(
        parent.pos(),
        endpoint_size(parent, surface.node(parent.id)),
        child.pos(),
        endpoint_size(child, surface.node(child.id)),
    );
    Segment::between(a, b)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Connection {
    pub key: ConnectionKey,
    pub last_update: Instant,
}

/// Derived parent→child links. Nothing here is ground truth: every edge can be
/// rebuilt from the nodes' `parent_id` fields and current visibility.
#[derive(Clone, Debug, Default)]
pub struct ConnectionManager {
    connections: BTreeMap<ConnectionKey, Connection>,
}

impl ConnectionManager {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, key: &ConnectionKey) -> Option<&Connection> { self.connections.get(key) }

    pub fn contains(&self, key: &ConnectionKey) -> bool { self.connections.contains_key(key) }

    pub fn keys(&self) -> BTreeSet<ConnectionKey> { self.connections.keys().copied().collect() }

    pub fn len(&self) -> usize { self.connections.len() }

    pub fn is_empty(&self) -> bool { self.connections.is_empty() }

    /// Make the edge for `key` match the current nodes: drawn fresh when both
    /// endpoints exist and are visible, removed otherwise. Returns whether the
    /// edge exists afterwards.
    pub fn ensure_connection(&mut self, key: ConnectionKey, store: &NodeStore, surface: &mut RenderSurface) -> bool {
        let (parent, child) = match (store.get(key.parent), store.get(key.child)) {
            (Some(p), Some(c)) if surface.is_visible(p.id) && surface.is_visible(c.id) => (p, c),
            _ => {
                self.remove_connection(key, surface);
                return false;
            }
        };

        // never diffed: the old visual goes before the new one is attached
        self.remove_connection(key, surface);
        let visual = ConnectionVisual {
            key,
            segment: connection_segment(parent, child, surface),
            color: parent.category.color(),
        };
        surface.attach_connection(visual);
        self.connections.insert(key, Connection { key, last_update: Instant::now() });
        true
    }

    /// Forget the record and drop any visual carrying the same key.
    pub fn remove_connection(&mut self, key: ConnectionKey, surface: &mut RenderSurface) {
        self.connections.remove(&key);
        surface.detach_connection(&key);
    }

    pub fn remove_node_connections(&mut self, id: NodeId, surface: &mut RenderSurface) {
        let to_remove: Vec<ConnectionKey> = self.connections.keys().filter(|k| k.touches(id)).copied().collect();
        for key in to_remove {
            self.remove_connection(key, surface);
        }
    }

    /// Re-ensure the node's own parent edge and every edge to its children.
    pub fn update_node_connections(&mut self, id: NodeId, store: &NodeStore, surface: &mut RenderSurface) {
        let Some(node) = store.get(id) else { return };
        let parent = node.parent_id;
        for child in store.children_of(id) {
            self.ensure_connection(ConnectionKey::new(id, child), store, surface);
        }
        if let Some(parent) = parent {
            self.ensure_connection(ConnectionKey::new(parent, id), store, surface);
        }
    }

    /// Full reconciliation: recompute the valid key set from the nodes, drop
    /// everything outside it (records and stray visuals alike), redraw the rest.
    pub fn update_all_connections(&mut self, store: &NodeStore, surface: &mut RenderSurface) {
        let valid: BTreeSet<ConnectionKey> = store
            .nodes()
            .iter()
            .filter_map(|n| n.parent_id.map(|p| ConnectionKey::new(p, n.id)))
            .collect();

        let stale: Vec<ConnectionKey> = self
            .connections
            .keys()
            .copied()
            .chain(surface.connections().map(|v| v.key))
            .filter(|k| !valid.contains(k))
            .collect();
        for key in stale {
            self.remove_connection(key, surface);
        }

        let mut drawn = 0usize;
        for key in valid {
            if !store.contains(key.parent) {
                log::debug!("node {} points at missing parent {}; no edge", key.child, key.parent);
            }
            if self.ensure_connection(key, store, surface) {
                drawn += 1;
            }
        }
        log::debug!("reconciled connections: {} drawn", drawn);
    }

    pub fn clear(&mut self, surface: &mut RenderSurface) {
        for key in self.keys() {
            self.remove_connection(key, surface);
        }
        // anything left on the surface was never tracked
        let strays: Vec<ConnectionKey> = surface.connections().map(|v| v.key).collect();
        for key in strays {
            surface.detach_connection(&key);
        }
    }
}
