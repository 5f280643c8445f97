use egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};

use super::connections::{ConnectionKey, Segment, anchor_points};
use super::node_store::{NodeId, NodeStore};
use super::surface::Viewport;

pub const MINIMAP_SIZE: Vec2 = vec2(276.0, 156.0);
/// The overview never magnifies past this, however small the canvas.
pub const MAX_SCALE: f32 = 0.15;
/// Smallest side of a projected node, so tiny boxes stay clickable.
pub const MIN_NODE_SIDE: f32 = 4.0;

#[derive(Clone, Debug, PartialEq)]
pub struct MinimapNode {
    pub id: NodeId,
    pub rect: Rect,
    pub border: Color32,
    pub fill: Color32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MinimapEdge {
    pub key: ConnectionKey,
    pub segment: Segment,
    pub color: Color32,
}

/// What a click on the minimap landed on.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MinimapHit {
    Node(NodeId),
    /// Empty space, already converted to world coordinates.
    Empty(Pos2),
}

/// Scaled overview of the canvas. Coordinates are local to the minimap (origin
/// at its top-left corner).
#[derive(Clone, Debug)]
pub struct MinimapProjector {
    pub size: Vec2,
    pub visible: bool,
    scale: f32,
    nodes: Vec<MinimapNode>,
    edges: Vec<MinimapEdge>,
    viewport: Rect,
}

impl Default for MinimapProjector {
    fn default() -> Self { Self::new(MINIMAP_SIZE) }
}

impl MinimapProjector {
    pub fn new(size: Vec2) -> Self {
        Self {
            size,
            visible: true,
            scale: 0.1,
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: Rect::NOTHING,
        }
    }

    pub fn scale(&self) -> f32 { self.scale }
    pub fn nodes(&self) -> &[MinimapNode] { &self.nodes }
    pub fn edges(&self) -> &[MinimapEdge] { &self.edges }
    pub fn viewport_rect(&self) -> Rect { self.viewport }

    pub fn scale_for(&self, canvas_size: Vec2) -> f32 {
        let sx = self.size.x / canvas_size.x.max(1.0);
        let sy = self.size.y / canvas_size.y.max(1.0);
        sx.min(sy).min(MAX_SCALE)
    }

    pub fn to_minimap(&self, world: Pos2) -> Pos2 {
        pos2(world.x * self.scale, world.y * self.scale)
    }

    pub fn to_world(&self, local: Pos2) -> Pos2 {
        pos2(local.x / self.scale, local.y / self.scale)
    }

    /// Rebuild the projection from the current nodes and viewport. Hidden
    /// (filtered out) nodes and edges touching them are left out.
    pub fn refresh(&mut self, store: &NodeStore, viewport: &Viewport) {
        if !self.visible {
            return;
        }
        self.scale = self.scale_for(viewport.canvas_size);
        let s = self.scale;

        self.nodes = store
            .nodes()
            .iter()
            .filter(|n| store.passes_filter(n))
            .map(|n| MinimapNode {
                id: n.id,
                rect: Rect::from_min_size(
                    pos2(n.x * s, n.y * s),
                    vec2((n.width * s).max(MIN_NODE_SIDE), (n.height * s).max(MIN_NODE_SIDE)),
                ),
                border: n.category.color(),
                fill: n.category.bg_color(),
            })
            .collect();

        self.edges = store
            .nodes()
            .iter()
            .filter(|child| store.passes_filter(child))
            .filter_map(|child| {
                let parent = store.get(child.parent_id?)?;
                if !store.passes_filter(parent) {
                    return None;
                }
                let (a, b) = anchor_points(parent.pos(), parent.size(), child.pos(), child.size());
                Some(MinimapEdge {
                    key: ConnectionKey::new(parent.id, child.id),
                    segment: Segment::between(a, b).scaled(s),
                    color: parent.category.color(),
                })
            })
            .collect();

        self.update_viewport(viewport);
    }

    /// Move the viewport indicator after a scroll or window resize.
    pub fn update_viewport(&mut self, viewport: &Viewport) {
        if !self.visible {
            return;
        }
        self.viewport = Rect::from_min_size(
            pos2(viewport.scroll.x * self.scale, viewport.scroll.y * self.scale),
            viewport.size * self.scale,
        );
    }

    /// Topmost projected node under `local`, else the world point beneath it.
    pub fn hit_test(&self, local: Pos2) -> MinimapHit {
        match self.nodes.iter().rev().find(|n| n.rect.contains(local)) {
            Some(n) => MinimapHit::Node(n.id),
            None => MinimapHit::Empty(self.to_world(local)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_is_capped() {
        let mm = MinimapProjector::default();
        // a tiny canvas would otherwise magnify
        assert_eq!(mm.scale_for(vec2(500.0, 300.0)), MAX_SCALE);
        let s = mm.scale_for(vec2(5520.0, 3120.0));
        assert!((s - 0.05).abs() < 1e-6);
    }

    #[test]
    fn world_and_minimap_coordinates_invert() {
        let mut mm = MinimapProjector::default();
        mm.scale = 0.05;
        let w = pos2(1200.0, 640.0);
        let back = mm.to_world(mm.to_minimap(w));
        assert!((back.x - w.x).abs() < 1e-3 && (back.y - w.y).abs() < 1e-3);
    }
}
