//! Keeps a node's size and view mode consistent between its record and its
//! rendered form, and holds the placement floor every node must respect.

use egui::{Vec2, vec2};

use super::node_store::Node;
use super::surface::RenderedNode;

pub const EXPANDED_SIZE: Vec2 = vec2(1100.0, 650.0);
pub const BOX_SIZE: Vec2 = vec2(60.0, 60.0);
/// Smallest size a user resize may produce.
pub const MIN_EXPANDED_SIZE: Vec2 = vec2(300.0, 400.0);
/// Nothing may sit above this line; the toolbar lives there.
pub const MINIMUM_Y: f32 = 170.0;

/// Min/max sizing directives for a view mode. Boxes are pinned to their fixed
/// size; expanded panels have no upper bound.
pub fn sizing_directives(box_view: bool) -> (Vec2, Option<Vec2>) {
    if box_view {
        (BOX_SIZE, Some(BOX_SIZE))
    } else {
        (MIN_EXPANDED_SIZE, None)
    }
}

/// Set the view mode and the matching constant size on the record and, when
/// present, on its rendered form. Idempotent.
pub fn set_view_state(node: &mut Node, rendered: Option<&mut RenderedNode>, box_view: bool) {
    let size = if box_view { BOX_SIZE } else { EXPANDED_SIZE };
    node.width = size.x;
    node.height = size.y;
    node.is_box_view = box_view;

    if let Some(r) = rendered {
        let (min_size, max_size) = sizing_directives(box_view);
        r.size = size;
        r.min_size = min_size;
        r.max_size = max_size;
    }
}

/// Apply a user-chosen size to an expanded node. Sizes below the expanded
/// minimum are raised to it; boxed nodes are left alone.
pub fn set_custom_size(node: &mut Node, rendered: Option<&mut RenderedNode>, size: Vec2) {
    if node.is_box_view {
        return;
    }
    let size = size.max(MIN_EXPANDED_SIZE);
    node.width = size.x;
    node.height = size.y;
    if let Some(r) = rendered {
        r.size = size;
    }
}

/// Clamp y to the placement floor. Returns true when the node was moved.
pub fn validate_position(node: &mut Node, rendered: Option<&mut RenderedNode>) -> bool {
    if node.y >= MINIMUM_Y {
        return false;
    }
    log::warn!("node {} placed above the floor (y={}); clamping to {}", node.id, node.y, MINIMUM_Y);
    node.y = MINIMUM_Y;
    if let Some(r) = rendered {
        r.pos.y = node.y;
    }
    true
}
