use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use egui::{Color32, Pos2, Rect, Vec2, vec2};

use super::connections::{ConnectionKey, Segment};
use super::node_store::{Node, NodeId, Role};
use super::view_state::{EXPANDED_SIZE, sizing_directives};

/// Longest title shown next to a box icon before it is ellipsized.
const ICON_LABEL_CHARS: usize = 28;

/// Icon click window: a release counts as a click only inside both limits.
const ICON_CLICK_TIME: Duration = Duration::from_millis(300);
const ICON_CLICK_SLOP: f32 = 10.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Box,
    Expanded,
    Focused,
    Dragging,
}

impl Layer {
    pub fn z_index(self) -> u16 {
        match self {
            Layer::Box => 10,
            Layer::Expanded => 50,
            Layer::Focused => 100,
            Layer::Dragging => 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TranscriptLine {
    pub role: Role,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeContent {
    /// Collapsed: a colored square with a short label.
    Icon { color: Color32, label: String },
    /// Expanded chat panel.
    Panel {
        color: Color32,
        badge: String,
        title: String,
        transcript: Vec<TranscriptLine>,
        draft: String,
        input_enabled: bool,
        thinking: bool,
        scroll_to_latest: bool,
    },
}

/// Per-icon press record, independent of the canvas gesture machine.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IconGesture {
    pressed_at: Option<(Pos2, Instant)>,
}

impl IconGesture {
    pub fn new() -> Self { Self { pressed_at: None } }

    pub fn press(&mut self, pos: Pos2, at: Instant) {
        self.pressed_at = Some((pos, at));
    }

    /// Consume the press and report whether the release reads as a click.
    pub fn release(&mut self, pos: Pos2, at: Instant) -> bool {
        match self.pressed_at.take() {
            Some((start, t0)) => {
                let held = at.saturating_duration_since(t0);
                held < ICON_CLICK_TIME
                    && (pos.x - start.x).abs() < ICON_CLICK_SLOP
                    && (pos.y - start.y).abs() < ICON_CLICK_SLOP
            }
            None => false,
        }
    }
}

impl Default for IconGesture {
    fn default() -> Self { Self::new() }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RenderedNode {
    pub id: NodeId,
    pub pos: Pos2,
    pub size: Vec2,
    pub min_size: Vec2,
    pub max_size: Option<Vec2>,
    pub layer: Layer,
    pub dragging: bool,
    pub resizing: bool,
    pub hidden: bool,
    pub content: NodeContent,
    pub icon_gesture: Option<IconGesture>,
}

impl RenderedNode {
    pub fn rect(&self) -> Rect { Rect::from_min_size(self.pos, self.size) }

    pub fn is_visible(&self) -> bool { !self.hidden }

    pub fn is_icon(&self) -> bool { matches!(self.content, NodeContent::Icon { .. }) }

    /// Rendered size as a measurement source; zero or non-finite reads as unknown.
    pub fn measured_size(&self) -> (Option<f32>, Option<f32>) {
        let ok = |v: f32| if v.is_finite() && v > 0.0 { Some(v) } else { None };
        (ok(self.size.x), ok(self.size.y))
    }
}

/// Visual for one parent→child edge.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionVisual {
    pub key: ConnectionKey,
    pub segment: Segment,
    pub color: Color32,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Viewport {
    pub scroll: Vec2,
    pub size: Vec2,
    pub canvas_size: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            scroll: Vec2::ZERO,
            size: vec2(1300.0, 710.0),
            canvas_size: vec2(2000.0, 1500.0),
        }
    }
}

impl Viewport {
    /// Largest scroll offset that still keeps the viewport on the canvas.
    pub fn max_scroll(&self) -> Vec2 {
        (self.canvas_size - self.size).max(Vec2::ZERO)
    }

    pub fn clamp_scroll(&mut self) {
        self.scroll = self.scroll.max(Vec2::ZERO).min(self.max_scroll());
    }

    pub fn to_world(&self, pointer: Pos2) -> Pos2 { pointer + self.scroll }

    /// Grow or shrink the scrollable canvas so every node fits with padding.
    pub fn fit_canvas(&mut self, nodes: &[Node]) {
        const EMPTY_CANVAS: Vec2 = vec2(2000.0, 1500.0);
        const NODE_MARGIN: f32 = 100.0;
        const PADDING: f32 = 300.0;

        if nodes.is_empty() {
            self.canvas_size = self.size.max(EMPTY_CANVAS);
            return;
        }
        let mut extent = self.size;
        for n in nodes {
            let w = if n.width > 0.0 { n.width } else { EXPANDED_SIZE.x };
            let h = if n.height > 0.0 { n.height } else { EXPANDED_SIZE.y };
            extent.x = extent.x.max(n.x + w + NODE_MARGIN);
            extent.y = extent.y.max(n.y + h + NODE_MARGIN);
        }
        self.canvas_size = extent + Vec2::splat(PADDING);
    }

    /// Scroll offset that puts `world` in the middle of the view, clamped to the canvas.
    pub fn centered_on(&self, world: Pos2) -> Vec2 {
        let target = world.to_vec2() - self.size / 2.0;
        target.max(Vec2::ZERO).min(self.max_scroll())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("node {0} has a non-finite position")]
    NonFinitePosition(NodeId),
    #[error("node {0} has a non-finite or empty size")]
    NonFiniteSize(NodeId),
}

/// Headless stand-in for what is on screen: one record per rendered node, the
/// edge visuals, and the scroll viewport. The GUI paints straight from this.
#[derive(Clone, Debug, Default)]
pub struct RenderSurface {
    nodes: BTreeMap<NodeId, RenderedNode>,
    connections: BTreeMap<ConnectionKey, ConnectionVisual>,
    pub viewport: Viewport,
}

impl RenderSurface {
    pub fn new() -> Self { Self::default() }

    pub fn node(&self, id: NodeId) -> Option<&RenderedNode> { self.nodes.get(&id) }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut RenderedNode> { self.nodes.get_mut(&id) }

    pub fn nodes(&self) -> impl Iterator<Item = &RenderedNode> { self.nodes.values() }

    /// Rendered nodes in paint order (lowest layer first, ties by id).
    pub fn paint_order(&self) -> Vec<&RenderedNode> {
        let mut out: Vec<&RenderedNode> = self.nodes.values().collect();
        out.sort_by_key(|r| (r.layer, r.id));
        out
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|r| r.is_visible()).unwrap_or(false)
    }

    /// Build (or rebuild) the rendered form of a node from its record. A record
    /// that cannot be drawn is refused without touching anything else.
    pub fn render_node(&mut self, node: &Node, hidden: bool) -> Result<(), RenderError> {
        if !node.x.is_finite() || !node.y.is_finite() {
            return Err(RenderError::NonFinitePosition(node.id));
        }
        if !node.width.is_finite() || !node.height.is_finite() || node.width <= 0.0 || node.height <= 0.0 {
            return Err(RenderError::NonFiniteSize(node.id));
        }
        let (content, layer) = if node.is_box_view {
            (icon_content(node), Layer::Box)
        } else {
            (panel_content(node, String::new()), Layer::Expanded)
        };
        let (min_size, max_size) = sizing_directives(node.is_box_view);
        let rendered = RenderedNode {
            id: node.id,
            pos: node.pos(),
            size: node.size(),
            min_size,
            max_size,
            layer,
            dragging: false,
            resizing: false,
            hidden,
            content,
            icon_gesture: if node.is_box_view { Some(IconGesture::new()) } else { None },
        };
        self.nodes.insert(node.id, rendered);
        Ok(())
    }

    /// Swap in the compact icon for a boxed node.
    pub fn show_icon(&mut self, node: &Node) {
        if let Some(r) = self.nodes.get_mut(&node.id) {
            r.content = icon_content(node);
            r.icon_gesture = Some(IconGesture::new());
            r.layer = Layer::Box;
        }
    }

    /// Rebuild the full panel for an expanded node, replaying its transcript in
    /// order. A pending draft in the old panel is carried over.
    pub fn show_panel(&mut self, node: &Node) {
        if let Some(r) = self.nodes.get_mut(&node.id) {
            let draft = match &r.content {
                NodeContent::Panel { draft, .. } => draft.clone(),
                NodeContent::Icon { .. } => String::new(),
            };
            r.content = panel_content(node, draft);
            r.icon_gesture = None;
            if r.layer == Layer::Box {
                r.layer = Layer::Expanded;
            }
        }
    }

    /// Refresh colors and labels after a rename or recategorization.
    pub fn refresh_header(&mut self, node: &Node) {
        if let Some(r) = self.nodes.get_mut(&node.id) {
            match &mut r.content {
                NodeContent::Icon { color, label } => {
                    *color = node.category.color();
                    *label = icon_label(&node.title);
                }
                NodeContent::Panel { color, badge, title, .. } => {
                    *color = node.category.color();
                    *badge = node.category.display_name().to_string();
                    *title = node.title.clone();
                }
            }
        }
    }

    pub fn push_transcript_line(&mut self, id: NodeId, role: Role, text: &str) {
        if let Some(RenderedNode { content: NodeContent::Panel { transcript, scroll_to_latest, .. }, .. }) =
            self.nodes.get_mut(&id)
        {
            transcript.push(TranscriptLine { role, text: text.to_string() });
            *scroll_to_latest = true;
        }
    }

    pub fn set_thinking(&mut self, id: NodeId, on: bool) {
        if let Some(RenderedNode { content: NodeContent::Panel { thinking, input_enabled, scroll_to_latest, .. }, .. }) =
            self.nodes.get_mut(&id)
        {
            *thinking = on;
            *input_enabled = !on;
            *scroll_to_latest = true;
        }
    }

    pub fn draft(&self, id: NodeId) -> Option<&str> {
        match self.nodes.get(&id).map(|r| &r.content) {
            Some(NodeContent::Panel { draft, .. }) => Some(draft.as_str()),
            _ => None,
        }
    }

    pub fn set_draft(&mut self, id: NodeId, text: String) {
        if let Some(RenderedNode { content: NodeContent::Panel { draft, .. }, .. }) = self.nodes.get_mut(&id) {
            *draft = text;
        }
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) {
        if let Some(r) = self.nodes.get_mut(&id) {
            r.hidden = hidden;
        }
    }

    // Connection visuals
    pub fn connection(&self, key: &ConnectionKey) -> Option<&ConnectionVisual> { self.connections.get(key) }

    pub fn connections(&self) -> impl Iterator<Item = &ConnectionVisual> { self.connections.values() }

    pub fn connection_count(&self) -> usize { self.connections.len() }

    pub fn attach_connection(&mut self, visual: ConnectionVisual) {
        self.connections.insert(visual.key, visual);
    }

    pub fn detach_connection(&mut self, key: &ConnectionKey) -> bool {
        self.connections.remove(key).is_some()
    }

    /// Wipe every node and edge visual; the viewport survives.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
    }
}

fn icon_label(title: &str) -> String {
    if title.chars().count() > ICON_LABEL_CHARS {
        let head: String = title.chars().take(ICON_LABEL_CHARS).collect();
        format!("{}…", head.trim_end())
    } else {
        title.to_string()
    }
}

fn icon_content(node: &Node) -> NodeContent {
    NodeContent::Icon { color: node.category.color(), label: icon_label(&node.title) }
}

fn panel_content(node: &Node, draft: String) -> NodeContent {
    NodeContent::Panel {
        color: node.category.color(),
        badge: node.category.display_name().to_string(),
        title: node.title.clone(),
        transcript: node
            .messages
            .iter()
            .map(|m| TranscriptLine { role: m.role, text: m.content.clone() })
            .collect(),
        draft,
        input_enabled: !node.is_thinking,
        thinking: node.is_thinking,
        scroll_to_latest: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use egui::pos2;

    #[test]
    fn icon_gesture_rejects_slow_or_far_releases() {
        let t0 = Instant::now();
        let mut g = IconGesture::new();
        g.press(pos2(10.0, 10.0), t0);
        assert!(g.release(pos2(12.0, 11.0), t0 + Duration::from_millis(120)));

        g.press(pos2(10.0, 10.0), t0);
        assert!(!g.release(pos2(25.0, 10.0), t0 + Duration::from_millis(50)));

        g.press(pos2(10.0, 10.0), t0);
        assert!(!g.release(pos2(10.0, 10.0), t0 + Duration::from_millis(400)));

        // no press recorded
        assert!(!g.release(pos2(10.0, 10.0), t0));
    }

    #[test]
    fn long_titles_are_ellipsized_on_icons() {
        let label = icon_label("A very long conversation title that keeps going");
        assert!(label.ends_with('…'));
        assert!(label.chars().count() <= ICON_LABEL_CHARS + 1);
        assert_eq!(icon_label("Short"), "Short");
    }
}
