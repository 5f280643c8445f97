use std::collections::BTreeMap;
use std::fmt;

use egui::{Color32, Pos2, Rect, Vec2, pos2, vec2};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use super::view_state::{BOX_SIZE, EXPANDED_SIZE, MINIMUM_Y};

// Basic type aliases for clarity
pub type NodeId = u64;

pub const ORIGIN_TITLE: &str = "Origin Prompt";

const GRAY: Color32 = Color32::from_rgb(0x64, 0x74, 0x8b);

/// Classification key driving a node's color coding.
///
/// Keys outside the fixed table are kept verbatim so a session written by a
/// newer build survives a round-trip; they render in the fallback gray.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    #[default]
    General,
    Research,
    Creative,
    Problem,
    Planning,
    Learning,
    Other(String),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CategoryInfo {
    pub name: &'static str,
    pub color: Color32,
    pub bg_color: Color32,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::General,
        Category::Research,
        Category::Creative,
        Category::Problem,
        Category::Planning,
        Category::Learning,
    ];

    pub fn key(&self) -> &str {
        match self {
            Category::General => "general",
            Category::Research => "research",
            Category::Creative => "creative",
            Category::Problem => "problem",
            Category::Planning => "planning",
            Category::Learning => "learning",
            Category::Other(key) => key,
        }
    }

    /// Table entry, or `None` for keys outside the fixed table.
    pub fn info(&self) -> Option<CategoryInfo> {
        let (name, color, bg_color) = match self {
            Category::General => ("General", GRAY, Color32::from_rgb(0xf8, 0xfa, 0xfc)),
            Category::Research => ("Research", Color32::from_rgb(0x3b, 0x82, 0xf6), Color32::from_rgb(0xef, 0xf6, 0xff)),
            Category::Creative => ("Creative", Color32::from_rgb(0x10, 0xb9, 0x81), Color32::from_rgb(0xec, 0xfd, 0xf5)),
            Category::Problem => ("Problem Solving", Color32::from_rgb(0xf5, 0x9e, 0x0b), Color32::from_rgb(0xff, 0xfb, 0xeb)),
            Category::Planning => ("Planning", Color32::from_rgb(0x8b, 0x5c, 0xf6), Color32::from_rgb(0xf5, 0xf3, 0xff)),
            Category::Learning => ("Learning", Color32::from_rgb(0xef, 0x44, 0x44), Color32::from_rgb(0xfe, 0xf2, 0xf2)),
            Category::Other(_) => return None,
        };
        Some(CategoryInfo { name, color, bg_color })
    }

    pub fn color(&self) -> Color32 {
        self.info().map(|i| i.color).unwrap_or(GRAY)
    }

    pub fn bg_color(&self) -> Color32 {
        self.info()
            .map(|i| i.bg_color)
            .unwrap_or_else(|| Category::General.bg_color())
    }

    pub fn display_name(&self) -> &str {
        match self.info() {
            Some(info) => info.name,
            None => self.key(),
        }
    }
}

impl From<String> for Category {
    fn from(key: String) -> Self {
        match key.as_str() {
            "general" | "" => Category::General,
            "research" => Category::Research,
            "creative" => Category::Creative,
            "problem" => Category::Problem,
            "planning" => Category::Planning,
            "learning" => Category::Learning,
            _ => Category::Other(key),
        }
    }
}

impl From<Category> for String {
    fn from(category: Category) -> Self {
        category.key().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Keyword heuristic for a first message. Not applied automatically; the
/// category only changes on an explicit request.
pub fn suggest_category(message: &str) -> Category {
    let text = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
    if has(&["explain", "how to", "teach", "learn"]) {
        Category::Learning
    } else if has(&["brainstorm", "creative", "write", "story"]) {
        Category::Creative
    } else if has(&["error", "fix", "debug", "problem"]) {
        Category::Problem
    } else if has(&["research", "analyze", "find", "study"]) {
        Category::Research
    } else if has(&["plan", "strategy", "organize", "schedule"]) {
        Category::Planning
    } else {
        Category::General
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    // milliseconds since the unix epoch
    #[serde(deserialize_with = "millis_from_number")]
    pub timestamp: i64,
}

// Sessions written elsewhere may carry fractional milliseconds.
fn millis_from_number<'de, D: Deserializer<'de>>(de: D) -> Result<i64, D::Error> {
    Ok(f64::deserialize(de)? as i64)
}

impl Message {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        Self { role, content: content.into(), timestamp: millis as i64 }
    }
}

fn is_false(v: &bool) -> bool {
    !*v
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded_height: Option<f32>,
    pub title: String,
    pub category: Category,
    pub messages: Vec<Message>,
    pub is_thinking: bool,
    pub parent_id: Option<NodeId>,
    pub is_box_view: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_origin: bool,
}

impl Node {
    pub fn new(id: NodeId, pos: Pos2, title: String, category: Category) -> Self {
        Self {
            id,
            x: pos.x,
            y: pos.y,
            width: EXPANDED_SIZE.x,
            height: EXPANDED_SIZE.y,
            expanded_width: None,
            expanded_height: None,
            title,
            category,
            messages: Vec::new(),
            is_thinking: false,
            parent_id: None,
            is_box_view: false,
            is_origin: false,
        }
    }

    pub fn pos(&self) -> Pos2 { pos2(self.x, self.y) }
    pub fn size(&self) -> Vec2 { vec2(self.width, self.height) }
    pub fn rect(&self) -> Rect { Rect::from_min_size(self.pos(), self.size()) }

    /// Cached pre-collapse size, if one was recorded.
    pub fn cached_expanded_size(&self) -> Option<Vec2> {
        match (self.expanded_width, self.expanded_height) {
            (Some(w), Some(h)) => Some(vec2(w, h)),
            _ => None,
        }
    }
}

/// Toolbar filter choice. `All` clears any active filter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CategoryFilter {
    All,
    Only(Category),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CanvasStats {
    pub node_count: usize,
    pub message_count: usize,
    pub per_category: BTreeMap<Category, usize>,
}

/// Authoritative node records. Ids come from a counter that only moves forward,
/// so an id is never handed out twice in one session, even across clears.
#[derive(Clone, Debug)]
pub struct NodeStore {
    nodes: Vec<Node>,
    next_id: NodeId,
    active_filter: Option<Category>,
    total_messages: usize,
}

impl Default for NodeStore {
    fn default() -> Self { Self::new() }
}

impl NodeStore {
    pub fn new() -> Self {
        NodeStore {
            nodes: Vec::new(),
            next_id: 1,
            active_filter: None,
            total_messages: 0,
        }
    }

    pub fn allocate_id(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Build a fresh expanded node with a newly allocated id and add it.
    pub fn create_node(&mut self, pos: Pos2, title: Option<String>, category: Category) -> NodeId {
        let first = self.nodes.is_empty();
        let id = self.allocate_id();
        let title = title.unwrap_or_else(|| {
            if first { ORIGIN_TITLE.to_string() } else { format!("Chat {}", id) }
        });
        let mut node = Node::new(id, pos, title, category);
        node.is_origin = first;
        self.nodes.push(node);
        id
    }

    /// Add a fully built record. The caller owns id allocation.
    pub fn insert(&mut self, node: Node) {
        self.total_messages += node.messages.len();
        self.nodes.push(node);
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn contains(&self, id: NodeId) -> bool { self.get(id).is_some() }

    pub fn nodes(&self) -> &[Node] { &self.nodes }

    pub fn ids(&self) -> Vec<NodeId> { self.nodes.iter().map(|n| n.id).collect() }

    pub fn len(&self) -> usize { self.nodes.len() }

    pub fn is_empty(&self) -> bool { self.nodes.is_empty() }

    /// Nodes whose parent link points at `id`. Linear scan; canvases hold tens of nodes.
    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter_map(|n| if n.parent_id == Some(id) { Some(n.id) } else { None })
            .collect()
    }

    pub fn rename(&mut self, id: NodeId, title: String) -> bool {
        if let Some(node) = self.get_mut(id) {
            node.title = title;
            true
        } else {
            false
        }
    }

    pub fn set_category(&mut self, id: NodeId, category: Category) -> bool {
        if let Some(node) = self.get_mut(id) {
            node.category = category;
            true
        } else {
            false
        }
    }

    /// Append to a node's transcript. Transcripts only ever grow.
    pub fn append_message(&mut self, id: NodeId, message: Message) -> bool {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == id) {
            node.messages.push(message);
            self.total_messages += 1;
            true
        } else {
            false
        }
    }

    pub fn total_messages(&self) -> usize { self.total_messages }

    /// Recount messages from the records themselves.
    pub fn recount_messages(&mut self) {
        self.total_messages = self.nodes.iter().map(|n| n.messages.len()).sum();
    }

    /// Drop every node. The id counter is deliberately left where it is.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.total_messages = 0;
        self.active_filter = None;
    }

    // Filter state
    pub fn active_filter(&self) -> Option<&Category> { self.active_filter.as_ref() }

    pub fn apply_filter(&mut self, choice: CategoryFilter) {
        self.active_filter = match choice {
            CategoryFilter::All => None,
            CategoryFilter::Only(c) if self.active_filter.as_ref() == Some(&c) => None,
            CategoryFilter::Only(c) => Some(c),
        };
    }

    pub fn passes_filter(&self, node: &Node) -> bool {
        match &self.active_filter {
            None => true,
            Some(c) => &node.category == c,
        }
    }

    pub fn stats(&self) -> CanvasStats {
        let mut per_category = BTreeMap::new();
        for node in &self.nodes {
            *per_category.entry(node.category.clone()).or_insert(0) += 1;
        }
        CanvasStats {
            node_count: self.nodes.len(),
            message_count: self.total_messages,
            per_category,
        }
    }

    /// First free cell of a placement grid anchored at (150, MINIMUM_Y).
    pub fn find_good_position(&self) -> Pos2 {
        const CELL: Vec2 = vec2(700.0, 650.0);
        const MARGIN: f32 = 20.0;
        const SLACK: f32 = 30.0;
        const COLS: usize = 8;
        const ROWS: usize = 10;
        let start = pos2(150.0, MINIMUM_Y);

        for row in 0..ROWS {
            for col in 0..COLS {
                let test = start + vec2(col as f32 * (CELL.x + MARGIN), row as f32 * (CELL.y + MARGIN));
                let overlaps = self.nodes.iter().any(|n| {
                    let extent = if n.is_box_view { BOX_SIZE } else { n.size() };
                    (n.x - test.x).abs() < extent.x + SLACK && (n.y - test.y).abs() < extent.y + SLACK
                });
                if !overlaps {
                    return test;
                }
            }
        }
        // Grid exhausted: stack below it, shifted per node so repeats do not coincide.
        let k = self.nodes.len() as f32;
        pos2(start.x + (k * 37.0) % 400.0, start.y + ROWS as f32 * (CELL.y + MARGIN) + (k * 23.0) % 300.0)
    }
}
