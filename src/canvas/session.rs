//! Session snapshots: writing the node graph out and loading it back under
//! freshly allocated ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::node_store::{Category, Message, Node, NodeId, NodeStore, ORIGIN_TITLE};
use super::state::Canvas;
use super::view_state::{self, EXPANDED_SIZE, MIN_EXPANDED_SIZE};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub nodes: Vec<Node>,
    pub timestamp: String,
}

/// One node as read from a snapshot. Only the position is required; anything
/// else missing takes its default.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeRecord {
    #[serde(default)]
    pub id: Option<u64>,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: Option<f32>,
    #[serde(default)]
    pub height: Option<f32>,
    #[serde(default)]
    pub expanded_width: Option<f32>,
    #[serde(default)]
    pub expanded_height: Option<f32>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub is_thinking: bool,
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub is_box_view: bool,
    #[serde(default)]
    pub is_origin: bool,
}

impl NodeRecord {
    /// Size to use when the node is expanded: the cached size if the record has
    /// one, else its live size when that was a real panel size.
    fn expanded_size(&self) -> Option<egui::Vec2> {
        if let (Some(w), Some(h)) = (self.expanded_width, self.expanded_height) {
            if w.is_finite() && h.is_finite() {
                return Some(egui::vec2(w, h).max(MIN_EXPANDED_SIZE));
            }
        }
        match (self.is_box_view, self.width, self.height) {
            (false, Some(w), Some(h)) if w >= MIN_EXPANDED_SIZE.x && h >= MIN_EXPANDED_SIZE.y && w.is_finite() && h.is_finite() => {
                Some(egui::vec2(w, h))
            }
            _ => None,
        }
    }
}

pub struct SessionCodec;

impl SessionCodec {
    pub fn serialize(store: &NodeStore) -> SessionSnapshot {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
        SessionSnapshot { nodes: store.nodes().to_vec(), timestamp }
    }

    pub fn to_json(snapshot: &SessionSnapshot) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(snapshot)
    }

    /// Parse snapshot text. `Ok(None)` means there is no usable `nodes` array
    /// and loading should do nothing; malformed individual records are skipped.
    pub fn parse(text: &str) -> Result<Option<Vec<NodeRecord>>, SessionError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let Some(items) = value.get("nodes").and_then(|v| v.as_array()) else {
            log::warn!("session has no nodes array; nothing to load");
            return Ok(None);
        };
        let records = items
            .iter()
            .enumerate()
            .filter_map(|(i, item)| match NodeRecord::deserialize(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("skipping session record {}: {}", i, e);
                    None
                }
            })
            .collect();
        Ok(Some(records))
    }
}

/// Result of a session load.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadReport {
    pub loaded: usize,
    /// Snapshot id to the id the node received on load.
    pub id_map: BTreeMap<u64, NodeId>,
    pub origin: Option<NodeId>,
}

/// Pick the origin: explicit marker first, then the exact default title, then
/// any title mentioning "origin". The first match in snapshot order wins.
fn resolve_origin(records: &[NodeRecord]) -> Option<usize> {
    let tiers: [&dyn Fn(&NodeRecord) -> bool; 3] = [
        &|r: &NodeRecord| r.is_origin,
        &|r: &NodeRecord| r.title == ORIGIN_TITLE,
        &|r: &NodeRecord| r.title.to_lowercase().contains("origin"),
    ];
    for qualifies in tiers {
        let hits: Vec<usize> = records.iter().enumerate().filter(|&(_, r)| qualifies(r)).map(|(i, _)| i).collect();
        if let Some(&first) = hits.first() {
            if hits.len() > 1 {
                log::warn!("{} nodes qualify as origin; using record {}", hits.len(), first);
            }
            return Some(first);
        }
    }
    None
}

impl Canvas {
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionCodec::serialize(&self.store)
    }

    /// Replace the canvas with the given records. Every record gets a new id;
    /// parent links are rewritten through the old-to-new mapping and links to
    /// nodes outside the snapshot are dropped.
    pub fn load_session(&mut self, records: Vec<NodeRecord>) -> LoadReport {
        self.clear();

        let mut report = LoadReport::default();
        let origin_index = resolve_origin(&records);

        let mut nodes: Vec<Node> = Vec::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            let id = self.store.allocate_id();
            if let Some(old) = record.id {
                if report.id_map.contains_key(&old) {
                    log::warn!("duplicate id {} in session; parent links resolve to the first", old);
                } else {
                    report.id_map.insert(old, id);
                }
            }

            let mut node = Node::new(id, egui::pos2(record.x, record.y), record.title.clone(), record.category.clone());
            view_state::validate_position(&mut node, None);
            // collapsing below caches this as the expanded size
            view_state::set_custom_size(&mut node, None, record.expanded_size().unwrap_or(EXPANDED_SIZE));
            node.messages = record.messages.clone();
            node.is_thinking = false;
            node.parent_id = record.parent_id;
            node.is_origin = origin_index == Some(i);
            if node.is_origin {
                report.origin = Some(id);
            }
            nodes.push(node);
        }

        for node in &mut nodes {
            node.parent_id = match node.parent_id {
                None => None,
                Some(old) => match report.id_map.get(&old) {
                    Some(&new) if new != node.id => Some(new),
                    Some(_) => {
                        log::warn!("node {} named itself as parent; link dropped", node.id);
                        None
                    }
                    None => {
                        log::warn!("node {} points at parent {} outside the session; link dropped", node.id, old);
                        None
                    }
                },
            };
        }

        let ids: Vec<NodeId> = nodes.iter().map(|n| n.id).collect();
        for node in nodes {
            self.store.insert(node);
        }
        for &id in &ids {
            self.render(id);
        }
        for &id in &ids {
            if Some(id) != report.origin {
                if let Err(e) = self.collapse_in_place(id) {
                    log::error!("could not collapse loaded node {}: {}", id, e);
                }
            }
        }
        if let Some(origin) = report.origin {
            if let Err(e) = self.select_node(origin) {
                log::error!("could not focus origin {}: {}", origin, e);
            }
        }

        self.store.recount_messages();
        self.connections.update_all_connections(&self.store, &mut self.surface);
        self.refresh_bounds();

        report.loaded = ids.len();
        log::info!(
            "loaded {} nodes ({} messages), {} connections",
            report.loaded,
            self.store.total_messages(),
            self.connections.len()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_nodes_array_is_not_an_error() {
        assert_eq!(SessionCodec::parse(r#"{"timestamp":"x"}"#).unwrap(), None);
        assert_eq!(SessionCodec::parse(r#"{"nodes":5}"#).unwrap(), None);
        assert!(SessionCodec::parse("{not json").is_err());
    }

    #[test]
    fn malformed_records_are_skipped() {
        let text = r#"{"nodes":[{"id":1,"x":10,"y":200,"title":"ok"},{"id":2,"title":"no position"}]}"#;
        let records = SessionCodec::parse(text).unwrap().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "ok");
    }

    #[test]
    fn origin_prefers_marker_then_exact_title() {
        let rec = |title: &str, marker: bool| NodeRecord {
            id: None,
            x: 0.0,
            y: 200.0,
            width: None,
            height: None,
            expanded_width: None,
            expanded_height: None,
            title: title.into(),
            category: Category::General,
            messages: vec![],
            is_thinking: false,
            parent_id: None,
            is_box_view: false,
            is_origin: marker,
        };
        assert_eq!(resolve_origin(&[rec("Origins of jazz", false), rec(ORIGIN_TITLE, false)]), Some(1));
        assert_eq!(resolve_origin(&[rec(ORIGIN_TITLE, false), rec("Plain", true)]), Some(1));
        assert_eq!(resolve_origin(&[rec("Original idea", false), rec("origin story", false)]), Some(0));
        assert_eq!(resolve_origin(&[rec("a", false)]), None);
    }

    #[test]
    fn record_sizes_feed_the_expanded_cache() {
        let mut r: NodeRecord = serde_json::from_str(r#"{"x":0,"y":200,"width":800,"height":500}"#).unwrap();
        assert_eq!(r.expanded_size(), Some(egui::vec2(800.0, 500.0)));
        r.is_box_view = true;
        assert_eq!(r.expanded_size(), None);
        r.expanded_width = Some(900.0);
        r.expanded_height = Some(700.0);
        assert_eq!(r.expanded_size(), Some(egui::vec2(900.0, 700.0)));
    }
}
