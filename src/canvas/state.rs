use std::time::Instant;

use egui::{Pos2, Rect, Vec2, pos2};

use super::chat::{
    BackendError, ChatDispatcher, CompletionResponse, OutgoingRequest, RequestTicket, transcript_entry,
};
use super::connections::{ConnectionKey, ConnectionManager};
use super::interaction::{GestureOutcome, GestureTarget, HitRegion, InteractionController, PointerEvent};
use super::minimap::{MinimapHit, MinimapProjector};
use super::node_store::{CanvasStats, Category, CategoryFilter, Message, NodeId, NodeStore, Role};
use super::surface::{Layer, RenderSurface};
use super::view_state::{self, EXPANDED_SIZE, MINIMUM_Y};
use crate::persistence::settings::ChatSettings;

/// Longest fork title taken from the selected text.
const FORK_TITLE_CHARS: usize = 130;
/// Where a fork lands relative to its parent.
const FORK_OFFSET: Vec2 = egui::vec2(350.0, 50.0);

#[derive(Debug, thiserror::Error)]
pub enum CanvasError {
    #[error("select some text in a conversation first, then fork")]
    NoSelection,
    #[error("no node with id {0}")]
    UnknownNode(NodeId),
}

/// Text the user highlighted inside a node's transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextSelection {
    pub node: NodeId,
    pub text: String,
}

/// The whole canvas: node records plus everything derived from them. Every
/// mutating operation reconciles the derived parts before it returns.
#[derive(Debug)]
pub struct Canvas {
    pub(super) store: NodeStore,
    pub(super) surface: RenderSurface,
    pub(super) connections: ConnectionManager,
    pub(super) interaction: InteractionController,
    pub(super) minimap: MinimapProjector,
    pub(super) chat: ChatDispatcher,
    pub(super) focused: Option<NodeId>,
    selection: Option<TextSelection>,
}

impl Default for Canvas {
    fn default() -> Self { Self::new(ChatSettings::default()) }
}

impl Canvas {
    pub fn new(chat: ChatSettings) -> Self {
        let mut canvas = Canvas {
            store: NodeStore::new(),
            surface: RenderSurface::new(),
            connections: ConnectionManager::new(),
            interaction: InteractionController::new(),
            minimap: MinimapProjector::default(),
            chat: ChatDispatcher::new(chat),
            focused: None,
            selection: None,
        };
        canvas.refresh_bounds();
        canvas
    }

    pub fn store(&self) -> &NodeStore { &self.store }
    pub fn surface(&self) -> &RenderSurface { &self.surface }
    pub fn connections(&self) -> &ConnectionManager { &self.connections }
    pub fn interaction(&self) -> &InteractionController { &self.interaction }
    pub fn minimap(&self) -> &MinimapProjector { &self.minimap }
    pub fn chat(&self) -> &ChatDispatcher { &self.chat }
    pub fn focused_node(&self) -> Option<NodeId> { self.focused }
    pub fn text_selection(&self) -> Option<&TextSelection> { self.selection.as_ref() }
    pub fn stats(&self) -> CanvasStats { self.store.stats() }

    /// Create an expanded node, at `pos` or the next free grid cell, and focus it.
    pub fn create_node(&mut self, pos: Option<Pos2>, title: Option<String>, category: Category) -> NodeId {
        let pos = pos.unwrap_or_else(|| self.store.find_good_position());
        let id = self.store.create_node(pos, title, category);
        if let Some(node) = self.store.get_mut(id) {
            view_state::validate_position(node, None);
        }
        self.render(id);
        log::info!("created node {}", id);
        if let Err(e) = self.select_node(id) {
            log::error!("new node {} could not be selected: {}", id, e);
        }
        id
    }

    /// Remember highlighted transcript text for a later fork. Blank text clears it.
    pub fn set_text_selection(&mut self, node: NodeId, text: &str) {
        let text = text.trim();
        self.selection = if text.is_empty() || !self.store.contains(node) {
            None
        } else {
            Some(TextSelection { node, text: text.to_string() })
        };
    }

    pub fn clear_text_selection(&mut self) {
        self.selection = None;
    }

    /// Start a child conversation from the current selection. The child sits
    /// to the right of its parent, shares its category, and has the selected
    /// text waiting in its input.
    pub fn fork_selection(&mut self) -> Result<NodeId, CanvasError> {
        let Some(selection) = self.selection.take() else { return Err(CanvasError::NoSelection) };
        let Some(parent) = self.store.get(selection.node) else {
            return Err(CanvasError::UnknownNode(selection.node));
        };
        let pos = pos2(parent.x + FORK_OFFSET.x, (parent.y + FORK_OFFSET.y).max(MINIMUM_Y));
        let category = parent.category.clone();
        let parent_id = parent.id;

        let title = if selection.text.chars().count() > FORK_TITLE_CHARS {
            let head: String = selection.text.chars().take(FORK_TITLE_CHARS).collect();
            format!("{}...", head)
        } else {
            selection.text.clone()
        };

        let child = self.create_node(Some(pos), Some(title), category);
        if let Some(node) = self.store.get_mut(child) {
            node.parent_id = Some(parent_id);
        }
        self.surface.set_draft(child, selection.text);
        self.connections.ensure_connection(ConnectionKey::new(parent_id, child), &self.store, &mut self.surface);
        self.minimap.refresh(&self.store, &self.surface.viewport);
        log::info!("forked node {} from {}", child, parent_id);
        Ok(child)
    }

    /// Shrink a node to its icon. The expanded size is cached on first collapse.
    pub fn collapse(&mut self, id: NodeId) -> Result<(), CanvasError> {
        self.collapse_in_place(id)?;
        self.reconcile_node(id);
        Ok(())
    }

    pub(super) fn collapse_in_place(&mut self, id: NodeId) -> Result<(), CanvasError> {
        let node = self.store.get_mut(id).ok_or(CanvasError::UnknownNode(id))?;
        if node.is_box_view {
            return Ok(());
        }
        if node.cached_expanded_size().is_none() {
            node.expanded_width = Some(node.width);
            node.expanded_height = Some(node.height);
        }
        view_state::set_view_state(node, self.surface.node_mut(id), true);
        self.surface.show_icon(node);
        if self.focused == Some(id) {
            self.focused = None;
        }
        log::debug!("collapsed node {}", id);
        Ok(())
    }

    /// Bring a boxed node back as a full panel at its cached size.
    pub fn expand(&mut self, id: NodeId) -> Result<(), CanvasError> {
        self.expand_in_place(id)?;
        self.reconcile_node(id);
        Ok(())
    }

    fn expand_in_place(&mut self, id: NodeId) -> Result<(), CanvasError> {
        let node = self.store.get_mut(id).ok_or(CanvasError::UnknownNode(id))?;
        if !node.is_box_view {
            return Ok(());
        }
        let size = node.cached_expanded_size().unwrap_or(EXPANDED_SIZE);
        view_state::set_view_state(node, self.surface.node_mut(id), false);
        view_state::set_custom_size(node, self.surface.node_mut(id), size);
        // the next collapse caches whatever size the panel has by then
        node.expanded_width = None;
        node.expanded_height = None;
        self.surface.show_panel(node);
        log::debug!("expanded node {} to {}x{}", id, size.x, size.y);
        Ok(())
    }

    /// Focus a node: expand it if boxed and raise it above every other panel.
    pub fn select_node(&mut self, id: NodeId) -> Result<(), CanvasError> {
        if !self.store.contains(id) {
            return Err(CanvasError::UnknownNode(id));
        }
        self.expand_in_place(id)?;
        for node in self.store.nodes() {
            if let Some(r) = self.surface.node_mut(node.id) {
                r.layer = if node.id == id {
                    Layer::Focused
                } else if node.is_box_view {
                    Layer::Box
                } else {
                    Layer::Expanded
                };
            }
        }
        self.focused = Some(id);
        self.reconcile_node(id);
        Ok(())
    }

    /// Put every node back on its resting layer. Focus and view modes stay.
    pub fn deselect_all(&mut self) {
        for node in self.store.nodes() {
            if let Some(r) = self.surface.node_mut(node.id) {
                r.layer = if node.is_box_view { Layer::Box } else { Layer::Expanded };
            }
        }
    }

    /// Retitle a node. Blank titles are ignored.
    pub fn rename(&mut self, id: NodeId, title: &str) -> Result<(), CanvasError> {
        let title = title.trim();
        if !self.store.contains(id) {
            return Err(CanvasError::UnknownNode(id));
        }
        if title.is_empty() {
            return Ok(());
        }
        self.store.rename(id, title.to_string());
        if let Some(node) = self.store.get(id) {
            self.surface.refresh_header(node);
        }
        self.minimap.refresh(&self.store, &self.surface.viewport);
        Ok(())
    }

    pub fn set_category(&mut self, id: NodeId, category: Category) -> Result<(), CanvasError> {
        if !self.store.set_category(id, category) {
            return Err(CanvasError::UnknownNode(id));
        }
        if let Some(node) = self.store.get(id) {
            self.surface.refresh_header(node);
        }
        self.apply_visibility();
        Ok(())
    }

    /// Toolbar filter. Picking the active category again shows everything.
    pub fn filter_by_category(&mut self, choice: CategoryFilter) {
        self.store.apply_filter(choice);
        log::debug!("category filter now {:?}", self.store.active_filter());
        self.apply_visibility();
    }

    /// Drop every node, edge and pending request. Ids keep counting up.
    pub fn clear(&mut self) {
        self.connections.clear(&mut self.surface);
        self.surface.clear();
        self.store.clear();
        self.interaction.cancel();
        self.chat.clear();
        self.focused = None;
        self.selection = None;
        self.refresh_bounds();
        log::info!("canvas cleared");
    }

    // Pointer input, in viewport coordinates.
    pub fn pointer_down(&mut self, id: NodeId, region: HitRegion, pos: Pos2, at: Instant) -> GestureOutcome {
        if region == HitRegion::ResizeHandle && self.select_node(id).is_err() {
            return GestureOutcome::Ignored;
        }
        let Canvas { store, surface, connections, interaction, .. } = self;
        interaction.pointer_down(id, region, PointerEvent::new(pos, at), GestureTarget { store, surface, connections })
    }

    pub fn pointer_move(&mut self, pos: Pos2, at: Instant) -> GestureOutcome {
        let Canvas { store, surface, connections, interaction, .. } = self;
        let outcome = interaction.pointer_move(PointerEvent::new(pos, at), GestureTarget { store, surface, connections });
        if matches!(outcome, GestureOutcome::DragStarted(_) | GestureOutcome::Moved(_) | GestureOutcome::Resized(_)) {
            self.minimap.refresh(&self.store, &self.surface.viewport);
        }
        outcome
    }

    pub fn pointer_up(&mut self, pos: Pos2, at: Instant) -> GestureOutcome {
        let Canvas { store, surface, connections, interaction, .. } = self;
        let outcome = interaction.pointer_up(PointerEvent::new(pos, at), GestureTarget { store, surface, connections });
        match outcome {
            GestureOutcome::Click(id) => {
                if let Err(e) = self.select_node(id) {
                    log::debug!("click on vanished node: {}", e);
                }
            }
            GestureOutcome::DragEnded(_) | GestureOutcome::ResizeEnded(_) => {
                self.minimap.refresh(&self.store, &self.surface.viewport);
            }
            _ => {}
        }
        outcome
    }

    // Viewport
    pub fn scroll_to(&mut self, offset: Vec2) {
        self.surface.viewport.scroll = offset;
        self.surface.viewport.clamp_scroll();
        self.minimap.update_viewport(&self.surface.viewport);
    }

    pub fn scroll_by(&mut self, delta: Vec2) {
        let target = self.surface.viewport.scroll + delta;
        self.scroll_to(target);
    }

    pub fn resize_viewport(&mut self, size: Vec2) {
        if size == self.surface.viewport.size {
            return;
        }
        self.surface.viewport.size = size;
        self.refresh_bounds();
    }

    /// Handle a click at `local`, in minimap coordinates.
    pub fn minimap_click(&mut self, local: Pos2) {
        match self.minimap.hit_test(local) {
            MinimapHit::Node(id) => {
                if let Err(e) = self.navigate_to_node(id) {
                    log::debug!("minimap click: {}", e);
                }
            }
            MinimapHit::Empty(world) => self.navigate_to_position(world),
        }
    }

    /// Select a node and scroll so it sits in the middle of the view.
    pub fn navigate_to_node(&mut self, id: NodeId) -> Result<(), CanvasError> {
        self.select_node(id)?;
        let center = self.store.get(id).ok_or(CanvasError::UnknownNode(id))?.rect().center();
        let scroll = self.surface.viewport.centered_on(center);
        self.scroll_to(scroll);
        Ok(())
    }

    pub fn navigate_to_position(&mut self, world: Pos2) {
        let scroll = self.surface.viewport.centered_on(world);
        self.scroll_to(scroll);
    }

    /// Center the view on the bounding box of every node.
    pub fn center_all_nodes(&mut self) {
        let bounds = self.store.nodes().iter().fold(Rect::NOTHING, |acc, n| acc.union(n.rect()));
        if !bounds.is_positive() {
            self.reset_view();
            return;
        }
        self.navigate_to_position(bounds.center());
    }

    pub fn reset_view(&mut self) {
        self.scroll_to(Vec2::ZERO);
    }

    pub fn set_minimap_visible(&mut self, visible: bool) {
        self.minimap.visible = visible;
        self.minimap.refresh(&self.store, &self.surface.viewport);
    }

    pub fn set_draft(&mut self, id: NodeId, text: String) {
        self.surface.set_draft(id, text);
    }

    // Chat
    /// Send whatever is typed into the node's input.
    pub fn submit_draft(&mut self, id: NodeId, now: Instant) -> Result<Option<OutgoingRequest>, CanvasError> {
        let draft = self.surface.draft(id).unwrap_or_default().to_string();
        let out = self.submit_message(id, &draft, now)?;
        if out.is_some() {
            self.surface.set_draft(id, String::new());
        }
        Ok(out)
    }

    /// Append the user's message and mark the node as waiting. Returns the
    /// request to hand to the backend, or `None` for blank text or a node that
    /// is already waiting.
    pub fn submit_message(&mut self, id: NodeId, text: &str, now: Instant) -> Result<Option<OutgoingRequest>, CanvasError> {
        let text = text.trim();
        let node = self.store.get(id).ok_or(CanvasError::UnknownNode(id))?;
        if text.is_empty() || node.is_thinking {
            return Ok(None);
        }
        self.store.append_message(id, Message::now(Role::User, text));
        self.surface.push_transcript_line(id, Role::User, text);
        self.set_thinking(id, true);
        let out = self.chat.register(id, text, now);
        log::debug!("node {} submitted ticket {:?}", id, out.ticket);
        Ok(Some(out))
    }

    /// Deliver a backend outcome. Returns false when the ticket already
    /// expired or the canvas was cleared meanwhile; the outcome is dropped.
    pub fn complete_request(&mut self, ticket: RequestTicket, outcome: Result<CompletionResponse, BackendError>) -> bool {
        let Some(pending) = self.chat.take(ticket) else {
            log::debug!("discarding late answer for ticket {:?}", ticket);
            return false;
        };
        let id = pending.node;
        if !self.store.contains(id) {
            return false;
        }
        let entry = transcript_entry(&outcome);
        self.store.append_message(id, Message::now(Role::Assistant, entry.as_str()));
        self.surface.push_transcript_line(id, Role::Assistant, &entry);
        self.set_thinking(id, false);
        true
    }

    /// Time out requests that have waited too long.
    pub fn expire_requests(&mut self, now: Instant) -> Vec<RequestTicket> {
        let overdue = self.chat.overdue(now);
        for ticket in &overdue {
            log::warn!("request {:?} timed out", ticket);
            self.complete_request(*ticket, Err(BackendError::Timeout));
        }
        overdue
    }

    fn set_thinking(&mut self, id: NodeId, on: bool) {
        if let Some(node) = self.store.get_mut(id) {
            node.is_thinking = on;
        }
        self.surface.set_thinking(id, on);
    }

    // Reconciliation helpers
    pub(super) fn render(&mut self, id: NodeId) {
        let Some(node) = self.store.get(id) else { return };
        let hidden = !self.store.passes_filter(node);
        if let Err(e) = self.surface.render_node(node, hidden) {
            log::error!("node {} was not rendered: {}", id, e);
        }
    }

    fn apply_visibility(&mut self) {
        for node in self.store.nodes() {
            self.surface.set_hidden(node.id, !self.store.passes_filter(node));
        }
        self.connections.update_all_connections(&self.store, &mut self.surface);
        self.minimap.refresh(&self.store, &self.surface.viewport);
    }

    fn reconcile_node(&mut self, id: NodeId) {
        self.connections.update_node_connections(id, &self.store, &mut self.surface);
        self.refresh_bounds();
    }

    pub(super) fn refresh_bounds(&mut self) {
        self.surface.viewport.fit_canvas(self.store.nodes());
        self.surface.viewport.clamp_scroll();
        self.minimap.refresh(&self.store, &self.surface.viewport);
    }
}
