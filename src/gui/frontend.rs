#![allow(clippy::collapsible_if)]
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use eframe::egui::{self, Color32, Pos2, Rect, Sense, Stroke, Vec2, pos2, vec2};

use crate::canvas::Canvas;
use crate::canvas::chat::{BackendError, CompletionBackend, CompletionResponse, OfflineBackend, OutgoingRequest, RequestTicket};
use crate::canvas::interaction::HitRegion;
use crate::canvas::node_store::{Category, CategoryFilter, NodeId, Role};
use crate::canvas::session::NodeRecord;
use crate::canvas::surface::{NodeContent, RenderedNode};
use crate::persistence::persist::{self, AutosaveTimer};
use crate::persistence::settings::AppSettings;

// Panel geometry, in canvas pixels
const HEADER_HEIGHT: f32 = 36.0;
const INPUT_HEIGHT: f32 = 44.0;
const RESIZE_GRIP: f32 = 16.0;
const HEADER_CONTROLS_WIDTH: f32 = 170.0;
// collapse button at the far right of the controls strip
const COLLAPSE_BUTTON_WIDTH: f32 = 34.0;
const TITLE_INSET: f32 = 10.0;
// room left for the badge between the title field and the controls
const BADGE_WIDTH: f32 = 110.0;
const MINIMAP_MARGIN: f32 = 16.0;

type Completion = (RequestTicket, Result<CompletionResponse, BackendError>);

/// Right edge of the title field in a panel of the given width; the badge and
/// padding after it stay draggable.
fn title_end(width: f32) -> f32 {
    (width - HEADER_CONTROLS_WIDTH - BADGE_WIDTH).max(TITLE_INSET)
}

/// Which part of a rendered node sits under a world-space point.
pub fn hit_region(node: &RenderedNode, world: Pos2) -> Option<HitRegion> {
    let rect = node.rect();
    if node.hidden || !rect.contains(world) {
        return None;
    }
    if node.is_icon() {
        return Some(HitRegion::Icon);
    }
    let local = world - rect.min;
    if local.x >= rect.width() - RESIZE_GRIP && local.y >= rect.height() - RESIZE_GRIP {
        return Some(HitRegion::ResizeHandle);
    }
    if local.y < HEADER_HEIGHT {
        let controls = rect.width() - HEADER_CONTROLS_WIDTH;
        return Some(if local.x >= rect.width() - COLLAPSE_BUTTON_WIDTH {
            HitRegion::Button
        } else if local.x >= controls {
            HitRegion::CategorySelector
        } else if local.x >= TITLE_INSET && local.x < title_end(rect.width()) {
            HitRegion::TitleInput
        } else {
            HitRegion::DragHandle
        });
    }
    if local.y >= rect.height() - INPUT_HEIGHT {
        return Some(HitRegion::MessageInput);
    }
    Some(HitRegion::MessageList)
}

enum UiAction {
    Collapse(NodeId),
    SetCategory(NodeId, Category),
    Rename(NodeId, String),
    SetDraft(NodeId, String),
    Submit(NodeId),
    SelectText(NodeId, String),
    ForkMessage(NodeId, String),
}

pub struct CanvasApp {
    canvas: Canvas,
    app_settings: AppSettings,
    backend: Arc<dyn CompletionBackend>,
    results_tx: Sender<Completion>,
    results_rx: Receiver<Completion>,
    autosave: AutosaveTimer,
    // blocking notice for user-input errors
    notice: Option<String>,
    status: Option<String>,
    show_import_window: bool,
    import_path: String,
    title_edits: HashMap<NodeId, String>,
    panning: bool,
    last_pointer: Option<Pos2>,
}

impl CanvasApp {
    pub fn new(app_settings: AppSettings, autosave_enabled: bool) -> Self {
        let (results_tx, results_rx) = channel();
        let autosave = if autosave_enabled {
            AutosaveTimer::new(Duration::from_secs(app_settings.autosave_interval_secs.max(1)), Instant::now())
        } else {
            AutosaveTimer::disabled()
        };
        let mut canvas = Canvas::new(app_settings.chat.clone());
        canvas.set_minimap_visible(app_settings.minimap_visible);
        Self {
            canvas,
            app_settings,
            backend: Arc::new(OfflineBackend),
            results_tx,
            results_rx,
            autosave,
            notice: None,
            status: None,
            show_import_window: false,
            import_path: String::new(),
            title_edits: HashMap::new(),
            panning: false,
            last_pointer: None,
        }
    }

    /// Start from saved records, or a fresh origin chat when there are none.
    pub fn from_records(app_settings: AppSettings, autosave_enabled: bool, records: Option<Vec<NodeRecord>>) -> Self {
        let mut app = Self::new(app_settings, autosave_enabled);
        match records {
            Some(records) if !records.is_empty() => {
                let report = app.canvas.load_session(records);
                app.status = Some(format!("Restored {} chats", report.loaded));
            }
            _ => {
                app.canvas.create_node(None, None, Category::General);
            }
        }
        app
    }

    pub fn with_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.backend = backend;
        self
    }

    fn dispatch(&self, out: OutgoingRequest, ctx: &egui::Context) {
        let backend = Arc::clone(&self.backend);
        let tx = self.results_tx.clone();
        let ctx = ctx.clone();
        std::thread::spawn(move || {
            let result = backend.complete(&out.request);
            // receiver gone means the app is shutting down
            let _ = tx.send((out.ticket, result));
            ctx.request_repaint();
        });
    }

    fn submit(&mut self, id: NodeId, ctx: &egui::Context) {
        match self.canvas.submit_draft(id, Instant::now()) {
            Ok(Some(out)) => self.dispatch(out, ctx),
            Ok(None) => {}
            Err(e) => log::error!("submit failed: {}", e),
        }
    }

    fn fork(&mut self) {
        match self.canvas.fork_selection() {
            Ok(id) => {
                self.status = Some(format!("Forked chat {}", id));
            }
            Err(e) => self.notice = Some(e.to_string()),
        }
    }

    fn menu_export(&mut self) {
        let path = persist::export_path_now();
        match persist::save_export(&path, &self.canvas.snapshot()) {
            Ok(p) => self.status = Some(format!("Exported to {}", p.display())),
            Err(e) => {
                log::error!("export failed: {}", e);
                self.notice = Some(format!("Export failed: {}", e));
            }
        }
    }

    fn menu_import(&mut self) {
        let path = std::path::PathBuf::from(self.import_path.trim());
        match persist::read_session_file(&path) {
            Ok(Some(records)) => {
                let report = self.canvas.load_session(records);
                self.title_edits.clear();
                self.status = Some(format!("Imported {} chats", report.loaded));
                self.show_import_window = false;
            }
            Ok(None) => self.notice = Some("That file holds no chats to import.".to_string()),
            Err(e) => {
                log::error!("import of {} failed: {}", path.display(), e);
                self.notice = Some(format!("Could not import session: {}", e));
            }
        }
    }

    fn menu_clear(&mut self) {
        self.canvas.clear();
        self.title_edits.clear();
        if let Err(e) = persist::clear_active() {
            log::error!("could not remove autosave: {}", e);
        }
        self.status = Some("Canvas cleared".to_string());
    }

    fn autosave_tick(&mut self, ctx: &egui::Context) {
        let now = Instant::now();
        if self.autosave.due(now) {
            match persist::save_active(&self.canvas.snapshot()) {
                Ok(Some(path)) => log::debug!("autosaved to {}", path.display()),
                Ok(None) => {}
                Err(e) => log::error!("autosave failed: {}", e),
            }
        }
        if self.autosave.is_enabled() {
            ctx.request_repaint_after(self.autosave.remaining(now));
        }
    }

    fn apply(&mut self, action: UiAction, ctx: &egui::Context) {
        let result = match action {
            UiAction::Collapse(id) => self.canvas.collapse(id),
            UiAction::SetCategory(id, c) => self.canvas.set_category(id, c),
            UiAction::Rename(id, title) => self.canvas.rename(id, &title),
            UiAction::SetDraft(id, text) => {
                self.canvas.set_draft(id, text);
                Ok(())
            }
            UiAction::Submit(id) => {
                self.submit(id, ctx);
                Ok(())
            }
            UiAction::SelectText(id, text) => {
                self.canvas.set_text_selection(id, &text);
                Ok(())
            }
            UiAction::ForkMessage(id, text) => {
                self.canvas.set_text_selection(id, &text);
                self.fork();
                Ok(())
            }
        };
        if let Err(e) = result {
            log::debug!("ui action on a vanished node: {}", e);
        }
    }

    fn top_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            if !ctx.wants_keyboard_input()
                && ctx.input_mut(|i| i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::SHIFT, egui::Key::F)))
            {
                self.fork();
            }
            if ctx.input_mut(|i| i.consume_shortcut(&egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S))) {
                self.menu_export();
            }

            ui.horizontal(|ui| {
                ui.label("Chat-Canvas");
                ui.separator();
                if ui.button("New Chat").clicked() {
                    self.canvas.create_node(None, None, Category::General);
                }
                if ui.button("Fork Selection").on_hover_text("Shift+F").clicked() {
                    self.fork();
                }
                ui.menu_button("Session", |ui| {
                    if ui.button("Export").clicked() {
                        self.menu_export();
                        ui.close();
                    }
                    if ui.button("Import…").clicked() {
                        self.show_import_window = true;
                        ui.close();
                    }
                    ui.separator();
                    if ui.button("Clear Canvas").clicked() {
                        self.menu_clear();
                        ui.close();
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Center All").clicked() {
                        self.canvas.center_all_nodes();
                        ui.close();
                    }
                    if ui.button("Reset View").clicked() {
                        self.canvas.reset_view();
                        ui.close();
                    }
                    let mut minimap = self.canvas.minimap().visible;
                    if ui.checkbox(&mut minimap, "Minimap").changed() {
                        self.canvas.set_minimap_visible(minimap);
                        self.app_settings.minimap_visible = minimap;
                        if let Err(e) = self.app_settings.save() {
                            log::error!("could not save settings: {}", e);
                        }
                    }
                });
                ui.separator();

                let active = self.canvas.store().active_filter().cloned();
                if ui.selectable_label(active.is_none(), "All").clicked() {
                    self.canvas.filter_by_category(CategoryFilter::All);
                }
                for c in Category::ALL {
                    let name = c.display_name().to_string();
                    let text = egui::RichText::new(name).color(c.color());
                    if ui.selectable_label(active.as_ref() == Some(&c), text).clicked() {
                        self.canvas.filter_by_category(CategoryFilter::Only(c));
                    }
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let stats = self.canvas.stats();
                    ui.label(format!("{} chats · {} messages", stats.node_count, stats.message_count));
                    if let Some(msg) = &self.status {
                        ui.separator();
                        ui.small(msg.clone());
                    }
                });
            });
        });
    }

    fn windows(&mut self, ctx: &egui::Context) {
        if let Some(msg) = self.notice.clone() {
            let mut open = true;
            let mut dismissed = false;
            egui::Window::new("Notice")
                .open(&mut open)
                .collapsible(false)
                .resizable(false)
                .anchor(egui::Align2::CENTER_CENTER, vec2(0.0, 0.0))
                .show(ctx, |ui| {
                    ui.label(msg);
                    if ui.button("OK").clicked() {
                        dismissed = true;
                    }
                });
            if !open || dismissed {
                self.notice = None;
            }
        }

        if self.show_import_window {
            let mut open = true;
            let mut do_import = false;
            egui::Window::new("Import Session")
                .open(&mut open)
                .collapsible(false)
                .show(ctx, |ui| {
                    ui.label("Session file (.json)");
                    ui.add(egui::TextEdit::singleline(&mut self.import_path).desired_width(420.0));
                    ui.horizontal(|ui| {
                        if ui.button("Import").clicked() {
                            do_import = true;
                        }
                        ui.small(format!("Exports go to {}", self.app_settings.export_dir().display()));
                    });
                });
            if do_import {
                self.menu_import();
            }
            if !open {
                self.show_import_window = false;
            }
        }
    }

    fn canvas_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let available = ui.available_rect_before_wrap();
            self.canvas.resize_viewport(available.size());
            let bg_resp = ui.allocate_rect(available, Sense::click_and_drag());
            let painter = ui.painter_at(available);
            painter.rect_filled(available, 0.0, Color32::from_rgb(0xf1, 0xf5, 0xf9));

            let scroll = self.canvas.surface().viewport.scroll;
            let origin = available.min;
            let to_screen = move |p: Pos2| -> Pos2 { p - scroll + origin.to_vec2() };

            // edges under nodes
            for visual in self.canvas.surface().connections() {
                let seg = visual.segment;
                painter.line_segment([to_screen(seg.start), to_screen(seg.end)], Stroke::new(2.0, visual.color));
            }

            let focused = self.canvas.focused_node();
            let order: Vec<RenderedNode> =
                self.canvas.surface().paint_order().into_iter().filter(|r| r.is_visible()).cloned().collect();
            let mut actions: Vec<UiAction> = Vec::new();
            for rendered in &order {
                let rect = Rect::from_min_size(to_screen(rendered.pos), rendered.size);
                if !rect.intersects(available) {
                    continue;
                }
                match &rendered.content {
                    NodeContent::Icon { color, label } => {
                        painter.rect_filled(rect, 8.0, *color);
                        painter.text(
                            rect.center_bottom() + vec2(0.0, 4.0),
                            egui::Align2::CENTER_TOP,
                            label,
                            egui::FontId::proportional(12.0),
                            Color32::from_rgb(0x33, 0x41, 0x55),
                        );
                    }
                    NodeContent::Panel { .. } => {
                        self.paint_panel(ui, rendered, rect, focused == Some(rendered.id), &mut actions);
                    }
                }
            }
            for action in actions {
                self.apply(action, ctx);
            }

            if self.canvas.store().is_empty() {
                painter.text(
                    available.center(),
                    egui::Align2::CENTER_CENTER,
                    "Empty canvas. Use New Chat to begin.",
                    egui::FontId::proportional(18.0),
                    Color32::GRAY,
                );
            }

            let minimap_rect = self.paint_minimap(&painter, available);
            self.route_pointer(ui, available, minimap_rect, &bg_resp, &order);
        });
    }

    fn paint_panel(&mut self, ui: &mut egui::Ui, rendered: &RenderedNode, rect: Rect, focused: bool, actions: &mut Vec<UiAction>) {
        let NodeContent::Panel { color, badge, title, transcript, draft, input_enabled, thinking, .. } = &rendered.content
        else {
            return;
        };
        let id = rendered.id;
        let painter = ui.painter();
        let bg = self.canvas.store().get(id).map(|n| n.category.bg_color()).unwrap_or(Color32::WHITE);
        painter.rect_filled(rect, 8.0, bg);
        painter.rect_stroke(rect, 8.0, Stroke::new(if focused { 3.0 } else { 1.5 }, *color), egui::StrokeKind::Inside);
        let header = Rect::from_min_size(rect.min, vec2(rect.width(), HEADER_HEIGHT));
        painter.rect_filled(header, egui::CornerRadius { nw: 8, ne: 8, sw: 0, se: 0 }, *color);
        let grip = Rect::from_min_size(rect.max - Vec2::splat(RESIZE_GRIP), Vec2::splat(RESIZE_GRIP));
        painter.line_segment([grip.left_bottom(), grip.right_top()], Stroke::new(1.0, Color32::GRAY));

        // header: title, badge, controls
        let title_rect = Rect::from_min_max(header.min + vec2(TITLE_INSET, 4.0), pos2(header.max.x - HEADER_CONTROLS_WIDTH, header.max.y - 4.0));
        let mut title_ui = ui.new_child(egui::UiBuilder::new().max_rect(title_rect).layout(egui::Layout::left_to_right(egui::Align::Center)));
        let buf = self.title_edits.entry(id).or_insert_with(|| title.clone());
        let resp = title_ui.add(egui::TextEdit::singleline(buf).frame(false).text_color(Color32::WHITE).desired_width(title_end(rect.width()) - TITLE_INSET));
        if resp.lost_focus() {
            actions.push(UiAction::Rename(id, buf.clone()));
        } else if !resp.has_focus() && *buf != *title {
            *buf = title.clone();
        }
        title_ui.label(egui::RichText::new(badge).small().color(Color32::WHITE));

        let controls_rect = Rect::from_min_max(pos2(header.max.x - HEADER_CONTROLS_WIDTH, header.min.y + 4.0), header.max - vec2(6.0, 4.0));
        let mut controls = ui.new_child(egui::UiBuilder::new().max_rect(controls_rect).layout(egui::Layout::right_to_left(egui::Align::Center)));
        if controls.button("–").on_hover_text("Minimize").clicked() {
            actions.push(UiAction::Collapse(id));
        }
        let current = self.canvas.store().get(id).map(|n| n.category.clone()).unwrap_or_default();
        let mut chosen = current.clone();
        egui::ComboBox::from_id_salt(("category", id))
            .selected_text(current.display_name().to_string())
            .width(110.0)
            .show_ui(&mut controls, |ui| {
                for c in Category::ALL {
                    let name = c.display_name().to_string();
                    ui.selectable_value(&mut chosen, c, name);
                }
            });
        if chosen != current {
            actions.push(UiAction::SetCategory(id, chosen));
        }

        // transcript
        let body = Rect::from_min_max(pos2(rect.min.x + 8.0, header.max.y + 4.0), pos2(rect.max.x - 8.0, rect.max.y - INPUT_HEIGHT));
        let mut body_ui = ui.new_child(egui::UiBuilder::new().max_rect(body).layout(egui::Layout::top_down(egui::Align::Min)));
        body_ui.set_clip_rect(body.intersect(ui.clip_rect()));
        let selected = self.canvas.text_selection().filter(|s| s.node == id).map(|s| s.text.clone());
        egui::ScrollArea::vertical()
            .id_salt(("transcript", id))
            .stick_to_bottom(true)
            .auto_shrink([false, false])
            .show(&mut body_ui, |ui| {
                for line in transcript {
                    let who = match line.role {
                        Role::User => "You",
                        Role::Assistant => "AI",
                    };
                    ui.horizontal_wrapped(|ui| {
                        ui.label(egui::RichText::new(who).strong());
                        if ui.small_button("Fork").on_hover_text("Start a new chat from this message").clicked() {
                            actions.push(UiAction::ForkMessage(id, line.text.clone()));
                        }
                    });
                    let mut text = egui::RichText::new(&line.text);
                    if selected.as_deref() == Some(line.text.trim()) {
                        text = text.background_color(Color32::from_rgb(0xfe, 0xf0, 0x8a));
                    }
                    if ui.add(egui::Label::new(text).sense(Sense::click())).on_hover_text("Click to select for forking").clicked() {
                        actions.push(UiAction::SelectText(id, line.text.clone()));
                    }
                    ui.add_space(6.0);
                }
                if *thinking {
                    ui.horizontal(|ui| {
                        ui.spinner();
                        ui.label("Thinking…");
                    });
                }
            });

        // input
        let input_rect = Rect::from_min_max(pos2(rect.min.x + 8.0, rect.max.y - INPUT_HEIGHT + 6.0), rect.max - vec2(RESIZE_GRIP + 4.0, 6.0));
        let mut input_ui = ui.new_child(egui::UiBuilder::new().max_rect(input_rect).layout(egui::Layout::left_to_right(egui::Align::Center)));
        let mut text = draft.clone();
        let resp = input_ui.add_enabled(
            *input_enabled,
            egui::TextEdit::singleline(&mut text).hint_text("Type a message…").desired_width(input_rect.width() - 40.0),
        );
        if text != *draft {
            actions.push(UiAction::SetDraft(id, text));
        }
        let enter = resp.lost_focus() && input_ui.input(|i| i.key_pressed(egui::Key::Enter));
        if input_ui.add_enabled(*input_enabled, egui::Button::new("→")).clicked() || enter {
            actions.push(UiAction::Submit(id));
        }
    }

    fn paint_minimap(&self, painter: &egui::Painter, available: Rect) -> Option<Rect> {
        let minimap = self.canvas.minimap();
        if !minimap.visible {
            return None;
        }
        let rect = Rect::from_min_size(available.max - minimap.size - Vec2::splat(MINIMAP_MARGIN), minimap.size);
        painter.rect_filled(rect, 6.0, Color32::from_rgba_unmultiplied(255, 255, 255, 230));
        painter.rect_stroke(rect, 6.0, Stroke::new(1.0, Color32::GRAY), egui::StrokeKind::Inside);
        let at = |p: Pos2| p + rect.min.to_vec2();
        let mm_painter = painter.with_clip_rect(rect);
        for edge in minimap.edges() {
            mm_painter.line_segment([at(edge.segment.start), at(edge.segment.end)], Stroke::new(1.0, edge.color));
        }
        for node in minimap.nodes() {
            let r = node.rect.translate(rect.min.to_vec2());
            mm_painter.rect_filled(r, 1.0, node.fill);
            mm_painter.rect_stroke(r, 1.0, Stroke::new(1.0, node.border), egui::StrokeKind::Inside);
        }
        let vp = minimap.viewport_rect().translate(rect.min.to_vec2());
        mm_painter.rect_stroke(vp, 0.0, Stroke::new(1.5, Color32::from_rgb(0x3b, 0x82, 0xf6)), egui::StrokeKind::Inside);
        Some(rect)
    }

    fn route_pointer(&mut self, ui: &egui::Ui, available: Rect, minimap: Option<Rect>, bg_resp: &egui::Response, order: &[RenderedNode]) {
        let now = Instant::now();
        let (pressed, released, latest, delta, wheel) = ui.input(|i| {
            (
                i.pointer.primary_pressed(),
                i.pointer.primary_released(),
                i.pointer.latest_pos(),
                i.pointer.delta(),
                i.raw_scroll_delta,
            )
        });
        let Some(pos) = latest else { return };
        let local = pos2(pos.x - available.min.x, pos.y - available.min.y);
        let world = self.canvas.surface().viewport.to_world(local);
        let top = order.iter().rev().find_map(|r| hit_region(r, world).map(|region| (r.id, region)));

        if pressed && available.contains(pos) {
            if let Some(mm) = minimap.filter(|mm| mm.contains(pos)) {
                self.canvas.minimap_click(pos2(pos.x - mm.min.x, pos.y - mm.min.y));
                return;
            }
            match top {
                Some((id, region)) => {
                    if region.is_interactive() && region != HitRegion::ResizeHandle {
                        if self.canvas.focused_node() != Some(id) {
                            if let Err(e) = self.canvas.select_node(id) {
                                log::debug!("{}", e);
                            }
                        }
                    } else {
                        self.canvas.pointer_down(id, region, local, now);
                    }
                }
                None => {
                    self.canvas.deselect_all();
                    self.panning = true;
                }
            }
        } else if released {
            self.panning = false;
            self.canvas.pointer_up(local, now);
        } else if self.panning && bg_resp.dragged() {
            self.canvas.scroll_by(-delta);
        } else if !self.canvas.interaction().is_idle() && self.last_pointer != Some(pos) {
            self.canvas.pointer_move(local, now);
        }

        if top.is_none() && bg_resp.hovered() && wheel != Vec2::ZERO {
            self.canvas.scroll_by(-wheel);
        }
        if !self.canvas.interaction().is_idle() {
            ui.ctx().request_repaint();
        }
        self.last_pointer = Some(pos);
    }
}

impl eframe::App for CanvasApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok((ticket, result)) = self.results_rx.try_recv() {
            self.canvas.complete_request(ticket, result);
        }
        let expired = self.canvas.expire_requests(Instant::now());
        if !expired.is_empty() {
            self.status = Some(format!("{} request(s) timed out", expired.len()));
        }
        if self.canvas.chat().in_flight() > 0 {
            ctx.request_repaint_after(Duration::from_secs(1));
        }

        self.top_bar(ctx);
        self.windows(ctx);
        self.canvas_panel(ctx);
        self.autosave_tick(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if !self.autosave.is_enabled() {
            return;
        }
        if let Err(e) = persist::save_active(&self.canvas.snapshot()) {
            log::error!("final autosave failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::node_store::Node;
    use crate::canvas::surface::RenderSurface;

    #[test]
    fn panel_regions_follow_the_layout() {
        let node = Node::new(1, pos2(100.0, 200.0), "A".into(), Category::General);
        let mut surface = RenderSurface::new();
        surface.render_node(&node, false).unwrap();
        let r = surface.node(1).unwrap();
        // header, left to right: padding, title, badge, category, collapse
        assert_eq!(hit_region(r, pos2(105.0, 210.0)), Some(HitRegion::DragHandle));
        assert_eq!(hit_region(r, pos2(140.0, 218.0)), Some(HitRegion::TitleInput));
        assert_eq!(hit_region(r, pos2(950.0, 210.0)), Some(HitRegion::DragHandle));
        assert_eq!(hit_region(r, pos2(1100.0, 210.0)), Some(HitRegion::CategorySelector));
        assert_eq!(hit_region(r, pos2(1185.0, 210.0)), Some(HitRegion::Button));
        assert_eq!(hit_region(r, pos2(600.0, 500.0)), Some(HitRegion::MessageList));
        assert_eq!(hit_region(r, pos2(600.0, 840.0)), Some(HitRegion::MessageInput));
        assert_eq!(hit_region(r, pos2(1195.0, 845.0)), Some(HitRegion::ResizeHandle));
        assert_eq!(hit_region(r, pos2(50.0, 50.0)), None);
    }
}
