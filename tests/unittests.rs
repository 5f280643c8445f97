use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chat_canvas::canvas::chat::{BackendError, ChatRequest, CompletionBackend, CompletionResponse};
use chat_canvas::canvas::connections::{ConnectionKey, ConnectionManager};
use chat_canvas::canvas::interaction::{GestureOutcome, HitRegion};
use chat_canvas::canvas::minimap::MIN_NODE_SIDE;
use chat_canvas::canvas::node_store::{Category, CategoryFilter, Node, NodeId, NodeStore, Role};
use chat_canvas::canvas::session::SessionCodec;
use chat_canvas::canvas::surface::RenderSurface;
use chat_canvas::canvas::view_state::{BOX_SIZE, EXPANDED_SIZE, MINIMUM_Y};
use chat_canvas::canvas::{Canvas, CanvasError};
use chat_canvas::gui::frontend::hit_region;
use chat_canvas::persistence::persist;
use chat_canvas::persistence::settings::ChatSettings;
use egui::{pos2, vec2};

/// Backend double that answers from a fixed script.
struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<CompletionResponse, BackendError>>>,
    seen: Mutex<Vec<ChatRequest>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<CompletionResponse, BackendError>>) -> Self {
        Self { replies: Mutex::new(replies.into()), seen: Mutex::new(Vec::new()) }
    }
}

impl CompletionBackend for ScriptedBackend {
    fn complete(&self, request: &ChatRequest) -> Result<CompletionResponse, BackendError> {
        self.seen.lock().unwrap().push(request.clone());
        self.replies.lock().unwrap().pop_front().unwrap_or(Err(BackendError::Timeout))
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn assert_invariants(canvas: &Canvas) {
    for n in canvas.store().nodes() {
        assert!(n.y >= MINIMUM_Y, "node {} above the floor: {}", n.id, n.y);
        assert_eq!(n.is_box_view, n.size() == BOX_SIZE, "node {} box/size mismatch", n.id);
    }
    assert_eq!(canvas.connections().len(), canvas.surface().connection_count());
}

/// Send one message through the backend and deliver the answer.
fn exchange(canvas: &mut Canvas, backend: &ScriptedBackend, id: NodeId, text: &str) {
    let out = canvas.submit_message(id, text, Instant::now()).unwrap().expect("request should be issued");
    let result = backend.complete(&out.request);
    assert!(canvas.complete_request(out.ticket, result));
}

#[test]
fn fork_places_child_and_connects_it() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    canvas.set_text_selection(a, "Explain recursion");
    let b = canvas.fork_selection().expect("fork should succeed");

    let child = canvas.store().get(b).unwrap();
    assert_eq!(child.parent_id, Some(a));
    assert_eq!(child.x, 150.0 + 350.0);
    assert_eq!(child.y, 220.0_f32.max(MINIMUM_Y));
    assert_eq!(child.title, "Explain recursion");

    let key = ConnectionKey::new(a, b);
    assert!(canvas.connections().contains(&key));
    assert!(canvas.surface().connection(&key).is_some());
    assert_invariants(&canvas);
}

#[test]
fn fork_near_the_floor_stays_below_it() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 40.0)), None, Category::General);
    assert_eq!(canvas.store().get(a).unwrap().y, MINIMUM_Y);
    canvas.set_text_selection(a, "branch");
    let b = canvas.fork_selection().unwrap();
    assert_eq!(canvas.store().get(b).unwrap().y, MINIMUM_Y + 50.0);
}

#[test]
fn fork_without_selection_is_refused() {
    let mut canvas = Canvas::default();
    canvas.create_node(None, None, Category::General);
    assert!(matches!(canvas.fork_selection(), Err(CanvasError::NoSelection)));
    canvas.set_text_selection(1, "   ");
    assert!(matches!(canvas.fork_selection(), Err(CanvasError::NoSelection)));
    assert_eq!(canvas.store().len(), 1);
    assert!(canvas.connections().is_empty());
}

#[test]
fn collapse_caches_and_expand_restores_size() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);

    // resize by the grip: 1100x650 -> 900x730
    let t0 = Instant::now();
    assert_eq!(canvas.pointer_down(a, HitRegion::ResizeHandle, pos2(1250.0, 820.0), t0), GestureOutcome::ResizeStarted(a));
    assert_eq!(canvas.pointer_move(pos2(1050.0, 900.0), t0 + ms(40)), GestureOutcome::Resized(a));
    assert_eq!(canvas.pointer_up(pos2(1050.0, 900.0), t0 + ms(80)), GestureOutcome::ResizeEnded(a));
    assert_eq!(canvas.store().get(a).unwrap().size(), vec2(900.0, 730.0));

    canvas.collapse(a).unwrap();
    let node = canvas.store().get(a).unwrap();
    assert!(node.is_box_view);
    assert_eq!(node.size(), BOX_SIZE);
    assert_eq!(node.cached_expanded_size(), Some(vec2(900.0, 730.0)));
    assert!(canvas.surface().node(a).unwrap().is_icon());
    assert_eq!(canvas.focused_node(), None);

    canvas.expand(a).unwrap();
    let node = canvas.store().get(a).unwrap();
    assert!(!node.is_box_view);
    assert_eq!(node.size(), vec2(900.0, 730.0));
    assert!(!canvas.surface().node(a).unwrap().is_icon());
    assert_invariants(&canvas);
}

#[test]
fn resize_never_goes_below_minimum() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::ResizeHandle, pos2(1250.0, 820.0), t0);
    canvas.pointer_move(pos2(100.0, 100.0), t0 + ms(30));
    canvas.pointer_up(pos2(100.0, 100.0), t0 + ms(60));
    assert_eq!(canvas.store().get(a).unwrap().size(), vec2(300.0, 400.0));
}

#[test]
fn quick_click_selects_without_moving() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);
    assert_eq!(canvas.focused_node(), Some(b));

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_move(pos2(203.0, 182.0), t0 + ms(50)), GestureOutcome::Ignored);
    assert_eq!(canvas.pointer_up(pos2(203.0, 182.0), t0 + ms(120)), GestureOutcome::Click(a));
    assert_eq!(canvas.focused_node(), Some(a));
    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(150.0, 170.0));
    assert!(canvas.interaction().is_idle());
}

#[test]
fn slow_press_in_place_does_not_select() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_up(pos2(200.0, 180.0), t0 + ms(450)), GestureOutcome::Held(a));
    assert_eq!(canvas.focused_node(), Some(b));
}

#[test]
fn drag_moves_node_and_never_selects() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);
    canvas.set_text_selection(a, "child");
    let c = canvas.fork_selection().unwrap();
    canvas.select_node(b).unwrap();

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_move(pos2(260.0, 240.0), t0 + ms(40)), GestureOutcome::DragStarted(a));
    assert!(canvas.surface().node(a).unwrap().dragging);
    // still quick, but a drag is never a click
    assert_eq!(canvas.pointer_up(pos2(260.0, 240.0), t0 + ms(100)), GestureOutcome::DragEnded(a));

    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(210.0, 230.0));
    assert_eq!(canvas.focused_node(), Some(b));
    assert!(!canvas.surface().node(a).unwrap().dragging);

    // the edge followed the parent
    let seg = canvas.surface().connection(&ConnectionKey::new(a, c)).unwrap().segment;
    assert_eq!(seg.start, pos2(210.0 + EXPANDED_SIZE.x, 230.0 + EXPANDED_SIZE.y / 2.0));
    assert_invariants(&canvas);
}

#[test]
fn drag_is_clamped_to_the_floor() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    canvas.pointer_move(pos2(200.0, 20.0), t0 + ms(20));
    canvas.pointer_move(pos2(10.0, 5.0), t0 + ms(40));
    canvas.pointer_up(pos2(10.0, 5.0), t0 + ms(60));
    let node = canvas.store().get(a).unwrap();
    assert_eq!(node.y, MINIMUM_Y);
    assert_eq!(node.x, 0.0);
    assert_invariants(&canvas);
}

#[test]
fn interactive_regions_do_not_start_drags() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let t0 = Instant::now();
    assert_eq!(canvas.pointer_down(a, HitRegion::MessageInput, pos2(400.0, 790.0), t0), GestureOutcome::Ignored);
    assert_eq!(canvas.pointer_move(pos2(600.0, 600.0), t0 + ms(20)), GestureOutcome::Ignored);
    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(150.0, 170.0));
}

#[test]
fn selecting_across_the_title_leaves_the_node_in_place() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let press = pos2(190.0, 188.0);
    let region = hit_region(canvas.surface().node(a).unwrap(), press).unwrap();
    assert_eq!(region, HitRegion::TitleInput);

    let t0 = Instant::now();
    assert_eq!(canvas.pointer_down(a, region, press, t0), GestureOutcome::Ignored);
    assert_eq!(canvas.pointer_move(press + vec2(80.0, 0.0), t0 + ms(30)), GestureOutcome::Ignored);
    assert_eq!(canvas.pointer_up(press + vec2(80.0, 0.0), t0 + ms(60)), GestureOutcome::Ignored);
    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(150.0, 170.0));

    // the category picker is just as inert
    let picker = pos2(150.0 + 1000.0, 188.0);
    assert_eq!(hit_region(canvas.surface().node(a).unwrap(), picker), Some(HitRegion::CategorySelector));
}

#[test]
fn click_allows_exactly_five_pixels_of_travel() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);
    assert_eq!(canvas.focused_node(), Some(b));

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_move(pos2(205.0, 185.0), t0 + ms(50)), GestureOutcome::Ignored);
    assert_eq!(canvas.pointer_up(pos2(205.0, 185.0), t0 + ms(199)), GestureOutcome::Click(a));
    assert_eq!(canvas.focused_node(), Some(a));
    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(150.0, 170.0));
}

#[test]
fn six_pixels_of_travel_starts_a_drag() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_move(pos2(206.0, 180.0), t0 + ms(20)), GestureOutcome::DragStarted(a));
    assert_eq!(canvas.pointer_up(pos2(206.0, 180.0), t0 + ms(40)), GestureOutcome::DragEnded(a));
    assert_eq!(canvas.store().get(a).unwrap().pos(), pos2(156.0, 170.0));
    assert_eq!(canvas.focused_node(), Some(b));
}

#[test]
fn press_of_exactly_the_click_time_is_a_hold() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);

    let t0 = Instant::now();
    canvas.pointer_down(a, HitRegion::DragHandle, pos2(200.0, 180.0), t0);
    assert_eq!(canvas.pointer_up(pos2(200.0, 180.0), t0 + ms(200)), GestureOutcome::Held(a));
    assert_eq!(canvas.focused_node(), Some(b));
}

#[test]
fn minimap_keeps_tiny_nodes_visible() {
    let mut canvas = Canvas::default();
    canvas.create_node(Some(pos2(5000.0, 3000.0)), None, Category::General);
    let b = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::Research);
    canvas.collapse(b).unwrap();

    let scale = canvas.minimap().scale();
    assert!(BOX_SIZE.x * scale < MIN_NODE_SIDE);
    let icon = canvas.minimap().nodes().iter().find(|n| n.id == b).unwrap();
    assert!((icon.rect.width() - MIN_NODE_SIDE).abs() < 1e-3);
    assert!((icon.rect.height() - MIN_NODE_SIDE).abs() < 1e-3);
    assert_eq!(icon.rect.min, pos2(150.0 * scale, 170.0 * scale));
}

#[test]
fn dragging_an_icon_never_expands_it() {
    let mut canvas = Canvas::default();
    canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let b = canvas.create_node(None, None, Category::General);
    canvas.collapse(b).unwrap();
    let start = canvas.store().get(b).unwrap().pos();

    let t0 = Instant::now();
    canvas.pointer_down(b, HitRegion::Icon, start + vec2(10.0, 10.0), t0);
    canvas.pointer_move(start + vec2(40.0, 10.0), t0 + ms(30));
    assert_eq!(canvas.pointer_up(start + vec2(40.0, 10.0), t0 + ms(60)), GestureOutcome::DragEnded(b));
    assert!(canvas.store().get(b).unwrap().is_box_view);

    // a clean click on the icon brings the panel back
    let now = canvas.store().get(b).unwrap().pos();
    canvas.pointer_down(b, HitRegion::Icon, now + vec2(10.0, 10.0), t0 + ms(500));
    assert_eq!(canvas.pointer_up(now + vec2(11.0, 10.0), t0 + ms(580)), GestureOutcome::Click(b));
    assert!(!canvas.store().get(b).unwrap().is_box_view);
    assert_eq!(canvas.focused_node(), Some(b));
    assert_invariants(&canvas);
}

#[test]
fn reconciliation_is_idempotent() {
    let mut store = NodeStore::new();
    let mut surface = RenderSurface::new();
    let mut connections = ConnectionManager::new();
    let a = store.create_node(pos2(150.0, 170.0), None, Category::General);
    let b = store.create_node(pos2(900.0, 300.0), None, Category::Research);
    let c = store.create_node(pos2(900.0, 1000.0), None, Category::Other("astronomy".into()));
    store.get_mut(b).unwrap().parent_id = Some(a);
    store.get_mut(c).unwrap().parent_id = Some(b);
    // parent that never existed
    let d = store.create_node(pos2(1800.0, 300.0), None, Category::General);
    store.get_mut(d).unwrap().parent_id = Some(999);
    for n in store.nodes() {
        surface.render_node(n, false).unwrap();
    }

    connections.update_all_connections(&store, &mut surface);
    let first = connections.keys();
    connections.update_all_connections(&store, &mut surface);
    assert_eq!(connections.keys(), first);
    assert_eq!(first.len(), 2);
    assert_eq!(surface.connection_count(), 2);

    // unknown category draws in gray
    let edge = surface.connection(&ConnectionKey::new(b, c)).unwrap();
    assert_eq!(edge.color, Category::Research.color());
    assert_eq!(Category::Other("astronomy".into()).color(), Category::General.color());

    // a stray visual is swept by the next pass
    connections.remove_connection(ConnectionKey::new(a, b), &mut surface);
    connections.update_all_connections(&store, &mut surface);
    assert_eq!(connections.keys(), first);

    connections.remove_node_connections(b, &mut surface);
    assert!(connections.is_empty());
    assert_eq!(surface.connection_count(), 0);
}

#[test]
fn filter_hides_nodes_and_their_edges() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    canvas.set_text_selection(a, "topic");
    let b = canvas.fork_selection().unwrap();
    canvas.set_category(b, Category::Research).unwrap();
    assert_eq!(canvas.connections().len(), 1);

    canvas.filter_by_category(CategoryFilter::Only(Category::General));
    assert!(!canvas.surface().is_visible(b));
    assert!(canvas.surface().is_visible(a));
    assert!(canvas.connections().is_empty());
    assert_eq!(canvas.surface().connection_count(), 0);
    assert_eq!(canvas.minimap().nodes().len(), 1);
    assert!(canvas.minimap().edges().is_empty());

    // choosing the same category again lifts the filter
    canvas.filter_by_category(CategoryFilter::Only(Category::General));
    assert!(canvas.surface().is_visible(b));
    assert_eq!(canvas.connections().len(), 1);
    assert_eq!(canvas.minimap().edges().len(), 1);
}

#[test]
fn backend_failure_yields_one_tagged_reply() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(None, None, Category::General);
    let backend = ScriptedBackend::new(vec![Err(BackendError::Network("connection refused".into()))]);

    let out = canvas.submit_message(a, "hello", Instant::now()).unwrap().unwrap();
    assert!(canvas.store().get(a).unwrap().is_thinking);
    // a second submission while waiting is refused
    assert!(canvas.submit_message(a, "again", Instant::now()).unwrap().is_none());

    let result = backend.complete(&out.request);
    assert!(canvas.complete_request(out.ticket, result));

    let node = canvas.store().get(a).unwrap();
    assert!(!node.is_thinking);
    assert_eq!(node.messages.len(), 2);
    assert_eq!(node.messages[0].role, Role::User);
    let replies: Vec<_> = node.messages.iter().filter(|m| m.role == Role::Assistant).collect();
    assert_eq!(replies.len(), 1);
    assert!(replies[0].content.starts_with("[NETWORK ERROR]"));
    assert_eq!(canvas.stats().message_count, 2);

    let seen = backend.seen.lock().unwrap();
    assert_eq!(seen[0].messages[0].content, "hello");
    assert_eq!(seen[0].model, "deepseek-chat");
}

#[test]
fn successful_reply_is_appended_in_order() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(None, None, Category::General);
    let backend = ScriptedBackend::new(vec![
        Ok(CompletionResponse::text(" Recursion is a function calling itself. ")),
        Ok(CompletionResponse::failure("bad model", Some("404"))),
    ]);
    exchange(&mut canvas, &backend, a, "Explain recursion");
    exchange(&mut canvas, &backend, a, "More");

    let msgs = &canvas.store().get(a).unwrap().messages;
    let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    assert_eq!(msgs[1].content, "Recursion is a function calling itself.");
    assert!(msgs[3].content.starts_with("[MODEL UNAVAILABLE]"));
}

#[test]
fn overdue_request_times_out_and_late_answer_is_dropped() {
    let mut canvas = Canvas::new(ChatSettings { request_timeout_secs: 5, ..Default::default() });
    let a = canvas.create_node(None, None, Category::General);
    let t0 = Instant::now();
    let out = canvas.submit_message(a, "hello", t0).unwrap().unwrap();

    assert!(canvas.expire_requests(t0 + Duration::from_secs(3)).is_empty());
    assert_eq!(canvas.expire_requests(t0 + Duration::from_secs(6)), vec![out.ticket]);
    let node = canvas.store().get(a).unwrap();
    assert!(!node.is_thinking);
    assert!(node.messages[1].content.starts_with("[TIMEOUT ERROR]"));

    assert!(!canvas.complete_request(out.ticket, Ok(CompletionResponse::text("late"))));
    assert_eq!(canvas.store().get(a).unwrap().messages.len(), 2);
}

#[test]
fn session_round_trip_preserves_the_graph() {
    let mut canvas = Canvas::default();
    let backend = ScriptedBackend::new(vec![Ok(CompletionResponse::text("Sure.")), Err(BackendError::HttpStatus(500))]);
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::Planning);
    exchange(&mut canvas, &backend, a, "Plan a trip");
    canvas.set_text_selection(a, "Sure.");
    let b = canvas.fork_selection().unwrap();
    exchange(&mut canvas, &backend, b, "Go on");
    canvas.set_text_selection(b, "Go on");
    let c = canvas.fork_selection().unwrap();
    canvas.set_category(c, Category::Other("travel".into())).unwrap();
    canvas.rename(c, "Side trip").unwrap();

    let before: BTreeMap<NodeId, Node> = canvas.store().nodes().iter().map(|n| (n.id, n.clone())).collect();
    let json = SessionCodec::to_json(&canvas.snapshot()).unwrap();
    let records = SessionCodec::parse(&json).unwrap().unwrap();
    let report = canvas.load_session(records);

    assert_eq!(report.loaded, 3);
    assert_eq!(canvas.store().len(), 3);
    let max_old = *before.keys().max().unwrap();
    for (old, node) in &before {
        let new_id = report.id_map[old];
        assert!(new_id > max_old, "ids are never reused");
        let loaded = canvas.store().get(new_id).unwrap();
        assert_eq!(loaded.title, node.title);
        assert_eq!(loaded.category, node.category);
        assert_eq!(loaded.messages, node.messages);
        assert_eq!(loaded.parent_id, node.parent_id.map(|p| report.id_map[&p]));
    }
    assert_eq!(canvas.connections().len(), 2);
    assert_eq!(canvas.stats().message_count, 4);

    // origin stays open and focused, the rest come back as icons
    let origin = report.origin.unwrap();
    assert_eq!(origin, report.id_map[&a]);
    assert_eq!(canvas.focused_node(), Some(origin));
    assert!(!canvas.store().get(origin).unwrap().is_box_view);
    assert!(canvas.store().get(report.id_map[&b]).unwrap().is_box_view);
    assert_invariants(&canvas);
}

#[test]
fn load_remaps_parent_ids_and_repairs_records() {
    let mut canvas = Canvas::default();
    for _ in 0..3 {
        canvas.create_node(None, None, Category::General);
    }
    let json = r#"{
        "nodes": [
            {"id": 1, "x": 150, "y": 170, "width": 1100, "height": 650, "title": "Origin Prompt",
             "category": "general", "messages": [], "isThinking": false, "parentId": null, "isBoxView": false},
            {"id": 2, "x": 500, "y": 40, "width": 60, "height": 60, "title": "Child",
             "category": "research", "messages": [{"role": "user", "content": "hi", "timestamp": 1700000000000}],
             "isThinking": true, "parentId": 1, "isBoxView": true},
            {"id": 3, "x": 900, "y": 300, "width": 1100, "height": 650, "title": "Orphan",
             "category": "general", "messages": [], "isThinking": false, "parentId": 77, "isBoxView": false}
        ],
        "timestamp": "2024-01-01T00:00:00.000Z"
    }"#;
    let records = SessionCodec::parse(json).unwrap().unwrap();
    let report = canvas.load_session(records);

    let n1 = report.id_map[&1];
    let n2 = report.id_map[&2];
    let n3 = report.id_map[&3];
    assert!(n1 > 3 && n2 > 3 && n3 > 3);
    assert_eq!(canvas.store().get(n2).unwrap().parent_id, Some(n1));
    assert_eq!(canvas.store().get(n3).unwrap().parent_id, None);
    assert_eq!(canvas.connections().len(), 1);
    assert!(canvas.connections().contains(&ConnectionKey::new(n1, n2)));

    let child = canvas.store().get(n2).unwrap();
    assert_eq!(child.y, MINIMUM_Y);
    assert!(!child.is_thinking);
    assert_eq!(child.messages[0].timestamp, 1_700_000_000_000);
    assert_eq!(report.origin, Some(n1));
    assert_invariants(&canvas);
}

#[test]
fn unusable_session_text_leaves_canvas_alone() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(None, Some("Keep me".into()), Category::General);
    assert!(SessionCodec::parse("{ not json").is_err());
    assert_eq!(SessionCodec::parse(r#"{"nodes": "nope"}"#).unwrap(), None);
    assert_eq!(canvas.store().get(a).unwrap().title, "Keep me");
}

#[test]
fn clear_keeps_counting_ids() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(None, None, Category::General);
    canvas.set_text_selection(a, "x");
    canvas.fork_selection().unwrap();
    canvas.clear();
    assert!(canvas.store().is_empty());
    assert!(canvas.connections().is_empty());
    assert_eq!(canvas.surface().connection_count(), 0);
    assert_eq!(canvas.focused_node(), None);

    let next = canvas.create_node(None, None, Category::General);
    assert_eq!(next, 3);
    assert_eq!(canvas.store().get(next).unwrap().title, "Origin Prompt");
}

#[test]
fn minimap_clicks_navigate() {
    let mut canvas = Canvas::default();
    let a = canvas.create_node(Some(pos2(150.0, 170.0)), None, Category::General);
    let scale = canvas.minimap().scale();
    assert!(scale <= 0.15);

    // click inside the node's projected rectangle
    let r = canvas.minimap().nodes()[0].rect;
    assert_eq!(canvas.minimap().nodes()[0].id, a);
    canvas.minimap_click(r.center());
    let vp = canvas.surface().viewport;
    let center = canvas.store().get(a).unwrap().rect().center();
    let expected = (center.to_vec2() - vp.size / 2.0).max(vec2(0.0, 0.0)).min(vp.max_scroll());
    assert!((vp.scroll - expected).length() < 1e-3);
    assert_eq!(canvas.focused_node(), Some(a));

    // far corner of empty minimap space: scroll clamps to the canvas
    canvas.minimap_click(pos2(270.0, 150.0));
    let vp = canvas.surface().viewport;
    assert!((vp.scroll - vp.max_scroll()).length() < 1e-3);
    assert!((canvas.minimap().viewport_rect().min.x - vp.scroll.x * scale).abs() < 1e-3);
}

#[test]
fn canvas_grows_with_nodes() {
    let mut canvas = Canvas::default();
    assert_eq!(canvas.surface().viewport.canvas_size, vec2(2000.0, 1500.0));
    canvas.create_node(Some(pos2(3000.0, 2000.0)), None, Category::General);
    let size = canvas.surface().viewport.canvas_size;
    assert_eq!(size, vec2(3000.0 + 1100.0 + 100.0 + 300.0, 2000.0 + 650.0 + 100.0 + 300.0));
    canvas.center_all_nodes();
    canvas.reset_view();
    assert_eq!(canvas.surface().viewport.scroll, vec2(0.0, 0.0));
}

#[test]
fn autosave_slot_round_trips_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let mut canvas = Canvas::default();

    // nothing is written for an empty canvas
    assert_eq!(persist::save_active_in(dir.path(), &canvas.snapshot()).unwrap(), None);
    assert_eq!(persist::load_active_in(dir.path()).unwrap(), None);

    let a = canvas.create_node(None, None, Category::Learning);
    canvas.set_text_selection(a, "more");
    canvas.fork_selection().unwrap();
    let path = persist::save_active_in(dir.path(), &canvas.snapshot()).unwrap().unwrap();
    assert!(path.exists());

    let records = persist::load_active_in(dir.path()).unwrap().unwrap();
    assert_eq!(records.len(), 2);
    let mut restored = Canvas::default();
    restored.load_session(records);
    assert_eq!(restored.connections().len(), 1);

    persist::clear_active_in(dir.path()).unwrap();
    assert!(!path.exists());
    assert_eq!(persist::load_active_in(dir.path()).unwrap(), None);
}

#[test]
fn export_and_import_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut canvas = Canvas::default();
    canvas.create_node(None, Some("Exported".into()), Category::Creative);

    let name = persist::export_file_name(time::OffsetDateTime::now_utc());
    assert!(name.starts_with("llm-canvas-session-") && name.ends_with(".json"));
    let path = persist::save_export(&dir.path().join("exports").join(name), &canvas.snapshot()).unwrap();
    let records = persist::read_session_file(&path).unwrap().unwrap();
    assert_eq!(records[0].title, "Exported");
    assert_eq!(records[0].category, Category::Creative);

    let broken = dir.path().join("broken.json");
    std::fs::write(&broken, "{ nodes: ").unwrap();
    assert!(persist::read_session_file(&broken).is_err());
    assert!(persist::read_session_file(&dir.path().join("missing.json")).is_err());
}
