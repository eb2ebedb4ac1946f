use std::cell::RefCell;

use serde_json::json;

use super::*;
use crate::protocol::parse_backend_line;
use crate::transport::Completion;

#[derive(Default)]
struct RecordingSink {
    sent: RefCell<Vec<String>>,
    pending: RefCell<Vec<Completion>>,
}

impl RecordingSink {
    fn sent(&self) -> Vec<String> {
        self.sent.borrow().clone()
    }

    fn complete_all(&self) {
        for completion in self.pending.borrow_mut().drain(..) {
            completion.complete();
        }
    }
}

impl MessageSink for RecordingSink {
    fn send_message(&self, text: &str, _metadata: &MessageMetadata, on_complete: Completion) {
        self.sent.borrow_mut().push(text.to_string());
        self.pending.borrow_mut().push(on_complete);
    }
}

fn wizard() -> App {
    App::new(
        AppOptions {
            role: Role::Wizard,
            ..AppOptions::default()
        },
        Scenario::default(),
        SchemaRegistry::builtin(),
    )
}

fn drain_into(app: &mut App, channel: &TransportChannel) {
    for event in channel.drain_limited(64) {
        app.on_transport_event(event);
    }
}

fn type_text(app: &mut App, outbox: &mut Outbox<'_>, text: &str) {
    for c in text.chars() {
        app.handle_event(AppEvent::InputChar(c), outbox, ScrollLimits::default());
    }
}

#[test]
fn default_state_is_running_user_with_text_response() {
    let app = App::default();
    assert!(app.running);
    assert_eq!(app.role(), Role::User);
    assert_eq!(app.active_pane, Pane::Response);
    assert_eq!(app.chat_state(), ChatState::TextInput);
    assert_eq!(app.response_mode(), ResponseMode::Text);
    assert!(!app.shows_search_tabs());
    assert!(app.instructions().task_description.contains("Sydney"));
}

#[test]
fn pane_focus_cycles_forward_and_backward() {
    let mut app = App::default();
    app.next_pane();
    assert_eq!(app.active_pane, Pane::Left);
    app.next_pane();
    assert_eq!(app.active_pane, Pane::Messages);
    app.prev_pane();
    app.prev_pane();
    assert_eq!(app.active_pane, Pane::Response);
}

#[test]
fn typed_message_is_sent_once_and_cleared_on_completion() {
    let mut app = App::default();
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    type_text(&mut app, &mut outbox, "hello");
    app.handle_event(AppEvent::Submit, &mut outbox, ScrollLimits::default());
    app.handle_event(AppEvent::Submit, &mut outbox, ScrollLimits::default());

    assert_eq!(sink.sent(), vec!["hello"]);
    assert!(app.text_response().is_sending());
    assert_eq!(
        app.messages().last(),
        Some(&ChatMessage {
            speaker: "User".to_string(),
            text: "hello".to_string(),
        })
    );

    sink.complete_all();
    drain_into(&mut app, &channel);
    assert!(!app.text_response().is_sending());
    assert_eq!(app.text_response().value(), "");
}

#[test]
fn inactive_chat_state_blocks_sending() {
    let mut app = App::default();
    app.apply_backend_message(BackendMessage::ChatState {
        state: ChatState::Waiting,
    });
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    type_text(&mut app, &mut outbox, "hello");
    assert_eq!(app.text_response().value(), "");
    app.handle_event(AppEvent::Submit, &mut outbox, ScrollLimits::default());
    assert!(sink.sent().is_empty());
}

#[test]
fn wizard_response_mode_follows_chat_state_and_review() {
    let mut app = wizard();
    assert_eq!(app.response_mode(), ResponseMode::Text);
    app.apply_backend_message(BackendMessage::ChatState {
        state: ChatState::Idle,
    });
    assert_eq!(app.response_mode(), ResponseMode::Idle);
    app.apply_backend_message(BackendMessage::Review);
    assert_eq!(app.response_mode(), ResponseMode::Evaluation);
}

#[test]
fn evaluation_sends_selected_verdict() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::Review);
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    app.handle_event(AppEvent::CursorRight, &mut outbox, ScrollLimits::default());
    app.handle_event(AppEvent::Submit, &mut outbox, ScrollLimits::default());
    app.handle_event(AppEvent::Submit, &mut outbox, ScrollLimits::default());
    assert_eq!(sink.sent(), vec!["approve"]);
    assert!(app.evaluation().is_sending());
}

#[test]
fn stale_send_is_released_after_timeout() {
    let mut app = App::new(
        AppOptions {
            send_timeout: Duration::from_secs(5),
            ..AppOptions::default()
        },
        Scenario::default(),
        SchemaRegistry::builtin(),
    );
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let start = Instant::now();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: start,
    };
    type_text(&mut app, &mut outbox, "hi");
    app.submit_response(&mut outbox);

    app.expire_stale_sends(start + Duration::from_secs(1));
    assert!(app.text_response().is_sending());
    app.expire_stale_sends(start + Duration::from_secs(6));
    assert!(!app.text_response().is_sending());
    assert_eq!(app.text_response().value(), "hi");
    assert_eq!(
        app.messages().last().map(|m| m.speaker.as_str()),
        Some(SYSTEM_SPEAKER)
    );

    // Late completion for the released send must not clear the retried text.
    sink.complete_all();
    drain_into(&mut app, &channel);
    assert_eq!(app.text_response().value(), "hi");
}

#[test]
fn wizard_builds_and_sends_query_from_form() {
    let mut app = wizard();
    app.active_pane = Pane::Left;
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    let limits = ScrollLimits::default();

    app.add_field("NumRooms");
    app.add_field("HasBalcony");
    app.handle_event(AppEvent::InputChar('3'), &mut outbox, limits);
    app.handle_event(AppEvent::MoveDown, &mut outbox, limits);
    app.handle_event(AppEvent::InputChar(' '), &mut outbox, limits);
    app.handle_event(AppEvent::SubmitForm, &mut outbox, limits);

    assert_eq!(sink.sent(), vec![r#"? {"NumRooms": 3, "HasBalcony": True}"#]);
    assert_eq!(app.last_query(), Some(r#"? {"NumRooms": 3, "HasBalcony": True}"#));
}

#[test]
fn find_example_disabled_outside_text_input() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::ChatState {
        state: ChatState::Waiting,
    });
    assert!(!app.find_example_enabled());
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    app.add_field("Level");
    assert_eq!(app.submit_query(&mut outbox), None);
    assert!(sink.sent().is_empty());
}

#[test]
fn picker_adds_and_remove_restores_field_list() {
    let mut app = wizard();
    app.active_pane = Pane::Left;
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    let limits = ScrollLimits::default();

    assert!(app.is_picker_row_selected());
    app.handle_event(AppEvent::Submit, &mut outbox, limits);
    assert_eq!(app.form().active_fields().fields(Category::Apartments), ["Level"]);
    assert_eq!(app.form_cursor(), 0);

    app.handle_event(AppEvent::RemoveField, &mut outbox, limits);
    assert!(app.form().active_fields().fields(Category::Apartments).is_empty());
    assert!(app.is_picker_row_selected());
}

#[test]
fn category_tabs_use_matching_schema() {
    let mut app = wizard();
    assert_eq!(app.schema().entity_key, "apartment");
    app.next_category();
    assert_eq!(app.category(), Category::Hotels);
    assert_eq!(app.schema().entity_key, "hotel");
    app.next_category();
    assert_eq!(app.category(), Category::Flights);
    assert_eq!(app.schema().entity_key, "apartment");
    app.prev_category();
    app.prev_category();
    app.prev_category();
    assert_eq!(app.category(), Category::Trains);
}

#[test]
fn search_shortcuts_are_ignored_for_users() {
    let mut app = App::default();
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut outbox = Outbox {
        sink: &sink,
        channel: &mut channel,
        now: Instant::now(),
    };
    app.handle_event(AppEvent::NextCategory, &mut outbox, ScrollLimits::default());
    app.handle_event(AppEvent::AddField, &mut outbox, ScrollLimits::default());
    assert_eq!(app.category(), Category::Apartments);
    assert_eq!(app.form().field_count(Category::Apartments), 0);
}

#[test]
fn newer_task_data_switches_to_context_view() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::TaskData {
        has_context: true,
        last_update: Some(5),
        context: vec!["Apartment in Surry Hills".to_string()],
    });
    assert_eq!(app.left_view(), LeftView::Context);
    assert_eq!(app.context(), ["Apartment in Surry Hills"]);

    app.toggle_left_view();
    app.apply_backend_message(BackendMessage::TaskData {
        has_context: true,
        last_update: Some(5),
        context: vec!["unchanged".to_string()],
    });
    assert_eq!(app.left_view(), LeftView::Task);
    assert_eq!(app.context(), ["unchanged"]);

    app.apply_backend_message(BackendMessage::TaskData {
        has_context: true,
        last_update: Some(9),
        context: Vec::new(),
    });
    assert_eq!(app.left_view(), LeftView::Context);
}

#[test]
fn setup_replaces_role_instructions_and_registers_schema() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::Setup {
        task_description: "Find a train".to_string(),
        completion_requirements: vec!["Booked".to_string()],
        completion_questions: Vec::new(),
        form_description: Some(json!({
            "db": "apartment",
            "input": [{"Name": "Station", "Type": "ShortString"}],
        })),
    });
    assert_eq!(app.instructions().task_description, "Find a train");
    assert_eq!(app.instructions().completion_requirements, vec!["Booked"]);
    assert!(app.schema().input_field("Station").is_some());
}

#[test]
fn invalid_schema_is_reported_not_registered() {
    let mut app = wizard();
    assert!(!app.register_schema_json(
        r#"{"db": "apartment", "input": [{"Name": "X", "Type": "Date"}]}"#
    ));
    assert!(app.schema().input_field("Level").is_some());
    assert_eq!(
        app.messages().last().map(|m| m.speaker.as_str()),
        Some(SYSTEM_SPEAKER)
    );
}

#[test]
fn utterances_from_others_are_listed_and_own_echo_skipped() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::Utterance {
        id: "User".to_string(),
        text: "I need two rooms".to_string(),
    });
    app.apply_backend_message(BackendMessage::Utterance {
        id: "Wizard".to_string(),
        text: "echo".to_string(),
    });
    assert_eq!(app.messages().len(), 1);
    assert_eq!(app.messages()[0].speaker, "User");
}

#[test]
fn kb_item_is_appended_to_context() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::KbItem {
        kb_item: json!({"Name": "Shadyside Apartments"}),
    });
    assert!(app.has_context());
    assert_eq!(app.kb_items(), [r#"{"Name":"Shadyside Apartments"}"#]);
}

#[test]
fn task_data_keeps_received_kb_items() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::KbItem {
        kb_item: json!({"Name": "Shadyside Apartments"}),
    });
    app.apply_backend_message(BackendMessage::TaskData {
        has_context: false,
        last_update: Some(3),
        context: Vec::new(),
    });
    assert!(app.context().is_empty());
    assert_eq!(app.kb_items(), [r#"{"Name":"Shadyside Apartments"}"#]);
    assert!(app.has_context());
}

#[test]
fn task_data_without_last_update_keeps_search_form() {
    let mut app = wizard();
    let message = parse_backend_line(r#"{"command":"task_data","has_context":false}"#)
        .expect("task data should parse");
    app.apply_backend_message(message);
    assert_eq!(app.left_view(), LeftView::Task);

    app.apply_backend_message(BackendMessage::TaskData {
        has_context: true,
        last_update: Some(0),
        context: vec!["stale".to_string()],
    });
    assert_eq!(app.left_view(), LeftView::Task);
    assert_eq!(app.context(), ["stale"]);

    app.apply_backend_message(BackendMessage::TaskData {
        has_context: true,
        last_update: Some(1),
        context: Vec::new(),
    });
    assert_eq!(app.left_view(), LeftView::Context);
}

#[test]
fn suggestions_fill_text_widget() {
    let mut app = wizard();
    app.apply_backend_message(BackendMessage::SupplySuggestions {
        suggestions: vec!["How many rooms?".to_string(), "Any budget?".to_string()],
    });
    app.cycle_suggestion(true);
    assert_eq!(app.text_response().value(), "How many rooms?");
    app.cycle_suggestion(false);
    assert_eq!(app.selected_suggestion(), Some(1));
    assert_eq!(app.text_response().value(), "Any budget?");
}

#[test]
fn chat_scroll_is_bounded() {
    let mut app = App::default();
    app.scroll_chat_up();
    assert_eq!(app.chat_scroll(), 0);
    app.scroll_chat_down(2);
    app.scroll_chat_down(2);
    app.scroll_chat_down(2);
    assert_eq!(app.chat_scroll(), 2);
}

#[test]
fn schema_tab_lists_fields_with_constraints() {
    let mut app = wizard();
    app.next_category();
    let lines = app.schema_lines();
    assert_eq!(lines[0], "Searching: hotel");
    assert!(
        lines
            .iter()
            .any(|line| line.starts_with("ServiceStartHour (Integer) 6..=10 [requires Service]"))
    );
}
