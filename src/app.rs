use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::events::AppEvent;
use crate::form::{EncodedSubmission, FormError};
use crate::protocol::{BackendMessage, ChatState, Role};
use crate::query_form::{FieldInput, QueryForm};
use crate::scenario::{RoleInstructions, Scenario};
use crate::schema::{Category, EntitySchema, SchemaRegistry};
use crate::transport::{MessageMetadata, MessageSink, SendId, TransportChannel, TransportEvent};
use crate::widgets::{DEFAULT_SEND_TIMEOUT, EvaluationResponse, TextResponse};

pub const SYSTEM_SPEAKER: &str = "System";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pane {
    Left,
    Messages,
    Response,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeftView {
    Task,
    Context,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerTab {
    InstructionSchema,
    KnowledgeBase,
}

impl InnerTab {
    pub fn label(self) -> &'static str {
        match self {
            InnerTab::InstructionSchema => "Your Instruction Schema",
            InnerTab::KnowledgeBase => "Knowledge Base",
        }
    }

    fn toggled(self) -> Self {
        match self {
            InnerTab::InstructionSchema => InnerTab::KnowledgeBase,
            InnerTab::KnowledgeBase => InnerTab::InstructionSchema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Text,
    Idle,
    Evaluation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub speaker: String,
    pub text: String,
}

/// What the event loop hands the app so it can send messages.
pub struct Outbox<'a> {
    pub sink: &'a dyn MessageSink,
    pub channel: &'a mut TransportChannel,
    pub now: Instant,
}

#[derive(Debug, Clone)]
pub struct AppOptions {
    pub role: Role,
    pub onboarding: bool,
    pub send_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            role: Role::User,
            onboarding: false,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct App {
    pub running: bool,
    pub ticks: u64,
    pub active_pane: Pane,
    role: Role,
    onboarding: bool,
    send_timeout: Duration,
    chat_state: ChatState,
    scenario: Scenario,
    registry: SchemaRegistry,
    left_view: LeftView,
    left_scroll: u16,
    has_context: bool,
    last_update: u64,
    context: Vec<String>,
    kb_items: Vec<String>,
    category: Category,
    inner_tab: InnerTab,
    form: QueryForm,
    form_cursor: usize,
    last_query: Option<String>,
    messages: Vec<ChatMessage>,
    chat_scroll: u16,
    suggestions: Vec<String>,
    selected_suggestion: Option<usize>,
    review_requested: bool,
    text_response: TextResponse,
    evaluation: EvaluationResponse,
}

impl Default for App {
    fn default() -> Self {
        Self::new(AppOptions::default(), Scenario::default(), SchemaRegistry::builtin())
    }
}

impl App {
    pub fn new(options: AppOptions, scenario: Scenario, registry: SchemaRegistry) -> Self {
        Self {
            running: true,
            ticks: 0,
            active_pane: Pane::Response,
            role: options.role,
            onboarding: options.onboarding,
            send_timeout: options.send_timeout,
            chat_state: ChatState::TextInput,
            scenario,
            registry,
            left_view: LeftView::Task,
            left_scroll: 0,
            has_context: false,
            last_update: 0,
            context: Vec::new(),
            kb_items: Vec::new(),
            category: Category::Apartments,
            inner_tab: InnerTab::KnowledgeBase,
            form: QueryForm::default(),
            form_cursor: 0,
            last_query: None,
            messages: Vec::new(),
            chat_scroll: 0,
            suggestions: Vec::new(),
            selected_suggestion: None,
            review_requested: false,
            text_response: TextResponse::default(),
            evaluation: EvaluationResponse::default(),
        }
    }

    pub fn on_tick(&mut self) {
        self.ticks = self.ticks.saturating_add(1);
    }

    pub fn quit(&mut self) {
        self.running = false;
    }

    pub fn next_pane(&mut self) {
        self.active_pane = match self.active_pane {
            Pane::Left => Pane::Messages,
            Pane::Messages => Pane::Response,
            Pane::Response => Pane::Left,
        };
    }

    pub fn prev_pane(&mut self) {
        self.active_pane = match self.active_pane {
            Pane::Left => Pane::Response,
            Pane::Messages => Pane::Left,
            Pane::Response => Pane::Messages,
        };
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn agent_id(&self) -> &'static str {
        self.role.agent_id()
    }

    pub fn is_onboarding(&self) -> bool {
        self.onboarding
    }

    pub fn chat_state(&self) -> ChatState {
        self.chat_state
    }

    /// Whether the left pane shows the wizard's search tabs rather than the
    /// task instructions.
    pub fn shows_search_tabs(&self) -> bool {
        self.role == Role::Wizard && !self.onboarding
    }

    pub fn instructions(&self) -> &RoleInstructions {
        self.scenario.for_role(self.role)
    }

    pub fn left_view(&self) -> LeftView {
        self.left_view
    }

    pub fn left_scroll(&self) -> u16 {
        self.left_scroll
    }

    pub fn has_context(&self) -> bool {
        self.has_context || !self.kb_items.is_empty()
    }

    /// Context from the latest task data; replaced on every update.
    pub fn context(&self) -> &[String] {
        &self.context
    }

    /// Knowledge-base items in arrival order; task data never clears them.
    pub fn kb_items(&self) -> &[String] {
        &self.kb_items
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn inner_tab(&self) -> InnerTab {
        self.inner_tab
    }

    pub fn schema(&self) -> &EntitySchema {
        self.registry.for_category(self.category)
    }

    pub fn form(&self) -> &QueryForm {
        &self.form
    }

    pub fn form_cursor(&self) -> usize {
        self.form_cursor
    }

    pub fn is_picker_row_selected(&self) -> bool {
        self.form_cursor >= self.form.field_count(self.category)
    }

    pub fn last_query(&self) -> Option<&str> {
        self.last_query.as_deref()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn chat_scroll(&self) -> u16 {
        self.chat_scroll
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn selected_suggestion(&self) -> Option<usize> {
        self.selected_suggestion
    }

    pub fn text_response(&self) -> &TextResponse {
        &self.text_response
    }

    pub fn evaluation(&self) -> &EvaluationResponse {
        &self.evaluation
    }

    pub fn response_mode(&self) -> ResponseMode {
        match self.role {
            Role::User => ResponseMode::Text,
            Role::Wizard if self.review_requested => ResponseMode::Evaluation,
            Role::Wizard if self.chat_state == ChatState::TextInput => ResponseMode::Text,
            Role::Wizard => ResponseMode::Idle,
        }
    }

    /// The text widget accepts input only while the host waits for it.
    pub fn text_active(&self) -> bool {
        self.chat_state == ChatState::TextInput
    }

    pub fn evaluation_active(&self) -> bool {
        self.chat_state != ChatState::Done
    }

    pub fn find_example_enabled(&self) -> bool {
        self.chat_state == ChatState::TextInput
    }

    pub fn push_message(&mut self, speaker: impl Into<String>, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            speaker: speaker.into(),
            text: text.into(),
        });
    }

    pub fn push_system_message(&mut self, text: impl Into<String>) {
        self.push_message(SYSTEM_SPEAKER, text);
    }

    pub fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Completed(id) => self.on_send_complete(id),
            TransportEvent::Backend(message) => self.apply_backend_message(message),
            TransportEvent::System(line) => self.push_system_message(line),
        }
    }

    /// Completions are matched by id; one nobody waits for is dropped.
    pub fn on_send_complete(&mut self, id: SendId) {
        if self.text_response.on_send_complete(id) || self.evaluation.on_send_complete(id) {
            debug!(send_id = id.get(), "send completed");
        } else {
            debug!(send_id = id.get(), "ignoring completion for released or untracked send");
        }
    }

    pub fn expire_stale_sends(&mut self, now: Instant) {
        let expired_text = self.text_response.expire_stale(now, self.send_timeout);
        let expired_eval = self.evaluation.expire_stale(now, self.send_timeout);
        if expired_text.is_some() || expired_eval.is_some() {
            self.push_system_message("Message delivery timed out; you can try again.");
        }
    }

    pub fn apply_backend_message(&mut self, message: BackendMessage) {
        match message {
            BackendMessage::Setup {
                task_description,
                completion_requirements,
                completion_questions,
                form_description,
            } => {
                let instructions = self.scenario.for_role_mut(self.role);
                instructions.task_description = task_description;
                instructions.completion_requirements = completion_requirements;
                instructions.completion_questions = completion_questions;
                if let Some(description) = form_description {
                    self.register_schema_json(&description.to_string());
                }
                self.left_scroll = 0;
                info!(role = self.agent_id(), "task setup received");
            }
            BackendMessage::Review => {
                self.review_requested = true;
                info!("review requested");
            }
            BackendMessage::SupplySuggestions { suggestions } => {
                self.selected_suggestion = None;
                self.suggestions = suggestions;
            }
            BackendMessage::ChatState { state } => {
                debug!(state = state.label(), "chat state changed");
                self.chat_state = state;
            }
            BackendMessage::TaskData {
                has_context,
                last_update,
                context,
            } => self.apply_task_data(has_context, last_update, context),
            BackendMessage::Utterance { id, text } => {
                if id == self.agent_id() {
                    debug!("skipping echo of own utterance");
                } else {
                    self.push_message(id, text);
                }
            }
            BackendMessage::KbItem { kb_item } => self.kb_items.push(kb_item.to_string()),
        }
    }

    /// Only an explicit `last_update` newer than the last one seen moves the
    /// left pane to the context view.
    fn apply_task_data(&mut self, has_context: bool, last_update: Option<u64>, context: Vec<String>) {
        self.has_context = has_context;
        self.context = context;
        match last_update {
            Some(update) if update > self.last_update => {
                self.last_update = update;
                self.left_view = LeftView::Context;
                self.left_scroll = 0;
            }
            _ => {}
        }
    }

    /// Registers an extra schema in the search API json layout; a bad one
    /// is reported and skipped.
    pub fn register_schema_json(&mut self, json: &str) -> bool {
        match EntitySchema::from_api_json(json) {
            Ok(schema) => {
                info!(entity = %schema.entity_key, "schema registered");
                self.registry.insert(schema);
                true
            }
            Err(err) => {
                warn!(error = %err, "ignoring invalid schema");
                self.push_system_message(format!("Ignoring invalid schema: {err}"));
                false
            }
        }
    }

    pub fn toggle_left_view(&mut self) {
        self.left_view = match self.left_view {
            LeftView::Task => LeftView::Context,
            LeftView::Context => LeftView::Task,
        };
        self.left_scroll = 0;
    }

    pub fn next_category(&mut self) {
        self.set_category(self.category.next());
    }

    pub fn prev_category(&mut self) {
        self.set_category(self.category.prev());
    }

    fn set_category(&mut self, category: Category) {
        self.category = category;
        self.form_cursor = 0;
        self.left_view = LeftView::Task;
    }

    pub fn toggle_inner_tab(&mut self) {
        self.inner_tab = self.inner_tab.toggled();
        self.left_scroll = 0;
    }

    fn is_form_visible(&self) -> bool {
        self.shows_search_tabs()
            && self.left_view == LeftView::Task
            && self.inner_tab == InnerTab::KnowledgeBase
    }

    pub fn add_picked_field(&mut self) -> Option<String> {
        let schema = self.registry.for_category(self.category);
        let added = self.form.add_picked_field(schema, self.category)?;
        self.form_cursor = self.form.field_count(self.category).saturating_sub(1);
        Some(added)
    }

    pub fn add_field(&mut self, field_name: &str) {
        let schema = self.registry.for_category(self.category);
        self.form.add_field(schema, self.category, field_name);
    }

    pub fn remove_field(&mut self, field_name: &str) -> Option<usize> {
        let removed = self.form.remove_field(self.category, field_name);
        self.clamp_form_cursor();
        removed
    }

    pub fn remove_selected_field(&mut self) -> Option<String> {
        let name = self
            .form
            .active_fields()
            .fields(self.category)
            .get(self.form_cursor)?
            .clone();
        self.remove_field(&name)?;
        Some(name)
    }

    fn clamp_form_cursor(&mut self) {
        self.form_cursor = self.form_cursor.min(self.form.field_count(self.category));
    }

    fn selected_input_mut(&mut self) -> Option<&mut FieldInput> {
        self.form.input_mut(self.category, self.form_cursor)
    }

    pub fn form_move_up(&mut self) {
        self.form_cursor = self.form_cursor.saturating_sub(1);
    }

    pub fn form_move_down(&mut self) {
        self.form_cursor = (self.form_cursor + 1).min(self.form.field_count(self.category));
    }

    pub fn form_cycle(&mut self, forward: bool) {
        if self.is_picker_row_selected() {
            let schema = self.registry.for_category(self.category);
            self.form.cycle_picker(schema, self.category, forward);
        } else if let Some(input) = self.selected_input_mut() {
            input.cycle(forward);
        }
    }

    pub fn form_input_char(&mut self, c: char) {
        if let Some(input) = self.selected_input_mut() {
            if input.accepts_text() {
                input.input_char(c);
            } else if c == ' ' {
                input.activate();
            }
        }
    }

    pub fn form_backspace(&mut self) {
        if let Some(input) = self.selected_input_mut() {
            input.backspace();
        }
    }

    pub fn form_activate(&mut self) {
        if self.is_picker_row_selected() {
            self.add_picked_field();
        } else if let Some(input) = self.selected_input_mut() {
            input.activate();
        }
    }

    pub fn encode_query(&self) -> Result<EncodedSubmission, FormError> {
        self.form.encode(self.schema(), self.category)
    }

    /// Sends the current category's form as a query; disabled outside
    /// `text_input`.
    pub fn submit_query(&mut self, outbox: &mut Outbox<'_>) -> Option<SendId> {
        if !self.find_example_enabled() {
            debug!(state = self.chat_state.label(), "find example disabled");
            return None;
        }
        let encoded = match self.encode_query() {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!(error = %err, "failed to encode query");
                self.push_system_message(format!("Could not build query: {err}"));
                return None;
            }
        };
        for skipped in &encoded.skipped {
            self.push_system_message(format!("Skipped field: {skipped}"));
        }
        let completion = outbox.channel.completion();
        let id = completion.id();
        info!(category = self.category.label(), query = %encoded.text, "sending query");
        outbox
            .sink
            .send_message(&encoded.text, &MessageMetadata::new(), completion);
        self.last_query = Some(encoded.text);
        Some(id)
    }

    pub fn submit_response(&mut self, outbox: &mut Outbox<'_>) -> Option<SendId> {
        match self.response_mode() {
            ResponseMode::Text => {
                let active = self.text_active();
                let text = self.text_response.value().to_string();
                let id = self.text_response.try_send(
                    active,
                    outbox.sink,
                    outbox.channel,
                    outbox.now,
                )?;
                self.push_message(self.agent_id(), text);
                self.selected_suggestion = None;
                Some(id)
            }
            ResponseMode::Evaluation => {
                let verdict = self.evaluation.selected();
                let active = self.evaluation_active();
                let id = self.evaluation.try_send(
                    verdict,
                    active,
                    outbox.sink,
                    outbox.channel,
                    outbox.now,
                )?;
                self.push_message(self.agent_id(), verdict.label());
                Some(id)
            }
            ResponseMode::Idle => None,
        }
    }

    pub fn response_input_char(&mut self, c: char) {
        if self.response_mode() == ResponseMode::Text {
            let active = self.text_active();
            self.text_response.input_char(active, c);
        }
    }

    pub fn response_backspace(&mut self) {
        if self.response_mode() == ResponseMode::Text {
            let active = self.text_active();
            self.text_response.backspace(active);
        }
    }

    pub fn response_cursor(&mut self, forward: bool) {
        match self.response_mode() {
            ResponseMode::Text if forward => self.text_response.move_cursor_right(),
            ResponseMode::Text => self.text_response.move_cursor_left(),
            ResponseMode::Evaluation => self.evaluation.select_other(),
            ResponseMode::Idle => {}
        }
    }

    /// Steps through the backend's suggested replies and copies the
    /// highlighted one into the text widget.
    pub fn cycle_suggestion(&mut self, forward: bool) {
        if self.suggestions.is_empty()
            || self.response_mode() != ResponseMode::Text
            || self.text_response.is_sending()
        {
            return;
        }
        let len = self.suggestions.len();
        let next = match (self.selected_suggestion, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(idx), true) => (idx + 1) % len,
            (Some(idx), false) => (idx + len - 1) % len,
        };
        self.selected_suggestion = Some(next);
        self.text_response.set_value(self.suggestions[next].clone());
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_down(&mut self, max_scroll: u16) {
        self.chat_scroll = (self.chat_scroll + 1).min(max_scroll);
    }

    pub fn scroll_left_up(&mut self) {
        self.left_scroll = self.left_scroll.saturating_sub(1);
    }

    pub fn scroll_left_down(&mut self, max_scroll: u16) {
        self.left_scroll = (self.left_scroll + 1).min(max_scroll);
    }

    pub fn handle_event(&mut self, event: AppEvent, outbox: &mut Outbox<'_>, limits: ScrollLimits) {
        match event {
            AppEvent::Tick => self.on_tick(),
            AppEvent::Quit => self.quit(),
            AppEvent::NextPane => self.next_pane(),
            AppEvent::PrevPane => self.prev_pane(),
            AppEvent::ScrollChatUp | AppEvent::MouseScrollUp => self.scroll_chat_up(),
            AppEvent::ScrollChatDown | AppEvent::MouseScrollDown => {
                self.scroll_chat_down(limits.chat)
            }
            AppEvent::NextCategory if self.shows_search_tabs() => self.next_category(),
            AppEvent::PrevCategory if self.shows_search_tabs() => self.prev_category(),
            AppEvent::ToggleInnerTab if self.shows_search_tabs() => self.toggle_inner_tab(),
            AppEvent::ToggleLeftView => self.toggle_left_view(),
            AppEvent::SubmitForm if self.shows_search_tabs() => {
                self.submit_query(outbox);
            }
            AppEvent::AddField if self.is_form_visible() => {
                self.add_picked_field();
            }
            AppEvent::RemoveField if self.is_form_visible() => {
                self.remove_selected_field();
            }
            AppEvent::NextCategory
            | AppEvent::PrevCategory
            | AppEvent::ToggleInnerTab
            | AppEvent::SubmitForm
            | AppEvent::AddField
            | AppEvent::RemoveField => {}
            other => match self.active_pane {
                Pane::Left => self.handle_left_event(other, limits),
                Pane::Messages => match other {
                    AppEvent::MoveUp => self.scroll_chat_up(),
                    AppEvent::MoveDown => self.scroll_chat_down(limits.chat),
                    _ => {}
                },
                Pane::Response => self.handle_response_event(other, outbox),
            },
        }
    }

    fn handle_left_event(&mut self, event: AppEvent, limits: ScrollLimits) {
        if !self.is_form_visible() {
            match event {
                AppEvent::MoveUp => self.scroll_left_up(),
                AppEvent::MoveDown => self.scroll_left_down(limits.left),
                _ => {}
            }
            return;
        }
        match event {
            AppEvent::MoveUp => self.form_move_up(),
            AppEvent::MoveDown => self.form_move_down(),
            AppEvent::CursorLeft => self.form_cycle(false),
            AppEvent::CursorRight => self.form_cycle(true),
            AppEvent::InputChar(c) => self.form_input_char(c),
            AppEvent::Newline => self.form_input_char('\n'),
            AppEvent::Backspace => self.form_backspace(),
            AppEvent::Submit => self.form_activate(),
            _ => {}
        }
    }

    fn handle_response_event(&mut self, event: AppEvent, outbox: &mut Outbox<'_>) {
        match event {
            AppEvent::InputChar(c) => self.response_input_char(c),
            AppEvent::Backspace => self.response_backspace(),
            AppEvent::CursorLeft => self.response_cursor(false),
            AppEvent::CursorRight => self.response_cursor(true),
            AppEvent::MoveUp => self.cycle_suggestion(false),
            AppEvent::MoveDown => self.cycle_suggestion(true),
            AppEvent::Submit => {
                self.submit_response(outbox);
            }
            _ => {}
        }
    }

    /// Human-readable field list for the "Your Instruction Schema" tab.
    pub fn schema_lines(&self) -> Vec<String> {
        let schema = self.schema();
        let mut lines = vec![format!("Searching: {}", schema.entity_key)];
        for field in &schema.input_fields {
            let mut line = format!("{} ({})", field.name, field.field_type);
            match (field.min, field.max) {
                (Some(min), Some(max)) => line.push_str(&format!(" {min}..={max}")),
                (Some(min), None) => line.push_str(&format!(" >= {min}")),
                (None, Some(max)) => line.push_str(&format!(" <= {max}")),
                (None, None) => {}
            }
            if !field.categories.is_empty() {
                line.push_str(&format!(": {}", field.categories.join(", ")));
            }
            if let Some(condition) = &field.enabled_when {
                line.push_str(&format!(" [{condition}]"));
            }
            if schema.is_required(&field.name) {
                line.push_str(" *required*");
            }
            lines.push(line);
        }
        lines
    }
}

/// Largest scroll offsets the current layout allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollLimits {
    pub chat: u16,
    pub left: u16,
}

#[cfg(test)]
#[path = "../tests/unit/app_tests.rs"]
mod tests;
