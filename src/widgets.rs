use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::transport::{MessageMetadata, MessageSink, SendId, TransportChannel};

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);
pub const IDLE_NOTICE: &str =
    "Pay attention to the conversation above, as you'll need to evaluate.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct InFlight {
    id: SendId,
    started: Instant,
}

/// Tracks the one outstanding send a widget may have.
#[derive(Debug, Clone, Default)]
pub struct SendGuard {
    in_flight: Option<InFlight>,
}

impl SendGuard {
    pub fn is_sending(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight_id(&self) -> Option<SendId> {
        self.in_flight.map(|flight| flight.id)
    }

    fn begin(&mut self, id: SendId, now: Instant) {
        self.in_flight = Some(InFlight { id, started: now });
    }

    /// Clears the guard only for the send it is waiting on.
    pub fn finish(&mut self, id: SendId) -> bool {
        if self.in_flight_id() == Some(id) {
            self.in_flight = None;
            true
        } else {
            false
        }
    }

    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Option<SendId> {
        let flight = self.in_flight?;
        if now.saturating_duration_since(flight.started) < timeout {
            return None;
        }
        self.in_flight = None;
        warn!(
            send_id = flight.id.get(),
            timeout_secs = timeout.as_secs(),
            "send completion never arrived; releasing widget"
        );
        Some(flight.id)
    }

    fn send(
        &mut self,
        text: &str,
        sink: &dyn MessageSink,
        channel: &mut TransportChannel,
        now: Instant,
    ) -> SendId {
        let completion = channel.completion();
        let id = completion.id();
        self.begin(id, now);
        debug!(send_id = id.get(), "sending message");
        sink.send_message(text, &MessageMetadata::new(), completion);
        id
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextResponse {
    value: String,
    cursor: usize,
    guard: SendGuard,
}

impl TextResponse {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_sending(&self) -> bool {
        self.guard.is_sending()
    }

    pub fn is_input_enabled(&self, active: bool) -> bool {
        active && !self.guard.is_sending()
    }

    pub fn can_submit(&self, active: bool) -> bool {
        !self.value.is_empty() && self.is_input_enabled(active)
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.chars().count();
    }

    pub fn input_char(&mut self, active: bool, c: char) {
        if !self.is_input_enabled(active) {
            return;
        }
        let byte_idx = char_to_byte_idx(&self.value, self.cursor);
        self.value.insert(byte_idx, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self, active: bool) {
        if !self.is_input_enabled(active) || self.cursor == 0 {
            return;
        }
        let start = char_to_byte_idx(&self.value, self.cursor - 1);
        let end = char_to_byte_idx(&self.value, self.cursor);
        self.value.drain(start..end);
        self.cursor -= 1;
    }

    pub fn move_cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.value.chars().count());
    }

    pub fn try_send(
        &mut self,
        active: bool,
        sink: &dyn MessageSink,
        channel: &mut TransportChannel,
        now: Instant,
    ) -> Option<SendId> {
        if !self.can_submit(active) {
            return None;
        }
        let text = self.value.clone();
        Some(self.guard.send(&text, sink, channel, now))
    }

    pub fn on_send_complete(&mut self, id: SendId) -> bool {
        if !self.guard.finish(id) {
            return false;
        }
        self.value.clear();
        self.cursor = 0;
        true
    }

    /// Releases a stuck send but keeps the text so it can be retried.
    pub fn expire_stale(&mut self, now: Instant, timeout: Duration) -> Option<SendId> {
        self.guard.expire(now, timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Reject,
    Approve,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Reject => "reject",
            Verdict::Approve => "approve",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Verdict::Reject => "Reject!",
            Verdict::Approve => "Approve!",
        }
    }

    pub fn other(self) -> Self {
        match self {
            Verdict::Reject => Verdict::Approve,
            Verdict::Approve => Verdict::Reject,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EvaluationResponse {
    selected: Verdict,
    guard: SendGuard,
}

impl Default for EvaluationResponse {
    fn default() -> Self {
        Self {
            selected: Verdict::Reject,
            guard: SendGuard::default(),
        }
    }
}

impl EvaluationResponse {
    pub fn selected(&self) -> Verdict {
        self.selected
    }

    pub fn select_other(&mut self) {
        self.selected = self.selected.other();
    }

    pub fn is_sending(&self) -> bool {
        self.guard.is_sending()
    }

    pub fn buttons_enabled(&self, active: bool) -> bool {
        active && !self.guard.is_sending()
    }

    pub fn try_send(
        &mut self,
        verdict: Verdict,
        active: bool,
        sink: &dyn MessageSink,
        channel: &mut TransportChannel,
        now: Instant,
    ) -> Option<SendId> {
        if !self.buttons_enabled(active) {
            return None;
        }
        Some(self.guard.send(verdict.as_str(), sink, channel, now))
    }

    pub fn on_send_complete(&mut self, id: SendId) -> bool {
        self.guard.finish(id)
    }

    pub fn expire_stale(&mut self, now: Instant, timeout: Duration) -> Option<SendId> {
        self.guard.expire(now, timeout)
    }
}

pub(crate) fn char_to_byte_idx(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(idx, _)| idx)
        .unwrap_or(s.len())
}

#[cfg(test)]
#[path = "../tests/unit/widgets_tests.rs"]
mod tests;
