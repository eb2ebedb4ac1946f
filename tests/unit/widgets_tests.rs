use super::*;
use crate::transport::{Completion, TransportEvent};
use std::cell::RefCell;

#[derive(Default)]
struct RecordingSink {
    sent: RefCell<Vec<String>>,
    pending: RefCell<Vec<Completion>>,
}

impl RecordingSink {
    fn send_count(&self) -> usize {
        self.sent.borrow().len()
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

fn completed_ids(channel: &TransportChannel) -> Vec<SendId> {
    channel
        .drain_limited(usize::MAX)
        .into_iter()
        .filter_map(|event| match event {
            TransportEvent::Completed(id) => Some(id),
            _ => None,
        })
        .collect()
}

fn typed(text: &str) -> TextResponse {
    let mut widget = TextResponse::default();
    for c in text.chars() {
        widget.input_char(true, c);
    }
    widget
}

#[test]
fn inactive_widget_never_sends() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = TextResponse::default();
    widget.set_value("hello");

    assert_eq!(widget.try_send(false, &sink, &mut channel, Instant::now()), None);
    assert_eq!(sink.send_count(), 0);
    assert_eq!(widget.value(), "hello");
    assert!(!widget.is_sending());
}

#[test]
fn double_submit_before_completion_sends_once() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = typed("hello");
    let now = Instant::now();

    assert!(widget.try_send(true, &sink, &mut channel, now).is_some());
    assert_eq!(widget.try_send(true, &sink, &mut channel, now), None);
    assert_eq!(sink.send_count(), 1);
    assert_eq!(sink.sent.borrow()[0], "hello");
    assert!(widget.is_sending());
    assert!(!widget.is_input_enabled(true));
}

#[test]
fn completion_clears_value_and_reenables_sending() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = typed("3");
    let id = widget
        .try_send(true, &sink, &mut channel, Instant::now())
        .expect("send should start");

    sink.complete_all();
    assert_eq!(completed_ids(&channel), vec![id]);
    assert!(widget.on_send_complete(id));
    assert_eq!(widget.value(), "");
    assert_eq!(widget.cursor(), 0);
    assert!(!widget.is_sending());

    widget.input_char(true, '4');
    assert!(widget.try_send(true, &sink, &mut channel, Instant::now()).is_some());
    assert_eq!(sink.send_count(), 2);
}

#[test]
fn empty_text_is_not_sent() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = TextResponse::default();
    assert!(!widget.can_submit(true));
    assert_eq!(widget.try_send(true, &sink, &mut channel, Instant::now()), None);
    assert_eq!(sink.send_count(), 0);
}

#[test]
fn typing_is_ignored_while_inactive_or_sending() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = typed("ab");
    widget.input_char(false, 'x');
    assert_eq!(widget.value(), "ab");

    widget.try_send(true, &sink, &mut channel, Instant::now());
    widget.input_char(true, 'y');
    widget.backspace(true);
    assert_eq!(widget.value(), "ab");
}

#[test]
fn editing_respects_cursor_position_with_multibyte_chars() {
    let mut widget = typed("hé");
    widget.move_cursor_left();
    widget.input_char(true, 'X');
    assert_eq!(widget.value(), "hXé");
    widget.move_cursor_right();
    widget.move_cursor_right();
    widget.backspace(true);
    assert_eq!(widget.value(), "hX");
}

#[test]
fn stale_completion_is_ignored() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = typed("hi");
    let start = Instant::now();
    let first = widget
        .try_send(true, &sink, &mut channel, start)
        .expect("first send");

    let later = start + DEFAULT_SEND_TIMEOUT;
    assert_eq!(widget.expire_stale(later, DEFAULT_SEND_TIMEOUT), Some(first));
    assert!(!widget.is_sending());
    assert_eq!(widget.value(), "hi", "text is kept for retry");

    let second = widget
        .try_send(true, &sink, &mut channel, later)
        .expect("retry send");
    assert!(!widget.on_send_complete(first));
    assert!(widget.is_sending());
    assert!(widget.on_send_complete(second));
}

#[test]
fn send_guard_does_not_expire_before_timeout() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = typed("hi");
    let start = Instant::now();
    widget.try_send(true, &sink, &mut channel, start);
    assert_eq!(
        widget.expire_stale(start + Duration::from_secs(1), DEFAULT_SEND_TIMEOUT),
        None
    );
    assert!(widget.is_sending());
}

#[test]
fn evaluation_sends_verdict_once_until_complete() {
    let sink = RecordingSink::default();
    let mut channel = TransportChannel::default();
    let mut widget = EvaluationResponse::default();
    let now = Instant::now();

    assert_eq!(
        widget.try_send(Verdict::Approve, false, &sink, &mut channel, now),
        None
    );
    let id = widget
        .try_send(Verdict::Approve, true, &sink, &mut channel, now)
        .expect("approve");
    assert_eq!(
        widget.try_send(Verdict::Reject, true, &sink, &mut channel, now),
        None
    );
    assert_eq!(*sink.sent.borrow(), vec!["approve".to_string()]);
    assert!(!widget.buttons_enabled(true));

    assert!(widget.on_send_complete(id));
    assert!(widget.buttons_enabled(true));
}

#[test]
fn evaluation_selection_toggles_between_buttons() {
    let mut widget = EvaluationResponse::default();
    assert_eq!(widget.selected(), Verdict::Reject);
    widget.select_other();
    assert_eq!(widget.selected(), Verdict::Approve);
    assert_eq!(widget.selected().label(), "Approve!");
    assert_eq!(Verdict::Reject.as_str(), "reject");
}
