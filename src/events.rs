use std::io;
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Tick,
    Quit,
    NextPane,
    PrevPane,
    MoveUp,
    MoveDown,
    CursorLeft,
    CursorRight,
    ScrollChatUp,
    ScrollChatDown,
    InputChar(char),
    Newline,
    Backspace,
    Submit,
    AddField,
    RemoveField,
    SubmitForm,
    NextCategory,
    PrevCategory,
    ToggleInnerTab,
    ToggleLeftView,
    MouseScrollUp,
    MouseScrollDown,
}

fn map_key_event(key_event: KeyEvent) -> AppEvent {
    if key_event.kind != KeyEventKind::Press {
        return AppEvent::Tick;
    }

    let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl {
        match key_event.code {
            KeyCode::Char('c') => return AppEvent::Quit,
            KeyCode::Char('a') => return AppEvent::AddField,
            KeyCode::Char('x') => return AppEvent::RemoveField,
            KeyCode::Char('s') => return AppEvent::SubmitForm,
            KeyCode::Char('t') => return AppEvent::ToggleInnerTab,
            KeyCode::Char('o') => return AppEvent::ToggleLeftView,
            KeyCode::Left => return AppEvent::PrevCategory,
            KeyCode::Right => return AppEvent::NextCategory,
            _ => {}
        }
    }

    match key_event.code {
        KeyCode::Tab => AppEvent::NextPane,
        KeyCode::BackTab => AppEvent::PrevPane,
        KeyCode::Up if ctrl || key_event.modifiers.contains(KeyModifiers::SHIFT) => {
            AppEvent::ScrollChatUp
        }
        KeyCode::Down if ctrl || key_event.modifiers.contains(KeyModifiers::SHIFT) => {
            AppEvent::ScrollChatDown
        }
        KeyCode::PageUp => AppEvent::ScrollChatUp,
        KeyCode::PageDown => AppEvent::ScrollChatDown,
        KeyCode::Up => AppEvent::MoveUp,
        KeyCode::Down => AppEvent::MoveDown,
        KeyCode::Left => AppEvent::CursorLeft,
        KeyCode::Right => AppEvent::CursorRight,
        KeyCode::Backspace => AppEvent::Backspace,
        KeyCode::Delete => AppEvent::RemoveField,
        KeyCode::Enter if key_event.modifiers.contains(KeyModifiers::ALT) => AppEvent::Newline,
        KeyCode::Enter => AppEvent::Submit,
        KeyCode::Char(c) => AppEvent::InputChar(c),
        _ => AppEvent::Tick,
    }
}

fn map_mouse_event_kind(kind: MouseEventKind) -> AppEvent {
    match kind {
        MouseEventKind::ScrollUp => AppEvent::MouseScrollUp,
        MouseEventKind::ScrollDown => AppEvent::MouseScrollDown,
        _ => AppEvent::Tick,
    }
}

pub fn next_event(poll_timeout: Duration) -> io::Result<AppEvent> {
    if event::poll(poll_timeout)? {
        match event::read()? {
            Event::Key(key_event) if key_event.kind == KeyEventKind::Press => {
                return Ok(map_key_event(key_event));
            }
            Event::Mouse(mouse_event) => return Ok(map_mouse_event_kind(mouse_event.kind)),
            _ => {}
        }
    }

    Ok(AppEvent::Tick)
}
