use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::form::{QUERY_PREFIX, QueryParameters};

pub const COMPLETE_PREFIX: &str = "!complete";
pub const DONE_PREFIX: &str = "!done";
pub const SELECT_REFERENCE_PREFIX: &str = "!select-reference";
pub const SELECT_PREFIX: &str = "!select";
pub const REQUEST_SUGGESTIONS_PREFIX: &str = "!suggest";
pub const PICK_SUGGESTION_PREFIX: &str = "!pick";
pub const DISCONNECT_TEXT: &str = "[DISCONNECT]";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("query payload is not a parameter object: {0}")]
    InvalidQuery(String),
    #[error("picked suggestion is empty")]
    EmptySuggestion,
    #[error("invalid backend message: {0}")]
    InvalidBackendMessage(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Role {
    User,
    Wizard,
}

impl Role {
    pub fn agent_id(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Wizard => "Wizard",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    Idle,
    TextInput,
    Waiting,
    Done,
}

impl ChatState {
    pub fn label(self) -> &'static str {
        match self {
            ChatState::Idle => "idle",
            ChatState::TextInput => "text_input",
            ChatState::Waiting => "waiting",
            ChatState::Done => "done",
        }
    }
}

/// Messages pushed from the task backend, one json object per line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum BackendMessage {
    Setup {
        task_description: String,
        #[serde(default)]
        completion_requirements: Vec<String>,
        #[serde(default)]
        completion_questions: Vec<String>,
        #[serde(default)]
        form_description: Option<Value>,
    },
    Review,
    SupplySuggestions {
        suggestions: Vec<String>,
    },
    ChatState {
        state: ChatState,
    },
    TaskData {
        #[serde(default)]
        has_context: bool,
        #[serde(default)]
        last_update: Option<u64>,
        #[serde(default)]
        context: Vec<String>,
    },
    Utterance {
        id: String,
        text: String,
    },
    KbItem {
        kb_item: Value,
    },
}

pub fn parse_backend_line(line: &str) -> Result<BackendMessage, ProtocolError> {
    serde_json::from_str(line.trim())
        .map_err(|err| ProtocolError::InvalidBackendMessage(err.to_string()))
}

/// What an outgoing worker message asks the backend to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum WorkerCommand {
    Utter(String),
    Query(QueryParameters),
    DialogueCompleted,
    TaskDone,
    SelectPrimary,
    SelectSecondary,
    RequestSuggestions(String),
    PickSuggestion(String),
    Disconnect,
}

pub fn parse_worker_message(text: &str) -> Result<WorkerCommand, ProtocolError> {
    if text == DISCONNECT_TEXT {
        return Ok(WorkerCommand::Disconnect);
    }
    if let Some(payload) = text.strip_prefix(QUERY_PREFIX) {
        return decode_query(payload).map(WorkerCommand::Query);
    }
    if text.starts_with(COMPLETE_PREFIX) {
        return Ok(WorkerCommand::DialogueCompleted);
    }
    if text.starts_with(DONE_PREFIX) {
        return Ok(WorkerCommand::TaskDone);
    }
    if text.starts_with(SELECT_REFERENCE_PREFIX) {
        return Ok(WorkerCommand::SelectSecondary);
    }
    if text.starts_with(SELECT_PREFIX) {
        return Ok(WorkerCommand::SelectPrimary);
    }
    if let Some(rest) = text.strip_prefix(REQUEST_SUGGESTIONS_PREFIX) {
        return Ok(WorkerCommand::RequestSuggestions(rest.trim().to_string()));
    }
    if let Some(rest) = text.strip_prefix(PICK_SUGGESTION_PREFIX) {
        let chosen = rest.trim();
        if chosen.is_empty() {
            return Err(ProtocolError::EmptySuggestion);
        }
        return Ok(WorkerCommand::PickSuggestion(chosen.to_string()));
    }
    Ok(WorkerCommand::Utter(text.to_string()))
}

/// Reads a query payload back into parameters, accepting the bare
/// `True`/`False`/`None` tokens the encoder and the backend use.
pub fn decode_query(payload: &str) -> Result<QueryParameters, ProtocolError> {
    let normalized = normalize_literals(payload.trim());
    serde_json::from_str::<QueryParameters>(&normalized)
        .map_err(|err| ProtocolError::InvalidQuery(err.to_string()))
}

fn normalize_literals(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut word = String::new();

    let flush = |word: &mut String, out: &mut String| {
        out.push_str(match word.as_str() {
            "True" => "true",
            "False" => "false",
            "None" => "null",
            other => other,
        });
        word.clear();
    };

    for c in payload.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c.is_alphanumeric() || c == '_' {
            word.push(c);
            continue;
        }
        flush(&mut word, &mut out);
        if c == '"' {
            in_string = true;
        }
        out.push(c);
    }
    flush(&mut word, &mut out);
    out
}

#[cfg(test)]
#[path = "../tests/unit/protocol_tests.rs"]
mod tests;
