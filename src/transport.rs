use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::protocol::BackendMessage;

pub type MessageMetadata = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SendId(u64);

impl SendId {
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Completed(SendId),
    Backend(BackendMessage),
    System(String),
}

/// Single-use completion handle for one outgoing message.
#[derive(Debug)]
pub struct Completion {
    id: SendId,
    tx: Sender<TransportEvent>,
}

impl Completion {
    pub fn id(&self) -> SendId {
        self.id
    }

    pub fn complete(self) {
        let _ = self.tx.send(TransportEvent::Completed(self.id));
    }
}

/// Hands outgoing text to whatever delivers it. Implementations must call
/// [`Completion::complete`] once the message is delivered or has failed.
pub trait MessageSink {
    fn send_message(&self, text: &str, metadata: &MessageMetadata, on_complete: Completion);
}

pub struct TransportChannel {
    tx: Sender<TransportEvent>,
    rx: Receiver<TransportEvent>,
    next_id: u64,
}

impl Default for TransportChannel {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx, next_id: 0 }
    }
}

impl TransportChannel {
    pub fn completion(&mut self) -> Completion {
        self.next_id = self.next_id.saturating_add(1);
        Completion {
            id: SendId(self.next_id),
            tx: self.tx.clone(),
        }
    }

    pub fn sender(&self) -> Sender<TransportEvent> {
        self.tx.clone()
    }

    pub fn drain_limited(&self, max_events: usize) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        while events.len() < max_events {
            let Ok(event) = self.rx.try_recv() else {
                break;
            };
            events.push(event);
        }
        events
    }
}

#[derive(Debug, Serialize)]
pub struct OutgoingEnvelope<'a> {
    pub id: &'a str,
    pub text: &'a str,
    #[serde(flatten)]
    pub metadata: &'a MessageMetadata,
}

impl OutgoingEnvelope<'_> {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|err| {
            warn!(error = %err, "failed to serialize outgoing envelope");
            String::new()
        })
    }
}

/// Appends every outgoing envelope to a json-lines file and completes at once.
pub struct TranscriptSink {
    path: PathBuf,
    agent_id: String,
    events: Sender<TransportEvent>,
}

impl TranscriptSink {
    pub fn new(path: impl AsRef<Path>, agent_id: &str, events: Sender<TransportEvent>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            agent_id: agent_id.to_string(),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

impl MessageSink for TranscriptSink {
    fn send_message(&self, text: &str, metadata: &MessageMetadata, on_complete: Completion) {
        let envelope = OutgoingEnvelope {
            id: &self.agent_id,
            text,
            metadata,
        };
        match self.append_line(&envelope.to_json()) {
            Ok(()) => debug!(path = %self.path.display(), "message appended to transcript"),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "transcript write failed");
                let _ = self.events.send(TransportEvent::System(format!(
                    "Failed to write transcript '{}': {err}",
                    self.path.display()
                )));
            }
        }
        on_complete.complete();
    }
}
