use std::io::{BufRead, BufReader};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::Sender;
use std::thread;

use tracing::{debug, info, warn};

use crate::protocol::parse_backend_line;
use crate::transport::{
    Completion, MessageMetadata, MessageSink, OutgoingEnvelope, TransportEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub program: String,
    pub args_prefix: Vec<String>,
}

/// Delivers each message by running `program args.. <envelope-json>`.
/// Stdout lines that decode as backend messages are forwarded as such;
/// anything else on stdout or stderr surfaces as a system line.
pub struct ProcessRelay {
    config: RelayConfig,
    agent_id: String,
    event_tx: Sender<TransportEvent>,
}

impl ProcessRelay {
    pub fn new(config: RelayConfig, agent_id: &str, event_tx: Sender<TransportEvent>) -> Self {
        info!(program = %config.program, "using process relay");
        Self {
            config,
            agent_id: agent_id.to_string(),
            event_tx,
        }
    }
}

impl MessageSink for ProcessRelay {
    fn send_message(&self, text: &str, metadata: &MessageMetadata, on_complete: Completion) {
        let envelope = OutgoingEnvelope {
            id: &self.agent_id,
            text,
            metadata,
        }
        .to_json();
        let config = self.config.clone();
        let tx = self.event_tx.clone();
        thread::spawn(move || {
            run_relay(&config, &envelope, &tx);
            on_complete.complete();
        });
    }
}

fn run_relay(config: &RelayConfig, envelope: &str, tx: &Sender<TransportEvent>) {
    let mut command = Command::new(&config.program);
    command
        .args(&config.args_prefix)
        .arg(envelope)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(program = %config.program, error = %err, "relay failed to start");
            let _ = tx.send(TransportEvent::System(format!(
                "Relay '{}' failed to start: {err}",
                config.program
            )));
            return;
        }
    };

    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, tx.clone(), true));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, tx.clone(), false));
    }

    let wait_result = child.wait();
    for reader in readers {
        let _ = reader.join();
    }
    report_exit(&config.program, wait_result, tx);
}

fn spawn_reader<R: std::io::Read + Send + 'static>(
    reader: R,
    tx: Sender<TransportEvent>,
    decode_backend: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let buf = BufReader::new(reader);
        for line in buf.lines().map_while(Result::ok) {
            if line.trim().is_empty() {
                continue;
            }
            let event = if decode_backend {
                match parse_backend_line(&line) {
                    Ok(message) => TransportEvent::Backend(message),
                    Err(err) => {
                        debug!(error = %err, "relay line is not a backend message");
                        TransportEvent::System(line)
                    }
                }
            } else {
                TransportEvent::System(line)
            };
            let _ = tx.send(event);
        }
    })
}

fn report_exit(
    program: &str,
    wait_result: std::io::Result<ExitStatus>,
    tx: &Sender<TransportEvent>,
) {
    match wait_result {
        Ok(status) if status.success() => debug!(program, "relay finished"),
        Ok(status) => {
            let code = status.code().unwrap_or(-1);
            warn!(program, code, "relay exited with failure");
            let _ = tx.send(TransportEvent::System(format!(
                "Relay '{program}' exited with code {code}"
            )));
        }
        Err(err) => {
            warn!(program, error = %err, "relay wait failed");
            let _ = tx.send(TransportEvent::System(format!(
                "Relay '{program}' could not be awaited: {err}"
            )));
        }
    }
}
