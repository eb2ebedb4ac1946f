use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod events;
mod form;
mod hooks;
mod protocol;
mod query_form;
mod relay;
mod scenario;
mod schema;
mod theme;
mod transport;
mod ui;
mod widgets;

use app::{App, AppOptions, Outbox};
use config::Presence;
use form::{RawControl, RawValue, encode_submission, field_input_name};
use hooks::{LayoutOptions, PinMessagePaneHeight, StartupHook, run_startup_hooks};
use protocol::{Role, parse_worker_message};
use relay::{ProcessRelay, RelayConfig};
use scenario::Scenario;
use schema::{EntitySchema, SchemaRegistry};
use theme::Theme;
use transport::{MessageSink, TranscriptSink, TransportChannel};
use widgets::DEFAULT_SEND_TIMEOUT;

const MAX_TRANSPORT_EVENTS_PER_LOOP: usize = 128;
const EVENT_POLL_INTERVAL: Duration = Duration::from_millis(16);
const LOG_ENV_VAR: &str = "WOZCHAT_LOG";
const DEFAULT_LOG_FILE: &str = "wozchat.log";
const DEFAULT_THEME_FILE: &str = "theme.toml";
const DEFAULT_TRANSCRIPT_FILE: &str = "wozchat-transcript.jsonl";

#[derive(Debug, Parser)]
#[command(
    name = "wozchat",
    version,
    about = "Terminal Wizard-of-Oz chat task",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Option<Cmd>,
    #[command(flatten)]
    run: RunArgs,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Run the interactive task UI (default)
    Run(RunArgs),
    /// List registered schema keys, or print one schema as json
    Schema {
        key: Option<String>,
        /// Extra schema in the search API json layout
        #[arg(long = "schema", value_name = "PATH")]
        extra: Vec<PathBuf>,
    },
    /// Encode form values into a query message
    Encode {
        /// Select or number value, coerced to a json number when numeric
        #[arg(long = "field", value_name = "NAME=VALUE")]
        fields: Vec<String>,
        /// Text value, sent verbatim
        #[arg(long = "text", value_name = "NAME=VALUE")]
        texts: Vec<String>,
        /// Checkbox, checked unless `=false` is given
        #[arg(long = "checkbox", value_name = "NAME[=true|false]")]
        checkboxes: Vec<String>,
        /// Multi-select value (reported as unsupported and left out)
        #[arg(long = "multi", value_name = "NAME=A,B")]
        multi: Vec<String>,
    },
    /// Classify an outgoing worker message and print it as json
    Parse { text: String },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    #[arg(long, value_enum, default_value_t = Role::User)]
    role: Role,
    /// Show the onboarding instructions instead of the search tabs
    #[arg(long)]
    onboarding: bool,
    #[arg(long, value_name = "PATH")]
    scenario: Option<PathBuf>,
    /// Color theme; defaults to `theme.toml` when present
    #[arg(long, value_name = "PATH")]
    theme: Option<PathBuf>,
    /// Extra schema in the search API json layout
    #[arg(long = "schema", value_name = "PATH")]
    schemas: Vec<PathBuf>,
    /// Program that receives each outgoing message envelope as its last argument
    #[arg(long, value_name = "PROGRAM")]
    relay: Option<String>,
    #[arg(long = "relay-arg", value_name = "ARG", allow_hyphen_values = true)]
    relay_args: Vec<String>,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_TRANSCRIPT_FILE)]
    transcript: PathBuf,
    #[arg(long, default_value_t = DEFAULT_SEND_TIMEOUT.as_secs())]
    send_timeout_secs: u64,
    /// Fix the message list at this many rows
    #[arg(long, value_name = "ROWS")]
    pin_message_height: Option<u16>,
    #[arg(long, value_name = "PATH", default_value = DEFAULT_LOG_FILE)]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        None => run(cli.run),
        Some(Cmd::Run(args)) => run(args),
        Some(Cmd::Schema { key, extra }) => {
            init_stderr_logging();
            let registry = load_registry(&extra)?;
            print_schema(&registry, key.as_deref())
        }
        Some(Cmd::Encode {
            fields,
            texts,
            checkboxes,
            multi,
        }) => {
            init_stderr_logging();
            let controls = encode_controls(&fields, &texts, &checkboxes, &multi)?;
            let encoded = encode_submission(&controls)?;
            println!("{}", encoded.text);
            Ok(())
        }
        Some(Cmd::Parse { text }) => {
            init_stderr_logging();
            let command = parse_worker_message(&text)?;
            println!("{}", serde_json::to_string(&command)?);
            Ok(())
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The terminal belongs to the UI, so the interactive session logs to a file.
fn init_file_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{}'", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn load_registry(extra: &[PathBuf]) -> Result<SchemaRegistry> {
    let mut registry = SchemaRegistry::builtin();
    for path in extra {
        let json = fs::read_to_string(path)
            .with_context(|| format!("failed to read schema '{}'", path.display()))?;
        let schema = EntitySchema::from_api_json(&json)
            .with_context(|| format!("invalid schema '{}'", path.display()))?;
        info!(entity = %schema.entity_key, path = %path.display(), "loaded schema");
        registry.insert(schema);
    }
    Ok(registry)
}

fn print_schema(registry: &SchemaRegistry, key: Option<&str>) -> Result<()> {
    let Some(key) = key else {
        for key in registry.keys() {
            println!("{key}");
        }
        return Ok(());
    };
    let Some(schema) = registry.get(key) else {
        bail!("unknown schema '{key}'");
    };
    println!("{}", serde_json::to_string_pretty(schema)?);
    Ok(())
}

fn split_assignment(raw: &str) -> Result<(&str, &str)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value)),
        _ => bail!("expected NAME=VALUE, got '{raw}'"),
    }
}

fn parse_checkbox(raw: &str) -> Result<(&str, bool)> {
    let Some((name, value)) = raw.split_once('=') else {
        if raw.trim().is_empty() {
            bail!("checkbox needs a field name");
        }
        return Ok((raw.trim(), true));
    };
    let checked = match value.trim() {
        "true" | "True" | "1" | "on" => true,
        "false" | "False" | "0" | "off" => false,
        other => bail!("checkbox '{name}' expects true or false, got '{other}'"),
    };
    Ok((name.trim(), checked))
}

/// Builds named controls the way the form would post them.
fn encode_controls(
    fields: &[String],
    texts: &[String],
    checkboxes: &[String],
    multi: &[String],
) -> Result<Vec<RawControl>> {
    let mut controls = Vec::new();
    for raw in fields {
        let (name, value) = split_assignment(raw)?;
        controls.push(RawControl::new(
            field_input_name(name),
            RawValue::Number(value.to_string()),
        ));
    }
    for raw in texts {
        let (name, value) = split_assignment(raw)?;
        controls.push(RawControl::new(
            field_input_name(name),
            RawValue::Text(value.to_string()),
        ));
    }
    for raw in checkboxes {
        let (name, checked) = parse_checkbox(raw)?;
        controls.push(RawControl::new(
            field_input_name(name),
            RawValue::Checkbox(checked),
        ));
    }
    for raw in multi {
        let (name, values) = split_assignment(raw)?;
        controls.push(RawControl::new(
            field_input_name(name),
            RawValue::SelectMultiple(
                values
                    .split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string)
                    .collect(),
            ),
        ));
    }
    Ok(controls)
}

/// An explicit `--theme` must exist; the implicit default may be absent.
fn theme_source(args: &RunArgs) -> (PathBuf, Presence) {
    match &args.theme {
        Some(path) => (path.clone(), Presence::Expected),
        None => (PathBuf::from(DEFAULT_THEME_FILE), Presence::Optional),
    }
}

fn startup_hooks(args: &RunArgs) -> Vec<Box<dyn StartupHook>> {
    let mut hooks: Vec<Box<dyn StartupHook>> = Vec::new();
    if let Some(rows) = args.pin_message_height {
        hooks.push(Box::new(PinMessagePaneHeight(rows)));
    }
    hooks
}

fn run(args: RunArgs) -> Result<()> {
    init_file_logging(&args.log_file)?;
    let scenario = args
        .scenario
        .as_deref()
        .map(Scenario::load_or_default)
        .unwrap_or_default();
    let (theme_path, theme_presence) = theme_source(&args);
    let theme = Theme::load_or_default(&theme_path, theme_presence);
    let registry = load_registry(&args.schemas)?;

    let mut layout = LayoutOptions::default();
    let applied = run_startup_hooks(&startup_hooks(&args), &mut layout);
    info!(
        role = args.role.agent_id(),
        onboarding = args.onboarding,
        hooks_applied = applied,
        "starting task ui"
    );

    let mut channel = TransportChannel::default();
    let agent_id = args.role.agent_id();
    let sink: Box<dyn MessageSink> = match args.relay.clone() {
        Some(program) => Box::new(ProcessRelay::new(
            RelayConfig {
                program,
                args_prefix: args.relay_args.clone(),
            },
            agent_id,
            channel.sender(),
        )),
        None => Box::new(TranscriptSink::new(
            &args.transcript,
            agent_id,
            channel.sender(),
        )),
    };
    let app = App::new(
        AppOptions {
            role: args.role,
            onboarding: args.onboarding,
            send_timeout: Duration::from_secs(args.send_timeout_secs),
        },
        scenario,
        registry,
    );

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;
    let result = run_app(&mut terminal, app, &theme, &layout, sink.as_ref(), &mut channel);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;

    info!("task ui closed");
    result.map_err(Into::into)
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut app: App,
    theme: &Theme,
    layout: &LayoutOptions,
    sink: &dyn MessageSink,
    channel: &mut TransportChannel,
) -> io::Result<()> {
    while app.running {
        for event in channel.drain_limited(MAX_TRANSPORT_EVENTS_PER_LOOP) {
            app.on_transport_event(event);
        }
        app.expire_stale_sends(Instant::now());

        let mut screen = Rect::default();
        terminal.draw(|frame| {
            screen = frame.area();
            ui::render(frame, &app, theme, layout);
        })?;
        let limits = ui::scroll_limits(screen, &app, layout);

        let event = events::next_event(EVENT_POLL_INTERVAL)?;
        let mut outbox = Outbox {
            sink,
            channel: &mut *channel,
            now: Instant::now(),
        };
        app.handle_event(event, &mut outbox, limits);
    }
    Ok(())
}
