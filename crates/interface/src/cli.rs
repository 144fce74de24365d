//! CLI - Command Line Interface
//!
//! Available Commands:
//! - chatbox run --script <file.jsonl>  - Replay a script through the console
//! - chatbox check <file.jsonl>         - Validate one message spec per line

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::LocalSet;
use tracing::info;

use chatbox_core::{ChatboxConfig, MessageSpec, SharedContentService, SharedLogService, TokioTimerHost};

use crate::chatbox::{Chatbox, ChatboxServices};
use crate::console::{ConsoleNotifier, ConsoleSink};
use crate::file_services::{EmptyLogService, JsonlLogService, ScriptedContentService};
use crate::script::{ScriptLine, feed_script, load_script, script_actors};

/// How long a finished script may keep delivering before `run` gives up.
pub const DEFAULT_SETTLE_LIMIT: Duration = Duration::from_secs(60);

/// CLI Errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CliError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Script error at line {line}: {message}")]
    Script { line: usize, message: String },

    #[error("Invalid spec at line {line}: {message}")]
    InvalidSpec { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Chatbox error: {0}")]
    Chatbox(String),
}

impl From<chatbox_core::ChatboxError> for CliError {
    fn from(error: chatbox_core::ChatboxError) -> Self {
        CliError::Chatbox(error.to_string())
    }
}

/// CLI Configuration
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Chatbox config file
    pub config_path: Option<PathBuf>,

    /// Verbose output
    pub verbose: bool,
}

impl CliConfig {
    pub fn load_chatbox_config(&self) -> Result<ChatboxConfig, CliError> {
        ChatboxConfig::load_with_env(self.config_path.as_deref()).map_err(|e| CliError::Config(e.to_string()))
    }
}

/// Chatbox CLI
#[derive(Parser, Debug)]
#[command(name = "chatbox")]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Config file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Replay a JSONL script of inbound events through the console
    Run(RunArgs),

    /// Validate a JSONL file of message specs
    Check(CheckArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Script of inbound events
    #[arg(short, long)]
    pub script: PathBuf,

    /// Directory of <actor>.jsonl history files
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Story file (YAML) for the scripted content service
    #[arg(long)]
    pub content: Option<PathBuf>,

    /// Actor whose conversation is on screen
    #[arg(short, long)]
    pub foreground: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct CheckArgs {
    /// File with one message spec per line
    pub file: PathBuf,
}

/// Parse CLI arguments and execute commands
pub async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = CliConfig {
        config_path: cli.config,
        verbose: cli.verbose,
    };

    if config.verbose {
        tracing_subscriber::fmt::init();
    }

    match cli.command {
        Commands::Run(args) => cmd_run(args, &config).await,
        Commands::Check(args) => cmd_check(&args.file).await,
    }
}

async fn cmd_run(args: RunArgs, config: &CliConfig) -> Result<(), CliError> {
    let chatbox_config = config.load_chatbox_config()?;
    let lines = load_script(&args.script).await?;
    let services = build_services(&args).await?;
    info!(lines = lines.len(), script = %args.script.display(), "Replaying script");

    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Rc::new(ConsoleSink::stdout(tx, chatbox_config.display.wrap_width));
    LocalSet::new()
        .run_until(replay(lines, args.foreground, sink, rx, services, chatbox_config))
        .await
}

async fn build_services(args: &RunArgs) -> Result<(SharedContentService, SharedLogService), CliError> {
    let content: SharedContentService = match &args.content {
        Some(path) => Arc::new(
            ScriptedContentService::load(path)
                .await
                .map_err(|e| CliError::Config(format!("{}: {}", path.display(), e)))?,
        ),
        None => Arc::new(ScriptedContentService::default()),
    };
    let log: SharedLogService = match &args.history {
        Some(dir) => Arc::new(JsonlLogService::new(dir)),
        None => Arc::new(EmptyLogService),
    };
    Ok((content, log))
}

/// Rehydrate every scripted actor, then feed the script through a chatbox
/// until it has settled. Must run inside a `LocalSet`.
pub async fn replay<P: chatbox_core::PresentationSink + 'static>(
    lines: Vec<ScriptLine>,
    foreground: Option<String>,
    sink: Rc<P>,
    presented: mpsc::UnboundedReceiver<crate::events::PresentationEvent>,
    (content, log): (SharedContentService, SharedLogService),
    config: ChatboxConfig,
) -> Result<(), CliError> {
    let services = ChatboxServices {
        content,
        log,
        notifier: Rc::new(ConsoleNotifier),
        timers: TokioTimerHost::shared(),
    };
    let mut chatbox = Chatbox::new(sink, presented, services, config);

    if let Some(actor) = &foreground {
        chatbox.focus(actor);
    }
    for actor in script_actors(&lines) {
        chatbox.rehydrate(&actor).await?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::task::spawn_local(feed_script(lines, tx));
    chatbox.run(rx, DEFAULT_SETTLE_LIMIT).await?;
    info!(actors = ?chatbox.state().actors(), "Script finished");
    Ok(())
}

async fn cmd_check(file: &Path) -> Result<(), CliError> {
    let raw = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| CliError::Io(format!("{}: {}", file.display(), e)))?;
    let count = check_specs(&raw)?;
    println!("OK: {} message spec(s)", count);
    Ok(())
}

/// Validate one spec per non-blank line; the first protocol error wins.
pub fn check_specs(raw: &str) -> Result<usize, CliError> {
    let mut count = 0;
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        MessageSpec::from_json(line).map_err(|e| CliError::InvalidSpec {
            line: index + 1,
            message: e.to_string(),
        })?;
        count += 1;
    }
    Ok(count)
}
