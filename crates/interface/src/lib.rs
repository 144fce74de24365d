//! Chatbox Interface - 交互层
//!
//! 职责：
//! - Chatbox orchestrator over the core ChatState
//! - Console presentation and file-backed services
//! - CLI 命令行工具 (script replay, spec check)

pub mod chatbox;
pub mod cli;
pub mod console;
pub mod events;
pub mod file_services;
pub mod script;

#[cfg(test)]
mod cli_tests;

pub use chatbox::{Chatbox, ChatboxServices};
pub use cli::{CliConfig, CliError, run as run_cli};
pub use console::{ConsoleNotifier, ConsoleSink, ConsoleView};
pub use events::{InboundEvent, PresentationEvent};
pub use file_services::{EmptyLogService, JsonlLogService, ScriptedContentService};
pub use script::{ScriptLine, feed_script, load_script, parse_script};
