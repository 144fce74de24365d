//! Replay scripts: JSONL files of timed inbound events.
//!
//! ```text
//! {"delay_ms": 0, "event": "chat_message", "actor": "alice", "location": "intro::0", "spec": {...}}
//! {"delay_ms": 800, "event": "respond", "actor": "alice", "interaction": {"kind": "submit", "value": "ls"}}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::cli::CliError;
use crate::events::InboundEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptLine {
    /// Wait before sending, relative to the previous line.
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(flatten)]
    pub event: InboundEvent,
}

pub fn parse_script(raw: &str) -> Result<Vec<ScriptLine>, CliError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str::<ScriptLine>(line).map_err(|e| CliError::Script {
                line: index + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

pub async fn load_script(path: &Path) -> Result<Vec<ScriptLine>, CliError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Io(format!("{}: {}", path.display(), e)))?;
    parse_script(&raw)
}

/// Actors named anywhere in the script, sorted.
pub fn script_actors(lines: &[ScriptLine]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| line.event.actor())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Send each line's event after its delay. Stops early if the receiver is gone.
pub async fn feed_script(lines: Vec<ScriptLine>, tx: UnboundedSender<InboundEvent>) {
    for line in lines {
        if line.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(line.delay_ms)).await;
        }
        if tx.send(line.event).is_err() {
            debug!("Script receiver closed");
            return;
        }
    }
}
