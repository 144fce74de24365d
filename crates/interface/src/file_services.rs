//! File-backed collaborators for the CLI: a JSONL history log and a
//! YAML-scripted content service.

use async_trait::async_trait;
use chatbox_core::{
    ChatboxError, ContentService, Location, LogService, LoggedItem, MessageSpec, Result, TaskDescription,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Wildcard key in a location's `responses` table.
pub const ANY_RESPONSE: &str = "*";

// ── History ────────────────────────────────────────────────────────

/// Reads `<dir>/<actor>.jsonl`, one [`LoggedItem`] per line.
#[derive(Debug, Clone)]
pub struct JsonlLogService {
    dir: PathBuf,
}

impl JsonlLogService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, actor: &str) -> PathBuf {
        self.dir.join(format!("{actor}.jsonl"))
    }
}

#[async_trait]
impl LogService for JsonlLogService {
    async fn fetch_log_for_actor(&self, actor: &str) -> Result<Vec<LoggedItem>> {
        let path = self.path_for(actor);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(actor, path = %path.display(), "No history file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        raw.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(index, line)| {
                serde_json::from_str::<LoggedItem>(line).map_err(|e| {
                    ChatboxError::Service(format!("{}:{}: {}", path.display(), index + 1, e))
                })
            })
            .collect()
    }
}

/// History source with nothing in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyLogService;

#[async_trait]
impl LogService for EmptyLogService {
    async fn fetch_log_for_actor(&self, _actor: &str) -> Result<Vec<LoggedItem>> {
        Ok(Vec::new())
    }
}

// ── Scripted content ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoryScript {
    #[serde(default)]
    pub locations: HashMap<String, LocationScript>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocationScript {
    #[serde(default)]
    pub description: String,
    /// Wire spec for the input shown with the description.
    #[serde(default)]
    pub input: Option<Value>,
    /// Response text (or `*`) to outcome.
    #[serde(default)]
    pub responses: HashMap<String, ResponseScript>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseScript {
    #[serde(default)]
    pub reply: String,
    /// Location the story moves to after this response.
    #[serde(default)]
    pub next: Option<String>,
}

/// Content service driven by a YAML story file.
///
/// `evaluate_response` looks the response up at the location (falling back
/// to `*`) and remembers where the story moved; `fetch_task_description`
/// then describes the location the story moved to.
#[derive(Debug, Default)]
pub struct ScriptedContentService {
    script: StoryScript,
    moved: Mutex<HashMap<Location, Location>>,
}

impl ScriptedContentService {
    pub fn new(script: StoryScript) -> Self {
        Self {
            script,
            moved: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(Self::new(serde_yaml::from_str(raw)?))
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_yaml_str(&raw)
    }
}

#[async_trait]
impl ContentService for ScriptedContentService {
    async fn evaluate_response(&self, location: &Location, response: &str) -> Result<String> {
        let Some(entry) = self.script.locations.get(location.as_str()) else {
            debug!(%location, "No script for location");
            return Ok(String::new());
        };
        let Some(outcome) = entry
            .responses
            .get(response.trim())
            .or_else(|| entry.responses.get(ANY_RESPONSE))
        else {
            return Ok(String::new());
        };

        let mut moved = self.moved.lock().map_err(|e| ChatboxError::Service(e.to_string()))?;
        match &outcome.next {
            Some(next) => {
                moved.insert(location.clone(), Location::new(next.clone()));
            }
            None => {
                moved.remove(location);
            }
        }
        Ok(outcome.reply.clone())
    }

    async fn fetch_task_description(&self, location: &Location) -> Result<TaskDescription> {
        let target = {
            let moved = self.moved.lock().map_err(|e| ChatboxError::Service(e.to_string()))?;
            moved.get(location).cloned().unwrap_or_else(|| location.clone())
        };
        let Some(entry) = self.script.locations.get(target.as_str()) else {
            return Ok(TaskDescription {
                location: Some(target),
                ..TaskDescription::default()
            });
        };
        let input = entry.input.as_ref().map(MessageSpec::from_value).transpose()?;
        Ok(TaskDescription {
            description: entry.description.clone(),
            input,
            location: Some(target),
        })
    }
}
