//! Message specs - the wire shape handed to the chatbox by the content service.
//!
//! A spec is a JSON object tagged by `type`:
//!
//! | type | fields | variant |
//! |---|---|---|
//! | `scrolled`, `scroll_wait` | `text`, `wrap_width?` | Text |
//! | `choice` | `text?`, `settings: { id: { text } }` | Choice |
//! | `text`, `console` | `settings: { showmehow_id }` | Input |
//! | `attachment` | `attachment: { path, desc, open_event? }` | Attachment |
//! | `external_events` | (none) | ExternalEvent |
//!
//! Optional on every spec: `sender` (`user` / `actor` / `input`) and
//! `mode` (`animated` / `immediate`). The tag is resolved exactly once,
//! here, into the closed [`SpecPayload`] enum.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ChatboxError, Result};

/// Who a container speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Actor,
    /// The single "currently awaiting a response" slot.
    Input,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Actor => "actor",
            Self::Input => "input",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sender {
    type Err = ChatboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(Self::User),
            "actor" => Ok(Self::Actor),
            "input" => Ok(Self::Input),
            other => Err(ChatboxError::InvalidSpec(format!("unknown sender '{other}'"))),
        }
    }
}

/// Whether content is preceded by a typing indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    #[default]
    Animated,
    Immediate,
}

/// Separator between the narrative name and position in a [`Location`].
pub const LOCATION_SEPARATOR: &str = "::";

/// Opaque narrative position (`name::position`) threaded back to the
/// content service on the next response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Location(String);

impl Location {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into `(name, position)`. Tokens without a separator are all name.
    pub fn split(&self) -> (&str, Option<&str>) {
        match self.0.split_once(LOCATION_SEPARATOR) {
            Some((name, position)) => (name, Some(position)),
            None => (self.0.as_str(), None),
        }
    }

    pub fn name(&self) -> &str {
        self.split().0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Location {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Location {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Console,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
}

/// Variant-specific content of a spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecPayload {
    /// `scrolled` (or `scroll_wait` when `wait` is set)
    Text {
        text: String,
        wait: bool,
        wrap_width: Option<usize>,
    },
    Choice {
        prompt: String,
        choices: Vec<ChoiceOption>,
    },
    /// `text` or `console`
    Input {
        kind: InputKind,
        correlation_id: String,
    },
    Attachment {
        path: PathBuf,
        description: String,
        open_event: Option<String>,
    },
    ExternalEvents,
}

/// A parsed message spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSpec {
    pub sender: Option<Sender>,
    pub mode: DeliveryMode,
    pub payload: SpecPayload,
}

impl MessageSpec {
    pub fn new(payload: SpecPayload) -> Self {
        Self {
            sender: None,
            mode: DeliveryMode::default(),
            payload,
        }
    }

    /// A plain `scrolled` line.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(SpecPayload::Text {
            text: text.into(),
            wait: false,
            wrap_width: None,
        })
    }

    pub fn with_sender(mut self, sender: Sender) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_mode(mut self, mode: DeliveryMode) -> Self {
        self.mode = mode;
        self
    }

    /// The wire tag this spec would carry.
    pub fn type_tag(&self) -> &'static str {
        match &self.payload {
            SpecPayload::Text { wait: false, .. } => "scrolled",
            SpecPayload::Text { wait: true, .. } => "scroll_wait",
            SpecPayload::Choice { .. } => "choice",
            SpecPayload::Input {
                kind: InputKind::Text,
                ..
            } => "text",
            SpecPayload::Input {
                kind: InputKind::Console,
                ..
            } => "console",
            SpecPayload::Attachment { .. } => "attachment",
            SpecPayload::ExternalEvents => "external_events",
        }
    }

    /// Text carried by a `scrolled` / `scroll_wait` spec.
    pub fn text_content(&self) -> Option<&str> {
        match &self.payload {
            SpecPayload::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(&value)
    }

    /// Parse the wire shape. Unknown tags and missing required fields are
    /// protocol errors.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| ChatboxError::InvalidSpec("message spec must be a JSON object".to_string()))?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| missing("<untyped>", "type"))?;

        let payload = match kind {
            "scrolled" | "scroll_wait" => SpecPayload::Text {
                text: field_str(obj, "text")
                    .ok_or_else(|| missing(kind, "text"))?
                    .to_string(),
                wait: kind == "scroll_wait",
                wrap_width: obj
                    .get("wrap_width")
                    .and_then(Value::as_u64)
                    .map(|w| w as usize),
            },
            "choice" => {
                let settings = field_object(obj, "settings").ok_or_else(|| missing(kind, "settings"))?;
                let choices = settings
                    .iter()
                    .map(|(id, entry)| {
                        let label = entry
                            .get("text")
                            .and_then(Value::as_str)
                            .ok_or_else(|| missing(kind, &format!("settings.{id}.text")))?;
                        Ok(ChoiceOption {
                            id: id.clone(),
                            label: label.to_string(),
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                SpecPayload::Choice {
                    prompt: field_str(obj, "text").unwrap_or_default().to_string(),
                    choices,
                }
            }
            "text" | "console" => {
                let settings = field_object(obj, "settings").ok_or_else(|| missing(kind, "settings"))?;
                let correlation_id = field_str(settings, "showmehow_id")
                    .ok_or_else(|| missing(kind, "settings.showmehow_id"))?;
                SpecPayload::Input {
                    kind: if kind == "text" {
                        InputKind::Text
                    } else {
                        InputKind::Console
                    },
                    correlation_id: correlation_id.to_string(),
                }
            }
            "attachment" => {
                let attachment =
                    field_object(obj, "attachment").ok_or_else(|| missing(kind, "attachment"))?;
                let path = field_str(attachment, "path").ok_or_else(|| missing(kind, "attachment.path"))?;
                SpecPayload::Attachment {
                    path: PathBuf::from(path),
                    description: field_str(attachment, "desc").unwrap_or_default().to_string(),
                    open_event: field_str(attachment, "open_event").map(str::to_string),
                }
            }
            "external_events" => SpecPayload::ExternalEvents,
            other => return Err(ChatboxError::UnknownMessageType(other.to_string())),
        };

        let sender = match obj.get("sender") {
            None | Some(Value::Null) => None,
            Some(v) => Some(serde_json::from_value::<Sender>(v.clone())?),
        };
        let mode = match obj.get("mode") {
            None | Some(Value::Null) => DeliveryMode::default(),
            Some(v) => serde_json::from_value::<DeliveryMode>(v.clone())?,
        };

        Ok(Self {
            sender,
            mode,
            payload,
        })
    }
}

fn missing(kind: &str, field: &str) -> ChatboxError {
    ChatboxError::MissingField {
        kind: kind.to_string(),
        field: field.to_string(),
    }
}

fn field_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn field_object<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    obj.get(key).and_then(Value::as_object)
}
