//! Message variants and the amendment contract.
//!
//! Each variant decides for itself whether an incoming spec can be folded
//! into it. Only text merges; everything else asks to be replaced.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spec::{ChoiceOption, InputKind, MessageSpec, SpecPayload};

/// Outcome of [`Message::attempt_amend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmendResult {
    /// The message cannot absorb the spec; the container replaces it.
    NotAmended,
    Amended,
    /// Reserved for variants that want a fresh container.
    AppendToContainer,
}

/// A user gesture on a rendered view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Interaction {
    /// Pick a choice by id.
    Choose(String),
    /// Submit free text to an input.
    Submit(String),
    /// Open an attachment.
    Open,
    /// Ask the service to re-check external progress.
    Probe,
}

/// What a message produces when the user interacts with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewResponse {
    pub response: String,
    /// Spec the owning container should be amended with, if any.
    pub amendment: Option<MessageSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub text: String,
    pub wrap_width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceMessage {
    pub prompt: String,
    pub choices: Vec<ChoiceOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputMessage {
    pub correlation_id: String,
    pub kind: InputKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMessage {
    pub path: PathBuf,
    pub description: String,
    pub open_event: Option<String>,
}

/// The closed set of things a container can hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(TextMessage),
    Choice(ChoiceMessage),
    Input(InputMessage),
    Attachment(AttachmentMessage),
    ExternalEvent,
}

impl Message {
    /// Build the variant for a spec. `default_wrap` applies to text that
    /// carries no `wrap_width` of its own.
    pub fn from_spec(spec: &MessageSpec, default_wrap: usize) -> Self {
        match &spec.payload {
            SpecPayload::Text {
                text, wrap_width, ..
            } => Self::Text(TextMessage {
                text: text.clone(),
                wrap_width: wrap_width.unwrap_or(default_wrap),
            }),
            SpecPayload::Choice { prompt, choices } => Self::Choice(ChoiceMessage {
                prompt: prompt.clone(),
                choices: choices.clone(),
            }),
            SpecPayload::Input {
                kind,
                correlation_id,
            } => Self::Input(InputMessage {
                correlation_id: correlation_id.clone(),
                kind: *kind,
            }),
            SpecPayload::Attachment {
                path,
                description,
                open_event,
            } => Self::Attachment(AttachmentMessage {
                path: path.clone(),
                description: description.clone(),
                open_event: open_event.clone(),
            }),
            SpecPayload::ExternalEvents => Self::ExternalEvent,
        }
    }

    /// Try to fold `spec` into this message in place.
    pub fn attempt_amend(&mut self, spec: &MessageSpec) -> AmendResult {
        match (self, &spec.payload) {
            (Self::Text(current), SpecPayload::Text { text, .. }) => {
                current.text.push('\n');
                current.text.push_str(text);
                AmendResult::Amended
            }
            _ => AmendResult::NotAmended,
        }
    }

    /// Turn an interaction into a response. `None` when the interaction
    /// does not apply to this variant.
    pub fn respond(&self, interaction: &Interaction) -> Option<ViewResponse> {
        match (self, interaction) {
            (Self::Choice(choice), Interaction::Choose(id)) => {
                let option = choice.choices.iter().find(|c| &c.id == id)?;
                Some(ViewResponse {
                    response: option.id.clone(),
                    amendment: Some(MessageSpec::text(option.label.clone())),
                })
            }
            (Self::Input(_), Interaction::Submit(text)) => Some(ViewResponse {
                response: text.clone(),
                amendment: Some(MessageSpec::text(text.clone())),
            }),
            (Self::Attachment(attachment), Interaction::Open) => {
                attachment.open_event.as_ref().map(|event| ViewResponse {
                    response: event.clone(),
                    amendment: None,
                })
            }
            (Self::ExternalEvent, Interaction::Probe) => Some(ViewResponse {
                response: String::new(),
                amendment: None,
            }),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Choice(_) => "choice",
            Self::Input(_) => "input",
            Self::Attachment(_) => "attachment",
            Self::ExternalEvent => "external_event",
        }
    }

    pub fn is_interactive(&self) -> bool {
        !matches!(self, Self::Text(_))
    }
}
