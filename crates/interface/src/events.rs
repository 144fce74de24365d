//! Events flowing into and out of the chatbox orchestrator.

use chatbox_core::{Interaction, Location, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Something the host (service bus, script, UI) wants the chatbox to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A message from the content service.
    ChatMessage {
        actor: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<Sender>,
        location: Location,
        spec: Value,
    },
    /// Replace the actor's active input.
    UserInputBubble {
        actor: String,
        location: Location,
        spec: Value,
    },
    /// Whatever an external-events input was waiting for has happened.
    ExternalEventsSatisfied { actor: String },
    /// The actor's conversation is now the one on screen.
    Focus { actor: String },
    /// Interact with the actor's latest interactive bubble.
    Respond { actor: String, interaction: Interaction },
    Reset,
}

impl InboundEvent {
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::ChatMessage { actor, .. }
            | Self::UserInputBubble { actor, .. }
            | Self::ExternalEventsSatisfied { actor }
            | Self::Focus { actor }
            | Self::Respond { actor, .. } => Some(actor),
            Self::Reset => None,
        }
    }
}

/// Feedback from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresentationEvent {
    /// A content bubble has been shown.
    Presented { actor: String, sender: Sender },
}
