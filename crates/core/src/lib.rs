//! Chatbox Core - conversation state and staged delivery
//!
//! 包含：
//! - spec / message: wire specs and the closed message variants
//! - container / conversation: amend-or-replace bubbles and per-actor history
//! - delivery: single-flight staging queue
//! - chat_state: orchestration surface used by the interface layer
//! - services / presentation / timer: collaborator seams

pub mod chat_state;
pub mod config;
pub mod container;
pub mod conversation;
pub mod delivery;
pub mod error;
pub mod message;
pub mod presentation;
pub mod services;
pub mod spec;
pub mod timer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chat_state::{ChatState, ResponseListener, USER_GROUP_KEY, UserResponse};
pub use config::{ChatboxConfig, DeliveryConfig, DisplayConfig, ReminderConfig};
pub use container::{MessageContainer, Responder, ResponseSink};
pub use conversation::ConversationState;
pub use delivery::{Delivery, DeliveryAdvancer, DeliveryQueue, QueueState, StagedItem};
pub use error::{ChatboxError, Result};
pub use message::{
    AmendResult, AttachmentMessage, ChoiceMessage, InputMessage, Interaction, Message, TextMessage, ViewResponse,
};
pub use presentation::PresentationSink;
pub use services::{
    ContentService, LogService, LoggedItem, NotificationSink, SharedContentService, SharedLogService,
    SharedNotificationSink, TaskDescription,
};
pub use spec::{ChoiceOption, DeliveryMode, InputKind, Location, MessageSpec, Sender, SpecPayload};
pub use timer::{SharedTimerHost, TimerHandle, TimerHost, TokioTimerHost};
