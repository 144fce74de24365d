//! Collaborator traits: the content service that evaluates answers, the log
//! service that returns history, and the sink for unread reminders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use std::sync::Arc;

use crate::error::Result;
use crate::spec::{Location, MessageSpec, Sender};

/// Next step after an evaluated response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDescription {
    /// Text shown as an actor message. Empty means nothing to show.
    pub description: String,
    /// Input to put in the active slot, if the task expects one.
    pub input: Option<MessageSpec>,
    /// Where the task lives, when it moved away from the evaluated location.
    pub location: Option<Location>,
}

/// Evaluates user responses and describes the next task.
#[async_trait]
pub trait ContentService: Send + Sync {
    async fn evaluate_response(&self, location: &Location, response: &str) -> Result<String>;
    async fn fetch_task_description(&self, location: &Location) -> Result<TaskDescription>;
}

pub type SharedContentService = Arc<dyn ContentService>;

/// One persisted conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedItem {
    pub sender: Sender,
    pub location: Location,
    /// Raw wire spec; parsed on replay.
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Returns stored history for an actor, oldest first.
#[async_trait]
pub trait LogService: Send + Sync {
    async fn fetch_log_for_actor(&self, actor: &str) -> Result<Vec<LoggedItem>>;
}

pub type SharedLogService = Arc<dyn LogService>;

/// Told when an actor's messages stayed unread past the reminder delay.
pub trait NotificationSink {
    fn notify_still_unread(&self, actor: &str) -> Result<()>;
}

pub type SharedNotificationSink = Rc<dyn NotificationSink>;
