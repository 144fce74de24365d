//! Shared test helpers for core sub-module tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use crate::container::{MessageContainer, Responder};
use crate::delivery::{Delivery, DeliveryAdvancer};
use crate::error::{ChatboxError, Result};
use crate::message::{Interaction, Message};
use crate::presentation::PresentationSink;
use crate::services::NotificationSink;
use crate::spec::Sender;
use crate::timer::{TimerCallback, TimerHandle, TimerHost, TimerToken};

pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn with_env_overrides<T>(updates: &[(&str, Option<&str>)], f: impl FnOnce() -> T) -> T {
    let _guard = env_lock();
    let previous = updates
        .iter()
        .map(|(key, _)| ((*key).to_string(), std::env::var(key).ok()))
        .collect::<Vec<_>>();
    for (key, value) in updates {
        match value {
            Some(v) => unsafe { std::env::set_var(key, v) },
            None => unsafe { std::env::remove_var(key) },
        }
    }
    let result = f();
    for (key, old) in previous {
        match old {
            Some(v) => unsafe { std::env::set_var(&key, v) },
            None => unsafe { std::env::remove_var(&key) },
        }
    }
    result
}

// ── Manual timers ──────────────────────────────────────────────────

struct ManualEntry {
    id: u64,
    due_ms: u64,
    token: TimerToken,
    callback: TimerCallback,
}

/// Virtual clock. Timers only fire from [`ManualTimerHost::advance`].
#[derive(Default)]
pub struct ManualTimerHost {
    now_ms: Cell<u64>,
    next_id: Cell<u64>,
    entries: RefCell<Vec<ManualEntry>>,
}

impl ManualTimerHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms.get()
    }

    /// Timers scheduled and neither fired nor cancelled.
    pub fn armed(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| !entry.token.is_cancelled())
            .count()
    }

    /// Move the clock forward, firing due timers in deadline order.
    pub fn advance(&self, ms: u64) {
        let target = self.now_ms.get() + ms;
        loop {
            let next = {
                let mut entries = self.entries.borrow_mut();
                let index = entries
                    .iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.due_ms <= target)
                    .min_by_key(|(_, entry)| (entry.due_ms, entry.id))
                    .map(|(index, _)| index);
                index.map(|index| entries.remove(index))
            };
            let Some(entry) = next else {
                break;
            };
            self.now_ms.set(entry.due_ms);
            if !entry.token.is_cancelled() {
                (entry.callback)();
            }
        }
        self.now_ms.set(target);
    }
}

impl TimerHost for ManualTimerHost {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let (handle, token) = TimerHandle::pair();
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.entries.borrow_mut().push(ManualEntry {
            id,
            due_ms: self.now_ms.get() + delay.as_millis() as u64,
            token,
            callback,
        });
        handle
    }
}

// ── Recording presentation sink ────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Pending { actor: String, group: String },
    Content { actor: String, view: String, group: String },
}

/// Renders views as short strings and records what was shown.
#[derive(Default)]
pub struct RecordingSink {
    pub events: RefCell<Vec<SinkEvent>>,
    advancers: RefCell<HashMap<String, Vec<DeliveryAdvancer>>>,
    responders: RefCell<HashMap<String, Responder>>,
    auto_advance: Cell<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance content as soon as it is shown.
    pub fn auto_advancing() -> Self {
        let sink = Self::default();
        sink.auto_advance.set(true);
        sink
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.borrow().clone()
    }

    pub fn content_views(&self, actor: &str) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                SinkEvent::Content { actor: a, view, .. } if a == actor => Some(view.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pending_count(&self, actor: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| matches!(event, SinkEvent::Pending { actor: a, .. } if a == actor))
            .count()
    }

    /// Finish showing the oldest held content item for `actor`.
    pub fn finish_content(&self, actor: &str) -> bool {
        let advancer = {
            let mut advancers = self.advancers.borrow_mut();
            match advancers.get_mut(actor) {
                Some(list) if !list.is_empty() => Some(list.remove(0)),
                _ => None,
            }
        };
        advancer.is_some_and(|advancer| advancer.advance())
    }

    pub fn respond(&self, actor: &str, interaction: &Interaction) -> bool {
        let responder = self.responders.borrow().get(actor).cloned();
        responder.is_some_and(|responder| responder.respond(interaction))
    }
}

pub fn render(message: &Message) -> String {
    match message {
        Message::Text(text) => format!("text:{}", text.text),
        Message::Choice(choice) => format!("choice:{}", choice.prompt),
        Message::Input(input) => format!("input:{}", input.correlation_id),
        Message::Attachment(attachment) => format!("attachment:{}", attachment.description),
        Message::ExternalEvent => "external_events".to_string(),
    }
}

impl PresentationSink for RecordingSink {
    type View = String;

    fn pending_view(&self, _actor: &str, sender: Sender) -> String {
        format!("pending:{sender}")
    }

    fn message_view(&self, actor: &str, container: &MessageContainer, responder: Responder) -> String {
        self.responders.borrow_mut().insert(actor.to_string(), responder);
        container.with_message(render)
    }

    fn show_pending(&self, actor: &str, delivery: Delivery<String>) {
        self.events.borrow_mut().push(SinkEvent::Pending {
            actor: actor.to_string(),
            group: delivery.group_key,
        });
    }

    fn show_content(&self, actor: &str, delivery: Delivery<String>, advancer: DeliveryAdvancer) {
        self.events.borrow_mut().push(SinkEvent::Content {
            actor: actor.to_string(),
            view: delivery.item,
            group: delivery.group_key,
        });
        if self.auto_advance.get() {
            advancer.advance();
        } else {
            self.advancers
                .borrow_mut()
                .entry(actor.to_string())
                .or_default()
                .push(advancer);
        }
    }
}

// ── Recording notifier ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub calls: RefCell<Vec<String>>,
    pub fail: Cell<bool>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify_still_unread(&self, actor: &str) -> Result<()> {
        self.calls.borrow_mut().push(actor.to_string());
        if self.fail.get() {
            return Err(ChatboxError::Notification(format!("{actor}: sink offline")));
        }
        Ok(())
    }
}
