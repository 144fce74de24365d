//! Per-actor conversation state: the container history, the active input
//! slot, and unread bookkeeping with a single reminder timer.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::container::MessageContainer;
use crate::spec::{Location, MessageSpec, Sender};
use crate::timer::{SharedTimerHost, TimerHandle};

pub struct ConversationState {
    containers: Vec<MessageContainer>,
    active_input: Option<MessageContainer>,
    unread_count: usize,
    reminder: Rc<RefCell<Option<TimerHandle>>>,
    timers: SharedTimerHost,
    wrap_width: usize,
}

impl ConversationState {
    pub fn new(timers: SharedTimerHost, wrap_width: usize) -> Self {
        Self {
            containers: Vec::new(),
            active_input: None,
            unread_count: 0,
            reminder: Rc::new(RefCell::new(None)),
            timers,
            wrap_width,
        }
    }

    /// Append a new container built from `spec`.
    pub fn add_from_service(&mut self, sender: Sender, spec: &MessageSpec, location: Location) -> MessageContainer {
        let container = MessageContainer::new(sender, location, spec, self.wrap_width);
        self.containers.push(container.clone());
        debug!(
            sender = %sender,
            kind = spec.type_tag(),
            total = self.containers.len(),
            "Container added"
        );
        container
    }

    /// Try to amend the last container. `(false, None)` on an empty history.
    pub fn amend_last_message(&self, spec: &MessageSpec) -> (bool, Option<MessageContainer>) {
        match self.containers.last() {
            Some(last) => (last.amend(Some(spec)), Some(last.clone())),
            None => (false, None),
        }
    }

    /// Put a fresh container in the input slot, discarding the previous one.
    pub fn replace_active_input(&mut self, spec: &MessageSpec, location: Location) -> MessageContainer {
        if let Some(previous) = self.active_input.take() {
            previous.disconnect_all();
        }
        let container = MessageContainer::new(Sender::Input, location, spec, self.wrap_width);
        self.active_input = Some(container.clone());
        container
    }

    pub fn clear_active_input(&mut self) -> Option<MessageContainer> {
        let previous = self.active_input.take();
        if let Some(container) = &previous {
            container.disconnect_all();
        }
        previous
    }

    /// Count one more unread item and arm the reminder unless one is
    /// already armed. The slot is cleared before `on_still_unread` runs so
    /// the callback may re-arm.
    pub fn register_visible_and_unread(&mut self, delay: Duration, on_still_unread: impl FnOnce() + 'static) {
        self.unread_count += 1;
        if self.reminder.borrow().is_some() {
            return;
        }
        let slot = Rc::downgrade(&self.reminder);
        let handle = self.timers.schedule(
            delay,
            Box::new(move || {
                if let Some(slot) = slot.upgrade() {
                    slot.borrow_mut().take();
                }
                on_still_unread();
            }),
        );
        *self.reminder.borrow_mut() = Some(handle);
        debug!(unread = self.unread_count, ?delay, "Reminder armed");
    }

    pub fn mark_all_read(&mut self) {
        self.unread_count = 0;
        if let Some(handle) = self.reminder.borrow_mut().take() {
            handle.cancel();
            debug!("Reminder cancelled");
        }
    }

    pub fn current_location(&self) -> Option<&Location> {
        self.containers.last().map(MessageContainer::location)
    }

    pub fn containers(&self) -> &[MessageContainer] {
        &self.containers
    }

    pub fn active_input(&self) -> Option<&MessageContainer> {
        self.active_input.as_ref()
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn reminder_armed(&self) -> bool {
        self.reminder.borrow().is_some()
    }
}

impl Drop for ConversationState {
    fn drop(&mut self) {
        if let Some(handle) = self.reminder.borrow_mut().take() {
            handle.cancel();
        }
    }
}

impl fmt::Debug for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationState")
            .field("containers", &self.containers.len())
            .field("active_input", &self.active_input.is_some())
            .field("unread_count", &self.unread_count)
            .field("reminder_armed", &self.reminder_armed())
            .finish()
    }
}
