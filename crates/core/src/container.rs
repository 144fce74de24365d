//! MessageContainer - a sender-tagged slot whose message can be amended in
//! place or replaced wholesale.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::message::{AmendResult, Interaction, Message};
use crate::spec::{Location, MessageSpec, Sender};

/// Callback invoked with a snapshot of the new message.
pub type MessageObserver = Rc<dyn Fn(&Message)>;

/// Receives the response text produced by a [`Responder`].
pub type ResponseSink = Rc<dyn Fn(String)>;

struct ContainerInner {
    sender: Sender,
    location: Location,
    wrap_width: usize,
    message: RefCell<Message>,
    generation: Cell<u64>,
    next_observer_id: Cell<u64>,
    observers: RefCell<Vec<(u64, MessageObserver)>>,
}

/// Shared handle to one bubble in a conversation.
///
/// Clones refer to the same container; use [`MessageContainer::ptr_eq`] to
/// compare identity.
#[derive(Clone)]
pub struct MessageContainer {
    inner: Rc<ContainerInner>,
}

impl MessageContainer {
    pub fn new(sender: Sender, location: Location, spec: &MessageSpec, wrap_width: usize) -> Self {
        Self {
            inner: Rc::new(ContainerInner {
                sender,
                location,
                wrap_width,
                message: RefCell::new(Message::from_spec(spec, wrap_width)),
                generation: Cell::new(0),
                next_observer_id: Cell::new(0),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn sender(&self) -> Sender {
        self.inner.sender
    }

    pub fn location(&self) -> &Location {
        &self.inner.location
    }

    /// Snapshot of the current message.
    pub fn message(&self) -> Message {
        self.inner.message.borrow().clone()
    }

    pub fn with_message<R>(&self, f: impl FnOnce(&Message) -> R) -> R {
        f(&self.inner.message.borrow())
    }

    /// Bumped on every wholesale replacement, not on in-place amendment.
    pub fn generation(&self) -> u64 {
        self.inner.generation.get()
    }

    pub fn ptr_eq(&self, other: &MessageContainer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn connect_message_changed(&self, observer: impl Fn(&Message) + 'static) -> u64 {
        let id = self.inner.next_observer_id.get();
        self.inner.next_observer_id.set(id + 1);
        self.inner.observers.borrow_mut().push((id, Rc::new(observer)));
        id
    }

    pub fn disconnect(&self, id: u64) -> bool {
        let mut observers = self.inner.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    pub fn disconnect_all(&self) {
        self.inner.observers.borrow_mut().clear();
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// Amend-or-replace.
    ///
    /// Returns `false` without touching the message when the spec is absent,
    /// or when its sender differs from this container's. Otherwise the
    /// message either absorbs the spec or is rebuilt from it, and observers
    /// are notified either way.
    pub fn amend(&self, spec: Option<&MessageSpec>) -> bool {
        let Some(spec) = spec else {
            return false;
        };
        if spec.sender != Some(self.inner.sender) {
            debug!(
                container = %self.inner.sender,
                incoming = ?spec.sender,
                "Amendment rejected: sender mismatch"
            );
            return false;
        }

        let result = self.inner.message.borrow_mut().attempt_amend(spec);
        match result {
            AmendResult::Amended => {
                debug!(sender = %self.inner.sender, "Message amended in place");
            }
            AmendResult::NotAmended => {
                self.swap_message(spec);
                debug!(
                    sender = %self.inner.sender,
                    generation = self.generation(),
                    kind = spec.type_tag(),
                    "Message replaced"
                );
            }
            AmendResult::AppendToContainer => return false,
        }
        self.notify();
        true
    }

    /// Unconditionally rebuild the message from `spec`.
    pub fn replace_with(&self, spec: &MessageSpec) {
        self.swap_message(spec);
        self.notify();
    }

    /// Build a responder for the view of this container. Response text goes
    /// to `listener`, after any amendment has been applied here.
    pub fn render_response(&self, listener: ResponseSink) -> Responder {
        Responder {
            container: Rc::downgrade(&self.inner),
            listener,
        }
    }

    fn swap_message(&self, spec: &MessageSpec) {
        *self.inner.message.borrow_mut() = Message::from_spec(spec, self.inner.wrap_width);
        self.inner.generation.set(self.inner.generation.get() + 1);
    }

    fn notify(&self) {
        let snapshot = self.message();
        let observers: Vec<MessageObserver> = self
            .inner
            .observers
            .borrow()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(&snapshot);
        }
    }
}

impl fmt::Debug for MessageContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContainer")
            .field("sender", &self.inner.sender)
            .field("location", &self.inner.location)
            .field("message", &self.inner.message.borrow())
            .field("generation", &self.inner.generation.get())
            .finish()
    }
}

/// View-side handle that turns interactions into responses.
#[derive(Clone)]
pub struct Responder {
    container: Weak<ContainerInner>,
    listener: ResponseSink,
}

impl Responder {
    /// Returns `true` when a response was forwarded. Once the container is
    /// gone this is a no-op.
    pub fn respond(&self, interaction: &Interaction) -> bool {
        let Some(inner) = self.container.upgrade() else {
            debug!("Responder outlived its container");
            return false;
        };
        let container = MessageContainer { inner };
        let Some(view_response) = container.with_message(|message| message.respond(interaction)) else {
            return false;
        };
        if let Some(amendment) = view_response.amendment {
            container.amend(Some(&amendment.with_sender(container.sender())));
        }
        (self.listener)(view_response.response);
        true
    }

    pub fn is_alive(&self) -> bool {
        self.container.strong_count() > 0
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(sender: Sender, body: &str) -> MessageSpec {
        MessageSpec::text(body).with_sender(sender)
    }

    fn container(sender: Sender, body: &str) -> MessageContainer {
        MessageContainer::new(sender, Location::new("intro::0"), &MessageSpec::text(body), 30)
    }

    #[test]
    fn test_amend_absent_spec() {
        let c = container(Sender::Actor, "Hi");
        assert!(!c.amend(None));
        assert_eq!(c.message().as_text(), Some("Hi"));
    }

    #[test]
    fn test_amend_rejects_other_sender() {
        let c = container(Sender::Actor, "Hi");
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        c.connect_message_changed(move |_| seen.set(seen.get() + 1));

        assert!(!c.amend(Some(&text(Sender::User, "there"))));
        assert!(!c.amend(Some(&MessageSpec::text("untagged"))));
        assert_eq!(c.message().as_text(), Some("Hi"));
        assert_eq!(calls.get(), 0);
    }

    fn variant_specs() -> Vec<MessageSpec> {
        [
            json!({"type": "scrolled", "text": "Hi"}),
            json!({"type": "choice", "text": "Pick", "settings": {"a": {"text": "A"}}}),
            json!({"type": "console", "settings": {"showmehow_id": "q"}}),
            json!({"type": "attachment", "attachment": {"path": "/tmp/a.png", "desc": "A picture"}}),
            json!({"type": "external_events"}),
        ]
        .iter()
        .map(|value| MessageSpec::from_value(value).unwrap())
        .collect()
    }

    #[test]
    fn test_amend_rejects_other_sender_for_every_variant() {
        for original in variant_specs() {
            let c = MessageContainer::new(Sender::Actor, Location::new("intro::0"), &original, 30);
            let before = c.message();
            for incoming in variant_specs() {
                for sender in [Sender::User, Sender::Input] {
                    assert!(
                        !c.amend(Some(&incoming.clone().with_sender(sender))),
                        "{} amended by {} from {}",
                        before.kind_name(),
                        incoming.type_tag(),
                        sender
                    );
                }
            }
            assert_eq!(c.message(), before);
            assert_eq!(c.generation(), 0);
        }
    }

    #[test]
    fn test_amend_text_in_place() {
        let c = container(Sender::Actor, "Hi");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        c.connect_message_changed(move |m| sink.borrow_mut().push(m.as_text().unwrap_or("").to_string()));

        assert!(c.amend(Some(&text(Sender::Actor, "there"))));
        assert_eq!(c.message().as_text(), Some("Hi\nthere"));
        assert_eq!(c.generation(), 0);
        assert_eq!(*seen.borrow(), vec!["Hi\nthere".to_string()]);
    }

    #[test]
    fn test_amend_replaces_non_text() {
        let c = MessageContainer::new(
            Sender::Input,
            Location::new("intro::1"),
            &MessageSpec::from_value(&json!({"type": "text", "settings": {"showmehow_id": "q"}})).unwrap(),
            30,
        );
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        c.connect_message_changed(move |_| seen.set(seen.get() + 1));

        assert!(c.amend(Some(&text(Sender::Input, "answer"))));
        assert_eq!(c.message().as_text(), Some("answer"));
        assert_eq!(c.generation(), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_replace_with_bumps_generation() {
        let c = container(Sender::User, "a");
        c.replace_with(&MessageSpec::text("b"));
        c.replace_with(&MessageSpec::text("c"));
        assert_eq!(c.generation(), 2);
        assert_eq!(c.message().as_text(), Some("c"));
    }

    #[test]
    fn test_disconnect_observer() {
        let c = container(Sender::Actor, "a");
        let calls = Rc::new(Cell::new(0));
        let seen = calls.clone();
        let id = c.connect_message_changed(move |_| seen.set(seen.get() + 1));

        assert!(c.disconnect(id));
        assert!(!c.disconnect(id));
        c.replace_with(&MessageSpec::text("b"));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn test_observer_may_read_container() {
        let c = container(Sender::Actor, "a");
        let inner = c.clone();
        let seen = Rc::new(Cell::new(0u64));
        let sink = seen.clone();
        c.connect_message_changed(move |_| sink.set(inner.generation()));

        c.replace_with(&MessageSpec::text("b"));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn test_responder_applies_amendment_then_forwards() {
        let spec = MessageSpec::from_value(&json!({
            "type": "choice",
            "settings": {"a": {"text": "Option A"}, "b": {"text": "Option B"}}
        }))
        .unwrap();
        let c = MessageContainer::new(Sender::Input, Location::new("quiz::2"), &spec, 30);
        let responses = Rc::new(RefCell::new(Vec::new()));
        let sink = responses.clone();
        let observed = c.clone();
        let responder = c.render_response(Rc::new(move |response: String| {
            // Amendment is visible before the listener runs.
            assert_eq!(observed.message().as_text(), Some("Option B"));
            sink.borrow_mut().push(response);
        }));

        assert!(responder.respond(&Interaction::Choose("b".into())));
        assert_eq!(*responses.borrow(), vec!["b".to_string()]);
        assert!(!responder.respond(&Interaction::Choose("a".into())));
    }

    #[test]
    fn test_responder_is_noop_after_drop() {
        let c = container(Sender::Actor, "a");
        let responder = c.render_response(Rc::new(|_: String| panic!("must not be called")));
        drop(c);
        assert!(!responder.is_alive());
        assert!(!responder.respond(&Interaction::Probe));
    }
}
