//! ChatState - the orchestration surface over every actor's conversation.
//!
//! Each actor gets a [`ConversationState`] and a delivery lane, created
//! lazily and always together. Containers are staged into the lane so that
//! each actor's bubbles appear one at a time, with a typing indicator in
//! front of animated actor content.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ChatboxConfig;
use crate::container::{MessageContainer, ResponseSink};
use crate::conversation::ConversationState;
use crate::delivery::{Delivery, DeliveryQueue, QueueState, StagedItem};
use crate::error::Result;
use crate::message::Interaction;
use crate::presentation::PresentationSink;
use crate::services::SharedNotificationSink;
use crate::spec::{DeliveryMode, Location, MessageSpec, Sender};
use crate::timer::{SharedTimerHost, TimerHandle};

/// Group key shared by every user bubble regardless of actor.
pub const USER_GROUP_KEY: &str = "user";

/// A response produced by the user through a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub actor: String,
    pub sender: Sender,
    pub location: Location,
    pub response: String,
}

pub type ResponseListener = Rc<dyn Fn(UserResponse)>;

enum Staged<V> {
    Pending { view: V, dwell: Duration },
    Content(V),
}

struct ActorLane<V: 'static> {
    queue: DeliveryQueue<Staged<V>>,
    dwell: Rc<RefCell<Option<TimerHandle>>>,
}

impl<V: 'static> Drop for ActorLane<V> {
    fn drop(&mut self) {
        if let Some(handle) = self.dwell.borrow_mut().take() {
            handle.cancel();
        }
    }
}

pub struct ChatState<P: PresentationSink> {
    conversations: HashMap<String, ConversationState>,
    delivery_queues: HashMap<String, ActorLane<P::View>>,
    sink: Rc<P>,
    timers: SharedTimerHost,
    notifier: SharedNotificationSink,
    listener: ResponseListener,
    config: ChatboxConfig,
}

impl<P: PresentationSink + 'static> ChatState<P> {
    pub fn new(
        sink: Rc<P>,
        timers: SharedTimerHost,
        notifier: SharedNotificationSink,
        listener: ResponseListener,
        config: ChatboxConfig,
    ) -> Self {
        Self {
            conversations: HashMap::new(),
            delivery_queues: HashMap::new(),
            sink,
            timers,
            notifier,
            listener,
            config,
        }
    }

    pub fn config(&self) -> &ChatboxConfig {
        &self.config
    }

    pub fn sink(&self) -> &Rc<P> {
        &self.sink
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Add a message, merging it into the last container when possible.
    /// Delivery is staged either way so the visible bubble is refreshed.
    pub fn add_message_for_actor(
        &mut self,
        actor: &str,
        sender: Sender,
        spec: &MessageSpec,
        location: Location,
    ) -> MessageContainer {
        let spec = spec.clone().with_sender(sender);
        let conversation = self.ensure_actor(actor);
        let container = match conversation.amend_last_message(&spec) {
            (true, Some(container)) => container,
            _ => conversation.add_from_service(sender, &spec, location),
        };

        if sender == Sender::Actor && spec.mode == DeliveryMode::Animated {
            let dwell = self.config.delivery.pending_dwell(&spec);
            self.stage_pending(actor, sender, dwell);
        }
        self.stage_content(actor, &container);
        container
    }

    /// Parse a wire spec and add it. Protocol errors propagate.
    pub fn add_message_value_for_actor(
        &mut self,
        actor: &str,
        sender: Sender,
        spec: &Value,
        location: Location,
    ) -> Result<MessageContainer> {
        let spec = MessageSpec::from_value(spec)?;
        Ok(self.add_message_for_actor(actor, sender, &spec, location))
    }

    pub fn replace_active_input_for_actor(
        &mut self,
        actor: &str,
        spec: &MessageSpec,
        location: Location,
    ) -> MessageContainer {
        let spec = spec.clone().with_sender(Sender::Input);
        let container = self.ensure_actor(actor).replace_active_input(&spec, location);
        debug!(actor, kind = spec.type_tag(), "Active input replaced");
        self.stage_content(actor, &container);
        container
    }

    pub fn clear_active_input_for_actor(&mut self, actor: &str) -> Option<MessageContainer> {
        self.ensure_actor(actor).clear_active_input()
    }

    pub fn mark_visible_and_not_read(&mut self, actor: &str) {
        let delay = self.config.reminder.delay();
        let notifier = self.notifier.clone();
        let key = actor.to_string();
        self.ensure_actor(actor).register_visible_and_unread(delay, move || {
            info!(actor = %key, "Messages still unread");
            if let Err(e) = notifier.notify_still_unread(&key) {
                warn!(actor = %key, "Unread reminder failed: {}", e);
            }
        });
    }

    pub fn mark_all_read_for_actor(&mut self, actor: &str) {
        self.ensure_actor(actor).mark_all_read();
    }

    /// Drop every conversation and lane, cancelling their timers.
    pub fn clear_all(&mut self) {
        info!(actors = self.conversations.len(), "Clearing all conversations");
        self.delivery_queues.clear();
        self.conversations.clear();
    }

    /// Drive the active input, or else the last container, as if the user
    /// had interacted with its view.
    pub fn interact(&self, actor: &str, interaction: &Interaction) -> bool {
        let Some(conversation) = self.conversations.get(actor) else {
            return false;
        };
        let Some(target) = conversation
            .active_input()
            .or_else(|| conversation.containers().last())
            .cloned()
        else {
            return false;
        };
        let responder = target.render_response(self.response_sink(actor, &target));
        responder.respond(interaction)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub fn current_location_for_actor(&self, actor: &str) -> Option<Location> {
        self.conversations
            .get(actor)
            .and_then(|conversation| conversation.current_location().cloned())
    }

    pub fn unread_count_for_actor(&self, actor: &str) -> usize {
        self.conversations
            .get(actor)
            .map(ConversationState::unread_count)
            .unwrap_or(0)
    }

    pub fn conversation(&self, actor: &str) -> Option<&ConversationState> {
        self.conversations.get(actor)
    }

    pub fn actors(&self) -> Vec<String> {
        let mut actors: Vec<String> = self.conversations.keys().cloned().collect();
        actors.sort();
        actors
    }

    pub fn is_delivering(&self, actor: &str) -> bool {
        self.delivery_queues
            .get(actor)
            .is_some_and(|lane| lane.queue.state() == QueueState::Delivering)
    }

    pub fn any_delivering(&self) -> bool {
        self.delivery_queues
            .values()
            .any(|lane| lane.queue.state() == QueueState::Delivering)
    }

    pub fn queued_len(&self, actor: &str) -> usize {
        self.delivery_queues.get(actor).map_or(0, |lane| lane.queue.len())
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_actor(&mut self, actor: &str) -> &mut ConversationState {
        if !self.delivery_queues.contains_key(actor) {
            let lane = self.new_lane(actor);
            self.delivery_queues.insert(actor.to_string(), lane);
        }
        let timers = self.timers.clone();
        let wrap_width = self.config.display.wrap_width;
        self.conversations
            .entry(actor.to_string())
            .or_insert_with(|| {
                debug!(actor, "Conversation created");
                ConversationState::new(timers, wrap_width)
            })
    }

    fn new_lane(&self, actor: &str) -> ActorLane<P::View> {
        let sink = self.sink.clone();
        let timers = self.timers.clone();
        let dwell: Rc<RefCell<Option<TimerHandle>>> = Rc::new(RefCell::new(None));
        let slot = dwell.clone();
        let actor = actor.to_string();

        let queue = DeliveryQueue::new(move |delivery: Delivery<Staged<P::View>>, advancer| {
            let Delivery {
                item,
                sort_key,
                group_key,
            } = delivery;
            match item {
                Staged::Pending { view, dwell } => {
                    sink.show_pending(
                        &actor,
                        Delivery {
                            item: view,
                            sort_key,
                            group_key,
                        },
                    );
                    let weak_slot = Rc::downgrade(&slot);
                    let handle = timers.schedule(
                        dwell,
                        Box::new(move || {
                            if let Some(slot) = weak_slot.upgrade() {
                                slot.borrow_mut().take();
                            }
                            advancer.advance();
                        }),
                    );
                    *slot.borrow_mut() = Some(handle);
                }
                Staged::Content(view) => sink.show_content(
                    &actor,
                    Delivery {
                        item: view,
                        sort_key,
                        group_key,
                    },
                    advancer,
                ),
            }
        });

        ActorLane { queue, dwell }
    }

    fn stage_pending(&mut self, actor: &str, sender: Sender, dwell: Duration) {
        let sink = self.sink.clone();
        let key = actor.to_string();
        let item = StagedItem::new(Utc::now(), group_key(actor, sender), move || Staged::Pending {
            view: sink.pending_view(&key, sender),
            dwell,
        });
        self.push(actor, item);
    }

    fn stage_content(&mut self, actor: &str, container: &MessageContainer) {
        let sink = self.sink.clone();
        let key = actor.to_string();
        let target = container.clone();
        let responses = self.response_sink(actor, container);
        let item = StagedItem::new(Utc::now(), group_key(actor, container.sender()), move || {
            let responder = target.render_response(responses);
            Staged::Content(sink.message_view(&key, &target, responder))
        });
        self.push(actor, item);
    }

    fn push(&mut self, actor: &str, item: StagedItem<Staged<P::View>>) {
        if !self.delivery_queues.contains_key(actor) {
            self.ensure_actor(actor);
        }
        if let Some(lane) = self.delivery_queues.get(actor) {
            lane.queue.push(item);
        }
    }

    fn response_sink(&self, actor: &str, container: &MessageContainer) -> ResponseSink {
        let listener = self.listener.clone();
        let actor = actor.to_string();
        let sender = container.sender();
        let location = container.location().clone();
        Rc::new(move |response: String| {
            listener(UserResponse {
                actor: actor.clone(),
                sender,
                location: location.clone(),
                response,
            })
        })
    }
}

fn group_key(actor: &str, sender: Sender) -> String {
    match sender {
        Sender::User => USER_GROUP_KEY.to_string(),
        _ => actor.to_string(),
    }
}

impl<P: PresentationSink> fmt::Debug for ChatState<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatState")
            .field("conversations", &self.conversations)
            .field("lanes", &self.delivery_queues.len())
            .field("config", &self.config)
            .finish()
    }
}
