//! Chatbox - the orchestrator that ties ChatState to its collaborators
//!
//! Inbound events from the host become ChatState operations; user
//! responses coming back from views are evaluated by the content service and
//! turned into the next messages; presentation feedback drives unread
//! bookkeeping for conversations that are not on screen.

use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use chatbox_core::{
    ChatState, ChatboxConfig, ChatboxError, DeliveryMode, Location, Message, MessageSpec, PresentationSink, Result,
    Sender, SharedContentService, SharedLogService, SharedNotificationSink, SharedTimerHost, UserResponse,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

use crate::events::{InboundEvent, PresentationEvent};

/// How often `settle` re-checks lanes that are still delivering.
const SETTLE_POLL: Duration = Duration::from_millis(10);

/// Collaborators a [`Chatbox`] needs besides its presentation sink.
#[derive(Clone)]
pub struct ChatboxServices {
    pub content: SharedContentService,
    pub log: SharedLogService,
    pub notifier: SharedNotificationSink,
    pub timers: SharedTimerHost,
}

pub struct Chatbox<P: PresentationSink + 'static> {
    state: ChatState<P>,
    content: SharedContentService,
    log: SharedLogService,
    foreground: Option<String>,
    /// Presented events to skip per actor (rehydrated history).
    suppressed: HashMap<String, usize>,
    responses: UnboundedReceiver<UserResponse>,
    presented: UnboundedReceiver<PresentationEvent>,
}

impl<P: PresentationSink + 'static> Chatbox<P> {
    pub fn new(
        sink: Rc<P>,
        presented: UnboundedReceiver<PresentationEvent>,
        services: ChatboxServices,
        config: ChatboxConfig,
    ) -> Self {
        let (tx, responses) = mpsc::unbounded_channel();
        let listener = Rc::new(move |response: UserResponse| {
            if tx.send(response).is_err() {
                debug!("Response dropped: chatbox is gone");
            }
        });
        let state = ChatState::new(sink, services.timers, services.notifier, listener, config);
        Self {
            state,
            content: services.content,
            log: services.log,
            foreground: None,
            suppressed: HashMap::new(),
            responses,
            presented,
        }
    }

    pub fn state(&self) -> &ChatState<P> {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChatState<P> {
        &mut self.state
    }

    pub fn foreground(&self) -> Option<&str> {
        self.foreground.as_deref()
    }

    /// Make `actor` the conversation on screen and mark it read.
    pub fn focus(&mut self, actor: &str) {
        info!(actor, "Focus");
        self.foreground = Some(actor.to_string());
        self.state.mark_all_read_for_actor(actor);
    }

    /// Replay stored history for `actor` without animation or unread marks.
    /// Logged input prompts are skipped; only live prompts fill the input slot.
    /// Returns the number of items replayed.
    pub async fn rehydrate(&mut self, actor: &str) -> Result<usize> {
        let items = self.log.fetch_log_for_actor(actor).await?;
        let mut replayed = 0;
        for item in items {
            if item.sender == Sender::Input {
                warn!(actor, location = %item.location, "Skipping logged input prompt");
                continue;
            }
            let spec = match MessageSpec::from_value(&item.spec) {
                Ok(spec) => spec.with_mode(DeliveryMode::Immediate),
                Err(e) => {
                    warn!(actor, location = %item.location, "Skipping history item: {}", e);
                    continue;
                }
            };
            *self.suppressed.entry(actor.to_string()).or_default() += 1;
            self.state.add_message_for_actor(actor, item.sender, &spec, item.location);
            replayed += 1;
        }
        info!(actor, replayed, "History rehydrated");
        Ok(replayed)
    }

    pub async fn handle_inbound(&mut self, event: InboundEvent) -> Result<()> {
        debug!(?event, "Inbound");
        match event {
            InboundEvent::ChatMessage {
                actor,
                sender,
                location,
                spec,
            } => {
                let sender = sender.unwrap_or(Sender::Actor);
                self.state.add_message_value_for_actor(&actor, sender, &spec, location)?;
            }
            InboundEvent::UserInputBubble { actor, location, spec } => {
                let spec = MessageSpec::from_value(&spec)?;
                self.state.replace_active_input_for_actor(&actor, &spec, location);
            }
            InboundEvent::ExternalEventsSatisfied { actor } => {
                let waiting = self
                    .state
                    .conversation(&actor)
                    .and_then(|conversation| conversation.active_input())
                    .filter(|input| matches!(input.message(), Message::ExternalEvent))
                    .map(|input| input.location().clone());
                match waiting {
                    Some(location) => {
                        self.state.clear_active_input_for_actor(&actor);
                        self.advance_story(&actor, &location, "").await?;
                    }
                    None => debug!(actor = %actor, "No external-events input waiting"),
                }
            }
            InboundEvent::Focus { actor } => self.focus(&actor),
            InboundEvent::Respond { actor, interaction } => {
                if !self.state.interact(&actor, &interaction) {
                    warn!(actor = %actor, ?interaction, "Interaction had no effect");
                }
            }
            InboundEvent::Reset => {
                self.state.clear_all();
                self.suppressed.clear();
            }
        }
        Ok(())
    }

    /// Answers to the input slot are echoed as a user bubble; every response
    /// is then evaluated and the story moves on.
    pub async fn handle_response(&mut self, response: UserResponse) -> Result<()> {
        let UserResponse {
            actor,
            sender,
            location,
            response,
        } = response;
        info!(actor = %actor, %location, ?sender, "User response");

        if sender == Sender::Input {
            self.state.clear_active_input_for_actor(&actor);
            if !response.is_empty() {
                self.state
                    .add_message_for_actor(&actor, Sender::User, &MessageSpec::text(response.clone()), location.clone());
            }
        }
        self.advance_story(&actor, &location, &response).await
    }

    pub fn handle_presented(&mut self, event: PresentationEvent) {
        let PresentationEvent::Presented { actor, sender } = event;
        if let Some(remaining) = self.suppressed.get_mut(&actor)
            && *remaining > 0
        {
            *remaining -= 1;
            return;
        }
        if sender == Sender::User || self.foreground.as_deref() == Some(actor.as_str()) {
            return;
        }
        self.state.mark_visible_and_not_read(&actor);
    }

    /// Process everything already queued on the feedback channels.
    pub async fn pump(&mut self) {
        loop {
            let mut progressed = false;
            while let Ok(event) = self.presented.try_recv() {
                self.handle_presented(event);
                progressed = true;
            }
            if let Ok(response) = self.responses.try_recv() {
                if let Err(e) = self.handle_response(response).await {
                    warn!("Response handling failed: {}", e);
                }
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    /// Keep pumping until no lane is delivering or `limit` has passed.
    pub async fn settle(&mut self, limit: Duration) {
        let deadline = tokio::time::Instant::now() + limit;
        loop {
            self.pump().await;
            if !self.state.any_delivering() {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                warn!("Deliveries still pending after {:?}", limit);
                break;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
        self.pump().await;
    }

    /// Handle inbound events until the channel closes, then settle.
    pub async fn run(&mut self, mut inbound: UnboundedReceiver<InboundEvent>, settle_limit: Duration) -> Result<()> {
        loop {
            tokio::select! {
                biased;
                Some(event) = self.presented.recv() => self.handle_presented(event),
                Some(response) = self.responses.recv() => {
                    if let Err(e) = self.handle_response(response).await {
                        warn!("Response handling failed: {}", e);
                    }
                }
                event = inbound.recv() => match event {
                    Some(event) => self.handle_inbound(event).await?,
                    None => break,
                },
            }
        }
        self.settle(settle_limit).await;
        Ok(())
    }

    async fn advance_story(&mut self, actor: &str, location: &Location, response: &str) -> Result<()> {
        let evaluated = self
            .content
            .evaluate_response(location, response)
            .await
            .map_err(|e| service_error("evaluate_response", e))?;
        if !evaluated.is_empty() {
            self.state
                .add_message_for_actor(actor, Sender::Actor, &MessageSpec::text(evaluated), location.clone());
        }

        let task = self
            .content
            .fetch_task_description(location)
            .await
            .map_err(|e| service_error("fetch_task_description", e))?;
        let task_location = task
            .location
            .or_else(|| self.state.current_location_for_actor(actor))
            .unwrap_or_else(|| location.clone());
        if !task.description.is_empty() {
            self.state.add_message_for_actor(
                actor,
                Sender::Actor,
                &MessageSpec::text(task.description),
                task_location.clone(),
            );
        }
        if let Some(input) = task.input {
            self.state.replace_active_input_for_actor(actor, &input, task_location);
        }
        Ok(())
    }
}

fn service_error(call: &str, error: ChatboxError) -> ChatboxError {
    warn!("{} failed: {}", call, error);
    match error {
        ChatboxError::Service(_) => error,
        other if other.is_protocol_error() => other,
        other => ChatboxError::Service(format!("{call}: {other}")),
    }
}
