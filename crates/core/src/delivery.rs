//! DeliveryQueue - a per-actor, single-flight staging queue.
//!
//! Items are pushed as lazy builders. Only the front item is ever built and
//! handed to the consumer; the next one waits for an explicit advance. A
//! consumer that advances synchronously is trampolined so at most one
//! consumer call is on the stack and hand-over order equals push order.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use tracing::debug;

/// Lazy item waiting in a queue.
pub struct StagedItem<T> {
    builder: Option<Box<dyn FnOnce() -> T>>,
    sort_key: DateTime<Utc>,
    group_key: String,
    ticket: u64,
}

impl<T> StagedItem<T> {
    pub fn new(
        sort_key: DateTime<Utc>,
        group_key: impl Into<String>,
        builder: impl FnOnce() -> T + 'static,
    ) -> Self {
        Self {
            builder: Some(Box::new(builder)),
            sort_key,
            group_key: group_key.into(),
            ticket: 0,
        }
    }

    pub fn sort_key(&self) -> DateTime<Utc> {
        self.sort_key
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }
}

/// A materialized item handed to the consumer.
#[derive(Debug, Clone)]
pub struct Delivery<T> {
    pub item: T,
    pub sort_key: DateTime<Utc>,
    pub group_key: String,
}

impl<T> Delivery<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Delivery<U> {
        Delivery {
            item: f(self.item),
            sort_key: self.sort_key,
            group_key: self.group_key,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Delivering,
}

trait Advance {
    fn advance_ticket(&self, ticket: u64) -> bool;
}

/// Weak handle that advances the queue past one specific item.
///
/// Advancing twice, or after the item has already been advanced past, is a
/// no-op, as is advancing a queue that has been dropped.
#[derive(Clone)]
pub struct DeliveryAdvancer {
    queue: Weak<dyn Advance>,
    ticket: u64,
}

impl DeliveryAdvancer {
    pub fn advance(&self) -> bool {
        match self.queue.upgrade() {
            Some(queue) => queue.advance_ticket(self.ticket),
            None => {
                debug!(ticket = self.ticket, "Advance on dropped queue ignored");
                false
            }
        }
    }
}

impl fmt::Debug for DeliveryAdvancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryAdvancer")
            .field("ticket", &self.ticket)
            .field("alive", &(self.queue.strong_count() > 0))
            .finish()
    }
}

type Consumer<T> = Box<dyn FnMut(Delivery<T>, DeliveryAdvancer)>;

struct QueueInner<T> {
    pending: RefCell<VecDeque<StagedItem<T>>>,
    consumer: RefCell<Consumer<T>>,
    outbox: RefCell<VecDeque<(Delivery<T>, u64)>>,
    dispatching: Cell<bool>,
    next_ticket: Cell<u64>,
    materialized: Cell<usize>,
    this: Weak<QueueInner<T>>,
}

/// Single-flight queue. See the module docs.
pub struct DeliveryQueue<T: 'static> {
    inner: Rc<QueueInner<T>>,
}

impl<T: 'static> DeliveryQueue<T> {
    pub fn new(consumer: impl FnMut(Delivery<T>, DeliveryAdvancer) + 'static) -> Self {
        let inner = Rc::new_cyclic(|this| QueueInner {
            pending: RefCell::new(VecDeque::new()),
            consumer: RefCell::new(Box::new(consumer)),
            outbox: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            next_ticket: Cell::new(1),
            materialized: Cell::new(0),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Append an item; an idle queue materializes it immediately.
    pub fn push(&self, item: StagedItem<T>) {
        self.inner.push(item);
    }

    /// Drop the front item and materialize the next one. No-op when idle.
    pub fn advance(&self) -> bool {
        self.inner.advance_front()
    }

    /// Advancer bound to the current front item.
    pub fn advancer(&self) -> Option<DeliveryAdvancer> {
        let ticket = self.inner.pending.borrow().front().map(|item| item.ticket)?;
        Some(self.inner.advancer(ticket))
    }

    pub fn state(&self) -> QueueState {
        if self.inner.pending.borrow().is_empty() {
            QueueState::Idle
        } else {
            QueueState::Delivering
        }
    }

    pub fn len(&self) -> usize {
        self.inner.pending.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the front item has been built.
    pub fn is_materialized(&self) -> bool {
        self.inner
            .pending
            .borrow()
            .front()
            .is_some_and(|item| item.builder.is_none())
    }

    /// Items built and not yet advanced past. Never exceeds one.
    pub fn materialized_count(&self) -> usize {
        self.inner.materialized.get()
    }
}

impl<T: 'static> fmt::Debug for DeliveryQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryQueue")
            .field("len", &self.len())
            .field("state", &self.state())
            .finish()
    }
}

impl<T: 'static> QueueInner<T> {
    fn advancer(&self, ticket: u64) -> DeliveryAdvancer {
        let queue: Weak<dyn Advance> = self.this.clone();
        DeliveryAdvancer { queue, ticket }
    }

    fn push(&self, mut item: StagedItem<T>) {
        item.ticket = self.next_ticket.get();
        self.next_ticket.set(item.ticket + 1);
        let was_idle = {
            let mut pending = self.pending.borrow_mut();
            pending.push_back(item);
            pending.len() == 1
        };
        debug!(len = self.pending.borrow().len(), "Item staged");
        if was_idle {
            self.materialize_front();
        }
    }

    fn advance_front(&self) -> bool {
        let popped = self.pending.borrow_mut().pop_front();
        let Some(popped) = popped else {
            debug!("Advance on idle queue ignored");
            return false;
        };
        if popped.builder.is_none() {
            self.materialized.set(self.materialized.get().saturating_sub(1));
        }
        debug!(ticket = popped.ticket, remaining = self.pending.borrow().len(), "Advanced");
        self.materialize_front();
        true
    }

    fn materialize_front(&self) {
        let taken = {
            let mut pending = self.pending.borrow_mut();
            pending.front_mut().and_then(|front| {
                let builder = front.builder.take()?;
                Some((builder, front.sort_key, front.group_key.clone(), front.ticket))
            })
        };
        let Some((builder, sort_key, group_key, ticket)) = taken else {
            return;
        };
        self.materialized.set(self.materialized.get() + 1);
        let delivery = Delivery {
            item: builder(),
            sort_key,
            group_key,
        };
        self.dispatch(delivery, ticket);
    }

    fn dispatch(&self, delivery: Delivery<T>, ticket: u64) {
        self.outbox.borrow_mut().push_back((delivery, ticket));
        if self.dispatching.get() {
            return;
        }
        self.dispatching.set(true);
        loop {
            let next = self.outbox.borrow_mut().pop_front();
            let Some((delivery, ticket)) = next else {
                break;
            };
            let advancer = self.advancer(ticket);
            let mut consumer = self.consumer.borrow_mut();
            (&mut **consumer)(delivery, advancer);
        }
        self.dispatching.set(false);
    }
}

impl<T: 'static> Advance for QueueInner<T> {
    fn advance_ticket(&self, ticket: u64) -> bool {
        let current = self.pending.borrow().front().map(|item| item.ticket);
        if current != Some(ticket) {
            debug!(ticket, ?current, "Stale advance ignored");
            return false;
        }
        self.advance_front()
    }
}
