//! Presentation seam between the core and whatever draws the bubbles.

use crate::container::{MessageContainer, Responder};
use crate::delivery::{Delivery, DeliveryAdvancer};
use crate::spec::Sender;

/// Builds and shows views for staged deliveries.
///
/// `pending_view` and `message_view` are called lazily, when the item reaches
/// the front of the actor's queue. Content items stay at the front until the
/// sink calls `advancer.advance()`; pending items are advanced by the core
/// once their dwell expires.
pub trait PresentationSink {
    type View: 'static;

    /// Typing indicator shown before animated actor content.
    fn pending_view(&self, actor: &str, sender: Sender) -> Self::View;

    /// View for a container. `responder` routes interactions back.
    fn message_view(&self, actor: &str, container: &MessageContainer, responder: Responder) -> Self::View;

    fn show_pending(&self, actor: &str, delivery: Delivery<Self::View>);

    fn show_content(&self, actor: &str, delivery: Delivery<Self::View>, advancer: DeliveryAdvancer);
}
