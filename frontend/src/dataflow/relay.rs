//! Fan-out event relay for domain events
//!
//! A Relay is the single dispatch point for one kind of domain event. Each
//! subscriber owns its own unbounded channel, so views consume events
//! independently, in emission order, without reaching into each other's state.

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Observer list for one domain event type.
///
/// # Event-Source Naming Convention
///
/// Relays follow the `{source}_{event}_relay` pattern:
/// - `trace_changed_relay` - inserts, completions and resets, in apply order
/// - `virtual_time_changed_relay` - playback moved the virtual time
/// - `playback_state_changed_relay` - playback switched state
///
/// Events whose relative order matters belong on the same relay: separate
/// relays give no ordering guarantee between each other.
///
/// # Examples
///
/// ```rust
/// use frontend::dataflow::Relay;
/// use futures::StreamExt;
///
/// let message_completed_relay = Relay::<usize>::new();
/// let mut chart_stream = message_completed_relay.subscribe();
/// let mut graph_stream = message_completed_relay.subscribe();
///
/// message_completed_relay.send(3);
/// // both `chart_stream` and `graph_stream` now yield `3`
/// ```
#[derive(Clone)]
pub struct Relay<T>
where
    T: Clone + Send + 'static,
{
    subscribers: Arc<Mutex<Vec<UnboundedSender<T>>>>,
}

impl<T> Relay<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Relay {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Register a new observer. Only events sent after this call are delivered.
    pub fn subscribe(&self) -> UnboundedReceiver<T> {
        let (sender, receiver) = unbounded();
        self.subscribers().push(sender);
        receiver
    }

    /// Deliver an event to every live subscriber.
    ///
    /// Subscribers whose receiver was dropped are pruned; with no subscribers
    /// the event is discarded.
    pub fn send(&self, value: T) {
        self.subscribers()
            .retain(|sender| sender.unbounded_send(value.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<UnboundedSender<T>>> {
        // The lock only guards a Vec push/retain; a poisoned guard is still coherent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Default for Relay<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Relay<T>
where
    T: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("subscribers", &self.subscribers().len())
            .finish()
    }
}

/// Creates a Relay together with its first subscription.
pub fn relay<T>() -> (Relay<T>, UnboundedReceiver<T>)
where
    T: Clone + Send + 'static,
{
    let relay = Relay::new();
    let stream = relay.subscribe();
    (relay, stream)
}
