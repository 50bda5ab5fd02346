//! In-process change notification bus
//!
//! Every conversation is a topic backed by a `tokio::sync::broadcast`
//! channel. Subscribers pick the event kinds they care about and either pull
//! events with [`Subscription::recv`] or register a callback with
//! [`ChangeBus::subscribe_with`].
//!
//! Delivery is at-least-once with no replay: a subscriber that falls more
//! than the channel capacity behind gets a single [`ChangeEvent::Lagged`] and
//! is expected to reload the conversation.

use lostfound_store::Message;
use parking_lot::{ReentrantMutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::ops::BitOr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::typing::TypingState;

/// A change observed in a conversation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    MessageInserted(Message),
    MessageUpdated(Message),
    MessageDeleted {
        conversation_id: String,
        message_id: String,
    },
    MessagesRead {
        conversation_id: String,
        reader_id: String,
        count: u64,
    },
    Typing {
        state: TypingState,
        /// Set when the tracker timed the entry out rather than the user stopping
        expired: bool,
    },
    /// The subscriber fell behind and `missed` events were dropped
    Lagged { missed: u64 },
}

impl ChangeEvent {
    /// Kind bit of this event; `Lagged` has none and always passes filters
    pub fn kind(&self) -> Option<EventKinds> {
        match self {
            ChangeEvent::MessageInserted(_) => Some(EventKinds::INSERTED),
            ChangeEvent::MessageUpdated(_) => Some(EventKinds::UPDATED),
            ChangeEvent::MessageDeleted { .. } => Some(EventKinds::DELETED),
            ChangeEvent::MessagesRead { .. } => Some(EventKinds::READ),
            ChangeEvent::Typing { .. } => Some(EventKinds::TYPING),
            ChangeEvent::Lagged { .. } => None,
        }
    }
}

/// Set of event kinds a subscriber wants to receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKinds(u8);

impl EventKinds {
    pub const INSERTED: Self = Self(1);
    pub const UPDATED: Self = Self(1 << 1);
    pub const DELETED: Self = Self(1 << 2);
    pub const READ: Self = Self(1 << 3);
    pub const TYPING: Self = Self(1 << 4);
    /// Inserted, updated and deleted messages
    pub const MESSAGES: Self = Self(Self::INSERTED.0 | Self::UPDATED.0 | Self::DELETED.0);
    pub const ALL: Self = Self(Self::MESSAGES.0 | Self::READ.0 | Self::TYPING.0);

    pub fn contains(self, other: EventKinds) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn accepts(self, event: &ChangeEvent) -> bool {
        event.kind().map(|k| self.contains(k)).unwrap_or(true)
    }
}

impl BitOr for EventKinds {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

struct HandleState {
    closed: AtomicBool,
    notify: Notify,
    /// Held while a callback runs; reentrant so a callback may unsubscribe itself
    gate: ReentrantMutex<()>,
}

/// Cancels a subscription
///
/// Cloneable and safe to call any number of times from any thread. Once
/// `unsubscribe` returns no further callback runs and a pending `recv`
/// resolves to `None`.
#[derive(Clone)]
pub struct SubscriptionHandle {
    state: Arc<HandleState>,
}

impl SubscriptionHandle {
    fn new() -> Self {
        Self {
            state: Arc::new(HandleState {
                closed: AtomicBool::new(false),
                notify: Notify::new(),
                gate: ReentrantMutex::new(()),
            }),
        }
    }

    pub fn unsubscribe(&self) {
        let _gate = self.state.gate.lock();
        if !self.state.closed.swap(true, Ordering::AcqRel) {
            debug!("Subscription closed");
        }
        self.state.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }
}

/// Pull-style subscription to one conversation
pub struct Subscription {
    conversation_id: String,
    kinds: EventKinds,
    rx: broadcast::Receiver<ChangeEvent>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn handle(&self) -> SubscriptionHandle {
        self.handle.clone()
    }

    /// Next matching event, or `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let closed = self.handle.state.notify.notified();
            tokio::pin!(closed);
            closed.as_mut().enable();
            if self.handle.is_closed() {
                return None;
            }

            let next = tokio::select! {
                res = self.rx.recv() => res,
                _ = &mut closed => return None,
            };

            match next {
                Ok(event) if self.kinds.accepts(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        "Subscriber of {} lagged, {} events dropped",
                        self.conversation_id, missed
                    );
                    return Some(ChangeEvent::Lagged { missed });
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Topic registry keyed by conversation id
#[derive(Clone)]
pub struct ChangeBus {
    capacity: usize,
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<ChangeEvent>>>>,
}

impl ChangeBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event and return how many subscribers it reached
    ///
    /// A topic whose subscribers are all gone is dropped here.
    pub fn publish(&self, conversation_id: &str, event: ChangeEvent) -> usize {
        let mut topics = self.topics.write();
        let Some(tx) = topics.get(conversation_id) else {
            return 0;
        };

        match tx.send(event) {
            Ok(reached) => reached,
            Err(_) => {
                topics.remove(conversation_id);
                debug!("Pruned topic {} with no subscribers", conversation_id);
                0
            }
        }
    }

    pub fn subscribe(&self, conversation_id: &str, kinds: EventKinds) -> Subscription {
        let rx = self
            .topics
            .write()
            .entry(conversation_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe();

        debug!("New subscriber on {}", conversation_id);
        Subscription {
            conversation_id: conversation_id.to_string(),
            kinds,
            rx,
            handle: SubscriptionHandle::new(),
        }
    }

    /// Run `callback` on a spawned task for every matching event
    ///
    /// Must be called from within a tokio runtime.
    pub fn subscribe_with<F>(
        &self,
        conversation_id: &str,
        kinds: EventKinds,
        mut callback: F,
    ) -> SubscriptionHandle
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let mut subscription = self.subscribe(conversation_id, kinds);
        let handle = subscription.handle();
        let state = handle.state.clone();

        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let stop = {
                    let _gate = state.gate.lock();
                    if state.closed.load(Ordering::Acquire) {
                        true
                    } else {
                        callback(event);
                        false
                    }
                };
                if stop {
                    break;
                }
            }
        });

        handle
    }

    /// Number of live topics
    pub fn topic_count(&self) -> usize {
        self.topics.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        let kinds = EventKinds::INSERTED | EventKinds::TYPING;
        assert!(kinds.contains(EventKinds::INSERTED));
        assert!(kinds.contains(EventKinds::TYPING));
        assert!(!kinds.contains(EventKinds::DELETED));
        assert!(EventKinds::ALL.contains(EventKinds::MESSAGES));
        assert!(kinds.accepts(&ChangeEvent::Lagged { missed: 3 }));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = ChangeBus::new(8);
        let reached = bus.publish(
            "c1",
            ChangeEvent::MessageDeleted {
                conversation_id: "c1".to_string(),
                message_id: "m1".to_string(),
            },
        );
        assert_eq!(reached, 0);
        assert_eq!(bus.topic_count(), 0);
    }

    #[tokio::test]
    async fn test_topic_pruned_after_last_subscriber() {
        let bus = ChangeBus::new(8);
        let sub = bus.subscribe("c1", EventKinds::ALL);
        assert_eq!(bus.topic_count(), 1);
        drop(sub);

        bus.publish("c1", ChangeEvent::Lagged { missed: 0 });
        assert_eq!(bus.topic_count(), 0);
    }
}
