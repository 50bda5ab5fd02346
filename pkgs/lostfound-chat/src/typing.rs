//! Presence/typing tracker
//!
//! Typing state lives in memory only. Each `(conversation, user)` key is
//! either absent (idle) or typing with a deadline; a heartbeat pushes the
//! deadline out by the TTL. Entries past their deadline are invisible to
//! [`TypingTracker::typing_users`] immediately and are removed by the sweeper,
//! which publishes a `typing = false` event marked as expired.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

use crate::bus::{ChangeBus, ChangeEvent};

/// Typing status of one user in one conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingState {
    pub conversation_id: String,
    pub user_id: String,
    pub is_typing: bool,
    pub updated_at: DateTime<Utc>,
}

struct Entry {
    state: TypingState,
    deadline: Instant,
}

struct TrackerInner {
    ttl: Duration,
    bus: ChangeBus,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

/// Tracks who is typing where and publishes every change on the bus
#[derive(Clone)]
pub struct TypingTracker {
    inner: Arc<TrackerInner>,
}

impl TypingTracker {
    pub fn new(bus: ChangeBus, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                ttl,
                bus,
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Record a typing heartbeat or stop; last writer wins
    pub fn set_typing(&self, conversation_id: &str, user_id: &str, is_typing: bool) -> TypingState {
        let state = TypingState {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            is_typing,
            updated_at: Utc::now(),
        };

        let key = (conversation_id.to_string(), user_id.to_string());
        let mut entries = self.inner.entries.lock();
        if is_typing {
            entries.insert(
                key,
                Entry {
                    state: state.clone(),
                    deadline: Instant::now() + self.inner.ttl,
                },
            );
        } else {
            entries.remove(&key);
        }

        // Published under the entries lock so event order matches table order
        debug!("{} typing={} in {}", user_id, is_typing, conversation_id);
        self.inner.bus.publish(
            conversation_id,
            ChangeEvent::Typing {
                state: state.clone(),
                expired: false,
            },
        );
        drop(entries);
        state
    }

    /// Users currently typing in a conversation, sorted
    pub fn typing_users(&self, conversation_id: &str) -> Vec<String> {
        let now = Instant::now();
        let entries = self.inner.entries.lock();
        let mut users: Vec<String> = entries
            .values()
            .filter(|e| e.state.conversation_id == conversation_id && e.deadline > now)
            .map(|e| e.state.user_id.clone())
            .collect();
        users.sort();
        users
    }

    /// Expire stale entries and publish their `typing = false` events
    pub fn sweep(&self) -> usize {
        sweep_inner(&self.inner)
    }

    /// Sweep every `every` until the tracker is dropped
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let weak: Weak<TrackerInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    debug!("Typing tracker dropped, stopping sweeper");
                    break;
                };
                sweep_inner(&inner);
            }
        })
    }
}

fn sweep_inner(inner: &TrackerInner) -> usize {
    let now = Instant::now();
    let mut entries = inner.entries.lock();
    let stale: Vec<(String, String)> = entries
        .iter()
        .filter(|(_, e)| e.deadline <= now)
        .map(|(k, _)| k.clone())
        .collect();

    let mut expired = 0;
    for key in stale {
        let Some(entry) = entries.remove(&key) else {
            continue;
        };
        debug!(
            "Typing of {} in {} expired",
            entry.state.user_id, entry.state.conversation_id
        );
        let state = TypingState {
            is_typing: false,
            updated_at: Utc::now(),
            ..entry.state
        };
        inner.bus.publish(
            &key.0,
            ChangeEvent::Typing {
                state,
                expired: true,
            },
        );
        expired += 1;
    }
    expired
}
