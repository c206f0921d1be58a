//! Concurrent set of live subscribers.
//!
//! Each member is the sending half of a bounded channel drained by its
//! connection task. A member whose channel is closed or full is dropped on
//! the broadcast that discovers it; the connection then sees its receiver
//! end and closes.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Pre-serialized frame shared by every recipient of a broadcast.
pub type Frame = Arc<str>;

/// Default per-subscriber buffer, in frames.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// Identifier of one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side handed to a connection on subscribe.
#[derive(Debug)]
pub struct Subscription {
    /// Member id, needed to unsubscribe.
    pub id: SubscriberId,
    /// Frames broadcast to this member.
    pub receiver: mpsc::Receiver<Frame>,
}

/// Result of one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members that accepted the frame.
    pub delivered: usize,
    /// Members removed because their channel was closed or full.
    pub removed: usize,
}

/// Set of live subscribers, safe to mutate while broadcasting.
#[derive(Debug)]
pub struct SubscriberSet {
    members: DashMap<SubscriberId, mpsc::Sender<Frame>>,
    buffer: usize,
}

impl Default for SubscriberSet {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

impl SubscriberSet {
    /// Creates an empty set with `buffer` frames of slack per member.
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self {
            members: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Adds a member.
    #[must_use]
    pub fn insert(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = SubscriberId::new();
        self.members.insert(id, sender);
        Subscription { id, receiver }
    }

    /// Removes a member. Returns `false` if it was already gone.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.members.remove(&id).is_some()
    }

    /// Returns the number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Returns `true` if there are no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Offers `frame` to every member without waiting.
    pub fn broadcast(&self, frame: &Frame) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut dead = Vec::new();

        for member in &self.members {
            match member.value().try_send(Arc::clone(frame)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Closed(_)) => dead.push(*member.key()),
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(subscriber = %member.key(), "subscriber buffer full, dropping member");
                    dead.push(*member.key());
                }
            }
        }

        for id in dead {
            if self.members.remove(&id).is_some() {
                report.removed += 1;
            }
        }
        report
    }
}
