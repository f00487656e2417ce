//! Bounded in-process queue of wrapped inbound messages, deduplicated by
//! message id so one channel message maps to at most one agent invocation.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::SessionId;

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// A message after routing: wrapped content, session binding, canary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub message_id: String,
    pub session_id: SessionId,
    /// Content with the external-content wrapper applied.
    pub content: String,
    pub canary: String,
    pub sender: String,
    pub queued_at: DateTime<Utc>,
}

/// Why a push did not enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// The message id was seen before; at most one invocation per id.
    Duplicate,
}

/// FIFO queue with id dedup and a hard capacity.
pub struct MessageQueue {
    capacity: usize,
    inner: Mutex<QueueState>,
}

struct QueueState {
    items: VecDeque<QueuedMessage>,
    seen: HashSet<String>,
}

impl MessageQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(QueueState {
                items: VecDeque::new(),
                seen: HashSet::new(),
            }),
        }
    }

    /// Enqueue a routed message.
    ///
    /// Returns [`PushOutcome::Duplicate`] without queueing when the id was
    /// seen before; errors when the queue is at capacity.
    pub fn push(&self, message: QueuedMessage) -> Result<PushOutcome> {
        let mut state = self.inner.lock().expect("queue lock poisoned");
        if state.seen.contains(&message.message_id) {
            return Ok(PushOutcome::Duplicate);
        }
        if state.items.len() >= self.capacity {
            return Err(CoreError::QueueFull);
        }
        state.seen.insert(message.message_id.clone());
        state.items.push_back(message);
        Ok(PushOutcome::Queued)
    }

    /// Pop the oldest message.
    pub fn pop(&self) -> Option<QueuedMessage> {
        self.inner.lock().expect("queue lock poisoned").items.pop_front()
    }

    /// Pop the oldest message for one session, leaving others queued.
    pub fn pop_for_session(&self, session_id: &SessionId) -> Option<QueuedMessage> {
        let mut state = self.inner.lock().expect("queue lock poisoned");
        let idx = state
            .items
            .iter()
            .position(|m| &m.session_id == session_id)?;
        state.items.remove(idx)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue lock poisoned").items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
