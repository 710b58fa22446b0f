//! Message store contract consulted for persistent messages on durable queues.

use crate::error::StoreError;
use crate::message::Message;
use crate::sync::lock;
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Whether enqueued records survive a restart.
    fn is_persistent(&self) -> bool;

    /// Records `message` as enqueued on the durable queue `queue`.
    async fn enqueue(&self, queue: &str, message: &Message) -> Result<(), StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredMessage {
    pub queue: String,
    pub message_id: Uuid,
}

/// A store that keeps its records in memory. Reports itself as persistent only when asked to.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    persistent: bool,
    records: Mutex<Vec<StoredMessage>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persistence(persistent: bool) -> Self {
        Self {
            persistent,
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<StoredMessage> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    fn is_persistent(&self) -> bool {
        self.persistent
    }

    async fn enqueue(&self, queue: &str, message: &Message) -> Result<(), StoreError> {
        lock(&self.records).push(StoredMessage {
            queue: queue.to_string(),
            message_id: message.id(),
        });
        Ok(())
    }
}
