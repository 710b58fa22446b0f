//! Outcome of routing one message: the deduplicated set of target queues.

use crate::destination::{DestinationId, Queue};
use crate::error::StoreError;
use crate::message::{InstanceProperties, Message};
use crate::transaction::Transaction;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug)]
pub struct RoutingResult {
    message: Message,
    instance_properties: InstanceProperties,
    queues: Vec<Arc<Queue>>,
    seen: HashSet<DestinationId>,
}

impl RoutingResult {
    pub(crate) fn new(message: &Message, instance_properties: &InstanceProperties) -> Self {
        Self {
            message: message.clone(),
            instance_properties: instance_properties.clone(),
            queues: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Single-queue result used when a link publishes straight to a queue.
    pub(crate) fn for_queue(
        queue: &Arc<Queue>,
        message: &Message,
        instance_properties: &InstanceProperties,
    ) -> Self {
        let mut result = Self::new(message, instance_properties);
        if queue.accepts(message) {
            result.add_queue(queue);
        }
        result
    }

    /// Adds `queue` unless it is already part of the result.
    pub(crate) fn add_queue(&mut self, queue: &Arc<Queue>) -> bool {
        if !self.seen.insert(queue.id()) {
            return false;
        }
        self.queues.push(queue.clone());
        true
    }

    pub fn has_routes(&self) -> bool {
        !self.queues.is_empty()
    }

    pub fn number_of_routes(&self) -> usize {
        self.queues.len()
    }

    pub fn queues(&self) -> &[Arc<Queue>] {
        &self.queues
    }

    pub fn routes_to(&self, queue_name: &str) -> bool {
        self.queues.iter().any(|queue| queue.name() == queue_name)
    }

    /// Enqueues the message on every routed queue under `transaction`.
    /// Returns the number of enqueues performed or buffered. On a store
    /// failure no queue receives the message.
    pub async fn send(&self, transaction: &Transaction) -> Result<usize, StoreError> {
        transaction
            .enqueue_all(&self.queues, &self.message, &self.instance_properties)
            .await?;
        Ok(self.queues.len())
    }
}
