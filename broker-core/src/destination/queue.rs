//! Queues: terminal destinations holding enqueued message references.

use crate::destination::publishing::PublishingLinks;
use crate::destination::{Alternate, DestinationId};
use crate::message::{InstanceProperties, Message, MessageReference};
use crate::sync::lock;
use arc_swap::ArcSwapOption;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// One enqueued message. Holding the entry keeps the message reference alive.
#[derive(Debug)]
pub struct QueueEntry {
    message: MessageReference,
    instance_properties: InstanceProperties,
}

impl QueueEntry {
    pub(crate) fn new(message: MessageReference, instance_properties: InstanceProperties) -> Self {
        Self {
            message,
            instance_properties,
        }
    }

    pub fn message(&self) -> &Message {
        self.message.message()
    }

    pub fn instance_properties(&self) -> &InstanceProperties {
        &self.instance_properties
    }
}

#[derive(Debug)]
pub struct Queue {
    id: DestinationId,
    name: String,
    durable: bool,
    capacity: Option<usize>,
    alternate: ArcSwapOption<Alternate>,
    entries: Mutex<VecDeque<QueueEntry>>,
    deleted: AtomicBool,
    publishing_links: PublishingLinks,
}

impl Queue {
    pub(crate) fn new(name: impl Into<String>, durable: bool, capacity: Option<usize>) -> Self {
        Self {
            id: DestinationId::random(),
            name: name.into(),
            durable,
            capacity,
            alternate: ArcSwapOption::empty(),
            entries: Mutex::new(VecDeque::new()),
            deleted: AtomicBool::new(false),
            publishing_links: PublishingLinks::default(),
        }
    }

    pub fn id(&self) -> DestinationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn depth(&self) -> usize {
        lock(&self.entries).len()
    }

    /// A queue accepts messages while it is live and below its capacity.
    pub fn accepts(&self, _message: &Message) -> bool {
        if self.is_deleted() {
            return false;
        }
        self.capacity
            .map_or(true, |capacity| self.depth() < capacity)
    }

    /// Removes the oldest entry, releasing nothing until the caller drops it.
    pub fn pop(&self) -> Option<QueueEntry> {
        lock(&self.entries).pop_front()
    }

    /// Appends an entry. A deleted queue drops the entry, releasing its reference.
    pub(crate) fn enqueue(&self, entry: QueueEntry) -> bool {
        if self.is_deleted() {
            return false;
        }
        lock(&self.entries).push_back(entry);
        true
    }

    pub(crate) fn mark_deleted(&self) -> bool {
        let first = !self.deleted.swap(true, Ordering::AcqRel);
        if first {
            lock(&self.entries).clear();
        }
        first
    }

    pub(crate) fn alternate_slot(&self) -> &ArcSwapOption<Alternate> {
        &self.alternate
    }

    pub(crate) fn publishing_links(&self) -> &PublishingLinks {
        &self.publishing_links
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_stops_accepting_at_capacity() {
        let queue = Queue::new("bounded", false, Some(1));
        let message = Message::builder().build();

        assert!(queue.accepts(&message));
        assert!(queue.enqueue(QueueEntry::new(
            message.new_reference(),
            InstanceProperties::default()
        )));
        assert!(!queue.accepts(&message));
    }

    #[test]
    fn deleting_queue_releases_held_references() {
        let queue = Queue::new("doomed", false, None);
        let message = Message::builder().build();
        queue.enqueue(QueueEntry::new(
            message.new_reference(),
            InstanceProperties::default(),
        ));
        assert_eq!(message.reference_count(), 1);

        assert!(queue.mark_deleted());
        assert_eq!(message.reference_count(), 0);
        assert!(!queue.accepts(&message));
        assert!(!queue.enqueue(QueueEntry::new(
            message.new_reference(),
            InstanceProperties::default()
        )));
        assert_eq!(message.reference_count(), 0);
    }
}
