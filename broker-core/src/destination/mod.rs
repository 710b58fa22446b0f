/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

//! Message destinations: queues and exchanges.
//!
//! Destinations are owned by the registry and shared as `Arc`s. Bindings and
//! alternates hold [`WeakDestination`]s so that exchange graphs never form
//! reference cycles.

pub(crate) mod exchange;
pub(crate) mod publishing;
pub(crate) mod queue;

use crate::message::Message;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

pub use exchange::{Exchange, ExchangeType};
pub use publishing::PublishingLink;
pub use queue::{Queue, QueueEntry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationId(Uuid);

impl DestinationId {
    pub(crate) fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DestinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationKind {
    Queue,
    Exchange,
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationKind::Queue => f.write_str("queue"),
            DestinationKind::Exchange => f.write_str("exchange"),
        }
    }
}

/// A named, addressable sink for messages.
#[derive(Clone, Debug)]
pub enum Destination {
    Queue(Arc<Queue>),
    Exchange(Arc<Exchange>),
}

impl Destination {
    pub fn id(&self) -> DestinationId {
        match self {
            Destination::Queue(queue) => queue.id(),
            Destination::Exchange(exchange) => exchange.id(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Destination::Queue(queue) => queue.name(),
            Destination::Exchange(exchange) => exchange.name(),
        }
    }

    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Queue(_) => DestinationKind::Queue,
            Destination::Exchange(_) => DestinationKind::Exchange,
        }
    }

    pub fn is_durable(&self) -> bool {
        match self {
            Destination::Queue(queue) => queue.is_durable(),
            Destination::Exchange(exchange) => exchange.is_durable(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            Destination::Queue(queue) => queue.is_deleted(),
            Destination::Exchange(exchange) => exchange.is_deleted(),
        }
    }

    pub fn alternate_name(&self) -> Option<String> {
        self.alternate_slot()
            .load()
            .as_ref()
            .map(|alternate| alternate.name.clone())
    }

    pub fn as_exchange(&self) -> Option<&Arc<Exchange>> {
        match self {
            Destination::Exchange(exchange) => Some(exchange),
            Destination::Queue(_) => None,
        }
    }

    pub fn as_queue(&self) -> Option<&Arc<Queue>> {
        match self {
            Destination::Queue(queue) => Some(queue),
            Destination::Exchange(_) => None,
        }
    }

    /// Registers a publishing link. Returns `false` if a link with that name was
    /// already registered.
    pub fn link_added(&self, link: PublishingLink) -> bool {
        match self {
            Destination::Queue(queue) => queue.publishing_links().add(link),
            Destination::Exchange(exchange) => exchange.publishing_links().add(link),
        }
    }

    /// Unregisters a publishing link. Returns `false` if it was not registered.
    pub fn link_removed(&self, link_name: &str) -> bool {
        match self {
            Destination::Queue(queue) => queue.publishing_links().remove(link_name),
            Destination::Exchange(exchange) => exchange.publishing_links().remove(link_name),
        }
    }

    pub fn publishing_links(&self) -> Vec<PublishingLink> {
        match self {
            Destination::Queue(queue) => queue.publishing_links().snapshot(),
            Destination::Exchange(exchange) => exchange.publishing_links().snapshot(),
        }
    }

    pub(crate) fn downgrade(&self) -> WeakDestination {
        match self {
            Destination::Queue(queue) => WeakDestination::Queue(Arc::downgrade(queue)),
            Destination::Exchange(exchange) => WeakDestination::Exchange(Arc::downgrade(exchange)),
        }
    }

    /// Marks the destination deleted. Returns `true` only for the caller that flipped the flag.
    pub(crate) fn mark_deleted(&self) -> bool {
        match self {
            Destination::Queue(queue) => queue.mark_deleted(),
            Destination::Exchange(exchange) => exchange.mark_deleted(),
        }
    }

    pub(crate) fn accepts(&self, message: &Message) -> bool {
        match self {
            Destination::Queue(queue) => queue.accepts(message),
            Destination::Exchange(exchange) => !exchange.is_deleted(),
        }
    }

    pub(crate) fn alternate_slot(&self) -> &ArcSwapOption<Alternate> {
        match self {
            Destination::Queue(queue) => queue.alternate_slot(),
            Destination::Exchange(exchange) => exchange.alternate_slot(),
        }
    }

    pub(crate) fn alternate(&self) -> Option<Destination> {
        self.alternate_slot()
            .load()
            .as_ref()
            .and_then(|alternate| alternate.target.upgrade())
    }
}

impl PartialEq for Destination {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Destination {}

impl From<Arc<Queue>> for Destination {
    fn from(queue: Arc<Queue>) -> Self {
        Destination::Queue(queue)
    }
}

impl From<Arc<Exchange>> for Destination {
    fn from(exchange: Arc<Exchange>) -> Self {
        Destination::Exchange(exchange)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum WeakDestination {
    Queue(Weak<Queue>),
    Exchange(Weak<Exchange>),
}

impl WeakDestination {
    pub(crate) fn upgrade(&self) -> Option<Destination> {
        match self {
            WeakDestination::Queue(queue) => queue.upgrade().map(Destination::Queue),
            WeakDestination::Exchange(exchange) => exchange.upgrade().map(Destination::Exchange),
        }
    }
}

/// Fallback destination used when routing produces no route, or when a queue rejects.
#[derive(Debug)]
pub(crate) struct Alternate {
    pub(crate) name: String,
    pub(crate) target: WeakDestination,
}

impl Alternate {
    pub(crate) fn new(target: &Destination) -> Self {
        Self {
            name: target.name().to_string(),
            target: target.downgrade(),
        }
    }
}
