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

//! # broker-core
//!
//! `broker-core` implements the message-acceptance core of an AMQP-style broker:
//! the direct-exchange binding and routing engine, and the receiving side of a link
//! that accepts transfers, routes them and reports their outcome.
//!
//! Typical usage is API-first and centered on [`DestinationRegistry`] for topology
//! and [`ReceivingLinkEndpoint`] (or a spawned [`LinkHandle`]) for inbound traffic.
//! Internal modules are organized by domain layer to keep behavior ownership explicit.
//!
//! ## Quick start
//!
//! ```
//! use broker_core::{
//!     BindingArguments, DestinationRegistry, ExchangeDeclaration, InstanceProperties, Message,
//!     QueueDeclaration, VirtualHostSettings,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = DestinationRegistry::new(VirtualHostSettings::default());
//! registry.create_exchange(ExchangeDeclaration::new("orders")).await.unwrap();
//! registry.create_queue(QueueDeclaration::new("billing")).await.unwrap();
//! registry
//!     .bind("orders", "billing", "created", BindingArguments::new(), false)
//!     .await
//!     .unwrap();
//!
//! let exchange = registry.exchange("orders").unwrap();
//! let routed = exchange.route(&Message::builder().build(), "created", &InstanceProperties::new());
//! assert!(routed.routes_to("billing"));
//! assert!(!exchange
//!     .route(&Message::builder().build(), "cancelled", &InstanceProperties::new())
//!     .has_routes());
//! # });
//! ```
//!
//! ## Topology contract
//!
//! Names under the reserved prefix (`amq.` by default) cannot be declared, system
//! exchanges cannot be deleted, and a destination still named as another's alternate
//! cannot be deleted without forcing.
//!
//! ```
//! use broker_core::{
//!     DeleteOptions, DestinationRegistry, ExchangeDeclaration, QueueDeclaration, TopologyError,
//!     VirtualHostSettings,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = DestinationRegistry::new(VirtualHostSettings::default());
//!
//! assert!(matches!(
//!     registry.create_exchange(ExchangeDeclaration::new("amq.custom")).await,
//!     Err(TopologyError::Configuration(_))
//! ));
//! assert!(matches!(
//!     registry.delete("amq.direct", DeleteOptions::default()).await,
//!     Err(TopologyError::Resource(_))
//! ));
//!
//! registry.create_queue(QueueDeclaration::new("dead-letters")).await.unwrap();
//! registry
//!     .create_exchange(ExchangeDeclaration::new("events").alternate("dead-letters"))
//!     .await
//!     .unwrap();
//! assert!(registry.delete("dead-letters", DeleteOptions::default()).await.is_err());
//! # });
//! ```
//!
//! ## Internal architecture map
//!
//! - API: collaborator contracts (store, security, session, statistics, address resolution)
//! - Control plane: destination lifecycle, bindings and copy-on-write binding tables
//! - Routing: selector evaluation and the exchange-graph route walk
//! - Transaction: auto-commit and local transactions with deferred settlement
//! - Data plane: receiving link endpoints, delivery states and settlement tracking
//! - Runtime: per-link worker threads and their command queues
//!
//! ## Observability model
//!
//! The workspace uses `tracing` for logs/events.
//! Library code emits events/spans and does not unconditionally initialize a global
//! subscriber. Binaries and tests are responsible for one-time
//! `tracing_subscriber` initialization at process boundaries.

mod api;
pub mod config;
mod control_plane;
mod data_plane;
mod destination;
mod error;
mod message;
mod observability;
mod routing;
mod runtime;
mod sync;
mod transaction;

pub use api::resolver::{AddressResolver, ResolvedAddress};
pub use api::security::{AccessDenied, ConnectionPrincipal, MessageAuthorizer};
pub use api::session::{SessionLifecycle, SessionState};
pub use api::statistics::ConnectionStatistics;
pub use api::store::{InMemoryMessageStore, MessageStore, StoredMessage};
pub use config::{LinkSettings, VirtualHostSettings};
pub use control_plane::binding::{
    Binding, BindingArguments, JMS_SELECTOR_ARGUMENT, REPLACEMENT_ROUTING_KEY_ARGUMENT,
};
pub use control_plane::registry::{
    DeleteOptions, DestinationEvent, DestinationRegistry, ExchangeDeclaration, QueueDeclaration,
    DEFAULT_DIRECT_EXCHANGE, DEFAULT_FANOUT_EXCHANGE,
};
pub use data_plane::delivery::{
    Delivery, DeliveryState, DeliveryTag, Disposition, Outcome, OutcomeKind, ReceiverSettleMode,
    AMQP_MESSAGE_FORMAT,
};
pub use data_plane::format::{MessageDecoder, MessageFormatRegistry};
pub use data_plane::link_endpoint::{DetachOutcome, LinkContext, LinkState, ReceivingLinkEndpoint};
pub use data_plane::receiving::{
    AnonymousRelayDestination, NodeReceivingDestination, ReceivingDestination,
};
pub use data_plane::settlement::{ChannelDispositionSink, DispositionSink, SettlementTracker};
pub use data_plane::terminus::{
    Attach, AttachTarget, Detach, Source, Target, TerminusDurability, TerminusExpiryPolicy,
    DELAYED_DELIVERY_CAPABILITY, DISCARD_UNROUTABLE_CAPABILITY, LIFETIME_POLICY_PROPERTY,
    TEMPORARY_TOPIC_CAPABILITY, TOPIC_CAPABILITY,
};
pub use destination::{
    Destination, DestinationId, DestinationKind, Exchange, ExchangeType, PublishingLink, Queue,
    QueueEntry,
};
pub use error::{
    ErrorCondition, LinkError, ProtocolError, StoreError, TopologyError, TransactionError,
};
pub use message::{HeaderValue, InstanceProperties, Message, MessageBuilder, MessageReference};
pub use routing::result::RoutingResult;
pub use routing::selector::{Selector, SelectorError};
pub use runtime::link_worker::{spawn_link_worker, LinkHandle};
pub use transaction::{LocalTransaction, Transaction, TransactionCoordinator, TransactionId};
