/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
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

//! Data-plane layer.
//!
//! Owns receiving link endpoints: attach negotiation, per-delivery processing,
//! settlement tracking and detach handling. Deliveries are decoded, authorized,
//! routed through the link's destination and enlisted in the delivery's transaction.
//!
//! ```
//! use std::sync::Arc;
//! use broker_core::{
//!     Attach, ChannelDispositionSink, ConnectionPrincipal, ConnectionStatistics, Delivery,
//!     DestinationRegistry, InMemoryMessageStore, LinkContext, LinkSettings, Message,
//!     MessageDecoder, MessageFormatRegistry, ProtocolError, QueueDeclaration,
//!     ReceivingLinkEndpoint, SessionState, Target, TransactionCoordinator,
//!     VirtualHostSettings, AMQP_MESSAGE_FORMAT,
//! };
//!
//! struct RawDecoder;
//!
//! impl MessageDecoder for RawDecoder {
//!     fn decode(&self, payload: &bytes::Bytes) -> Result<Message, ProtocolError> {
//!         Ok(Message::builder().payload(payload.clone()).build())
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = Arc::new(DestinationRegistry::new(VirtualHostSettings::default()));
//! registry.create_queue(QueueDeclaration::new("inbox")).await.unwrap();
//! let (sink, mut dispositions) = ChannelDispositionSink::new();
//!
//! let context = LinkContext {
//!     settings: LinkSettings::default(),
//!     resolver: registry.clone(),
//!     transactions: Arc::new(TransactionCoordinator::new(Arc::new(InMemoryMessageStore::new()))),
//!     authorizer: Arc::new(ConnectionPrincipal::new("guest", false)),
//!     formats: Arc::new(
//!         MessageFormatRegistry::new().with_decoder(AMQP_MESSAGE_FORMAT, Arc::new(RawDecoder)),
//!     ),
//!     statistics: Arc::new(ConnectionStatistics::new()),
//!     session: Arc::new(SessionState::new()),
//!     dispositions: Arc::new(sink),
//! };
//!
//! let mut link = ReceivingLinkEndpoint::new("publisher", context);
//! link.attach(Attach::to_target("publisher", Target::new("inbox"))).await.unwrap();
//! link.start().unwrap();
//! link.receive_delivery(Delivery::new("tag-1", "hello")).await.unwrap();
//!
//! let disposition = dispositions.recv().await.unwrap();
//! assert!(disposition.settled);
//! assert_eq!(registry.queue("inbox").unwrap().depth(), 1);
//! # });
//! ```

pub(crate) mod delivery;
pub(crate) mod format;
pub(crate) mod link_endpoint;
pub(crate) mod receiving;
pub(crate) mod settlement;
pub(crate) mod terminus;
