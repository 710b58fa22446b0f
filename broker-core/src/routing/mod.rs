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

//! Routing layer.
//!
//! Resolves a publish against the exchange graph: exact-key binding match,
//! selector filtering, replacement keys for exchange-to-exchange hops,
//! alternate fallback, cycle protection and per-publish deduplication.
//!
//! ```
//! use broker_core::{
//!     BindingArguments, DestinationRegistry, ExchangeDeclaration, InstanceProperties, Message,
//!     QueueDeclaration, VirtualHostSettings,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = DestinationRegistry::new(VirtualHostSettings::default());
//! registry.create_exchange(ExchangeDeclaration::new("events")).await.unwrap();
//! registry.create_queue(QueueDeclaration::new("urgent")).await.unwrap();
//! let filter = BindingArguments::new().with("x-filter-jms-selector", "priority > 5");
//! registry.bind("events", "urgent", "alert", filter, false).await.unwrap();
//!
//! let exchange = registry.exchange("events").unwrap();
//! let high = Message::builder().header("priority", 9).build();
//! let low = Message::builder().header("priority", 1).build();
//!
//! assert!(exchange.route(&high, "alert", &InstanceProperties::default()).has_routes());
//! assert!(!exchange.route(&low, "alert", &InstanceProperties::default()).has_routes());
//! # });
//! ```

pub(crate) mod engine;
pub(crate) mod result;
pub(crate) mod selector;
