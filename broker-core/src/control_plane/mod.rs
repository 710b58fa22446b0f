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

//! Control-plane layer.
//!
//! Owns destination lifecycle and binding-table semantics. Every administrative
//! operation either applies completely or fails without partial mutation, and
//! deleting a destination removes every binding that targets it.
//!
//! ```
//! use broker_core::{
//!     BindingArguments, DeleteOptions, DestinationRegistry, ExchangeDeclaration,
//!     QueueDeclaration, VirtualHostSettings,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = DestinationRegistry::new(VirtualHostSettings::default());
//! registry.create_exchange(ExchangeDeclaration::new("orders")).await.unwrap();
//! registry.create_queue(QueueDeclaration::new("audit")).await.unwrap();
//!
//! assert!(registry
//!     .bind("orders", "audit", "created", BindingArguments::new(), false)
//!     .await
//!     .unwrap());
//!
//! // Removing the queue takes its bindings with it.
//! registry.delete("audit", DeleteOptions::default()).await.unwrap();
//! assert!(!registry.exchange("orders").unwrap().is_bound("created"));
//! # });
//! ```

pub(crate) mod binding;
pub(crate) mod binding_table;
pub(crate) mod registry;
