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

//! Collaborator contracts.
//!
//! The core consumes these seams instead of owning storage, security,
//! session bookkeeping or address naming. Each trait ships with a small
//! in-process implementation suitable for embedding and tests.
//!
//! ```
//! use broker_core::{ConnectionPrincipal, MessageAuthorizer};
//!
//! let principal = ConnectionPrincipal::new("alice", true);
//! assert!(principal.check_authorized_message_principal(Some("alice")).is_ok());
//! assert!(principal.check_authorized_message_principal(Some("mallory")).is_err());
//! ```

pub mod resolver;
pub mod security;
pub mod session;
pub mod statistics;
pub mod store;
