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

//! Error types shared by the administrative surface and the link layer.

use crate::data_plane::link_endpoint::LinkState;
use crate::transaction::TransactionId;
use std::fmt;
use thiserror::Error;

/// Protocol-level error conditions carried back to the remote peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCondition {
    NotImplemented,
    NotAllowed,
    PreconditionFailed,
    NotFound,
    UnknownTransaction,
    IllegalState,
    InternalError,
}

impl ErrorCondition {
    pub fn symbol(&self) -> &'static str {
        match self {
            ErrorCondition::NotImplemented => "amqp:not-implemented",
            ErrorCondition::NotAllowed => "amqp:unauthorized-access",
            ErrorCondition::PreconditionFailed => "amqp:precondition-failed",
            ErrorCondition::NotFound => "amqp:not-found",
            ErrorCondition::UnknownTransaction => "amqp:transaction:unknown-id",
            ErrorCondition::IllegalState => "amqp:illegal-state",
            ErrorCondition::InternalError => "amqp:internal-error",
        }
    }
}

impl fmt::Display for ErrorCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// An error scoped to a single delivery or attach exchange.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{condition}: {description}")]
pub struct ProtocolError {
    pub condition: ErrorCondition,
    pub description: String,
}

impl ProtocolError {
    pub fn new(condition: ErrorCondition, description: impl Into<String>) -> Self {
        Self {
            condition,
            description: description.into(),
        }
    }
}

/// Failures of administrative topology operations. None of them leave a partial mutation behind.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("resource error: {0}")]
    Resource(String),
}

impl TopologyError {
    pub(crate) fn configuration(description: impl Into<String>) -> Self {
        TopologyError::Configuration(description.into())
    }

    pub(crate) fn resource(description: impl Into<String>) -> Self {
        TopologyError::Resource(description.into())
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    /// Fails one delivery; the link stays attached.
    #[error(transparent)]
    Delivery(#[from] ProtocolError),
    #[error("link '{link}' is not attached (state: {state})")]
    NotAttached { link: String, state: LinkState },
    #[error("illegal link state: {0}")]
    IllegalState(String),
    #[error("link failed: {0}")]
    Fatal(ProtocolError),
    #[error("worker for link '{0}' has stopped")]
    WorkerStopped(String),
}

impl LinkError {
    /// Returns `true` when the link has been (or must be) torn down because of this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::IllegalState(_) | LinkError::Fatal(_) | LinkError::WorkerStopped(_)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("store error: {0}")]
pub struct StoreError(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("transaction {0} not found")]
    NotFound(TransactionId),
    #[error("transaction {0} was marked rollback-only and has been rolled back")]
    RolledBack(TransactionId),
    #[error("transaction {id} rolled back after a store failure: {source}")]
    Store {
        id: TransactionId,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_displays_condition_symbol() {
        let err = ProtocolError::new(
            ErrorCondition::UnknownTransaction,
            "transaction-id '7' is unknown.",
        );
        assert_eq!(
            err.to_string(),
            "amqp:transaction:unknown-id: transaction-id '7' is unknown."
        );
    }

    #[test]
    fn only_state_and_fatal_link_errors_are_fatal() {
        let per_delivery =
            LinkError::from(ProtocolError::new(ErrorCondition::NotAllowed, "denied"));
        assert!(!per_delivery.is_fatal());
        assert!(LinkError::IllegalState("termini already set".to_string()).is_fatal());
        assert!(
            LinkError::Fatal(ProtocolError::new(ErrorCondition::NotFound, "gone")).is_fatal()
        );
    }
}
