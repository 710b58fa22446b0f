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

//! Transaction layer.
//!
//! Auto-commit transactions apply enqueues immediately. Local transactions
//! buffer enqueues and settlement actions until the coordinator commits or
//! rolls them back; each buffered action fires exactly once either way.

pub(crate) mod coordinator;
pub(crate) mod local;

use crate::api::store::MessageStore;
use crate::destination::{Queue, QueueEntry};
use crate::error::StoreError;
use crate::message::{InstanceProperties, Message};
use futures::future::try_join_all;
use std::fmt;
use std::sync::Arc;

pub use coordinator::TransactionCoordinator;
pub use local::LocalTransaction;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone)]
pub enum Transaction {
    AutoCommit(Arc<dyn MessageStore>),
    Local(Arc<LocalTransaction>),
}

impl Transaction {
    pub fn id(&self) -> Option<TransactionId> {
        match self {
            Transaction::AutoCommit(_) => None,
            Transaction::Local(transaction) => Some(transaction.id()),
        }
    }

    pub fn is_transactional(&self) -> bool {
        matches!(self, Transaction::Local(_))
    }

    pub(crate) fn set_rollback_only(&self) {
        if let Transaction::Local(transaction) = self {
            transaction.set_rollback_only();
        }
    }

    /// Enqueues `message` on `queue`. Persistent messages on durable queues go
    /// through the store first.
    pub(crate) async fn enqueue(
        &self,
        queue: &Arc<Queue>,
        message: &Message,
        instance_properties: &InstanceProperties,
    ) -> Result<(), StoreError> {
        self.enqueue_all(std::slice::from_ref(queue), message, instance_properties)
            .await
    }

    /// Enqueues `message` on every queue in `queues`.
    ///
    /// Under auto-commit every store write completes before any queue receives
    /// the message, so a store failure leaves all queues untouched.
    pub(crate) async fn enqueue_all(
        &self,
        queues: &[Arc<Queue>],
        message: &Message,
        instance_properties: &InstanceProperties,
    ) -> Result<(), StoreError> {
        match self {
            Transaction::AutoCommit(store) => {
                if message.is_persistent() {
                    try_join_all(
                        queues
                            .iter()
                            .filter(|queue| queue.is_durable())
                            .map(|queue| store.enqueue(queue.name(), message)),
                    )
                    .await?;
                }
                for queue in queues {
                    queue.enqueue(QueueEntry::new(
                        message.new_reference(),
                        instance_properties.clone(),
                    ));
                }
                Ok(())
            }
            Transaction::Local(transaction) => {
                for queue in queues {
                    transaction.buffer_enqueue(queue, message, instance_properties)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transaction::AutoCommit(_) => f.write_str("AutoCommit"),
            Transaction::Local(transaction) => write!(f, "Local({})", transaction.id()),
        }
    }
}
