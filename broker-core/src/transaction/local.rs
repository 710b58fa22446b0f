//! Buffered state of one local transaction.

use crate::data_plane::settlement::SettlementAction;
use crate::destination::{Queue, QueueEntry};
use crate::error::StoreError;
use crate::message::{InstanceProperties, Message};
use crate::observability::events;
use crate::sync::lock;
use crate::transaction::TransactionId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

const COMPONENT: &str = "local_transaction";

pub(crate) struct PendingEnqueue {
    pub(crate) queue: Arc<Queue>,
    pub(crate) entry: QueueEntry,
}

impl PendingEnqueue {
    pub(crate) fn needs_store(&self) -> bool {
        self.entry.message().is_persistent() && self.queue.is_durable()
    }
}

#[derive(Default)]
struct LocalState {
    pending: Vec<PendingEnqueue>,
    actions: Vec<SettlementAction>,
    resolved: bool,
}

pub struct LocalTransaction {
    id: TransactionId,
    rollback_only: AtomicBool,
    state: Mutex<LocalState>,
}

impl LocalTransaction {
    pub(crate) fn new(id: TransactionId) -> Self {
        Self {
            id,
            rollback_only: AtomicBool::new(false),
            state: Mutex::new(LocalState::default()),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Dooms the transaction: a later commit rolls back instead.
    pub fn set_rollback_only(&self) {
        if !self.rollback_only.swap(true, Ordering::AcqRel) {
            debug!(
                event = events::TXN_ROLLBACK_ONLY,
                component = COMPONENT,
                txn_id = %self.id,
                "transaction marked rollback-only"
            );
        }
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Acquire)
    }

    pub fn pending_enqueues(&self) -> usize {
        lock(&self.state).pending.len()
    }

    pub(crate) fn buffer_enqueue(
        &self,
        queue: &Arc<Queue>,
        message: &Message,
        instance_properties: &InstanceProperties,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.resolved {
            return Err(StoreError(format!(
                "transaction {} has already been resolved",
                self.id
            )));
        }
        state.pending.push(PendingEnqueue {
            queue: queue.clone(),
            entry: QueueEntry::new(message.new_reference(), instance_properties.clone()),
        });
        Ok(())
    }

    /// Registers an action to run when the transaction resolves.
    /// If it already resolved, the action runs immediately.
    pub(crate) fn add_settlement_action(&self, action: SettlementAction) {
        let mut state = lock(&self.state);
        if state.resolved {
            drop(state);
            action.fire();
            return;
        }
        state.actions.push(action);
    }

    /// Marks the transaction resolved and hands its buffers to the resolver.
    /// Returns `None` if another caller resolved it first.
    pub(crate) fn take_for_resolution(
        &self,
    ) -> Option<(Vec<PendingEnqueue>, Vec<SettlementAction>)> {
        let mut state = lock(&self.state);
        if state.resolved {
            return None;
        }
        state.resolved = true;
        Some((
            std::mem::take(&mut state.pending),
            std::mem::take(&mut state.actions),
        ))
    }
}
