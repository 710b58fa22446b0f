//! Begins, looks up and resolves local transactions.

use crate::api::store::MessageStore;
use crate::data_plane::settlement::SettlementAction;
use crate::error::TransactionError;
use crate::observability::events;
use crate::sync::lock;
use crate::transaction::local::LocalTransaction;
use crate::transaction::{Transaction, TransactionId};
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

const COMPONENT: &str = "transaction_coordinator";

pub struct TransactionCoordinator {
    store: Arc<dyn MessageStore>,
    next_id: AtomicU64,
    active: Mutex<HashMap<TransactionId, Arc<LocalTransaction>>>,
}

impl TransactionCoordinator {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self {
            store,
            next_id: AtomicU64::new(1),
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn auto_commit(&self) -> Transaction {
        Transaction::AutoCommit(self.store.clone())
    }

    pub fn begin(&self) -> TransactionId {
        let id = TransactionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.active).insert(id, Arc::new(LocalTransaction::new(id)));
        debug!(
            event = events::TXN_BEGIN,
            component = COMPONENT,
            txn_id = %id,
            "transaction started"
        );
        id
    }

    pub fn transaction(&self, id: TransactionId) -> Result<Transaction, TransactionError> {
        lock(&self.active)
            .get(&id)
            .cloned()
            .map(Transaction::Local)
            .ok_or(TransactionError::NotFound(id))
    }

    pub fn active_transactions(&self) -> usize {
        lock(&self.active).len()
    }

    /// Applies buffered enqueues and fires settlement actions.
    ///
    /// A rollback-only transaction is rolled back instead and reported as
    /// [`TransactionError::RolledBack`]. A store failure rolls back as well.
    pub async fn commit(&self, id: TransactionId) -> Result<(), TransactionError> {
        let transaction = self.remove(id)?;
        let Some((pending, actions)) = transaction.take_for_resolution() else {
            return Err(TransactionError::NotFound(id));
        };

        if transaction.is_rollback_only() {
            drop(pending);
            fire(actions);
            warn!(
                event = events::TXN_ROLLBACK,
                component = COMPONENT,
                txn_id = %id,
                reason = "rollback_only",
                "commit refused, transaction rolled back"
            );
            return Err(TransactionError::RolledBack(id));
        }

        let persisted = try_join_all(
            pending
                .iter()
                .filter(|enqueue| enqueue.needs_store())
                .map(|enqueue| self.store.enqueue(enqueue.queue.name(), enqueue.entry.message())),
        )
        .await;
        if let Err(source) = persisted {
            drop(pending);
            fire(actions);
            warn!(
                event = events::TXN_ROLLBACK,
                component = COMPONENT,
                txn_id = %id,
                err = %source,
                "store failed during commit, transaction rolled back"
            );
            return Err(TransactionError::Store { id, source });
        }

        let enqueued = pending.len();
        for enqueue in pending {
            enqueue.queue.enqueue(enqueue.entry);
        }
        fire(actions);
        info!(
            event = events::TXN_COMMIT,
            component = COMPONENT,
            txn_id = %id,
            enqueued,
            "transaction committed"
        );
        Ok(())
    }

    /// Discards buffered enqueues and fires settlement actions.
    pub async fn rollback(&self, id: TransactionId) -> Result<(), TransactionError> {
        let transaction = self.remove(id)?;
        let Some((pending, actions)) = transaction.take_for_resolution() else {
            return Err(TransactionError::NotFound(id));
        };
        let discarded = pending.len();
        drop(pending);
        fire(actions);
        info!(
            event = events::TXN_ROLLBACK,
            component = COMPONENT,
            txn_id = %id,
            discarded,
            "transaction rolled back"
        );
        Ok(())
    }

    fn remove(&self, id: TransactionId) -> Result<Arc<LocalTransaction>, TransactionError> {
        lock(&self.active)
            .remove(&id)
            .ok_or(TransactionError::NotFound(id))
    }
}

fn fire(actions: Vec<SettlementAction>) {
    for action in actions {
        action.fire();
    }
}
