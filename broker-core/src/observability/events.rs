//! Stable event names for structured log records.

pub(crate) const EXCHANGE_CREATED: &str = "exchange_created";
pub(crate) const QUEUE_CREATED: &str = "queue_created";
pub(crate) const DESTINATION_CREATE_REJECTED: &str = "destination_create_rejected";
pub(crate) const DESTINATION_DELETED: &str = "destination_deleted";
pub(crate) const DESTINATION_DELETE_REFUSED: &str = "destination_delete_refused";
pub(crate) const ALTERNATE_UPDATED: &str = "alternate_updated";

pub(crate) const BINDING_ADDED: &str = "binding_added";
pub(crate) const BINDING_REPLACED: &str = "binding_replaced";
pub(crate) const BINDING_UNCHANGED: &str = "binding_unchanged";
pub(crate) const BINDING_REMOVED: &str = "binding_removed";
pub(crate) const BINDING_REJECTED: &str = "binding_rejected";
pub(crate) const BINDINGS_SWEPT: &str = "bindings_swept";

pub(crate) const ROUTE_EVALUATED: &str = "route_evaluated";
pub(crate) const ROUTE_SELECTOR_REJECTED: &str = "route_selector_rejected";
pub(crate) const ROUTE_HOP_LIMIT_REACHED: &str = "route_hop_limit_reached";
pub(crate) const ROUTE_ALTERNATE_USED: &str = "route_alternate_used";
pub(crate) const ROUTE_QUEUE_REFUSED: &str = "route_queue_refused";

pub(crate) const LINK_ATTACHED: &str = "link_attached";
pub(crate) const LINK_ATTACH_FAILED: &str = "link_attach_failed";
pub(crate) const LINK_DESTINATION_CHANGED: &str = "link_destination_changed";
pub(crate) const LINK_CLOSED: &str = "link_closed";
pub(crate) const LINK_DESTROYED: &str = "link_destroyed";
pub(crate) const LINK_SUSPENDED: &str = "link_suspended";
pub(crate) const LINK_CREDIT_GRANTED: &str = "link_credit_granted";
pub(crate) const UNSETTLED_RECONCILED: &str = "unsettled_reconciled";
pub(crate) const DYNAMIC_NODE_DELETED: &str = "dynamic_node_deleted";

pub(crate) const DELIVERY_ACCEPTED: &str = "delivery_accepted";
pub(crate) const DELIVERY_FAILED: &str = "delivery_failed";
pub(crate) const DELIVERY_RESUMED: &str = "delivery_resumed";
pub(crate) const DELIVERY_REFUSED: &str = "delivery_refused";
pub(crate) const DISPOSITION_SENT: &str = "disposition_sent";
pub(crate) const REMOTE_SETTLED: &str = "remote_settled";

pub(crate) const TXN_BEGIN: &str = "txn_begin";
pub(crate) const TXN_COMMIT: &str = "txn_commit";
pub(crate) const TXN_ROLLBACK: &str = "txn_rollback";
pub(crate) const TXN_ROLLBACK_ONLY: &str = "txn_rollback_only";

pub(crate) const WORKER_STARTED: &str = "worker_started";
pub(crate) const WORKER_STOPPED: &str = "worker_stopped";
