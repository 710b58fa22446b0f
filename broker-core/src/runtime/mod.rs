//! Runtime integration layer.
//!
//! Isolates link worker threads and their command queues so async/threading
//! behavior remains localized and predictable for the rest of the crate.
//! A [`LinkHandle`](crate::LinkHandle) is the only way callers reach a spawned link.

pub(crate) mod link_worker;
pub(crate) mod worker_runtime;
