//! Per-connection inbound counters.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ConnectionStatistics {
    messages_in: AtomicU64,
    bytes_in: AtomicU64,
    transacted_messages_in: AtomicU64,
}

impl ConnectionStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_message_received(&self, size: u64) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
        self.bytes_in.fetch_add(size, Ordering::Relaxed);
    }

    pub fn register_transacted_message_received(&self) {
        self.transacted_messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_in(&self) -> u64 {
        self.messages_in.load(Ordering::Relaxed)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn transacted_messages_in(&self) -> u64 {
        self.transacted_messages_in.load(Ordering::Relaxed)
    }
}
