//! Session and connection state consulted when a link detaches.

use std::sync::atomic::{AtomicBool, Ordering};

pub trait SessionLifecycle: Send + Sync {
    fn is_closing(&self) -> bool;
    fn connection_is_closing(&self) -> bool;
}

#[derive(Debug, Default)]
pub struct SessionState {
    closing: AtomicBool,
    connection_closing: AtomicBool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn begin_connection_close(&self) {
        self.connection_closing.store(true, Ordering::Release);
    }
}

impl SessionLifecycle for SessionState {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    fn connection_is_closing(&self) -> bool {
        self.connection_closing.load(Ordering::Acquire)
    }
}
