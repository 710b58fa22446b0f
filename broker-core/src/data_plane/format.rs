//! Message-format decoders keyed by transfer format code.

use crate::error::ProtocolError;
use crate::message::Message;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;

pub trait MessageDecoder: Send + Sync {
    fn decode(&self, payload: &Bytes) -> Result<Message, ProtocolError>;
}

#[derive(Clone, Default)]
pub struct MessageFormatRegistry {
    decoders: HashMap<u32, Arc<dyn MessageDecoder>>,
}

impl MessageFormatRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(mut self, message_format: u32, decoder: Arc<dyn MessageDecoder>) -> Self {
        self.register(message_format, decoder);
        self
    }

    /// Registers `decoder`, replacing any decoder for the same format.
    pub fn register(&mut self, message_format: u32, decoder: Arc<dyn MessageDecoder>) {
        self.decoders.insert(message_format, decoder);
    }

    pub fn decoder(&self, message_format: u32) -> Option<&Arc<dyn MessageDecoder>> {
        self.decoders.get(&message_format)
    }
}
