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

//! Decoded messages, their header values, and reference accounting.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// A typed application header value, as seen by selectors.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(i64::from(value))
    }
}

impl From<f64> for HeaderValue {
    fn from(value: f64) -> Self {
        HeaderValue::Float(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::String(value.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::String(value)
    }
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Bool(value) => write!(f, "{value}"),
            HeaderValue::Int(value) => write!(f, "{value}"),
            HeaderValue::Float(value) => write!(f, "{value}"),
            HeaderValue::String(value) => write!(f, "'{value}'"),
        }
    }
}

/// Per-enqueue properties that travel with a routed message but are not part of it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InstanceProperties(HashMap<String, HeaderValue>);

impl InstanceProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&HeaderValue> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct MessageInner {
    id: Uuid,
    to: Option<String>,
    routing_key: Option<String>,
    user_id: Option<String>,
    headers: HashMap<String, HeaderValue>,
    persistent: bool,
    payload: Bytes,
    size: u64,
    references: AtomicUsize,
}

/// An immutable decoded message. Cloning shares the same underlying message.
#[derive(Clone)]
pub struct Message {
    inner: Arc<MessageInner>,
}

impl Message {
    pub fn builder() -> MessageBuilder {
        MessageBuilder::default()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Address the publisher wants the message delivered to. Used by anonymous relay links.
    pub fn to(&self) -> Option<&str> {
        self.inner.to.as_deref()
    }

    pub fn routing_key(&self) -> Option<&str> {
        self.inner.routing_key.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.inner.user_id.as_deref()
    }

    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.inner.headers.get(name)
    }

    pub fn headers(&self) -> &HashMap<String, HeaderValue> {
        &self.inner.headers
    }

    pub fn is_persistent(&self) -> bool {
        self.inner.persistent
    }

    pub fn payload(&self) -> &Bytes {
        &self.inner.payload
    }

    pub fn size(&self) -> u64 {
        self.inner.size
    }

    /// Acquires a reference that keeps the message alive in the broker until released.
    pub fn new_reference(&self) -> MessageReference {
        self.inner.references.fetch_add(1, Ordering::AcqRel);
        MessageReference {
            message: self.clone(),
        }
    }

    /// Number of outstanding references acquired through [`Message::new_reference`].
    pub fn reference_count(&self) -> usize {
        self.inner.references.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.inner.id)
            .field("to", &self.inner.to)
            .field("routing_key", &self.inner.routing_key)
            .field("persistent", &self.inner.persistent)
            .field("size", &self.inner.size)
            .finish()
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

/// Holds one reference on a [`Message`]. The reference is released exactly once, on drop.
#[derive(Debug)]
pub struct MessageReference {
    message: Message,
}

impl MessageReference {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn release(self) {}
}

impl Drop for MessageReference {
    fn drop(&mut self) {
        self.message.inner.references.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Default)]
pub struct MessageBuilder {
    to: Option<String>,
    routing_key: Option<String>,
    user_id: Option<String>,
    headers: HashMap<String, HeaderValue>,
    persistent: bool,
    payload: Bytes,
    size: Option<u64>,
}

impl MessageBuilder {
    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = Some(routing_key.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Overrides the size reported for statistics; defaults to the payload length.
    pub fn size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn build(self) -> Message {
        let size = self.size.unwrap_or(self.payload.len() as u64);
        Message {
            inner: Arc::new(MessageInner {
                id: Uuid::new_v4(),
                to: self.to,
                routing_key: self.routing_key,
                user_id: self.user_id,
                headers: self.headers,
                persistent: self.persistent,
                payload: self.payload,
                size,
                references: AtomicUsize::new(0),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_reference_releases_it_once() {
        let message = Message::builder().payload("hello").build();
        let first = message.new_reference();
        let second = message.new_reference();
        assert_eq!(message.reference_count(), 2);

        first.release();
        assert_eq!(message.reference_count(), 1);

        drop(second);
        assert_eq!(message.reference_count(), 0);
    }

    #[test]
    fn size_defaults_to_payload_length() {
        let message = Message::builder().payload(vec![0u8; 12]).build();
        assert_eq!(message.size(), 12);

        let sized = Message::builder().payload("abc").size(100).build();
        assert_eq!(sized.size(), 100);
    }

    #[test]
    fn clones_share_reference_accounting() {
        let message = Message::builder().build();
        let clone = message.clone();
        let _reference = clone.new_reference();

        assert_eq!(message.reference_count(), 1);
        assert_eq!(message, clone);
    }
}
