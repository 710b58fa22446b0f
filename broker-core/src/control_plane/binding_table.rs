//! Copy-on-write binding table.
//!
//! Routing reads an immutable snapshot without locking. Mutations serialize
//! on a per-exchange writer gate, build a new snapshot and publish it
//! atomically, so a concurrent route sees either the old or the new table.

use crate::control_plane::binding::Binding;
use crate::destination::{Destination, DestinationId};
use crate::error::TopologyError;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum BindOutcome {
    Added,
    Replaced,
    Unchanged,
    Refused,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct BindingSnapshot {
    by_key: HashMap<String, Vec<Arc<Binding>>>,
}

impl BindingSnapshot {
    pub(crate) fn for_key(&self, binding_key: &str) -> &[Arc<Binding>] {
        self.by_key
            .get(binding_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Arc<Binding>> {
        self.by_key.values().flatten()
    }

    pub(crate) fn len(&self) -> usize {
        self.by_key.values().map(Vec::len).sum()
    }

    fn find(&self, binding_key: &str, destination_id: DestinationId) -> Option<&Arc<Binding>> {
        self.for_key(binding_key)
            .iter()
            .find(|binding| binding.is_same(binding_key, destination_id))
    }

    fn upsert(&mut self, binding: Binding) {
        let bindings = self
            .by_key
            .entry(binding.binding_key().to_string())
            .or_default();
        bindings.retain(|existing| existing.destination_id() != binding.destination_id());
        bindings.push(Arc::new(binding));
    }

    fn remove_where(&mut self, predicate: impl Fn(&Binding) -> bool) -> usize {
        let before = self.len();
        for bindings in self.by_key.values_mut() {
            bindings.retain(|binding| !predicate(binding));
        }
        self.by_key.retain(|_, bindings| !bindings.is_empty());
        before - self.len()
    }
}

#[derive(Debug)]
pub(crate) struct BindingTable {
    current: ArcSwap<BindingSnapshot>,
    writer: Mutex<()>,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self {
            current: ArcSwap::from_pointee(BindingSnapshot::default()),
            writer: Mutex::new(()),
        }
    }
}

impl BindingTable {
    pub(crate) fn snapshot(&self) -> Arc<BindingSnapshot> {
        self.current.load_full()
    }

    pub(crate) fn len(&self) -> usize {
        self.current.load().len()
    }

    pub(crate) fn find(
        &self,
        binding_key: &str,
        destination_id: DestinationId,
    ) -> Option<Arc<Binding>> {
        self.current
            .load()
            .find(binding_key, destination_id)
            .cloned()
    }

    pub(crate) fn is_key_bound(&self, binding_key: &str) -> bool {
        !self.current.load().for_key(binding_key).is_empty()
    }

    pub(crate) fn is_destination_bound(&self, destination_id: DestinationId) -> bool {
        self.current
            .load()
            .iter()
            .any(|binding| binding.destination_id() == destination_id)
    }

    /// Inserts `binding`. The destination's liveness is checked under the writer gate,
    /// which the deletion sweep also holds, so no binding to a deleted destination survives.
    pub(crate) async fn bind(
        &self,
        binding: Binding,
        replace_existing: bool,
        destination: &Destination,
    ) -> Result<BindOutcome, TopologyError> {
        let _gate = self.writer.lock().await;

        if destination.is_deleted() {
            return Err(TopologyError::configuration(format!(
                "destination '{}' does not exist",
                destination.name()
            )));
        }

        let current = self.current.load_full();
        let outcome = match current.find(binding.binding_key(), binding.destination_id()) {
            Some(_) if !replace_existing => return Ok(BindOutcome::Refused),
            Some(existing) if existing.arguments() == binding.arguments() => {
                return Ok(BindOutcome::Unchanged)
            }
            Some(_) => BindOutcome::Replaced,
            None => BindOutcome::Added,
        };

        let mut next = current.as_ref().clone();
        next.upsert(binding);
        self.current.store(Arc::new(next));
        Ok(outcome)
    }

    pub(crate) async fn unbind(&self, binding_key: &str, destination_id: DestinationId) -> bool {
        let _gate = self.writer.lock().await;
        self.publish_without(|binding| binding.is_same(binding_key, destination_id)) > 0
    }

    /// Drops every binding to `destination_id`. Returns how many were removed.
    pub(crate) async fn remove_destination(&self, destination_id: DestinationId) -> usize {
        let _gate = self.writer.lock().await;
        self.publish_without(|binding| binding.destination_id() == destination_id)
    }

    pub(crate) async fn clear(&self) -> usize {
        let _gate = self.writer.lock().await;
        self.publish_without(|_| true)
    }

    fn publish_without(&self, predicate: impl Fn(&Binding) -> bool) -> usize {
        let current = self.current.load_full();
        let mut next = current.as_ref().clone();
        let removed = next.remove_where(predicate);
        if removed > 0 {
            self.current.store(Arc::new(next));
        }
        removed
    }
}
