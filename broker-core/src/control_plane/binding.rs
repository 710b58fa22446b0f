//! Binding identity and recognised binding arguments.

use crate::destination::{Destination, DestinationId, WeakDestination};
use crate::message::Message;
use crate::routing::selector::{Selector, SelectorError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Argument holding a JMS-style selector that messages must satisfy.
pub const JMS_SELECTOR_ARGUMENT: &str = "x-filter-jms-selector";
/// Argument replacing the routing key when the bound destination is an exchange.
pub const REPLACEMENT_ROUTING_KEY_ARGUMENT: &str = "x-replacement-routing-key";

/// Binding arguments. Unrecognised keys are kept and take part in equality.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct BindingArguments(BTreeMap<String, String>);

impl BindingArguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn selector(&self) -> Option<&str> {
        self.get(JMS_SELECTOR_ARGUMENT)
            .filter(|selector| !selector.trim().is_empty())
    }

    pub fn replacement_routing_key(&self) -> Option<&str> {
        self.get(REPLACEMENT_ROUTING_KEY_ARGUMENT)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A binding from an exchange to a destination. Identity is (binding key, destination).
#[derive(Clone, Debug)]
pub struct Binding {
    binding_key: String,
    destination_id: DestinationId,
    destination_name: String,
    destination: WeakDestination,
    arguments: BindingArguments,
    selector: Option<Arc<Selector>>,
}

impl Binding {
    pub(crate) fn new(
        destination: &Destination,
        binding_key: &str,
        arguments: BindingArguments,
    ) -> Result<Self, SelectorError> {
        let selector = arguments
            .selector()
            .map(Selector::parse)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            binding_key: binding_key.to_string(),
            destination_id: destination.id(),
            destination_name: destination.name().to_string(),
            destination: destination.downgrade(),
            arguments,
            selector,
        })
    }

    pub fn binding_key(&self) -> &str {
        &self.binding_key
    }

    pub fn destination_id(&self) -> DestinationId {
        self.destination_id
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn arguments(&self) -> &BindingArguments {
        &self.arguments
    }

    pub(crate) fn destination(&self) -> Option<Destination> {
        self.destination.upgrade()
    }

    pub(crate) fn accepts(&self, message: &Message) -> bool {
        self.selector
            .as_ref()
            .map_or(true, |selector| selector.matches(message.headers()))
    }

    pub(crate) fn is_same(&self, binding_key: &str, destination_id: DestinationId) -> bool {
        self.binding_key == binding_key && self.destination_id == destination_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Queue;

    #[test]
    fn blank_selector_argument_means_no_filter() {
        let arguments = BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "  ");
        assert!(arguments.selector().is_none());
    }

    #[test]
    fn binding_filters_with_parsed_selector() {
        let queue = Destination::Queue(Arc::new(Queue::new("q", false, None)));
        let binding = Binding::new(
            &queue,
            "key",
            BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "prop = True"),
        )
        .expect("selector parses");

        let matching = Message::builder().header("prop", true).build();
        let other = Message::builder().header("prop", false).build();
        assert!(binding.accepts(&matching));
        assert!(!binding.accepts(&other));
        assert!(binding.is_same("key", queue.id()));
    }
}
