//! Exchanges: routing destinations that forward messages along their bindings.

use crate::control_plane::binding::{Binding, BindingArguments};
use crate::control_plane::binding_table::{BindOutcome, BindingTable};
use crate::destination::publishing::PublishingLinks;
use crate::destination::{Alternate, Destination, DestinationId};
use crate::error::TopologyError;
use crate::message::{InstanceProperties, Message};
use crate::observability::{events, fields};
use crate::routing::engine::RouteWalk;
use crate::routing::result::RoutingResult;
use arc_swap::ArcSwapOption;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

const COMPONENT: &str = "exchange";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    /// Matches bindings whose key equals the routing key exactly.
    #[default]
    Direct,
    /// Matches every binding regardless of key.
    Fanout,
}

impl fmt::Display for ExchangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeType::Direct => f.write_str("direct"),
            ExchangeType::Fanout => f.write_str("fanout"),
        }
    }
}

#[derive(Debug)]
pub struct Exchange {
    id: DestinationId,
    name: String,
    exchange_type: ExchangeType,
    durable: bool,
    system: bool,
    max_route_hops: usize,
    alternate: ArcSwapOption<Alternate>,
    bindings: BindingTable,
    deleted: AtomicBool,
    publishing_links: PublishingLinks,
}

impl Exchange {
    pub(crate) fn new(
        name: impl Into<String>,
        exchange_type: ExchangeType,
        durable: bool,
        system: bool,
        max_route_hops: usize,
    ) -> Self {
        Self {
            id: DestinationId::random(),
            name: name.into(),
            exchange_type,
            durable,
            system,
            max_route_hops,
            alternate: ArcSwapOption::empty(),
            bindings: BindingTable::default(),
            deleted: AtomicBool::new(false),
            publishing_links: PublishingLinks::default(),
        }
    }

    pub fn id(&self) -> DestinationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchange_type(&self) -> ExchangeType {
        self.exchange_type
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    /// System exchanges are created with the registry and cannot be deleted.
    pub fn is_system(&self) -> bool {
        self.system
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    /// Adds or replaces a binding from this exchange to `destination`.
    ///
    /// Returns `Ok(false)` when a binding with the same key and destination already
    /// exists and `replace_existing` is `false`; nothing is changed in that case.
    /// Replacing with identical arguments succeeds without swapping the binding.
    pub async fn bind(
        &self,
        destination: &Destination,
        binding_key: &str,
        arguments: BindingArguments,
        replace_existing: bool,
    ) -> Result<bool, TopologyError> {
        if destination.id() == self.id {
            return Err(self.reject_binding(
                destination,
                binding_key,
                "an exchange cannot be bound to itself",
            ));
        }
        if self.is_deleted() {
            return Err(self.reject_binding(destination, binding_key, "exchange has been deleted"));
        }

        let binding = Binding::new(destination, binding_key, arguments).map_err(|err| {
            self.reject_binding(destination, binding_key, &format!("invalid selector: {err}"))
        })?;

        let outcome = self
            .bindings
            .bind(binding, replace_existing, destination)
            .await
            .map_err(|err| {
                warn!(
                    event = events::BINDING_REJECTED,
                    component = COMPONENT,
                    exchange = %self.name,
                    destination = %fields::format_destination(destination),
                    binding_key,
                    err = %err,
                    "binding rejected"
                );
                err
            })?;

        let event = match outcome {
            BindOutcome::Added => events::BINDING_ADDED,
            BindOutcome::Replaced => events::BINDING_REPLACED,
            BindOutcome::Unchanged | BindOutcome::Refused => events::BINDING_UNCHANGED,
        };
        debug!(
            event,
            component = COMPONENT,
            exchange = %self.name,
            destination = %fields::format_destination(destination),
            binding_key,
            "binding updated"
        );

        Ok(outcome != BindOutcome::Refused)
    }

    /// Removes the binding identified by key and destination. Returns `false` if none existed.
    pub async fn unbind(&self, destination: &Destination, binding_key: &str) -> bool {
        let removed = self.bindings.unbind(binding_key, destination.id()).await;
        if removed {
            debug!(
                event = events::BINDING_REMOVED,
                component = COMPONENT,
                exchange = %self.name,
                destination = %fields::format_destination(destination),
                binding_key,
                "binding removed"
            );
        }
        removed
    }

    /// Computes the queues `message` would be enqueued on, without enqueuing it.
    pub fn route(
        &self,
        message: &Message,
        routing_key: &str,
        instance_properties: &InstanceProperties,
    ) -> RoutingResult {
        let mut walk = RouteWalk::new(message, instance_properties, self.max_route_hops);
        walk.route_exchange(self, routing_key, 0);
        walk.finish()
    }

    pub fn has_bindings(&self) -> bool {
        self.bindings.len() > 0
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_bound(&self, binding_key: &str) -> bool {
        self.bindings.is_key_bound(binding_key)
    }

    pub fn is_destination_bound(&self, destination: &Destination) -> bool {
        self.bindings.is_destination_bound(destination.id())
    }

    pub fn is_bound_to(&self, binding_key: &str, destination: &Destination) -> bool {
        self.bindings.find(binding_key, destination.id()).is_some()
    }

    pub fn is_bound_with_arguments(
        &self,
        binding_key: &str,
        arguments: &BindingArguments,
        destination: &Destination,
    ) -> bool {
        self.bindings
            .find(binding_key, destination.id())
            .is_some_and(|binding| binding.arguments() == arguments)
    }

    pub fn bindings(&self) -> Vec<Binding> {
        self.bindings
            .snapshot()
            .iter()
            .map(|binding| binding.as_ref().clone())
            .collect()
    }

    pub(crate) fn binding_table(&self) -> &BindingTable {
        &self.bindings
    }

    pub(crate) fn mark_deleted(&self) -> bool {
        !self.deleted.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn alternate_slot(&self) -> &ArcSwapOption<Alternate> {
        &self.alternate
    }

    pub(crate) fn alternate(&self) -> Option<Destination> {
        self.alternate
            .load()
            .as_ref()
            .and_then(|alternate| alternate.target.upgrade())
    }

    pub(crate) fn publishing_links(&self) -> &PublishingLinks {
        &self.publishing_links
    }

    fn reject_binding(
        &self,
        destination: &Destination,
        binding_key: &str,
        reason: &str,
    ) -> TopologyError {
        warn!(
            event = events::BINDING_REJECTED,
            component = COMPONENT,
            exchange = %self.name,
            destination = %fields::format_destination(destination),
            binding_key,
            reason,
            "binding rejected"
        );
        TopologyError::configuration(format!(
            "cannot bind '{}' to exchange '{}' with key '{binding_key}': {reason}",
            destination.name(),
            self.name
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::Queue;
    use std::sync::Arc;

    fn direct(name: &str) -> Arc<Exchange> {
        Arc::new(Exchange::new(name, ExchangeType::Direct, false, false, 16))
    }

    fn queue(name: &str) -> Destination {
        Destination::Queue(Arc::new(Queue::new(name, false, None)))
    }

    #[tokio::test]
    async fn bind_without_replace_keeps_existing_arguments() {
        let exchange = direct("ex");
        let q = queue("q");
        let first = BindingArguments::new().with("x-filter-jms-selector", "a = 1");

        assert!(exchange
            .bind(&q, "k", first.clone(), false)
            .await
            .expect("first bind"));
        assert!(!exchange
            .bind(&q, "k", BindingArguments::new(), false)
            .await
            .expect("second bind"));
        assert!(exchange.is_bound_with_arguments("k", &first, &q));
    }

    #[tokio::test]
    async fn bind_with_replace_swaps_arguments() {
        let exchange = direct("ex");
        let q = queue("q");
        exchange
            .bind(&q, "k", BindingArguments::new(), false)
            .await
            .expect("first bind");

        let replacement = BindingArguments::new().with("x-replacement-routing-key", "other");
        assert!(exchange
            .bind(&q, "k", replacement.clone(), true)
            .await
            .expect("replace bind"));
        assert!(exchange.is_bound_with_arguments("k", &replacement, &q));
        assert_eq!(exchange.binding_count(), 1);
    }

    #[tokio::test]
    async fn binding_to_itself_is_rejected() {
        let exchange = direct("ex");
        let as_destination = Destination::Exchange(exchange.clone());

        let err = exchange
            .bind(&as_destination, "k", BindingArguments::new(), false)
            .await
            .expect_err("self binding must fail");

        assert!(matches!(err, TopologyError::Configuration(_)));
        assert!(!exchange.has_bindings());
    }

    #[tokio::test]
    async fn invalid_selector_is_a_configuration_error() {
        let exchange = direct("ex");
        let q = queue("q");

        let err = exchange
            .bind(
                &q,
                "k",
                BindingArguments::new().with("x-filter-jms-selector", "prop = = 1"),
                false,
            )
            .await
            .expect_err("bad selector must fail");

        assert!(matches!(err, TopologyError::Configuration(_)));
        assert!(!exchange.is_bound("k"));
    }

    #[tokio::test]
    async fn unbind_reports_whether_binding_existed() {
        let exchange = direct("ex");
        let q = queue("q");
        exchange
            .bind(&q, "k", BindingArguments::new(), false)
            .await
            .expect("bind");

        assert!(exchange.unbind(&q, "k").await);
        assert!(!exchange.unbind(&q, "k").await);
        assert!(!exchange.is_destination_bound(&q));
    }
}
