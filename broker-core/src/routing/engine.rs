//! Graph walk that resolves a publish into target queues.

use crate::destination::{Destination, DestinationId, Exchange, ExchangeType};
use crate::message::{InstanceProperties, Message};
use crate::observability::{events, fields};
use crate::routing::result::RoutingResult;
use std::collections::HashMap;
use tracing::{debug, warn};

const COMPONENT: &str = "routing_engine";

#[derive(Clone, Copy)]
enum WalkState {
    OnStack,
    Done(usize),
}

/// State of one routing pass.
///
/// An exchange is walked at most once per routing key. A finished walk is
/// remembered so a later path through the same exchange reuses its count, while
/// an exchange still on the walk stack counts as zero, which breaks cycles.
/// `max_hops` bounds the depth of exchange-to-exchange forwarding even when
/// replacement keys keep producing new keys.
pub(crate) struct RouteWalk<'a> {
    message: &'a Message,
    walked: HashMap<(DestinationId, String), WalkState>,
    max_hops: usize,
    result: RoutingResult,
}

impl<'a> RouteWalk<'a> {
    pub(crate) fn new(
        message: &'a Message,
        instance_properties: &InstanceProperties,
        max_hops: usize,
    ) -> Self {
        Self {
            message,
            walked: HashMap::new(),
            max_hops,
            result: RoutingResult::new(message, instance_properties),
        }
    }

    /// Routes through `exchange`, returning how many queue deliveries the subtree accepted.
    pub(crate) fn route_exchange(
        &mut self,
        exchange: &Exchange,
        routing_key: &str,
        hops: usize,
    ) -> usize {
        if exchange.is_deleted() {
            return 0;
        }
        if hops > self.max_hops {
            warn!(
                event = events::ROUTE_HOP_LIMIT_REACHED,
                component = COMPONENT,
                exchange = exchange.name(),
                routing_key,
                max_hops = self.max_hops,
                "route abandoned at hop limit"
            );
            return 0;
        }
        let walk_key = (exchange.id(), routing_key.to_string());
        match self.walked.get(&walk_key) {
            Some(WalkState::OnStack) => return 0,
            Some(WalkState::Done(accepted)) => return *accepted,
            None => {}
        }
        self.walked.insert(walk_key.clone(), WalkState::OnStack);

        let snapshot = exchange.binding_table().snapshot();
        let candidates: Vec<_> = match exchange.exchange_type() {
            ExchangeType::Direct => snapshot.for_key(routing_key).iter().collect(),
            ExchangeType::Fanout => snapshot.iter().collect(),
        };

        let mut accepted = 0;
        for binding in candidates {
            if !binding.accepts(self.message) {
                debug!(
                    event = events::ROUTE_SELECTOR_REJECTED,
                    component = COMPONENT,
                    exchange = exchange.name(),
                    destination = binding.destination_name(),
                    binding_key = binding.binding_key(),
                    "selector rejected message"
                );
                continue;
            }
            let Some(destination) = binding.destination() else {
                continue;
            };
            let next_key = binding
                .arguments()
                .replacement_routing_key()
                .unwrap_or(routing_key);
            accepted += self.route_to(&destination, next_key, hops);
        }

        if accepted == 0 {
            if let Some(alternate) = exchange.alternate() {
                accepted += self.route_alternate(exchange.name(), &alternate, routing_key, hops);
            }
        }

        self.walked.insert(walk_key, WalkState::Done(accepted));

        if hops == 0 {
            debug!(
                event = events::ROUTE_EVALUATED,
                component = COMPONENT,
                exchange = exchange.name(),
                routing_key,
                routes = self.result.number_of_routes(),
                "route evaluated"
            );
        }
        accepted
    }

    fn route_to(&mut self, destination: &Destination, routing_key: &str, hops: usize) -> usize {
        if destination.is_deleted() {
            return 0;
        }
        match destination {
            Destination::Queue(queue) => {
                if queue.accepts(self.message) {
                    self.result.add_queue(queue);
                    return 1;
                }
                debug!(
                    event = events::ROUTE_QUEUE_REFUSED,
                    component = COMPONENT,
                    queue = queue.name(),
                    depth = queue.depth(),
                    "queue refused message"
                );
                match destination.alternate() {
                    Some(alternate) => {
                        self.route_alternate(queue.name(), &alternate, routing_key, hops)
                    }
                    None => 0,
                }
            }
            Destination::Exchange(exchange) => self.route_exchange(exchange, routing_key, hops + 1),
        }
    }

    fn route_alternate(
        &mut self,
        origin: &str,
        alternate: &Destination,
        routing_key: &str,
        hops: usize,
    ) -> usize {
        debug!(
            event = events::ROUTE_ALTERNATE_USED,
            component = COMPONENT,
            origin,
            alternate = %fields::format_destination(alternate),
            "routing to alternate"
        );
        self.route_to(alternate, routing_key, hops + 1)
    }

    pub(crate) fn finish(self) -> RoutingResult {
        self.result
    }
}
