//! Destinations a receiving link delivers into.

use crate::api::resolver::AddressResolver;
use crate::data_plane::delivery::Outcome;
use crate::data_plane::terminus::{DELAYED_DELIVERY_CAPABILITY, DISCARD_UNROUTABLE_CAPABILITY};
use crate::destination::Destination;
use crate::error::{ErrorCondition, ProtocolError};
use crate::message::{InstanceProperties, Message, MessageReference};
use crate::routing::result::RoutingResult;
use crate::transaction::Transaction;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ReceivingDestination: Send + Sync {
    fn address(&self) -> &str;

    /// Capabilities advertised on the negotiated target.
    fn capabilities(&self) -> Vec<String>;

    /// The destination publishing-link registration is tracked on, if there is a single one.
    fn message_destination(&self) -> Option<&Destination>;

    fn credit(&self) -> u32;

    async fn send(
        &self,
        message: &MessageReference,
        transaction: &Transaction,
    ) -> Result<Outcome, ProtocolError>;
}

fn route(destination: &Destination, routing_key: Option<&str>, message: &Message) -> RoutingResult {
    let instance_properties = InstanceProperties::default();
    match destination {
        Destination::Exchange(exchange) => exchange.route(
            message,
            routing_key.or(message.routing_key()).unwrap_or_default(),
            &instance_properties,
        ),
        Destination::Queue(queue) => RoutingResult::for_queue(queue, message, &instance_properties),
    }
}

async fn enqueue_routed(
    result: RoutingResult,
    transaction: &Transaction,
    discard_unroutable: bool,
    address: &str,
) -> Result<Outcome, ProtocolError> {
    if !result.has_routes() {
        return Ok(unroutable(discard_unroutable, address));
    }
    result
        .send(transaction)
        .await
        .map_err(|err| ProtocolError::new(ErrorCondition::InternalError, err.to_string()))?;
    Ok(Outcome::Accepted)
}

fn unroutable(discard_unroutable: bool, address: &str) -> Outcome {
    if discard_unroutable {
        Outcome::Accepted
    } else {
        Outcome::rejected(
            ErrorCondition::NotFound,
            format!("Unknown destination '{address}'"),
        )
    }
}

/// Publishes into one named destination.
pub struct NodeReceivingDestination {
    address: String,
    destination: Destination,
    routing_key: Option<String>,
    discard_unroutable: bool,
    credit: u32,
}

impl NodeReceivingDestination {
    pub fn new(
        address: impl Into<String>,
        destination: Destination,
        routing_key: Option<String>,
        discard_unroutable: bool,
        credit: u32,
    ) -> Self {
        Self {
            address: address.into(),
            destination,
            routing_key,
            discard_unroutable,
            credit,
        }
    }
}

#[async_trait]
impl ReceivingDestination for NodeReceivingDestination {
    fn address(&self) -> &str {
        &self.address
    }

    fn capabilities(&self) -> Vec<String> {
        let mut capabilities = vec![DELAYED_DELIVERY_CAPABILITY.to_string()];
        if self.discard_unroutable {
            capabilities.push(DISCARD_UNROUTABLE_CAPABILITY.to_string());
        }
        capabilities
    }

    fn message_destination(&self) -> Option<&Destination> {
        Some(&self.destination)
    }

    fn credit(&self) -> u32 {
        self.credit
    }

    async fn send(
        &self,
        message: &MessageReference,
        transaction: &Transaction,
    ) -> Result<Outcome, ProtocolError> {
        let result = route(
            &self.destination,
            self.routing_key.as_deref(),
            message.message(),
        );
        enqueue_routed(result, transaction, self.discard_unroutable, &self.address).await
    }
}

/// Publishes each message to the address in its `to` field.
pub struct AnonymousRelayDestination {
    resolver: Arc<dyn AddressResolver>,
    discard_unroutable: bool,
    credit: u32,
}

impl AnonymousRelayDestination {
    pub fn new(resolver: Arc<dyn AddressResolver>, discard_unroutable: bool, credit: u32) -> Self {
        Self {
            resolver,
            discard_unroutable,
            credit,
        }
    }
}

#[async_trait]
impl ReceivingDestination for AnonymousRelayDestination {
    fn address(&self) -> &str {
        ""
    }

    fn capabilities(&self) -> Vec<String> {
        vec![DELAYED_DELIVERY_CAPABILITY.to_string()]
    }

    fn message_destination(&self) -> Option<&Destination> {
        None
    }

    fn credit(&self) -> u32 {
        self.credit
    }

    async fn send(
        &self,
        message: &MessageReference,
        transaction: &Transaction,
    ) -> Result<Outcome, ProtocolError> {
        let message = message.message();
        let Some(to) = message.to() else {
            return Ok(unroutable(self.discard_unroutable, ""));
        };
        let Some(resolved) = self.resolver.resolve(to) else {
            return Ok(unroutable(self.discard_unroutable, to));
        };
        let result = route(
            &resolved.destination,
            resolved.routing_key.as_deref(),
            message,
        );
        enqueue_routed(result, transaction, self.discard_unroutable, to).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::store::InMemoryMessageStore;
    use crate::config::VirtualHostSettings;
    use crate::control_plane::binding::BindingArguments;
    use crate::control_plane::registry::{DestinationRegistry, QueueDeclaration};

    async fn registry() -> Arc<DestinationRegistry> {
        let registry = Arc::new(DestinationRegistry::new(VirtualHostSettings::default()));
        registry
            .create_queue(QueueDeclaration::new("orders"))
            .await
            .expect("queue created");
        registry
            .bind("amq.direct", "orders", "new", BindingArguments::new(), false)
            .await
            .expect("bound");
        registry
    }

    fn auto_commit() -> Transaction {
        Transaction::AutoCommit(Arc::new(InMemoryMessageStore::new()))
    }

    #[tokio::test]
    async fn relay_routes_by_to_address() {
        let registry = registry().await;
        let relay = AnonymousRelayDestination::new(registry.clone(), false, 100);
        let message = Message::builder().to("amq.direct/new").build();

        let outcome = relay
            .send(&message.new_reference(), &auto_commit())
            .await
            .expect("relay send");

        assert_eq!(outcome, Outcome::Accepted);
        assert_eq!(registry.queue("orders").expect("orders").depth(), 1);
    }

    #[tokio::test]
    async fn relay_rejects_unknown_address_unless_discarding() {
        let registry = registry().await;
        let message = Message::builder().to("nowhere").build();

        let strict = AnonymousRelayDestination::new(registry.clone(), false, 100);
        let outcome = strict
            .send(&message.new_reference(), &auto_commit())
            .await
            .expect("relay send");
        assert!(matches!(
            outcome,
            Outcome::Rejected(Some(ProtocolError {
                condition: ErrorCondition::NotFound,
                ..
            }))
        ));

        let lenient = AnonymousRelayDestination::new(registry, true, 100);
        let outcome = lenient
            .send(&message.new_reference(), &auto_commit())
            .await
            .expect("relay send");
        assert_eq!(outcome, Outcome::Accepted);
    }

    #[tokio::test]
    async fn node_uses_message_routing_key_for_exchanges() {
        let registry = registry().await;
        let exchange = registry.lookup("amq.direct").expect("amq.direct");
        let node = NodeReceivingDestination::new("amq.direct", exchange, None, false, 100);

        let routed = Message::builder().routing_key("new").build();
        assert_eq!(
            node.send(&routed.new_reference(), &auto_commit())
                .await
                .expect("send"),
            Outcome::Accepted
        );

        let unrouted = Message::builder().routing_key("old").build();
        assert!(matches!(
            node.send(&unrouted.new_reference(), &auto_commit())
                .await
                .expect("send"),
            Outcome::Rejected(_)
        ));
        assert_eq!(registry.queue("orders").expect("orders").depth(), 1);
    }
}
