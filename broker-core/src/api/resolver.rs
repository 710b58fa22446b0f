//! Address resolution for link targets and anonymous relay.

use crate::control_plane::registry::{DeleteOptions, DestinationRegistry, QueueDeclaration};
use crate::destination::Destination;
use crate::error::{ErrorCondition, ProtocolError};
use async_trait::async_trait;
use uuid::Uuid;

/// A destination found for an address, with the routing key the address carried, if any.
#[derive(Clone, Debug)]
pub struct ResolvedAddress {
    pub destination: Destination,
    pub routing_key: Option<String>,
}

#[async_trait]
pub trait AddressResolver: Send + Sync {
    fn resolve(&self, address: &str) -> Option<ResolvedAddress>;

    /// Creates a node for a dynamic target requested by `link_name`.
    async fn create_dynamic_node(&self, link_name: &str) -> Result<ResolvedAddress, ProtocolError>;

    /// Deletes a node previously returned by [`AddressResolver::create_dynamic_node`].
    async fn delete_dynamic_node(&self, name: &str) -> Result<(), ProtocolError>;
}

/// Resolves `name` to the destination of that name, or `exchange/key` to an
/// exchange with a routing key.
#[async_trait]
impl AddressResolver for DestinationRegistry {
    fn resolve(&self, address: &str) -> Option<ResolvedAddress> {
        if let Some(destination) = self.lookup(address) {
            return Some(ResolvedAddress {
                destination,
                routing_key: None,
            });
        }
        let (exchange, routing_key) = address.split_once('/')?;
        self.exchange(exchange).map(|exchange| ResolvedAddress {
            destination: Destination::Exchange(exchange),
            routing_key: Some(routing_key.to_string()),
        })
    }

    async fn create_dynamic_node(&self, link_name: &str) -> Result<ResolvedAddress, ProtocolError> {
        let name = format!("temp-{link_name}-{}", Uuid::new_v4());
        let queue = self
            .create_queue(QueueDeclaration::new(name))
            .await
            .map_err(|err| ProtocolError::new(ErrorCondition::InternalError, err.to_string()))?;
        Ok(ResolvedAddress {
            destination: Destination::Queue(queue),
            routing_key: None,
        })
    }

    async fn delete_dynamic_node(&self, name: &str) -> Result<(), ProtocolError> {
        self.delete(name, DeleteOptions::default())
            .await
            .map_err(|err| ProtocolError::new(ErrorCondition::InternalError, err.to_string()))
    }
}
