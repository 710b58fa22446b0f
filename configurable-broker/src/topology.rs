//! Applies the configured topology to a fresh registry.

use crate::config::TopologyConfig;
use anyhow::{Context, Result};
use broker_core::{DestinationRegistry, ExchangeDeclaration, QueueDeclaration};
use tracing::{info, warn};

/// Declares queues and exchanges first, then alternates, then bindings, so declarations
/// may reference each other in any order.
pub(crate) async fn apply_topology(
    registry: &DestinationRegistry,
    topology: &TopologyConfig,
) -> Result<()> {
    for queue in &topology.queues {
        let declaration = QueueDeclaration {
            alternate: None,
            ..queue.clone()
        };
        registry
            .create_queue(declaration)
            .await
            .with_context(|| format!("unable to declare queue '{}'", queue.name))?;
    }
    for exchange in &topology.exchanges {
        let declaration = ExchangeDeclaration {
            alternate: None,
            ..exchange.clone()
        };
        registry
            .create_exchange(declaration)
            .await
            .with_context(|| format!("unable to declare exchange '{}'", exchange.name))?;
    }

    let alternates = topology
        .queues
        .iter()
        .map(|queue| (&queue.name, &queue.alternate))
        .chain(
            topology
                .exchanges
                .iter()
                .map(|exchange| (&exchange.name, &exchange.alternate)),
        );
    for (name, alternate) in alternates {
        if let Some(alternate) = alternate {
            registry
                .set_alternate(name, Some(alternate.as_str()))
                .await
                .with_context(|| format!("unable to set alternate of '{name}'"))?;
        }
    }

    for binding in &topology.bindings {
        let bound = registry
            .bind(
                &binding.exchange,
                &binding.destination,
                &binding.binding_key,
                binding.arguments.clone(),
                binding.replace_existing,
            )
            .await
            .with_context(|| {
                format!(
                    "unable to bind '{}' to '{}' with key '{}'",
                    binding.destination, binding.exchange, binding.binding_key
                )
            })?;
        if !bound {
            warn!(
                exchange = %binding.exchange,
                destination = %binding.destination,
                binding_key = %binding.binding_key,
                "duplicate binding in configuration ignored"
            );
        }
    }

    info!(
        queues = topology.queues.len(),
        exchanges = topology.exchanges.len(),
        bindings = topology.bindings.len(),
        "topology applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use broker_core::{InstanceProperties, Message, VirtualHostSettings};

    #[tokio::test]
    async fn default_topology_routes_through_chain() {
        let config = BrokerConfig::parse(include_str!("../DEFAULT_CONFIG.json5"))
            .expect("default config");
        let registry = DestinationRegistry::new(config.virtual_host.clone());

        apply_topology(&registry, &config.topology)
            .await
            .expect("topology applied");

        let direct = registry.exchange("amq.direct").expect("amq.direct");
        let urgent = Message::builder().header("priority", 9).build();
        let result = direct.route(&urgent, "shop", &InstanceProperties::default());
        assert!(result.routes_to("orders"));
        assert!(result.routes_to("urgent-orders"));

        let shop = registry.exchange("shop").expect("shop");
        let stray = shop.route(
            &Message::builder().build(),
            "refund",
            &InstanceProperties::default(),
        );
        assert!(stray.routes_to("unrouted"));
    }

    #[tokio::test]
    async fn forward_alternate_references_resolve() {
        let config = BrokerConfig::parse(
            r#"{ topology: {
                queues: [ { name: "first", alternate: "later" } ],
                exchanges: [ { name: "later" } ],
            } }"#,
        )
        .expect("config");
        let registry = DestinationRegistry::new(VirtualHostSettings::default());

        apply_topology(&registry, &config.topology)
            .await
            .expect("topology applied");

        let first = registry.lookup("first").expect("first");
        assert_eq!(first.alternate_name().as_deref(), Some("later"));
    }

    #[tokio::test]
    async fn reserved_exchange_names_fail_startup() {
        let config = BrokerConfig::parse(r#"{ topology: { exchanges: [ { name: "amq.mine" } ] } }"#)
            .expect("config");
        let registry = DestinationRegistry::new(VirtualHostSettings::default());

        assert!(apply_topology(&registry, &config.topology).await.is_err());
    }
}
