//! Virtual-host destination registry: creation, lookup, alternates and deletion.

use crate::config::VirtualHostSettings;
use crate::control_plane::binding::BindingArguments;
use crate::destination::{
    Alternate, Destination, DestinationId, DestinationKind, Exchange, ExchangeType, Queue,
};
use crate::error::TopologyError;
use crate::observability::{events, fields};
use arc_swap::ArcSwap;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const COMPONENT: &str = "destination_registry";
const EVENT_CHANNEL_CAPACITY: usize = 64;

pub const DEFAULT_DIRECT_EXCHANGE: &str = "amq.direct";
pub const DEFAULT_FANOUT_EXCHANGE: &str = "amq.fanout";

/// Topology change notifications published on the registry's broadcast channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DestinationEvent {
    Created {
        id: DestinationId,
        name: String,
        kind: DestinationKind,
    },
    Deleted {
        id: DestinationId,
        name: String,
        kind: DestinationKind,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ExchangeDeclaration {
    pub name: String,
    #[serde(default, rename = "type")]
    pub exchange_type: ExchangeType,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub alternate: Option<String>,
}

impl ExchangeDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exchange_type: ExchangeType::Direct,
            durable: false,
            alternate: None,
        }
    }

    pub fn exchange_type(mut self, exchange_type: ExchangeType) -> Self {
        self.exchange_type = exchange_type;
        self
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn alternate(mut self, alternate: impl Into<String>) -> Self {
        self.alternate = Some(alternate.into());
        self
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct QueueDeclaration {
    pub name: String,
    #[serde(default)]
    pub durable: bool,
    #[serde(default)]
    pub alternate: Option<String>,
    /// Overrides the virtual host's default queue capacity.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl QueueDeclaration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
            alternate: None,
            capacity: None,
        }
    }

    pub fn durable(mut self, durable: bool) -> Self {
        self.durable = durable;
        self
    }

    pub fn alternate(mut self, alternate: impl Into<String>) -> Self {
        self.alternate = Some(alternate.into());
        self
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    /// Clears references from dependants instead of refusing the deletion.
    pub force: bool,
}

#[derive(Clone, Debug, Default)]
struct DestinationMap {
    by_name: HashMap<String, Destination>,
    by_id: HashMap<DestinationId, Destination>,
}

impl DestinationMap {
    fn insert(&mut self, destination: Destination) {
        self.by_id.insert(destination.id(), destination.clone());
        self.by_name
            .insert(destination.name().to_string(), destination);
    }

    fn remove(&mut self, destination: &Destination) {
        self.by_id.remove(&destination.id());
        self.by_name.remove(destination.name());
    }
}

/// Owns every destination of one virtual host.
///
/// Lookups read a lock-free snapshot. Structural changes (create, delete,
/// alternate updates) serialize on an admin gate; binding changes serialize
/// per exchange.
pub struct DestinationRegistry {
    settings: VirtualHostSettings,
    destinations: ArcSwap<DestinationMap>,
    admin: Mutex<()>,
    events: broadcast::Sender<DestinationEvent>,
}

impl DestinationRegistry {
    pub fn new(settings: VirtualHostSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut map = DestinationMap::default();
        for (name, exchange_type) in [
            (DEFAULT_DIRECT_EXCHANGE, ExchangeType::Direct),
            (DEFAULT_FANOUT_EXCHANGE, ExchangeType::Fanout),
        ] {
            map.insert(Destination::Exchange(Arc::new(Exchange::new(
                name,
                exchange_type,
                true,
                true,
                settings.max_route_hops,
            ))));
        }

        Self {
            settings,
            destinations: ArcSwap::from_pointee(map),
            admin: Mutex::new(()),
            events,
        }
    }

    pub fn settings(&self) -> &VirtualHostSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DestinationEvent> {
        self.events.subscribe()
    }

    pub fn lookup(&self, name: &str) -> Option<Destination> {
        self.destinations.load().by_name.get(name).cloned()
    }

    pub fn lookup_by_id(&self, id: DestinationId) -> Option<Destination> {
        self.destinations.load().by_id.get(&id).cloned()
    }

    pub fn exchange(&self, name: &str) -> Option<Arc<Exchange>> {
        self.lookup(name)
            .and_then(|destination| destination.as_exchange().cloned())
    }

    pub fn queue(&self, name: &str) -> Option<Arc<Queue>> {
        self.lookup(name)
            .and_then(|destination| destination.as_queue().cloned())
    }

    pub fn destinations(&self) -> Vec<Destination> {
        self.destinations.load().by_id.values().cloned().collect()
    }

    pub async fn create_exchange(
        &self,
        declaration: ExchangeDeclaration,
    ) -> Result<Arc<Exchange>, TopologyError> {
        let _admin = self.admin.lock().await;

        if declaration
            .name
            .starts_with(&self.settings.reserved_exchange_prefix)
        {
            return Err(self.reject_create(
                &declaration.name,
                DestinationKind::Exchange,
                format!(
                    "exchange names starting with '{}' are reserved",
                    self.settings.reserved_exchange_prefix
                ),
            ));
        }
        self.ensure_name_free(&declaration.name, DestinationKind::Exchange)?;
        let alternate = self.resolve_alternate(
            &declaration.name,
            DestinationKind::Exchange,
            declaration.durable,
            declaration.alternate.as_deref(),
        )?;

        let exchange = Arc::new(Exchange::new(
            declaration.name,
            declaration.exchange_type,
            declaration.durable,
            false,
            self.settings.max_route_hops,
        ));
        let destination = Destination::Exchange(exchange.clone());
        destination.alternate_slot().store(alternate.map(Arc::new));
        self.publish_created(destination);
        Ok(exchange)
    }

    pub async fn create_queue(
        &self,
        declaration: QueueDeclaration,
    ) -> Result<Arc<Queue>, TopologyError> {
        let _admin = self.admin.lock().await;

        self.ensure_name_free(&declaration.name, DestinationKind::Queue)?;
        let alternate = self.resolve_alternate(
            &declaration.name,
            DestinationKind::Queue,
            declaration.durable,
            declaration.alternate.as_deref(),
        )?;

        let queue = Arc::new(Queue::new(
            declaration.name,
            declaration.durable,
            declaration.capacity.or(self.settings.queue_capacity),
        ));
        let destination = Destination::Queue(queue.clone());
        destination.alternate_slot().store(alternate.map(Arc::new));
        self.publish_created(destination);
        Ok(queue)
    }

    /// Updates the alternate of an existing destination, validating it like creation does.
    pub async fn set_alternate(
        &self,
        name: &str,
        alternate: Option<&str>,
    ) -> Result<(), TopologyError> {
        let _admin = self.admin.lock().await;

        let destination = self.require(name)?;
        let resolved = self.resolve_alternate(
            name,
            destination.kind(),
            destination.is_durable(),
            alternate,
        )?;
        destination.alternate_slot().store(resolved.map(Arc::new));

        debug!(
            event = events::ALTERNATE_UPDATED,
            component = COMPONENT,
            destination = %fields::format_destination(&destination),
            alternate = alternate.unwrap_or("none"),
            "alternate updated"
        );
        Ok(())
    }

    /// Binds `destination` to `exchange` by name. See [`Exchange::bind`].
    pub async fn bind(
        &self,
        exchange: &str,
        destination: &str,
        binding_key: &str,
        arguments: BindingArguments,
        replace_existing: bool,
    ) -> Result<bool, TopologyError> {
        let source = self.require_exchange(exchange)?;
        let target = self.require(destination)?;
        source
            .bind(&target, binding_key, arguments, replace_existing)
            .await
    }

    pub async fn unbind(
        &self,
        exchange: &str,
        destination: &str,
        binding_key: &str,
    ) -> Result<bool, TopologyError> {
        let source = self.require_exchange(exchange)?;
        let target = self.require(destination)?;
        Ok(source.unbind(&target, binding_key).await)
    }

    /// Deletes a destination, removing every binding that targets it.
    ///
    /// Deleting a system exchange, or a destination still in use as an
    /// alternate without `force`, fails with [`TopologyError::Resource`] and
    /// leaves everything intact.
    pub async fn delete(&self, name: &str, options: DeleteOptions) -> Result<(), TopologyError> {
        let _admin = self.admin.lock().await;

        let destination = self.require(name)?;
        if destination
            .as_exchange()
            .is_some_and(|exchange| exchange.is_system())
        {
            return Err(self.refuse_delete(&destination, "system exchanges cannot be deleted"));
        }

        let snapshot = self.destinations.load_full();
        let dependants: Vec<&Destination> = snapshot
            .by_id
            .values()
            .filter(|candidate| {
                candidate.id() != destination.id()
                    && candidate.alternate_name().as_deref() == Some(name)
            })
            .collect();
        if !dependants.is_empty() && !options.force {
            let names: Vec<&str> = dependants.iter().map(|dependant| dependant.name()).collect();
            return Err(self.refuse_delete(
                &destination,
                &format!("in use as alternate by {}", names.join(", ")),
            ));
        }
        for dependant in dependants {
            dependant.alternate_slot().store(None);
        }

        destination.mark_deleted();

        let mut swept = 0;
        for exchange in snapshot.by_id.values().filter_map(Destination::as_exchange) {
            let removed = exchange
                .binding_table()
                .remove_destination(destination.id())
                .await;
            if removed > 0 {
                debug!(
                    event = events::BINDINGS_SWEPT,
                    component = COMPONENT,
                    exchange = exchange.name(),
                    destination = %fields::format_destination(&destination),
                    removed,
                    "bindings to deleted destination removed"
                );
            }
            swept += removed;
        }
        if let Some(exchange) = destination.as_exchange() {
            swept += exchange.binding_table().clear().await;
        }

        let mut next = snapshot.as_ref().clone();
        next.remove(&destination);
        self.destinations.store(Arc::new(next));

        info!(
            event = events::DESTINATION_DELETED,
            component = COMPONENT,
            destination = %fields::format_destination(&destination),
            bindings_removed = swept,
            publishing_links = destination.publishing_links().len(),
            "destination deleted"
        );
        let _ = self.events.send(DestinationEvent::Deleted {
            id: destination.id(),
            name: destination.name().to_string(),
            kind: destination.kind(),
        });
        Ok(())
    }

    fn require(&self, name: &str) -> Result<Destination, TopologyError> {
        self.lookup(name).ok_or_else(|| {
            TopologyError::configuration(format!("destination '{name}' does not exist"))
        })
    }

    fn require_exchange(&self, name: &str) -> Result<Arc<Exchange>, TopologyError> {
        self.exchange(name).ok_or_else(|| {
            TopologyError::configuration(format!("exchange '{name}' does not exist"))
        })
    }

    fn ensure_name_free(&self, name: &str, kind: DestinationKind) -> Result<(), TopologyError> {
        if self.lookup(name).is_some() {
            return Err(self.reject_create(name, kind, format!("'{name}' already exists")));
        }
        Ok(())
    }

    fn resolve_alternate(
        &self,
        name: &str,
        kind: DestinationKind,
        durable: bool,
        alternate: Option<&str>,
    ) -> Result<Option<Alternate>, TopologyError> {
        let Some(alternate) = alternate else {
            return Ok(None);
        };
        if alternate == name {
            return Err(self.reject_create(
                name,
                kind,
                "a destination cannot be its own alternate".to_string(),
            ));
        }
        let target = self.lookup(alternate).ok_or_else(|| {
            self.reject_create(
                name,
                kind,
                format!("alternate '{alternate}' does not exist"),
            )
        })?;
        if durable && !target.is_durable() {
            return Err(self.reject_create(
                name,
                kind,
                format!("durable destination cannot use non-durable alternate '{alternate}'"),
            ));
        }
        Ok(Some(Alternate::new(&target)))
    }

    fn publish_created(&self, destination: Destination) {
        let mut next = self.destinations.load().as_ref().clone();
        next.insert(destination.clone());
        self.destinations.store(Arc::new(next));

        let event = match destination.kind() {
            DestinationKind::Queue => events::QUEUE_CREATED,
            DestinationKind::Exchange => events::EXCHANGE_CREATED,
        };
        info!(
            event,
            component = COMPONENT,
            destination = %fields::format_destination(&destination),
            durable = destination.is_durable(),
            alternate = destination.alternate_name().as_deref().unwrap_or("none"),
            "destination created"
        );
        let _ = self.events.send(DestinationEvent::Created {
            id: destination.id(),
            name: destination.name().to_string(),
            kind: destination.kind(),
        });
    }

    fn reject_create(&self, name: &str, kind: DestinationKind, reason: String) -> TopologyError {
        warn!(
            event = events::DESTINATION_CREATE_REJECTED,
            component = COMPONENT,
            destination = name,
            kind = %kind,
            reason = %reason,
            "destination rejected"
        );
        TopologyError::configuration(format!("cannot configure {kind} '{name}': {reason}"))
    }

    fn refuse_delete(&self, destination: &Destination, reason: &str) -> TopologyError {
        warn!(
            event = events::DESTINATION_DELETE_REFUSED,
            component = COMPONENT,
            destination = %fields::format_destination(destination),
            reason,
            "destination deletion refused"
        );
        TopologyError::resource(format!(
            "cannot delete {} '{}': {reason}",
            destination.kind(),
            destination.name()
        ))
    }
}
