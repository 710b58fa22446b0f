//! Receiving link endpoint: attach negotiation, the per-delivery pipeline and detach handling.

use crate::api::resolver::AddressResolver;
use crate::api::security::MessageAuthorizer;
use crate::api::session::SessionLifecycle;
use crate::api::statistics::ConnectionStatistics;
use crate::config::LinkSettings;
use crate::data_plane::delivery::{
    Delivery, DeliveryState, DeliveryTag, Outcome, OutcomeKind, ReceiverSettleMode,
};
use crate::data_plane::format::MessageFormatRegistry;
use crate::data_plane::receiving::{
    AnonymousRelayDestination, NodeReceivingDestination, ReceivingDestination,
};
use crate::data_plane::settlement::{DispositionSink, SettlementAction, SettlementTracker};
use crate::data_plane::terminus::{
    Attach, AttachTarget, Detach, Source, Target, TerminusExpiryPolicy,
    DISCARD_UNROUTABLE_CAPABILITY, LIFETIME_POLICY_PROPERTY, TEMPORARY_TOPIC_CAPABILITY,
    TOPIC_CAPABILITY,
};
use crate::destination::PublishingLink;
use crate::error::{ErrorCondition, LinkError, ProtocolError};
use crate::message::MessageReference;
use crate::observability::{events, fields};
use crate::transaction::{Transaction, TransactionCoordinator};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const COMPONENT: &str = "receiving_link";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Unattached,
    Attaching,
    Attached,
    Detaching,
    Detached,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            LinkState::Unattached => "unattached",
            LinkState::Attaching => "attaching",
            LinkState::Attached => "attached",
            LinkState::Detaching => "detaching",
            LinkState::Detached => "detached",
        };
        f.write_str(state)
    }
}

/// How a remote detach was handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    /// Link closed; the session answers with a closing detach.
    Closed,
    /// Link state discarded.
    Destroyed,
    /// Termini and unsettled state kept for a later resume.
    Suspended,
}

/// Collaborators shared by every link of a session.
#[derive(Clone)]
pub struct LinkContext {
    pub settings: LinkSettings,
    pub resolver: Arc<dyn AddressResolver>,
    pub transactions: Arc<TransactionCoordinator>,
    pub authorizer: Arc<dyn MessageAuthorizer>,
    pub formats: Arc<MessageFormatRegistry>,
    pub statistics: Arc<ConnectionStatistics>,
    pub session: Arc<dyn SessionLifecycle>,
    pub dispositions: Arc<dyn DispositionSink>,
}

pub struct ReceivingLinkEndpoint {
    name: String,
    context: LinkContext,
    state: LinkState,
    source: Option<Source>,
    target: Option<Target>,
    capabilities: Vec<String>,
    destination: Option<Arc<dyn ReceivingDestination>>,
    settlement: Arc<SettlementTracker>,
    receiver_settle_mode: Option<ReceiverSettleMode>,
    link_credit: u32,
    dynamic_node: Option<String>,
}

impl ReceivingLinkEndpoint {
    pub fn new(name: impl Into<String>, context: LinkContext) -> Self {
        let name = name.into();
        let settlement = Arc::new(SettlementTracker::new(
            name.clone(),
            context.dispositions.clone(),
        ));
        Self {
            name,
            receiver_settle_mode: context.settings.receiver_settle_mode,
            context,
            state: LinkState::Unattached,
            source: None,
            target: None,
            capabilities: Vec::new(),
            destination: None,
            settlement,
            link_credit: 0,
            dynamic_node: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    pub fn target(&self) -> Option<&Target> {
        self.target.as_ref()
    }

    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    pub fn settlement(&self) -> &Arc<SettlementTracker> {
        &self.settlement
    }

    pub fn link_credit(&self) -> u32 {
        self.link_credit
    }

    pub fn destination(&self) -> Option<&Arc<dyn ReceivingDestination>> {
        self.destination.as_ref()
    }

    /// Handles an inbound attach, choosing between establishing a new link,
    /// resuming a retained one and recovering one without a target.
    pub async fn attach(&mut self, attach: Attach) -> Result<(), LinkError> {
        if self.state != LinkState::Unattached {
            return Err(LinkError::IllegalState(format!(
                "link '{}' cannot attach while {}",
                self.name, self.state
            )));
        }
        match (self.target.is_some(), attach.target.is_some()) {
            (_, false) => self.recover(attach).await,
            (false, true) => self.establish(attach).await,
            (true, true) => self.resume(attach).await,
        }
    }

    /// Attaches a brand-new link. Fails if termini are already present.
    pub async fn establish(&mut self, attach: Attach) -> Result<(), LinkError> {
        if self.source.is_some() || self.target.is_some() {
            let err = LinkError::IllegalState(format!(
                "link '{}' already has termini and cannot be established again",
                self.name
            ));
            return Err(self.fail_attach(err).await);
        }
        self.source = Some(attach.source.clone().unwrap_or_default());
        self.attach_received(attach).await
    }

    /// Re-attaches a link that keeps its target and unsettled state.
    pub async fn resume(&mut self, attach: Attach) -> Result<(), LinkError> {
        self.reject_coordinator(&attach, "resume").await?;
        if self.target.is_none() {
            let err = LinkError::IllegalState(format!(
                "link '{}' has no target to resume",
                self.name
            ));
            return Err(self.fail_attach(err).await);
        }
        if attach.target.is_none() {
            let err = LinkError::IllegalState(format!(
                "attach for link '{}' carries no target to resume with",
                self.name
            ));
            return Err(self.fail_attach(err).await);
        }
        if let Some(source) = &attach.source {
            self.source = Some(source.clone());
        }
        self.attach_received(attach).await
    }

    /// Moves an attached link onto a new attach exchange.
    pub async fn reattach(&mut self, attach: Attach) -> Result<(), LinkError> {
        self.reject_coordinator(&attach, "reattach").await?;
        if let Some(source) = &attach.source {
            self.source = Some(source.clone());
        }
        self.attach_received(attach).await
    }

    /// Attaches using the retained target when the remote sent none.
    pub async fn recover(&mut self, attach: Attach) -> Result<(), LinkError> {
        if self.target.is_none() {
            let err = LinkError::Fatal(ProtocolError::new(
                ErrorCondition::NotFound,
                format!("Link target for '{}' not found", self.name),
            ));
            return Err(self.fail_attach(err).await);
        }
        if let Some(source) = &attach.source {
            self.source = Some(source.clone());
        }
        self.attach_received(attach).await
    }

    async fn attach_received(&mut self, attach: Attach) -> Result<(), LinkError> {
        self.state = LinkState::Attaching;
        self.receiver_settle_mode = attach
            .receiver_settle_mode
            .or(self.context.settings.receiver_settle_mode);

        let requested = match &attach.target {
            Some(AttachTarget::Target(target)) => Some(target),
            Some(AttachTarget::Coordinator) => {
                let err = LinkError::Fatal(ProtocolError::new(
                    ErrorCondition::NotImplemented,
                    "coordinator targets are served by the transaction coordinator link",
                ));
                return Err(self.fail_attach(err).await);
            }
            None => None,
        };
        let mut target = match requested {
            Some(requested) => self.negotiate_target(requested),
            None => match self.target.clone() {
                Some(retained) => retained,
                None => {
                    let err = LinkError::Fatal(ProtocolError::new(
                        ErrorCondition::NotFound,
                        format!("Link target for '{}' not found", self.name),
                    ));
                    return Err(self.fail_attach(err).await);
                }
            },
        };
        let requested_capabilities = requested
            .and_then(|requested| requested.capabilities.clone())
            .or_else(|| target.capabilities.clone())
            .unwrap_or_default();
        let discard_unroutable = requested_capabilities
            .iter()
            .any(|capability| capability == DISCARD_UNROUTABLE_CAPABILITY);

        let destination = match self
            .receiving_destination(&mut target, discard_unroutable)
            .await
        {
            Ok(destination) => destination,
            Err(err) => return Err(self.fail_attach(err).await),
        };

        let mut capabilities: Vec<String> = requested_capabilities
            .into_iter()
            .filter(|capability| {
                capability == TOPIC_CAPABILITY || capability == TEMPORARY_TOPIC_CAPABILITY
            })
            .collect();
        capabilities.extend(destination.capabilities());
        target.capabilities = (!capabilities.is_empty()).then(|| capabilities.clone());
        self.capabilities = capabilities;

        if !attach.incomplete_unsettled {
            let dropped = self.settlement.retain_remote(attach.unsettled.as_ref());
            if dropped > 0 {
                debug!(
                    event = events::UNSETTLED_RECONCILED,
                    component = COMPONENT,
                    link = %self.name,
                    dropped,
                    "dropped unsettled deliveries unknown to the remote"
                );
            }
        }

        self.set_destination(Some(destination));
        self.target = Some(target);
        self.state = LinkState::Attached;

        info!(
            event = events::LINK_ATTACHED,
            component = COMPONENT,
            link = %self.name,
            address = self.target.as_ref().and_then(|t| t.address.as_deref()).unwrap_or(""),
            unsettled = self.settlement.len(),
            "link attached"
        );
        Ok(())
    }

    fn negotiate_target(&self, requested: &Target) -> Target {
        let dynamic_node_properties = requested.dynamic_node_properties.as_ref().map(|properties| {
            properties
                .iter()
                .filter(|(key, _)| key.as_str() == LIFETIME_POLICY_PROPERTY)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        });
        Target {
            address: requested.address.clone(),
            durable: requested
                .durable
                .min(self.context.settings.highest_supported_durability),
            expiry_policy: requested.expiry_policy,
            timeout: requested.timeout,
            dynamic: requested.dynamic,
            dynamic_node_properties,
            capabilities: requested.capabilities.clone(),
        }
    }

    async fn receiving_destination(
        &mut self,
        target: &mut Target,
        discard_unroutable: bool,
    ) -> Result<Arc<dyn ReceivingDestination>, LinkError> {
        let credit = self.context.settings.default_credit;

        if target.dynamic {
            let retained = self
                .dynamic_node
                .as_deref()
                .and_then(|node| self.context.resolver.resolve(node));
            let resolved = match retained {
                Some(resolved) => resolved,
                None => {
                    let resolved = self
                        .context
                        .resolver
                        .create_dynamic_node(&self.name)
                        .await
                        .map_err(LinkError::Fatal)?;
                    self.dynamic_node = Some(resolved.destination.name().to_string());
                    resolved
                }
            };
            let address = resolved.destination.name().to_string();
            target.address = Some(address.clone());
            return Ok(Arc::new(NodeReceivingDestination::new(
                address,
                resolved.destination,
                resolved.routing_key,
                discard_unroutable,
                credit,
            )));
        }

        match target.address.as_deref() {
            None | Some("") => Ok(Arc::new(AnonymousRelayDestination::new(
                self.context.resolver.clone(),
                discard_unroutable,
                credit,
            ))),
            Some(address) => {
                let resolved = self.context.resolver.resolve(address).ok_or_else(|| {
                    LinkError::Fatal(ProtocolError::new(
                        ErrorCondition::NotFound,
                        format!("Could not find destination for target address '{address}'"),
                    ))
                })?;
                Ok(Arc::new(NodeReceivingDestination::new(
                    address,
                    resolved.destination,
                    resolved.routing_key,
                    discard_unroutable,
                    credit,
                )))
            }
        }
    }

    async fn reject_coordinator(&mut self, attach: &Attach, mode: &str) -> Result<(), LinkError> {
        if matches!(attach.target, Some(AttachTarget::Coordinator)) {
            let err = LinkError::Fatal(ProtocolError::new(
                ErrorCondition::PreconditionFailed,
                format!("Cannot {mode} a coordinator link"),
            ));
            return Err(self.fail_attach(err).await);
        }
        Ok(())
    }

    async fn fail_attach(&mut self, err: LinkError) -> LinkError {
        error!(
            event = events::LINK_ATTACH_FAILED,
            component = COMPONENT,
            link = %self.name,
            err = %err,
            "link attach failed"
        );
        if err.is_fatal() {
            self.teardown(events::LINK_DESTROYED).await;
        }
        err
    }

    /// Grants the destination's credit to the sender. Returns the credit granted.
    pub fn start(&mut self) -> Result<u32, LinkError> {
        self.ensure_attached()?;
        self.link_credit = self
            .destination
            .as_ref()
            .map_or(self.context.settings.default_credit, |destination| {
                destination.credit()
            });
        debug!(
            event = events::LINK_CREDIT_GRANTED,
            component = COMPONENT,
            link = %self.name,
            credit = self.link_credit,
            "link credit granted"
        );
        Ok(self.link_credit)
    }

    /// Processes one complete transfer.
    ///
    /// `Err(LinkError::Delivery)` fails only this delivery; the link stays attached.
    pub async fn receive_delivery(&mut self, delivery: Delivery) -> Result<(), LinkError> {
        self.ensure_attached()?;
        let settled = self.settles_first(delivery.receiver_settle_mode);
        let tag = delivery.tag.clone();

        if delivery.resume {
            return self.resume_delivery(tag, settled);
        }

        let result = self.process_delivery(delivery, settled).await;
        if let Err(err) = &result {
            warn!(
                event = events::DELIVERY_FAILED,
                component = COMPONENT,
                link = %self.name,
                tag = %fields::format_delivery_tag(&tag),
                err = %err,
                "delivery failed"
            );
        }
        result
    }

    fn resume_delivery(&mut self, tag: DeliveryTag, settled: bool) -> Result<(), LinkError> {
        match self.settlement.state(&tag) {
            Some(Some(state)) if state.is_terminal() => {
                debug!(
                    event = events::DELIVERY_RESUMED,
                    component = COMPONENT,
                    link = %self.name,
                    tag = %fields::format_delivery_tag(&tag),
                    state = %state,
                    "resending recorded outcome"
                );
                self.settlement.update_disposition(tag, Some(state), settled);
                Ok(())
            }
            _ => Err(ProtocolError::new(
                ErrorCondition::NotImplemented,
                format!(
                    "Resuming delivery '{}' without a recorded outcome is not supported",
                    fields::format_delivery_tag(&tag)
                ),
            )
            .into()),
        }
    }

    async fn process_delivery(
        &mut self,
        delivery: Delivery,
        settled: bool,
    ) -> Result<(), LinkError> {
        if self.settlement.contains(&delivery.tag) {
            return Err(ProtocolError::new(
                ErrorCondition::IllegalState,
                format!(
                    "Delivery tag '{}' is already in use by an unsettled delivery",
                    fields::format_delivery_tag(&delivery.tag)
                ),
            )
            .into());
        }

        let decoder = self
            .context
            .formats
            .decoder(delivery.message_format)
            .ok_or_else(|| {
                ProtocolError::new(
                    ErrorCondition::NotImplemented,
                    format!("Unknown message format: {}", delivery.message_format),
                )
            })?;
        let message = decoder.decode(&delivery.payload)?;
        let reference = message.new_reference();

        let transaction = match delivery.transaction_id() {
            Some(txn_id) => self.context.transactions.transaction(txn_id).map_err(|_| {
                ProtocolError::new(
                    ErrorCondition::UnknownTransaction,
                    format!("transaction-id '{txn_id}' is unknown."),
                )
            })?,
            None => self.context.transactions.auto_commit(),
        };

        let result = self
            .deliver(delivery.tag, &reference, &transaction, settled)
            .await;
        if result.is_err() {
            transaction.set_rollback_only();
        }
        reference.release();
        result
    }

    async fn deliver(
        &mut self,
        tag: DeliveryTag,
        reference: &MessageReference,
        transaction: &Transaction,
        settled: bool,
    ) -> Result<(), LinkError> {
        let message = reference.message();
        self.context
            .authorizer
            .check_authorized_message_principal(message.user_id())
            .map_err(|err| ProtocolError::new(ErrorCondition::NotAllowed, err.to_string()))?;

        let source = self.source.clone().unwrap_or_default();
        let destination = self.destination.clone().ok_or_else(|| {
            LinkError::IllegalState(format!("link '{}' has no destination", self.name))
        })?;

        let outcome = if message.is_persistent()
            && !self.context.transactions.store().is_persistent()
        {
            let error = ProtocolError::new(
                ErrorCondition::PreconditionFailed,
                "Non-durable message store cannot accept durable message.",
            );
            if source.declares_outcome(OutcomeKind::Rejected) {
                Outcome::Rejected(Some(error))
            } else {
                return Err(error.into());
            }
        } else {
            destination.send(reference, transaction).await?
        };

        let resultant_state = if source.supported_outcomes().contains(&outcome.kind()) {
            Some(match transaction.id() {
                None => DeliveryState::Outcome(outcome.clone()),
                Some(txn_id) => DeliveryState::Transactional {
                    txn_id,
                    outcome: Some(outcome.clone()),
                },
            })
        } else {
            if transaction.is_transactional()
                && source
                    .default_outcome
                    .is_some_and(|default| default != outcome.kind())
            {
                transaction.set_rollback_only();
            }
            None
        };

        if let Some(state) = &resultant_state {
            self.settlement.record(tag.clone(), state.clone());
        }
        match transaction {
            Transaction::Local(local) => local.add_settlement_action(SettlementAction::new(
                tag.clone(),
                resultant_state,
                settled,
                self.settlement.clone(),
            )),
            Transaction::AutoCommit(_) => {
                self.settlement
                    .update_disposition(tag.clone(), resultant_state, settled)
            }
        }

        self.context
            .statistics
            .register_message_received(message.size());
        if transaction.is_transactional() {
            self.context
                .statistics
                .register_transacted_message_received();
        }

        debug!(
            event = events::DELIVERY_ACCEPTED,
            component = COMPONENT,
            link = %self.name,
            tag = %fields::format_delivery_tag(&tag),
            outcome = %outcome,
            settled,
            "delivery processed"
        );
        Ok(())
    }

    /// Applies a remote disposition. Only settlement matters to a receiver.
    pub fn receive_disposition(&mut self, tag: &DeliveryTag, settled: bool) {
        if settled && self.settlement.settle(tag) {
            debug!(
                event = events::REMOTE_SETTLED,
                component = COMPONENT,
                link = %self.name,
                tag = %fields::format_delivery_tag(tag),
                "remote settled delivery"
            );
        }
    }

    /// Handles a detach from the remote peer.
    pub async fn remote_detached(&mut self, detach: Option<&Detach>) -> DetachOutcome {
        self.state = LinkState::Detaching;
        let policy = self.target.as_ref().and_then(|target| target.expiry_policy);
        let closed = detach.is_some_and(|detach| detach.closed);

        let expires = match policy {
            Some(TerminusExpiryPolicy::LinkDetach) => true,
            None | Some(TerminusExpiryPolicy::SessionEnd) => self.context.session.is_closing(),
            Some(TerminusExpiryPolicy::ConnectionClose) => {
                self.context.session.connection_is_closing()
            }
            Some(TerminusExpiryPolicy::Never) => false,
        };

        if closed || expires {
            self.teardown(events::LINK_CLOSED).await;
            return DetachOutcome::Closed;
        }

        let errored = detach.map_or(true, |detach| detach.error.is_some());
        if errored || !self.context.settings.resume_supported {
            self.teardown(events::LINK_DESTROYED).await;
            return DetachOutcome::Destroyed;
        }

        self.set_destination(None);
        self.link_credit = 0;
        self.state = LinkState::Unattached;
        info!(
            event = events::LINK_SUSPENDED,
            component = COMPONENT,
            link = %self.name,
            unsettled = self.settlement.len(),
            "link detached, state retained for resume"
        );
        DetachOutcome::Suspended
    }

    /// Discards the link's state, releases its destination registration and
    /// deletes the node created for a dynamic target.
    pub async fn destroy(&mut self) {
        self.teardown(events::LINK_DESTROYED).await;
    }

    /// Switches the destination, unregistering from the old one and registering on the new one.
    pub fn set_destination(&mut self, destination: Option<Arc<dyn ReceivingDestination>>) {
        let unchanged = match (&self.destination, &destination) {
            (Some(current), Some(next)) => {
                Arc::as_ptr(current) as *const () == Arc::as_ptr(next) as *const ()
            }
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(previous) = self.destination.take() {
            if let Some(node) = previous.message_destination() {
                node.link_removed(&self.name);
            }
        }
        if let Some(next) = &destination {
            if let Some(node) = next.message_destination() {
                node.link_added(PublishingLink::new(&self.name, Some(next.address())));
            }
        }
        debug!(
            event = events::LINK_DESTINATION_CHANGED,
            component = COMPONENT,
            link = %self.name,
            destination = destination
                .as_ref()
                .and_then(|next| next.message_destination())
                .map(fields::format_destination)
                .unwrap_or_else(|| "anonymous".to_string()),
            "link destination changed"
        );
        self.destination = destination;
    }

    async fn teardown(&mut self, event: &'static str) {
        self.set_destination(None);
        if let Some(node) = self.dynamic_node.take() {
            self.delete_dynamic_node(&node).await;
        }
        self.settlement.clear();
        self.source = None;
        self.target = None;
        self.capabilities.clear();
        self.link_credit = 0;
        self.state = LinkState::Detached;
        info!(event = event, component = COMPONENT, link = %self.name, "link detached");
    }

    async fn delete_dynamic_node(&self, node: &str) {
        match self.context.resolver.delete_dynamic_node(node).await {
            Ok(()) => debug!(
                event = events::DYNAMIC_NODE_DELETED,
                component = COMPONENT,
                link = %self.name,
                node,
                "dynamic node deleted"
            ),
            Err(err) => warn!(
                event = events::DYNAMIC_NODE_DELETED,
                component = COMPONENT,
                link = %self.name,
                node,
                err = %err,
                "dynamic node could not be deleted"
            ),
        }
    }

    fn ensure_attached(&self) -> Result<(), LinkError> {
        if self.state == LinkState::Attached {
            return Ok(());
        }
        debug!(
            event = events::DELIVERY_REFUSED,
            component = COMPONENT,
            link = %self.name,
            state = %self.state,
            "link not attached"
        );
        Err(LinkError::NotAttached {
            link: self.name.clone(),
            state: self.state,
        })
    }

    fn settles_first(&self, transfer_mode: Option<ReceiverSettleMode>) -> bool {
        matches!(
            transfer_mode.or(self.receiver_settle_mode),
            None | Some(ReceiverSettleMode::First)
        )
    }
}
