//! Link termini and attach/detach frames as seen by a receiving link.

use crate::data_plane::delivery::{DeliveryState, DeliveryTag, OutcomeKind, ReceiverSettleMode};
use crate::error::ProtocolError;
use serde::Deserialize;
use std::collections::HashMap;

pub const TOPIC_CAPABILITY: &str = "topic";
pub const TEMPORARY_TOPIC_CAPABILITY: &str = "temporary-topic";
pub const DISCARD_UNROUTABLE_CAPABILITY: &str = "discard-unroutable";
pub const DELAYED_DELIVERY_CAPABILITY: &str = "DELAYED_DELIVERY";
pub const LIFETIME_POLICY_PROPERTY: &str = "lifetime-policy";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TerminusDurability {
    #[default]
    None,
    Configuration,
    UnsettledState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TerminusExpiryPolicy {
    LinkDetach,
    SessionEnd,
    ConnectionClose,
    Never,
}

/// The remote sender's source terminus.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub address: Option<String>,
    pub outcomes: Option<Vec<OutcomeKind>>,
    pub default_outcome: Option<OutcomeKind>,
}

impl Source {
    /// Outcomes the sender can receive. Without declared outcomes only
    /// `accepted` is assumed, unless a default outcome is set.
    pub fn supported_outcomes(&self) -> Vec<OutcomeKind> {
        match (&self.outcomes, self.default_outcome) {
            (Some(outcomes), _) => outcomes.clone(),
            (None, None) => vec![OutcomeKind::Accepted],
            (None, Some(_)) => Vec::new(),
        }
    }

    pub fn declares_outcome(&self, outcome: OutcomeKind) -> bool {
        self.outcomes
            .as_ref()
            .is_some_and(|outcomes| outcomes.contains(&outcome))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Target {
    pub address: Option<String>,
    pub durable: TerminusDurability,
    pub expiry_policy: Option<TerminusExpiryPolicy>,
    pub timeout: u32,
    pub dynamic: bool,
    pub dynamic_node_properties: Option<HashMap<String, String>>,
    pub capabilities: Option<Vec<String>>,
}

impl Target {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities
            .as_ref()
            .is_some_and(|capabilities| capabilities.iter().any(|c| c == capability))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttachTarget {
    Target(Target),
    Coordinator,
}

#[derive(Clone, Debug, Default)]
pub struct Attach {
    pub name: String,
    pub source: Option<Source>,
    pub target: Option<AttachTarget>,
    pub unsettled: Option<HashMap<DeliveryTag, Option<DeliveryState>>>,
    /// When set, `unsettled` may be partial and local state is kept.
    pub incomplete_unsettled: bool,
    pub receiver_settle_mode: Option<ReceiverSettleMode>,
}

impl Attach {
    pub fn to_target(name: impl Into<String>, target: Target) -> Self {
        Self {
            name: name.into(),
            source: Some(Source::default()),
            target: Some(AttachTarget::Target(target)),
            ..Self::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Detach {
    pub closed: bool,
    pub error: Option<ProtocolError>,
}
