//! Transfers, delivery tags, outcomes and delivery states.

use crate::error::{ErrorCondition, ProtocolError};
use crate::transaction::TransactionId;
use bytes::Bytes;
use serde::Deserialize;
use std::fmt;

/// Message format code of a standard AMQP message.
pub const AMQP_MESSAGE_FORMAT: u32 = 0;

/// Sender-assigned delivery tag, unique among a link's unsettled deliveries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeliveryTag(Bytes);

impl DeliveryTag {
    pub fn new(tag: Bytes) -> Self {
        Self(tag)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for DeliveryTag {
    fn from(tag: Vec<u8>) -> Self {
        Self(Bytes::from(tag))
    }
}

impl From<&str> for DeliveryTag {
    fn from(tag: &str) -> Self {
        Self(Bytes::copy_from_slice(tag.as_bytes()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiverSettleMode {
    /// The receiver settles as soon as it has processed the delivery.
    First,
    /// The receiver settles only after the sender settles.
    Second,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Accepted,
    Rejected,
    Released,
    Modified,
}

impl OutcomeKind {
    pub fn symbol(&self) -> &'static str {
        match self {
            OutcomeKind::Accepted => "amqp:accepted:list",
            OutcomeKind::Rejected => "amqp:rejected:list",
            OutcomeKind::Released => "amqp:released:list",
            OutcomeKind::Modified => "amqp:modified:list",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected(Option<ProtocolError>),
    Released,
    Modified {
        delivery_failed: bool,
        undeliverable_here: bool,
    },
}

impl Outcome {
    pub fn rejected(condition: ErrorCondition, description: impl Into<String>) -> Self {
        Outcome::Rejected(Some(ProtocolError::new(condition, description)))
    }

    pub fn kind(&self) -> OutcomeKind {
        match self {
            Outcome::Accepted => OutcomeKind::Accepted,
            Outcome::Rejected(_) => OutcomeKind::Rejected,
            Outcome::Released => OutcomeKind::Released,
            Outcome::Modified { .. } => OutcomeKind::Modified,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Accepted => f.write_str("accepted"),
            Outcome::Rejected(Some(error)) => write!(f, "rejected({error})"),
            Outcome::Rejected(None) => f.write_str("rejected"),
            Outcome::Released => f.write_str("released"),
            Outcome::Modified { .. } => f.write_str("modified"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeliveryState {
    Outcome(Outcome),
    /// Provisional state of a delivery enlisted in a transaction.
    Transactional {
        txn_id: TransactionId,
        outcome: Option<Outcome>,
    },
}

impl DeliveryState {
    /// Terminal states are plain outcomes; transactional states are provisional.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Outcome(_))
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        match self {
            DeliveryState::Outcome(outcome) => Some(outcome),
            DeliveryState::Transactional { outcome, .. } => outcome.as_ref(),
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryState::Outcome(outcome) => outcome.fmt(f),
            DeliveryState::Transactional {
                txn_id,
                outcome: Some(outcome),
            } => write!(f, "transactional({txn_id}, {outcome})"),
            DeliveryState::Transactional {
                txn_id,
                outcome: None,
            } => write!(f, "transactional({txn_id})"),
        }
    }
}

/// One complete inbound transfer.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub message_format: u32,
    pub payload: Bytes,
    /// Sender-side state; a transactional state enlists the delivery in that transaction.
    pub state: Option<DeliveryState>,
    pub resume: bool,
    pub receiver_settle_mode: Option<ReceiverSettleMode>,
}

impl Delivery {
    pub fn new(tag: impl Into<DeliveryTag>, payload: impl Into<Bytes>) -> Self {
        Self {
            tag: tag.into(),
            message_format: AMQP_MESSAGE_FORMAT,
            payload: payload.into(),
            state: None,
            resume: false,
            receiver_settle_mode: None,
        }
    }

    pub fn with_format(mut self, message_format: u32) -> Self {
        self.message_format = message_format;
        self
    }

    pub fn in_transaction(mut self, txn_id: TransactionId) -> Self {
        self.state = Some(DeliveryState::Transactional {
            txn_id,
            outcome: None,
        });
        self
    }

    pub fn resumed(mut self) -> Self {
        self.resume = true;
        self
    }

    pub fn with_settle_mode(mut self, mode: ReceiverSettleMode) -> Self {
        self.receiver_settle_mode = Some(mode);
        self
    }

    pub fn transaction_id(&self) -> Option<TransactionId> {
        match &self.state {
            Some(DeliveryState::Transactional { txn_id, .. }) => Some(*txn_id),
            _ => None,
        }
    }
}

/// A disposition frame sent back to the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    pub tag: DeliveryTag,
    pub state: Option<DeliveryState>,
    pub settled: bool,
}
