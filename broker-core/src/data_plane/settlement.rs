//! Unsettled-delivery tracking and disposition emission for one link.

use crate::data_plane::delivery::{DeliveryState, DeliveryTag, Disposition};
use crate::observability::{events, fields};
use crate::sync::lock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

const COMPONENT: &str = "settlement";

/// Where dispositions go. Implementations must not block.
pub trait DispositionSink: Send + Sync {
    fn send_disposition(&self, disposition: Disposition);
}

/// Forwards dispositions to an unbounded channel drained by the session writer.
pub struct ChannelDispositionSink {
    sender: mpsc::UnboundedSender<Disposition>,
}

impl ChannelDispositionSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Disposition>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DispositionSink for ChannelDispositionSink {
    fn send_disposition(&self, disposition: Disposition) {
        if let Err(err) = self.sender.send(disposition) {
            warn!(
                event = events::DISPOSITION_SENT,
                component = COMPONENT,
                tag = %fields::format_delivery_tag(&err.0.tag),
                "disposition dropped, session writer has gone away"
            );
        }
    }
}

/// The link's unsettled map: delivery tag to the last state sent (or pending) for it.
pub struct SettlementTracker {
    link_name: String,
    unsettled: Mutex<HashMap<DeliveryTag, Option<DeliveryState>>>,
    sink: Arc<dyn DispositionSink>,
}

impl SettlementTracker {
    pub fn new(link_name: impl Into<String>, sink: Arc<dyn DispositionSink>) -> Self {
        Self {
            link_name: link_name.into(),
            unsettled: Mutex::new(HashMap::new()),
            sink,
        }
    }

    pub fn contains(&self, tag: &DeliveryTag) -> bool {
        lock(&self.unsettled).contains_key(tag)
    }

    /// `None` when the tag is not unsettled; `Some(None)` when it is unsettled without a state.
    pub fn state(&self, tag: &DeliveryTag) -> Option<Option<DeliveryState>> {
        lock(&self.unsettled).get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.unsettled).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> HashMap<DeliveryTag, Option<DeliveryState>> {
        lock(&self.unsettled).clone()
    }

    /// Records the pending state of a delivery before its disposition is sent.
    pub(crate) fn record(&self, tag: DeliveryTag, state: DeliveryState) {
        lock(&self.unsettled).insert(tag, Some(state));
    }

    /// Updates the unsettled map and sends the disposition.
    pub(crate) fn update_disposition(
        &self,
        tag: DeliveryTag,
        state: Option<DeliveryState>,
        settled: bool,
    ) {
        {
            let mut unsettled = lock(&self.unsettled);
            if settled {
                unsettled.remove(&tag);
            } else {
                unsettled.insert(tag.clone(), state.clone());
            }
        }
        debug!(
            event = events::DISPOSITION_SENT,
            component = COMPONENT,
            link = %self.link_name,
            tag = %fields::format_delivery_tag(&tag),
            state = %fields::format_state(state.as_ref()),
            settled,
            "sending disposition"
        );
        self.sink.send_disposition(Disposition {
            tag,
            state,
            settled,
        });
    }

    /// Forgets a delivery the remote has settled.
    pub(crate) fn settle(&self, tag: &DeliveryTag) -> bool {
        lock(&self.unsettled).remove(tag).is_some()
    }

    /// Drops local entries the remote no longer knows about. Returns how many were dropped.
    pub(crate) fn retain_remote(
        &self,
        remote: Option<&HashMap<DeliveryTag, Option<DeliveryState>>>,
    ) -> usize {
        let mut unsettled = lock(&self.unsettled);
        let before = unsettled.len();
        unsettled.retain(|tag, _| remote.is_some_and(|remote| remote.contains_key(tag)));
        before - unsettled.len()
    }

    pub(crate) fn clear(&self) {
        lock(&self.unsettled).clear();
    }
}

/// A disposition owed once the enclosing transaction resolves.
///
/// `fire` consumes the action, so it can run at most once.
pub(crate) struct SettlementAction {
    tag: DeliveryTag,
    state: Option<DeliveryState>,
    settled: bool,
    tracker: Arc<SettlementTracker>,
}

impl SettlementAction {
    pub(crate) fn new(
        tag: DeliveryTag,
        state: Option<DeliveryState>,
        settled: bool,
        tracker: Arc<SettlementTracker>,
    ) -> Self {
        Self {
            tag,
            state,
            settled,
            tracker,
        }
    }

    pub(crate) fn fire(self) {
        self.tracker
            .update_disposition(self.tag, self.state, self.settled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_plane::delivery::Outcome;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Disposition>>,
    }

    impl DispositionSink for RecordingSink {
        fn send_disposition(&self, disposition: Disposition) {
            lock(&self.sent).push(disposition);
        }
    }

    fn accepted() -> Option<DeliveryState> {
        Some(DeliveryState::Outcome(Outcome::Accepted))
    }

    #[test]
    fn settled_disposition_removes_entry() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = SettlementTracker::new("link", sink.clone());
        let tag = DeliveryTag::from("t1");

        tracker.update_disposition(tag.clone(), accepted(), false);
        assert_eq!(tracker.state(&tag), Some(accepted()));

        tracker.update_disposition(tag.clone(), accepted(), true);
        assert!(!tracker.contains(&tag));
        assert_eq!(lock(&sink.sent).len(), 2);
    }

    #[test]
    fn reconciliation_keeps_only_remotely_known_tags() {
        let tracker = SettlementTracker::new("link", Arc::new(RecordingSink::default()));
        for tag in ["a", "b", "c"] {
            tracker.update_disposition(DeliveryTag::from(tag), accepted(), false);
        }
        let remote: HashMap<_, _> = [(DeliveryTag::from("b"), None)].into_iter().collect();

        assert_eq!(tracker.retain_remote(Some(&remote)), 2);
        assert!(tracker.contains(&DeliveryTag::from("b")));

        assert_eq!(tracker.retain_remote(None), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn action_sends_its_disposition() {
        let sink = Arc::new(RecordingSink::default());
        let tracker = Arc::new(SettlementTracker::new("link", sink.clone()));

        SettlementAction::new(DeliveryTag::from("t"), accepted(), true, tracker.clone()).fire();

        let sent = lock(&sink.sent);
        assert_eq!(sent.len(), 1);
        assert!(sent[0].settled);
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn channel_sink_forwards_dispositions() {
        let (sink, mut receiver) = ChannelDispositionSink::new();
        sink.send_disposition(Disposition {
            tag: DeliveryTag::from("t"),
            state: None,
            settled: true,
        });

        let disposition = receiver.recv().await.expect("disposition forwarded");
        assert_eq!(disposition.tag, DeliveryTag::from("t"));
    }
}
