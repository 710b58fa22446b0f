use async_trait::async_trait;
use broker_core::{
    Attach, BindingArguments, ChannelDispositionSink, ConnectionPrincipal, ConnectionStatistics,
    Delivery, DeliveryState, DestinationRegistry, Disposition, ErrorCondition,
    InMemoryMessageStore, LinkContext, LinkError, LinkSettings, Message, MessageDecoder,
    MessageFormatRegistry, MessageStore, Outcome, OutcomeKind, ProtocolError, QueueDeclaration,
    ReceivingLinkEndpoint, SessionState, Source, StoreError, Target, TransactionCoordinator,
    TransactionError, VirtualHostSettings, AMQP_MESSAGE_FORMAT, DEFAULT_DIRECT_EXCHANGE,
};
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// `to|routing-key`. A leading `!` marks the message persistent and a leading `~`
/// stamps it with a foreign user id. Keeps the last decoded message.
#[derive(Default)]
struct AddressedDecoder {
    last: Mutex<Option<Message>>,
}

impl MessageDecoder for AddressedDecoder {
    fn decode(&self, payload: &Bytes) -> Result<Message, ProtocolError> {
        let text = std::str::from_utf8(payload).map_err(|err| {
            ProtocolError::new(ErrorCondition::InternalError, format!("bad payload: {err}"))
        })?;
        let (impersonating, text) = match text.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (persistent, text) = match text.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (to, key) = text.split_once('|').unwrap_or(("", text));
        let mut builder = Message::builder()
            .routing_key(key)
            .persistent(persistent)
            .payload(payload.clone());
        if !to.is_empty() {
            builder = builder.to(to);
        }
        if impersonating {
            builder = builder.user_id("mallory");
        }
        let message = builder.build();
        *self.last.lock().unwrap() = Some(message.clone());
        Ok(message)
    }
}

/// Persistent store that refuses writes for one queue.
struct FailingStore {
    failing_queue: &'static str,
}

#[async_trait]
impl MessageStore for FailingStore {
    fn is_persistent(&self) -> bool {
        true
    }

    async fn enqueue(&self, queue: &str, _message: &Message) -> Result<(), StoreError> {
        if queue == self.failing_queue {
            return Err(StoreError("disk full".to_string()));
        }
        Ok(())
    }
}

struct Harness {
    registry: Arc<DestinationRegistry>,
    decoder: Arc<AddressedDecoder>,
    transactions: Arc<TransactionCoordinator>,
    dispositions: UnboundedReceiver<Disposition>,
    link: ReceivingLinkEndpoint,
}

impl Harness {
    /// References still held on the last decoded message.
    fn last_message_references(&self) -> usize {
        self.decoder
            .last
            .lock()
            .unwrap()
            .as_ref()
            .expect("a message was decoded")
            .reference_count()
    }
}

async fn harness(store: Arc<dyn MessageStore>, source: Source, address: Option<&str>) -> Harness {
    let registry = Arc::new(DestinationRegistry::new(VirtualHostSettings::default()));
    registry
        .create_queue(QueueDeclaration::new("orders").durable(true))
        .await
        .expect("queue created");
    registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "orders", "new", BindingArguments::new(), false)
        .await
        .expect("bound");

    let transactions = Arc::new(TransactionCoordinator::new(store));
    let decoder = Arc::new(AddressedDecoder::default());
    let (sink, dispositions) = ChannelDispositionSink::new();
    let context = LinkContext {
        settings: LinkSettings::default(),
        resolver: registry.clone(),
        transactions: transactions.clone(),
        authorizer: Arc::new(ConnectionPrincipal::new("guest", true)),
        formats: Arc::new(
            MessageFormatRegistry::new().with_decoder(AMQP_MESSAGE_FORMAT, decoder.clone()),
        ),
        statistics: Arc::new(ConnectionStatistics::new()),
        session: Arc::new(SessionState::new()),
        dispositions: Arc::new(sink),
    };

    let mut link = ReceivingLinkEndpoint::new("publisher", context);
    let target = match address {
        Some(address) => Target::new(address),
        None => Target::default(),
    };
    let mut attach = Attach::to_target("publisher", target);
    attach.source = Some(source);
    link.attach(attach).await.expect("attached");
    link.start().expect("started");

    Harness {
        registry,
        decoder,
        transactions,
        dispositions,
        link,
    }
}

fn orders_depth(harness: &Harness) -> usize {
    harness.registry.queue("orders").expect("orders").depth()
}

#[tokio::test]
async fn transactional_delivery_settles_on_commit() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;
    let txn = harness.transactions.begin();

    harness
        .link
        .receive_delivery(Delivery::new("t1", "new").in_transaction(txn))
        .await
        .expect("delivered");
    assert!(harness.dispositions.try_recv().is_err());
    assert_eq!(orders_depth(&harness), 0);

    harness.transactions.commit(txn).await.expect("committed");

    let disposition = harness.dispositions.try_recv().expect("disposition after commit");
    assert!(disposition.settled);
    assert_eq!(
        disposition.state,
        Some(DeliveryState::Transactional {
            txn_id: txn,
            outcome: Some(Outcome::Accepted),
        })
    );
    assert_eq!(orders_depth(&harness), 1);
}

#[tokio::test]
async fn rollback_discards_enqueue_but_still_settles() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;
    let txn = harness.transactions.begin();

    harness
        .link
        .receive_delivery(Delivery::new("t1", "new").in_transaction(txn))
        .await
        .expect("delivered");
    harness.transactions.rollback(txn).await.expect("rolled back");

    let disposition = harness.dispositions.try_recv().expect("disposition after rollback");
    assert!(disposition.settled);
    assert_eq!(orders_depth(&harness), 0);
}

#[tokio::test]
async fn unsupported_outcome_marks_transaction_rollback_only() {
    let source = Source {
        outcomes: Some(vec![OutcomeKind::Accepted]),
        default_outcome: Some(OutcomeKind::Accepted),
        ..Source::default()
    };
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        source,
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;
    let txn = harness.transactions.begin();

    harness
        .link
        .receive_delivery(Delivery::new("t1", "unbound-key").in_transaction(txn))
        .await
        .expect("delivery processed");
    assert!(harness.dispositions.try_recv().is_err());

    let err = harness
        .transactions
        .commit(txn)
        .await
        .expect_err("rollback-only");
    assert_eq!(err, TransactionError::RolledBack(txn));

    let disposition = harness.dispositions.try_recv().expect("disposition after rollback");
    assert!(disposition.settled);
    assert_eq!(disposition.state, None);
}

#[tokio::test]
async fn unknown_transaction_fails_the_delivery_only() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;
    let unknown = harness.transactions.begin();
    harness.transactions.rollback(unknown).await.expect("rolled back");

    let err = harness
        .link
        .receive_delivery(Delivery::new("t1", "new").in_transaction(unknown))
        .await
        .expect_err("unknown transaction");

    assert!(matches!(
        err,
        LinkError::Delivery(ProtocolError {
            condition: ErrorCondition::UnknownTransaction,
            ..
        })
    ));
    assert!(!err.is_fatal());
    assert_eq!(harness.last_message_references(), 0);

    harness
        .link
        .receive_delivery(Delivery::new("t2", "new"))
        .await
        .expect("link still usable");
}

#[tokio::test]
async fn persistent_message_on_transient_store_is_rejected() {
    let source = Source {
        outcomes: Some(vec![OutcomeKind::Accepted, OutcomeKind::Rejected]),
        ..Source::default()
    };
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        source,
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;

    harness
        .link
        .receive_delivery(Delivery::new("t1", "!|new"))
        .await
        .expect("settled with rejection");

    let disposition = harness.dispositions.try_recv().expect("disposition");
    assert!(disposition.settled);
    assert!(matches!(
        disposition.state,
        Some(DeliveryState::Outcome(Outcome::Rejected(Some(ProtocolError {
            condition: ErrorCondition::PreconditionFailed,
            ..
        }))))
    ));
    assert_eq!(orders_depth(&harness), 0);
    assert_eq!(harness.last_message_references(), 0);
}

#[tokio::test]
async fn persistent_message_without_rejected_outcome_fails_delivery() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;

    let err = harness
        .link
        .receive_delivery(Delivery::new("t1", "!|new"))
        .await
        .expect_err("store cannot take durable message");

    assert!(matches!(
        err,
        LinkError::Delivery(ProtocolError {
            condition: ErrorCondition::PreconditionFailed,
            ..
        })
    ));
    assert_eq!(harness.last_message_references(), 0);
}

#[tokio::test]
async fn store_failure_leaves_every_queue_untouched() {
    let mut harness = harness(
        Arc::new(FailingStore {
            failing_queue: "audit",
        }),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;
    harness
        .registry
        .create_queue(QueueDeclaration::new("audit").durable(true))
        .await
        .expect("queue created");
    harness
        .registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "audit", "new", BindingArguments::new(), false)
        .await
        .expect("bound");

    let err = harness
        .link
        .receive_delivery(Delivery::new("t1", "!|new"))
        .await
        .expect_err("store refused the audit copy");

    assert!(matches!(
        err,
        LinkError::Delivery(ProtocolError {
            condition: ErrorCondition::InternalError,
            ..
        })
    ));
    assert_eq!(orders_depth(&harness), 0);
    assert_eq!(harness.registry.queue("audit").expect("audit").depth(), 0);
    assert_eq!(harness.last_message_references(), 0);
    assert!(harness.dispositions.try_recv().is_err());
}

#[tokio::test]
async fn persistent_message_is_stored_on_durable_queue() {
    let store = Arc::new(InMemoryMessageStore::with_persistence(true));
    let mut harness = harness(store.clone(), Source::default(), Some("orders")).await;

    harness
        .link
        .receive_delivery(Delivery::new("t1", "!|new"))
        .await
        .expect("delivered");

    let records = store.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].queue, "orders");
    assert_eq!(orders_depth(&harness), 1);
    assert_eq!(harness.last_message_references(), 1);
}

#[tokio::test]
async fn unknown_message_format_is_not_implemented() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;

    let err = harness
        .link
        .receive_delivery(Delivery::new("t1", "new").with_format(42))
        .await
        .expect_err("unknown format");

    assert!(matches!(
        err,
        LinkError::Delivery(ProtocolError {
            condition: ErrorCondition::NotImplemented,
            ..
        })
    ));
}

#[tokio::test]
async fn mismatched_user_id_is_not_allowed() {
    let mut harness = harness(
        Arc::new(InMemoryMessageStore::new()),
        Source::default(),
        Some(DEFAULT_DIRECT_EXCHANGE),
    )
    .await;

    let err = harness
        .link
        .receive_delivery(Delivery::new("t1", "~|new"))
        .await
        .expect_err("user id does not match the connection");

    assert!(matches!(
        err,
        LinkError::Delivery(ProtocolError {
            condition: ErrorCondition::NotAllowed,
            ..
        })
    ));
    assert_eq!(orders_depth(&harness), 0);
    assert_eq!(harness.last_message_references(), 0);
    assert!(harness.dispositions.try_recv().is_err());
}

#[tokio::test]
async fn anonymous_relay_routes_by_message_address() {
    let mut harness = harness(Arc::new(InMemoryMessageStore::new()), Source::default(), None).await;
    assert!(harness.link.destination().is_some());

    harness
        .link
        .receive_delivery(Delivery::new("t1", "orders|ignored"))
        .await
        .expect("relayed to queue");
    harness
        .link
        .receive_delivery(Delivery::new("t2", "amq.direct/new|"))
        .await
        .expect("relayed through exchange");

    assert_eq!(orders_depth(&harness), 2);
    for _ in 0..2 {
        let disposition = harness.dispositions.try_recv().expect("disposition");
        assert_eq!(disposition.state, Some(DeliveryState::Outcome(Outcome::Accepted)));
    }
}

#[tokio::test]
async fn dynamic_target_creates_a_node() {
    let registry = Arc::new(DestinationRegistry::new(VirtualHostSettings::default()));
    let (sink, _dispositions) = ChannelDispositionSink::new();
    let context = LinkContext {
        settings: LinkSettings::default(),
        resolver: registry.clone(),
        transactions: Arc::new(TransactionCoordinator::new(Arc::new(
            InMemoryMessageStore::new(),
        ))),
        authorizer: Arc::new(ConnectionPrincipal::new("guest", false)),
        formats: Arc::new(MessageFormatRegistry::new()),
        statistics: Arc::new(ConnectionStatistics::new()),
        session: Arc::new(SessionState::new()),
        dispositions: Arc::new(sink),
    };
    let mut link = ReceivingLinkEndpoint::new("reply", context);
    let target = Target {
        dynamic: true,
        ..Target::default()
    };

    link.attach(Attach::to_target("reply", target))
        .await
        .expect("attached");

    let address = link
        .target()
        .and_then(|target| target.address.clone())
        .expect("dynamic address assigned");
    let node = registry.lookup(&address).expect("node created");
    assert_eq!(node.publishing_links().len(), 1);

    link.destroy().await;
    assert!(registry.lookup(&address).is_none());
}
