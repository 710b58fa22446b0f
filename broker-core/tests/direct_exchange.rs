use broker_core::{
    BindingArguments, DeleteOptions, Destination, DestinationRegistry, ExchangeDeclaration,
    ExchangeType, InstanceProperties, Message, QueueDeclaration, TopologyError,
    VirtualHostSettings, DEFAULT_DIRECT_EXCHANGE, JMS_SELECTOR_ARGUMENT,
    REPLACEMENT_ROUTING_KEY_ARGUMENT,
};

async fn registry_with_queues(names: &[&str]) -> DestinationRegistry {
    let registry = DestinationRegistry::new(VirtualHostSettings::default());
    for name in names {
        registry
            .create_queue(QueueDeclaration::new(*name))
            .await
            .expect("queue created");
    }
    registry
}

fn route(registry: &DestinationRegistry, exchange: &str, message: &Message, key: &str) -> usize {
    registry
        .exchange(exchange)
        .expect("exchange exists")
        .route(message, key, &InstanceProperties::default())
        .number_of_routes()
}

#[tokio::test]
async fn bind_then_unbind_controls_routing() {
    let registry = registry_with_queues(&["q"]).await;
    let message = Message::builder().build();

    registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "key", BindingArguments::new(), false)
        .await
        .expect("bound");
    assert_eq!(route(&registry, DEFAULT_DIRECT_EXCHANGE, &message, "key"), 1);

    assert!(registry
        .unbind(DEFAULT_DIRECT_EXCHANGE, "q", "key")
        .await
        .expect("unbound"));
    assert_eq!(route(&registry, DEFAULT_DIRECT_EXCHANGE, &message, "key"), 0);
}

#[tokio::test]
async fn selector_binding_counts_alongside_plain_binding() {
    let registry = registry_with_queues(&["q1", "q2"]).await;
    let message = Message::builder().build();

    registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q1", "key", BindingArguments::new(), false)
        .await
        .expect("bound");
    registry
        .bind(
            DEFAULT_DIRECT_EXCHANGE,
            "q2",
            "key",
            BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "prop is null"),
            false,
        )
        .await
        .expect("bound with selector");
    assert_eq!(route(&registry, DEFAULT_DIRECT_EXCHANGE, &message, "key"), 2);

    registry
        .unbind(DEFAULT_DIRECT_EXCHANGE, "q1", "key")
        .await
        .expect("unbound");
    assert_eq!(route(&registry, DEFAULT_DIRECT_EXCHANGE, &message, "key"), 1);

    let with_prop = Message::builder().header("prop", "set").build();
    assert_eq!(route(&registry, DEFAULT_DIRECT_EXCHANGE, &with_prop, "key"), 0);
}

#[tokio::test]
async fn rebinding_without_replace_keeps_original_arguments() {
    let registry = registry_with_queues(&["q"]).await;
    let original = BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "a = 1");
    let updated = BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "a = 2");

    assert!(registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "key", original.clone(), false)
        .await
        .expect("bound"));
    assert!(!registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "key", updated.clone(), false)
        .await
        .expect("refused without replace"));

    let exchange = registry.exchange(DEFAULT_DIRECT_EXCHANGE).expect("exchange");
    let queue = registry.lookup("q").expect("queue");
    assert!(exchange.is_bound_with_arguments("key", &original, &queue));

    assert!(registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "key", updated.clone(), true)
        .await
        .expect("replaced"));
    assert!(exchange.is_bound_with_arguments("key", &updated, &queue));
    assert_eq!(exchange.binding_count(), 1);
}

#[tokio::test]
async fn invalid_selector_is_a_configuration_error() {
    let registry = registry_with_queues(&["q"]).await;

    let err = registry
        .bind(
            DEFAULT_DIRECT_EXCHANGE,
            "q",
            "key",
            BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "a = = 1"),
            false,
        )
        .await
        .expect_err("invalid selector");

    assert!(matches!(err, TopologyError::Configuration(_)));
    assert!(!registry
        .exchange(DEFAULT_DIRECT_EXCHANGE)
        .expect("exchange")
        .has_bindings());
}

#[tokio::test]
async fn reserved_names_cannot_be_recreated() {
    let registry = DestinationRegistry::new(VirtualHostSettings::default());
    let original = registry.lookup(DEFAULT_DIRECT_EXCHANGE).expect("system exchange");

    let err = registry
        .create_exchange(ExchangeDeclaration::new(DEFAULT_DIRECT_EXCHANGE))
        .await
        .expect_err("reserved name");
    assert!(matches!(err, TopologyError::Configuration(_)));

    let by_name = registry.lookup(DEFAULT_DIRECT_EXCHANGE).expect("still present");
    let by_id = registry.lookup_by_id(original.id()).expect("still present");
    assert_eq!(by_name, original);
    assert_eq!(by_id, original);

    let err = registry
        .delete(DEFAULT_DIRECT_EXCHANGE, DeleteOptions::default())
        .await
        .expect_err("system exchange");
    assert!(matches!(err, TopologyError::Resource(_)));
}

#[tokio::test]
async fn alternate_in_use_blocks_delete_until_forced() {
    let registry = registry_with_queues(&["dead-letters"]).await;
    let events = registry
        .create_exchange(ExchangeDeclaration::new("events").alternate("dead-letters"))
        .await
        .expect("exchange created");

    let err = registry
        .delete("dead-letters", DeleteOptions::default())
        .await
        .expect_err("in use as alternate");
    assert!(matches!(err, TopologyError::Resource(_)));
    assert!(registry.lookup("dead-letters").is_some());

    registry
        .delete("dead-letters", DeleteOptions { force: true })
        .await
        .expect("forced delete");
    assert!(registry.lookup("dead-letters").is_none());
    assert_eq!(Destination::Exchange(events).alternate_name(), None);
}

#[tokio::test]
async fn alternates_are_validated() {
    let registry = registry_with_queues(&["transient"]).await;

    let missing = registry
        .create_exchange(ExchangeDeclaration::new("a").alternate("nowhere"))
        .await
        .expect_err("missing alternate");
    assert!(matches!(missing, TopologyError::Configuration(_)));

    let durable_to_transient = registry
        .create_exchange(
            ExchangeDeclaration::new("b")
                .durable(true)
                .alternate("transient"),
        )
        .await
        .expect_err("durable exchange with non-durable alternate");
    assert!(matches!(durable_to_transient, TopologyError::Configuration(_)));

    registry
        .create_exchange(ExchangeDeclaration::new("c"))
        .await
        .expect("exchange created");
    let itself = registry
        .set_alternate("c", Some("c"))
        .await
        .expect_err("self alternate");
    assert!(matches!(itself, TopologyError::Configuration(_)));
}

#[tokio::test]
async fn unroutable_messages_fall_back_to_alternate() {
    let registry = registry_with_queues(&["orders", "unrouted"]).await;
    registry
        .create_exchange(ExchangeDeclaration::new("shop").alternate("unrouted"))
        .await
        .expect("exchange created");
    registry
        .bind("shop", "orders", "order", BindingArguments::new(), false)
        .await
        .expect("bound");
    let exchange = registry.exchange("shop").expect("shop");
    let message = Message::builder().build();

    let routed = exchange.route(&message, "order", &InstanceProperties::default());
    assert!(routed.routes_to("orders"));
    assert!(!routed.routes_to("unrouted"));

    let fallback = exchange.route(&message, "refund", &InstanceProperties::default());
    assert!(fallback.routes_to("unrouted"));
    assert_eq!(fallback.number_of_routes(), 1);
}

#[tokio::test]
async fn exchange_chain_applies_replacement_key_and_deduplicates() {
    let registry = registry_with_queues(&["sink"]).await;
    registry
        .create_exchange(ExchangeDeclaration::new("front"))
        .await
        .expect("front");
    registry
        .create_exchange(ExchangeDeclaration::new("back"))
        .await
        .expect("back");
    registry
        .bind(
            "front",
            "back",
            "in",
            BindingArguments::new().with(REPLACEMENT_ROUTING_KEY_ARGUMENT, "out"),
            false,
        )
        .await
        .expect("exchange binding");
    registry
        .bind("front", "sink", "in", BindingArguments::new(), false)
        .await
        .expect("direct binding");
    registry
        .bind("back", "sink", "out", BindingArguments::new(), false)
        .await
        .expect("chained binding");

    let result = registry.exchange("front").expect("front").route(
        &Message::builder().build(),
        "in",
        &InstanceProperties::default(),
    );

    assert_eq!(result.number_of_routes(), 1);
    assert!(result.routes_to("sink"));
}

#[tokio::test]
async fn cyclic_exchange_graph_terminates() {
    let registry = registry_with_queues(&["sink"]).await;
    for name in ["left", "right"] {
        registry
            .create_exchange(ExchangeDeclaration::new(name))
            .await
            .expect("exchange");
    }
    registry
        .bind("left", "right", "loop", BindingArguments::new(), false)
        .await
        .expect("bound");
    registry
        .bind("right", "left", "loop", BindingArguments::new(), false)
        .await
        .expect("bound");
    registry
        .bind("right", "sink", "loop", BindingArguments::new(), false)
        .await
        .expect("bound");

    let result = registry.exchange("left").expect("left").route(
        &Message::builder().build(),
        "loop",
        &InstanceProperties::default(),
    );

    assert_eq!(result.number_of_routes(), 1);
}

#[tokio::test]
async fn deleting_destination_removes_all_its_bindings() {
    let registry = registry_with_queues(&["q"]).await;
    registry
        .create_exchange(ExchangeDeclaration::new("fan").exchange_type(ExchangeType::Fanout))
        .await
        .expect("fanout");
    let arguments = BindingArguments::new().with(JMS_SELECTOR_ARGUMENT, "x > 1");
    registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "k1", arguments.clone(), false)
        .await
        .expect("bound");
    registry
        .bind("fan", "q", "", BindingArguments::new(), false)
        .await
        .expect("bound");
    let queue = registry.lookup("q").expect("queue");
    let direct = registry.exchange(DEFAULT_DIRECT_EXCHANGE).expect("direct");
    let fan = registry.exchange("fan").expect("fan");

    registry
        .delete("q", DeleteOptions::default())
        .await
        .expect("deleted");

    assert!(queue.is_deleted());
    assert!(!direct.is_bound("k1"));
    assert!(!direct.is_destination_bound(&queue));
    assert!(!direct.is_bound_to("k1", &queue));
    assert!(!direct.is_bound_with_arguments("k1", &arguments, &queue));
    assert!(!fan.has_bindings());
    assert!(registry
        .bind(DEFAULT_DIRECT_EXCHANGE, "q", "k1", BindingArguments::new(), false)
        .await
        .is_err());
}
