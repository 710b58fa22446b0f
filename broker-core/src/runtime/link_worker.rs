//! Per-link worker: serializes every operation on one receiving link through a command queue.

use crate::data_plane::delivery::{Delivery, DeliveryTag};
use crate::data_plane::link_endpoint::{DetachOutcome, LinkState, ReceivingLinkEndpoint};
use crate::data_plane::terminus::{Attach, Detach};
use crate::error::LinkError;
use crate::observability::events;
use crate::runtime::worker_runtime::spawn_worker_loop;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

const COMPONENT: &str = "link_worker";

enum LinkCommand {
    Attach(Attach, oneshot::Sender<Result<(), LinkError>>),
    Start(oneshot::Sender<Result<u32, LinkError>>),
    Transfer(Delivery, oneshot::Sender<Result<(), LinkError>>),
    Disposition(DeliveryTag, bool),
    Detach(Option<Detach>, oneshot::Sender<DetachOutcome>),
}

/// Cloneable handle to a link worker.
#[derive(Clone)]
pub struct LinkHandle {
    name: Arc<str>,
    sender: mpsc::Sender<LinkCommand>,
    detaching: Arc<AtomicBool>,
}

impl LinkHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn attach(&self, attach: Attach) -> Result<(), LinkError> {
        let (reply, response) = oneshot::channel();
        self.send(LinkCommand::Attach(attach, reply)).await?;
        self.reply(response).await?
    }

    pub async fn start(&self) -> Result<u32, LinkError> {
        let (reply, response) = oneshot::channel();
        self.send(LinkCommand::Start(reply)).await?;
        self.reply(response).await?
    }

    /// Queues a transfer. Refused once a detach has been requested.
    pub async fn transfer(&self, delivery: Delivery) -> Result<(), LinkError> {
        if self.detaching.load(Ordering::Acquire) {
            return Err(LinkError::NotAttached {
                link: self.name.to_string(),
                state: LinkState::Detaching,
            });
        }
        let (reply, response) = oneshot::channel();
        self.send(LinkCommand::Transfer(delivery, reply)).await?;
        self.reply(response).await?
    }

    pub async fn disposition(&self, tag: DeliveryTag, settled: bool) -> Result<(), LinkError> {
        self.send(LinkCommand::Disposition(tag, settled)).await
    }

    /// Detaches the link. Transfers queued before this call are still processed.
    pub async fn detach(&self, detach: Option<Detach>) -> Result<DetachOutcome, LinkError> {
        self.detaching.store(true, Ordering::Release);
        let (reply, response) = oneshot::channel();
        self.send(LinkCommand::Detach(detach, reply)).await?;
        self.reply(response).await
    }

    async fn send(&self, command: LinkCommand) -> Result<(), LinkError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| LinkError::WorkerStopped(self.name.to_string()))
    }

    async fn reply<T>(&self, response: oneshot::Receiver<T>) -> Result<T, LinkError> {
        response
            .await
            .map_err(|_| LinkError::WorkerStopped(self.name.to_string()))
    }
}

/// Moves `endpoint` onto its own worker and returns the handle that drives it.
pub fn spawn_link_worker(
    endpoint: ReceivingLinkEndpoint,
    queue_size: usize,
) -> io::Result<LinkHandle> {
    let name: Arc<str> = Arc::from(endpoint.name());
    let (sender, receiver) = mpsc::channel(queue_size.max(1));
    let detaching = Arc::new(AtomicBool::new(false));

    let worker_detaching = detaching.clone();
    spawn_worker_loop(name.to_string(), move || {
        run_link_loop(endpoint, receiver, worker_detaching)
    })?;

    Ok(LinkHandle {
        name,
        sender,
        detaching,
    })
}

async fn run_link_loop(
    mut endpoint: ReceivingLinkEndpoint,
    mut receiver: mpsc::Receiver<LinkCommand>,
    detaching: Arc<AtomicBool>,
) {
    info!(
        event = events::WORKER_STARTED,
        component = COMPONENT,
        link = %endpoint.name(),
        "link worker started"
    );
    while let Some(command) = receiver.recv().await {
        match command {
            LinkCommand::Attach(attach, reply) => {
                let _ = reply.send(endpoint.attach(attach).await);
            }
            LinkCommand::Start(reply) => {
                let _ = reply.send(endpoint.start());
            }
            LinkCommand::Transfer(delivery, reply) => {
                let _ = reply.send(endpoint.receive_delivery(delivery).await);
            }
            LinkCommand::Disposition(tag, settled) => {
                endpoint.receive_disposition(&tag, settled);
            }
            LinkCommand::Detach(detach, reply) => {
                let outcome = endpoint.remote_detached(detach.as_ref()).await;
                let _ = reply.send(outcome);
                if outcome != DetachOutcome::Suspended {
                    break;
                }
                debug!(
                    event = events::LINK_SUSPENDED,
                    component = COMPONENT,
                    link = %endpoint.name(),
                    "link worker kept for resume"
                );
                detaching.store(false, Ordering::Release);
            }
        }
    }
    if endpoint.state() != LinkState::Detached {
        endpoint.destroy().await;
    }
    info!(
        event = events::WORKER_STOPPED,
        component = COMPONENT,
        link = %endpoint.name(),
        "link worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::security::ConnectionPrincipal;
    use crate::api::session::SessionState;
    use crate::api::statistics::ConnectionStatistics;
    use crate::api::store::InMemoryMessageStore;
    use crate::config::{LinkSettings, VirtualHostSettings};
    use crate::control_plane::registry::{DestinationRegistry, QueueDeclaration};
    use crate::data_plane::delivery::AMQP_MESSAGE_FORMAT;
    use crate::data_plane::format::{MessageDecoder, MessageFormatRegistry};
    use crate::data_plane::link_endpoint::LinkContext;
    use crate::data_plane::settlement::ChannelDispositionSink;
    use crate::data_plane::terminus::Target;
    use crate::error::ProtocolError;
    use crate::message::Message;
    use crate::transaction::TransactionCoordinator;
    use bytes::Bytes;

    struct RawDecoder;

    impl MessageDecoder for RawDecoder {
        fn decode(&self, payload: &Bytes) -> Result<Message, ProtocolError> {
            Ok(Message::builder().payload(payload.clone()).build())
        }
    }

    async fn spawn_inbox_link() -> (Arc<DestinationRegistry>, LinkHandle) {
        let registry = Arc::new(DestinationRegistry::new(VirtualHostSettings::default()));
        registry
            .create_queue(QueueDeclaration::new("inbox"))
            .await
            .expect("queue created");
        let (sink, _dispositions) = ChannelDispositionSink::new();
        let context = LinkContext {
            settings: LinkSettings::default(),
            resolver: registry.clone(),
            transactions: Arc::new(TransactionCoordinator::new(Arc::new(
                InMemoryMessageStore::new(),
            ))),
            authorizer: Arc::new(ConnectionPrincipal::new("guest", false)),
            formats: Arc::new(
                MessageFormatRegistry::new()
                    .with_decoder(AMQP_MESSAGE_FORMAT, Arc::new(RawDecoder)),
            ),
            statistics: Arc::new(ConnectionStatistics::new()),
            session: Arc::new(SessionState::new()),
            dispositions: Arc::new(sink),
        };
        let handle = spawn_link_worker(ReceivingLinkEndpoint::new("publisher", context), 8)
            .expect("worker spawned");
        handle
            .attach(Attach::to_target("publisher", Target::new("inbox")))
            .await
            .expect("attached");
        (registry, handle)
    }

    #[tokio::test]
    async fn worker_processes_transfers_in_order() {
        let (registry, handle) = spawn_inbox_link().await;

        for tag in ["t1", "t2", "t3"] {
            handle
                .transfer(Delivery::new(tag, "payload"))
                .await
                .expect("transfer processed");
        }

        assert_eq!(registry.queue("inbox").expect("inbox").depth(), 3);
    }

    #[tokio::test]
    async fn transfers_after_detach_are_refused() {
        let (_registry, handle) = spawn_inbox_link().await;

        let outcome = handle
            .detach(Some(Detach::default()))
            .await
            .expect("detached");
        assert_eq!(outcome, DetachOutcome::Destroyed);

        let err = handle
            .transfer(Delivery::new("late", "payload"))
            .await
            .expect_err("refused after detach");
        assert!(matches!(
            err,
            LinkError::NotAttached {
                state: LinkState::Detaching,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn stopped_worker_is_reported() {
        let (_registry, handle) = spawn_inbox_link().await;
        handle
            .detach(Some(Detach {
                closed: true,
                error: None,
            }))
            .await
            .expect("closed");

        let err = handle.start().await.expect_err("worker gone");
        assert!(matches!(err, LinkError::WorkerStopped(_)));
    }
}
