use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, trace, warn, Instrument};

use super::{
    registry::{Entry, TopicRegistry},
    Event, EventStream, Publisher, Subscriber, TopicKey,
};
use crate::social::config::DeliveryMode;

enum Command<E> {
    Subscribe(Subscriber, Entry<E>),
    Unsubscribe(Subscriber),
    Publish(E),
}

/// A handle onto one event kind's hub.
///
/// Every operation is a non-blocking handoff onto the hub's queue. The queue
/// is drained by a single task that exclusively owns the [`TopicRegistry`],
/// so subscribes, unsubscribes and publishes are applied one at a time in the
/// order they were enqueued.
///
/// Can be cloned to obtain another handle to the same hub.
pub struct EventHub<E: Event> {
    commands: mpsc::UnboundedSender<Command<E>>,
    next_id: Arc<AtomicU64>,
    buffer: usize,
    kind: &'static str,
}

impl<E: Event> Clone for EventHub<E> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            next_id: self.next_id.clone(),
            buffer: self.buffer,
            kind: self.kind,
        }
    }
}

impl<E: Event> EventHub<E> {
    /// Starts the hub loop for one event kind. `buffer` is the capacity of
    /// each subscriber's delivery channel.
    pub fn spawn(kind: &'static str, delivery: DeliveryMode, buffer: usize) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let span = debug_span!("hub", kind);
        tokio::spawn(Self::listen(commands_rx, delivery).instrument(span));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            buffer: buffer.max(1),
            kind,
        }
    }

    /// Registers a new subscriber under `topic`. The subscriber is visible to
    /// every publish enqueued after this call returns.
    ///
    /// `scope` is the sole authoritative signal that the reader has gone away;
    /// the caller must still [`unsubscribe`](Self::unsubscribe) once it fires.
    pub fn subscribe(
        &self,
        topic: impl Into<TopicKey>,
        excluded_actor: Option<String>,
        scope: CancellationToken,
    ) -> (Subscriber, mpsc::Receiver<E>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let subscriber = Subscriber::new(id, topic.into());
        let (tx, rx) = mpsc::channel(self.buffer);
        let entry = Entry {
            tx,
            excluded_actor,
            scope,
        };
        self.send(Command::Subscribe(subscriber.clone(), entry));
        (subscriber, rx)
    }

    /// Removes the subscriber and ends its delivery channel. Unsubscribing
    /// twice is a no-op.
    pub fn unsubscribe(&self, subscriber: &Subscriber) {
        self.send(Command::Unsubscribe(subscriber.clone()));
    }

    /// Hands the event to the hub for delivery to its topic's subscribers
    /// and returns immediately.
    pub fn publish(&self, event: E) {
        self.send(Command::Publish(event));
    }

    /// Subscribes and returns the subscription as a stream. The stream is
    /// unsubscribed when `scope` is cancelled or the stream is dropped,
    /// whichever comes first.
    pub fn stream(
        &self,
        topic: impl Into<TopicKey>,
        excluded_actor: Option<String>,
        scope: &CancellationToken,
    ) -> EventStream<E> {
        let scope = scope.child_token();
        let (subscriber, rx) =
            self.subscribe(topic, excluded_actor, scope.clone());

        let hub = self.clone();
        let watched = subscriber.clone();
        let watch_scope = scope.clone();
        tokio::spawn(async move {
            watch_scope.cancelled().await;
            hub.unsubscribe(&watched);
        });

        EventStream::new(subscriber, rx, scope)
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    fn send(&self, command: Command<E>) {
        if self.commands.send(command).is_err() {
            warn!(kind = self.kind, "hub loop is not running");
        }
    }

    /// Runs until every handle to the hub has been dropped.
    async fn listen(
        mut commands_rx: mpsc::UnboundedReceiver<Command<E>>,
        delivery: DeliveryMode,
    ) {
        debug!("hub started");
        let mut registry = TopicRegistry::new();
        while let Some(command) = commands_rx.recv().await {
            match command {
                Command::Subscribe(subscriber, entry) => {
                    debug!(
                        topic = %subscriber.topic(),
                        id = subscriber.id(),
                        "subscriber registered"
                    );
                    registry.insert(&subscriber, entry);
                }
                Command::Unsubscribe(subscriber) => {
                    // dropping the entry drops the only sender, which ends
                    // the reader's channel
                    match registry.remove(&subscriber) {
                        Some(_) => debug!(
                            topic = %subscriber.topic(),
                            id = subscriber.id(),
                            "subscriber removed"
                        ),
                        None => trace!(
                            id = subscriber.id(),
                            "subscriber already removed"
                        ),
                    }
                }
                Command::Publish(event) => {
                    let topic = event.topic();
                    let actor = event.actor();
                    for entry in registry.subscribers(&topic) {
                        if entry.excludes(actor) {
                            continue;
                        }
                        if Self::deliver(entry, event.clone(), delivery).await {
                            trace!(topic = %topic, "delivered event");
                        } else {
                            trace!(topic = %topic, "dropped event for gone subscriber");
                        }
                    }
                }
            }
        }
        debug!("hub stopped");
    }

    /// Hands one event to one subscriber. In blocking mode this waits until
    /// the subscriber accepts it or its scope is cancelled, so a stalled
    /// reader holds up the remaining subscribers of the same event.
    async fn deliver(entry: &Entry<E>, event: E, delivery: DeliveryMode) -> bool {
        if entry.scope.is_cancelled() {
            return false;
        }
        match delivery {
            DeliveryMode::Blocking => select! {
                biased;
                _ = entry.scope.cancelled() => false,
                sent = entry.tx.send(event) => sent.is_ok(),
            },
            DeliveryMode::DropIfFull => entry.tx.try_send(event).is_ok(),
        }
    }
}

impl<E: Event> Publisher<E> for EventHub<E> {
    fn publish(&self, event: E) {
        EventHub::publish(self, event)
    }
}
