use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::Subscriber;

/// A live, unbounded sequence of events for one topic.
///
/// The stream ends once its scope is cancelled and the hub has processed the
/// resulting unsubscribe. Dropping the stream cancels its scope. Streams are
/// not restartable: a new subscription sees no replay of missed events.
pub struct EventStream<E> {
    subscriber: Subscriber,
    rx: mpsc::Receiver<E>,
    scope: CancellationToken,
}

impl<E> EventStream<E> {
    pub(crate) fn new(
        subscriber: Subscriber,
        rx: mpsc::Receiver<E>,
        scope: CancellationToken,
    ) -> Self {
        Self {
            subscriber,
            rx,
            scope,
        }
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Stops the subscription. Events already buffered are still yielded
    /// before the stream ends.
    pub fn close(&self) {
        self.scope.cancel();
    }
}

impl<E> Stream for EventStream<E> {
    type Item = E;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<E> Drop for EventStream<E> {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
