// One hub exists per event kind. A hub is a handle onto a task that owns the
// kind's topic registry; see `hub.rs` for the loop itself. Readers register
// under a topic key (a user id for feed items and notifications, a post id for
// comments) and writers publish fully formed events which the hub routes by
// the key the event derives for itself.

mod hub;
mod registry;
mod stream;

pub use hub::EventHub;
pub use registry::TopicRegistry;
pub use stream::EventStream;

/// Topic keys are opaque; only equality matters.
pub type TopicKey = String;

/// A payload that can be routed through an [`EventHub`].
pub trait Event: Clone + Send + Sync + 'static {
    /// The topic this event is delivered under.
    fn topic(&self) -> TopicKey;

    /// The user who caused this event, if subscribers may ask not to see
    /// their own actions.
    fn actor(&self) -> Option<&str> {
        None
    }
}

/// Anything that accepts events for best-effort delivery. Publishing never
/// waits for delivery and never fails from the publisher's point of view.
pub trait Publisher<E>: Send + Sync {
    fn publish(&self, event: E);
}

/// A registered listener. A subscriber belongs to exactly one topic for its
/// whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscriber {
    id: u64,
    topic: TopicKey,
}

impl Subscriber {
    pub(crate) fn new(id: u64, topic: TopicKey) -> Self {
        Self { id, topic }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
