use hashbrown::HashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Subscriber, TopicKey};

/// The hub-side half of a subscriber. Only the hub holds the sender, so
/// dropping the entry is what ends the reader's delivery channel.
pub(crate) struct Entry<E> {
    pub(crate) tx: mpsc::Sender<E>,
    pub(crate) excluded_actor: Option<String>,
    pub(crate) scope: CancellationToken,
}

impl<E> Entry<E> {
    /// Returns true if this subscriber asked not to see events caused by
    /// `actor`.
    pub(crate) fn excludes(&self, actor: Option<&str>) -> bool {
        match (&self.excluded_actor, actor) {
            (Some(excluded), Some(actor)) => excluded == actor,
            _ => false,
        }
    }
}

/// Maps a topic key to the subscribers currently listening on it. Empty topics
/// are dropped as soon as their last subscriber leaves.
pub struct TopicRegistry<E> {
    topics: HashMap<TopicKey, HashMap<u64, Entry<E>>>,
}

impl<E> TopicRegistry<E> {
    pub fn new() -> Self {
        Self {
            topics: HashMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, subscriber: &Subscriber, entry: Entry<E>) {
        self.topics
            .entry(subscriber.topic.clone())
            .or_insert_with(HashMap::new)
            .insert(subscriber.id, entry);
    }

    pub(crate) fn remove(&mut self, subscriber: &Subscriber) -> Option<Entry<E>> {
        let subscribers = self.topics.get_mut(&subscriber.topic)?;
        let entry = subscribers.remove(&subscriber.id);
        if subscribers.is_empty() {
            self.topics.remove(&subscriber.topic);
        }
        entry
    }

    pub(crate) fn subscribers<'a>(
        &'a self,
        topic: &str,
    ) -> impl Iterator<Item = &'a Entry<E>> + 'a {
        self.topics
            .get(topic)
            .into_iter()
            .flat_map(|subscribers| subscribers.values())
    }

    /// Number of subscribers registered under `topic`.
    pub fn topic_len(&self, topic: &str) -> usize {
        self.topics.get(topic).map_or(0, |s| s.len())
    }

    /// Number of topics with at least one subscriber.
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }
}

impl<E> Default for TopicRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}
