use std::sync::Mutex;

use super::{
    broker::Publisher,
    model::User,
    store::memory::MemoryStore,
};

/// A publisher that keeps everything it is handed.
pub(crate) struct Recorder<E> {
    events: Mutex<Vec<E>>,
}

impl<E: Clone> Recorder<E> {
    pub(crate) fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn events(&self) -> Vec<E> {
        self.events.lock().unwrap().clone()
    }
}

impl<E: Send> Publisher<E> for Recorder<E> {
    fn publish(&self, event: E) {
        self.events.lock().unwrap().push(event);
    }
}

pub(crate) async fn seeded(names: &[&str]) -> (MemoryStore, Vec<User>) {
    let store = MemoryStore::new();
    let mut users = Vec::new();
    for name in names {
        users.push(store.insert_user(name).await.unwrap());
    }
    (store, users)
}
