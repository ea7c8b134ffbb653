// Writes and reads never share state directly. Every write commits its row
// first and then hands the follow-up work (feed fan-out, notification merges,
// live echoes) to a post-commit task. Those tasks talk to live readers only
// through one of three hubs, one per event kind, and each hub is a single task
// that exclusively owns its topic registry. Subscribes, unsubscribes and
// publishes are messages on that task's queue, so they are processed in one
// total order without any locking.

// Live delivery is a convenience. A reader that misses an event will find it
// on its next paginated read because the write that produced it has already
// committed by the time the hub sees it.

pub mod broker;
pub mod config;
pub mod cursor;
pub mod error;
pub mod fanout;
pub mod mention;
pub mod model;
pub mod notify;
pub mod service;
pub mod store;
pub mod tasks;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use broker::{EventHub, EventStream, Publisher, Subscriber};
pub use config::Config;
pub use error::{Error, Result};
pub use service::Service;
