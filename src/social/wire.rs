use futures::{Stream, StreamExt};
use serde::Serialize;
use tracing::warn;

use super::error::{Error, Result};

/// Content type of a framed event stream.
pub const CONTENT_TYPE: &str = "text/event-stream; charset=utf-8";

/// Serializes one event as a compact JSON record terminated by a blank line:
///
/// ```text
/// data: {"id":"..","actors":["alice"],..}\n\n
/// ```
///
/// Owner ids are never part of the payload, and neither is pagination state.
pub fn frame<E: Serialize>(event: &E) -> Result<String> {
    let json = serde_json::to_string(event).map_err(|e| {
        Error::Internal(format!("could not serialize event: {e}"))
    })?;
    Ok(format!("data: {json}\n\n"))
}

/// Frames every event of a live stream. Events that fail to serialize are
/// logged and skipped so one bad event never ends the stream.
pub fn framed<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream,
    S::Item: Serialize,
{
    events.filter_map(|event| async move {
        match frame(&event) {
            Ok(record) => Some(record),
            Err(error) => {
                warn!(%error, "dropping unframeable event");
                None
            }
        }
    })
}
