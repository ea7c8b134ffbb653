//! Opaque pagination cursors.
//!
//! A cursor is `id,timestamp` with the timestamp in RFC 3339 at nanosecond
//! precision, encoded as URL-safe base64 so it can be placed in a query string
//! as is. The codec makes no claim about the id; callers validate it, but an
//! id containing the separator does not decode.

use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};

use super::{
    error::{Error, Result},
    model::{Comment, FeedItem, Notification, Post},
};

const SEPARATOR: char = ',';

pub fn encode_cursor(id: &str, timestamp: DateTime<Utc>) -> String {
    let raw = format!(
        "{id}{SEPARATOR}{}",
        timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    URL_SAFE.encode(raw)
}

pub fn decode_cursor(token: &str) -> Result<(String, DateTime<Utc>)> {
    let bytes = URL_SAFE
        .decode(token)
        .map_err(|e| Error::MalformedCursor(format!("could not decode: {e}")))?;
    let raw = String::from_utf8(bytes)
        .map_err(|_| Error::MalformedCursor("not utf-8".into()))?;

    let mut parts = raw.split(SEPARATOR);
    let (id, timestamp) = match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(timestamp), None) => (id, timestamp),
        _ => {
            return Err(Error::MalformedCursor(
                "expected an id and a timestamp".into(),
            ))
        }
    };
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| {
            Error::MalformedCursor(format!("could not parse timestamp: {e}"))
        })?
        .with_timezone(&Utc);

    Ok((id.to_string(), timestamp))
}

/// Something that can resume backward pagination after itself.
pub trait Cursor {
    fn cursor_id(&self) -> &str;
    fn cursor_timestamp(&self) -> DateTime<Utc>;

    fn cursor(&self) -> String {
        encode_cursor(self.cursor_id(), self.cursor_timestamp())
    }
}

/// The cursor of the last item of a page, or `None` for an empty page.
pub fn end_cursor<T: Cursor>(page: &[T]) -> Option<String> {
    page.last().map(Cursor::cursor)
}

impl Cursor for Post {
    fn cursor_id(&self) -> &str {
        &self.id
    }

    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

// feed pages are ordered by their post, not by when the entry was created
impl Cursor for FeedItem {
    fn cursor_id(&self) -> &str {
        &self.post.id
    }

    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.post.created_at
    }
}

impl Cursor for Comment {
    fn cursor_id(&self) -> &str {
        &self.id
    }

    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Cursor for Notification {
    fn cursor_id(&self) -> &str {
        &self.id
    }

    fn cursor_timestamp(&self) -> DateTime<Utc> {
        self.issued_at
    }
}
