use thiserror::Error;

use super::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unauthenticated")]
    Unauthenticated,
    #[error("{0}")]
    InvalidArgument(&'static str),
    #[error("{0}")]
    PermissionDenied(&'static str),
    #[error("{0}")]
    NotFound(&'static str),
    #[error("unexpected conflict")]
    Conflict,
    #[error("malformed cursor: {0}")]
    MalformedCursor(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub const INVALID_CONTENT: Error = Error::InvalidArgument("invalid content");
pub const INVALID_SPOILER: Error = Error::InvalidArgument("invalid spoiler");
pub const INVALID_POST_ID: Error = Error::InvalidArgument("invalid post ID");
pub const INVALID_USERNAME: Error = Error::InvalidArgument("invalid username");
pub const INVALID_COMMENT_ID: Error = Error::InvalidArgument("invalid comment ID");
pub const INVALID_NOTIFICATION_ID: Error =
    Error::InvalidArgument("invalid notification ID");
pub const FORBIDDEN_FOLLOW: Error = Error::PermissionDenied("forbidden follow");
pub const POST_NOT_FOUND: Error = Error::NotFound("post not found");
pub const COMMENT_NOT_FOUND: Error = Error::NotFound("comment not found");
pub const USER_NOT_FOUND: Error = Error::NotFound("user not found");
pub const USER_GONE: Error = Error::NotFound("user gone");

impl From<StoreError> for Error {
    /// Foreign-key and missing-row signals carry no domain meaning on their
    /// own, so call sites that can name the missing entity should map them
    /// before falling back to this conversion.
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::UniqueViolation => Error::Conflict,
            StoreError::ForeignKeyViolation => {
                Error::Internal("foreign key violation".into())
            }
            StoreError::NoRows => Error::Internal("no rows".into()),
            StoreError::Backend(message) => Error::Internal(message),
        }
    }
}

impl Error {
    /// Returns true if the error is the caller's fault rather than ours.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Error::Conflict | Error::Internal(_))
    }
}
