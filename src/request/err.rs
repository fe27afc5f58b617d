use std::fmt;
use warp::http::StatusCode;

/// Why a request (or a control-frame subscribe) was refused.
///
/// Auth failures carry their message to the client; list and stream failures
/// all collapse to a plain 404 so a rejected list is indistinguishable from a
/// missing one.
#[derive(Debug)]
pub enum Error {
    MissingToken,
    InvalidToken,
    InsufficientScope,
    ListNotAuthorized(i64),
    UnknownStream(String),
    MissingTag,
    Upstream,
    PgPool(r2d2::Error),
    Pg(postgres::Error),
    Blocking,
}

impl Error {
    pub(crate) fn status(&self) -> StatusCode {
        use Error::*;
        match self {
            MissingToken | InvalidToken | InsufficientScope => StatusCode::UNAUTHORIZED,
            ListNotAuthorized(_) | UnknownStream(_) | MissingTag => StatusCode::NOT_FOUND,
            Upstream | PgPool(_) | Pg(_) | Blocking => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The client-facing message; internal detail stays in the logs.
    pub(crate) fn msg(&self) -> &'static str {
        use Error::*;
        match self {
            MissingToken => "Missing access token",
            InvalidToken => "Invalid access token",
            InsufficientScope => "Access token does not cover the required scopes",
            ListNotAuthorized(_) | UnknownStream(_) | MissingTag => "Not found",
            Upstream | PgPool(_) | Pg(_) | Blocking => "An unexpected error occurred",
        }
    }
}

impl std::error::Error for Error {}
impl warp::reject::Reject for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use Error::*;
        match self {
            MissingToken => write!(f, "Missing access token"),
            InvalidToken => write!(f, "Invalid access token"),
            InsufficientScope => write!(f, "Access token does not cover the required scopes"),
            ListNotAuthorized(id) => write!(f, "Not authorized to stream list {}", id),
            UnknownStream(name) => write!(f, "Unknown stream type: {}", name),
            MissingTag => write!(f, "A hashtag stream needs a `tag` parameter"),
            Upstream => write!(f, "The upstream message bus is unavailable"),
            PgPool(e) => write!(f, "could not get a database connection: {}", e),
            Pg(e) => write!(f, "database query failed: {}", e),
            Blocking => write!(f, "a database worker disappeared mid-query"),
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(e: r2d2::Error) -> Self {
        Self::PgPool(e)
    }
}

impl From<postgres::Error> for Error {
    fn from(e: postgres::Error) -> Self {
        Self::Pg(e)
    }
}
