//! Validate query parameters with type checking
use serde::de::DeserializeOwned;
use serde::Deserialize;
use warp::filters::BoxedFilter;
use warp::Filter as WarpFilter;

/// The parameters relevant to resolving a stream, pulled out of the query
/// string (or a WebSocket control frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub(crate) access_token: Option<String>,
    pub(crate) stream: String,
    pub(crate) media: bool,
    pub(crate) tag: String,
    pub(crate) list: i64,
}

impl Query {
    pub(crate) async fn update_access_token(
        self,
        token: Option<String>,
    ) -> Result<Self, warp::Rejection> {
        match token {
            Some(token) => Ok(Self {
                access_token: Some(token),
                ..self
            }),
            None => Ok(self),
        }
    }
}

/// Deserialize the query string into one typed parameter struct; a missing
/// or unparseable query falls back to the struct's defaults rather than
/// rejecting the request.
pub(crate) fn optional<T>() -> BoxedFilter<(T,)>
where
    T: DeserializeOwned + Default + Send + 'static,
{
    warp::query().or(warp::any().map(T::default)).unify().boxed()
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Media {
    pub(crate) only_media: String,
}

impl Media {
    pub(crate) fn is_truthy(&self) -> bool {
        self.only_media == "true" || self.only_media == "1"
    }
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Hashtag {
    pub(crate) tag: String,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct List {
    pub(crate) list: i64,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct Auth {
    pub(crate) access_token: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
pub(crate) struct StreamName {
    pub(crate) stream: Option<String>,
}

pub(super) struct OptionalAccessToken;

impl OptionalAccessToken {
    /// SSE clients put the token in an `Authorization: Bearer` header.
    pub(super) fn from_sse_header() -> BoxedFilter<(Option<String>,)> {
        warp::header::optional::<String>("authorization")
            .map(|auth: Option<String>| {
                auth.and_then(|auth| auth.split(' ').nth(1).map(String::from))
            })
            .boxed()
    }

    /// WebSocket clients that cannot set arbitrary headers smuggle the token
    /// through `Sec-WebSocket-Protocol`.
    pub(super) fn from_ws_header() -> BoxedFilter<(Option<String>,)> {
        warp::header::optional::<String>("sec-websocket-protocol").boxed()
    }
}
