//! Parse the client request and return a `Subscription`
pub mod err;
mod postgres;
mod query;
mod subscription;
mod timeline;

pub use err::Error;
pub use postgres::PgPool;
pub use query::Query;
pub use subscription::Subscription;
pub use timeline::{Timeline, UserData};

pub(crate) use subscription::required_scopes;
pub(crate) use timeline::Scope;

use crate::config;
use serde::Serialize;
use warp::filters::BoxedFilter;
use warp::{Filter, Rejection};

#[cfg(test)]
mod sse_test;

type Result<T> = std::result::Result<T, Error>;

/// Path suffix under `/api/v1/streaming` and the stream name it serves.
/// Longer suffixes come before their prefixes so `user/notification` wins
/// over `user`.
const SSE_ENDPOINTS: &[(&[&str], &str)] = &[
    (&["user", "notification"], "user:notification"),
    (&["user"], "user"),
    (&["public", "local"], "public:local"),
    (&["public", "remote"], "public:remote"),
    (&["public"], "public"),
    (&["direct"], "direct"),
    (&["hashtag", "local"], "hashtag:local"),
    (&["hashtag"], "hashtag"),
    (&["list"], "list"),
];

/// `/api/v1/streaming/<suffix...>`, matched exactly.
fn endpoint_path(suffix: &'static [&'static str]) -> BoxedFilter<()> {
    let mut route = warp::path("api")
        .and(warp::path("v1"))
        .and(warp::path("streaming"))
        .boxed();
    for segment in suffix {
        route = route.and(warp::path(*segment)).boxed();
    }
    route.and(warp::path::end()).boxed()
}

/// The query grammar every endpoint shares, bound to one stream name.
fn parse_stream_query(route: BoxedFilter<()>, stream: &'static str) -> BoxedFilter<(Query,)> {
    route
        .and(query::optional::<query::Auth>())
        .and(query::optional::<query::Media>())
        .and(query::optional::<query::Hashtag>())
        .and(query::optional::<query::List>())
        .map(
            move |auth: query::Auth,
                  media: query::Media,
                  hashtag: query::Hashtag,
                  list: query::List| {
                Query {
                    access_token: auth.access_token,
                    stream: stream.to_string(),
                    media: media.is_truthy(),
                    tag: hashtag.tag,
                    list: list.list,
                }
            },
        )
        .boxed()
}

fn parse_sse_request() -> BoxedFilter<(Query,)> {
    SSE_ENDPOINTS
        .iter()
        .map(|&(suffix, stream)| parse_stream_query(endpoint_path(suffix), stream))
        .reduce(|routes, route| routes.or(route).unify().boxed())
        .expect("Guaranteed: the endpoint table is not empty")
        // SSE requests may place their `access_token` in the header instead
        // of a query parameter; the header wins when both are present
        .and(query::OptionalAccessToken::from_sse_header())
        .and_then(Query::update_access_token)
        .boxed()
}

/// Builds the warp filters for every endpoint, holding the database pool and
/// the deployment's auth policy.
#[derive(Clone)]
pub struct Handler {
    pg_pool: PgPool,
    require_auth: bool,
}

impl Handler {
    pub fn new(postgres_cfg: &config::Postgres, require_auth: bool) -> Result<Self> {
        Ok(Self {
            pg_pool: PgPool::new(postgres_cfg)?,
            require_auth,
        })
    }

    pub fn pg_pool(&self) -> PgPool {
        self.pg_pool.clone()
    }

    pub fn sse_subscription(&self) -> BoxedFilter<(Subscription,)> {
        let (pool, require_auth) = (self.pg_pool.clone(), self.require_auth);
        parse_sse_request()
            .and_then(move |q: Query| {
                let pool = pool.clone();
                async move {
                    Subscription::from_query(q, pool, require_auth)
                        .await
                        .map_err(warp::reject::custom)
                }
            })
            .boxed()
    }

    /// Authenticate a WebSocket upgrade.  The stream named in the URL (if
    /// any) sets the scope policy; the subscription itself is resolved after
    /// the upgrade so its failures can be ignored like bad control frames.
    pub fn ws_handshake(&self) -> BoxedFilter<((UserData, Option<Query>),)> {
        let (pool, require_auth) = (self.pg_pool.clone(), self.require_auth);
        endpoint_path(&[])
            .and(query::optional::<query::Auth>())
            .and(query::optional::<query::StreamName>())
            .and(query::optional::<query::Media>())
            .and(query::optional::<query::Hashtag>())
            .and(query::optional::<query::List>())
            .and(query::OptionalAccessToken::from_sse_header())
            .and(query::OptionalAccessToken::from_ws_header())
            .and_then(
                move |auth: query::Auth,
                      stream: query::StreamName,
                      media: query::Media,
                      hashtag: query::Hashtag,
                      list: query::List,
                      bearer_token: Option<String>,
                      protocol_token: Option<String>| {
                    let pool = pool.clone();
                    async move {
                        // token sources, most conventional first
                        let token = bearer_token.or(auth.access_token).or(protocol_token);
                        let q = stream.stream.map(|stream| Query {
                            access_token: token.clone(),
                            stream,
                            media: media.is_truthy(),
                            tag: hashtag.tag,
                            list: list.list,
                        });
                        let scopes = match &q {
                            Some(q) => required_scopes(&q.stream, require_auth),
                            None if require_auth => Some(subscription::USER_SCOPES),
                            None => None,
                        };
                        let user =
                            tokio::task::spawn_blocking(move || pool.select_user(token, scopes))
                                .await
                                .map_err(|_| Error::Blocking)
                                .and_then(|resolved| resolved)
                                .map_err(warp::reject::custom)?;
                        Ok::<_, Rejection>((user, q))
                    }
                },
            )
            .boxed()
    }

    pub fn health(&self) -> BoxedFilter<()> {
        endpoint_path(&["health"])
    }

    /// Turn rejections into the JSON error bodies clients expect.
    pub async fn recover(r: Rejection) -> std::result::Result<impl warp::Reply, Rejection> {
        let (msg, status) = match r.find::<Error>() {
            Some(err) => {
                log::info!("Request rejected: {}", err);
                (err.msg(), err.status())
            }
            None if r.is_not_found() => ("Not found", warp::http::StatusCode::NOT_FOUND),
            None => return Err(r),
        };
        Ok(warp::reply::with_status(
            warp::reply::json(&ErrorMessage::new(msg)),
            status,
        ))
    }
}

#[derive(Serialize)]
struct ErrorMessage {
    error: String,
}

impl ErrorMessage {
    fn new(msg: impl std::fmt::Display) -> Self {
        Self {
            error: msg.to_string(),
        }
    }
}
