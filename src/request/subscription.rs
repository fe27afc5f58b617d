//! The `Subscription` a client request resolves to.
use super::err::Error;
use super::postgres::PgPool;
use super::query::Query;
use super::timeline::{Scope, Stream, Timeline, UserData};

type Result<T> = std::result::Result<T, Error>;

/// Streams anonymous viewers may watch (unless the deployment requires auth
/// everywhere).
const PUBLIC_STREAMS: [&str; 8] = [
    "public",
    "public:media",
    "public:local",
    "public:local:media",
    "public:remote",
    "public:remote:media",
    "hashtag",
    "hashtag:local",
];

pub(crate) const USER_SCOPES: &[Scope] = &[Scope::Read, Scope::Statuses];
const NOTIFICATION_SCOPES: &[Scope] = &[Scope::Read, Scope::Notifications];

/// The scopes a stream demands; `None` when anonymous viewers are welcome.
pub(crate) fn required_scopes(stream: &str, require_auth: bool) -> Option<&'static [Scope]> {
    match stream {
        s if PUBLIC_STREAMS.contains(&s) && !require_auth => None,
        "user:notification" => Some(NOTIFICATION_SCOPES),
        _ => Some(USER_SCOPES),
    }
}

/// Everything the response half needs to serve one stream to one client.
#[derive(Clone, Debug, PartialEq)]
pub struct Subscription {
    pub timeline: Timeline,
    pub user: UserData,
}

impl Subscription {
    /// Authenticate and resolve a fresh request.
    pub(crate) async fn from_query(q: Query, pool: PgPool, require_auth: bool) -> Result<Self> {
        let scopes = required_scopes(&q.stream, require_auth);
        let token = q.access_token.clone();
        let user = {
            let pool = pool.clone();
            tokio::task::spawn_blocking(move || pool.select_user(token, scopes))
                .await
                .map_err(|_| Error::Blocking)??
        };
        Self::resolve(q, user, pool, require_auth).await
    }

    /// Resolve against an already-authenticated viewer (the WebSocket control
    /// plane reuses the identity established at the handshake).
    pub(crate) async fn resolve(
        q: Query,
        user: UserData,
        pool: PgPool,
        require_auth: bool,
    ) -> Result<Self> {
        if let Some(required) = required_scopes(&q.stream, require_auth) {
            if user.is_anonymous() {
                return Err(Error::MissingToken);
            }
            if !user.scopes.iter().any(|scope| required.contains(scope)) {
                return Err(Error::InsufficientScope);
            }
        }

        let timeline = Timeline::from_query_and_user(&q, &user)?;

        if let Timeline(Stream::List(list_id), _, _) = &timeline {
            let (owner, list_id) = (user.id, *list_id);
            let owns = tokio::task::spawn_blocking(move || pool.user_owns_list(owner, list_id))
                .await
                .map_err(|_| Error::Blocking)?
                .unwrap_or(false); // a failed query authorizes nothing
            if !owns {
                return Err(Error::ListNotAuthorized(list_id));
            }
        }

        Ok(Self { timeline, user })
    }

    /// The upstream channels to attach, unprefixed.
    pub(crate) fn channels(&self) -> Vec<String> {
        self.timeline.channels(self.user.device_id.as_deref())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_streams_welcome_anonymous_viewers() {
        for stream in PUBLIC_STREAMS {
            assert_eq!(required_scopes(stream, false), None, "{}", stream);
            assert!(required_scopes(stream, true).is_some(), "{}", stream);
        }
    }

    #[test]
    fn personal_streams_demand_scopes() {
        assert_eq!(required_scopes("user", false), Some(USER_SCOPES));
        assert_eq!(required_scopes("direct", false), Some(USER_SCOPES));
        assert_eq!(required_scopes("list", false), Some(USER_SCOPES));
        assert_eq!(
            required_scopes("user:notification", false),
            Some(NOTIFICATION_SCOPES)
        );
    }

    #[test]
    fn a_bare_read_grant_passes_every_scope_check() {
        let granted = [Scope::Read];
        for stream in ["user", "user:notification", "direct", "list"] {
            let required = required_scopes(stream, false).expect("in test");
            assert!(granted.iter().any(|scope| required.contains(scope)));
        }
    }

    #[test]
    fn statuses_grant_fails_the_notification_check() {
        let granted = [Scope::Statuses];
        let required = required_scopes("user:notification", false).expect("in test");
        assert!(!granted.iter().any(|scope| required.contains(scope)));
    }
}
