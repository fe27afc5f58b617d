//! Logical streams, the viewers who request them, and the upstream channels
//! they resolve to.
use super::err::Error;
use super::query::Query;
use crate::event::Id;

use hashbrown::HashSet;
use std::convert::TryFrom;

type Result<T> = std::result::Result<T, Error>;

/// A logical stream, fully resolved: what to watch, how far it reaches, and
/// which slice of its content the client asked for.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Timeline(pub(crate) Stream, pub(crate) Reach, pub(crate) Content);

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Stream {
    User(Id),
    Public,
    Hashtag(String),
    List(i64),
    Direct(Id),
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Reach {
    Local,
    Federated,
    Remote,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub(crate) enum Content {
    All,
    Media,
    Notification,
}

impl Timeline {
    pub(crate) fn from_query_and_user(q: &Query, user: &UserData) -> Result<Self> {
        use {Content::*, Reach::*, Stream::*};

        Ok(match q.stream.as_str() {
            "public" => match q.media {
                true => Timeline(Public, Federated, Media),
                false => Timeline(Public, Federated, All),
            },
            "public:media" => Timeline(Public, Federated, Media),
            "public:local" => match q.media {
                true => Timeline(Public, Local, Media),
                false => Timeline(Public, Local, All),
            },
            "public:local:media" => Timeline(Public, Local, Media),
            "public:remote" => match q.media {
                true => Timeline(Public, Remote, Media),
                false => Timeline(Public, Remote, All),
            },
            "public:remote:media" => Timeline(Public, Remote, Media),
            "hashtag" => Timeline(Hashtag(q.tag()?), Federated, All),
            "hashtag:local" => Timeline(Hashtag(q.tag()?), Local, All),
            "user" => Timeline(User(user.signed_in_id()?), Federated, All),
            "user:notification" => Timeline(User(user.signed_in_id()?), Federated, Notification),
            "direct" => Timeline(Direct(user.signed_in_id()?), Federated, All),
            // list ownership is checked by the caller, against the database
            "list" => Timeline(List(q.list), Federated, All),
            other => {
                log::warn!("Request for nonexistent stream type: `{}`", other);
                Err(Error::UnknownStream(other.to_string()))?
            }
        })
    }

    /// The unprefixed upstream channels this timeline listens on.  A `user`
    /// timeline picks up the device channel when the token carries a device
    /// id.  Namespacing is the Redis adapter's job, not ours.
    pub(crate) fn channels(&self, device_id: Option<&str>) -> Vec<String> {
        use {Content::*, Reach::*, Stream::*};

        match self {
            Timeline(User(id), _, All) => {
                let mut channels = vec![format!("timeline:{}", **id)];
                if let Some(device) = device_id {
                    channels.push(format!("timeline:{}:{}", **id, device));
                }
                channels
            }
            // notification streams share the account's channel and filter
            Timeline(User(id), _, _) => vec![format!("timeline:{}", **id)],
            Timeline(Public, reach, content) => {
                let mut channel = String::from("timeline:public");
                match reach {
                    Local => channel.push_str(":local"),
                    Remote => channel.push_str(":remote"),
                    Federated => (),
                }
                if let Media = content {
                    channel.push_str(":media");
                }
                vec![channel]
            }
            Timeline(Hashtag(tag), Local, _) => vec![format!("timeline:hashtag:{}:local", tag)],
            Timeline(Hashtag(tag), _, _) => vec![format!("timeline:hashtag:{}", tag)],
            Timeline(List(id), _, _) => vec![format!("timeline:list:{}", id)],
            Timeline(Direct(id), _, _) => vec![format!("timeline:direct:{}", **id)],
        }
    }

    /// The `stream` array for outbound WebSocket frames: `[name]`, or
    /// `[name, param]` for hashtag and list streams.
    pub(crate) fn stream_key(&self) -> Vec<String> {
        use {Content::*, Reach::*, Stream::*};

        match self {
            Timeline(User(_), _, Notification) => vec!["user:notification".into()],
            Timeline(User(_), _, _) => vec!["user".into()],
            Timeline(Public, reach, content) => {
                let mut name = String::from("public");
                match reach {
                    Local => name.push_str(":local"),
                    Remote => name.push_str(":remote"),
                    Federated => (),
                }
                if let Media = content {
                    name.push_str(":media");
                }
                vec![name]
            }
            Timeline(Hashtag(tag), Local, _) => vec!["hashtag:local".into(), tag.clone()],
            Timeline(Hashtag(tag), _, _) => vec!["hashtag".into(), tag.clone()],
            Timeline(List(id), _, _) => vec!["list".into(), id.to_string()],
            Timeline(Direct(_), _, _) => vec!["direct".into()],
        }
    }

    /// Whether per-viewer visibility filtering applies.  Only the shared
    /// firehoses need it; the personal timelines were filtered at publish
    /// time.
    pub(crate) fn needs_filtering(&self) -> bool {
        matches!(self.0, Stream::Public | Stream::Hashtag(_))
    }

    /// Whether this subscription delivers only `notification` events.
    pub(crate) fn notification_only(&self) -> bool {
        matches!(self.2, Content::Notification)
    }
}

impl Query {
    fn tag(&self) -> Result<String> {
        if self.tag.is_empty() {
            Err(Error::MissingTag)
        } else {
            Ok(self.tag.to_lowercase())
        }
    }
}

/// OAuth scopes relevant to streaming.  Anything else a token grants is
/// ignored here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    Read,
    Statuses,
    Notifications,
}

impl TryFrom<&str> for Scope {
    type Error = ();

    fn try_from(s: &str) -> std::result::Result<Self, ()> {
        match s {
            "read" => Ok(Scope::Read),
            "read:statuses" => Ok(Scope::Statuses),
            "read:notifications" => Ok(Scope::Notifications),
            _ => Err(()),
        }
    }
}

/// The viewer attached to a request: who they are, what their token covers,
/// and the languages they want.
#[derive(Clone, Debug, PartialEq)]
pub struct UserData {
    pub(crate) id: Id,
    pub(crate) allowed_langs: HashSet<String>,
    pub(crate) scopes: HashSet<Scope>,
    pub(crate) device_id: Option<String>,
}

impl UserData {
    pub(crate) fn public() -> Self {
        Self {
            id: Id(-1),
            allowed_langs: HashSet::new(),
            scopes: HashSet::new(),
            device_id: None,
        }
    }

    pub(crate) fn is_anonymous(&self) -> bool {
        self.id == Id(-1)
    }

    /// Notifications require the `read` or `read:notifications` grant.
    pub(crate) fn allow_notifications(&self) -> bool {
        self.scopes.contains(&Scope::Read) || self.scopes.contains(&Scope::Notifications)
    }

    fn signed_in_id(&self) -> Result<Id> {
        if self.is_anonymous() {
            Err(Error::MissingToken)
        } else {
            Ok(self.id)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn query(stream: &str) -> Query {
        Query {
            access_token: None,
            stream: stream.to_string(),
            media: false,
            tag: String::new(),
            list: 0,
        }
    }

    fn viewer() -> UserData {
        UserData {
            id: Id(42),
            allowed_langs: HashSet::new(),
            scopes: [Scope::Read].into_iter().collect(),
            device_id: None,
        }
    }

    #[test]
    fn public_streams_resolve_to_their_channels() {
        for (stream, media, channel) in [
            ("public", false, "timeline:public"),
            ("public", true, "timeline:public:media"),
            ("public:media", false, "timeline:public:media"),
            ("public:local", false, "timeline:public:local"),
            ("public:local", true, "timeline:public:local:media"),
            ("public:local:media", false, "timeline:public:local:media"),
            ("public:remote", false, "timeline:public:remote"),
            ("public:remote:media", false, "timeline:public:remote:media"),
        ] {
            let mut q = query(stream);
            q.media = media;
            let tl = Timeline::from_query_and_user(&q, &viewer()).expect("in test");
            assert_eq!(tl.channels(None), vec![channel.to_string()]);
            assert!(tl.needs_filtering());
            assert!(!tl.notification_only());
        }
    }

    #[test]
    fn hashtags_are_lowercased_and_required() {
        let mut q = query("hashtag");
        q.tag = "Art".to_string();
        let tl = Timeline::from_query_and_user(&q, &viewer()).expect("in test");
        assert_eq!(tl.channels(None), vec!["timeline:hashtag:art".to_string()]);
        assert_eq!(tl.stream_key(), vec!["hashtag".to_string(), "art".to_string()]);

        q.stream = "hashtag:local".to_string();
        let tl = Timeline::from_query_and_user(&q, &viewer()).expect("in test");
        assert_eq!(
            tl.channels(None),
            vec!["timeline:hashtag:art:local".to_string()]
        );

        let missing = Timeline::from_query_and_user(&query("hashtag"), &viewer());
        assert!(matches!(missing, Err(Error::MissingTag)));
    }

    #[test]
    fn user_stream_picks_up_the_device_channel() {
        let tl = Timeline::from_query_and_user(&query("user"), &viewer()).expect("in test");
        assert_eq!(tl.channels(None), vec!["timeline:42".to_string()]);
        assert_eq!(
            tl.channels(Some("abc123")),
            vec!["timeline:42".to_string(), "timeline:42:abc123".to_string()]
        );
        assert!(!tl.needs_filtering());
    }

    #[test]
    fn notification_stream_shares_the_user_channel() {
        let tl =
            Timeline::from_query_and_user(&query("user:notification"), &viewer()).expect("in test");
        assert_eq!(tl.channels(None), vec!["timeline:42".to_string()]);
        assert!(tl.notification_only());
        assert_eq!(tl.stream_key(), vec!["user:notification".to_string()]);
    }

    #[test]
    fn direct_and_list_streams() {
        let tl = Timeline::from_query_and_user(&query("direct"), &viewer()).expect("in test");
        assert_eq!(tl.channels(None), vec!["timeline:direct:42".to_string()]);

        let mut q = query("list");
        q.list = 99;
        let tl = Timeline::from_query_and_user(&q, &viewer()).expect("in test");
        assert_eq!(tl.channels(None), vec!["timeline:list:99".to_string()]);
        assert_eq!(tl.stream_key(), vec!["list".to_string(), "99".to_string()]);
    }

    #[test]
    fn personal_streams_refuse_anonymous_viewers() {
        for stream in ["user", "user:notification", "direct"] {
            let refused = Timeline::from_query_and_user(&query(stream), &UserData::public());
            assert!(matches!(refused, Err(Error::MissingToken)), "{}", stream);
        }
    }

    #[test]
    fn unknown_streams_are_rejected() {
        let unknown = Timeline::from_query_and_user(&query("unknown"), &viewer());
        assert!(matches!(unknown, Err(Error::UnknownStream(_))));
    }

    #[test]
    fn notification_grants() {
        let mut user = viewer();
        assert!(user.allow_notifications());
        user.scopes = [Scope::Statuses].into_iter().collect();
        assert!(!user.allow_notifications());
        user.scopes = [Scope::Notifications].into_iter().collect();
        assert!(user.allow_notifications());
    }
}
