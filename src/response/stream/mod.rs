//! Serve a `Subscription` over a transport: per-connection session
//! bookkeeping, the per-viewer visibility filter, and the SSE and WebSocket
//! adapters.
mod filter;
mod sse;
mod ws;

pub use sse::Sse;
pub use ws::Ws;

use crate::event::Event;
use crate::request::Subscription;
use crate::response::redis::{ListenerId, Manager};

use hashbrown::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Events buffered per listener before the shared dispatch path starts
/// dropping them for that listener.
pub(crate) const LISTENER_BUFFER: usize = 64;
/// Frames buffered per connection before its pumps have to wait.
pub(crate) const OUTBOUND_BUFFER: usize = 64;

/// Everything one client connection holds: its attached channel sets and the
/// pump tasks draining them.  Dropping the entries through `close` is what
/// guarantees no listener or timer outlives the connection.
pub(crate) struct Session {
    manager: Arc<Mutex<Manager>>,
    entries: HashMap<String, SessionEntry>,
}

struct SessionEntry {
    pairs: Vec<(String, ListenerId)>,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(manager: Arc<Mutex<Manager>>) -> Self {
        Self {
            manager,
            entries: HashMap::new(),
        }
    }

    /// Attach this subscription's channel set.  `None` when the key is
    /// already attached: subscribes are idempotent per session.
    pub(crate) async fn attach(
        &mut self,
        subscription: &Subscription,
    ) -> Result<Option<(String, mpsc::Receiver<Arc<Event>>)>, crate::response::redis::RedisConnErr>
    {
        let (key, channels) = channel_key(subscription);
        if self.entries.contains_key(&key) {
            return Ok(None);
        }
        let (tx, rx) = mpsc::channel(LISTENER_BUFFER);
        let pairs = self.manager.lock().await.subscribe(&channels, &tx).await?;
        self.entries.insert(
            key.clone(),
            SessionEntry { pairs, pump: None },
        );
        Ok(Some((key, rx)))
    }

    pub(crate) fn set_pump(&mut self, key: &str, pump: JoinHandle<()>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.pump = Some(pump);
        }
    }

    /// Detach one channel set by key; unknown keys are a no-op.
    pub(crate) async fn detach(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            if let Some(pump) = entry.pump {
                pump.abort();
            }
            self.manager
                .lock()
                .await
                .unsubscribe(&entry.pairs)
                .await
                .unwrap_or_else(|e| log::error!("could not release channels: {}", e));
        }
    }

    pub(crate) async fn detach_subscription(&mut self, subscription: &Subscription) {
        let (key, _) = channel_key(subscription);
        self.detach(&key).await;
    }

    /// Release everything this session holds.
    pub(crate) async fn close(&mut self) {
        let keys: Vec<String> = self.entries.keys().cloned().collect();
        for key in keys {
            self.detach(&key).await;
        }
    }
}

/// A stable identity for a channel set, so repeated subscribes collapse.
fn channel_key(subscription: &Subscription) -> (String, Vec<String>) {
    let mut channels = subscription.channels();
    channels.sort();
    (channels.join(";"), channels)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::Id;
    use crate::request::{Query, Timeline, UserData};
    use hashbrown::HashSet;

    fn subscription(stream: &str, device: Option<&str>) -> Subscription {
        let user = UserData {
            id: Id(42),
            allowed_langs: HashSet::new(),
            scopes: [crate::request::Scope::Read].into_iter().collect(),
            device_id: device.map(String::from),
        };
        let q = Query {
            access_token: None,
            stream: stream.to_string(),
            media: false,
            tag: "art".to_string(),
            list: 7,
        };
        let timeline = Timeline::from_query_and_user(&q, &user).expect("in test");
        Subscription { timeline, user }
    }

    #[test]
    fn channel_keys_are_stable_and_sorted() {
        let (key, channels) = channel_key(&subscription("user", Some("abc")));
        assert_eq!(channels, vec!["timeline:42".to_string(), "timeline:42:abc".to_string()]);
        assert_eq!(key, "timeline:42;timeline:42:abc");

        let (key_again, _) = channel_key(&subscription("user", Some("abc")));
        assert_eq!(key, key_again);
    }

    #[test]
    fn distinct_streams_have_distinct_keys() {
        let (public, _) = channel_key(&subscription("public", None));
        let (hashtag, _) = channel_key(&subscription("hashtag", None));
        let (list, _) = channel_key(&subscription("list", None));
        assert_eq!(public, "timeline:public");
        assert_eq!(hashtag, "timeline:hashtag:art");
        assert_eq!(list, "timeline:list:7");
    }
}
