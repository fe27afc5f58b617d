//! The WebSocket transport, including the subscribe/unsubscribe control
//! plane.
use super::filter::Filter;
use super::{Session, OUTBOUND_BUFFER};
use crate::event::WsFrame;
use crate::request::{PgPool, Query, Subscription, Timeline, UserData};
use crate::response::redis::Manager;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use warp::ws::{Message, WebSocket};

pub struct Ws {
    manager: Arc<Mutex<Manager>>,
    pool: PgPool,
    ping_interval: Duration,
    require_auth: bool,
    user: UserData,
}

/// An inbound control frame: `{type: subscribe|unsubscribe, stream, ...}`.
#[derive(Deserialize, Debug)]
struct ControlFrame {
    #[serde(rename = "type")]
    kind: String,
    stream: Option<String>,
    tag: Option<String>,
    list: Option<ListParam>,
}

/// Clients send list ids as strings or numbers; accept both.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ListParam {
    Id(i64),
    Txt(String),
}

impl ControlFrame {
    fn into_query(self) -> Option<Query> {
        let stream = self.stream?;
        Some(Query {
            access_token: None,
            stream,
            media: false,
            tag: self.tag.unwrap_or_default(),
            list: match self.list {
                Some(ListParam::Id(id)) => id,
                Some(ListParam::Txt(txt)) => txt.parse().unwrap_or(0),
                None => 0,
            },
        })
    }
}

impl Ws {
    pub fn new(
        manager: Arc<Mutex<Manager>>,
        pool: PgPool,
        ping_interval: Duration,
        require_auth: bool,
        user: UserData,
    ) -> Self {
        Self {
            manager,
            pool,
            ping_interval,
            require_auth,
            user,
        }
    }

    /// Drive one connection until the socket closes or errors: a writer task
    /// owns the sink, the control loop owns the session, and every
    /// subscription gets its own pump task.
    pub async fn send_to(self, socket: WebSocket, handshake_query: Option<Query>) {
        let (mut socket_tx, mut socket_rx) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if socket_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        let mut session = Session::new(self.manager.clone());

        // the subscription riding on the handshake URL, if any
        if let Some(q) = handshake_query {
            self.subscribe(&mut session, q, &out_tx).await;
        }

        let mut ping = tokio::time::interval(self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ping.tick().await; // the first tick fires immediately; skip it

        loop {
            tokio::select! {
                received = socket_rx.next() => match received {
                    Some(Ok(msg)) if msg.is_close() => break,
                    Some(Ok(msg)) => {
                        if let Ok(txt) = msg.to_str() {
                            self.control(&mut session, txt, &out_tx).await;
                        }
                        // pings and pongs need no action from us
                    }
                    Some(Err(e)) => {
                        log::info!("websocket closed with error: {}", e);
                        break;
                    }
                    None => break,
                },
                _ = ping.tick() => {
                    if out_tx.send(Message::ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        session.close().await;
        writer.abort();
    }

    async fn control(&self, session: &mut Session, txt: &str, out_tx: &mpsc::Sender<Message>) {
        let frame: ControlFrame = match serde_json::from_str(txt) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("ignoring an unparseable control frame: {}", e);
                return;
            }
        };
        match frame.kind.as_str() {
            "subscribe" => match frame.into_query() {
                Some(q) => self.subscribe(session, q, out_tx).await,
                None => log::warn!("ignoring a subscribe frame without a stream"),
            },
            "unsubscribe" => match frame.into_query() {
                Some(q) => self.unsubscribe(session, q).await,
                None => log::warn!("ignoring an unsubscribe frame without a stream"),
            },
            _other => (), // unknown control types are silently ignored
        }
    }

    /// Resolve and attach one stream.  Failures are logged and the frame
    /// ignored; the client simply never sees frames for that stream.
    async fn subscribe(&self, session: &mut Session, q: Query, out_tx: &mpsc::Sender<Message>) {
        let subscription = match Subscription::resolve(
            q,
            self.user.clone(),
            self.pool.clone(),
            self.require_auth,
        )
        .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                log::warn!("ignoring a subscription request: {}", e);
                return;
            }
        };

        match session.attach(&subscription).await {
            Ok(Some((key, mut event_rx))) => {
                let filter = Filter::new(self.pool.clone(), &subscription);
                let stream_key = subscription.timeline.stream_key();
                let out_tx = out_tx.clone();
                let pump = tokio::spawn(async move {
                    while let Some(event) = event_rx.recv().await {
                        if filter.admits(&event).await {
                            let frame = Message::text(WsFrame::json(&stream_key, &event));
                            if out_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                    }
                });
                session.set_pump(&key, pump);
            }
            Ok(None) => (), // already watching this channel set
            Err(e) => log::error!("could not open the upstream subscription: {}", e),
        }
    }

    /// Releasing a stream the session never attached is a no-op, so this
    /// skips the auth and ownership gates entirely.
    async fn unsubscribe(&self, session: &mut Session, q: Query) {
        match Timeline::from_query_and_user(&q, &self.user) {
            Ok(timeline) => {
                let subscription = Subscription {
                    timeline,
                    user: self.user.clone(),
                };
                session.detach_subscription(&subscription).await;
            }
            Err(e) => log::warn!("ignoring an unsubscribe request: {}", e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn control_frames_accept_string_and_numeric_list_ids() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"type": "subscribe", "stream": "list", "list": "99"}"#)
                .expect("in test");
        assert_eq!(frame.into_query().expect("has a stream").list, 99);

        let frame: ControlFrame =
            serde_json::from_str(r#"{"type": "subscribe", "stream": "list", "list": 99}"#)
                .expect("in test");
        assert_eq!(frame.into_query().expect("has a stream").list, 99);
    }

    #[test]
    fn control_frames_carry_hashtag_params() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"type": "subscribe", "stream": "hashtag", "tag": "Art"}"#)
                .expect("in test");
        let q = frame.into_query().expect("has a stream");
        assert_eq!(q.stream, "hashtag");
        assert_eq!(q.tag, "Art");
    }

    #[test]
    fn streamless_control_frames_resolve_to_nothing() {
        let frame: ControlFrame =
            serde_json::from_str(r#"{"type": "subscribe"}"#).expect("in test");
        assert!(frame.into_query().is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let frame: ControlFrame = serde_json::from_str(
            r#"{"type": "unsubscribe", "stream": "public", "extra": {"a": 1}}"#,
        )
        .expect("in test");
        assert_eq!(frame.kind, "unsubscribe");
    }
}
