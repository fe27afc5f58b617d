//! Fan messages out to the listeners subscribed to each channel, keeping the
//! upstream subscription set and the `subscribed:` markers in lock-step with
//! the listener table.
use super::connection::{RedisReader, RedisWriter};
use super::RedisConnErr;
use crate::config;
use crate::event::Event;

use hashbrown::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;

type Result<T> = std::result::Result<T, RedisConnErr>;

/// How often the `subscribed:` markers are rewritten.
const MARKER_INTERVAL: Duration = Duration::from_secs(360);
/// Marker TTL: three refresh intervals, so producers treat one missed refresh
/// as "still alive" and a second as "nobody is listening".
const MARKER_TTL_SECS: u64 = 3 * 360;

/// A listener's mailbox.  Dispatch never waits on it: a full mailbox loses
/// the event, a closed one gets the listener pruned.
pub(crate) type Listener = mpsc::Sender<Arc<Event>>;

/// A stable handle for one listener, for removal without comparing closures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ListenerId(u64);

/// The in-process subscription table: channel → ordered listeners.
#[derive(Default)]
struct Panel {
    channels: HashMap<String, Vec<(ListenerId, Listener)>>,
    next_id: u64,
}

impl Panel {
    /// Attach a listener; the returned flag is `true` on a 0→1 transition.
    fn attach(&mut self, channel: &str, listener: Listener) -> (ListenerId, bool) {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        let listeners = self.channels.entry(channel.to_string()).or_default();
        listeners.push((id, listener));
        (id, listeners.len() == 1)
    }

    /// Detach by id; the returned flag is `true` on a 1→0 transition.
    fn detach(&mut self, channel: &str, id: ListenerId) -> bool {
        if let Some(listeners) = self.channels.get_mut(channel) {
            listeners.retain(|(listener_id, _)| *listener_id != id);
            if listeners.is_empty() {
                self.channels.remove(channel);
                return true;
            }
        }
        false
    }

    /// One dispatch pass worth of listeners, snapshotted so a detach during
    /// the pass cannot skip a sibling.
    fn snapshot(&self, channel: &str) -> Vec<(ListenerId, Listener)> {
        self.channels.get(channel).cloned().unwrap_or_default()
    }

    /// Drop listeners found dead during a dispatch pass; `true` if that
    /// drained the channel.
    fn discard(&mut self, channel: &str, dead: &[ListenerId]) -> bool {
        if let Some(listeners) = self.channels.get_mut(channel) {
            listeners.retain(|(id, _)| !dead.contains(id));
            if listeners.is_empty() {
                self.channels.remove(channel);
                return true;
            }
        }
        false
    }

    fn live_channels(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }
}

/// The shared half of the upstream bus adapter.  All mutation goes through
/// the mutex; the feed itself is read by a single dispatch task.
pub struct Manager {
    writer: RedisWriter,
    panel: Panel,
}

impl Manager {
    /// Open the Redis connections.  Returns the manager and the feed reader
    /// the dispatch task will own.
    pub async fn connect(redis_cfg: &config::Redis) -> Result<(Self, RedisReader)> {
        let (reader, writer) = super::connection::connect(redis_cfg).await?;
        Ok((
            Self {
                writer,
                panel: Panel::default(),
            },
            reader,
        ))
    }

    pub fn into_arc(self) -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(self))
    }

    /// Attach one listener to every channel in the set.  Channels seeing
    /// their first listener are subscribed upstream and marked immediately.
    pub(crate) async fn subscribe(
        &mut self,
        channels: &[String],
        listener: &Listener,
    ) -> Result<Vec<(String, ListenerId)>> {
        let mut pairs = Vec::with_capacity(channels.len());
        let mut fresh = Vec::new();
        for channel in channels {
            let (id, first) = self.panel.attach(channel, listener.clone());
            pairs.push((channel.clone(), id));
            if first {
                fresh.push(channel.clone());
            }
        }
        if !fresh.is_empty() {
            self.writer.subscribe(&fresh).await?;
            self.writer.refresh_markers(&fresh, MARKER_TTL_SECS).await?;
            log::info!("Subscribed to {:?}", fresh);
        }
        Ok(pairs)
    }

    /// Detach previously-attached listeners; channels losing their last
    /// listener are released upstream.
    pub(crate) async fn unsubscribe(&mut self, pairs: &[(String, ListenerId)]) -> Result<()> {
        let mut drained = Vec::new();
        for (channel, id) in pairs {
            if self.panel.detach(channel, *id) {
                drained.push(channel.clone());
            }
        }
        if !drained.is_empty() {
            self.writer.unsubscribe(&drained).await?;
            log::info!("Ended stream for {:?}", drained);
        }
        Ok(())
    }

    /// Deliver one event to a channel's listeners.  A slow listener loses the
    /// event; a closed one is pruned, and a drained channel is released.
    async fn broadcast(&mut self, channel: &str, event: Arc<Event>) {
        use mpsc::error::TrySendError;

        let mut dead = Vec::new();
        for (id, listener) in self.panel.snapshot(channel) {
            match listener.try_send(Arc::clone(&event)) {
                Ok(()) => (),
                Err(TrySendError::Full(_)) => {
                    log::warn!("A client on {} is lagging; dropped one event for it", channel);
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }
        if !dead.is_empty() && self.panel.discard(channel, &dead) {
            self.writer
                .unsubscribe(&[channel.to_string()])
                .await
                .unwrap_or_else(|e| log::error!("could not release {}: {}", channel, e));
        }
    }

    async fn refresh_markers(&mut self) {
        let live = self.panel.live_channels();
        self.writer
            .refresh_markers(&live, MARKER_TTL_SECS)
            .await
            .unwrap_or_else(|e| log::error!("could not refresh subscription markers: {}", e));
    }

    /// Drive the feed: deliver messages as they arrive and refresh the
    /// markers on a fixed cadence.  Returns only when the upstream connection
    /// is lost.
    pub async fn run(manager: Arc<Mutex<Self>>, mut feed: RedisReader) -> Result<()> {
        let mut markers = tokio::time::interval(MARKER_INTERVAL);
        markers.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                msg = feed.next() => {
                    let (channel, event) = msg?;
                    let mut manager = manager.lock().await;
                    manager.broadcast(&channel, Arc::new(event)).await;
                }
                _ = markers.tick() => manager.lock().await.refresh_markers().await,
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn listener() -> (Listener, mpsc::Receiver<Arc<Event>>) {
        mpsc::channel(8)
    }

    #[test]
    fn first_subscriber_in_last_out() {
        let mut panel = Panel::default();
        let (tx, _rx) = listener();

        let (id, first) = panel.attach("timeline:public", tx.clone());
        assert!(first, "0→1 must report a fresh channel");
        let (id2, first) = panel.attach("timeline:public", tx);
        assert!(!first, "a second listener is not a fresh channel");

        assert!(!panel.detach("timeline:public", id), "one listener remains");
        assert!(panel.detach("timeline:public", id2), "1→0 must drain");
        assert!(panel.live_channels().is_empty());
    }

    #[test]
    fn detach_is_idempotent() {
        let mut panel = Panel::default();
        let (tx, _rx) = listener();
        let (id, _) = panel.attach("timeline:public", tx);
        assert!(panel.detach("timeline:public", id));
        assert!(!panel.detach("timeline:public", id));
        assert!(!panel.detach("timeline:nonexistent", id));
    }

    #[test]
    fn listener_ids_are_never_reused() {
        let mut panel = Panel::default();
        let (tx, _rx) = listener();
        let (a, _) = panel.attach("timeline:public", tx.clone());
        let (b, _) = panel.attach("timeline:public", tx.clone());
        assert!(panel.detach("timeline:public", b));
        let (c, _) = panel.attach("timeline:public", tx);
        assert_ne!(a, c);
        assert_ne!(b, c);
    }

    #[test]
    fn same_channel_from_two_sessions_counts_to_one_table_entry() {
        let mut panel = Panel::default();
        let (tx_a, _rx_a) = listener();
        let (tx_b, _rx_b) = listener();

        let (id_a, first_a) = panel.attach("timeline:public", tx_a);
        let (id_b, first_b) = panel.attach("timeline:public", tx_b);
        assert!(first_a && !first_b);
        assert_eq!(panel.live_channels(), vec!["timeline:public".to_string()]);

        assert!(!panel.detach("timeline:public", id_a));
        assert!(panel.detach("timeline:public", id_b));
    }

    #[test]
    fn snapshot_is_isolated_from_detach() {
        let mut panel = Panel::default();
        let (tx, _rx) = listener();
        let (tx2, _rx2) = listener();
        let (id, _) = panel.attach("timeline:public", tx);
        panel.attach("timeline:public", tx2);

        let snapshot = panel.snapshot("timeline:public");
        panel.detach("timeline:public", id);
        assert_eq!(snapshot.len(), 2, "the pass still sees both listeners");
        assert_eq!(panel.snapshot("timeline:public").len(), 1);
    }

    #[test]
    fn discard_reports_drained_channels() {
        let mut panel = Panel::default();
        let (tx, _rx) = listener();
        let (tx2, _rx2) = listener();
        let (id, _) = panel.attach("timeline:public", tx);
        let (id2, _) = panel.attach("timeline:public", tx2);

        assert!(!panel.discard("timeline:public", &[id]));
        assert!(panel.discard("timeline:public", &[id2]));
        assert!(panel.live_channels().is_empty());
    }
}
