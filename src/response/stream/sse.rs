//! The Server-Sent Events transport.
use super::filter::Filter;
use super::{Session, OUTBOUND_BUFFER};
use crate::request::{Error, PgPool, Subscription};
use crate::response::redis::Manager;

use futures::stream::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use warp::sse;
use warp::Reply;

pub struct Sse;

impl Sse {
    /// Open the event stream for one subscription.  A spawned task owns the
    /// session and keeps pumping, filtering, and framing events until the
    /// client goes away; the reply itself is just the drained end of the
    /// outbound queue behind warp's keep-alive wrapper.
    pub async fn send_events(
        manager: Arc<Mutex<Manager>>,
        pool: PgPool,
        heartbeat: Duration,
        subscription: Subscription,
    ) -> Result<impl Reply, warp::Rejection> {
        let mut session = Session::new(manager);
        let (_key, mut event_rx) = session
            .attach(&subscription)
            .await
            .map_err(|e| {
                log::error!("could not open the upstream subscription: {}", e);
                warp::reject::custom(Error::Upstream)
            })?
            .expect("Guaranteed: a fresh session has no prior subscription");

        let filter = Filter::new(pool, &subscription);
        let (out_tx, out_rx) = mpsc::channel::<sse::Event>(OUTBOUND_BUFFER);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = event_rx.recv() => match maybe_event {
                        Some(event) => {
                            if filter.admits(&event).await {
                                let frame = sse::Event::default()
                                    .event(event.name().to_string())
                                    .data(event.payload_txt());
                                if out_tx.send(frame).await.is_err() {
                                    break; // client gone mid-send
                                }
                            }
                        }
                        None => break, // the dispatch path pruned us
                    },
                    _ = out_tx.closed() => break, // client gone while idle
                }
            }
            session.close().await;
        });

        // prime the response right away so proxies commit to the stream
        let event_stream = futures::stream::once(async { Ok(sse::Event::default().comment(")")) })
            .chain(ReceiverStream::new(out_rx).map(Ok::<_, Infallible>));

        let reply = sse::reply(
            sse::keep_alive()
                .interval(heartbeat)
                .text("thump")
                .stream(event_stream),
        );
        // no-store, not warp's default no-cache: intermediaries must not
        // replay one client's stream to another
        Ok(warp::reply::with_header(reply, "cache-control", "no-store"))
    }
}
