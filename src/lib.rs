//! Streaming server for Mastodon-compatible social networks.
//!
//! This server provides live, streaming updates for clients of a Mastodon
//! API server.  Clients connect with either Server-Sent Events or WebSockets
//! and subscribe to one or more logical streams; the server authenticates
//! them against the OAuth tables in Postgres, fans one Redis pub/sub
//! connection out to every local listener, filters each status against the
//! viewer's visibility policy, and keeps both the clients and the upstream
//! publisher convinced someone is still listening.
//!
//! # Notes on data flow
//! * **Client request → `request`**: warp filters parse and authenticate the
//!   request, resolving it to a [`request::Subscription`] (the viewer plus
//!   the timeline they asked for).
//! * **`request` → `response::redis`**: each subscription attaches a
//!   listener to the [`response::redis::Manager`]'s channel table.  The
//!   first local listener on a channel triggers the upstream SUBSCRIBE; the
//!   last one out triggers UNSUBSCRIBE, so the publisher does no work for
//!   channels nobody watches.
//! * **`response::redis` → `response::stream`**: a single dispatch task
//!   reads the subscriber connection and hands each parsed event to every
//!   listener's mailbox without ever waiting on a slow client.  Per-client
//!   pump tasks filter events through the viewer's visibility policy and
//!   frame them for their transport.
pub mod config;
pub mod err;
pub mod event;
pub mod request;
pub mod response;
