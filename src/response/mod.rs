//! Stream the updates appropriate for a given `Subscription` from Redis to
//! the client.
pub mod redis;
pub mod stream;
